use std::cmp::Ordering;

use strata_core::SymbolId;

/// One queued traversal candidate. `score` is stored negated so the min-heap
/// dequeues the largest actual score first; `sequence` breaks remaining ties
/// by insertion order.
#[derive(Debug, Clone)]
pub struct FrontierItem {
    pub symbol_id: SymbolId,
    pub score: f64,
    pub priority: u32,
    pub sequence: u64,
    pub why: &'static str,
}

impl FrontierItem {
    /// The actual (un-negated) relevance score.
    pub fn real_score(&self) -> f64 {
        -self.score
    }

    fn cmp_key(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// What happened to an insert against a bounded frontier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontierInsert {
    Inserted,
    /// Heap was full; the evicted worst item is returned.
    ReplacedWorst(SymbolId),
    /// Heap was full and the candidate ranked no better than the worst.
    Rejected,
}

/// Bounded binary min-heap ordered by `(score, priority, sequence)`
/// ascending. When full, an incoming item that beats the current worst
/// replaces it; anything else is rejected.
#[derive(Debug)]
pub struct Frontier {
    items: Vec<FrontierItem>,
    capacity: usize,
}

impl Frontier {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, item: FrontierItem) -> FrontierInsert {
        if self.items.len() < self.capacity {
            self.items.push(item);
            self.sift_up(self.items.len() - 1);
            return FrontierInsert::Inserted;
        }

        let worst = self.worst_index();
        if item.cmp_key(&self.items[worst]) == Ordering::Less {
            // The heap maximum sits at a leaf, so replacing it can only
            // violate the heap property upward.
            let evicted = std::mem::replace(&mut self.items[worst], item);
            self.sift_up(worst);
            FrontierInsert::ReplacedWorst(evicted.symbol_id)
        } else {
            FrontierInsert::Rejected
        }
    }

    pub fn extract_min(&mut self) -> Option<FrontierItem> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.items.swap(0, last);
        let item = self.items.pop();
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        item
    }

    pub fn peek(&self) -> Option<&FrontierItem> {
        self.items.first()
    }

    /// Non-destructive ordered snapshot, best first.
    pub fn to_sorted_vec(&self) -> Vec<FrontierItem> {
        let mut snapshot = self.items.clone();
        snapshot.sort_by(FrontierItem::cmp_key);
        snapshot
    }

    fn worst_index(&self) -> usize {
        // The maximum lives among the leaves; a linear scan is fine at the
        // configured frontier sizes.
        let mut worst = 0;
        for index in 1..self.items.len() {
            if self.items[index].cmp_key(&self.items[worst]) == Ordering::Greater {
                worst = index;
            }
        }
        worst
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.items[index].cmp_key(&self.items[parent]) == Ordering::Less {
                self.items.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut smallest = index;
            if left < self.items.len()
                && self.items[left].cmp_key(&self.items[smallest]) == Ordering::Less
            {
                smallest = left;
            }
            if right < self.items.len()
                && self.items[right].cmp_key(&self.items[smallest]) == Ordering::Less
            {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}
