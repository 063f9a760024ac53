use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

use strata_config::SliceConfig;
use strata_core::SymbolId;

use crate::CancelFlag;
use crate::error::SliceError;
use crate::frontier::{Frontier, FrontierInsert, FrontierItem};
use crate::graph::RepoGraph;
use crate::request::SliceBudget;
use crate::score::{ScoreContext, score_symbol};
use crate::seed::ResolvedStartNode;
use crate::tokens::estimate_card_tokens;
use crate::wire::FrontierSuggestion;

/// Consecutive below-threshold pops before the search gives up.
pub const CONSECUTIVE_BELOW_THRESHOLD_STOP: u32 = 5;
/// Window of recently accepted scores driving the dynamic cap.
pub const RECENT_SCORE_WINDOW: usize = 8;
/// Dynamic cap preconditions and margins.
pub const DYNAMIC_CAP_MIN_CARDS: usize = 6;
pub const DYNAMIC_CAP_SCORE_MARGIN: f64 = 0.25;
pub const DYNAMIC_CAP_HIGH_CONFIDENCE_SHARE: f64 = 0.6;
pub const DYNAMIC_CAP_ENTRY_COVERAGE: f64 = 0.9;
pub const DYNAMIC_CAP_DROP_FACTOR: f64 = 0.45;
/// Frontier priority for expanded neighbors (seeds use their source priority).
pub const NEIGHBOR_PRIORITY: u32 = 10;
/// Suggestions snapshotted from the remaining frontier when truncating.
pub const FRONTIER_SUGGESTION_LIMIT: usize = 10;

const NEIGHBOR_WHY: &str = "expanded neighbor";

const ADAPTIVE_CONFIDENCE_HIGH_USE: f64 = 0.9;
const ADAPTIVE_CONFIDENCE_HIGH_FLOOR: f64 = 0.95;
const ADAPTIVE_CONFIDENCE_MID_USE: f64 = 0.7;
const ADAPTIVE_CONFIDENCE_MID_FLOOR: f64 = 0.8;

/// Absent, NaN, infinite, or negative confidences count as fully confident;
/// anything above 1 clamps down to 1.
pub fn normalize_edge_confidence(confidence: Option<f64>) -> f64 {
    match confidence {
        Some(value) if value.is_finite() && value >= 0.0 => value.min(1.0),
        _ => 1.0,
    }
}

/// Canonical multiplicative edge weighting.
pub fn apply_edge_confidence_weight(configured_weight: f64, edge_confidence: f64) -> f64 {
    configured_weight * edge_confidence
}

/// The admission bar rises as the token budget is consumed.
pub fn adaptive_min_confidence(total_tokens: u32, max_tokens: u32, requested: f64) -> f64 {
    if max_tokens == 0 {
        return requested;
    }
    let used = f64::from(total_tokens) / f64::from(max_tokens);
    if used > ADAPTIVE_CONFIDENCE_HIGH_USE {
        ADAPTIVE_CONFIDENCE_HIGH_FLOOR
    } else if used > ADAPTIVE_CONFIDENCE_MID_USE {
        ADAPTIVE_CONFIDENCE_MID_FLOOR
    } else {
        requested
    }
}

pub struct BeamParams<'a> {
    pub graph: &'a RepoGraph,
    pub ctx: &'a ScoreContext,
    pub config: &'a SliceConfig,
    pub budget: SliceBudget,
    pub min_confidence: f64,
    pub entry_symbols: &'a BTreeSet<SymbolId>,
    pub deadline: Option<Instant>,
    pub cancel: Option<&'a CancelFlag>,
}

#[derive(Debug, Default)]
pub struct BeamOutcome {
    /// Admission order; used for card ordering downstream.
    pub admitted: Vec<SymbolId>,
    pub admitted_set: BTreeSet<SymbolId>,
    pub total_tokens: u32,
    /// Candidates rejected during the run plus frontier left unconsumed.
    pub dropped_candidates: u32,
    pub truncated: bool,
    /// Top remaining candidates, present only when the search truncated.
    pub suggestions: Vec<FrontierSuggestion>,
}

/// Scored beam traversal from the resolved seeds, admitting under card and
/// token budgets. Deterministic for identical inputs.
pub fn run_beam_search(
    params: &BeamParams<'_>,
    seeds: &[ResolvedStartNode],
) -> Result<BeamOutcome, SliceError> {
    let graph = params.graph;
    let threshold = params.config.score_threshold;
    let mut frontier = Frontier::new(params.config.max_frontier as usize);
    let mut visited: BTreeSet<SymbolId> = BTreeSet::new();
    let mut sequence: u64 = 0;

    for seed in seeds {
        if !graph.contains(&seed.symbol_id) || !visited.insert(seed.symbol_id.clone()) {
            continue;
        }
        frontier.insert(FrontierItem {
            symbol_id: seed.symbol_id.clone(),
            score: seed.source.initial_score(),
            priority: seed.source.priority(),
            sequence,
            why: seed.source.why(),
        });
        sequence += 1;
    }

    let mut outcome = BeamOutcome::default();
    let mut effective_cap = params.budget.max_cards as usize;
    let mut recent_accepted: VecDeque<f64> = VecDeque::with_capacity(RECENT_SCORE_WINDOW);
    let mut high_confidence_cards = 0usize;
    let mut covered_entries = 0usize;
    let mut below_streak = 0u32;

    while outcome.admitted.len() < effective_cap {
        if params.cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(SliceError::Cancelled);
        }
        if params.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            tracing::warn!(
                admitted = outcome.admitted.len(),
                "slice build hit its soft deadline; truncating"
            );
            outcome.truncated = true;
            break;
        }

        let effective_min_confidence = adaptive_min_confidence(
            outcome.total_tokens,
            params.budget.max_estimated_tokens,
            params.min_confidence,
        );

        let Some(item) = frontier.extract_min() else {
            break;
        };
        let real_score = item.real_score();

        if real_score < threshold {
            below_streak += 1;
            outcome.dropped_candidates += 1;
            if below_streak >= CONSECUTIVE_BELOW_THRESHOLD_STOP {
                break;
            }
            continue;
        }
        below_streak = 0;

        let Some(symbol) = graph.symbol(&item.symbol_id) else {
            outcome.dropped_candidates += 1;
            continue;
        };
        let card_tokens = estimate_card_tokens(symbol, graph.indexed_out_degree(&item.symbol_id));
        if outcome.total_tokens + card_tokens > params.budget.max_estimated_tokens {
            outcome.truncated = true;
            outcome.dropped_candidates += 1;
            break;
        }

        outcome.total_tokens += card_tokens;
        outcome.admitted.push(item.symbol_id.clone());
        outcome.admitted_set.insert(item.symbol_id.clone());
        if params.entry_symbols.contains(&item.symbol_id) {
            covered_entries += 1;
        }
        if real_score >= threshold + DYNAMIC_CAP_SCORE_MARGIN {
            high_confidence_cards += 1;
        }
        if recent_accepted.len() == RECENT_SCORE_WINDOW {
            recent_accepted.pop_front();
        }
        recent_accepted.push_back(real_score);

        expand_neighbors(
            params,
            &item.symbol_id,
            effective_min_confidence,
            &mut frontier,
            &mut visited,
            &mut sequence,
            &outcome.admitted_set,
            &mut outcome.dropped_candidates,
        );

        if should_tighten_cap(
            &outcome,
            &frontier,
            &recent_accepted,
            high_confidence_cards,
            covered_entries,
            params.entry_symbols.len(),
            threshold,
        ) {
            tracing::debug!(
                cards = outcome.admitted.len(),
                "dynamic cap: frontier quality dropped, closing admission"
            );
            effective_cap = outcome.admitted.len();
        }
    }

    let leftover = frontier.len();
    if leftover > 0 {
        outcome.truncated = true;
        outcome.dropped_candidates += leftover as u32;
    }
    if outcome.truncated {
        outcome.suggestions = frontier
            .to_sorted_vec()
            .into_iter()
            .take(FRONTIER_SUGGESTION_LIMIT)
            .map(|item| FrontierSuggestion {
                symbol_id: item.symbol_id.clone(),
                score: item.real_score(),
                why: item.why.to_owned(),
            })
            .collect();
    }

    Ok(outcome)
}

/// Score and enqueue the distinct, not-yet-visited indexed targets of one
/// admitted symbol. Visited is marked at enqueue time so a neighbor reached
/// from several parents is scored once per admission wave.
#[allow(clippy::too_many_arguments)]
fn expand_neighbors(
    params: &BeamParams<'_>,
    from: &SymbolId,
    effective_min_confidence: f64,
    frontier: &mut Frontier,
    visited: &mut BTreeSet<SymbolId>,
    sequence: &mut u64,
    admitted: &BTreeSet<SymbolId>,
    dropped: &mut u32,
) {
    let graph = params.graph;

    // Pick the strongest edge per distinct target; adjacency is sorted, so
    // grouping is a linear pass.
    let mut current: Option<(SymbolId, f64, f64)> = None; // (target, confidence, weight)
    let mut grouped: Vec<(SymbolId, f64, f64)> = Vec::new();
    for edge in graph.out_edges(from) {
        if edge.to_symbol_id == *from || !graph.contains(&edge.to_symbol_id) {
            continue;
        }
        let confidence = normalize_edge_confidence(edge.confidence);
        let weight = apply_edge_confidence_weight(
            params.config.edge_weight(edge.edge_type.as_str()),
            confidence,
        );
        let same_target = current
            .as_ref()
            .is_some_and(|(target, _, _)| *target == edge.to_symbol_id);
        if same_target {
            if let Some((_, best_confidence, best_weight)) = current.as_mut() {
                if weight > *best_weight {
                    *best_weight = weight;
                    *best_confidence = confidence;
                }
            }
        } else {
            if let Some(done) = current.take() {
                grouped.push(done);
            }
            current = Some((edge.to_symbol_id.clone(), confidence, weight));
        }
    }
    if let Some(done) = current.take() {
        grouped.push(done);
    }

    for (target, confidence, edge_weight) in grouped {
        if visited.contains(&target) || admitted.contains(&target) {
            continue;
        }
        if confidence < effective_min_confidence {
            *dropped += 1;
            continue;
        }
        let Some(neighbor) = graph.symbol(&target) else {
            continue;
        };
        let neighbor_score = score_symbol(
            neighbor,
            graph.file_for(neighbor),
            graph.metrics_for(&target),
            params.ctx,
        ) * edge_weight;
        if neighbor_score < params.config.score_threshold {
            *dropped += 1;
            continue;
        }

        let item = FrontierItem {
            symbol_id: target.clone(),
            score: -neighbor_score,
            priority: NEIGHBOR_PRIORITY,
            sequence: *sequence,
            why: NEIGHBOR_WHY,
        };
        *sequence += 1;
        match frontier.insert(item) {
            FrontierInsert::Inserted => {
                visited.insert(target);
            }
            FrontierInsert::ReplacedWorst(_evicted) => {
                visited.insert(target);
                *dropped += 1;
            }
            FrontierInsert::Rejected => {
                *dropped += 1;
            }
        }
    }
}

fn should_tighten_cap(
    outcome: &BeamOutcome,
    frontier: &Frontier,
    recent_accepted: &VecDeque<f64>,
    high_confidence_cards: usize,
    covered_entries: usize,
    entry_total: usize,
    threshold: f64,
) -> bool {
    if outcome.admitted.len() < DYNAMIC_CAP_MIN_CARDS || recent_accepted.is_empty() {
        return false;
    }
    let Some(next) = frontier.peek() else {
        return false;
    };
    let size = outcome.admitted.len() as f64;
    if (high_confidence_cards as f64) / size < DYNAMIC_CAP_HIGH_CONFIDENCE_SHARE {
        return false;
    }
    if entry_total > 0
        && (covered_entries as f64) / (entry_total as f64) < DYNAMIC_CAP_ENTRY_COVERAGE
    {
        return false;
    }
    let recent_avg: f64 =
        recent_accepted.iter().sum::<f64>() / recent_accepted.len() as f64;
    let bar = (threshold + DYNAMIC_CAP_SCORE_MARGIN).max(recent_avg * DYNAMIC_CAP_DROP_FACTOR);
    next.real_score() < bar
}

#[cfg(test)]
mod tests {
    use strata_core::EdgeType;
    use strata_store::{MemoryStore, SymbolStoreWriter};

    use super::*;
    use crate::graph::load_repo_graph;
    use crate::seed::StartNodeSource;
    use crate::testutil::{edge, file, symbol};

    fn seeds(ids: &[&str]) -> Vec<ResolvedStartNode> {
        ids.iter()
            .map(|id| ResolvedStartNode {
                symbol_id: (*id).to_owned(),
                source: StartNodeSource::EntrySymbol,
            })
            .collect()
    }

    fn config() -> SliceConfig {
        SliceConfig::default()
    }

    fn params<'a>(
        graph: &'a RepoGraph,
        ctx: &'a ScoreContext,
        config: &'a SliceConfig,
        entries: &'a BTreeSet<SymbolId>,
        budget: SliceBudget,
        min_confidence: f64,
    ) -> BeamParams<'a> {
        BeamParams {
            graph,
            ctx,
            config,
            budget,
            min_confidence,
            entry_symbols: entries,
            deadline: None,
            cancel: None,
        }
    }

    fn chain_store(len: usize) -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/chain.ts")).unwrap();
        for index in 0..len {
            store
                .upsert_symbol(symbol(
                    &format!("S{index}"),
                    "f1",
                    "r1",
                    &format!("step{index}"),
                ))
                .unwrap();
        }
        for index in 0..len - 1 {
            store
                .upsert_edge(edge(
                    &format!("S{index}"),
                    &format!("S{}", index + 1),
                    EdgeType::Call,
                    1.0,
                    Some(1.0),
                ))
                .unwrap();
        }
        store
    }

    #[test]
    fn card_cap_truncates_a_linear_chain() {
        let store = chain_store(5);
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::default();
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["S0".to_owned()]);
        let budget = SliceBudget {
            max_cards: 2,
            max_estimated_tokens: 10_000,
        };

        let outcome =
            run_beam_search(&params(&graph, &ctx, &cfg, &entries, budget, 0.5), &seeds(&["S0"]))
                .unwrap();

        assert_eq!(outcome.admitted, ["S0", "S1"]);
        assert!(outcome.truncated);
        assert!(outcome.dropped_candidates >= 1);
        assert_eq!(outcome.suggestions[0].symbol_id, "S2");
    }

    #[test]
    fn exhausted_frontier_means_no_truncation() {
        let store = chain_store(3);
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::default();
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["S0".to_owned()]);
        let budget = SliceBudget {
            max_cards: 10,
            max_estimated_tokens: 10_000,
        };

        let outcome =
            run_beam_search(&params(&graph, &ctx, &cfg, &entries, budget, 0.5), &seeds(&["S0"]))
                .unwrap();

        assert_eq!(outcome.admitted, ["S0", "S1", "S2"]);
        assert!(!outcome.truncated);
        assert!(outcome.suggestions.is_empty());
    }

    #[test]
    fn low_confidence_edges_are_dropped() {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/a.ts")).unwrap();
        store.upsert_symbol(symbol("A", "f1", "r1", "alpha")).unwrap();
        store.upsert_symbol(symbol("B", "f1", "r1", "beta")).unwrap();
        store
            .upsert_edge(edge("A", "B", EdgeType::Call, 1.0, Some(0.4)))
            .unwrap();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::default();
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["A".to_owned()]);
        let budget = SliceBudget {
            max_cards: 10,
            max_estimated_tokens: 10_000,
        };

        let outcome =
            run_beam_search(&params(&graph, &ctx, &cfg, &entries, budget, 0.5), &seeds(&["A"]))
                .unwrap();

        assert_eq!(outcome.admitted, ["A"]);
        assert!(outcome.dropped_candidates >= 1);
        assert!(!outcome.truncated);
    }

    #[test]
    fn invalid_confidences_count_as_fully_confident() {
        assert_eq!(normalize_edge_confidence(None), 1.0);
        assert_eq!(normalize_edge_confidence(Some(f64::NAN)), 1.0);
        assert_eq!(normalize_edge_confidence(Some(-0.3)), 1.0);
        assert_eq!(normalize_edge_confidence(Some(f64::INFINITY)), 1.0);
        assert_eq!(normalize_edge_confidence(Some(1.7)), 1.0);
        assert_eq!(normalize_edge_confidence(Some(0.4)), 0.4);
    }

    #[test]
    fn cyclic_graphs_terminate() {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/a.ts")).unwrap();
        for id in ["A", "B", "C"] {
            store.upsert_symbol(symbol(id, "f1", "r1", id)).unwrap();
        }
        store.upsert_edge(edge("A", "B", EdgeType::Call, 1.0, None)).unwrap();
        store.upsert_edge(edge("B", "C", EdgeType::Call, 1.0, None)).unwrap();
        store.upsert_edge(edge("C", "A", EdgeType::Call, 1.0, None)).unwrap();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::default();
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["A".to_owned()]);
        let budget = SliceBudget {
            max_cards: 10,
            max_estimated_tokens: 10_000,
        };

        let outcome =
            run_beam_search(&params(&graph, &ctx, &cfg, &entries, budget, 0.5), &seeds(&["A"]))
                .unwrap();
        assert_eq!(outcome.admitted, ["A", "B", "C"]);
        assert!(!outcome.truncated);
    }

    #[test]
    fn token_budget_stops_admission() {
        let store = chain_store(5);
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::default();
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["S0".to_owned()]);
        // Enough for roughly one card only.
        let budget = SliceBudget {
            max_cards: 10,
            max_estimated_tokens: 40,
        };

        let outcome =
            run_beam_search(&params(&graph, &ctx, &cfg, &entries, budget, 0.5), &seeds(&["S0"]))
                .unwrap();

        assert_eq!(outcome.admitted, ["S0"]);
        assert!(outcome.truncated);
        assert!(outcome.total_tokens <= 40);
    }

    #[test]
    fn cancellation_aborts_without_partial_results() {
        let store = chain_store(3);
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::default();
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["S0".to_owned()]);
        let budget = SliceBudget {
            max_cards: 10,
            max_estimated_tokens: 10_000,
        };
        let cancel = CancelFlag::new();
        cancel.cancel();

        let mut p = params(&graph, &ctx, &cfg, &entries, budget, 0.5);
        p.cancel = Some(&cancel);
        let result = run_beam_search(&p, &seeds(&["S0"]));
        assert!(matches!(result, Err(SliceError::Cancelled)));
    }

    #[test]
    fn dynamic_cap_closes_admission_when_quality_drops() {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/cluster.ts")).unwrap();
        store.upsert_symbol(symbol("A", "f1", "r1", "paymentHub")).unwrap();
        // 8 strong neighbors whose names match the task text.
        for index in 0..8 {
            store
                .upsert_symbol(symbol(
                    &format!("H{index}"),
                    "f1",
                    "r1",
                    &format!("paymentStep{index}"),
                ))
                .unwrap();
            store
                .upsert_edge(edge("A", &format!("H{index}"), EdgeType::Call, 1.0, Some(1.0)))
                .unwrap();
        }
        // 20 weak tails that match nothing.
        for index in 0..20 {
            store
                .upsert_symbol(symbol(&format!("T{index:02}"), "f1", "r1", &format!("misc{index:02}")))
                .unwrap();
            store
                .upsert_edge(edge("A", &format!("T{index:02}"), EdgeType::Call, 1.0, Some(1.0)))
                .unwrap();
        }
        let graph = load_repo_graph(&store, "r1").unwrap();
        let ctx = ScoreContext::new(Some("payment"), None);
        let cfg = config();
        let entries: BTreeSet<SymbolId> = BTreeSet::from(["A".to_owned()]);
        let budget = SliceBudget {
            max_cards: 30,
            max_estimated_tokens: 100_000,
        };

        let outcome =
            run_beam_search(&params(&graph, &ctx, &cfg, &entries, budget, 0.5), &seeds(&["A"]))
                .unwrap();

        // The slice closes around the high-confidence cluster, well short of
        // the 30-card budget.
        assert!(outcome.admitted.len() >= 6 && outcome.admitted.len() <= 10);
        assert!(outcome.admitted.iter().all(|id| !id.starts_with('T')));
        assert!(outcome.truncated);
    }

    #[test]
    fn adaptive_confidence_rises_with_token_pressure() {
        assert_eq!(adaptive_min_confidence(0, 1000, 0.5), 0.5);
        assert_eq!(adaptive_min_confidence(750, 1000, 0.5), 0.8);
        assert_eq!(adaptive_min_confidence(950, 1000, 0.5), 0.95);
    }
}
