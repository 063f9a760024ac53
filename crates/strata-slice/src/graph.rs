use std::collections::HashMap;

use strata_core::{Edge, FileId, FileRecord, Symbol, SymbolId, SymbolMetrics};
use strata_store::{StoreError, SymbolStore};

/// Immutable per-repo adjacency snapshot. Borrowed read-only by every build
/// pinned to it; a re-index installs a fresh snapshot without touching
/// outstanding borrows.
#[derive(Debug, Default)]
pub struct RepoGraph {
    pub repo_id: String,
    pub symbols: HashMap<SymbolId, Symbol>,
    pub files: HashMap<FileId, FileRecord>,
    pub metrics: HashMap<SymbolId, SymbolMetrics>,
    adj_out: HashMap<SymbolId, Vec<Edge>>,
    adj_in: HashMap<SymbolId, Vec<Edge>>,
    pub dangling_edge_count: usize,
}

impl RepoGraph {
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn contains(&self, symbol_id: &str) -> bool {
        self.symbols.contains_key(symbol_id)
    }

    pub fn symbol(&self, symbol_id: &str) -> Option<&Symbol> {
        self.symbols.get(symbol_id)
    }

    pub fn file_for(&self, symbol: &Symbol) -> Option<&FileRecord> {
        self.files.get(&symbol.file_id)
    }

    pub fn metrics_for(&self, symbol_id: &str) -> Option<&SymbolMetrics> {
        self.metrics.get(symbol_id)
    }

    /// Outgoing edges, dangling targets included; traversal filters those.
    pub fn out_edges(&self, symbol_id: &str) -> &[Edge] {
        self.adj_out.get(symbol_id).map_or(&[], Vec::as_slice)
    }

    pub fn in_edges(&self, symbol_id: &str) -> &[Edge] {
        self.adj_in.get(symbol_id).map_or(&[], Vec::as_slice)
    }

    /// Out-degree over indexed targets only.
    pub fn indexed_out_degree(&self, symbol_id: &str) -> usize {
        self.out_edges(symbol_id)
            .iter()
            .filter(|edge| self.contains(&edge.to_symbol_id))
            .count()
    }
}

/// Materialize the full graph for one repo. An unknown repo yields an empty
/// graph; whether that is an error is the orchestrator's call.
pub fn load_repo_graph(
    store: &dyn SymbolStore,
    repo_id: &str,
) -> Result<RepoGraph, StoreError> {
    let symbols = store.symbols_by_repo(repo_id)?;
    let edges = store.edges_by_repo(repo_id)?;
    let files = store.files_by_repo_lite(repo_id)?;

    let symbol_ids: Vec<SymbolId> = symbols.iter().map(|s| s.symbol_id.clone()).collect();
    let metric_rows = store.metrics_by_symbol_ids(&symbol_ids)?;

    let mut graph = RepoGraph {
        repo_id: repo_id.to_owned(),
        ..RepoGraph::default()
    };

    for symbol in symbols {
        // Every indexed symbol gets adjacency entries so lookups never fault.
        graph.adj_out.entry(symbol.symbol_id.clone()).or_default();
        graph.adj_in.entry(symbol.symbol_id.clone()).or_default();
        graph.symbols.insert(symbol.symbol_id.clone(), symbol);
    }
    for file in files {
        graph.files.insert(file.file_id.clone(), file);
    }
    for (symbol_id, metrics) in metric_rows {
        graph.metrics.insert(symbol_id, metrics);
    }

    for edge in edges {
        let from_indexed = graph.symbols.contains_key(&edge.from_symbol_id);
        let to_indexed = graph.symbols.contains_key(&edge.to_symbol_id);
        if !from_indexed || !to_indexed {
            graph.dangling_edge_count += 1;
        }
        if from_indexed {
            graph
                .adj_out
                .entry(edge.from_symbol_id.clone())
                .or_default()
                .push(edge.clone());
        }
        if to_indexed {
            graph
                .adj_in
                .entry(edge.to_symbol_id.clone())
                .or_default()
                .push(edge);
        }
    }

    // Adjacency order must not depend on store insertion order.
    for list in graph.adj_out.values_mut() {
        sort_edges(list);
    }
    for list in graph.adj_in.values_mut() {
        sort_edges(list);
    }

    tracing::debug!(
        repo_id,
        symbols = graph.symbols.len(),
        dangling_edges = graph.dangling_edge_count,
        "loaded repo graph"
    );

    Ok(graph)
}

fn sort_edges(edges: &mut [Edge]) {
    edges.sort_by(|a, b| {
        a.to_symbol_id
            .cmp(&b.to_symbol_id)
            .then_with(|| a.from_symbol_id.cmp(&b.from_symbol_id))
            .then_with(|| a.edge_type.cmp(&b.edge_type))
            .then_with(|| a.weight.total_cmp(&b.weight))
    });
}

#[cfg(test)]
mod tests {
    use strata_core::EdgeType;
    use strata_store::{MemoryStore, SymbolStoreWriter};

    use super::*;
    use crate::testutil::{edge, file, symbol};

    #[test]
    fn unknown_repo_loads_an_empty_graph() {
        let store = MemoryStore::new();
        let graph = load_repo_graph(&store, "ghost").expect("load");
        assert!(graph.is_empty());
        assert_eq!(graph.dangling_edge_count, 0);
    }

    #[test]
    fn every_indexed_symbol_has_adjacency_entries() {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/a.ts")).unwrap();
        store.upsert_symbol(symbol("A", "f1", "r1", "alpha")).unwrap();
        store.upsert_symbol(symbol("B", "f1", "r1", "beta")).unwrap();

        let graph = load_repo_graph(&store, "r1").expect("load");
        assert_eq!(graph.out_edges("A").len(), 0);
        assert_eq!(graph.in_edges("B").len(), 0);
        assert_eq!(graph.out_edges("missing").len(), 0);
    }

    #[test]
    fn dangling_edges_are_kept_on_the_referencing_side_and_counted() {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/a.ts")).unwrap();
        store.upsert_symbol(symbol("A", "f1", "r1", "alpha")).unwrap();
        store
            .upsert_edge(edge("A", "not-indexed", EdgeType::Call, 1.0, None))
            .unwrap();

        let graph = load_repo_graph(&store, "r1").expect("load");
        assert_eq!(graph.dangling_edge_count, 1);
        assert_eq!(graph.out_edges("A").len(), 1);
        assert_eq!(graph.indexed_out_degree("A"), 0);
    }

    #[test]
    fn adjacency_is_sorted_independent_of_insert_order() {
        let build = |reverse: bool| {
            let store = MemoryStore::new();
            store.upsert_file(file("f1", "r1", "src/a.ts")).unwrap();
            for id in ["A", "B", "C"] {
                store.upsert_symbol(symbol(id, "f1", "r1", id)).unwrap();
            }
            let mut edges = vec![
                edge("A", "B", EdgeType::Call, 1.0, None),
                edge("A", "C", EdgeType::Import, 0.6, None),
            ];
            if reverse {
                edges.reverse();
            }
            for e in edges {
                store.upsert_edge(e).unwrap();
            }
            load_repo_graph(&store, "r1").expect("load")
        };

        let forward = build(false);
        let backward = build(true);
        assert_eq!(forward.out_edges("A"), backward.out_edges("A"));
        assert_eq!(forward.out_edges("A")[0].to_symbol_id, "B");
    }
}
