use std::collections::BTreeMap;
use std::sync::RwLock;

use strata_core::{
    Edge, EdgeType, FileId, FileRecord, RepoId, Symbol, SymbolId, SymbolMetrics, VersionRecord,
};

use crate::{
    RepoCounts, StoreError, SymbolLite, SymbolStore, SymbolStoreWriter, clamp_search_limit,
    normalize_search_token,
};

/// Deterministic in-memory store used by tests and fixtures. All collections
/// are ordered maps so read results never depend on insertion order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    files: BTreeMap<FileId, FileRecord>,
    symbols: BTreeMap<SymbolId, Symbol>,
    edges: BTreeMap<(SymbolId, SymbolId, EdgeType), Edge>,
    metrics: BTreeMap<SymbolId, SymbolMetrics>,
    versions: BTreeMap<RepoId, VersionRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn repo_counts(&self, repo_id: &str) -> RepoCounts {
        let inner = self.read_inner();
        let symbols = inner
            .symbols
            .values()
            .filter(|symbol| symbol.repo_id == repo_id)
            .count() as u64;
        let files = inner
            .files
            .values()
            .filter(|file| file.repo_id == repo_id)
            .count() as u64;
        let edges = inner
            .edges
            .values()
            .filter(|edge| {
                inner
                    .symbols
                    .get(&edge.from_symbol_id)
                    .is_some_and(|symbol| symbol.repo_id == repo_id)
            })
            .count() as u64;
        RepoCounts {
            symbols,
            edges,
            files,
        }
    }

    fn read_inner(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_inner(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl SymbolStore for MemoryStore {
    fn symbols_by_repo(&self, repo_id: &str) -> Result<Vec<Symbol>, StoreError> {
        let inner = self.read_inner();
        Ok(inner
            .symbols
            .values()
            .filter(|symbol| symbol.repo_id == repo_id)
            .cloned()
            .collect())
    }

    fn edges_by_repo(&self, repo_id: &str) -> Result<Vec<Edge>, StoreError> {
        let inner = self.read_inner();
        Ok(inner
            .edges
            .values()
            .filter(|edge| {
                inner
                    .symbols
                    .get(&edge.from_symbol_id)
                    .is_some_and(|symbol| symbol.repo_id == repo_id)
            })
            .cloned()
            .collect())
    }

    fn symbols_by_ids(&self, ids: &[SymbolId]) -> Result<Vec<Symbol>, StoreError> {
        let inner = self.read_inner();
        let mut wanted: Vec<&SymbolId> = ids.iter().collect();
        wanted.sort();
        wanted.dedup();
        Ok(wanted
            .into_iter()
            .filter_map(|id| inner.symbols.get(id).cloned())
            .collect())
    }

    fn files_by_ids(&self, ids: &[FileId]) -> Result<Vec<FileRecord>, StoreError> {
        let inner = self.read_inner();
        let mut wanted: Vec<&FileId> = ids.iter().collect();
        wanted.sort();
        wanted.dedup();
        Ok(wanted
            .into_iter()
            .filter_map(|id| inner.files.get(id).cloned())
            .collect())
    }

    fn metrics_by_symbol_ids(
        &self,
        ids: &[SymbolId],
    ) -> Result<Vec<(SymbolId, SymbolMetrics)>, StoreError> {
        let inner = self.read_inner();
        let mut wanted: Vec<&SymbolId> = ids.iter().collect();
        wanted.sort();
        wanted.dedup();
        Ok(wanted
            .into_iter()
            .filter_map(|id| {
                inner
                    .metrics
                    .get(id)
                    .map(|metrics| (id.clone(), metrics.clone()))
            })
            .collect())
    }

    fn edges_from_symbols(&self, ids: &[SymbolId]) -> Result<Vec<Edge>, StoreError> {
        let inner = self.read_inner();
        let mut wanted: Vec<&SymbolId> = ids.iter().collect();
        wanted.sort();
        wanted.dedup();
        let mut edges = Vec::new();
        for id in wanted {
            edges.extend(
                inner
                    .edges
                    .values()
                    .filter(|edge| &edge.from_symbol_id == id)
                    .cloned(),
            );
        }
        Ok(edges)
    }

    fn files_by_repo_lite(&self, repo_id: &str) -> Result<Vec<FileRecord>, StoreError> {
        let inner = self.read_inner();
        let mut files: Vec<FileRecord> = inner
            .files
            .values()
            .filter(|file| file.repo_id == repo_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        Ok(files)
    }

    fn symbol_ids_by_file(&self, file_id: &str) -> Result<Vec<SymbolId>, StoreError> {
        let inner = self.read_inner();
        Ok(inner
            .symbols
            .values()
            .filter(|symbol| symbol.file_id == file_id)
            .map(|symbol| symbol.symbol_id.clone())
            .collect())
    }

    fn search_symbols_lite(
        &self,
        repo_id: &str,
        token: &str,
        limit: u32,
    ) -> Result<Vec<SymbolLite>, StoreError> {
        let token = normalize_search_token(token);
        if token.is_empty() {
            return Ok(Vec::new());
        }
        let limit = clamp_search_limit(limit);

        let inner = self.read_inner();
        let mut matches: Vec<SymbolLite> = inner
            .symbols
            .values()
            .filter(|symbol| symbol.repo_id == repo_id)
            .filter(|symbol| {
                if symbol.name.to_ascii_lowercase().contains(&token) {
                    return true;
                }
                inner
                    .files
                    .get(&symbol.file_id)
                    .is_some_and(|file| file.rel_path.to_ascii_lowercase().contains(&token))
            })
            .map(|symbol| SymbolLite {
                symbol_id: symbol.symbol_id.clone(),
                file_id: symbol.file_id.clone(),
                name: symbol.name.clone(),
                kind: symbol.kind,
            })
            .collect();
        matches.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.symbol_id.cmp(&b.symbol_id)));
        matches.truncate(limit);
        Ok(matches)
    }

    fn latest_version(&self, repo_id: &str) -> Result<Option<VersionRecord>, StoreError> {
        let inner = self.read_inner();
        Ok(inner.versions.get(repo_id).cloned())
    }
}

impl SymbolStoreWriter for MemoryStore {
    fn upsert_file(&self, record: FileRecord) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        inner.files.insert(record.file_id.clone(), record);
        Ok(())
    }

    fn upsert_symbol(&self, symbol: Symbol) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        inner.symbols.insert(symbol.symbol_id.clone(), symbol);
        Ok(())
    }

    fn upsert_edge(&self, edge: Edge) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        if !inner.symbols.contains_key(&edge.from_symbol_id) {
            return Err(StoreError::InvalidRecord(format!(
                "edge references unknown from-symbol '{}'",
                edge.from_symbol_id
            )));
        }
        inner.edges.insert(
            (
                edge.from_symbol_id.clone(),
                edge.to_symbol_id.clone(),
                edge.edge_type,
            ),
            edge,
        );
        Ok(())
    }

    fn upsert_metrics(&self, symbol_id: &str, metrics: SymbolMetrics) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        inner.metrics.insert(symbol_id.to_owned(), metrics);
        Ok(())
    }

    fn set_version(&self, record: VersionRecord) -> Result<(), StoreError> {
        let mut inner = self.write_inner();
        inner.versions.insert(record.repo_id.clone(), record);
        Ok(())
    }
}
