use serde::{Deserialize, Serialize};
use thiserror::Error;

use strata_core::{
    Edge, FileId, FileRecord, Symbol, SymbolId, SymbolKind, SymbolMetrics, VersionRecord,
};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteSymbolStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Trimmed symbol row returned by token search; enough to seed a slice
/// without pulling full symbol records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolLite {
    pub symbol_id: SymbolId,
    pub file_id: FileId,
    pub name: String,
    pub kind: SymbolKind,
}

/// JSON-encoded optional attributes stored alongside a symbol row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SymbolAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<strata_core::SignatureInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub invariants: Vec<String>,
    #[serde(default)]
    pub side_effects: Vec<String>,
}

impl SymbolAttributes {
    pub fn is_empty(&self) -> bool {
        self.signature.is_none()
            && self.summary.is_none()
            && self.invariants.is_empty()
            && self.side_effects.is_empty()
    }
}

/// Read-only query interface the slice core consumes. Batch methods are the
/// primary surface; per-row lookups exist only where seeding needs them.
pub trait SymbolStore: Send + Sync {
    fn symbols_by_repo(&self, repo_id: &str) -> Result<Vec<Symbol>, StoreError>;
    fn edges_by_repo(&self, repo_id: &str) -> Result<Vec<Edge>, StoreError>;
    fn symbols_by_ids(&self, ids: &[SymbolId]) -> Result<Vec<Symbol>, StoreError>;
    fn files_by_ids(&self, ids: &[FileId]) -> Result<Vec<FileRecord>, StoreError>;
    fn metrics_by_symbol_ids(
        &self,
        ids: &[SymbolId],
    ) -> Result<Vec<(SymbolId, SymbolMetrics)>, StoreError>;
    fn edges_from_symbols(&self, ids: &[SymbolId]) -> Result<Vec<Edge>, StoreError>;
    fn files_by_repo_lite(&self, repo_id: &str) -> Result<Vec<FileRecord>, StoreError>;
    fn symbol_ids_by_file(&self, file_id: &str) -> Result<Vec<SymbolId>, StoreError>;
    fn search_symbols_lite(
        &self,
        repo_id: &str,
        token: &str,
        limit: u32,
    ) -> Result<Vec<SymbolLite>, StoreError>;
    fn latest_version(&self, repo_id: &str) -> Result<Option<VersionRecord>, StoreError>;
}

/// Write surface for an external indexer. The slice core never uses this;
/// it exists so store implementations can be populated and tested.
pub trait SymbolStoreWriter {
    fn upsert_file(&self, record: FileRecord) -> Result<(), StoreError>;
    fn upsert_symbol(&self, symbol: Symbol) -> Result<(), StoreError>;
    fn upsert_edge(&self, edge: Edge) -> Result<(), StoreError>;
    fn upsert_metrics(&self, symbol_id: &str, metrics: SymbolMetrics) -> Result<(), StoreError>;
    fn set_version(&self, record: VersionRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RepoCounts {
    pub symbols: u64,
    pub edges: u64,
    pub files: u64,
}

pub(crate) fn split_attributes(symbol: &Symbol) -> SymbolAttributes {
    SymbolAttributes {
        signature: symbol.signature.clone(),
        summary: symbol.summary.clone(),
        invariants: symbol.invariants.clone(),
        side_effects: symbol.side_effects.clone(),
    }
}

pub(crate) fn merge_attributes(symbol: &mut Symbol, attributes: SymbolAttributes) {
    symbol.signature = attributes.signature;
    symbol.summary = attributes.summary;
    symbol.invariants = attributes.invariants;
    symbol.side_effects = attributes.side_effects;
}

pub(crate) fn normalize_search_token(token: &str) -> String {
    token.trim().to_ascii_lowercase()
}

pub(crate) fn clamp_search_limit(limit: u32) -> usize {
    limit.clamp(1, 100) as usize
}
