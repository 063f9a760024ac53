//! Bounded, semantically ranked slices of a code symbol graph.
//!
//! The pipeline: resolve start nodes from request signals, run a scored beam
//! search under card/token budgets, project admitted symbols into wire cards
//! at a detail level, encode edges against a sorted symbol index, and
//! memoize the finished slice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod beam;
pub mod cache;
pub mod card;
mod error;
pub mod frontier;
pub mod graph;
pub mod request;
pub mod score;
pub mod seed;
mod service;
pub mod tokens;
pub mod wire;

pub use cache::CacheStats;
pub use error::SliceError;
pub use request::{SliceBudget, SliceRequest};
pub use seed::{ResolvedStartNode, StartNodeSource};
pub use service::{
    AllowAllPolicy, DEFAULT_MIN_CONFIDENCE, PolicyDecision, SliceOptions, SlicePolicy,
    SliceService,
};
pub use wire::{CardRef, GraphSlice, SliceSymbolCard, to_compact_v2};

/// Cooperative cancellation handle for one slice build. Cloneable; the
/// orchestrator checks it at every loop iteration and store boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use strata_core::{
        Edge, EdgeType, FileRecord, ParamInfo, SignatureInfo, SourceRange, Symbol, SymbolKind,
    };

    pub fn file(file_id: &str, repo_id: &str, rel_path: &str) -> FileRecord {
        FileRecord {
            file_id: file_id.to_owned(),
            repo_id: repo_id.to_owned(),
            rel_path: rel_path.to_owned(),
            language: "typescript".to_owned(),
        }
    }

    pub fn symbol(symbol_id: &str, file_id: &str, repo_id: &str, name: &str) -> Symbol {
        Symbol {
            symbol_id: symbol_id.to_owned(),
            file_id: file_id.to_owned(),
            repo_id: repo_id.to_owned(),
            kind: SymbolKind::Function,
            name: name.to_owned(),
            exported: true,
            visibility: None,
            range: SourceRange {
                start_line: 1,
                start_col: 0,
                end_line: 40,
                end_col: 1,
            },
            ast_fingerprint: strata_core::blake3_hex(symbol_id.as_bytes()),
            signature: Some(SignatureInfo {
                params: vec![ParamInfo {
                    name: "input".to_owned(),
                    type_name: Some("Request".to_owned()),
                }],
                return_type: Some("Response".to_owned()),
                generics: Vec::new(),
            }),
            summary: Some(format!("Handles {name}.")),
            invariants: Vec::new(),
            side_effects: Vec::new(),
        }
    }

    pub fn edge(
        from: &str,
        to: &str,
        edge_type: EdgeType,
        weight: f64,
        confidence: Option<f64>,
    ) -> Edge {
        Edge {
            from_symbol_id: from.to_owned(),
            to_symbol_id: to.to_owned(),
            edge_type,
            weight,
            confidence,
        }
    }

    #[test]
    fn cancel_flag_round_trips() {
        let flag = super::CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
