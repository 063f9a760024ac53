use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_core::{
    AST_FINGERPRINT_COMPACT_LEN, DetailLevel, EdgeType, SourceRange, SymbolId, SymbolKind,
    SymbolMetrics, Visibility, truncate_fingerprint,
};

use crate::graph::RepoGraph;
use crate::request::SliceBudget;
use crate::seed::ResolvedStartNode;

pub const COMPACT_WIRE_VERSION: u32 = 2;

/// One dependency reference carried on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepRef {
    pub symbol_id: SymbolId,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CardDeps {
    pub imports: Vec<DepRef>,
    pub calls: Vec<DepRef>,
}

impl CardDeps {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.calls.is_empty()
    }
}

/// Wire projection of a symbol card. The envelope already names the repo and
/// ledger version, so neither is repeated here; the AST fingerprint carries
/// only its wire prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceSymbolCard {
    pub symbol_id: SymbolId,
    pub file_path: String,
    pub range: SourceRange,
    pub kind: SymbolKind,
    pub name: String,
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<strata_core::SignatureInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side_effects: Vec<String>,
    pub deps: CardDeps,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SymbolMetrics>,
    pub detail_level: DetailLevel,
    pub ast_fingerprint: String,
}

/// Lets a caller reuse a previously sent card instead of re-reading it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRef {
    pub symbol_id: SymbolId,
    pub etag: String,
    pub detail_level: DetailLevel,
}

/// `(fromIndex, toIndex, type, weight)`; indices point into `symbolIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEdge(pub u32, pub u32, pub EdgeType, pub f64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierSuggestion {
    pub symbol_id: SymbolId,
    pub score: f64,
    pub why: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HowToResume {
    #[serde(rename = "type")]
    pub resume_type: String,
    pub value: u32,
}

impl HowToResume {
    pub fn token_hint(estimated_tokens: u32) -> Self {
        Self {
            resume_type: "token".to_owned(),
            value: estimated_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceTruncation {
    pub truncated: bool,
    pub dropped_cards: u32,
    pub dropped_edges: u32,
    pub how_to_resume: HowToResume,
}

/// The slice response envelope. `frontier` and `truncation` travel together:
/// both present when admission stopped early, both absent otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSlice {
    pub repo_id: String,
    pub version_id: String,
    pub budget: SliceBudget,
    pub start_symbols: Vec<ResolvedStartNode>,
    pub symbol_index: Vec<SymbolId>,
    pub cards: Vec<SliceSymbolCard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_refs: Option<Vec<CardRef>>,
    pub edges: Vec<WireEdge>,
    pub estimated_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontier: Option<Vec<FrontierSuggestion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<SliceTruncation>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EncodedEdges {
    pub symbol_index: Vec<SymbolId>,
    pub edges: Vec<WireEdge>,
    pub dropped_edges: u32,
}

/// Deterministic edge encoding: `symbol_index` is the sorted unique admitted
/// set; an edge is emitted iff both endpoints are in it. Applying this twice
/// to the same inputs yields identical output.
pub fn encode_edges_with_symbol_index(
    graph: &RepoGraph,
    admitted: &BTreeSet<SymbolId>,
) -> EncodedEdges {
    let symbol_index: Vec<SymbolId> = admitted.iter().cloned().collect();
    let position: BTreeMap<&SymbolId, u32> = symbol_index
        .iter()
        .enumerate()
        .map(|(index, id)| (id, index as u32))
        .collect();

    let mut edges = Vec::new();
    let mut dropped_edges = 0u32;
    for from in &symbol_index {
        let from_index = position[from];
        for edge in graph.out_edges(from) {
            match position.get(&edge.to_symbol_id) {
                Some(&to_index) => {
                    edges.push(WireEdge(from_index, to_index, edge.edge_type, edge.weight));
                }
                None => dropped_edges += 1,
            }
        }
    }

    EncodedEdges {
        symbol_index,
        edges,
        dropped_edges,
    }
}

// --- compact-v2 wire variant ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactCardV2 {
    pub id: SymbolId,
    pub path: String,
    pub kind: SymbolKind,
    pub name: String,
    pub dl: DetailLevel,
    pub deps: CardDeps,
    /// Truncated AST fingerprint; present only on full-detail cards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub af: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactSliceV2 {
    pub sv: u32,
    pub et: Vec<String>,
    pub si: Vec<SymbolId>,
    pub c: Vec<CompactCardV2>,
    /// `(fromIndex, toIndex, etIndex, weight)`.
    pub e: Vec<(u32, u32, u32, f64)>,
}

/// Project a slice into the compact-v2 payload. Edge types collapse into an
/// index table; fingerprints shrink to the compact prefix.
pub fn to_compact_v2(slice: &GraphSlice) -> CompactSliceV2 {
    let et: Vec<String> = EdgeType::ALL
        .iter()
        .map(|edge_type| edge_type.as_str().to_owned())
        .collect();
    let et_index = |edge_type: EdgeType| {
        EdgeType::ALL
            .iter()
            .position(|candidate| *candidate == edge_type)
            .unwrap_or(0) as u32
    };

    CompactSliceV2 {
        sv: COMPACT_WIRE_VERSION,
        et,
        si: slice.symbol_index.clone(),
        c: slice
            .cards
            .iter()
            .map(|card| CompactCardV2 {
                id: card.symbol_id.clone(),
                path: card.file_path.clone(),
                kind: card.kind,
                name: card.name.clone(),
                dl: card.detail_level,
                deps: card.deps.clone(),
                af: (card.detail_level == DetailLevel::Full).then(|| {
                    truncate_fingerprint(&card.ast_fingerprint, AST_FINGERPRINT_COMPACT_LEN)
                }),
            })
            .collect(),
        e: slice
            .edges
            .iter()
            .map(|edge| (edge.0, edge.1, et_index(edge.2), edge.3))
            .collect(),
    }
}
