use std::collections::BTreeMap;

use strata_core::{
    AST_FINGERPRINT_WIRE_LEN, DetailLevel, SourceRange, SymbolId, SymbolKind, SymbolMetrics,
    Visibility, truncate_fingerprint,
};

use crate::beam::normalize_edge_confidence;
use crate::graph::RepoGraph;
use crate::wire::{CardDeps, CardRef, DepRef, SliceSymbolCard};

/// Dependency list caps per kind (imports, calls).
pub const DEPS_PER_KIND_COMPACT: usize = 6;
pub const DEPS_PER_KIND_FULL: usize = 24;
/// Summary length cap at `signature`/`deps` levels; `full` keeps it whole.
pub const SUMMARY_SHORT_CAP: usize = 160;
/// ETag hex length.
pub const CARD_ETAG_LEN: usize = 16;

/// Adaptive downgrade breakpoints: the weakest level whose per-card token
/// share still fits.
const ADAPTIVE_MINIMAL_BELOW: u32 = 30;
const ADAPTIVE_SIGNATURE_BELOW: u32 = 50;
const ADAPTIVE_DEPS_BELOW: u32 = 80;
const ADAPTIVE_COMPACT_BELOW: u32 = 120;

/// Internal full-form card. Holds everything the wire projections may need,
/// including the untruncated AST fingerprint and the ledger version.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolCard {
    pub symbol_id: SymbolId,
    pub repo_id: String,
    pub file_path: String,
    pub range: SourceRange,
    pub kind: SymbolKind,
    pub name: String,
    pub exported: bool,
    pub visibility: Option<Visibility>,
    pub signature: Option<strata_core::SignatureInfo>,
    pub summary: Option<String>,
    pub invariants: Vec<String>,
    pub side_effects: Vec<String>,
    pub deps: CardDeps,
    pub metrics: Option<SymbolMetrics>,
    pub ledger_version: String,
    pub ast_fingerprint: String,
}

/// Assemble the internal card for one admitted symbol. Dependency lists are
/// deduplicated by target (max confidence wins) and pre-capped at the full
/// level; wire projection tightens them further.
pub fn build_symbol_card(
    graph: &RepoGraph,
    symbol_id: &str,
    ledger_version: &str,
) -> Option<SymbolCard> {
    let symbol = graph.symbol(symbol_id)?;
    let file_path = graph
        .file_for(symbol)
        .map(|file| file.rel_path.clone())
        .unwrap_or_default();

    let mut imports: BTreeMap<SymbolId, f64> = BTreeMap::new();
    let mut calls: BTreeMap<SymbolId, f64> = BTreeMap::new();
    for edge in graph.out_edges(symbol_id) {
        if !graph.contains(&edge.to_symbol_id) {
            continue;
        }
        let confidence = normalize_edge_confidence(edge.confidence);
        let bucket = match edge.edge_type {
            strata_core::EdgeType::Call => &mut calls,
            strata_core::EdgeType::Import => &mut imports,
            strata_core::EdgeType::Config => continue,
        };
        let entry = bucket.entry(edge.to_symbol_id.clone()).or_insert(confidence);
        if confidence > *entry {
            *entry = confidence;
        }
    }

    Some(SymbolCard {
        symbol_id: symbol.symbol_id.clone(),
        repo_id: symbol.repo_id.clone(),
        file_path,
        range: symbol.range,
        kind: symbol.kind,
        name: symbol.name.clone(),
        exported: symbol.exported,
        visibility: symbol.visibility,
        signature: symbol.signature.clone(),
        summary: symbol.summary.clone(),
        invariants: symbol.invariants.clone(),
        side_effects: symbol.side_effects.clone(),
        deps: CardDeps {
            imports: cap_deps(imports, DEPS_PER_KIND_FULL),
            calls: cap_deps(calls, DEPS_PER_KIND_FULL),
        },
        metrics: graph.metrics_for(symbol_id).cloned(),
        ledger_version: ledger_version.to_owned(),
        ast_fingerprint: symbol.ast_fingerprint.clone(),
    })
}

/// Strongest dependencies first, stable on ties, capped.
fn cap_deps(deps: BTreeMap<SymbolId, f64>, cap: usize) -> Vec<DepRef> {
    let mut refs: Vec<DepRef> = deps
        .into_iter()
        .map(|(symbol_id, confidence)| DepRef {
            symbol_id,
            confidence,
        })
        .collect();
    refs.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.symbol_id.cmp(&b.symbol_id))
    });
    refs.truncate(cap);
    refs
}

/// Project an internal card to the wire at the requested detail level. One
/// total function over the level tag; `Compact` carries the `Deps` payload
/// under its own label.
pub fn to_wire_card(card: &SymbolCard, level: DetailLevel) -> SliceSymbolCard {
    let payload = level.payload_level();

    let mut wire = SliceSymbolCard {
        symbol_id: card.symbol_id.clone(),
        file_path: card.file_path.clone(),
        range: card.range,
        kind: card.kind,
        name: card.name.clone(),
        exported: card.exported,
        visibility: None,
        signature: None,
        summary: None,
        invariants: Vec::new(),
        side_effects: Vec::new(),
        deps: CardDeps::default(),
        metrics: None,
        detail_level: level,
        ast_fingerprint: truncate_fingerprint(&card.ast_fingerprint, AST_FINGERPRINT_WIRE_LEN),
    };

    if payload >= DetailLevel::Signature {
        wire.visibility = card.visibility;
        wire.signature = card.signature.clone();
        wire.summary = card
            .summary
            .as_deref()
            .map(|summary| truncate_summary(summary, SUMMARY_SHORT_CAP));
    }

    if payload >= DetailLevel::Deps {
        let cap = if payload == DetailLevel::Full {
            DEPS_PER_KIND_FULL
        } else {
            DEPS_PER_KIND_COMPACT
        };
        wire.deps = CardDeps {
            imports: card.deps.imports.iter().take(cap).cloned().collect(),
            calls: card.deps.calls.iter().take(cap).cloned().collect(),
        };
    }

    if payload == DetailLevel::Full {
        wire.summary = card.summary.clone();
        wire.invariants = card.invariants.clone();
        wire.side_effects = card.side_effects.clone();
        wire.metrics = card.metrics.clone();
    }

    wire
}

fn truncate_summary(summary: &str, cap: usize) -> String {
    if summary.len() <= cap {
        return summary.to_owned();
    }
    let mut cut = cap;
    while cut > 0 && !summary.is_char_boundary(cut) {
        cut -= 1;
    }
    summary[..cut].to_owned()
}

/// Stable etag over the normalized wire form (detail level set, no etag
/// field present on cards by construction).
pub fn card_etag(card: &SliceSymbolCard) -> String {
    let canonical = serde_json::to_string(card).unwrap_or_default();
    truncate_fingerprint(&strata_core::blake3_hex(canonical.as_bytes()), CARD_ETAG_LEN)
}

/// Strongest detail level whose per-card token share fits the remaining
/// budget, never exceeding the requested level.
pub fn pick_adaptive_level(
    requested: DetailLevel,
    remaining_tokens: u32,
    projected_cards: usize,
) -> DetailLevel {
    if projected_cards == 0 {
        return requested;
    }
    let share = remaining_tokens / projected_cards as u32;
    let fitting = if share < ADAPTIVE_MINIMAL_BELOW {
        DetailLevel::Minimal
    } else if share < ADAPTIVE_SIGNATURE_BELOW {
        DetailLevel::Signature
    } else if share < ADAPTIVE_DEPS_BELOW {
        DetailLevel::Deps
    } else if share < ADAPTIVE_COMPACT_BELOW {
        DetailLevel::Compact
    } else {
        DetailLevel::Full
    };
    fitting.min(requested)
}

/// Apply the known-etag delta rules to the projected cards.
///
/// - current etag matches the caller's: the symbol is omitted entirely;
/// - caller supplied any etag map: every emitted card travels with a ref;
/// - no map supplied: cards only, no refs.
pub fn build_payload_cards_and_refs(
    cards: Vec<SliceSymbolCard>,
    known_card_etags: Option<&BTreeMap<String, String>>,
) -> (Vec<SliceSymbolCard>, Vec<CardRef>) {
    let mut emitted_cards = Vec::with_capacity(cards.len());
    let mut refs = Vec::new();

    for card in cards {
        let etag = card_etag(&card);
        if let Some(known) = known_card_etags {
            if known.get(&card.symbol_id) == Some(&etag) {
                continue;
            }
            refs.push(CardRef {
                symbol_id: card.symbol_id.clone(),
                etag,
                detail_level: card.detail_level,
            });
        }
        emitted_cards.push(card);
    }

    (emitted_cards, refs)
}
