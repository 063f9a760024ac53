use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strata_core::{FileId, SymbolId, SymbolKind};
use strata_store::{StoreError, SymbolStore};

use crate::graph::RepoGraph;
use crate::request::SliceRequest;
use crate::score::parse_stack_trace;

/// Minimum shared lowercase name prefix for sibling seeding.
pub const SIBLING_PREFIX_MIN: usize = 4;
/// Per-entry first-hop seed counts, normal and under a strong signal.
pub const FIRST_HOP_LIMIT: usize = 6;
pub const FIRST_HOP_LIMIT_STRONG: usize = 3;
/// Per-entry sibling seed counts, normal and under a strong signal.
pub const SIBLING_LIMIT: usize = 4;
pub const SIBLING_LIMIT_STRONG: usize = 2;
/// Task-text tokenization bounds.
pub const TASK_TEXT_TOKEN_MIN_LEN: usize = 3;
pub const TASK_TEXT_MAX_TOKENS: usize = 6;
pub const TASK_TEXT_LOOKUP_LIMIT: u32 = 8;

const TASK_TEXT_STOP_WORDS: [&str; 24] = [
    "the", "and", "for", "with", "that", "this", "from", "into", "when", "then", "have", "has",
    "was", "were", "will", "would", "should", "could", "about", "after", "before", "been", "are",
    "not",
];

/// Where a seed came from. Lower priority number = stronger signal; the
/// number doubles as the initial frontier priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum StartNodeSource {
    EntrySymbol,
    EntrySibling,
    EntryFirstHop,
    StackTrace,
    FailingTestPath,
    EditedFile,
    TaskText,
}

impl StartNodeSource {
    pub fn priority(self) -> u32 {
        match self {
            Self::EntrySymbol => 0,
            Self::EntrySibling => 1,
            Self::EntryFirstHop => 2,
            Self::StackTrace => 3,
            Self::FailingTestPath => 4,
            Self::EditedFile => 5,
            Self::TaskText => 6,
        }
    }

    /// Initial frontier score, already negated for the min-heap.
    pub fn initial_score(self) -> f64 {
        match self {
            Self::EntrySymbol => -1.40,
            Self::EntrySibling => -1.22,
            Self::EntryFirstHop => -1.18,
            Self::StackTrace => -1.20,
            Self::FailingTestPath => -1.10,
            Self::EditedFile => -1.00,
            Self::TaskText => -0.60,
        }
    }

    pub fn why(self) -> &'static str {
        match self {
            Self::EntrySymbol => "entry symbol",
            Self::EntrySibling => "entry sibling",
            Self::EntryFirstHop => "entry first-hop",
            Self::StackTrace => "stack trace",
            Self::FailingTestPath => "failing test",
            Self::EditedFile => "edited file",
            Self::TaskText => "task text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStartNode {
    pub symbol_id: SymbolId,
    pub source: StartNodeSource,
}

/// Seed caps derived from the card budget. Strong signals (stack trace,
/// failing test, edited files) shrink the weak-signal shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedLimits {
    pub total: usize,
    pub task_text: usize,
    pub first_hops_per_entry: usize,
    pub siblings_per_entry: usize,
}

impl SeedLimits {
    pub fn for_budget(max_cards: u32, strong_signal: bool) -> Self {
        let max_cards = max_cards as usize;
        let total = (2 * max_cards).clamp(12, 96);
        let task_text = if strong_signal {
            (max_cards / 10).max(2)
        } else {
            (max_cards / 5).max(2)
        };
        Self {
            total,
            task_text,
            first_hops_per_entry: if strong_signal {
                FIRST_HOP_LIMIT_STRONG
            } else {
                FIRST_HOP_LIMIT
            },
            siblings_per_entry: if strong_signal {
                SIBLING_LIMIT_STRONG
            } else {
                SIBLING_LIMIT
            },
        }
    }
}

/// Build the prioritized seed set from every signal the request carries.
/// A symbol reached from multiple sources keeps its strongest source.
pub fn resolve_start_nodes(
    request: &SliceRequest,
    graph: &RepoGraph,
    store: &dyn SymbolStore,
    limits: SeedLimits,
) -> Result<Vec<ResolvedStartNode>, StoreError> {
    let mut picked: BTreeMap<SymbolId, StartNodeSource> = BTreeMap::new();

    let entries = entry_symbols_in_graph(request, graph);
    for entry in &entries {
        admit(&mut picked, entry.clone(), StartNodeSource::EntrySymbol);
    }

    for entry in &entries {
        for sibling in entry_siblings(graph, entry, limits.siblings_per_entry) {
            admit(&mut picked, sibling, StartNodeSource::EntrySibling);
        }
    }

    for entry in &entries {
        for hop in entry_first_hops(graph, entry, limits.first_hops_per_entry) {
            admit(&mut picked, hop, StartNodeSource::EntryFirstHop);
        }
    }

    if let Some(trace) = request.stack_trace.as_deref() {
        let mut paths: Vec<String> = parse_stack_trace(trace)
            .into_iter()
            .map(|frame| frame.path)
            .collect();
        paths.sort();
        paths.dedup();
        for path in paths {
            for symbol_id in symbols_in_path(graph, &path) {
                admit(&mut picked, symbol_id, StartNodeSource::StackTrace);
            }
        }
    }

    if let Some(test_path) = request.failing_test_path.as_deref() {
        for symbol_id in symbols_in_path(graph, test_path) {
            admit(&mut picked, symbol_id, StartNodeSource::FailingTestPath);
        }
    }

    let mut edited = request.edited_files.clone();
    edited.sort();
    edited.dedup();
    for path in &edited {
        for symbol_id in symbols_in_path(graph, path) {
            admit(&mut picked, symbol_id, StartNodeSource::EditedFile);
        }
    }

    if let Some(task_text) = request.task_text.as_deref() {
        let mut admitted_from_text = 0usize;
        'tokens: for token in tokenize_task_text(task_text) {
            let matches =
                store.search_symbols_lite(&graph.repo_id, &token, TASK_TEXT_LOOKUP_LIMIT)?;
            for hit in matches {
                if !graph.contains(&hit.symbol_id) {
                    continue;
                }
                if admit(&mut picked, hit.symbol_id, StartNodeSource::TaskText) {
                    admitted_from_text += 1;
                    if admitted_from_text >= limits.task_text {
                        break 'tokens;
                    }
                }
            }
        }
    }

    let mut seeds: Vec<ResolvedStartNode> = picked
        .into_iter()
        .map(|(symbol_id, source)| ResolvedStartNode { symbol_id, source })
        .collect();
    seeds.sort_by(|a, b| {
        a.source
            .priority()
            .cmp(&b.source.priority())
            .then_with(|| a.symbol_id.cmp(&b.symbol_id))
    });
    seeds.truncate(limits.total);
    Ok(seeds)
}

/// Returns true only for brand-new admissions; upgrading the source of an
/// already-picked symbol does not consume a per-source slot.
fn admit(
    picked: &mut BTreeMap<SymbolId, StartNodeSource>,
    symbol_id: SymbolId,
    source: StartNodeSource,
) -> bool {
    match picked.get(&symbol_id) {
        None => {
            picked.insert(symbol_id, source);
            true
        }
        Some(existing) if source.priority() < existing.priority() => {
            picked.insert(symbol_id, source);
            false
        }
        Some(_) => false,
    }
}

fn entry_symbols_in_graph(request: &SliceRequest, graph: &RepoGraph) -> Vec<SymbolId> {
    let mut entries: Vec<SymbolId> = request
        .entry_symbols
        .iter()
        .filter(|id| graph.contains(id))
        .cloned()
        .collect();
    entries.sort();
    entries.dedup();
    entries
}

/// Same file, same kind, shared lowercase name prefix of at least
/// `SIBLING_PREFIX_MIN` characters. Ranked by prefix length, +2 if exported.
fn entry_siblings(graph: &RepoGraph, entry_id: &str, limit: usize) -> Vec<SymbolId> {
    let Some(entry) = graph.symbol(entry_id) else {
        return Vec::new();
    };
    let entry_name = entry.name.to_lowercase();

    let mut ranked: Vec<(usize, String, SymbolId)> = graph
        .symbols
        .values()
        .filter(|candidate| {
            candidate.symbol_id != entry_id
                && candidate.file_id == entry.file_id
                && candidate.kind == entry.kind
        })
        .filter_map(|candidate| {
            let prefix = shared_prefix_len(&entry_name, &candidate.name.to_lowercase());
            if prefix < SIBLING_PREFIX_MIN {
                return None;
            }
            let rank = prefix + if candidate.exported { 2 } else { 0 };
            Some((rank, candidate.name.clone(), candidate.symbol_id.clone()))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)).then_with(|| a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(_, _, id)| id).collect()
}

/// Direct call/import targets of an entry. Call edges outrank import edges;
/// exported and callable targets get a bump.
fn entry_first_hops(graph: &RepoGraph, entry_id: &str, limit: usize) -> Vec<SymbolId> {
    let mut ranked: Vec<(u32, String, SymbolId)> = Vec::new();
    let mut seen: BTreeSet<SymbolId> = BTreeSet::new();

    for edge in graph.out_edges(entry_id) {
        let base = match edge.edge_type {
            strata_core::EdgeType::Call => 4,
            strata_core::EdgeType::Import => 2,
            strata_core::EdgeType::Config => continue,
        };
        if edge.to_symbol_id == entry_id || !seen.insert(edge.to_symbol_id.clone()) {
            continue;
        }
        let Some(target) = graph.symbol(&edge.to_symbol_id) else {
            continue;
        };
        let mut rank = base;
        if target.exported {
            rank += 1;
        }
        if matches!(target.kind, SymbolKind::Function | SymbolKind::Method) {
            rank += 1;
        }
        ranked.push((rank, target.name.clone(), target.symbol_id.clone()));
    }

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)).then_with(|| a.2.cmp(&b.2)));
    ranked.into_iter().take(limit).map(|(_, _, id)| id).collect()
}

/// All symbols in files whose path matches the given path (suffix match in
/// either direction), in stable id order.
fn symbols_in_path(graph: &RepoGraph, path: &str) -> Vec<SymbolId> {
    let path = path.trim();
    if path.is_empty() {
        return Vec::new();
    }
    let file_ids: BTreeSet<&FileId> = graph
        .files
        .values()
        .filter(|file| {
            file.rel_path == path
                || file.rel_path.ends_with(path)
                || path.ends_with(file.rel_path.as_str())
        })
        .map(|file| &file.file_id)
        .collect();
    if file_ids.is_empty() {
        return Vec::new();
    }

    let mut ids: Vec<SymbolId> = graph
        .symbols
        .values()
        .filter(|symbol| file_ids.contains(&symbol.file_id))
        .map(|symbol| symbol.symbol_id.clone())
        .collect();
    ids.sort();
    ids
}

fn shared_prefix_len(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

/// Task-text tokenization. Path-ish characters (`/ . _ -`) survive the split
/// so file-like tokens can be recognized and ranked highest.
pub fn tokenize_task_text(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut unique: BTreeSet<String> = BTreeSet::new();
    for raw in lowered.split(|ch: char| !(ch.is_alphanumeric() || "/._-".contains(ch))) {
        let token = raw.trim_matches(|ch: char| "/._-".contains(ch));
        if token.len() < TASK_TEXT_TOKEN_MIN_LEN {
            continue;
        }
        if TASK_TEXT_STOP_WORDS.contains(&token) {
            continue;
        }
        if !token.chars().any(|ch| ch.is_alphabetic()) {
            continue;
        }
        unique.insert(token.to_owned());
    }

    let mut ranked: Vec<(u32, String)> = unique
        .into_iter()
        .map(|token| (task_token_rank(&token), token))
        .collect();
    ranked.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.len().cmp(&a.1.len()))
            .then_with(|| a.1.cmp(&b.1))
    });
    ranked
        .into_iter()
        .take(TASK_TEXT_MAX_TOKENS)
        .map(|(_, token)| token)
        .collect()
}

fn task_token_rank(token: &str) -> u32 {
    let mut rank = 0;
    if token.contains('/') {
        rank += 4;
    }
    if token.contains(['.', '_', '-']) {
        rank += 3;
    }
    if token.chars().any(|ch| ch.is_ascii_digit()) {
        rank += 2;
    }
    if token.len() >= 8 {
        rank += 1;
    }
    rank
}

#[cfg(test)]
mod tests {
    use strata_core::EdgeType;
    use strata_store::{MemoryStore, SymbolStoreWriter};

    use super::*;
    use crate::graph::load_repo_graph;
    use crate::testutil::{edge, file, symbol};

    fn limits() -> SeedLimits {
        SeedLimits::for_budget(30, false)
    }

    fn store_with_entry_cluster() -> MemoryStore {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/auth/login.ts")).unwrap();
        store.upsert_file(file("f2", "r1", "src/auth/session.ts")).unwrap();

        store.upsert_symbol(symbol("A", "f1", "r1", "loginUser")).unwrap();
        store.upsert_symbol(symbol("SIB", "f1", "r1", "loginAdmin")).unwrap();
        store.upsert_symbol(symbol("FAR", "f1", "r1", "render")).unwrap();
        store.upsert_symbol(symbol("HOP", "f2", "r1", "createSession")).unwrap();
        store.upsert_symbol(symbol("IMP", "f2", "r1", "sessionConfig")).unwrap();

        store.upsert_edge(edge("A", "HOP", EdgeType::Call, 1.0, None)).unwrap();
        store.upsert_edge(edge("A", "IMP", EdgeType::Import, 0.6, None)).unwrap();
        store
    }

    #[test]
    fn entry_symbols_seed_with_strongest_priority() {
        let store = store_with_entry_cluster();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let mut request = SliceRequest::new("r1", "v1");
        request.entry_symbols = vec!["A".to_owned(), "A".to_owned(), "ghost".to_owned()];

        let seeds = resolve_start_nodes(&request, &graph, &store, limits()).unwrap();
        assert_eq!(seeds[0].symbol_id, "A");
        assert_eq!(seeds[0].source, StartNodeSource::EntrySymbol);
        // Duplicate and unknown entries resolve away.
        assert_eq!(
            seeds
                .iter()
                .filter(|s| s.source == StartNodeSource::EntrySymbol)
                .count(),
            1
        );
    }

    #[test]
    fn siblings_require_shared_prefix_and_matching_kind() {
        let store = store_with_entry_cluster();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let mut request = SliceRequest::new("r1", "v1");
        request.entry_symbols = vec!["A".to_owned()];

        let seeds = resolve_start_nodes(&request, &graph, &store, limits()).unwrap();
        let siblings: Vec<&str> = seeds
            .iter()
            .filter(|s| s.source == StartNodeSource::EntrySibling)
            .map(|s| s.symbol_id.as_str())
            .collect();
        // "loginAdmin" shares the "login" prefix; "render" does not.
        assert_eq!(siblings, ["SIB"]);
    }

    #[test]
    fn first_hops_cover_call_and_import_targets() {
        let store = store_with_entry_cluster();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let mut request = SliceRequest::new("r1", "v1");
        request.entry_symbols = vec!["A".to_owned()];

        let seeds = resolve_start_nodes(&request, &graph, &store, limits()).unwrap();
        let hops: Vec<&str> = seeds
            .iter()
            .filter(|s| s.source == StartNodeSource::EntryFirstHop)
            .map(|s| s.symbol_id.as_str())
            .collect();
        assert_eq!(hops, ["HOP", "IMP"]);
    }

    #[test]
    fn dedup_keeps_the_strongest_source() {
        let store = store_with_entry_cluster();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let mut request = SliceRequest::new("r1", "v1");
        // HOP is both a first-hop of A and a task-text match.
        request.entry_symbols = vec!["A".to_owned()];
        request.task_text = Some("createSession".to_owned());

        let seeds = resolve_start_nodes(&request, &graph, &store, limits()).unwrap();
        let hop = seeds.iter().find(|s| s.symbol_id == "HOP").unwrap();
        assert_eq!(hop.source, StartNodeSource::EntryFirstHop);
    }

    #[test]
    fn stack_trace_and_edited_files_seed_by_path() {
        let store = store_with_entry_cluster();
        let graph = load_repo_graph(&store, "r1").unwrap();
        let mut request = SliceRequest::new("r1", "v1");
        request.stack_trace = Some("at createSession (src/auth/session.ts:12:1)".to_owned());
        request.edited_files = vec!["src/auth/login.ts".to_owned()];

        let seeds = resolve_start_nodes(&request, &graph, &store, limits()).unwrap();
        let by_source = |source: StartNodeSource| {
            seeds
                .iter()
                .filter(|s| s.source == source)
                .map(|s| s.symbol_id.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(by_source(StartNodeSource::StackTrace), ["HOP", "IMP"]);
        assert_eq!(by_source(StartNodeSource::EditedFile), ["A", "FAR", "SIB"]);
    }

    #[test]
    fn task_text_seeds_are_capped() {
        let store = MemoryStore::new();
        store.upsert_file(file("f1", "r1", "src/widgets.ts")).unwrap();
        for index in 0..20 {
            store
                .upsert_symbol(symbol(
                    &format!("W{index:02}"),
                    "f1",
                    "r1",
                    &format!("widgetThing{index:02}"),
                ))
                .unwrap();
        }
        let graph = load_repo_graph(&store, "r1").unwrap();
        let mut request = SliceRequest::new("r1", "v1");
        request.task_text = Some("widgetThing".to_owned());

        let limits = SeedLimits::for_budget(10, false);
        let seeds = resolve_start_nodes(&request, &graph, &store, limits).unwrap();
        assert!(seeds.len() <= limits.task_text);
        assert!(seeds.iter().all(|s| s.source == StartNodeSource::TaskText));
    }

    #[test]
    fn seed_limits_scale_with_budget_and_tighten_under_strong_signals() {
        let relaxed = SeedLimits::for_budget(30, false);
        assert_eq!(relaxed.total, 60);
        assert_eq!(relaxed.task_text, 6);
        assert_eq!(relaxed.first_hops_per_entry, FIRST_HOP_LIMIT);

        let strong = SeedLimits::for_budget(30, true);
        assert_eq!(strong.task_text, 3);
        assert_eq!(strong.first_hops_per_entry, FIRST_HOP_LIMIT_STRONG);
        assert_eq!(strong.siblings_per_entry, SIBLING_LIMIT_STRONG);

        assert_eq!(SeedLimits::for_budget(2, false).total, 12);
        assert_eq!(SeedLimits::for_budget(500, false).total, 96);
        assert_eq!(SeedLimits::for_budget(4, false).task_text, 2);
    }

    #[test]
    fn task_text_tokenizer_ranks_pathlike_tokens_first() {
        let tokens = tokenize_task_text(
            "Fix the crash in src/auth/login.ts when login_v2 retries after 404 and the token expires",
        );
        assert_eq!(tokens[0], "src/auth/login.ts");
        assert_eq!(tokens[1], "login_v2");
        assert!(tokens.contains(&"crash".to_owned()));
        // Stop words, short tokens, and digit-only tokens are gone.
        assert!(!tokens.iter().any(|t| t == "the" || t == "in" || t == "404"));
        assert!(tokens.len() <= TASK_TEXT_MAX_TOKENS);
    }
}
