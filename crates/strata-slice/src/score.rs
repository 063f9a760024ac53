use strata_core::{FileRecord, Symbol, SymbolKind, SymbolMetrics};

pub const QUERY_WEIGHT: f64 = 0.40;
pub const STACKTRACE_WEIGHT: f64 = 0.20;
pub const STRUCTURE_WEIGHT: f64 = 0.15;
pub const KIND_WEIGHT: f64 = 0.10;
pub const HOTNESS_WEIGHT: f64 = 0.15;

const QUERY_EXACT_MATCH: f64 = 1.25;
const QUERY_PREFIX_MATCH: f64 = 1.0;
const QUERY_SUBSTRING_MATCH: f64 = 0.75;
const QUERY_PATH_MATCH: f64 = 0.4;

const STRUCTURE_TEST_PENALTY: f64 = 0.55;
const STRUCTURE_GENERATED_PENALTY: f64 = 0.6;
const STRUCTURE_SCRIPTS_PENALTY: f64 = 0.75;
const STRUCTURE_AGGREGATOR_PENALTY: f64 = 0.72;
const STRUCTURE_FLOOR: f64 = 0.15;

const AGGREGATOR_STEMS: [&str; 7] = ["index", "tools", "util", "utils", "main", "mod", "types"];

const HOTNESS_FAN_IN_BASE: f64 = 101.0;
const HOTNESS_FAN_OUT_BASE: f64 = 51.0;
const HOTNESS_CHURN_NORM: f64 = 20.0;

/// One parsed stack-trace frame: a file path and, when present, a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub path: String,
    pub line: Option<u32>,
}

/// Pre-resolved task context the scorer reads. Built once per request so the
/// hot loop does no tokenization or store lookups.
#[derive(Debug, Clone, Default)]
pub struct ScoreContext {
    pub query_tokens: Vec<String>,
    pub frames: Vec<StackFrame>,
}

impl ScoreContext {
    pub fn new(task_text: Option<&str>, stack_trace: Option<&str>) -> Self {
        Self {
            query_tokens: task_text.map(query_tokens).unwrap_or_default(),
            frames: stack_trace.map(parse_stack_trace).unwrap_or_default(),
        }
    }
}

/// Scorer query tokenization: lowercase, split on non-alphanumerics.
pub fn query_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
        .collect();
    tokens.dedup();
    tokens
}

/// Tolerant stack-trace parsing: any whitespace- or paren-delimited token of
/// the form `path:line[:col]` where the path contains a separator.
pub fn parse_stack_trace(trace: &str) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    for line in trace.lines() {
        for raw in line.split(|ch: char| ch.is_whitespace() || ch == '(' || ch == ')') {
            let token = raw.trim_matches(|ch: char| ch == ',' || ch == '"' || ch == '\'');
            if !token.contains(':') || !(token.contains('/') || token.contains('.')) {
                continue;
            }
            let mut parts = token.split(':');
            let Some(path) = parts.next().filter(|p| !p.is_empty()) else {
                continue;
            };
            let line_no = parts.next().and_then(|p| p.parse::<u32>().ok());
            frames.push(StackFrame {
                path: path.to_owned(),
                line: line_no,
            });
        }
    }
    frames
}

/// Relevance of one symbol against the task context, in [0, 1].
///
/// Pure in its inputs: file and metrics are pre-fetched by the caller.
pub fn score_symbol(
    symbol: &Symbol,
    file: Option<&FileRecord>,
    metrics: Option<&SymbolMetrics>,
    ctx: &ScoreContext,
) -> f64 {
    let rel_path = file.map(|f| f.rel_path.as_str()).unwrap_or("");
    let score = QUERY_WEIGHT * query_overlap_factor(symbol, rel_path, &ctx.query_tokens)
        + STACKTRACE_WEIGHT * stack_trace_factor(symbol, rel_path, &ctx.frames)
        + STRUCTURE_WEIGHT * structure_factor(rel_path)
        + KIND_WEIGHT * kind_factor(symbol.kind)
        + HOTNESS_WEIGHT * hotness_factor(metrics);
    score.clamp(0.0, 1.0)
}

fn query_overlap_factor(symbol: &Symbol, rel_path: &str, tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let name = symbol.name.to_lowercase();
    let path = rel_path.to_lowercase();

    let mut total = 0.0;
    for token in tokens {
        let name_score = if name == *token {
            QUERY_EXACT_MATCH
        } else if name.starts_with(token.as_str()) {
            QUERY_PREFIX_MATCH
        } else if name.contains(token.as_str()) {
            QUERY_SUBSTRING_MATCH
        } else {
            0.0
        };
        let path_score = if !path.is_empty() && path.contains(token.as_str()) {
            QUERY_PATH_MATCH
        } else {
            0.0
        };
        total += name_score + path_score;
    }
    (total / tokens.len() as f64).min(1.0)
}

fn stack_trace_factor(symbol: &Symbol, rel_path: &str, frames: &[StackFrame]) -> f64 {
    if rel_path.is_empty() {
        return 0.0;
    }
    let mut best = 0.0f64;
    for frame in frames {
        if !paths_match(rel_path, &frame.path) {
            continue;
        }
        let hit = match frame.line {
            Some(line) if symbol.range.contains_line(line) => 1.0,
            _ => 0.5,
        };
        best = best.max(hit);
        if best == 1.0 {
            break;
        }
    }
    best
}

fn paths_match(rel_path: &str, frame_path: &str) -> bool {
    rel_path == frame_path || rel_path.ends_with(frame_path) || frame_path.ends_with(rel_path)
}

fn structure_factor(rel_path: &str) -> f64 {
    if rel_path.is_empty() {
        return 1.0;
    }
    let path = rel_path.to_lowercase();
    let mut factor = 1.0;

    if path.contains("test") || path.contains(".spec.") {
        factor *= STRUCTURE_TEST_PENALTY;
    }
    if path.contains("dist/") || path.contains("generated") || path.contains("build/") {
        factor *= STRUCTURE_GENERATED_PENALTY;
    }
    if path.contains("scripts/") {
        factor *= STRUCTURE_SCRIPTS_PENALTY;
    }
    if AGGREGATOR_STEMS.contains(&file_stem(&path)) {
        factor *= STRUCTURE_AGGREGATOR_PENALTY;
    }

    factor.clamp(STRUCTURE_FLOOR, 1.0)
}

fn file_stem(path: &str) -> &str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.split('.').next().unwrap_or(file_name)
}

fn kind_factor(kind: SymbolKind) -> f64 {
    match kind {
        SymbolKind::Class => 1.0,
        SymbolKind::Function => 0.98,
        SymbolKind::Method => 0.95,
        SymbolKind::Interface => 0.9,
        SymbolKind::Type => 0.88,
        SymbolKind::Constructor => 0.8,
        SymbolKind::Module => 0.7,
        SymbolKind::Variable => 0.55,
    }
}

fn hotness_factor(metrics: Option<&SymbolMetrics>) -> f64 {
    let Some(metrics) = metrics else {
        return 0.0;
    };
    let fan_in = (f64::from(metrics.fan_in) + 1.0).ln() / HOTNESS_FAN_IN_BASE.ln();
    let fan_out = (f64::from(metrics.fan_out) + 1.0).ln() / HOTNESS_FAN_OUT_BASE.ln();
    let churn = (f64::from(metrics.churn_30d) / HOTNESS_CHURN_NORM).min(1.0);
    0.5 * fan_in.clamp(0.0, 1.0) + 0.3 * fan_out.clamp(0.0, 1.0) + 0.2 * churn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{file, symbol};

    fn ctx(task: &str) -> ScoreContext {
        ScoreContext::new(Some(task), None)
    }

    #[test]
    fn name_match_tiers_order_exact_above_substring_above_none() {
        // Per-token contributions are capped at 1.0 after averaging, so
        // exact and prefix tie under a single token; substring stays below.
        let exact = symbol("A", "f1", "r1", "login");
        let partial = symbol("B", "f1", "r1", "autoLogin");
        let other = symbol("C", "f1", "r1", "render");
        let f = file("f1", "r1", "src/core/auth.ts");
        let context = ctx("login");

        let exact_score = score_symbol(&exact, Some(&f), None, &context);
        let substring_score = score_symbol(&partial, Some(&f), None, &context);
        let none_score = score_symbol(&other, Some(&f), None, &context);
        assert!(exact_score > substring_score);
        assert!(substring_score > none_score);
    }

    #[test]
    fn path_substring_contributes_when_name_does_not_match() {
        let s = symbol("A", "f1", "r1", "render");
        let on_path = file("f1", "r1", "src/auth/session.ts");
        let off_path = file("f1", "r1", "src/ui/button.ts");
        let context = ctx("auth");

        let on = score_symbol(&s, Some(&on_path), None, &context);
        let off = score_symbol(&s, Some(&off_path), None, &context);
        assert!(on > off);
    }

    #[test]
    fn stack_trace_line_hit_beats_file_only_hit() {
        let mut s = symbol("A", "f1", "r1", "handle");
        s.range.start_line = 10;
        s.range.end_line = 30;
        let f = file("f1", "r1", "src/auth/session.ts");

        let line_hit =
            ScoreContext::new(None, Some("at handle (src/auth/session.ts:12:3)"));
        let file_hit =
            ScoreContext::new(None, Some("at handle (src/auth/session.ts:99:1)"));
        let miss = ScoreContext::new(None, Some("at other (src/ui/button.ts:12:3)"));

        let a = score_symbol(&s, Some(&f), None, &line_hit);
        let b = score_symbol(&s, Some(&f), None, &file_hit);
        let c = score_symbol(&s, Some(&f), None, &miss);
        assert!(a > b);
        assert!(b > c);
        assert!((a - c - STACKTRACE_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn structural_penalties_demote_tests_and_aggregators() {
        let s = symbol("A", "f1", "r1", "helper");
        let core = file("f1", "r1", "src/auth/session.ts");
        let tests = file("f1", "r1", "src/auth/__tests__/session.ts");
        let aggregator = file("f1", "r1", "src/auth/index.ts");
        let context = ScoreContext::default();

        let core_score = score_symbol(&s, Some(&core), None, &context);
        let test_score = score_symbol(&s, Some(&tests), None, &context);
        let index_score = score_symbol(&s, Some(&aggregator), None, &context);
        assert!(core_score > test_score);
        assert!(core_score > index_score);
        assert!(index_score > test_score);
    }

    #[test]
    fn kind_table_orders_classes_above_variables() {
        let f = file("f1", "r1", "src/a.ts");
        let mut class_symbol = symbol("A", "f1", "r1", "Thing");
        class_symbol.kind = strata_core::SymbolKind::Class;
        let mut variable_symbol = symbol("B", "f1", "r1", "thing");
        variable_symbol.kind = strata_core::SymbolKind::Variable;
        let context = ScoreContext::default();

        assert!(
            score_symbol(&class_symbol, Some(&f), None, &context)
                > score_symbol(&variable_symbol, Some(&f), None, &context)
        );
    }

    #[test]
    fn hotness_saturates_and_stays_within_weight() {
        let s = symbol("A", "f1", "r1", "hot");
        let f = file("f1", "r1", "src/a.ts");
        let hot = SymbolMetrics {
            fan_in: 100,
            fan_out: 50,
            churn_30d: 200,
            test_refs: Vec::new(),
        };
        let context = ScoreContext::default();

        let without = score_symbol(&s, Some(&f), None, &context);
        let with = score_symbol(&s, Some(&f), Some(&hot), &context);
        assert!(with > without);
        assert!(with - without <= HOTNESS_WEIGHT + 1e-9);
    }

    #[test]
    fn score_is_always_in_unit_interval() {
        let mut s = symbol("A", "f1", "r1", "login");
        s.kind = strata_core::SymbolKind::Class;
        s.range.start_line = 1;
        s.range.end_line = 100;
        let f = file("f1", "r1", "src/auth/login.ts");
        let metrics = SymbolMetrics {
            fan_in: 1000,
            fan_out: 1000,
            churn_30d: 1000,
            test_refs: Vec::new(),
        };
        let context = ScoreContext::new(
            Some("login auth login.ts"),
            Some("at login (src/auth/login.ts:10:1)"),
        );

        let score = score_symbol(&s, Some(&f), Some(&metrics), &context);
        assert!((0.0..=1.0).contains(&score));
        assert!(score > 0.9);
    }

    #[test]
    fn stack_trace_parser_extracts_paths_and_lines() {
        let frames = parse_stack_trace(
            "Error: boom\n    at login (src/auth/login.ts:42:7)\n    at src/app.ts:7\n",
        );
        assert_eq!(
            frames,
            vec![
                StackFrame {
                    path: "src/auth/login.ts".to_owned(),
                    line: Some(42)
                },
                StackFrame {
                    path: "src/app.ts".to_owned(),
                    line: Some(7)
                },
            ]
        );
    }
}
