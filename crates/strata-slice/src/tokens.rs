use strata_core::Symbol;

/// Flat cost every card pays (identity, path, range, framing).
pub const SYMBOL_TOKEN_BASE: u32 = 18;
/// Ceiling for a single card's estimate.
pub const SYMBOL_TOKEN_MAX: u32 = 320;
/// Summary characters counted before the cap kicks in.
pub const SUMMARY_TOKEN_CHAR_CAP: usize = 280;
/// Cost per outgoing dependency entry.
pub const DEP_TOKEN_COST: u32 = 5;

const CHARS_PER_TOKEN: usize = 4;

/// Estimate the wire-token footprint of one symbol's card. The beam uses
/// this for admission; the orchestrator reports the same numbers so the
/// token invariant holds by construction.
pub fn estimate_card_tokens(symbol: &Symbol, out_degree: usize) -> u32 {
    let name = (symbol.name.len() / CHARS_PER_TOKEN) as u32;
    let signature = symbol
        .signature
        .as_ref()
        .map_or(0, |sig| (sig.approx_len() / CHARS_PER_TOKEN) as u32);
    let summary = symbol
        .summary
        .as_deref()
        .map_or(0, |s| (s.len().min(SUMMARY_TOKEN_CHAR_CAP) / CHARS_PER_TOKEN) as u32);
    let deps = DEP_TOKEN_COST * out_degree as u32;

    (SYMBOL_TOKEN_BASE + name + signature + summary + deps).min(SYMBOL_TOKEN_MAX)
}
