use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use strata_config::StrataConfig;
use strata_core::SymbolId;
use strata_store::SymbolStore;

use crate::CancelFlag;
use crate::beam::{BeamParams, run_beam_search};
use crate::cache::{CacheStats, SliceCache, request_fingerprint};
use crate::card::{build_payload_cards_and_refs, build_symbol_card, pick_adaptive_level, to_wire_card};
use crate::error::SliceError;
use crate::graph::{RepoGraph, load_repo_graph};
use crate::request::{SliceBudget, SliceRequest};
use crate::score::ScoreContext;
use crate::seed::{SeedLimits, resolve_start_nodes};
use crate::wire::{
    GraphSlice, HowToResume, SliceSymbolCard, SliceTruncation, encode_edges_with_symbol_index,
};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

/// Decision from the external policy collaborator. Evaluation itself lives
/// outside the core; the orchestrator only consumes the verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny {
        reason: String,
        next_best_action: Option<String>,
    },
}

pub trait SlicePolicy: Send + Sync {
    fn evaluate(&self, request: &SliceRequest) -> PolicyDecision;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllPolicy;

impl SlicePolicy for AllowAllPolicy {
    fn evaluate(&self, _request: &SliceRequest) -> PolicyDecision {
        PolicyDecision::Allow
    }
}

/// Per-build options that are not part of the request identity (and thus
/// never part of the cache key).
#[derive(Debug, Clone, Default)]
pub struct SliceOptions {
    pub cancel: Option<CancelFlag>,
}

/// Composes the slice pipeline: cache, graph snapshots, seeding, beam,
/// serialization. One instance serves concurrent builds; per-build state
/// never leaves the call.
pub struct SliceService {
    store: Arc<dyn SymbolStore>,
    config: StrataConfig,
    policy: Arc<dyn SlicePolicy>,
    cache: SliceCache,
    snapshots: RwLock<HashMap<String, (String, Arc<RepoGraph>)>>,
}

impl SliceService {
    pub fn new(store: Arc<dyn SymbolStore>, config: StrataConfig) -> Self {
        let cache = SliceCache::new(&config.cache);
        Self {
            store,
            config,
            policy: Arc::new(AllowAllPolicy),
            cache,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn SlicePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub async fn build_slice(
        &self,
        request: SliceRequest,
    ) -> Result<Arc<GraphSlice>, SliceError> {
        self.build_slice_with_options(request, SliceOptions::default())
            .await
    }

    pub async fn build_slice_with_options(
        &self,
        request: SliceRequest,
        options: SliceOptions,
    ) -> Result<Arc<GraphSlice>, SliceError> {
        let cancel = options.cancel;
        check_cancelled(cancel.as_ref())?;

        if let PolicyDecision::Deny {
            reason,
            next_best_action,
        } = self.policy.evaluate(&request)
        {
            return Err(SliceError::PolicyDenied {
                reason,
                next_best_action,
            });
        }

        let Some(ledger) = self.store.latest_version(&request.repo_id)? else {
            let files = self.store.files_by_repo_lite(&request.repo_id)?;
            return Err(if files.is_empty() {
                SliceError::InvalidRepo {
                    repo_id: request.repo_id.clone(),
                }
            } else {
                SliceError::NoVersion {
                    repo_id: request.repo_id.clone(),
                }
            });
        };

        let budget = self.clamp_budget(request.budget);
        let card_detail = request.card_detail.unwrap_or_default();
        let min_confidence = request
            .min_confidence
            .unwrap_or(DEFAULT_MIN_CONFIDENCE)
            .clamp(0.0, 1.0);

        let fingerprint = request_fingerprint(&request, budget, card_detail, min_confidence);
        if let Some(hit) = self.cache.get(&fingerprint) {
            tracing::debug!(repo_id = %request.repo_id, "slice cache hit");
            return Ok(hit);
        }

        // Store boundary: pin (or load) the graph snapshot for this version.
        tokio::task::yield_now().await;
        check_cancelled(cancel.as_ref())?;
        let graph = self.pinned_graph(&request.repo_id, &ledger.version_id)?;
        if graph.is_empty() {
            return Err(SliceError::NoSymbols);
        }

        let entry_symbols: BTreeSet<SymbolId> = request
            .entry_symbols
            .iter()
            .filter(|id| graph.contains(id))
            .cloned()
            .collect();
        if !request.entry_symbols.is_empty() && entry_symbols.is_empty() {
            return Err(SliceError::NoSymbols);
        }

        // Store boundary: seeding may issue token searches.
        tokio::task::yield_now().await;
        check_cancelled(cancel.as_ref())?;
        let limits = SeedLimits::for_budget(budget.max_cards, request.has_strong_signal());
        let seeds = resolve_start_nodes(&request, &graph, self.store.as_ref(), limits)?;

        let ctx = ScoreContext::new(request.task_text.as_deref(), request.stack_trace.as_deref());
        let deadline =
            Instant::now() + Duration::from_millis(self.config.slice.timeout_ms);
        let params = BeamParams {
            graph: &graph,
            ctx: &ctx,
            config: &self.config.slice,
            budget,
            min_confidence,
            entry_symbols: &entry_symbols,
            deadline: Some(deadline),
            cancel: cancel.as_ref(),
        };
        let outcome = run_beam_search(&params, &seeds)?;

        let encoded = encode_edges_with_symbol_index(&graph, &outcome.admitted_set);

        // Entry cards keep the requested level; the rest may degrade to fit
        // the token budget.
        let adaptive_level = pick_adaptive_level(
            card_detail,
            budget.max_estimated_tokens,
            outcome.admitted.len(),
        );
        let mut wire_cards: Vec<SliceSymbolCard> = Vec::with_capacity(encoded.symbol_index.len());
        for symbol_id in &encoded.symbol_index {
            let Some(card) = build_symbol_card(&graph, symbol_id, &ledger.version_id) else {
                continue;
            };
            let level = if entry_symbols.contains(symbol_id) {
                card_detail
            } else {
                adaptive_level
            };
            wire_cards.push(to_wire_card(&card, level));
        }

        let (cards, refs) =
            build_payload_cards_and_refs(wire_cards, request.known_card_etags.as_ref());
        let card_refs = request.known_card_etags.as_ref().map(|_| refs);

        let (frontier, truncation) = if outcome.truncated {
            (
                Some(outcome.suggestions.clone()),
                Some(SliceTruncation {
                    truncated: true,
                    dropped_cards: outcome.dropped_candidates,
                    dropped_edges: encoded.dropped_edges,
                    how_to_resume: HowToResume::token_hint(outcome.total_tokens),
                }),
            )
        } else {
            (None, None)
        };

        tracing::info!(
            repo_id = %request.repo_id,
            cards = cards.len(),
            edges = encoded.edges.len(),
            estimated_tokens = outcome.total_tokens,
            truncated = outcome.truncated,
            "built slice"
        );

        let slice = Arc::new(GraphSlice {
            repo_id: request.repo_id.clone(),
            version_id: request.version_id.clone(),
            budget,
            start_symbols: seeds,
            symbol_index: encoded.symbol_index,
            cards,
            card_refs,
            edges: encoded.edges,
            estimated_tokens: outcome.total_tokens,
            frontier,
            truncation,
        });

        self.cache.insert(fingerprint, Arc::clone(&slice));
        Ok(slice)
    }

    fn clamp_budget(&self, requested: Option<SliceBudget>) -> SliceBudget {
        let slice_config = &self.config.slice;
        let requested = requested.unwrap_or(SliceBudget {
            max_cards: slice_config.default_max_cards,
            max_estimated_tokens: slice_config.default_max_tokens,
        });
        let clamped = SliceBudget {
            max_cards: requested.max_cards.clamp(1, slice_config.max_cards_cap),
            max_estimated_tokens: requested
                .max_estimated_tokens
                .clamp(1, slice_config.max_tokens_cap),
        };
        if clamped != requested {
            tracing::warn!(
                requested_cards = requested.max_cards,
                requested_tokens = requested.max_estimated_tokens,
                max_cards = clamped.max_cards,
                max_tokens = clamped.max_estimated_tokens,
                "slice budget clamped to policy caps"
            );
        }
        clamped
    }

    /// Shared read-only snapshot per repo. A new ledger version installs a
    /// fresh snapshot atomically; builds already holding the old `Arc` keep
    /// using it.
    fn pinned_graph(
        &self,
        repo_id: &str,
        version_id: &str,
    ) -> Result<Arc<RepoGraph>, SliceError> {
        {
            let snapshots = read_lock(&self.snapshots);
            if let Some((pinned_version, graph)) = snapshots.get(repo_id) {
                if pinned_version == version_id {
                    return Ok(Arc::clone(graph));
                }
            }
        }

        let graph = Arc::new(load_repo_graph(self.store.as_ref(), repo_id)?);
        let mut snapshots = write_lock(&self.snapshots);
        snapshots.insert(
            repo_id.to_owned(),
            (version_id.to_owned(), Arc::clone(&graph)),
        );
        Ok(graph)
    }
}

fn check_cancelled(cancel: Option<&CancelFlag>) -> Result<(), SliceError> {
    if cancel.is_some_and(CancelFlag::is_cancelled) {
        Err(SliceError::Cancelled)
    } else {
        Ok(())
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
