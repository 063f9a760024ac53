use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_core::DetailLevel;

/// A slice request as received from an external consumer.
///
/// `known_card_etags` distinguishes "not supplied" (`None`) from "supplied
/// but empty": the former yields cards only, the latter yields refs next to
/// every emitted card so the caller can refresh its etag set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceRequest {
    pub repo_id: String,
    pub version_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_test_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edited_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry_symbols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_card_etags: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_detail: Option<DetailLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<SliceBudget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
}

impl SliceRequest {
    pub fn new(repo_id: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            version_id: version_id.into(),
            task_text: None,
            stack_trace: None,
            failing_test_path: None,
            edited_files: Vec::new(),
            entry_symbols: Vec::new(),
            known_card_etags: None,
            card_detail: None,
            budget: None,
            min_confidence: None,
        }
    }

    /// A strong signal narrows how many weak (task-text) seeds are worth
    /// spending slots on.
    pub fn has_strong_signal(&self) -> bool {
        self.stack_trace.as_deref().is_some_and(|s| !s.trim().is_empty())
            || self
                .failing_test_path
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
            || !self.edited_files.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceBudget {
    pub max_cards: u32,
    pub max_estimated_tokens: u32,
}
