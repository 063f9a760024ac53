use thiserror::Error;

/// Tagged slice failure taxonomy. Budget-triggered truncation is not an
/// error; it surfaces as `GraphSlice::truncation` on a well-formed slice.
#[derive(Debug, Error)]
pub enum SliceError {
    #[error("repo '{repo_id}' is not registered")]
    InvalidRepo { repo_id: String },
    #[error("repo '{repo_id}' has no version ledger entry; trigger indexing first")]
    NoVersion { repo_id: String },
    #[error("no symbols available for this request")]
    NoSymbols,
    #[error("request denied by policy: {reason}")]
    PolicyDenied {
        reason: String,
        next_best_action: Option<String>,
    },
    #[error("slice build was cancelled")]
    Cancelled,
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl SliceError {
    /// Short wire code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRepo { .. } => "INVALID_REPO",
            Self::NoVersion { .. } => "NO_VERSION",
            Self::NoSymbols => "NO_SYMBOLS",
            Self::PolicyDenied { .. } => "POLICY_DENIED",
            Self::Cancelled => "CANCELLED",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }
}

impl From<strata_store::StoreError> for SliceError {
    fn from(error: strata_store::StoreError) -> Self {
        Self::Internal {
            message: "store lookup failed".to_owned(),
            source: Some(Box::new(error)),
        }
    }
}
