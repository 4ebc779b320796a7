//! Token feedback: lifecycle events the submitting application must reconcile.

use serde::{Deserialize, Serialize};

use super::ids::ServiceId;

/// Why a token is being reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackReason {
    /// The destination no longer exists.
    Invalid,
    /// The provider delivered under a new token; callers should store it.
    Replaced,
}

/// One feedback record. Field order matches the wire shape:
/// `{"service", "token", "replacement_token"?, "reason"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenFeedback {
    pub service: ServiceId,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_token: Option<String>,
    pub reason: FeedbackReason,
}

impl TokenFeedback {
    pub fn invalid(service: ServiceId, token: impl Into<String>) -> Self {
        Self {
            service,
            token: token.into(),
            replacement_token: None,
            reason: FeedbackReason::Invalid,
        }
    }

    pub fn replaced(
        service: ServiceId,
        token: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            service,
            token: token.into(),
            replacement_token: Some(replacement.into()),
            reason: FeedbackReason::Replaced,
        }
    }
}
