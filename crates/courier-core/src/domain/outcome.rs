//! Outcome model: what a push backend reports for one send.

use std::fmt;

/// Result of a single `PushBackend::send` call.
///
/// - `Delivered`: terminal success.
/// - `InvalidToken`: terminal, the destination is gone (feedback: invalid).
/// - `TokenReplaced`: terminal, delivered under a provider-issued token (feedback: replaced).
/// - `TransientFailure`: retryable (timeout, rate limit, 5xx).
/// - `PermanentFailure`: terminal, dropped without feedback.
///
/// Failure reasons are diagnostic text for logs only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    InvalidToken,
    TokenReplaced(String),
    TransientFailure(String),
    PermanentFailure(String),
}

impl DeliveryOutcome {
    pub fn transient(reason: impl Into<String>) -> Self {
        Self::TransientFailure(reason.into())
    }

    pub fn permanent(reason: impl Into<String>) -> Self {
        Self::PermanentFailure(reason.into())
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => f.write_str("delivered"),
            Self::InvalidToken => f.write_str("invalid token"),
            Self::TokenReplaced(_) => f.write_str("token replaced"),
            Self::TransientFailure(reason) => write!(f, "transient failure: {reason}"),
            Self::PermanentFailure(reason) => write!(f, "permanent failure: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let o = DeliveryOutcome::transient("rate limited");
        assert_eq!(o.to_string(), "transient failure: rate limited");
    }
}
