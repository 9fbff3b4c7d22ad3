//! Error types for the viewer core
//!
//! Each error kind has a fixed display scope: route and bundle errors take
//! over the whole view, resolution errors stay inside one set card, and
//! telemetry errors never leave a local log line or passive toast.

use thiserror::Error;

/// Where an error is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Full-page error state
    FullView,
    /// Inline state on the single question-set card
    SetCard,
    /// Logged, at most a passive toast
    Passive,
}

/// Viewer core error
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Route parameters do not name a well-formed entity
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Aggregated bundle could not be fetched or decoded
    #[error("Aggregation failed: {0}")]
    AggregationFailed(String),

    /// All question sources failed or returned nothing for a set
    #[error("No questions available for set {set_id}")]
    ResolutionExhausted { set_id: String },

    /// Telemetry delivery failed
    #[error("Telemetry failed: {0}")]
    TelemetryFailed(String),

    /// mav-common error
    #[error("Common error: {0}")]
    Common(#[from] mav_common::Error),
}

impl ViewerError {
    pub fn scope(&self) -> ErrorScope {
        match self {
            ViewerError::InvalidReference(_)
            | ViewerError::AggregationFailed(_)
            | ViewerError::Common(_) => ErrorScope::FullView,
            ViewerError::ResolutionExhausted { .. } => ErrorScope::SetCard,
            ViewerError::TelemetryFailed(_) => ErrorScope::Passive,
        }
    }

    /// Whether the view offers a retry action
    ///
    /// A malformed route stays malformed, so it is the only kind without one.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ViewerError::InvalidReference(_))
    }
}

/// Result type for viewer core operations
pub type ViewerResult<T> = Result<T, ViewerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes() {
        assert_eq!(
            ViewerError::InvalidReference("x".into()).scope(),
            ErrorScope::FullView
        );
        assert_eq!(
            ViewerError::AggregationFailed("x".into()).scope(),
            ErrorScope::FullView
        );
        assert_eq!(
            ViewerError::ResolutionExhausted { set_id: "s1".into() }.scope(),
            ErrorScope::SetCard
        );
        assert_eq!(
            ViewerError::TelemetryFailed("x".into()).scope(),
            ErrorScope::Passive
        );
    }

    #[test]
    fn test_only_invalid_reference_is_terminal() {
        assert!(!ViewerError::InvalidReference("x".into()).is_retryable());
        assert!(ViewerError::AggregationFailed("x".into()).is_retryable());
        assert!(ViewerError::ResolutionExhausted { set_id: "s1".into() }.is_retryable());
    }

    #[test]
    fn test_display_carries_original_message() {
        let err = ViewerError::AggregationFailed("HTTP 502: bad gateway".into());
        assert_eq!(err.to_string(), "Aggregation failed: HTTP 502: bad gateway");
    }
}
