//! Error types for the tribunal crate.
//!
//! Errors are split by how the session reacts to them:
//!
//! - [`TribunalError`]: configuration and lifecycle errors. These are fatal for
//!   the call that raised them and are never retried.
//! - [`ServiceError`]: failures of the generative content service. These are
//!   always recovered locally by the caller (logged, then degraded to a
//!   fallback such as a deterministic speaker choice or an empty draft).
//! - [`ChannelError`]: failures of a persona's output channel.

use std::time::Duration;

use thiserror::Error;

use crate::persona::PersonaId;

/// Configuration and lifecycle errors.
#[derive(Debug, Error)]
pub enum TribunalError {
    /// Two personas in the same case share an id.
    #[error("Duplicate persona id {0} in case")]
    DuplicatePersona(PersonaId),

    /// Two evidence items in the same case share an id.
    #[error("Duplicate evidence id {0} in case")]
    DuplicateEvidence(u32),

    /// The referenced persona is not part of the case.
    #[error("Unknown persona id {0}")]
    UnknownPersona(PersonaId),

    /// The preset catalog has no unclaimed, assignable preset left.
    #[error("No assignable preset left in the catalog for persona {persona} ({name})")]
    NoPresetAvailable { persona: PersonaId, name: String },

    /// A persona was asked to act before an output channel was bound to it.
    #[error("Persona {0} is not bound to an output channel")]
    PersonaUnbound(PersonaId),

    /// A beat loop is already running for this session.
    #[error("A beat is already in progress for this session")]
    BeatInProgress,

    /// A prompt template failed to render.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// The preset catalog could not be loaded.
    #[error("Failed to load preset catalog: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// Errors that can occur while calling the generative content service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service ran but reported a failure.
    #[error("Generation failed: {0}")]
    ExecutionFailed(String),

    /// The service output could not be turned into the expected structure.
    #[error("Failed to parse service output: {0}")]
    ParseError(String),

    /// The transport to the service failed.
    #[error("Process error: {0}")]
    ProcessError(String),

    /// I/O error while talking to the service.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A generic error for other cases.
    #[error("Service error: {0}")]
    Other(String),
}

impl ServiceError {
    /// Check if this error should trigger an automatic retry.
    ///
    /// Malformed output and transport failures are worth another attempt.
    /// Logical failures reported by the service and unknown errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::ParseError(_) | ServiceError::ProcessError(_) | ServiceError::IoError(_)
        )
    }

    /// Base delay before the given retry attempt (1-indexed).
    ///
    /// Exponential in the attempt number, capped at 8 seconds. Jitter is
    /// added by the retry loop.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let base_ms: u64 = match self {
            ServiceError::ParseError(_) => 100,
            _ => 500,
        };
        let factor = 1u64 << attempt.saturating_sub(1).min(4);
        Duration::from_millis((base_ms * factor).min(8_000))
    }
}

/// Errors raised by an output channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The receiving side of the channel is gone.
    #[error("Output channel closed")]
    Closed,

    /// The transport refused the command.
    #[error("Output channel rejected command: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_parse_error() {
        let err = ServiceError::ParseError("malformed JSON".to_string());
        assert!(
            err.is_retryable(),
            "ParseError should be retryable (LLM output might be malformed)"
        );
    }

    #[test]
    fn test_is_retryable_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(ServiceError::IoError(io_err).is_retryable());
    }

    #[test]
    fn test_is_not_retryable_execution_failed() {
        let err = ServiceError::ExecutionFailed("refused to answer".to_string());
        assert!(!err.is_retryable());
        assert!(!ServiceError::Other("unknown".to_string()).is_retryable());
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let err = ServiceError::ProcessError("timeout".to_string());
        assert_eq!(err.retry_delay(1), Duration::from_millis(500));
        assert_eq!(err.retry_delay(2), Duration::from_millis(1_000));
        assert_eq!(err.retry_delay(3), Duration::from_millis(2_000));
        assert_eq!(err.retry_delay(30), Duration::from_millis(8_000));
    }

    #[test]
    fn test_unbound_message_names_persona() {
        let err = TribunalError::PersonaUnbound(7);
        assert_eq!(err.to_string(), "Persona 7 is not bound to an output channel");
    }
}
