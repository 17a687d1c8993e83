//! Error taxonomy for the pipeline.
//!
//! A small sum of kinds with `is_transient` / `is_permanent` projections; the
//! worker retry loop and the marker cleanup strategy branch on these, never on
//! error text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input (config, request body, bad argument). Never retried.
    #[error("validation: {0}")]
    Validation(String),

    /// Upstream rejected credentials (401/403). Permanent.
    #[error("auth: {0}")]
    Auth(String),

    /// Document or collection missing. Permanent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network error, timeout, 429, or upstream 5xx. Retried with backoff.
    #[error("transient upstream: {0}")]
    Transient(String),

    /// AI response violated the expected schema (or named an unknown
    /// collection). Transient for one retry, then treated as invalid input.
    #[error("invalid AI response: {0}")]
    InvalidAiResponse(String),

    /// Non-blocking submit found the queue full.
    #[error("queue full")]
    QueueFull,

    /// Persistence failure.
    #[error("storage: {0}")]
    Storage(String),

    /// Root context cancelled mid-operation.
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Whether the worker retry loop should try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::InvalidAiResponse(_) | Error::Storage(_)
        )
    }

    /// Whether the failure can never succeed on retry. Drives the
    /// remove-marker-and-comment cleanup path.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::Auth(_) | Error::NotFound(_)
        )
    }
}

impl From<quill_store::StoreError> for Error {
    fn from(e: quill_store::StoreError) -> Self {
        match e {
            quill_store::StoreError::NotFound(m) => Error::NotFound(m),
            quill_store::StoreError::Storage(m) => Error::Storage(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_permanent_are_disjoint() {
        let errors = [
            Error::Validation("v".into()),
            Error::Auth("a".into()),
            Error::NotFound("n".into()),
            Error::Transient("t".into()),
            Error::InvalidAiResponse("i".into()),
            Error::QueueFull,
            Error::Storage("s".into()),
            Error::Cancelled,
        ];
        for e in &errors {
            assert!(
                !(e.is_transient() && e.is_permanent()),
                "{e} is both transient and permanent"
            );
        }
    }

    #[test]
    fn upstream_errors_retry_auth_does_not() {
        assert!(Error::Transient("503".into()).is_transient());
        assert!(!Error::Auth("401".into()).is_transient());
        assert!(Error::Auth("401".into()).is_permanent());
    }
}
