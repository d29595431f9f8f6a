use thiserror::Error;

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Boxed error used by start hooks and other best-effort callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Hint shown to users when the shared credential is saturated.
pub const OWN_CREDENTIAL_HINT: &str = "supply your own credential to avoid queueing";

/// Classified outcome of a single backend call.
///
/// Backend adapters translate protocol-specific failures into one of these
/// three tags; the retry policy never looks at anything else.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Too many concurrent or too frequent requests
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    /// The call ran out of time without a definitive answer
    #[error("Timed out: {message}")]
    TransientTimeout { message: String },

    /// Anything else: invalid input, auth failure, malformed response...
    #[error("{message}")]
    Fatal {
        message: String,
        status: Option<u16>,
    },
}

impl BackendError {
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited { message: msg.into() }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::TransientTimeout { message: msg.into() }
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal {
            message: msg.into(),
            status: None,
        }
    }

    /// Classify an HTTP status returned by the backend.
    ///
    /// 429 is rate limiting, 408 and 504 are timeouts, the rest is fatal.
    pub fn from_status(status: u16, msg: impl Into<String>) -> Self {
        match status {
            429 => Self::rate_limited(msg),
            408 | 504 => Self::timeout(msg),
            _ => Self::Fatal {
                message: msg.into(),
                status: Some(status),
            },
        }
    }

}

/// Outcome surfaced to callers of the dispatch queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Rate-limit retries exhausted
    #[error("Too many concurrent requests, please wait and try again ({})", OWN_CREDENTIAL_HINT)]
    Congestion { attempts: u32 },

    /// Timeout retries exhausted
    #[error("Generation took too long, please try again later ({})", OWN_CREDENTIAL_HINT)]
    TimedOut { attempts: u32 },

    /// Non-retryable backend failure, passed through unchanged
    #[error("Generation failed: {message}")]
    Fatal {
        message: String,
        status: Option<u16>,
    },

    /// Queue torn down while the task was pending or executing
    #[error("Generation queue is shutting down")]
    Cancelled,
}

impl DispatchError {
    /// Actionable hint for the user, if any
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::Congestion { .. } | Self::TimedOut { .. } => Some(OWN_CREDENTIAL_HINT),
            Self::Fatal { .. } | Self::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Stable label used in events and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Congestion { .. } => "congestion",
            Self::TimedOut { .. } => "timed_out",
            Self::Fatal { .. } => "fatal",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<BackendError> for DispatchError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Fatal { message, status } => Self::Fatal { message, status },
            // Only reached when a retryable error is surfaced without going
            // through the retry policy.
            BackendError::RateLimited { .. } => Self::Congestion { attempts: 1 },
            BackendError::TransientTimeout { .. } => Self::TimedOut { attempts: 1 },
        }
    }
}

/// Invalid dispatch configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(BackendError::from_status(429, "slow down"), BackendError::RateLimited { .. }));
        assert!(matches!(BackendError::from_status(504, "gateway"), BackendError::TransientTimeout { .. }));
        assert!(matches!(BackendError::from_status(408, "request"), BackendError::TransientTimeout { .. }));

        let err = BackendError::from_status(401, "bad token");
        assert_eq!(
            err,
            BackendError::Fatal {
                message: "bad token".to_string(),
                status: Some(401)
            }
        );
    }

    #[test]
    fn test_remediation_hint() {
        let err = DispatchError::Congestion { attempts: 4 };
        assert_eq!(err.remediation(), Some(OWN_CREDENTIAL_HINT));
        assert!(err.to_string().contains(OWN_CREDENTIAL_HINT));

        assert_eq!(DispatchError::Cancelled.remediation(), None);
    }

    #[test]
    fn test_fatal_preserves_detail() {
        let err: DispatchError = BackendError::Fatal {
            message: "prompt rejected".to_string(),
            status: Some(400),
        }
        .into();

        assert_eq!(
            err,
            DispatchError::Fatal {
                message: "prompt rejected".to_string(),
                status: Some(400)
            }
        );
        assert_eq!(err.to_string(), "Generation failed: prompt rejected");
    }
}
