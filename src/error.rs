use std::fmt;

use crate::ResponseRecord;

/// Error domain attached to every [`ServiceError`] raised by this crate.
pub const ERROR_DOMAIN: &str = "HTTPRpcTransportErrorDomain";

/// Failure of a single logical transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),
    /// The connection could not be established or was reset.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other network or request execution error from `reqwest`.
    #[error("transport error: {0}")]
    Network(reqwest::Error),
    /// Non-success HTTP status code with raw response body.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Status and headers arrived but the body could not be read.
    #[error("failed to read body of {} response: {message}", .record.status)]
    Body {
        record: ResponseRecord,
        message: String,
    },
    /// Base URL or endpoint prefix could not form a valid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    /// The outbound request could not be built.
    #[error("malformed request: {0}")]
    Request(String),
    /// The response could not be read or decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// The call was cancelled between attempts.
    #[error("request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: usize },
}

impl TransportError {
    /// Returns `true` for failures another attempt may fix.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Network(_) | Self::Body { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::InvalidUrl(_) | Self::Request(_) | Self::Decode(_) | Self::Cancelled { .. } => {
                false
            }
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Body { record, .. } => Some(record.status),
            Self::Network(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}

/// Domain error surfaced by [`ServiceClient`](crate::ServiceClient).
///
/// Every value carries [`ERROR_DOMAIN`] so callers can tell transport-originated
/// errors apart from other error sources.
#[derive(Debug)]
pub struct ServiceError {
    domain: &'static str,
    message: String,
    source: Option<TransportError>,
}

impl ServiceError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            domain: ERROR_DOMAIN,
            message: message.into(),
            source: None,
        }
    }

    /// Attaches the transport failure this error wraps.
    pub fn with_source(mut self, source: TransportError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn domain(&self) -> &'static str {
        self.domain
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Underlying transport failure, absent for validation errors.
    pub fn transport_error(&self) -> Option<&TransportError> {
        self.source.as_ref()
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.domain, self.message)
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::{ServiceError, TransportError, ERROR_DOMAIN};
    use crate::ResponseRecord;

    #[test]
    fn classifies_transient_errors() {
        assert!(TransportError::Timeout("slow".to_owned()).is_transient());
        assert!(TransportError::Connect("reset".to_owned()).is_transient());
        assert!(TransportError::Http {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(TransportError::Http {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::Http {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!TransportError::InvalidUrl("::".to_owned()).is_transient());
    }

    #[test]
    fn body_failure_keeps_status_and_is_transient() {
        let err = TransportError::Body {
            record: ResponseRecord {
                status: 200,
                headers: vec![("x-trace".to_owned(), "abc".to_owned())],
            },
            message: "connection reset".to_owned(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(200));
        assert_eq!(
            err.to_string(),
            "failed to read body of 200 response: connection reset"
        );
    }

    #[test]
    fn service_error_display_includes_domain() {
        let err = ServiceError::new("employees call failed");
        assert_eq!(err.domain(), ERROR_DOMAIN);
        assert_eq!(
            err.to_string(),
            format!("[{ERROR_DOMAIN}] employees call failed")
        );
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn service_error_exposes_transport_source() {
        let err = ServiceError::new("write failed").with_source(TransportError::Http {
            status: 500,
            body: "boom".to_owned(),
        });
        assert_eq!(err.transport_error().and_then(TransportError::status), Some(500));
        assert!(std::error::Error::source(&err).is_some());
    }
}
