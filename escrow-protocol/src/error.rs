use thiserror::Error;

/// Errors returned by a [`crate::ProtocolProvider`] implementation.
///
/// `Transient` failures (network hiccups, a round still in progress) are worth retrying;
/// `Rejected` failures mean the server looked at the request and said no, and retrying the
/// same request verbatim will not help.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transient protocol error: {0}")]
    Transient(String),
    #[error("request rejected by protocol server: {0}")]
    Rejected(String),
    #[error("protocol server returned malformed data: {0}")]
    Malformed(String),
}

impl ProtocolError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProtocolError::Transient(_))
    }
}
