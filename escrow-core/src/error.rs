use thiserror::Error;

/// The single error type crossing orchestrator boundaries. Lower crates keep their own
/// typed errors; this enum wraps them so callers only ever match on one type, the way
/// `ark-client`'s top-level `Error` wraps its lower-level crates' errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Script(#[from] escrow_script::ScriptConfigError),

    #[error(transparent)]
    Signing(#[from] escrow_signing::SigningError),

    #[error(transparent)]
    Protocol(#[from] escrow_protocol::ProtocolError),

    #[error("action {action:?} not allowed in state {state:?} (allowed: {allowed:?})")]
    ActionNotAllowed {
        state: escrow_fsm::EscrowState,
        action: escrow_fsm::EscrowAction,
        allowed: Vec<escrow_fsm::EscrowAction>,
    },

    #[error("transition guard failed for {action:?} in state {state:?}")]
    GuardFailed {
        state: escrow_fsm::EscrowState,
        action: escrow_fsm::EscrowAction,
    },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: Box<Error>,
    },

    #[error("{0}")]
    AdHoc(String),
}

impl Error {
    pub fn ad_hoc(message: impl Into<String>) -> Self {
        Error::AdHoc(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Unauthorized(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    pub(crate) fn from_fsm(
        err: escrow_fsm::FsmError<escrow_fsm::EscrowState, escrow_fsm::EscrowAction>,
    ) -> Self {
        match err {
            escrow_fsm::FsmError::ActionNotAllowed {
                state,
                action,
                allowed,
            } => Error::ActionNotAllowed {
                state,
                action,
                allowed,
            },
            escrow_fsm::FsmError::GuardFailed { state, action } => {
                Error::GuardFailed { state, action }
            }
            escrow_fsm::FsmError::TransitionNotFound { state, action } => Error::ActionNotAllowed {
                state,
                action,
                allowed: vec![],
            },
            escrow_fsm::FsmError::TransitionEffectFailed { message, .. } => Error::ad_hoc(message),
            escrow_fsm::FsmError::UnknownState(state) => {
                Error::ad_hoc(format!("unknown state {state:?}"))
            }
        }
    }
}

/// Mirrors the `anyhow`-style `.context()` ergonomics the rest of the corpus reaches for,
/// without depending on `anyhow`: every error keeps its typed variant, just wrapped with a
/// human-readable breadcrumb as it crosses an orchestration boundary.
pub trait ErrorContext<T> {
    fn context(self, message: impl Into<String>) -> Result<T, Error>;
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, Error>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn context(self, message: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| Error::Context {
            message: message.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T, Error> {
        self.map_err(|e| Error::Context {
            message: f(),
            source: Box::new(e.into()),
        })
    }
}
