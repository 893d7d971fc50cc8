use std::fmt::Debug;
use thiserror::Error;

/// Errors raised while driving a [`crate::StateMachine`].
#[derive(Debug, Error)]
pub enum FsmError<S: Debug, A: Debug> {
    #[error("action {action:?} is not allowed in state {state:?} (allowed: {allowed:?})")]
    ActionNotAllowed {
        state: S,
        action: A,
        allowed: Vec<A>,
    },
    #[error("no transition defined for ({state:?}, {action:?})")]
    TransitionNotFound { state: S, action: A },
    #[error("guard rejected transition ({state:?}, {action:?})")]
    GuardFailed { state: S, action: A },
    #[error("side effect for transition ({state:?}, {action:?}) failed: {message}")]
    TransitionEffectFailed {
        state: S,
        action: A,
        message: String,
    },
    #[error("state {0:?} is not a known state for this machine")]
    UnknownState(S),
}
