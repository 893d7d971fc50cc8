//! A generic, guarded, data-driven state machine kernel, plus the concrete escrow contract
//! configuration built on top of it.

mod error;
mod escrow;
mod kernel;

pub use error::FsmError;
pub use escrow::escrow_config;
pub use escrow::EscrowAction;
pub use escrow::EscrowContext;
pub use escrow::EscrowState;
pub use kernel::from_persisted_state;
pub use kernel::StateDef;
pub use kernel::StateMachine;
pub use kernel::StateMachineConfig;
pub use kernel::Transition;

/// A state machine instance bound to the concrete escrow configuration.
pub type EscrowFsm<C> = StateMachine<EscrowState, EscrowAction, C>;
