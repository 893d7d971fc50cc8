use crate::kernel::StateDef;
use crate::kernel::StateMachineConfig;
use crate::kernel::Transition;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;

/// The lifecycle states an escrow contract moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscrowState {
    Draft,
    Created,
    Funded,
    PendingExecution,
    Disputed,
    Completed,
    Canceled,
    Voided,
}

/// The actions that move an escrow contract between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscrowAction {
    Accept,
    Reject,
    Cancel,
    Fund,
    Release,
    Refund,
    Settle,
    Dispute,
    Void,
    UnilateralRelease,
    UnilateralRefund,
    UnilateralSettle,
}

/// What an escrow FSM guard needs to know about the contract it is attached to. Implemented
/// by `escrow-core`'s `Contract` so the generic kernel never depends on it directly.
pub trait EscrowContext {
    fn release_address_set(&self) -> bool;
}

use EscrowAction::*;
use EscrowState::*;

fn state(name: EscrowState, allowed_actions: &[EscrowAction], is_final: bool) -> StateDef<EscrowState, EscrowAction> {
    StateDef {
        name,
        allowed_actions: allowed_actions.to_vec(),
        is_final,
        description: None,
    }
}

fn transition<C>(
    from: &[EscrowState],
    action: EscrowAction,
    to: EscrowState,
) -> Transition<EscrowState, EscrowAction, C> {
    Transition {
        from: from.to_vec(),
        action,
        to,
        guard: None,
        guard_async: None,
        on_transition: None,
    }
}

/// Builds the static escrow transition table (§4.3): eight states, twelve actions, and the
/// guard preventing `release`/`settle` before a release address has been chosen.
pub fn escrow_config<C>() -> Arc<StateMachineConfig<EscrowState, EscrowAction, C>>
where
    C: EscrowContext + 'static,
{
    let require_release_address: Arc<dyn Fn(&C) -> bool + Send + Sync> =
        Arc::new(|ctx: &C| ctx.release_address_set());

    let mut release_from_funded = transition(&[Funded], Release, PendingExecution);
    release_from_funded.guard = Some(require_release_address.clone());

    let mut settle_from_funded = transition(&[Funded], Settle, PendingExecution);
    settle_from_funded.guard = Some(require_release_address.clone());

    let states = vec![
        state(
            Draft,
            &[Accept, Reject, Cancel],
            false,
        ),
        state(Created, &[Fund, Cancel], false),
        state(
            Funded,
            &[Release, Refund, Settle, Dispute],
            false,
        ),
        state(
            PendingExecution,
            &[
                Release,
                Refund,
                Settle,
                UnilateralRelease,
                UnilateralRefund,
                UnilateralSettle,
                Dispute,
            ],
            false,
        ),
        state(Disputed, &[Release, Refund, Void], false),
        state(Completed, &[], true),
        state(Canceled, &[], true),
        state(Voided, &[], true),
    ];

    let transitions = vec![
        transition(&[Draft], Accept, Created),
        transition(&[Draft], Reject, Canceled),
        transition(&[Draft], Cancel, Canceled),
        transition(&[Created], Fund, Funded),
        transition(&[Created], Cancel, Canceled),
        release_from_funded,
        transition(&[Funded], Refund, PendingExecution),
        settle_from_funded,
        transition(&[Funded], Dispute, Disputed),
        transition(&[PendingExecution], Release, Completed),
        transition(&[PendingExecution], Refund, Completed),
        transition(&[PendingExecution], Settle, Completed),
        transition(&[PendingExecution], UnilateralRelease, Completed),
        transition(&[PendingExecution], UnilateralRefund, Completed),
        transition(&[PendingExecution], UnilateralSettle, Completed),
        transition(&[PendingExecution], Dispute, Disputed),
        transition(&[Disputed], Release, Completed),
        transition(&[Disputed], Refund, Completed),
        transition(&[Disputed], Void, Voided),
    ];

    Arc::new(StateMachineConfig {
        initial_state: Draft,
        states,
        transitions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::StateMachine;

    struct Ctx {
        release_address_set: bool,
    }

    impl EscrowContext for Ctx {
        fn release_address_set(&self) -> bool {
            self.release_address_set
        }
    }

    #[test]
    fn happy_path_settle() {
        let config = escrow_config::<Ctx>();
        let mut fsm = StateMachine::new(config);
        let ctx = Ctx {
            release_address_set: true,
        };

        fsm.perform(&Accept, &ctx).unwrap();
        assert_eq!(*fsm.state(), Created);
        fsm.perform(&Fund, &ctx).unwrap();
        assert_eq!(*fsm.state(), Funded);
        fsm.perform(&Settle, &ctx).unwrap();
        assert_eq!(*fsm.state(), PendingExecution);
        fsm.perform(&Settle, &ctx).unwrap();
        assert_eq!(*fsm.state(), Completed);
        assert!(fsm.is_final());
    }

    #[test]
    fn terminal_states_reject_every_action() {
        let config = escrow_config::<Ctx>();
        let ctx = Ctx {
            release_address_set: true,
        };
        let mut fsm = StateMachine::new(config);
        fsm.perform(&Reject, &ctx).unwrap();
        assert_eq!(*fsm.state(), Canceled);
        assert!(fsm.perform(&Accept, &ctx).is_err());
        assert!(fsm.perform(&Fund, &ctx).is_err());
    }

    #[test]
    fn release_requires_release_address() {
        let config = escrow_config::<Ctx>();
        let ctx = Ctx {
            release_address_set: false,
        };
        let mut fsm = StateMachine::new(config);
        fsm.perform(&Accept, &ctx).unwrap();
        fsm.perform(&Fund, &ctx).unwrap();
        let err = fsm.perform(&Release, &ctx).unwrap_err();
        assert!(matches!(err, crate::FsmError::GuardFailed { .. }));
        assert_eq!(*fsm.state(), Funded);
    }

    #[test]
    fn dispute_then_void() {
        let config = escrow_config::<Ctx>();
        let ctx = Ctx {
            release_address_set: true,
        };
        let mut fsm = StateMachine::new(config);
        fsm.perform(&Accept, &ctx).unwrap();
        fsm.perform(&Fund, &ctx).unwrap();
        fsm.perform(&Dispute, &ctx).unwrap();
        assert_eq!(*fsm.state(), Disputed);
        fsm.perform(&Void, &ctx).unwrap();
        assert_eq!(*fsm.state(), Voided);
        assert!(fsm.is_final());
    }

    #[test]
    fn preview_does_not_mutate_state() {
        let config = escrow_config::<Ctx>();
        let fsm = StateMachine::new(config);
        assert_eq!(fsm.preview(&Accept), Some(&Created));
        assert_eq!(*fsm.state(), Draft);
    }
}
