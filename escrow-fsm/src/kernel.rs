use crate::FsmError;
use futures::future::BoxFuture;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

type SyncGuard<C> = Arc<dyn Fn(&C) -> bool + Send + Sync>;
type AsyncGuard<C> = Arc<dyn for<'a> Fn(&'a C) -> BoxFuture<'a, bool> + Send + Sync>;
type Effect<C> = Arc<dyn Fn(&C) -> Result<(), String> + Send + Sync>;

/// One state of the machine: which actions are legal from here, and whether the machine
/// stops once it arrives.
#[derive(Clone)]
pub struct StateDef<S, A> {
    pub name: S,
    pub allowed_actions: Vec<A>,
    pub is_final: bool,
    pub description: Option<String>,
}

/// A single edge: from one of several states, on one action, to exactly one destination,
/// subject to an optional guard and an optional side effect.
pub struct Transition<S, A, C> {
    pub from: Vec<S>,
    pub action: A,
    pub to: S,
    pub guard: Option<SyncGuard<C>>,
    pub guard_async: Option<AsyncGuard<C>>,
    pub on_transition: Option<Effect<C>>,
}

/// The static, data-driven description of a guarded finite state machine: states, legal
/// actions per state, and the transition table. Shared (via `Arc`) across every instance
/// built from it.
pub struct StateMachineConfig<S, A, C> {
    pub initial_state: S,
    pub states: Vec<StateDef<S, A>>,
    pub transitions: Vec<Transition<S, A, C>>,
}

impl<S, A, C> StateMachineConfig<S, A, C>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    fn state_def(&self, state: &S) -> Option<&StateDef<S, A>> {
        self.states.iter().find(|s| &s.name == state)
    }

    fn transition(&self, state: &S, action: &A) -> Option<&Transition<S, A, C>> {
        self.transitions
            .iter()
            .find(|t| &t.action == action && t.from.contains(state))
    }
}

/// A running instance of a [`StateMachineConfig`]: just the current state plus a shared
/// pointer to its static configuration.
pub struct StateMachine<S, A, C> {
    config: Arc<StateMachineConfig<S, A, C>>,
    state: S,
}

impl<S: Clone, A, C> Clone for StateMachine<S, A, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S: Debug, A, C> Debug for StateMachine<S, A, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine").field("state", &self.state).finish()
    }
}

impl<S, A, C> StateMachine<S, A, C>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    pub fn new(config: Arc<StateMachineConfig<S, A, C>>) -> Self {
        let state = config.initial_state.clone();
        Self { config, state }
    }

    pub fn with_state(config: Arc<StateMachineConfig<S, A, C>>, state: S) -> Result<Self, FsmError<S, A>> {
        if config.state_def(&state).is_none() {
            return Err(FsmError::UnknownState(state));
        }
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn is_final(&self) -> bool {
        self.config
            .state_def(&self.state)
            .map(|s| s.is_final)
            .unwrap_or(false)
    }

    pub fn allowed_actions(&self) -> &[A] {
        self.config
            .state_def(&self.state)
            .map(|s| s.allowed_actions.as_slice())
            .unwrap_or(&[])
    }

    pub fn can_perform(&self, action: &A) -> bool {
        self.allowed_actions().contains(action)
    }

    /// What state `action` would lead to, without running guards or side effects.
    pub fn preview(&self, action: &A) -> Option<&S> {
        self.config
            .transition(&self.state, action)
            .map(|t| &t.to)
    }

    fn check_allowed(&self, action: &A) -> Result<(), FsmError<S, A>> {
        if !self.can_perform(action) {
            return Err(FsmError::ActionNotAllowed {
                state: self.state.clone(),
                action: action.clone(),
                allowed: self.allowed_actions().to_vec(),
            });
        }
        Ok(())
    }

    fn find_transition(&self, action: &A) -> Result<&Transition<S, A, C>, FsmError<S, A>> {
        self.config
            .transition(&self.state, action)
            .ok_or_else(|| FsmError::TransitionNotFound {
                state: self.state.clone(),
                action: action.clone(),
            })
    }

    /// Runs a transition whose guard (if any) is synchronous. Fails if the matching
    /// transition declares an async guard — use [`Self::perform_async`] for those.
    pub fn perform(&mut self, action: &A, ctx: &C) -> Result<&S, FsmError<S, A>> {
        self.check_allowed(action)?;
        let transition = self.find_transition(action)?;

        if let Some(guard) = &transition.guard {
            if !guard(ctx) {
                return Err(FsmError::GuardFailed {
                    state: self.state.clone(),
                    action: action.clone(),
                });
            }
        }

        if let Some(effect) = &transition.on_transition {
            effect(ctx).map_err(|message| FsmError::TransitionEffectFailed {
                state: self.state.clone(),
                action: action.clone(),
                message,
            })?;
        }

        self.state = transition.to.clone();
        tracing::debug!(action = ?action, to = ?self.state, "fsm transition");
        Ok(&self.state)
    }

    /// Runs a transition evaluating both the synchronous and the asynchronous guard, in
    /// that order; the side effect only runs once both pass.
    pub async fn perform_async(&mut self, action: &A, ctx: &C) -> Result<&S, FsmError<S, A>>
    where
        C: Sync,
    {
        self.check_allowed(action)?;

        let (to, guard, guard_async, effect) = {
            let transition = self.find_transition(action)?;
            (
                transition.to.clone(),
                transition.guard.clone(),
                transition.guard_async.clone(),
                transition.on_transition.clone(),
            )
        };

        if let Some(guard) = &guard {
            if !guard(ctx) {
                return Err(FsmError::GuardFailed {
                    state: self.state.clone(),
                    action: action.clone(),
                });
            }
        }

        if let Some(guard_async) = &guard_async {
            if !guard_async(ctx).await {
                return Err(FsmError::GuardFailed {
                    state: self.state.clone(),
                    action: action.clone(),
                });
            }
        }

        if let Some(effect) = &effect {
            effect(ctx).map_err(|message| FsmError::TransitionEffectFailed {
                state: self.state.clone(),
                action: action.clone(),
                message,
            })?;
        }

        self.state = to;
        tracing::debug!(action = ?action, to = ?self.state, "fsm transition (async)");
        Ok(&self.state)
    }

    /// Forcibly sets the current state, bypassing guards. Used to restore a machine from
    /// persisted state.
    pub fn set_state(&mut self, state: S) -> Result<(), FsmError<S, A>> {
        if self.config.state_def(&state).is_none() {
            return Err(FsmError::UnknownState(state));
        }
        self.state = state;
        Ok(())
    }

    /// Builds a fresh instance sharing this machine's configuration, optionally starting
    /// from a different state than the configured initial one.
    pub fn clone_with(&self, initial: Option<S>) -> Result<Self, FsmError<S, A>> {
        match initial {
            Some(state) => Self::with_state(self.config.clone(), state),
            None => Ok(Self::new(self.config.clone())),
        }
    }
}

impl<S, A, C> serde::Serialize for StateMachine<S, A, C>
where
    S: serde::Serialize,
{
    fn serialize<Ser: serde::Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        self.state.serialize(serializer)
    }
}

/// Rebuilds a machine from its persisted state value against a known configuration. The
/// configuration itself is never serialized — only the state value and an external
/// version tag (owned by the caller) select which static config to rebuild against.
pub fn from_persisted_state<S, A, C>(
    config: Arc<StateMachineConfig<S, A, C>>,
    state: S,
) -> Result<StateMachine<S, A, C>, FsmError<S, A>>
where
    S: Clone + Eq + Hash + Debug,
    A: Clone + Eq + Hash + Debug,
{
    StateMachine::with_state(config, state)
}
