use crate::error::GenerateError;
use serde::Serialize;

/// States of the generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LifecycleState {
    Init,
    Configuring,
    Discovering,
    Generating,
    Resolving,
    Publishing,
    Completing,
    Idle,
    Regenerating,
    Terminated,
}

impl LifecycleState {
    /// Whether the lifecycle may move from `self` to `next`.
    ///
    /// Any state may fall through to `Terminated`; nothing leaves it.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Init, Configuring)
            | (Configuring, Discovering)
            | (Discovering, Generating)
            | (Generating, Resolving)
            | (Resolving, Publishing)
            | (Publishing, Completing)
            | (Completing, Idle)
            | (Idle, Regenerating)
            | (Regenerating, Generating) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Terminated
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

/// Current lifecycle state with validated transitions.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: LifecycleState,
    history: Vec<Transition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: LifecycleState::Init,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.current
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn transition(&mut self, to: LifecycleState) -> Result<Transition, GenerateError> {
        let from = self.current;
        if from.is_terminal() {
            return Err(GenerateError::Terminated);
        }
        if !from.can_transition_to(to) {
            return Err(GenerateError::InvalidTransition { from, to });
        }

        let transition = Transition { from, to };
        self.current = to;
        self.history.push(transition);
        tracing::debug!("lifecycle: {:?} -> {:?}", from, to);
        Ok(transition)
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
