//! One-shot bootstrap state machine.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU8, Ordering};

const UNINITIALIZED: u8 = 0;
const ATTACHED: u8 = 1;
const ACTIVATED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    /// Entry ran; waiting for the host startup callback.
    Attached,
    /// Startup phase ran.
    Activated,
}

impl BootstrapState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            UNINITIALIZED => Self::Uninitialized,
            ATTACHED => Self::Attached,
            _ => Self::Activated,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Attached => "attached",
            Self::Activated => "activated",
        }
    }
}

/// Forward-only state with compare-and-swap transitions.
#[derive(Debug)]
pub struct BootstrapStateMachine {
    state: AtomicU8,
}

impl BootstrapStateMachine {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
        }
    }

    pub fn state(&self) -> BootstrapState {
        BootstrapState::from_raw(self.state.load(Ordering::SeqCst))
    }

    /// `Uninitialized -> Attached`. Any other starting state is a violation
    /// and leaves the state unchanged.
    pub fn attach(&self) -> Result<(), BootstrapViolation> {
        self.transition(UNINITIALIZED, ATTACHED)
    }

    /// `Attached -> Activated`.
    pub fn activate(&self) -> Result<(), BootstrapViolation> {
        self.transition(ATTACHED, ACTIVATED)
    }

    fn transition(&self, from: u8, to: u8) -> Result<(), BootstrapViolation> {
        self.state
            .compare_exchange(from, to, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|actual| BootstrapViolation {
                expected: BootstrapState::from_raw(from),
                actual: BootstrapState::from_raw(actual),
            })
    }
}

impl Default for BootstrapStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Integration contract violation: a transition was requested from the
/// wrong state (e.g. a second entry call).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapViolation {
    pub expected: BootstrapState,
    pub actual: BootstrapState,
}

impl Display for BootstrapViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bootstrap already initialized: expected state `{}`, found `{}`",
            self.expected.as_str(),
            self.actual.as_str()
        )
    }
}

impl Error for BootstrapViolation {}

#[cfg(test)]
mod tests {
    use super::{BootstrapState, BootstrapStateMachine};

    #[test]
    fn moves_forward_once() {
        let machine = BootstrapStateMachine::new();
        assert_eq!(machine.state(), BootstrapState::Uninitialized);
        machine.attach().expect("first attach");
        assert_eq!(machine.state(), BootstrapState::Attached);
        machine.activate().expect("activate");
        assert_eq!(machine.state(), BootstrapState::Activated);
    }

    #[test]
    fn second_attach_is_a_violation_and_keeps_state() {
        let machine = BootstrapStateMachine::new();
        machine.attach().expect("first attach");
        let violation = machine.attach().expect_err("second attach");
        assert_eq!(violation.actual, BootstrapState::Attached);
        assert_eq!(machine.state(), BootstrapState::Attached);

        machine.activate().expect("activate");
        let violation = machine.attach().expect_err("attach after activation");
        assert_eq!(violation.actual, BootstrapState::Activated);
        assert_eq!(machine.state(), BootstrapState::Activated);
    }

    #[test]
    fn activate_requires_attach() {
        let machine = BootstrapStateMachine::new();
        assert!(machine.activate().is_err());
        assert_eq!(machine.state(), BootstrapState::Uninitialized);
    }
}
