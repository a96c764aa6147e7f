//! Upload session state machine.

use std::fmt;

/// Linear session progression: Idle → Muted → BootNegotiating → Transferring
/// → Done, with Failed reachable from every active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Mute sequence sent, peers silenced.
    Muted,
    /// Boot requests in flight.
    BootNegotiating,
    /// Firmware chunks in flight.
    Transferring,
    /// Image delivered and finalized.
    Done,
    /// Terminal failure.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Muted => write!(f, "Muted"),
            SessionState::BootNegotiating => write!(f, "Boot Negotiation"),
            SessionState::Transferring => write!(f, "Transferring"),
            SessionState::Done => write!(f, "Done"),
            SessionState::Failed => write!(f, "Failed"),
        }
    }
}

impl SessionState {
    /// Done or Failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (*self, next),
            (Idle, Muted)
                | (Muted, BootNegotiating)
                | (BootNegotiating, Transferring)
                | (Transferring, Done)
                | (Idle | Muted | BootNegotiating | Transferring, Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use SessionState::*;
        let path = [Idle, Muted, BootNegotiating, Transferring, Done];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        use SessionState::*;
        for next in [Idle, Muted, BootNegotiating, Transferring, Done, Failed] {
            assert!(!Done.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert!(Done.is_terminal());
        assert!(!Transferring.is_terminal());
    }

    #[test]
    fn test_no_skipping() {
        assert!(!SessionState::Idle.can_transition_to(SessionState::Transferring));
        assert!(!SessionState::Muted.can_transition_to(SessionState::Done));
    }
}
