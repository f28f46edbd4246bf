//! Connection state machine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state, owned solely by the streaming client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No attempt outstanding
    #[default]
    Idle,
    /// Connect issued, waiting for confirmation
    Connecting,
    /// Connected, ready to send one frame
    ConnectedIdle,
    /// One frame in flight
    Sending,
}

impl ConnectionState {
    /// Whether `self -> next` belongs to the nominal connect/send cycle
    pub fn is_nominal_transition(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, ConnectedIdle)
                | (Connecting, Idle)
                | (ConnectedIdle, Sending)
                | (Sending, Idle)
        )
    }

    /// Whether `self -> next` is allowed when forced by a transport reset
    pub fn is_forced_transition(self, next: ConnectionState) -> bool {
        self != ConnectionState::Idle && next == ConnectionState::Idle
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ConnectedIdle => "connected",
            ConnectionState::Sending => "sending",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_nominal_table() {
        let all = [Idle, Connecting, ConnectedIdle, Sending];
        let legal: Vec<_> = all
            .iter()
            .flat_map(|a| all.iter().map(move |b| (*a, *b)))
            .filter(|(a, b)| a.is_nominal_transition(*b))
            .collect();

        assert_eq!(
            legal,
            vec![
                (Idle, Connecting),
                (Connecting, Idle),
                (Connecting, ConnectedIdle),
                (ConnectedIdle, Sending),
                (Sending, Idle),
            ]
        );
    }

    #[test]
    fn test_forced_only_to_idle() {
        assert!(ConnectedIdle.is_forced_transition(Idle));
        assert!(!Idle.is_forced_transition(Idle));
        assert!(!Sending.is_forced_transition(Connecting));
    }
}
