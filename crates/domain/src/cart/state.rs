//! Cart state machine.

use serde::{Deserialize, Serialize};

/// The state of a cart in its checkout lifecycle.
///
/// State transitions:
/// ```text
/// Open ──submit──► Submitted ──finish──► Finished
///   │                  │
///   └──────cancel──────┴──────────────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartState {
    /// Cart is being filled, items can be added, changed and removed.
    #[default]
    Open,

    /// Order placed and inventory reserved, awaiting settlement.
    Submitted,

    /// Payment settled (terminal state).
    Finished,

    /// Cart was cancelled (terminal state).
    Cancelled,
}

impl CartState {
    /// Returns true if items can be modified in this state.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, CartState::Open)
    }

    /// Returns true if the cart can be submitted in this state.
    pub fn can_submit(&self) -> bool {
        matches!(self, CartState::Open)
    }

    /// Returns true if the cart can be finished in this state.
    pub fn can_finish(&self) -> bool {
        matches!(self, CartState::Submitted)
    }

    /// Returns true if the cart can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        self.is_active()
    }

    /// Returns true while the cart has not reached a terminal state.
    pub fn is_active(&self) -> bool {
        matches!(self, CartState::Open | CartState::Submitted)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if inventory is currently reserved for this cart.
    pub fn holds_stock(&self) -> bool {
        matches!(self, CartState::Submitted)
    }

    /// Returns the state name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            CartState::Open => "open",
            CartState::Submitted => "submitted",
            CartState::Finished => "finished",
            CartState::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CartState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown cart state: {0}")]
pub struct UnknownCartState(pub String);

impl std::str::FromStr for CartState {
    type Err = UnknownCartState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(CartState::Open),
            "submitted" => Ok(CartState::Submitted),
            "finished" => Ok(CartState::Finished),
            "cancelled" => Ok(CartState::Cancelled),
            other => Err(UnknownCartState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [CartState; 4] = [
        CartState::Open,
        CartState::Submitted,
        CartState::Finished,
        CartState::Cancelled,
    ];

    #[test]
    fn test_default_state_is_open() {
        assert_eq!(CartState::default(), CartState::Open);
    }

    #[test]
    fn test_only_open_can_modify_items_and_submit() {
        for state in ALL {
            assert_eq!(state.can_modify_items(), state == CartState::Open);
            assert_eq!(state.can_submit(), state == CartState::Open);
        }
    }

    #[test]
    fn test_only_submitted_can_finish() {
        for state in ALL {
            assert_eq!(state.can_finish(), state == CartState::Submitted);
            assert_eq!(state.holds_stock(), state == CartState::Submitted);
        }
    }

    #[test]
    fn test_active_and_terminal_states() {
        assert!(CartState::Open.can_cancel());
        assert!(CartState::Submitted.can_cancel());
        assert!(!CartState::Finished.can_cancel());
        assert!(!CartState::Cancelled.can_cancel());

        assert!(CartState::Finished.is_terminal());
        assert!(CartState::Cancelled.is_terminal());
        assert!(!CartState::Open.is_terminal());
    }

    #[test]
    fn test_string_round_trip() {
        for state in ALL {
            assert_eq!(state.as_str().parse::<CartState>().unwrap(), state);
        }
        assert!("draft".parse::<CartState>().is_err());
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_string(&CartState::Submitted).unwrap();
        assert_eq!(json, "\"submitted\"");
    }
}
