//! Per-lot lifecycle state machine.
//!
//! ```text
//! created --test--> tested
//!
//! created | tested | split | transferred | partially_packaged
//!     --split-------> split
//!     --transfer----> transferred
//!     --consolidate-> partially_packaged
//!
//! balance reaches 0 by consolidation  --> packaged  (terminal)
//! balance reaches 0 otherwise         --> depleted  (terminal)
//! ```
//!
//! States change only as a side effect of a successful ledger mutation;
//! nothing sets them directly.

use std::fmt;

use serde::{Deserialize, Serialize};

use prov_types::Grams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotState {
    Created,
    Tested,
    Split,
    Transferred,
    PartiallyPackaged,
    Packaged,
    Depleted,
}

/// A successful mutation that may move a lot to a new state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Tested,
    Split { remaining: Grams },
    Transferred { remaining: Grams },
    Consolidated { remaining: Grams },
}

impl LotState {
    /// `packaged` and `depleted` accept no further disposition.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Packaged | Self::Depleted)
    }

    /// The state after `event`, or `None` if the lot is terminal.
    pub fn next(self, event: LifecycleEvent) -> Option<Self> {
        if self.is_terminal() {
            return None;
        }
        let next = match event {
            LifecycleEvent::Tested => match self {
                Self::Created => Self::Tested,
                other => other,
            },
            LifecycleEvent::Split { remaining } if remaining.is_zero() => Self::Depleted,
            LifecycleEvent::Split { .. } => Self::Split,
            LifecycleEvent::Transferred { remaining } if remaining.is_zero() => Self::Depleted,
            LifecycleEvent::Transferred { .. } => Self::Transferred,
            LifecycleEvent::Consolidated { remaining } if remaining.is_zero() => Self::Packaged,
            LifecycleEvent::Consolidated { .. } => Self::PartiallyPackaged,
        };
        Some(next)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Tested => "tested",
            Self::Split => "split",
            Self::Transferred => "transferred",
            Self::PartiallyPackaged => "partially_packaged",
            Self::Packaged => "packaged",
            Self::Depleted => "depleted",
        }
    }
}

impl fmt::Display for LotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(grams: u64) -> Grams {
        Grams::from_grams(grams).unwrap()
    }

    #[test]
    fn test_moves_created_to_tested_only() {
        assert_eq!(LotState::Created.next(LifecycleEvent::Tested), Some(LotState::Tested));
        assert_eq!(LotState::Split.next(LifecycleEvent::Tested), Some(LotState::Split));
    }

    #[test]
    fn dispositions_with_remaining_balance() {
        let remaining = g(10);
        assert_eq!(
            LotState::Tested.next(LifecycleEvent::Split { remaining }),
            Some(LotState::Split)
        );
        assert_eq!(
            LotState::Split.next(LifecycleEvent::Transferred { remaining }),
            Some(LotState::Transferred)
        );
        assert_eq!(
            LotState::Created.next(LifecycleEvent::Consolidated { remaining }),
            Some(LotState::PartiallyPackaged)
        );
    }

    #[test]
    fn draining_the_balance_is_terminal() {
        let remaining = Grams::ZERO;
        assert_eq!(
            LotState::Created.next(LifecycleEvent::Split { remaining }),
            Some(LotState::Depleted)
        );
        assert_eq!(
            LotState::PartiallyPackaged.next(LifecycleEvent::Consolidated { remaining }),
            Some(LotState::Packaged)
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        for state in [LotState::Packaged, LotState::Depleted] {
            assert!(state.is_terminal());
            assert_eq!(state.next(LifecycleEvent::Tested), None);
            assert_eq!(state.next(LifecycleEvent::Split { remaining: g(1) }), None);
        }
    }
}
