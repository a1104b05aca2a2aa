use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hybrid logical clock timestamp attached to every event.
///
/// Ordering: `physical_ms` → `logical` → `node_id` (total order). Cross-entity
/// event ordering uses this only for display; integrity comes from the hash
/// chain.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalAnchor {
    /// Wall-clock milliseconds since UNIX epoch.
    pub physical_ms: u64,
    /// Counter for events within the same millisecond.
    pub logical: u32,
    /// Engine node that issued the timestamp.
    pub node_id: u16,
}

impl TemporalAnchor {
    pub fn new(physical_ms: u64, logical: u32, node_id: u16) -> Self {
        Self {
            physical_ms,
            logical,
            node_id,
        }
    }

    pub const fn zero() -> Self {
        Self {
            physical_ms: 0,
            logical: 0,
            node_id: 0,
        }
    }

    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }

    /// Wall-clock component as a UTC datetime.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        i64::try_from(self.physical_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl PartialOrd for TemporalAnchor {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TemporalAnchor {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.physical_ms
            .cmp(&other.physical_ms)
            .then(self.logical.cmp(&other.logical))
            .then(self.node_id.cmp(&other.node_id))
    }
}

impl fmt::Debug for TemporalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TemporalAnchor({}ms.{}.n{})",
            self.physical_ms, self.logical, self.node_id
        )
    }
}

impl fmt::Display for TemporalAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.n{}", self.physical_ms, self.logical, self.node_id)
    }
}

struct ClockState {
    physical_ms: u64,
    logical: u32,
}

/// Monotonic timestamp source for one ledger engine.
///
/// Every anchor handed out is strictly greater than every earlier anchor from
/// the same clock, so events appended within one transaction sort in the
/// order they were emitted.
pub struct HybridClock {
    node_id: u16,
    state: Mutex<ClockState>,
}

impl HybridClock {
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id,
            state: Mutex::new(ClockState {
                physical_ms: 0,
                logical: 0,
            }),
        }
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    /// Timestamp for a local event.
    pub fn now(&self) -> TemporalAnchor {
        self.tick(None)
    }

    /// Timestamp strictly after both the local clock and `previous`.
    ///
    /// Used when appending to a chain whose head may have been written by a
    /// different node or an earlier process.
    pub fn tick_after(&self, previous: &TemporalAnchor) -> TemporalAnchor {
        self.tick(Some(previous))
    }

    fn tick(&self, previous: Option<&TemporalAnchor>) -> TemporalAnchor {
        let wall = wall_clock_ms();
        // The state is two integers; a panic mid-update cannot leave it torn.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let (floor_ms, floor_logical) = match previous {
            Some(prev) if (prev.physical_ms, prev.logical) > (state.physical_ms, state.logical) => {
                (prev.physical_ms, prev.logical)
            }
            _ => (state.physical_ms, state.logical),
        };

        let (physical_ms, logical) = if wall > floor_ms {
            (wall, 0)
        } else {
            (floor_ms, floor_logical.saturating_add(1))
        };

        state.physical_ms = physical_ms;
        state.logical = logical;
        TemporalAnchor::new(physical_ms, logical, self.node_id)
    }
}

impl fmt::Debug for HybridClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridClock")
            .field("node_id", &self.node_id)
            .finish()
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
