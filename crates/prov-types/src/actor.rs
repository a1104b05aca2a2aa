use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::id::ParticipantId;

/// A disposition or record-keeping action an actor may initiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Register a new origin lot.
    CreateLot,
    /// Attest a quality test against a lot.
    RecordTest,
    /// Divide a lot into child lots.
    Split,
    /// Hand a lot (or part of it) to another custodian.
    Transfer,
    /// Combine lot quantities into a sealed package.
    Consolidate,
    /// Hand a sealed package to another custodian.
    TransferPackage,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateLot => "create_lot",
            Self::RecordTest => "record_test",
            Self::Split => "split",
            Self::Transfer => "transfer",
            Self::Consolidate => "consolidate",
            Self::TransferPackage => "transfer_package",
        };
        f.write_str(name)
    }
}

/// Closed set of participant roles.
///
/// Each role maps to a fixed permission set; see [`Role::permissions`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Grows and harvests the commodity; the only role that creates origin lots.
    Producer,
    /// Trader or distributor between producer and packager.
    Intermediary,
    /// Quality officer; attests tests but never takes custody actions.
    Tester,
    /// Packager that seals lots into consumer units.
    Consolidator,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Producer,
        Role::Intermediary,
        Role::Tester,
        Role::Consolidator,
    ];

    /// The permission table.
    pub const fn permissions(self) -> &'static [Action] {
        match self {
            Self::Producer => &[
                Action::CreateLot,
                Action::Split,
                Action::Transfer,
                Action::Consolidate,
                Action::TransferPackage,
            ],
            Self::Intermediary | Self::Consolidator => &[
                Action::Split,
                Action::Transfer,
                Action::Consolidate,
                Action::TransferPackage,
            ],
            Self::Tester => &[Action::RecordTest],
        }
    }

    pub fn permits(self, action: Action) -> bool {
        self.permissions().contains(&action)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Intermediary => "intermediary",
            Self::Tester => "tester",
            Self::Consolidator => "consolidator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownRole(s.to_string()))
    }
}

/// Identity and role of the caller, supplied by the auth collaborator on
/// every mutating call. The ledger never authenticates credentials itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorContext {
    pub participant_id: ParticipantId,
    pub role: Role,
}

impl ActorContext {
    pub fn new(participant_id: ParticipantId, role: Role) -> Self {
        Self {
            participant_id,
            role,
        }
    }
}

impl fmt::Display for ActorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.participant_id, self.role)
    }
}
