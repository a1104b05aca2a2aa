use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Entity-kind prefix used in rendered ids.
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new time-ordered identifier (UUID v7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Last 8 hex characters (the random tail), for logs and terse output.
            pub fn short_id(&self) -> String {
                self.0.simple().to_string()[24..].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short_id())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            /// Accepts both `prefix:<uuid>` and a bare UUID.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s
                    .strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix(':'))
                    .unwrap_or(s);
                uuid::Uuid::parse_str(raw)
                    .map(Self)
                    .map_err(|e| TypeError::InvalidIdentifier(format!("{s}: {e}")))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a lot: a tracked quantity of one commodity.
    LotId,
    "lot"
);

uuid_id!(
    /// Identifier of a sealed package (terminal consolidation node).
    PackageId,
    "pkg"
);

macro_rules! name_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap a caller-chosen identifier.
            ///
            /// Identifiers are non-empty, at most 64 bytes, and contain no
            /// whitespace or `:`.
            pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
                let value = value.into();
                if value.is_empty()
                    || value.len() > 64
                    || value.chars().any(|c| c.is_whitespace() || c == ':')
                {
                    return Err(TypeError::InvalidIdentifier(value));
                }
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = TypeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

name_id!(
    /// Identity of a supply-chain participant, as issued by the auth collaborator.
    ParticipantId
);

name_id!(
    /// Identifier of a commodity type (reference data).
    CommodityId
);

/// Any entity that owns an event chain and can be a composition-graph node.
///
/// Lots are interior nodes; packages are sinks. Rendered as `lot:<uuid>` or
/// `pkg:<uuid>`, which is also the serialized form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EntityId {
    Lot(LotId),
    Package(PackageId),
}

impl EntityId {
    pub fn as_lot(&self) -> Option<LotId> {
        match self {
            Self::Lot(id) => Some(*id),
            Self::Package(_) => None,
        }
    }

    pub fn as_package(&self) -> Option<PackageId> {
        match self {
            Self::Package(id) => Some(*id),
            Self::Lot(_) => None,
        }
    }

    pub fn is_package(&self) -> bool {
        matches!(self, Self::Package(_))
    }

    pub fn short_id(&self) -> String {
        match self {
            Self::Lot(id) => format!("{}:{}", LotId::PREFIX, id.short_id()),
            Self::Package(id) => format!("{}:{}", PackageId::PREFIX, id.short_id()),
        }
    }
}

impl From<LotId> for EntityId {
    fn from(id: LotId) -> Self {
        Self::Lot(id)
    }
}

impl From<PackageId> for EntityId {
    fn from(id: PackageId) -> Self {
        Self::Package(id)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.short_id())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lot(id) => fmt::Display::fmt(id, f),
            Self::Package(id) => fmt::Display::fmt(id, f),
        }
    }
}

impl FromStr for EntityId {
    type Err = TypeError;

    /// Requires the kind prefix; a bare UUID is ambiguous.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((LotId::PREFIX, _)) => s.parse().map(Self::Lot),
            Some((PackageId::PREFIX, _)) => s.parse().map(Self::Package),
            _ => Err(TypeError::InvalidIdentifier(format!(
                "{s}: expected lot:<uuid> or pkg:<uuid>"
            ))),
        }
    }
}

impl TryFrom<String> for EntityId {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_ids_are_unique() {
        let a = LotId::new();
        let b = LotId::new();
        assert_ne!(a, b);
        assert_eq!(a.short_id().len(), 8);
    }

    #[test]
    fn lot_id_parses_with_or_without_prefix() {
        let id = LotId::new();
        assert_eq!(id.to_string().parse::<LotId>().unwrap(), id);
        assert_eq!(id.as_uuid().to_string().parse::<LotId>().unwrap(), id);
    }

    #[test]
    fn package_prefix_is_not_a_lot() {
        let pkg = PackageId::new();
        let rendered = pkg.to_string();
        assert!(rendered.starts_with("pkg:"));
        assert!(rendered.parse::<LotId>().is_err());
    }

    #[test]
    fn entity_id_requires_prefix() {
        let lot = LotId::new();
        let parsed: EntityId = lot.to_string().parse().unwrap();
        assert_eq!(parsed, EntityId::Lot(lot));
        assert!(lot.as_uuid().to_string().parse::<EntityId>().is_err());
    }

    #[test]
    fn entity_id_serializes_as_string() {
        let pkg = PackageId::new();
        let json = serde_json::to_string(&EntityId::from(pkg)).unwrap();
        assert_eq!(json, format!("\"{pkg}\""));
        let back: EntityId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_package(), Some(pkg));
    }

    #[test]
    fn participant_id_rejects_whitespace_and_colons() {
        assert!(ParticipantId::new("farmer-1").is_ok());
        assert!(ParticipantId::new("").is_err());
        assert!(ParticipantId::new("two words").is_err());
        assert!(ParticipantId::new("a:b").is_err());
        assert!(ParticipantId::new("x".repeat(65)).is_err());
    }

    #[test]
    fn participant_id_deserialization_validates() {
        let bad: Result<ParticipantId, _> = serde_json::from_str("\"has space\"");
        assert!(bad.is_err());
    }
}
