use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use prov_crypto::{ChainLink, EventHash, FieldEncoder};
use prov_types::{EntityId, Grams, GramsDelta, LotId, PackageId, ParticipantId, TemporalAnchor};

/// What happened to an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Tested,
    Split,
    Transferred,
    Consolidated,
    PackageCreated,
    PackageTransferred,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Tested => "tested",
            Self::Split => "split",
            Self::Transferred => "transferred",
            Self::Consolidated => "consolidated",
            Self::PackageCreated => "package_created",
            Self::PackageTransferred => "package_transferred",
        }
    }

    /// Whether the event disposes of material or custody, and so must be
    /// issued by the custodian at the time.
    pub fn is_disposition(self) -> bool {
        matches!(
            self,
            Self::Split | Self::Transferred | Self::Consolidated | Self::PackageTransferred
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable entry in an entity's hash chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub entity: EntityId,
    /// Position in the entity's chain, starting at 1.
    pub seq: u64,
    pub kind: EventKind,
    pub actor: ParticipantId,
    pub timestamp: TemporalAnchor,
    pub quantity_delta: GramsDelta,
    pub payload: serde_json::Value,
    pub prev_hash: Option<EventHash>,
    pub hash: EventHash,
}

impl Event {
    /// Canonical bytes of every hashed field except `prev_hash`.
    ///
    /// The payload is rendered through `serde_json::Value`, whose object keys
    /// are sorted, so the encoding does not depend on insertion order.
    pub fn hashed_body(
        entity: &EntityId,
        seq: u64,
        kind: EventKind,
        actor: &ParticipantId,
        quantity_delta: GramsDelta,
        payload: &serde_json::Value,
        timestamp: &TemporalAnchor,
    ) -> Vec<u8> {
        FieldEncoder::new()
            .str(&entity.to_string())
            .u64(seq)
            .str(kind.as_str())
            .str(actor.as_str())
            .i64(quantity_delta.milligrams())
            .str(&payload.to_string())
            .u64(timestamp.physical_ms)
            .u64(u64::from(timestamp.logical))
            .u64(u64::from(timestamp.node_id))
            .finish()
    }

    /// Decode the payload into its typed form.
    pub fn payload_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }
}

impl ChainLink for Event {
    fn seq(&self) -> u64 {
        self.seq
    }

    fn event_hash(&self) -> EventHash {
        self.hash
    }

    fn prev_hash(&self) -> Option<EventHash> {
        self.prev_hash
    }

    fn body_bytes(&self) -> Vec<u8> {
        Self::hashed_body(
            &self.entity,
            self.seq,
            self.kind,
            &self.actor,
            self.quantity_delta,
            &self.payload,
            &self.timestamp,
        )
    }
}

// ---------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------

/// How a lot came to exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotOrigin {
    Harvest,
    Split { source: LotId },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPayload {
    pub commodity: prov_types::CommodityId,
    pub quantity: Grams,
    pub custodian: ParticipantId,
    pub origin: LotOrigin,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestOutcome {
    Passed,
    Failed,
}

/// A quality test result attested by a tester.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub test_type: String,
    pub outcome: TestOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestedPayload {
    #[serde(flatten)]
    pub report: TestReport,
    /// Custodian at the time of the test.
    pub custodian: ParticipantId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitChild {
    pub lot: LotId,
    pub quantity: Grams,
    pub custodian: ParticipantId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitPayload {
    pub children: Vec<SplitChild>,
    pub remaining: Grams,
    /// Set when the split is a partial transfer to another custodian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to: Option<ParticipantId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferredPayload {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub quantity: Grams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedPayload {
    pub package: PackageId,
    pub label: String,
    pub quantity: Grams,
    pub remaining: Grams,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCreatedPayload {
    pub label: String,
    pub contents: Vec<crate::records::PackageContent>,
    pub total: Grams,
    pub custodian: ParticipantId,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageTransferredPayload {
    pub from: ParticipantId,
    pub to: ParticipantId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor() -> ParticipantId {
        ParticipantId::new("farmer-1").unwrap()
    }

    #[test]
    fn body_ignores_payload_key_order() {
        let entity = EntityId::from(LotId::new());
        let ts = TemporalAnchor::new(1, 0, 0);
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let body = |p: &serde_json::Value| {
            Event::hashed_body(&entity, 1, EventKind::Created, &actor(), GramsDelta::ZERO, p, &ts)
        };
        assert_eq!(body(&a), body(&b));
    }

    #[test]
    fn body_commits_to_every_field() {
        let entity = EntityId::from(LotId::new());
        let ts = TemporalAnchor::new(1, 0, 0);
        let payload = json!({"k": "v"});
        let body = |seq: u64, kind: EventKind, delta: GramsDelta, ts: TemporalAnchor| {
            Event::hashed_body(&entity, seq, kind, &actor(), delta, &payload, &ts)
        };
        let base = body(1, EventKind::Split, GramsDelta::ZERO, ts);
        assert_ne!(base, body(2, EventKind::Split, GramsDelta::ZERO, ts));
        assert_ne!(base, body(1, EventKind::Created, GramsDelta::ZERO, ts));
        assert_ne!(base, body(1, EventKind::Split, GramsDelta::ZERO, TemporalAnchor::new(1, 1, 0)));
        let debit = GramsDelta::debit(Grams::from_grams(5).unwrap());
        assert_ne!(base, body(1, EventKind::Split, debit, ts));
    }

    #[test]
    fn kind_display_matches_serde() {
        for kind in [EventKind::Created, EventKind::PackageCreated, EventKind::PackageTransferred] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
        assert!(EventKind::Consolidated.is_disposition());
        assert!(!EventKind::Tested.is_disposition());
    }

    #[test]
    fn tested_payload_is_flat() {
        let payload = TestedPayload {
            report: TestReport {
                test_type: "moisture".into(),
                outcome: TestOutcome::Passed,
                grade: Some("A".into()),
                notes: None,
            },
            custodian: actor(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["outcome"], "passed");
        assert_eq!(value["custodian"], "farmer-1");
        assert!(value.get("notes").is_none());
    }
}
