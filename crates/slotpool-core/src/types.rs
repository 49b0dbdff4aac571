//! Core types for slotpool
//!
//! Defines the records shared by every layer of the allocator:
//! - Slot, project and user identifiers
//! - Slots and their assignment state
//! - Slot metadata (assignment history side-channel)
//! - Audit log entries

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ulid::Ulid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Slot identifier, also the tag value engine resources carry
    SlotId
);

string_id!(
    /// Engine project a slot belongs to
    ProjectId
);

string_id!(
    /// Tenant user identifier (opaque, supplied by the onboarding path)
    UserId
);

/// Holder recorded when the reconciler must mark a slot occupied but no
/// owner can be recovered from any signal.
pub const UNATTRIBUTED_USER: &str = "reconciler:unattributed";

impl UserId {
    /// Reserved holder for slots forced occupied without a known owner
    #[inline]
    #[must_use]
    pub fn unattributed() -> Self {
        Self::new(UNATTRIBUTED_USER)
    }

    /// Whether this is the reserved unattributed holder
    #[inline]
    #[must_use]
    pub fn is_unattributed(&self) -> bool {
        self.0 == UNATTRIBUTED_USER
    }
}

/// Current time at the precision the store keeps (microseconds)
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Encode a timestamp in the fixed-width form used by every table.
///
/// Microsecond precision with a `Z` suffix, so lexical order equals
/// chronological order.
#[must_use]
pub fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a timestamp written by [`encode_timestamp`]
///
/// # Errors
/// Returns the chrono parse error for malformed input
pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}

/// Assigned half of a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Current holder
    pub user_id: UserId,
    /// When the holder was recorded
    pub assigned_at: DateTime<Utc>,
}

/// One isolation unit carved out of the shared engine
///
/// `is_assigned` is derived from `assignment`, so a slot can never be marked
/// assigned without a holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Slot identifier
    pub slot_id: SlotId,
    /// Owning engine project
    pub project_id: ProjectId,
    /// Present while the slot is assigned
    pub assignment: Option<Assignment>,
}

impl Slot {
    /// Create an unassigned slot
    #[inline]
    #[must_use]
    pub fn free(slot_id: SlotId, project_id: ProjectId) -> Self {
        Self {
            slot_id,
            project_id,
            assignment: None,
        }
    }

    /// Whether the allocation store considers the slot taken
    #[inline]
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.assignment.is_some()
    }

    /// Current holder, if any
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> Option<&UserId> {
        self.assignment.as_ref().map(|a| &a.user_id)
    }

    /// Assignment time, if any
    #[inline]
    #[must_use]
    pub fn assigned_at(&self) -> Option<DateTime<Utc>> {
        self.assignment.as_ref().map(|a| a.assigned_at)
    }
}

/// Who recorded an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignedBy {
    /// Operator performed it by hand
    Human,
    /// Imported by a data migration
    Migration,
    /// Written by the allocator's commit
    Allocator,
    /// Recovered by a reconciler correction
    Reconciler,
}

impl AssignedBy {
    /// Canonical column value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Migration => "migration",
            Self::Allocator => "allocator",
            Self::Reconciler => "reconciler",
        }
    }

    /// Parse a column value; unknown values are rejected
    #[must_use]
    pub fn from_str_checked(s: &str) -> Option<Self> {
        match s {
            "human" => Some(Self::Human),
            "migration" => Some(Self::Migration),
            "allocator" => Some(Self::Allocator),
            "reconciler" => Some(Self::Reconciler),
            _ => None,
        }
    }
}

/// Lifecycle of a metadata row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStatus {
    /// Slot is in use by its owner
    Active,
    /// Kept for history only
    Archived,
}

impl MetadataStatus {
    /// Canonical column value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }

    /// Parse a column value; unknown values are rejected
    #[must_use]
    pub fn from_str_checked(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// Ownership record written when a slot is handed out
///
/// Never removed, so its presence marks a slot as having been occupied even
/// when the allocation store was later reset out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMetadata {
    pub slot_id: SlotId,
    pub owner_user_id: UserId,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: AssignedBy,
    pub status: MetadataStatus,
    pub workflows_created: u64,
    pub last_activity_at: DateTime<Utc>,
    /// Hex SHA-256 over slot, owner and assignment time
    pub verification_hash: String,
}

impl SlotMetadata {
    /// Create an active metadata row for a fresh assignment
    #[must_use]
    pub fn new(
        slot_id: SlotId,
        owner_user_id: UserId,
        assigned_at: DateTime<Utc>,
        assigned_by: AssignedBy,
    ) -> Self {
        let verification_hash = Self::compute_hash(&slot_id, &owner_user_id, &assigned_at);
        Self {
            slot_id,
            owner_user_id,
            assigned_at,
            assigned_by,
            status: MetadataStatus::Active,
            workflows_created: 0,
            last_activity_at: assigned_at,
            verification_hash,
        }
    }

    /// Hash binding a metadata row to its slot, owner and assignment time
    #[must_use]
    pub fn compute_hash(slot_id: &SlotId, owner: &UserId, assigned_at: &DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(slot_id.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(owner.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(encode_timestamp(assigned_at).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Whether the stored hash still matches the row
    #[must_use]
    pub fn verify(&self) -> bool {
        self.verification_hash
            == Self::compute_hash(&self.slot_id, &self.owner_user_id, &self.assigned_at)
    }
}

/// Audit actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Assigned,
    Unassigned,
    Verified,
    Warning,
    Suspicious,
}

impl AuditAction {
    /// Canonical column value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Unassigned => "unassigned",
            Self::Verified => "verified",
            Self::Warning => "warning",
            Self::Suspicious => "suspicious",
        }
    }

    /// Parse a column value; unknown values are rejected
    #[must_use]
    pub fn from_str_checked(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(Self::Assigned),
            "unassigned" => Some(Self::Unassigned),
            "verified" => Some(Self::Verified),
            "warning" => Some(Self::Warning),
            "suspicious" => Some(Self::Suspicious),
            _ => None,
        }
    }

    /// Whether operators are expected to review entries with this action
    #[inline]
    #[must_use]
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::Warning | Self::Suspicious)
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// ULID, sortable by creation
    pub id: String,
    pub slot_id: SlotId,
    pub user_id: Option<UserId>,
    pub action: AuditAction,
    /// Structured context (counts, reasons)
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create a new entry stamped now
    #[must_use]
    pub fn new(slot_id: SlotId, action: AuditAction, details: serde_json::Value) -> Self {
        Self {
            id: Ulid::new().to_string(),
            slot_id,
            user_id: None,
            action,
            details,
            created_at: now(),
        }
    }

    /// Attach the user the entry concerns
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Override the creation time
    #[inline]
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Per-project occupancy summary used by placement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCapacity {
    pub project_id: ProjectId,
    pub total: usize,
    pub assigned: usize,
}

impl ProjectCapacity {
    /// Slots the allocation store still reports free
    #[inline]
    #[must_use]
    pub fn free(&self) -> usize {
        self.total.saturating_sub(self.assigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slot_assignment_invariant() {
        let mut slot = Slot::free(SlotId::from("proj-01-slot-01"), ProjectId::from("proj-01"));
        assert!(!slot.is_assigned());
        assert!(slot.user_id().is_none());

        slot.assignment = Some(Assignment {
            user_id: UserId::from("alice"),
            assigned_at: now(),
        });
        assert!(slot.is_assigned());
        assert_eq!(slot.user_id().map(UserId::as_str), Some("alice"));
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        let (a, b) = (encode_timestamp(&early), encode_timestamp(&late));
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        assert_eq!(decode_timestamp(&a).unwrap(), early);
    }

    #[test]
    fn metadata_hash_detects_tampering() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let mut meta = SlotMetadata::new(
            SlotId::from("s1"),
            UserId::from("alice"),
            at,
            AssignedBy::Allocator,
        );
        assert!(meta.verify());

        meta.owner_user_id = UserId::from("mallory");
        assert!(!meta.verify());
    }

    #[test]
    fn audit_action_round_trips_column_values() {
        for action in [
            AuditAction::Assigned,
            AuditAction::Unassigned,
            AuditAction::Verified,
            AuditAction::Warning,
            AuditAction::Suspicious,
        ] {
            assert_eq!(AuditAction::from_str_checked(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::from_str_checked("freed"), None);
    }

    #[test]
    fn unattributed_holder_is_recognised() {
        assert!(UserId::unattributed().is_unattributed());
        assert!(!UserId::from("bob").is_unattributed());
    }
}
