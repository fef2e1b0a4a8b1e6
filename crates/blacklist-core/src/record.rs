//! Address record data model.
//!
//! An `AddressRecord` is the single persisted entity. Its `status` moves
//! `BLACKLISTED → ARCHIVED → (deleted)` as wall-clock time passes, and back
//! to `BLACKLISTED` only through an explicit reactivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BlacklistError;

// ---------------------------------------------------------------------------
// AddressStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of an address.
///
/// `Pending` and `MarkedForDeletion` are reserved for manual workflows; the
/// lifecycle engine only drives `Blacklisted` and `Archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddressStatus {
    /// Awaiting evaluation before being blacklisted.
    Pending,
    Blacklisted,
    /// TTL elapsed; kept until `expires_at`, then deleted unless reactivated.
    Archived,
    MarkedForDeletion,
}

impl AddressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Blacklisted => "BLACKLISTED",
            Self::Archived => "ARCHIVED",
            Self::MarkedForDeletion => "MARKED_FOR_DELETION",
        }
    }
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressStatus {
    type Err = BlacklistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "BLACKLISTED" => Ok(Self::Blacklisted),
            "ARCHIVED" => Ok(Self::Archived),
            "MARKED_FOR_DELETION" => Ok(Self::MarkedForDeletion),
            other => Err(BlacklistError::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// AddressRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub id: Uuid,
    /// Canonical textual form, unique across records.
    pub address: String,
    pub status: AddressStatus,
    /// `None` means the default TTL applies.
    pub ttl_days: Option<i32>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_blacklist_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AddressRecord {
    /// The instant this record becomes archive-eligible, if it is blacklisted.
    /// `None` as well when the sum falls outside the calendar range.
    pub fn archive_due_at(
        &self,
        cooling_period_days: i32,
        default_ttl_days: i32,
    ) -> Option<DateTime<Utc>> {
        let since = self.last_blacklist_at?;
        let ttl = self.ttl_days.unwrap_or(default_ttl_days);
        let days = i64::from(cooling_period_days) + i64::from(ttl);
        since.checked_add_signed(chrono::Duration::days(days))
    }
}

// ---------------------------------------------------------------------------
// Store payloads
// ---------------------------------------------------------------------------

/// Values written by an insert-or-update on the unique address.
#[derive(Debug, Clone, PartialEq)]
pub struct BlacklistEntry {
    pub address: String,
    pub ttl_days: Option<i32>,
    pub description: Option<String>,
    pub last_blacklist_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<AddressStatus>,
    pub description: Option<String>,
    pub last_blacklist_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.description.is_none()
            && self.last_blacklist_at.is_none()
            && self.expires_at.is_none()
    }

    pub(crate) fn apply(&self, record: &mut AddressRecord, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(description) = &self.description {
            record.description = Some(description.clone());
        }
        if let Some(at) = self.last_blacklist_at {
            record.last_blacklist_at = Some(at);
        }
        if let Some(at) = self.expires_at {
            record.expires_at = Some(at);
        }
        record.updated_at = now;
    }
}

/// Key used for point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector<'a> {
    Id(Uuid),
    Address(&'a str),
}

impl Selector<'_> {
    pub(crate) fn matches(&self, record: &AddressRecord) -> bool {
        match self {
            Self::Id(id) => record.id == *id,
            Self::Address(address) => record.address == *address,
        }
    }
}
