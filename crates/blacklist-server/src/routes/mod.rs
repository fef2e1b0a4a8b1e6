pub mod health;
pub mod internal;
pub mod ip;

use blacklist_core::record::{AddressRecord, AddressStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Public view of a record returned by the write endpoints.
#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub status: AddressStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_blacklist_at: Option<DateTime<Utc>>,
}

impl From<AddressRecord> for RecordResponse {
    fn from(record: AddressRecord) -> Self {
        Self {
            id: record.id,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
            last_blacklist_at: record.last_blacklist_at,
        }
    }
}
