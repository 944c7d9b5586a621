// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Row keys and column names of the application-map statistics tables.
//!
//! All three tables share one row key layout:
//!
//! ```text
//! salt || application name (24 bytes, zero padded) || service type (i16) || i64::MAX - time slot
//! ```
//!
//! The reversed time slot makes the most recent minute sort first.

use crate::buffer::{BufMutExt, FixedBuffer};
use crate::errors::RowError;
use crate::id::MAX_ID_LENGTH;
use bytes::BufMut;

pub const TIME_SLOT_MILLIS: i64 = 60_000;
const ROW_KEY_LENGTH: usize = MAX_ID_LENGTH + 2 + 8;

/// Truncates a timestamp to the start of its minute.
pub fn time_slot(timestamp: i64) -> i64 {
    timestamp - timestamp.rem_euclid(TIME_SLOT_MILLIS)
}

fn reverse_time(time_slot: i64) -> i64 {
    i64::MAX - time_slot
}

/// Produces an unsalted row key preceded by `salt_size` reserved zero bytes.
pub trait RowKey: Send + Sync {
    fn row_key(&self, salt_size: usize) -> Vec<u8>;
}

pub trait ColumnName: Send + Sync {
    fn column_name(&self) -> Vec<u8>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallRowKey {
    application_name: String,
    service_type: i16,
    time_slot: i64,
}

impl CallRowKey {
    pub fn new(
        application_name: impl Into<String>,
        service_type: i16,
        time_slot: i64,
    ) -> Result<Self, RowError> {
        let application_name = application_name.into();
        if application_name.len() > MAX_ID_LENGTH {
            return Err(RowError::ApplicationNameTooLong(application_name));
        }
        Ok(Self {
            application_name,
            service_type,
            time_slot,
        })
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn service_type(&self) -> i16 {
        self.service_type
    }

    pub fn time_slot(&self) -> i64 {
        self.time_slot
    }

    /// Decodes an unsalted row key.
    pub fn decode(bytes: &[u8]) -> Result<Self, RowError> {
        let mut buffer = FixedBuffer::new(bytes);
        let application_name = buffer.read_padded_string(MAX_ID_LENGTH)?;
        let service_type = buffer.read_i16()?;
        let time_slot = reverse_time(buffer.read_i64()?);
        Ok(Self {
            application_name,
            service_type,
            time_slot,
        })
    }

    /// Unsalted `[start, stop)` keys covering the slots `from..=to` of one application.
    pub fn scan_range(
        application_name: &str,
        service_type: i16,
        from: i64,
        to: i64,
    ) -> Result<(Vec<u8>, Vec<u8>), RowError> {
        // newest first, so the range starts at `to`
        let start = CallRowKey::new(application_name, service_type, time_slot(to))?.row_key(0);
        let mut stop = CallRowKey::new(application_name, service_type, time_slot(from))?.row_key(0);
        stop.push(0);
        Ok((start, stop))
    }
}

impl RowKey for CallRowKey {
    fn row_key(&self, salt_size: usize) -> Vec<u8> {
        let mut key = Vec::with_capacity(salt_size + ROW_KEY_LENGTH);
        key.put_bytes(0, salt_size);
        key.put_padded_string(&self.application_name, MAX_ID_LENGTH);
        key.put_i16(self.service_type);
        key.put_i64(reverse_time(self.time_slot));
        key
    }
}

/// Column of the caller table: who was called, and how fast it answered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalleeColumnName {
    pub callee_service_type: i16,
    pub callee_application_name: String,
    pub callee_host: String,
    pub slot: i16,
    pub caller_agent_id: String,
}

impl CalleeColumnName {
    pub fn decode(bytes: &[u8]) -> Result<Self, RowError> {
        let mut buffer = FixedBuffer::new(bytes);
        Ok(Self {
            callee_service_type: buffer.read_i16()?,
            callee_application_name: buffer.read_prefixed_string()?.unwrap_or_default(),
            callee_host: buffer.read_prefixed_string()?.unwrap_or_default(),
            slot: buffer.read_i16()?,
            caller_agent_id: buffer.read_prefixed_string()?.unwrap_or_default(),
        })
    }
}

impl ColumnName for CalleeColumnName {
    fn column_name(&self) -> Vec<u8> {
        let mut column = Vec::new();
        column.put_i16(self.callee_service_type);
        column.put_prefixed_string(Some(&self.callee_application_name));
        column.put_prefixed_string(Some(&self.callee_host));
        column.put_i16(self.slot);
        column.put_prefixed_string(Some(&self.caller_agent_id));
        column
    }
}

/// Column of the callee table: who made the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerColumnName {
    pub caller_service_type: i16,
    pub caller_application_name: String,
    pub callee_host: String,
    pub slot: i16,
}

impl CallerColumnName {
    pub fn decode(bytes: &[u8]) -> Result<Self, RowError> {
        let mut buffer = FixedBuffer::new(bytes);
        Ok(Self {
            caller_service_type: buffer.read_i16()?,
            caller_application_name: buffer.read_prefixed_string()?.unwrap_or_default(),
            callee_host: buffer.read_prefixed_string()?.unwrap_or_default(),
            slot: buffer.read_i16()?,
        })
    }
}

impl ColumnName for CallerColumnName {
    fn column_name(&self) -> Vec<u8> {
        let mut column = Vec::new();
        column.put_i16(self.caller_service_type);
        column.put_prefixed_string(Some(&self.caller_application_name));
        column.put_prefixed_string(Some(&self.callee_host));
        column.put_i16(self.slot);
        column
    }
}

/// Column of the self table: one histogram slot of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseColumnName {
    pub slot: i16,
    pub agent_id: String,
}

impl ResponseColumnName {
    pub fn decode(bytes: &[u8]) -> Result<Self, RowError> {
        let mut buffer = FixedBuffer::new(bytes);
        Ok(Self {
            slot: buffer.read_i16()?,
            agent_id: buffer.read_prefixed_string()?.unwrap_or_default(),
        })
    }
}

impl ColumnName for ResponseColumnName {
    fn column_name(&self) -> Vec<u8> {
        let mut column = Vec::new();
        column.put_i16(self.slot);
        column.put_prefixed_string(Some(&self.agent_id));
        column
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_time_slot() {
        assert_eq!(time_slot(0), 0);
        assert_eq!(time_slot(59_999), 0);
        assert_eq!(time_slot(60_000), 60_000);
        assert_eq!(time_slot(1_409_814_914_298), 1_409_814_900_000);
    }

    #[test]
    fn test_row_key_layout() {
        let key = CallRowKey::new("order-api", 1010, 120_000).expect("valid name");
        let bytes = key.row_key(1);
        assert_eq!(bytes.len(), 1 + ROW_KEY_LENGTH);
        assert_eq!(bytes[0], 0);
        assert_eq!(&bytes[1..10], b"order-api");
        assert_eq!(CallRowKey::decode(&bytes[1..]), Ok(key));
    }

    #[test]
    fn test_name_too_long() {
        assert!(matches!(
            CallRowKey::new("a".repeat(MAX_ID_LENGTH + 1), 1000, 0),
            Err(RowError::ApplicationNameTooLong(_))
        ));
    }

    #[test]
    fn test_newer_slots_sort_first() {
        let older = CallRowKey::new("app", 1000, 60_000).expect("valid").row_key(0);
        let newer = CallRowKey::new("app", 1000, 120_000).expect("valid").row_key(0);
        assert!(newer < older);

        let (start, stop) = CallRowKey::scan_range("app", 1000, 60_000, 120_000).expect("valid");
        assert!(start <= newer && newer < stop);
        assert!(start <= older && older < stop);
        let outside = CallRowKey::new("app", 1000, 0).expect("valid").row_key(0);
        assert!(outside >= stop);
    }

    #[test]
    fn test_column_names_decode() {
        let callee = CalleeColumnName {
            callee_service_type: 2100,
            callee_application_name: "orders-db".to_string(),
            callee_host: "10.0.0.1:3306".to_string(),
            slot: 1000,
            caller_agent_id: "agent-1".to_string(),
        };
        assert_eq!(CalleeColumnName::decode(&callee.column_name()), Ok(callee));

        let caller = CallerColumnName {
            caller_service_type: 1010,
            caller_application_name: "front".to_string(),
            callee_host: "order-api".to_string(),
            slot: -1,
        };
        assert_eq!(CallerColumnName::decode(&caller.column_name()), Ok(caller));

        assert!(ResponseColumnName::decode(&[0]).is_err());
    }

    proptest! {
        #[test]
        fn test_row_key_round_trip(name in "[a-z0-9._-]{1,24}", service_type: i16, slot in 0i64..4_000_000_000_000) {
            let key = CallRowKey::new(name, service_type, time_slot(slot)).expect("valid");
            prop_assert_eq!(CallRowKey::decode(&key.row_key(0)).expect("decodes"), key);
        }
    }
}
