// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Registered service types and the histogram schema each of them uses.

use crate::histogram::SlotType;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Response-time bucket bounds, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistogramSchema {
    pub type_code: i32,
    pub fast: i32,
    pub normal: i32,
    pub slow: i32,
}

pub const NORMAL_SCHEMA: HistogramSchema = HistogramSchema {
    type_code: 1,
    fast: 1000,
    normal: 3000,
    slow: 5000,
};

pub const FAST_SCHEMA: HistogramSchema = HistogramSchema {
    type_code: 2,
    fast: 100,
    normal: 300,
    slow: 500,
};

const VERY_SLOW_SLOT_CODE: i16 = 0;
const ERROR_SLOT_CODE: i16 = -1;
const SUM_SLOT_CODE: i16 = -2;
const MAX_SLOT_CODE: i16 = -3;

impl HistogramSchema {
    pub fn find_slot(&self, elapsed: i32, error: bool) -> SlotType {
        if error {
            SlotType::Error
        } else if elapsed <= self.fast {
            SlotType::Fast
        } else if elapsed <= self.normal {
            SlotType::Normal
        } else if elapsed <= self.slow {
            SlotType::Slow
        } else {
            SlotType::VerySlow
        }
    }

    /// Code written into statistics column names for `slot`.
    pub fn slot_code(&self, slot: SlotType) -> i16 {
        match slot {
            // bounds are small constants, they always fit
            SlotType::Fast => self.fast as i16,
            SlotType::Normal => self.normal as i16,
            SlotType::Slow => self.slow as i16,
            SlotType::VerySlow => VERY_SLOW_SLOT_CODE,
            SlotType::Error => ERROR_SLOT_CODE,
            SlotType::Sum => SUM_SLOT_CODE,
            SlotType::Max => MAX_SLOT_CODE,
        }
    }

    pub fn slot_by_code(&self, code: i16) -> Option<SlotType> {
        match code {
            VERY_SLOW_SLOT_CODE => Some(SlotType::VerySlow),
            ERROR_SLOT_CODE => Some(SlotType::Error),
            SUM_SLOT_CODE => Some(SlotType::Sum),
            MAX_SLOT_CODE => Some(SlotType::Max),
            c if i32::from(c) == self.fast => Some(SlotType::Fast),
            c if i32::from(c) == self.normal => Some(SlotType::Normal),
            c if i32::from(c) == self.slow => Some(SlotType::Slow),
            _ => None,
        }
    }

    pub fn slot_label(&self, slot: SlotType) -> String {
        let format_bound = |millis: i32| {
            if millis >= 1000 {
                format!("{}s", millis / 1000)
            } else {
                format!("{millis}ms")
            }
        };
        match slot {
            SlotType::Fast => format_bound(self.fast),
            SlotType::Normal => format_bound(self.normal),
            SlotType::Slow => format_bound(self.slow),
            SlotType::VerySlow => "Slow".to_string(),
            SlotType::Error => "Error".to_string(),
            SlotType::Sum => "Sum".to_string(),
            SlotType::Max => "Max".to_string(),
        }
    }
}

const TERMINAL: u8 = 1;
const QUEUE: u8 = 1 << 1;
const RECORD_STATISTICS: u8 = 1 << 2;
const INCLUDE_DESTINATION_ID: u8 = 1 << 3;

/// A registered service type. Equality, ordering and hashing use the code only.
#[derive(Clone, Copy)]
pub struct ServiceType {
    code: i16,
    name: &'static str,
    schema: HistogramSchema,
    flags: u8,
}

macro_rules! service_types {
    ($($ident:ident => ($code:expr, $name:expr, $schema:expr, $flags:expr)),+ $(,)?) => {
        impl ServiceType {
            $(pub const $ident: ServiceType = ServiceType {
                code: $code,
                name: $name,
                schema: $schema,
                flags: $flags,
            };)+

            const REGISTERED: &'static [ServiceType] = &[$(ServiceType::$ident),+];
        }
    };
}

service_types! {
    UNDEFINED => (-1, "UNDEFINED", NORMAL_SCHEMA, 0),
    UNKNOWN => (1, "UNKNOWN", NORMAL_SCHEMA, RECORD_STATISTICS),
    USER => (2, "USER", NORMAL_SCHEMA, RECORD_STATISTICS),
    STAND_ALONE => (1000, "STAND_ALONE", NORMAL_SCHEMA, RECORD_STATISTICS),
    TOMCAT => (1010, "TOMCAT", NORMAL_SCHEMA, RECORD_STATISTICS),
    SPRING_BOOT => (1210, "SPRING_BOOT", NORMAL_SCHEMA, RECORD_STATISTICS),
    UNKNOWN_DB => (2050, "UNKNOWN_DB", NORMAL_SCHEMA, TERMINAL | RECORD_STATISTICS | INCLUDE_DESTINATION_ID),
    MYSQL => (2100, "MYSQL", NORMAL_SCHEMA, TERMINAL | RECORD_STATISTICS | INCLUDE_DESTINATION_ID),
    INTERNAL_METHOD => (5000, "INTERNAL_METHOD", NORMAL_SCHEMA, 0),
    REDIS => (8200, "REDIS", FAST_SCHEMA, TERMINAL | RECORD_STATISTICS),
    KAFKA_CLIENT => (8660, "KAFKA_CLIENT", NORMAL_SCHEMA, QUEUE | RECORD_STATISTICS),
    HTTP_CLIENT => (9050, "HTTP_CLIENT_4", NORMAL_SCHEMA, RECORD_STATISTICS),
}

impl ServiceType {
    pub fn find(code: i16) -> Option<ServiceType> {
        Self::REGISTERED.iter().copied().find(|t| t.code == code)
    }

    /// Resolves a code, falling back to [`ServiceType::UNDEFINED`] for unregistered codes.
    pub fn from_code(code: i16) -> ServiceType {
        Self::find(code).unwrap_or_else(|| {
            debug!("unregistered service type code {code}");
            ServiceType::UNDEFINED
        })
    }

    pub fn from_name(name: &str) -> Option<ServiceType> {
        Self::REGISTERED.iter().copied().find(|t| t.name == name)
    }

    pub fn code(&self) -> i16 {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn histogram_schema(&self) -> &HistogramSchema {
        &self.schema
    }

    pub fn is_terminal(&self) -> bool {
        self.flags & TERMINAL != 0
    }

    pub fn is_queue(&self) -> bool {
        self.flags & QUEUE != 0
    }

    pub fn is_record_statistics(&self) -> bool {
        self.flags & RECORD_STATISTICS != 0
    }

    pub fn is_include_destination_id(&self) -> bool {
        self.flags & INCLUDE_DESTINATION_ID != 0
    }

    pub fn is_was(&self) -> bool {
        (1000..2000).contains(&self.code)
    }

    pub fn is_rpc_client(&self) -> bool {
        (9000..10000).contains(&self.code)
    }

    pub fn is_user(&self) -> bool {
        self.code == ServiceType::USER.code
    }

    pub fn is_unknown(&self) -> bool {
        self.code == ServiceType::UNKNOWN.code || self.code == ServiceType::UNDEFINED.code
    }
}

impl PartialEq for ServiceType {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for ServiceType {}

impl Hash for ServiceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl PartialOrd for ServiceType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code.cmp(&other.code)
    }
}

impl fmt::Debug for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.code)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl Serialize for ServiceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}
