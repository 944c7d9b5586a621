// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::service_type::HistogramSchema;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::ops::{Deref, DerefMut};

/// A response-time bucket. `Sum` and `Max` carry elapsed totals rather than call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotType {
    Fast,
    Normal,
    Slow,
    VerySlow,
    Error,
    Sum,
    Max,
}

impl SlotType {
    pub const ALL: [SlotType; 7] = [
        SlotType::Fast,
        SlotType::Normal,
        SlotType::Slow,
        SlotType::VerySlow,
        SlotType::Error,
        SlotType::Sum,
        SlotType::Max,
    ];

    /// Slots that count calls, in display order.
    pub const COUNTED: [SlotType; 5] = [
        SlotType::Fast,
        SlotType::Normal,
        SlotType::Slow,
        SlotType::VerySlow,
        SlotType::Error,
    ];
}

/// Response-time histogram under one schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Histogram {
    schema: HistogramSchema,
    fast: i64,
    normal: i64,
    slow: i64,
    very_slow: i64,
    error: i64,
    sum_elapsed: i64,
    max_elapsed: i64,
}

impl Histogram {
    pub fn new(schema: HistogramSchema) -> Self {
        Self {
            schema,
            fast: 0,
            normal: 0,
            slow: 0,
            very_slow: 0,
            error: 0,
            sum_elapsed: 0,
            max_elapsed: 0,
        }
    }

    pub fn schema(&self) -> &HistogramSchema {
        &self.schema
    }

    /// Counts one call in the slot its elapsed time falls into.
    pub fn add_call_count_by_elapsed_time(&mut self, elapsed: i32, error: bool) {
        let slot = self.schema.find_slot(elapsed, error);
        self.add(slot, 1);
    }

    pub fn add(&mut self, slot: SlotType, value: i64) {
        match slot {
            SlotType::Fast => self.fast += value,
            SlotType::Normal => self.normal += value,
            SlotType::Slow => self.slow += value,
            SlotType::VerySlow => self.very_slow += value,
            SlotType::Error => self.error += value,
            SlotType::Sum => self.sum_elapsed += value,
            SlotType::Max => self.max_elapsed = self.max_elapsed.max(value),
        }
    }

    pub fn add_by_code(&mut self, slot_code: i16, value: i64) -> bool {
        match self.schema.slot_by_code(slot_code) {
            Some(slot) => {
                self.add(slot, value);
                true
            }
            None => false,
        }
    }

    pub fn merge(&mut self, other: &Histogram) {
        self.fast += other.fast;
        self.normal += other.normal;
        self.slow += other.slow;
        self.very_slow += other.very_slow;
        self.error += other.error;
        self.sum_elapsed += other.sum_elapsed;
        self.max_elapsed = self.max_elapsed.max(other.max_elapsed);
    }

    pub fn get(&self, slot: SlotType) -> i64 {
        match slot {
            SlotType::Fast => self.fast,
            SlotType::Normal => self.normal,
            SlotType::Slow => self.slow,
            SlotType::VerySlow => self.very_slow,
            SlotType::Error => self.error,
            SlotType::Sum => self.sum_elapsed,
            SlotType::Max => self.max_elapsed,
        }
    }

    pub fn total_count(&self) -> i64 {
        self.fast + self.normal + self.slow + self.very_slow + self.error
    }

    pub fn slow_count(&self) -> i64 {
        self.slow + self.very_slow
    }

    pub fn error_count(&self) -> i64 {
        self.error
    }

    pub fn sum_elapsed(&self) -> i64 {
        self.sum_elapsed
    }

    pub fn max_elapsed(&self) -> i64 {
        self.max_elapsed
    }

    pub fn avg_elapsed(&self) -> i64 {
        let calls = self.total_count();
        if calls == 0 {
            0
        } else {
            self.sum_elapsed / calls
        }
    }
}

impl Serialize for Histogram {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SlotType::COUNTED.len()))?;
        for slot in SlotType::COUNTED {
            map.serialize_entry(&self.schema.slot_label(slot), &self.get(slot))?;
        }
        map.end()
    }
}

/// Histogram of one time slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeHistogram {
    pub timestamp: i64,
    #[serde(flatten)]
    histogram: Histogram,
}

impl TimeHistogram {
    pub fn new(schema: HistogramSchema, timestamp: i64) -> Self {
        Self {
            timestamp,
            histogram: Histogram::new(schema),
        }
    }
}

impl Deref for TimeHistogram {
    type Target = Histogram;

    fn deref(&self) -> &Histogram {
        &self.histogram
    }
}

impl DerefMut for TimeHistogram {
    fn deref_mut(&mut self) -> &mut Histogram {
        &mut self.histogram
    }
}
