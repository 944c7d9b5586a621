// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::RangeError;
use pinpoint_common::statistics::TIME_SLOT_MILLIS;
use serde::Serialize;

/// Upper bound on the slots a window is split into; wider ranges get wider slots.
const MAX_WINDOW_SLOTS: i64 = 200;

/// Closed time range in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Range {
    from: i64,
    to: i64,
}

impl Range {
    pub fn new(from: i64, to: i64) -> Result<Self, RangeError> {
        if from > to {
            return Err(RangeError { from, to });
        }
        Ok(Self { from, to })
    }

    /// The `duration_millis` ending at `to`.
    pub fn ending_at(to: i64, duration_millis: i64) -> Result<Self, RangeError> {
        Self::new(to - duration_millis, to)
    }

    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }

    pub fn duration_millis(&self) -> i64 {
        self.to - self.from
    }
}

/// A range cut into fixed slots. Statistics are stored per minute, so slots are whole minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    range: Range,
    window_range: Range,
    window_slot_size: i64,
}

impl TimeWindow {
    pub fn new(range: Range) -> Self {
        let minutes = range.duration_millis() / TIME_SLOT_MILLIS + 1;
        let slots_per_window = (minutes + MAX_WINDOW_SLOTS - 1) / MAX_WINDOW_SLOTS;
        Self::with_slot_size(range, slots_per_window.max(1) * TIME_SLOT_MILLIS)
    }

    pub fn with_slot_size(range: Range, window_slot_size: i64) -> Self {
        let window_slot_size = window_slot_size.max(TIME_SLOT_MILLIS);
        let refine = |timestamp: i64| timestamp - timestamp.rem_euclid(window_slot_size);
        Self {
            range,
            window_range: Range {
                from: refine(range.from),
                to: refine(range.to),
            },
            window_slot_size,
        }
    }

    /// The requested range, before slot alignment.
    pub fn range(&self) -> Range {
        self.range
    }

    pub fn window_range(&self) -> Range {
        self.window_range
    }

    pub fn window_slot_size(&self) -> i64 {
        self.window_slot_size
    }

    pub fn refine_timestamp(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.window_slot_size)
    }

    pub fn window_range_count(&self) -> usize {
        (self.window_range.duration_millis() / self.window_slot_size + 1) as usize
    }

    pub fn window_index(&self, timestamp: i64) -> usize {
        ((self.refine_timestamp(timestamp) - self.window_range.from) / self.window_slot_size).max(0)
            as usize
    }

    /// Slot start times, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let Range { from, to } = self.window_range;
        let step = self.window_slot_size as usize;
        (from..=to).step_by(step)
    }
}
