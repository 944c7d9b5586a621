// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Call data between applications, as read back from the statistics tables.

use fnv::FnvBuildHasher;
use pinpoint_common::application::Application;
use pinpoint_common::histogram::{Histogram, SlotType, TimeHistogram};
use pinpoint_common::service_type::HistogramSchema;
use std::collections::BTreeMap;
use tracing::debug;

pub type FnvHashMap<K, V> = hashbrown::HashMap<K, V, FnvBuildHasher>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{from} -> {to}")]
pub struct LinkKey {
    pub from: Application,
    pub to: Application,
}

impl LinkKey {
    pub fn new(from: Application, to: Application) -> Self {
        Self { from, to }
    }
}

/// Calls between one source (caller agent) and one target (callee host) of a link, per time slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCallData {
    source: Application,
    target: Application,
    schema: HistogramSchema,
    time_histograms: BTreeMap<i64, TimeHistogram>,
}

impl LinkCallData {
    pub fn new(source: Application, target: Application) -> Self {
        Self {
            source,
            target,
            schema: *target.service_type().histogram_schema(),
            time_histograms: BTreeMap::new(),
        }
    }

    pub fn source(&self) -> &Application {
        &self.source
    }

    pub fn target(&self) -> &Application {
        &self.target
    }

    pub fn add_call_data(&mut self, timestamp: i64, slot: SlotType, count: i64) {
        let schema = self.schema;
        self.time_histograms
            .entry(timestamp)
            .or_insert_with(|| TimeHistogram::new(schema, timestamp))
            .add(slot, count);
    }

    pub fn add_time_histogram(&mut self, time_histogram: &TimeHistogram) {
        let schema = self.schema;
        let timestamp = time_histogram.timestamp;
        self.time_histograms
            .entry(timestamp)
            .or_insert_with(|| TimeHistogram::new(schema, timestamp))
            .merge(time_histogram);
    }

    pub fn merge(&mut self, other: &LinkCallData) {
        for time_histogram in other.time_histograms.values() {
            self.add_time_histogram(time_histogram);
        }
    }

    /// Time histograms ordered by timestamp.
    pub fn time_histograms(&self) -> impl Iterator<Item = &TimeHistogram> {
        self.time_histograms.values()
    }

    pub fn histogram(&self) -> Histogram {
        let mut histogram = Histogram::new(self.schema);
        for time_histogram in self.time_histograms.values() {
            histogram.merge(time_histogram);
        }
        histogram
    }

    pub fn total_count(&self) -> i64 {
        self.time_histograms.values().map(|h| h.total_count()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkCallDataMap {
    call_data: BTreeMap<LinkKey, LinkCallData>,
}

impl LinkCallDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_call_data(
        &mut self,
        source: Application,
        target: Application,
        timestamp: i64,
        slot: SlotType,
        count: i64,
    ) {
        self.call_data
            .entry(LinkKey::new(source, target))
            .or_insert_with(|| LinkCallData::new(source, target))
            .add_call_data(timestamp, slot, count);
    }

    pub fn add_time_histograms<'a>(
        &mut self,
        source: Application,
        target: Application,
        time_histograms: impl IntoIterator<Item = &'a TimeHistogram>,
    ) {
        let call_data = self
            .call_data
            .entry(LinkKey::new(source, target))
            .or_insert_with(|| LinkCallData::new(source, target));
        for time_histogram in time_histograms {
            call_data.add_time_histogram(time_histogram);
        }
    }

    pub fn merge(&mut self, other: &LinkCallDataMap) {
        for (key, call_data) in &other.call_data {
            self.call_data
                .entry(*key)
                .or_insert_with(|| LinkCallData::new(key.from, key.to))
                .merge(call_data);
        }
    }

    pub fn link_call_data(&self) -> impl Iterator<Item = &LinkCallData> {
        self.call_data.values()
    }

    pub fn len(&self) -> usize {
        self.call_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_data.is_empty()
    }

    /// Calls of all sources merged per timestamp.
    pub fn time_histograms(&self, schema: HistogramSchema) -> Vec<TimeHistogram> {
        let mut merged: BTreeMap<i64, TimeHistogram> = BTreeMap::new();
        for time_histogram in self.call_data.values().flat_map(LinkCallData::time_histograms) {
            let timestamp = time_histogram.timestamp;
            merged
                .entry(timestamp)
                .or_insert_with(|| TimeHistogram::new(schema, timestamp))
                .merge(time_histogram);
        }
        merged.into_values().collect()
    }

    pub fn total_count(&self) -> i64 {
        self.call_data.values().map(LinkCallData::total_count).sum()
    }
}

/// All call data from one application to another.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkData {
    from: Application,
    to: Application,
    link_call_data_map: LinkCallDataMap,
}

impl LinkData {
    pub fn new(from: Application, to: Application) -> Self {
        Self {
            from,
            to,
            link_call_data_map: LinkCallDataMap::new(),
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey::new(self.from, self.to)
    }

    pub fn from_application(&self) -> &Application {
        &self.from
    }

    pub fn to_application(&self) -> &Application {
        &self.to
    }

    pub fn link_call_data_map(&self) -> &LinkCallDataMap {
        &self.link_call_data_map
    }

    /// Counts `count` calls from `source_agent` to `target_host`, in the slot identified by
    /// `slot_code` under the target's histogram schema. Unknown codes are skipped.
    pub fn add_link_data(
        &mut self,
        source_agent: &str,
        target_host: &str,
        timestamp: i64,
        slot_code: i16,
        count: i64,
    ) -> bool {
        let Some(slot) = self
            .to
            .service_type()
            .histogram_schema()
            .slot_by_code(slot_code)
        else {
            debug!("unknown slot code {slot_code} on link {}", self.key());
            return false;
        };
        let source = Application::new(source_agent, self.from.service_type());
        let target = Application::new(target_host, self.to.service_type());
        self.link_call_data_map
            .add_call_data(source, target, timestamp, slot, count);
        true
    }

    pub fn merge(&mut self, other: &LinkData) {
        self.link_call_data_map.merge(&other.link_call_data_map);
    }

    pub fn histogram(&self) -> Histogram {
        let mut histogram = Histogram::new(*self.to.service_type().histogram_schema());
        for call_data in self.link_call_data_map.link_call_data() {
            histogram.merge(&call_data.histogram());
        }
        histogram
    }

    pub fn time_histograms(&self) -> Vec<TimeHistogram> {
        self.link_call_data_map
            .time_histograms(*self.to.service_type().histogram_schema())
    }

    pub fn total_count(&self) -> i64 {
        self.link_call_data_map.total_count()
    }

    /// Calls received by each target host of this link.
    pub fn target_histograms(&self) -> BTreeMap<String, Histogram> {
        let schema = *self.to.service_type().histogram_schema();
        let mut histograms: BTreeMap<String, Histogram> = BTreeMap::new();
        for call_data in self.link_call_data_map.link_call_data() {
            histograms
                .entry(call_data.target().name().to_string())
                .or_insert_with(|| Histogram::new(schema))
                .merge(&call_data.histogram());
        }
        histograms
    }
}

/// Links keyed by `(from, to)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkDataMap {
    link_data: FnvHashMap<LinkKey, LinkData>,
}

impl LinkDataMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_link_data(
        &mut self,
        from: Application,
        source_agent: &str,
        to: Application,
        target_host: &str,
        timestamp: i64,
        slot_code: i16,
        count: i64,
    ) -> bool {
        self.link_data
            .entry(LinkKey::new(from, to))
            .or_insert_with(|| LinkData::new(from, to))
            .add_link_data(source_agent, target_host, timestamp, slot_code, count)
    }

    pub fn insert(&mut self, link_data: LinkData) {
        match self.link_data.get_mut(&link_data.key()) {
            Some(existing) => existing.merge(&link_data),
            None => {
                self.link_data.insert(link_data.key(), link_data);
            }
        }
    }

    pub fn merge(&mut self, other: LinkDataMap) {
        for link_data in other.link_data.into_values() {
            self.insert(link_data);
        }
    }

    pub fn get(&self, key: &LinkKey) -> Option<&LinkData> {
        self.link_data.get(key)
    }

    pub fn link_data(&self) -> impl Iterator<Item = &LinkData> {
        self.link_data.values()
    }

    pub fn into_link_data(self) -> impl Iterator<Item = LinkData> {
        self.link_data.into_values()
    }

    /// Links ending at `to`.
    pub fn links_to<'a>(&'a self, to: &'a Application) -> impl Iterator<Item = &'a LinkData> {
        self.link_data.values().filter(move |link| link.to == *to)
    }

    /// Links starting at `from`.
    pub fn links_from<'a>(&'a self, from: &'a Application) -> impl Iterator<Item = &'a LinkData> {
        self.link_data.values().filter(move |link| link.from == *from)
    }

    pub fn len(&self) -> usize {
        self.link_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.link_data.is_empty()
    }
}

/// Outbound links (read from caller rows) paired with inbound links (read from callee rows).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkDataDuplexMap {
    out_link: LinkDataMap,
    in_link: LinkDataMap,
}

impl LinkDataDuplexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_out_link_data_map(&mut self, link_data_map: LinkDataMap) {
        self.out_link.merge(link_data_map);
    }

    pub fn add_in_link_data_map(&mut self, link_data_map: LinkDataMap) {
        self.in_link.merge(link_data_map);
    }

    pub fn out_link(&self) -> &LinkDataMap {
        &self.out_link
    }

    pub fn in_link(&self) -> &LinkDataMap {
        &self.in_link
    }

    /// Link entries on both sides; an edge seen from both ends counts twice.
    pub fn total_count(&self) -> usize {
        self.out_link.len() + self.in_link.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out_link.is_empty() && self.in_link.is_empty()
    }
}
