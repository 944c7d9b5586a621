// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Data windows the alarm checkers read. A collector fetches its window once.

use crate::alarm::rule::DataCollectorCategory;
use crate::errors::AlarmError;
use crate::link::dao::{MapOutLinkDao, MapResponseDao};
use crate::time_window::{Range, TimeWindow};
use pinpoint_common::application::Application;
use pinpoint_common::histogram::Histogram;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Call counts behind one checker value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCount {
    pub total: i64,
    pub slow: i64,
    pub error: i64,
}

impl CallCount {
    fn add(&mut self, histogram: &Histogram) {
        self.total += histogram.total_count();
        self.slow += histogram.slow_count();
        self.error += histogram.error_count();
    }
}

/// Response times of the rule's application over the last interval.
pub struct ResponseTimeDataCollector {
    application: Application,
    dao: Arc<dyn MapResponseDao>,
    time_slot_end_time: i64,
    slot_interval: i64,
    count: Option<CallCount>,
}

impl ResponseTimeDataCollector {
    pub fn new(
        application: Application,
        dao: Arc<dyn MapResponseDao>,
        time_slot_end_time: i64,
        slot_interval: i64,
    ) -> Self {
        Self {
            application,
            dao,
            time_slot_end_time,
            slot_interval,
            count: None,
        }
    }

    async fn collect(&mut self) -> Result<(), AlarmError> {
        if self.count.is_some() {
            return Ok(());
        }
        let range = Range::ending_at(self.time_slot_end_time, self.slot_interval)?;
        let mut count = CallCount::default();
        for response_time in self
            .dao
            .select_response_time(&self.application, &TimeWindow::new(range))
            .await?
        {
            for (_, histogram) in response_time.agent_histograms() {
                count.add(histogram);
            }
        }
        debug!("{} response time {:?}", self.application, count);
        self.count = Some(count);
        Ok(())
    }

    /// Zero until collected.
    pub fn count(&self) -> CallCount {
        self.count.unwrap_or_default()
    }
}

/// Calls the rule's application made to each callee over the last interval.
pub struct MapOutLinkDataCollector {
    application: Application,
    dao: Arc<dyn MapOutLinkDao>,
    time_slot_end_time: i64,
    slot_interval: i64,
    callee_counts: Option<BTreeMap<String, CallCount>>,
}

impl MapOutLinkDataCollector {
    pub fn new(
        application: Application,
        dao: Arc<dyn MapOutLinkDao>,
        time_slot_end_time: i64,
        slot_interval: i64,
    ) -> Self {
        Self {
            application,
            dao,
            time_slot_end_time,
            slot_interval,
            callee_counts: None,
        }
    }

    async fn collect(&mut self) -> Result<(), AlarmError> {
        if self.callee_counts.is_some() {
            return Ok(());
        }
        let range = Range::ending_at(self.time_slot_end_time, self.slot_interval)?;
        let link_data_map = self
            .dao
            .select_out_link(&self.application, &TimeWindow::new(range), false)
            .await?;
        let mut callee_counts: BTreeMap<String, CallCount> = BTreeMap::new();
        for link_data in link_data_map.link_data() {
            callee_counts
                .entry(link_data.to_application().name().to_string())
                .or_default()
                .add(&link_data.histogram());
        }
        debug!(
            "{} calls {} callees",
            self.application,
            callee_counts.len()
        );
        self.callee_counts = Some(callee_counts);
        Ok(())
    }

    /// Calls to every callee of that name, whatever its type. Zero when absent.
    pub fn callee_count(&self, callee_name: &str) -> CallCount {
        self.callee_counts
            .as_ref()
            .and_then(|counts| counts.get(callee_name))
            .copied()
            .unwrap_or_default()
    }
}

pub enum DataCollector {
    ResponseTime(ResponseTimeDataCollector),
    CallerStat(MapOutLinkDataCollector),
}

impl DataCollector {
    pub fn category(&self) -> DataCollectorCategory {
        match self {
            DataCollector::ResponseTime(_) => DataCollectorCategory::ResponseTime,
            DataCollector::CallerStat(_) => DataCollectorCategory::CallerStat,
        }
    }

    /// Fetches the window `[end - interval, end]`. Later calls keep the first result.
    pub async fn collect(&mut self) -> Result<(), AlarmError> {
        match self {
            DataCollector::ResponseTime(collector) => collector.collect().await,
            DataCollector::CallerStat(collector) => collector.collect().await,
        }
    }
}
