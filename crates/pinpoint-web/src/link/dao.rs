// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Readers of the three statistics tables the collector writes.

use crate::link::data::LinkDataMap;
use crate::time_window::TimeWindow;
use async_trait::async_trait;
use futures::future::try_join_all;
use pinpoint_common::application::Application;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::errors::StoreError;
use pinpoint_common::histogram::{Histogram, TimeHistogram};
use pinpoint_common::service_type::ServiceType;
use pinpoint_common::statistics::{
    CallRowKey, CalleeColumnName, CallerColumnName, ResponseColumnName,
};
use pinpoint_common::store::{Row, Store};
use pinpoint_common::table::{ColumnFamily, TableName, TableNameProvider};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait MapOutLinkDao: Send + Sync {
    /// Links from `out_application` to everything it called within the window.
    async fn select_out_link(
        &self,
        out_application: &Application,
        time_window: &TimeWindow,
        time_aggregated: bool,
    ) -> Result<LinkDataMap, StoreError>;
}

#[async_trait]
pub trait MapInLinkDao: Send + Sync {
    /// Links from every caller of `in_application` within the window.
    async fn select_in_link(
        &self,
        in_application: &Application,
        time_window: &TimeWindow,
        time_aggregated: bool,
    ) -> Result<LinkDataMap, StoreError>;
}

#[async_trait]
pub trait MapResponseDao: Send + Sync {
    /// One entry per time slot that has data, oldest first.
    async fn select_response_time(
        &self,
        application: &Application,
        time_window: &TimeWindow,
    ) -> Result<Vec<ResponseTime>, StoreError>;
}

/// Response times of one application in one time slot, per agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTime {
    application: Application,
    timestamp: i64,
    agent_histograms: BTreeMap<String, TimeHistogram>,
}

impl ResponseTime {
    pub fn new(application: Application, timestamp: i64) -> Self {
        Self {
            application,
            timestamp,
            agent_histograms: BTreeMap::new(),
        }
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn schema_histogram(&self) -> TimeHistogram {
        TimeHistogram::new(
            *self.application.service_type().histogram_schema(),
            self.timestamp,
        )
    }

    pub fn add_response_time(&mut self, agent_id: &str, slot_code: i16, count: i64) -> bool {
        let mut histogram = self.schema_histogram();
        if !histogram.add_by_code(slot_code, count) {
            return false;
        }
        self.add_histogram(agent_id, &histogram);
        true
    }

    pub fn add_histogram(&mut self, agent_id: &str, histogram: &Histogram) {
        let empty = self.schema_histogram();
        self.agent_histograms
            .entry(agent_id.to_string())
            .or_insert(empty)
            .merge(histogram);
    }

    pub fn agent_histograms(&self) -> impl Iterator<Item = (&str, &TimeHistogram)> {
        self.agent_histograms
            .iter()
            .map(|(agent_id, histogram)| (agent_id.as_str(), histogram))
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agent_histograms.keys().map(String::as_str)
    }

    /// All agents merged.
    pub fn application_histogram(&self) -> TimeHistogram {
        let mut merged = self.schema_histogram();
        for histogram in self.agent_histograms.values() {
            merged.merge(histogram);
        }
        merged
    }

    pub fn total_count(&self) -> i64 {
        self.agent_histograms.values().map(|h| h.total_count()).sum()
    }
}

/// Shared plumbing of the store-backed readers: salted scans of one application's rows.
#[derive(Clone)]
struct StatisticsReader {
    store: Arc<dyn Store>,
    distributor: Arc<RowKeyDistributorByHashPrefix>,
    table: TableName,
}

impl StatisticsReader {
    fn new(
        store: Arc<dyn Store>,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: &TableNameProvider,
        column_family: &ColumnFamily,
    ) -> Self {
        Self {
            store,
            distributor,
            table: table_names.table_name(column_family),
        }
    }

    /// Rows of `application` whose time slot falls in the window, every salt bucket included.
    async fn scan(
        &self,
        application: &Application,
        time_window: &TimeWindow,
    ) -> Result<Vec<(CallRowKey, Row)>, StoreError> {
        let range = time_window.range();
        let (start, stop) = match CallRowKey::scan_range(
            application.name(),
            application.service_type().code(),
            range.from(),
            range.to(),
        ) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("no statistics for {application}: {e}");
                return Ok(Vec::new());
            }
        };

        let scans = self
            .distributor
            .scan_ranges(&start, &stop)
            .into_iter()
            .map(|(start, stop)| async move { self.store.scan(self.table, &start, &stop).await });
        let buckets = try_join_all(scans).await?;

        let mut rows = Vec::new();
        for row in buckets.into_iter().flatten() {
            let row_key = self
                .distributor
                .original_key(&row.key)
                .map_err(Into::into)
                .and_then(CallRowKey::decode);
            match row_key {
                Ok(row_key) => rows.push((row_key, row)),
                Err(e) => warn!("skipping malformed row in {}: {}", self.table, e),
            }
        }
        debug!(
            "{} rows of {} in {} for {:?}",
            rows.len(),
            application,
            self.table,
            range
        );
        Ok(rows)
    }
}

fn link_timestamp(time_window: &TimeWindow, time_slot: i64, time_aggregated: bool) -> i64 {
    if time_aggregated {
        time_window.window_range().from()
    } else {
        time_window.refine_timestamp(time_slot)
    }
}

/// Reads outbound links from the caller table.
pub struct StoreMapOutLinkDao {
    reader: StatisticsReader,
}

impl StoreMapOutLinkDao {
    pub fn new(
        store: Arc<dyn Store>,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: &TableNameProvider,
    ) -> Self {
        Self {
            reader: StatisticsReader::new(
                store,
                distributor,
                table_names,
                &ColumnFamily::MAP_STATISTICS_CALLER_COUNTER,
            ),
        }
    }
}

#[async_trait]
impl MapOutLinkDao for StoreMapOutLinkDao {
    async fn select_out_link(
        &self,
        out_application: &Application,
        time_window: &TimeWindow,
        time_aggregated: bool,
    ) -> Result<LinkDataMap, StoreError> {
        let mut link_data_map = LinkDataMap::new();
        for (row_key, row) in self.reader.scan(out_application, time_window).await? {
            let timestamp = link_timestamp(time_window, row_key.time_slot(), time_aggregated);
            for cell in &row.cells {
                let (Ok(column), Some(count)) =
                    (CalleeColumnName::decode(&cell.qualifier), cell.value_as_i64())
                else {
                    warn!("skipping malformed caller cell of {out_application}");
                    continue;
                };
                let callee = Application::new(
                    &column.callee_application_name,
                    ServiceType::from_code(column.callee_service_type),
                );
                link_data_map.add_link_data(
                    *out_application,
                    &column.caller_agent_id,
                    callee,
                    &column.callee_host,
                    timestamp,
                    column.slot,
                    count,
                );
            }
        }
        Ok(link_data_map)
    }
}

/// Reads inbound links from the callee table.
pub struct StoreMapInLinkDao {
    reader: StatisticsReader,
}

impl StoreMapInLinkDao {
    pub fn new(
        store: Arc<dyn Store>,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: &TableNameProvider,
    ) -> Self {
        Self {
            reader: StatisticsReader::new(
                store,
                distributor,
                table_names,
                &ColumnFamily::MAP_STATISTICS_CALLEE_COUNTER,
            ),
        }
    }
}

#[async_trait]
impl MapInLinkDao for StoreMapInLinkDao {
    async fn select_in_link(
        &self,
        in_application: &Application,
        time_window: &TimeWindow,
        time_aggregated: bool,
    ) -> Result<LinkDataMap, StoreError> {
        let mut link_data_map = LinkDataMap::new();
        for (row_key, row) in self.reader.scan(in_application, time_window).await? {
            let timestamp = link_timestamp(time_window, row_key.time_slot(), time_aggregated);
            for cell in &row.cells {
                let (Ok(column), Some(count)) =
                    (CallerColumnName::decode(&cell.qualifier), cell.value_as_i64())
                else {
                    warn!("skipping malformed callee cell of {in_application}");
                    continue;
                };
                let caller = Application::new(
                    &column.caller_application_name,
                    ServiceType::from_code(column.caller_service_type),
                );
                link_data_map.add_link_data(
                    caller,
                    caller.name(),
                    *in_application,
                    &column.callee_host,
                    timestamp,
                    column.slot,
                    count,
                );
            }
        }
        Ok(link_data_map)
    }
}

/// Reads per-agent response times from the self table.
pub struct StoreMapResponseDao {
    reader: StatisticsReader,
}

impl StoreMapResponseDao {
    pub fn new(
        store: Arc<dyn Store>,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: &TableNameProvider,
    ) -> Self {
        Self {
            reader: StatisticsReader::new(
                store,
                distributor,
                table_names,
                &ColumnFamily::MAP_STATISTICS_SELF_COUNTER,
            ),
        }
    }
}

#[async_trait]
impl MapResponseDao for StoreMapResponseDao {
    async fn select_response_time(
        &self,
        application: &Application,
        time_window: &TimeWindow,
    ) -> Result<Vec<ResponseTime>, StoreError> {
        let mut response_times: BTreeMap<i64, ResponseTime> = BTreeMap::new();
        for (row_key, row) in self.reader.scan(application, time_window).await? {
            let timestamp = row_key.time_slot();
            let response_time = response_times
                .entry(timestamp)
                .or_insert_with(|| ResponseTime::new(*application, timestamp));
            for cell in &row.cells {
                let (Ok(column), Some(count)) =
                    (ResponseColumnName::decode(&cell.qualifier), cell.value_as_i64())
                else {
                    warn!("skipping malformed response cell of {application}");
                    continue;
                };
                if !response_time.add_response_time(&column.agent_id, column.slot, count) {
                    debug!("unknown slot code {} for {application}", column.slot);
                }
            }
        }
        Ok(response_times.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::data::LinkKey;
    use crate::time_window::Range;
    use pinpoint_common::histogram::SlotType;
    use pinpoint_common::statistics::{ColumnName, RowKey};
    use pinpoint_common::store::{Increment, InMemoryStore};

    const SLOT: i64 = 1_409_814_900_000;

    struct Fixture {
        store: Arc<InMemoryStore>,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: TableNameProvider,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryStore::new()),
                distributor: Arc::new(RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid")),
                table_names: TableNameProvider::default(),
            }
        }

        async fn write(
            &self,
            column_family: &ColumnFamily,
            row_key: &CallRowKey,
            column: &dyn ColumnName,
            value: i64,
        ) {
            let mut increment = Increment::new(
                self.distributor.distributed_key(&row_key.row_key(0)),
                column_family.family.to_vec(),
            );
            increment.add_column(column.column_name(), value);
            self.store
                .increment(self.table_names.table_name(column_family), increment)
                .await
                .expect("write");
        }

        fn window(&self) -> TimeWindow {
            TimeWindow::new(Range::new(SLOT - 60_000, SLOT + 59_999).expect("valid"))
        }
    }

    fn orders() -> Application {
        Application::new("order-api", ServiceType::TOMCAT)
    }

    #[tokio::test]
    async fn test_out_link_rows() {
        let f = Fixture::new();
        let row_key = CallRowKey::new("order-api", 1010, SLOT).expect("valid");
        let column = |slot: i16| CalleeColumnName {
            callee_service_type: ServiceType::MYSQL.code(),
            callee_application_name: "orders-db".to_string(),
            callee_host: "10.0.0.9:3306".to_string(),
            slot,
            caller_agent_id: "orders-1".to_string(),
        };
        let family = ColumnFamily::MAP_STATISTICS_CALLER_COUNTER;
        f.write(&family, &row_key, &column(1000), 3).await;
        f.write(&family, &row_key, &column(-1), 1).await;
        // outside the window
        let old = CallRowKey::new("order-api", 1010, SLOT - 600_000).expect("valid");
        f.write(&family, &old, &column(1000), 100).await;

        let dao = StoreMapOutLinkDao::new(f.store.clone(), f.distributor.clone(), &f.table_names);
        let links = dao
            .select_out_link(&orders(), &f.window(), false)
            .await
            .expect("read");
        let db = Application::new("orders-db", ServiceType::MYSQL);
        let link = links.get(&LinkKey::new(orders(), db)).expect("link");
        assert_eq!(link.total_count(), 4);
        assert_eq!(link.histogram().error_count(), 1);
        assert_eq!(link.time_histograms()[0].timestamp, SLOT);
        assert!(link.target_histograms().contains_key("10.0.0.9:3306"));
    }

    #[tokio::test]
    async fn test_in_link_rows_and_aggregation() {
        let f = Fixture::new();
        let family = ColumnFamily::MAP_STATISTICS_CALLEE_COUNTER;
        let column = CallerColumnName {
            caller_service_type: ServiceType::SPRING_BOOT.code(),
            caller_application_name: "front".to_string(),
            callee_host: "order-api:8080".to_string(),
            slot: 3000,
        };
        for slot in [SLOT - 60_000, SLOT] {
            let row_key = CallRowKey::new("order-api", 1010, slot).expect("valid");
            f.write(&family, &row_key, &column, 2).await;
        }

        let dao = StoreMapInLinkDao::new(f.store.clone(), f.distributor.clone(), &f.table_names);
        let front = Application::new("front", ServiceType::SPRING_BOOT);
        let links = dao
            .select_in_link(&orders(), &f.window(), false)
            .await
            .expect("read");
        let link = links.get(&LinkKey::new(front, orders())).expect("link");
        assert_eq!(link.time_histograms().len(), 2);
        assert_eq!(link.histogram().get(SlotType::Normal), 4);

        let aggregated = dao
            .select_in_link(&orders(), &f.window(), true)
            .await
            .expect("read");
        let link = aggregated.get(&LinkKey::new(front, orders())).expect("link");
        assert_eq!(link.time_histograms().len(), 1);
        assert_eq!(link.total_count(), 4);
    }

    #[tokio::test]
    async fn test_response_rows_per_agent() {
        let f = Fixture::new();
        let family = ColumnFamily::MAP_STATISTICS_SELF_COUNTER;
        let row_key = CallRowKey::new("order-api", 1010, SLOT).expect("valid");
        for (agent, slot, count) in [("orders-1", 1000, 5), ("orders-2", 0, 2), ("orders-2", -3, 7000)] {
            let column = ResponseColumnName {
                slot,
                agent_id: agent.to_string(),
            };
            f.write(&family, &row_key, &column, count).await;
        }

        let dao = StoreMapResponseDao::new(f.store.clone(), f.distributor.clone(), &f.table_names);
        let response_times = dao
            .select_response_time(&orders(), &f.window())
            .await
            .expect("read");
        assert_eq!(response_times.len(), 1);
        let response_time = &response_times[0];
        assert_eq!(response_time.timestamp(), SLOT);
        assert_eq!(response_time.total_count(), 7);
        assert_eq!(response_time.agent_ids().collect::<Vec<_>>(), vec!["orders-1", "orders-2"]);
        assert_eq!(response_time.application_histogram().max_elapsed(), 7000);
        assert_eq!(response_time.application_histogram().slow_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_application_is_empty() {
        let f = Fixture::new();
        let dao = StoreMapOutLinkDao::new(f.store.clone(), f.distributor.clone(), &f.table_names);
        let missing = Application::new("missing", ServiceType::TOMCAT);
        assert!(dao
            .select_out_link(&missing, &f.window(), false)
            .await
            .expect("read")
            .is_empty());
    }
}
