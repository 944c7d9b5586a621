// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Response-time histograms attached to map nodes.

use crate::link::dao::MapResponseDao;
use crate::link::data::{LinkData, LinkDataDuplexMap};
use crate::time_window::TimeWindow;
use async_trait::async_trait;
use pinpoint_common::application::Application;
use pinpoint_common::errors::StoreError;
use pinpoint_common::histogram::{Histogram, TimeHistogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHistogram {
    #[serde(skip)]
    application: Application,
    #[serde(rename = "histogram")]
    application_histogram: Histogram,
    #[serde(rename = "agentHistogram", skip_serializing_if = "BTreeMap::is_empty")]
    agent_histograms: BTreeMap<String, Histogram>,
    #[serde(rename = "timeSeriesHistogram")]
    application_time_histograms: Vec<TimeHistogram>,
    #[serde(
        rename = "agentTimeSeriesHistogram",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    agent_time_histograms: BTreeMap<String, Vec<TimeHistogram>>,
}

impl NodeHistogram {
    pub fn empty(application: Application) -> Self {
        Self {
            application,
            application_histogram: Histogram::new(*application.service_type().histogram_schema()),
            agent_histograms: BTreeMap::new(),
            application_time_histograms: Vec::new(),
            agent_time_histograms: BTreeMap::new(),
        }
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn application_histogram(&self) -> &Histogram {
        &self.application_histogram
    }

    /// Per agent for WAS nodes, per host for nodes built from links.
    pub fn agent_histograms(&self) -> &BTreeMap<String, Histogram> {
        &self.agent_histograms
    }

    pub fn application_time_histograms(&self) -> &[TimeHistogram] {
        &self.application_time_histograms
    }

    pub fn agent_time_histograms(&self) -> &BTreeMap<String, Vec<TimeHistogram>> {
        &self.agent_time_histograms
    }

    pub fn total_count(&self) -> i64 {
        self.application_histogram.total_count()
    }

    /// Counts `histogram` for the node and for `agent_id`.
    pub fn add_agent_histogram(&mut self, agent_id: &str, histogram: &Histogram) {
        let schema = *self.application.service_type().histogram_schema();
        self.application_histogram.merge(histogram);
        self.agent_histograms
            .entry(agent_id.to_string())
            .or_insert_with(|| Histogram::new(schema))
            .merge(histogram);
    }
}

#[async_trait]
pub trait NodeHistogramFactory: Send + Sync {
    async fn create_node_histogram(
        &self,
        application: &Application,
        link_data_duplex_map: &LinkDataDuplexMap,
        time_window: &TimeWindow,
    ) -> Result<NodeHistogram, StoreError>;
}

/// WAS nodes: one merged histogram from the response table, no agent breakdown.
pub struct SimplifiedNodeHistogramFactory {
    response_dao: Arc<dyn MapResponseDao>,
}

impl SimplifiedNodeHistogramFactory {
    pub fn new(response_dao: Arc<dyn MapResponseDao>) -> Self {
        Self { response_dao }
    }
}

#[async_trait]
impl NodeHistogramFactory for SimplifiedNodeHistogramFactory {
    async fn create_node_histogram(
        &self,
        application: &Application,
        link_data_duplex_map: &LinkDataDuplexMap,
        time_window: &TimeWindow,
    ) -> Result<NodeHistogram, StoreError> {
        if !application.service_type().is_was() {
            return Ok(link_node_histogram(application, link_data_duplex_map));
        }
        let mut node_histogram = NodeHistogram::empty(*application);
        let schema = *application.service_type().histogram_schema();
        let mut time_histograms: BTreeMap<i64, TimeHistogram> = BTreeMap::new();
        for response_time in self
            .response_dao
            .select_response_time(application, time_window)
            .await?
        {
            let histogram = response_time.application_histogram();
            node_histogram.application_histogram.merge(&histogram);
            let timestamp = time_window.refine_timestamp(response_time.timestamp());
            time_histograms
                .entry(timestamp)
                .or_insert_with(|| TimeHistogram::new(schema, timestamp))
                .merge(&histogram);
        }
        node_histogram.application_time_histograms = time_histograms.into_values().collect();
        Ok(node_histogram)
    }
}

/// WAS nodes: response table data broken down per agent. Other nodes: calls on their links.
pub struct DefaultNodeHistogramFactory {
    response_dao: Arc<dyn MapResponseDao>,
}

impl DefaultNodeHistogramFactory {
    pub fn new(response_dao: Arc<dyn MapResponseDao>) -> Self {
        Self { response_dao }
    }
}

#[async_trait]
impl NodeHistogramFactory for DefaultNodeHistogramFactory {
    async fn create_node_histogram(
        &self,
        application: &Application,
        link_data_duplex_map: &LinkDataDuplexMap,
        time_window: &TimeWindow,
    ) -> Result<NodeHistogram, StoreError> {
        if !application.service_type().is_was() {
            return Ok(link_node_histogram(application, link_data_duplex_map));
        }
        let schema = *application.service_type().histogram_schema();
        let mut node_histogram = NodeHistogram::empty(*application);
        let mut application_time: BTreeMap<i64, TimeHistogram> = BTreeMap::new();
        let mut agent_time: BTreeMap<String, BTreeMap<i64, TimeHistogram>> = BTreeMap::new();

        for response_time in self
            .response_dao
            .select_response_time(application, time_window)
            .await?
        {
            let timestamp = time_window.refine_timestamp(response_time.timestamp());
            for (agent_id, histogram) in response_time.agent_histograms() {
                node_histogram.add_agent_histogram(agent_id, histogram);
                application_time
                    .entry(timestamp)
                    .or_insert_with(|| TimeHistogram::new(schema, timestamp))
                    .merge(histogram);
                agent_time
                    .entry(agent_id.to_string())
                    .or_default()
                    .entry(timestamp)
                    .or_insert_with(|| TimeHistogram::new(schema, timestamp))
                    .merge(histogram);
            }
        }

        node_histogram.application_time_histograms = application_time.into_values().collect();
        node_histogram.agent_time_histograms = agent_time
            .into_iter()
            .map(|(agent_id, histograms)| (agent_id, histograms.into_values().collect()))
            .collect();
        Ok(node_histogram)
    }
}

/// Histogram of a node without response rows: users, terminal and unknown nodes. Users are
/// measured on the links they start; the others on the links reaching them, keyed by host.
/// Outbound links are preferred since both sides can describe the same calls.
fn link_node_histogram(
    application: &Application,
    link_data_duplex_map: &LinkDataDuplexMap,
) -> NodeHistogram {
    let links: Vec<&LinkData> = if application.service_type().is_user() {
        let links: Vec<_> = link_data_duplex_map.out_link().links_from(application).collect();
        if links.is_empty() {
            link_data_duplex_map.in_link().links_from(application).collect()
        } else {
            links
        }
    } else {
        let links: Vec<_> = link_data_duplex_map.out_link().links_to(application).collect();
        if links.is_empty() {
            link_data_duplex_map.in_link().links_to(application).collect()
        } else {
            links
        }
    };

    let mut node_histogram = NodeHistogram::empty(*application);
    let mut time_histograms: BTreeMap<i64, TimeHistogram> = BTreeMap::new();
    for link_data in links {
        let schema = *link_data.to_application().service_type().histogram_schema();
        node_histogram
            .application_histogram
            .merge(&link_data.histogram());
        for (host, histogram) in link_data.target_histograms() {
            node_histogram
                .agent_histograms
                .entry(host)
                .or_insert_with(|| Histogram::new(schema))
                .merge(&histogram);
        }
        for time_histogram in link_data.time_histograms() {
            let timestamp = time_histogram.timestamp;
            time_histograms
                .entry(timestamp)
                .or_insert_with(|| TimeHistogram::new(schema, timestamp))
                .merge(&time_histogram);
        }
    }
    node_histogram.application_time_histograms = time_histograms.into_values().collect();
    node_histogram
}
