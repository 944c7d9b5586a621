// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::link::data::{LinkData, LinkDataDuplexMap, LinkKey};
use crate::map::histogram::NodeHistogram;
use crate::map::server::ServerGroupList;
use crate::time_window::Range;
use pinpoint_common::application::Application;
use pinpoint_common::histogram::{Histogram, TimeHistogram};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    key: String,
    #[serde(flatten)]
    application: Application,
    is_was: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    node_histogram: Option<NodeHistogram>,
    #[serde(rename = "serverList", skip_serializing_if = "Option::is_none")]
    server_group_list: Option<ServerGroupList>,
}

impl Node {
    pub fn new(application: Application) -> Self {
        Self {
            key: application.to_string(),
            application,
            is_was: application.service_type().is_was(),
            node_histogram: None,
            server_group_list: None,
        }
    }

    pub fn application(&self) -> &Application {
        &self.application
    }

    pub fn node_histogram(&self) -> Option<&NodeHistogram> {
        self.node_histogram.as_ref()
    }

    pub fn set_node_histogram(&mut self, node_histogram: NodeHistogram) {
        self.node_histogram = Some(node_histogram);
    }

    pub fn server_group_list(&self) -> Option<&ServerGroupList> {
        self.server_group_list.as_ref()
    }

    pub fn set_server_group_list(&mut self, server_group_list: ServerGroupList) {
        self.server_group_list = Some(server_group_list);
    }
}

/// Which tables reported an edge. An edge seen only from one side is kept as a half edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Both,
    Out,
    In,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    key: LinkKey,
    direction: LinkDirection,
    histogram: Histogram,
    time_histograms: Vec<TimeHistogram>,
}

impl Link {
    /// Caller-side data wins when both sides describe the edge.
    pub fn new(out_link: Option<&LinkData>, in_link: Option<&LinkData>) -> Option<Self> {
        let (link_data, direction) = match (out_link, in_link) {
            (Some(out_link), Some(_)) => (out_link, LinkDirection::Both),
            (Some(out_link), None) => (out_link, LinkDirection::Out),
            (None, Some(in_link)) => (in_link, LinkDirection::In),
            (None, None) => return None,
        };
        Some(Self {
            key: link_data.key(),
            direction,
            histogram: link_data.histogram(),
            time_histograms: link_data.time_histograms(),
        })
    }

    pub fn key(&self) -> LinkKey {
        self.key
    }

    pub fn from_application(&self) -> &Application {
        &self.key.from
    }

    pub fn to_application(&self) -> &Application {
        &self.key.to
    }

    pub fn direction(&self) -> LinkDirection {
        self.direction
    }

    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    pub fn time_histograms(&self) -> &[TimeHistogram] {
        &self.time_histograms
    }

    pub fn total_count(&self) -> i64 {
        self.histogram.total_count()
    }
}

impl Serialize for Link {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct LinkView<'a> {
            key: String,
            from: String,
            to: String,
            direction: LinkDirection,
            total_count: i64,
            error_count: i64,
            slow_count: i64,
            histogram: &'a Histogram,
            time_series_histogram: &'a [TimeHistogram],
        }

        LinkView {
            key: self.key.to_string(),
            from: self.key.from.to_string(),
            to: self.key.to.to_string(),
            direction: self.direction,
            total_count: self.histogram.total_count(),
            error_count: self.histogram.error_count(),
            slow_count: self.histogram.slow_count(),
            histogram: &self.histogram,
            time_series_histogram: &self.time_histograms,
        }
        .serialize(serializer)
    }
}

/// Nodes and links of an application map, ordered by application and link key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationMap {
    range: Range,
    #[serde(rename = "nodeDataArray", serialize_with = "serialize_values")]
    nodes: BTreeMap<Application, Node>,
    #[serde(rename = "linkDataArray", serialize_with = "serialize_values")]
    links: BTreeMap<LinkKey, Link>,
}

fn serialize_values<K, V: Serialize, S: Serializer>(
    map: &BTreeMap<K, V>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(map.values())
}

impl ApplicationMap {
    pub fn new(range: Range) -> Self {
        Self {
            range,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// One node per link end and one link per edge found on either side.
    pub fn from_link_data(range: Range, link_data_duplex_map: &LinkDataDuplexMap) -> Self {
        let mut map = Self::new(range);
        let out_link = link_data_duplex_map.out_link();
        let in_link = link_data_duplex_map.in_link();
        for link_data in out_link.link_data().chain(in_link.link_data()) {
            let key = link_data.key();
            map.add_node(Node::new(key.from));
            map.add_node(Node::new(key.to));
            if !map.links.contains_key(&key) {
                if let Some(link) = Link::new(out_link.get(&key), in_link.get(&key)) {
                    map.links.insert(key, link);
                }
            }
        }
        map
    }

    pub fn range(&self) -> Range {
        self.range
    }

    /// Keeps the first node registered for an application.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.entry(node.application).or_insert(node);
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn node(&self, application: &Application) -> Option<&Node> {
        self.nodes.get(application)
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    pub fn link(&self, key: &LinkKey) -> Option<&Link> {
        self.links.get(key)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
