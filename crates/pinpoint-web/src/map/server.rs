// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Server instances shown under each map node.

use crate::link::data::{LinkData, LinkDataDuplexMap};
use crate::map::histogram::NodeHistogram;
use crate::time_window::TimeWindow;
use async_trait::async_trait;
use pinpoint_common::application::Application;
use pinpoint_common::errors::StoreError;
use pinpoint_common::service_type::ServiceType;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Running,
    Shutdown,
    Unknown,
}

/// Identity an agent reports when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    pub application_name: String,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub host_name: String,
    pub ip: String,
    pub service_type: ServiceType,
    pub start_timestamp: i64,
    pub status: AgentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInstance {
    pub host_name: String,
    pub name: String,
    pub service_type: ServiceType,
    pub status: AgentStatus,
}

impl ServerInstance {
    fn from_agent(agent: &AgentInfo, status: AgentStatus) -> Self {
        Self {
            host_name: agent.host_name.clone(),
            name: agent.agent_id.clone(),
            service_type: agent.service_type,
            status,
        }
    }
}

/// Instances grouped by host name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ServerGroupList {
    groups: BTreeMap<String, Vec<ServerInstance>>,
}

impl ServerGroupList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, instance: ServerInstance) {
        let group = self.groups.entry(instance.host_name.clone()).or_default();
        if !group.iter().any(|existing| existing.name == instance.name) {
            group.push(instance);
        }
    }

    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn instances(&self) -> impl Iterator<Item = &ServerInstance> {
        self.groups.values().flatten()
    }

    pub fn instance_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[async_trait]
pub trait ServerGroupListDataSource: Send + Sync {
    /// Agents registered for `application` that were alive at some point before `to`.
    async fn select_agents(
        &self,
        application: &Application,
        to: i64,
    ) -> Result<Vec<AgentInfo>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAgentInfoDataSource {
    agents: RwLock<Vec<AgentInfo>>,
}

impl InMemoryAgentInfoDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any earlier registration of the same agent id.
    pub async fn register(&self, agent: AgentInfo) {
        let mut agents = self.agents.write().await;
        agents.retain(|existing| existing.agent_id != agent.agent_id);
        agents.push(agent);
    }
}

#[async_trait]
impl ServerGroupListDataSource for InMemoryAgentInfoDataSource {
    async fn select_agents(
        &self,
        application: &Application,
        to: i64,
    ) -> Result<Vec<AgentInfo>, StoreError> {
        let agents = self.agents.read().await;
        Ok(agents
            .iter()
            .filter(|agent| {
                agent.application_name == application.name()
                    && agent.service_type == application.service_type()
                    && agent.start_timestamp <= to
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
pub trait ServerGroupListFactory: Send + Sync {
    async fn create_server_group_list(
        &self,
        application: &Application,
        node_histogram: Option<&NodeHistogram>,
        link_data_duplex_map: &LinkDataDuplexMap,
        time_window: &TimeWindow,
    ) -> Result<ServerGroupList, StoreError>;
}

/// Instrumented nodes list their registered agents with the last reported status.
pub struct DefaultServerGroupListFactory {
    data_source: Arc<dyn ServerGroupListDataSource>,
}

impl DefaultServerGroupListFactory {
    pub fn new(data_source: Arc<dyn ServerGroupListDataSource>) -> Self {
        Self { data_source }
    }
}

#[async_trait]
impl ServerGroupListFactory for DefaultServerGroupListFactory {
    async fn create_server_group_list(
        &self,
        application: &Application,
        _node_histogram: Option<&NodeHistogram>,
        link_data_duplex_map: &LinkDataDuplexMap,
        time_window: &TimeWindow,
    ) -> Result<ServerGroupList, StoreError> {
        let service_type = application.service_type();
        if service_type.is_user() {
            return Ok(ServerGroupList::new());
        }
        if service_type.is_terminal() || service_type.is_unknown() {
            return Ok(link_target_servers(application, link_data_duplex_map));
        }
        let mut servers = ServerGroupList::new();
        for agent in self
            .data_source
            .select_agents(application, time_window.range().to())
            .await?
        {
            servers.add(ServerInstance::from_agent(&agent, agent.status));
        }
        Ok(servers)
    }
}

/// Instrumented nodes list the agents that produced statistics in the window, all running.
pub struct StatisticsServerGroupListFactory {
    data_source: Arc<dyn ServerGroupListDataSource>,
}

impl StatisticsServerGroupListFactory {
    pub fn new(data_source: Arc<dyn ServerGroupListDataSource>) -> Self {
        Self { data_source }
    }
}

#[async_trait]
impl ServerGroupListFactory for StatisticsServerGroupListFactory {
    async fn create_server_group_list(
        &self,
        application: &Application,
        node_histogram: Option<&NodeHistogram>,
        link_data_duplex_map: &LinkDataDuplexMap,
        time_window: &TimeWindow,
    ) -> Result<ServerGroupList, StoreError> {
        let service_type = application.service_type();
        if service_type.is_user() {
            return Ok(ServerGroupList::new());
        }
        if service_type.is_terminal() || service_type.is_unknown() {
            return Ok(link_target_servers(application, link_data_duplex_map));
        }
        let Some(node_histogram) = node_histogram else {
            return Ok(ServerGroupList::new());
        };

        let known: BTreeMap<String, AgentInfo> = self
            .data_source
            .select_agents(application, time_window.range().to())
            .await?
            .into_iter()
            .map(|agent| (agent.agent_id.clone(), agent))
            .collect();
        let mut servers = ServerGroupList::new();
        for agent_id in node_histogram.agent_histograms().keys() {
            let instance = match known.get(agent_id) {
                Some(agent) => ServerInstance::from_agent(agent, AgentStatus::Running),
                None => ServerInstance {
                    host_name: agent_id.clone(),
                    name: agent_id.clone(),
                    service_type,
                    status: AgentStatus::Running,
                },
            };
            servers.add(instance);
        }
        Ok(servers)
    }
}

/// Uninstrumented nodes are known only by the hosts their callers reached.
fn link_target_servers(
    application: &Application,
    link_data_duplex_map: &LinkDataDuplexMap,
) -> ServerGroupList {
    let mut links: Vec<&LinkData> = link_data_duplex_map.out_link().links_to(application).collect();
    if links.is_empty() {
        links = link_data_duplex_map.in_link().links_to(application).collect();
    }
    let mut servers = ServerGroupList::new();
    for link_data in links {
        for host in link_data.target_histograms().into_keys() {
            servers.add(ServerInstance {
                host_name: host.clone(),
                name: host,
                service_type: application.service_type(),
                status: AgentStatus::Unknown,
            });
        }
    }
    servers
}
