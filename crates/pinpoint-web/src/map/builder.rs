// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::MapError;
use crate::link::data::LinkDataDuplexMap;
use crate::map::histogram::{NodeHistogram, NodeHistogramFactory};
use crate::map::model::{ApplicationMap, Node};
use crate::map::server::{ServerGroupList, ServerGroupListFactory};
use crate::time_window::TimeWindow;
use futures::future::try_join_all;
use pinpoint_common::application::Application;
use pinpoint_common::errors::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

type NodeAttachment = (Option<NodeHistogram>, Option<ServerGroupList>);

/// Turns selected links into an [`ApplicationMap`], optionally decorating every node with its
/// histogram and server list.
pub struct ApplicationMapBuilder {
    time_window: TimeWindow,
    node_histogram_factory: Option<Arc<dyn NodeHistogramFactory>>,
    server_group_list_factory: Option<Arc<dyn ServerGroupListFactory>>,
}

impl ApplicationMapBuilder {
    pub fn new(time_window: TimeWindow) -> Self {
        Self {
            time_window,
            node_histogram_factory: None,
            server_group_list_factory: None,
        }
    }

    pub fn include_node_histogram(&mut self, factory: Arc<dyn NodeHistogramFactory>) -> &mut Self {
        self.node_histogram_factory = Some(factory);
        self
    }

    pub fn include_server_info(&mut self, factory: Arc<dyn ServerGroupListFactory>) -> &mut Self {
        self.server_group_list_factory = Some(factory);
        self
    }

    pub async fn build(
        &self,
        link_data_duplex_map: &LinkDataDuplexMap,
        timeout: Duration,
    ) -> Result<ApplicationMap, MapError> {
        let map = ApplicationMap::from_link_data(self.time_window.range(), link_data_duplex_map);
        self.attach(map, link_data_duplex_map, timeout).await
    }

    /// Map holding only `source`, for sources without any link in the window.
    pub async fn build_for_source(
        &self,
        source: &Application,
        timeout: Duration,
    ) -> Result<ApplicationMap, MapError> {
        let mut map = ApplicationMap::new(self.time_window.range());
        map.add_node(Node::new(*source));
        self.attach(map, &LinkDataDuplexMap::new(), timeout).await
    }

    /// Nodes are decorated concurrently. Reaching `timeout` drops every pending query.
    async fn attach(
        &self,
        mut map: ApplicationMap,
        link_data_duplex_map: &LinkDataDuplexMap,
        timeout: Duration,
    ) -> Result<ApplicationMap, MapError> {
        if self.node_histogram_factory.is_none() && self.server_group_list_factory.is_none() {
            return Ok(map);
        }
        let applications: Vec<Application> = map.nodes().map(|node| *node.application()).collect();
        let jobs = applications
            .iter()
            .map(|application| self.attachment(application, link_data_duplex_map));

        let attachments = match tokio::time::timeout(timeout, try_join_all(jobs)).await {
            Ok(attachments) => attachments?,
            Err(_) => {
                warn!(
                    "application map build timed out after {}ms with {} nodes",
                    timeout.as_millis(),
                    applications.len()
                );
                return Err(MapError::BuildTimeout(timeout));
            }
        };

        for (node, (node_histogram, server_group_list)) in map.nodes_mut().zip(attachments) {
            if let Some(node_histogram) = node_histogram {
                node.set_node_histogram(node_histogram);
            }
            if let Some(server_group_list) = server_group_list {
                node.set_server_group_list(server_group_list);
            }
        }
        debug!(
            "application map built with {} nodes and {} links",
            map.node_count(),
            map.link_count()
        );
        Ok(map)
    }

    async fn attachment(
        &self,
        application: &Application,
        link_data_duplex_map: &LinkDataDuplexMap,
    ) -> Result<NodeAttachment, StoreError> {
        let node_histogram = match &self.node_histogram_factory {
            Some(factory) => Some(
                factory
                    .create_node_histogram(application, link_data_duplex_map, &self.time_window)
                    .await?,
            ),
            None => None,
        };
        let server_group_list = match &self.server_group_list_factory {
            Some(factory) => Some(
                factory
                    .create_server_group_list(
                        application,
                        node_histogram.as_ref(),
                        link_data_duplex_map,
                        &self.time_window,
                    )
                    .await?,
            ),
            None => None,
        };
        Ok((node_histogram, server_group_list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::dao::{MapResponseDao, ResponseTime};
    use crate::link::data::LinkDataMap;
    use crate::map::histogram::DefaultNodeHistogramFactory;
    use crate::map::server::{DefaultServerGroupListFactory, InMemoryAgentInfoDataSource};
    use crate::time_window::Range;
    use async_trait::async_trait;
    use pinpoint_common::service_type::ServiceType;

    struct SlowResponses {
        delay: Duration,
    }

    #[async_trait]
    impl MapResponseDao for SlowResponses {
        async fn select_response_time(
            &self,
            application: &Application,
            _time_window: &TimeWindow,
        ) -> Result<Vec<ResponseTime>, StoreError> {
            tokio::time::sleep(self.delay).await;
            let mut response_time = ResponseTime::new(*application, 60_000);
            response_time.add_response_time("agent-1", 1000, 1);
            Ok(vec![response_time])
        }
    }

    struct FailingResponses;

    #[async_trait]
    impl MapResponseDao for FailingResponses {
        async fn select_response_time(
            &self,
            _application: &Application,
            _time_window: &TimeWindow,
        ) -> Result<Vec<ResponseTime>, StoreError> {
            Err(StoreError::Unavailable("region offline".to_string()))
        }
    }

    fn front() -> Application {
        Application::new("front", ServiceType::SPRING_BOOT)
    }

    fn orders() -> Application {
        Application::new("order-api", ServiceType::TOMCAT)
    }

    fn duplex() -> LinkDataDuplexMap {
        let mut out_link = LinkDataMap::new();
        out_link.add_link_data(front(), "front-1", orders(), "h1", 60_000, 1000, 3);
        let mut duplex = LinkDataDuplexMap::new();
        duplex.add_out_link_data_map(out_link);
        duplex
    }

    fn builder(delay: Duration) -> ApplicationMapBuilder {
        let window = TimeWindow::new(Range::new(60_000, 120_000).expect("valid"));
        let mut builder = ApplicationMapBuilder::new(window);
        builder
            .include_node_histogram(Arc::new(DefaultNodeHistogramFactory::new(Arc::new(
                SlowResponses { delay },
            ))))
            .include_server_info(Arc::new(DefaultServerGroupListFactory::new(Arc::new(
                InMemoryAgentInfoDataSource::new(),
            ))));
        builder
    }

    #[tokio::test]
    async fn test_nodes_are_decorated() {
        let map = builder(Duration::ZERO)
            .build(&duplex(), Duration::from_secs(5))
            .await
            .expect("map");
        assert_eq!(map.node_count(), 2);
        let node = map.node(&orders()).expect("node");
        assert_eq!(node.node_histogram().expect("histogram").total_count(), 1);
        assert!(node.server_group_list().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_times_out() {
        let started = tokio::time::Instant::now();
        let error = builder(Duration::from_secs(60))
            .build(&duplex(), Duration::from_millis(500))
            .await
            .expect_err("timeout");
        assert!(matches!(error, MapError::BuildTimeout(timeout) if timeout.as_millis() == 500));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_store_errors_fail_the_build() {
        let window = TimeWindow::new(Range::new(60_000, 120_000).expect("valid"));
        let mut builder = ApplicationMapBuilder::new(window);
        builder.include_node_histogram(Arc::new(DefaultNodeHistogramFactory::new(Arc::new(
            FailingResponses,
        ))));
        let error = builder
            .build(&duplex(), Duration::from_secs(5))
            .await
            .expect_err("store error");
        assert!(matches!(error, MapError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_source_only_map() {
        let map = builder(Duration::ZERO)
            .build_for_source(&orders(), Duration::from_secs(5))
            .await
            .expect("map");
        assert_eq!(map.node_count(), 1);
        assert_eq!(map.link_count(), 0);
        assert!(map.node(&orders()).is_some());
    }
}
