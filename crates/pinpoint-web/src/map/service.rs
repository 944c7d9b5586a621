// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::WebConfig;
use crate::errors::MapError;
use crate::link::dao::MapResponseDao;
use crate::link::processor::{LinkDataMapProcessor, NoOpProcessor, WasOnlyProcessor};
use crate::link::selector::{LinkSelectorFactory, LinkSelectorType};
use crate::map::builder::ApplicationMapBuilder;
use crate::map::histogram::{
    DefaultNodeHistogramFactory, NodeHistogramFactory, SimplifiedNodeHistogramFactory,
};
use crate::map::limiter::LinkDataLimiter;
use crate::map::model::ApplicationMap;
use crate::map::server::{
    DefaultServerGroupListFactory, ServerGroupListDataSource, ServerGroupListFactory,
    StatisticsServerGroupListFactory,
};
use crate::time_window::TimeWindow;
use pinpoint_common::application::Application;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOption {
    pub out_search_depth: usize,
    pub in_search_depth: usize,
    pub link_selector_type: LinkSelectorType,
    pub was_only: bool,
}

impl SearchOption {
    pub fn new(out_search_depth: usize, in_search_depth: usize) -> Self {
        Self {
            out_search_depth,
            in_search_depth,
            ..Self::default()
        }
    }
}

impl Default for SearchOption {
    fn default() -> Self {
        Self {
            out_search_depth: 1,
            in_search_depth: 1,
            link_selector_type: LinkSelectorType::Unidirectional,
            was_only: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MapServiceOption {
    pub source_application: Application,
    pub time_window: TimeWindow,
    pub search_option: SearchOption,
    /// Merged node histograms and time-aggregated links.
    pub simple_response_histogram: bool,
    /// Server lists from the agents seen in statistics instead of registered agents.
    pub use_statistics_agent_state: bool,
}

impl MapServiceOption {
    pub fn new(source_application: Application, time_window: TimeWindow) -> Self {
        Self {
            source_application,
            time_window,
            search_option: SearchOption::default(),
            simple_response_histogram: false,
            use_statistics_agent_state: false,
        }
    }
}

pub struct MapService {
    link_selector_factory: LinkSelectorFactory,
    response_dao: Arc<dyn MapResponseDao>,
    server_data_source: Arc<dyn ServerGroupListDataSource>,
    link_data_limiter: LinkDataLimiter,
    build_timeout: Duration,
}

impl MapService {
    pub fn new(
        link_selector_factory: LinkSelectorFactory,
        response_dao: Arc<dyn MapResponseDao>,
        server_data_source: Arc<dyn ServerGroupListDataSource>,
        config: &WebConfig,
    ) -> Self {
        Self {
            link_selector_factory,
            response_dao,
            server_data_source,
            link_data_limiter: LinkDataLimiter::new(config.link_data_limit),
            build_timeout: config.build_timeout(),
        }
    }

    pub async fn select_application_map(
        &self,
        option: &MapServiceOption,
    ) -> Result<ApplicationMap, MapError> {
        let started = Instant::now();
        let search_option = &option.search_option;
        let out_link_processor: Arc<dyn LinkDataMapProcessor> = if search_option.was_only {
            Arc::new(WasOnlyProcessor)
        } else {
            Arc::new(NoOpProcessor)
        };
        let link_selector = self.link_selector_factory.create_link_selector(
            search_option.link_selector_type,
            out_link_processor,
            Arc::new(NoOpProcessor),
        );

        let link_data_duplex_map = link_selector
            .select(
                &[option.source_application],
                &option.time_window,
                search_option.out_search_depth,
                search_option.in_search_depth,
                option.simple_response_histogram,
            )
            .await?;
        let fetch_time = started.elapsed();
        self.link_data_limiter.check(&link_data_duplex_map)?;

        let mut builder = ApplicationMapBuilder::new(option.time_window);
        builder
            .include_node_histogram(self.node_histogram_factory(option.simple_response_histogram))
            .include_server_info(self.server_group_list_factory(option.use_statistics_agent_state));
        let mut map = builder
            .build(&link_data_duplex_map, self.build_timeout)
            .await?;
        if map.is_empty() {
            debug!(
                "no links for {}, building a source-only map",
                option.source_application
            );
            builder.include_server_info(self.server_group_list_factory(false));
            map = builder
                .build_for_source(&option.source_application, self.build_timeout)
                .await?;
        }

        info!(
            "ApplicationMap BuildTime: {} link fetch {}ms, map building {}ms",
            option.source_application,
            fetch_time.as_millis(),
            started.elapsed().saturating_sub(fetch_time).as_millis()
        );
        Ok(map)
    }

    fn node_histogram_factory(&self, simple_response_histogram: bool) -> Arc<dyn NodeHistogramFactory> {
        let response_dao = Arc::clone(&self.response_dao);
        if simple_response_histogram {
            Arc::new(SimplifiedNodeHistogramFactory::new(response_dao))
        } else {
            Arc::new(DefaultNodeHistogramFactory::new(response_dao))
        }
    }

    fn server_group_list_factory(
        &self,
        use_statistics_agent_state: bool,
    ) -> Arc<dyn ServerGroupListFactory> {
        let data_source = Arc::clone(&self.server_data_source);
        if use_statistics_agent_state {
            Arc::new(StatisticsServerGroupListFactory::new(data_source))
        } else {
            Arc::new(DefaultServerGroupListFactory::new(data_source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::dao::{MapInLinkDao, MapOutLinkDao, ResponseTime};
    use crate::link::data::LinkDataMap;
    use crate::map::server::InMemoryAgentInfoDataSource;
    use crate::time_window::Range;
    use async_trait::async_trait;
    use pinpoint_common::errors::StoreError;
    use pinpoint_common::service_type::ServiceType;
    use tracing_test::traced_test;

    #[derive(Default)]
    struct Fixed {
        out_link: LinkDataMap,
    }

    #[async_trait]
    impl MapOutLinkDao for Fixed {
        async fn select_out_link(
            &self,
            application: &Application,
            _time_window: &TimeWindow,
            _time_aggregated: bool,
        ) -> Result<LinkDataMap, StoreError> {
            let mut map = LinkDataMap::new();
            for link_data in self.out_link.links_from(application) {
                map.insert(link_data.clone());
            }
            Ok(map)
        }
    }

    #[async_trait]
    impl MapInLinkDao for Fixed {
        async fn select_in_link(
            &self,
            _application: &Application,
            _time_window: &TimeWindow,
            _time_aggregated: bool,
        ) -> Result<LinkDataMap, StoreError> {
            Ok(LinkDataMap::new())
        }
    }

    #[async_trait]
    impl MapResponseDao for Fixed {
        async fn select_response_time(
            &self,
            _application: &Application,
            _time_window: &TimeWindow,
        ) -> Result<Vec<ResponseTime>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn front() -> Application {
        Application::new("front", ServiceType::SPRING_BOOT)
    }

    fn service(dao: Arc<Fixed>, link_data_limit: usize) -> MapService {
        let config = WebConfig {
            link_data_limit,
            ..WebConfig::default()
        };
        MapService::new(
            LinkSelectorFactory::new(dao.clone(), dao.clone()),
            dao,
            Arc::new(InMemoryAgentInfoDataSource::new()),
            &config,
        )
    }

    fn option() -> MapServiceOption {
        let window = TimeWindow::new(Range::new(0, 300_000).expect("valid"));
        MapServiceOption::new(front(), window)
    }

    #[tokio::test]
    #[traced_test]
    async fn test_empty_window_returns_the_source() {
        let map = service(Arc::new(Fixed::default()), 10)
            .select_application_map(&option())
            .await
            .expect("map");
        assert_eq!(map.node_count(), 1);
        assert!(map.node(&front()).is_some());
        assert!(logs_contain("ApplicationMap BuildTime: front/SPRING_BOOT"));
    }

    #[tokio::test]
    async fn test_limiter_refuses_large_maps() {
        let mut out_link = LinkDataMap::new();
        for callee in ["a", "b", "c"] {
            let to = Application::new(callee, ServiceType::MYSQL);
            out_link.add_link_data(front(), "front-1", to, "h", 0, 1000, 1);
        }
        let error = service(Arc::new(Fixed { out_link }), 2)
            .select_application_map(&option())
            .await
            .expect_err("limit");
        assert!(matches!(
            error,
            MapError::LinkLimitExceeded {
                count: 3,
                threshold: 2
            }
        ));
        assert_eq!(error.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
