// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Breadth-first expansion of the link tables around a source application.

use crate::link::dao::{MapInLinkDao, MapOutLinkDao};
use crate::link::data::LinkDataDuplexMap;
use crate::link::processor::{LinkDataMapProcessor, LinkDirection};
use crate::time_window::TimeWindow;
use fnv::FnvBuildHasher;
use futures::future::{try_join, try_join_all};
use pinpoint_common::application::Application;
use pinpoint_common::errors::StoreError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

type FnvHashSet<T> = hashbrown::HashSet<T, FnvBuildHasher>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkSelectorType {
    /// Outbound links are followed from callees only, inbound links from callers only.
    #[default]
    Unidirectional,
    /// Every discovered application is expanded in both directions.
    Bidirectional,
}

pub struct LinkSelectorFactory {
    out_link_dao: Arc<dyn MapOutLinkDao>,
    in_link_dao: Arc<dyn MapInLinkDao>,
}

impl LinkSelectorFactory {
    pub fn new(out_link_dao: Arc<dyn MapOutLinkDao>, in_link_dao: Arc<dyn MapInLinkDao>) -> Self {
        Self {
            out_link_dao,
            in_link_dao,
        }
    }

    pub fn create_link_selector(
        &self,
        selector_type: LinkSelectorType,
        out_link_processor: Arc<dyn LinkDataMapProcessor>,
        in_link_processor: Arc<dyn LinkDataMapProcessor>,
    ) -> LinkSelector {
        LinkSelector {
            selector_type,
            out_link_dao: Arc::clone(&self.out_link_dao),
            in_link_dao: Arc::clone(&self.in_link_dao),
            out_link_processor,
            in_link_processor,
        }
    }
}

pub struct LinkSelector {
    selector_type: LinkSelectorType,
    out_link_dao: Arc<dyn MapOutLinkDao>,
    in_link_dao: Arc<dyn MapInLinkDao>,
    out_link_processor: Arc<dyn LinkDataMapProcessor>,
    in_link_processor: Arc<dyn LinkDataMapProcessor>,
}

impl LinkSelector {
    pub fn selector_type(&self) -> LinkSelectorType {
        self.selector_type
    }

    /// Reads outbound links up to `out_search_depth` hops and inbound links up to
    /// `in_search_depth` hops from `sources`. Each application is queried at most once per
    /// direction; the queries of one hop run concurrently.
    pub async fn select(
        &self,
        sources: &[Application],
        time_window: &TimeWindow,
        out_search_depth: usize,
        in_search_depth: usize,
        time_aggregated: bool,
    ) -> Result<LinkDataDuplexMap, StoreError> {
        let bidirectional = self.selector_type == LinkSelectorType::Bidirectional;
        let mut duplex = LinkDataDuplexMap::new();
        let mut out_visited = FnvHashSet::default();
        let mut in_visited = FnvHashSet::default();
        let mut out_frontier = sources.to_vec();
        let mut in_frontier = sources.to_vec();

        for depth in 0..out_search_depth.max(in_search_depth) {
            let out_targets: Vec<Application> = if depth < out_search_depth {
                out_frontier
                    .drain(..)
                    .filter(|application| out_visited.insert(*application))
                    .collect()
            } else {
                Vec::new()
            };
            let in_targets: Vec<Application> = if depth < in_search_depth {
                in_frontier
                    .drain(..)
                    .filter(|application| in_visited.insert(*application))
                    .collect()
            } else {
                Vec::new()
            };
            if out_targets.is_empty() && in_targets.is_empty() {
                break;
            }
            debug!(
                "link selector depth {}: {} outbound and {} inbound queries",
                depth,
                out_targets.len(),
                in_targets.len()
            );

            let (out_maps, in_maps) = try_join(
                try_join_all(out_targets.iter().map(|application| {
                    self.out_link_dao
                        .select_out_link(application, time_window, time_aggregated)
                })),
                try_join_all(in_targets.iter().map(|application| {
                    self.in_link_dao
                        .select_in_link(application, time_window, time_aggregated)
                })),
            )
            .await?;

            let mut next_out = Vec::new();
            let mut next_in = Vec::new();
            for link_data_map in out_maps {
                let link_data_map = self.out_link_processor.process_link_data_map(
                    LinkDirection::OutLink,
                    link_data_map,
                    time_window,
                );
                for link_data in link_data_map.link_data() {
                    let callee = *link_data.to_application();
                    if has_out_links(&callee) {
                        next_out.push(callee);
                    }
                    if bidirectional && has_in_links(&callee) {
                        next_in.push(callee);
                    }
                }
                duplex.add_out_link_data_map(link_data_map);
            }
            for link_data_map in in_maps {
                let link_data_map = self.in_link_processor.process_link_data_map(
                    LinkDirection::InLink,
                    link_data_map,
                    time_window,
                );
                for link_data in link_data_map.link_data() {
                    let caller = *link_data.from_application();
                    if has_in_links(&caller) {
                        next_in.push(caller);
                    }
                    if bidirectional && has_out_links(&caller) {
                        next_out.push(caller);
                    }
                }
                duplex.add_in_link_data_map(link_data_map);
            }

            out_frontier = next_out;
            in_frontier = next_in;
        }
        Ok(duplex)
    }
}

// terminal and unknown nodes are never instrumented, so they own no caller rows
fn has_out_links(application: &Application) -> bool {
    let service_type = application.service_type();
    !service_type.is_terminal() && !service_type.is_unknown() && !service_type.is_user()
}

fn has_in_links(application: &Application) -> bool {
    !application.service_type().is_user()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::data::{LinkDataMap, LinkKey};
    use crate::link::processor::{NoOpProcessor, WasOnlyProcessor};
    use crate::time_window::Range;
    use async_trait::async_trait;
    use pinpoint_common::service_type::ServiceType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Static call graph answering both directions.
    struct Graph {
        edges: Vec<(Application, Application)>,
        queries: AtomicUsize,
    }

    impl Graph {
        fn new(edges: &[(Application, Application)]) -> Arc<Self> {
            Arc::new(Self {
                edges: edges.to_vec(),
                queries: AtomicUsize::new(0),
            })
        }

        fn links(&self, matches: impl Fn(&(Application, Application)) -> bool) -> LinkDataMap {
            self.queries.fetch_add(1, Ordering::Relaxed);
            let mut map = LinkDataMap::new();
            for (from, to) in self.edges.iter().filter(|edge| matches(edge)) {
                map.add_link_data(*from, from.name(), *to, to.name(), 0, 0, 1);
            }
            map
        }
    }

    #[async_trait]
    impl MapOutLinkDao for Graph {
        async fn select_out_link(
            &self,
            out_application: &Application,
            _time_window: &TimeWindow,
            _time_aggregated: bool,
        ) -> Result<LinkDataMap, StoreError> {
            Ok(self.links(|(from, _)| from == out_application))
        }
    }

    #[async_trait]
    impl MapInLinkDao for Graph {
        async fn select_in_link(
            &self,
            in_application: &Application,
            _time_window: &TimeWindow,
            _time_aggregated: bool,
        ) -> Result<LinkDataMap, StoreError> {
            Ok(self.links(|(_, to)| to == in_application))
        }
    }

    fn app(name: &str) -> Application {
        Application::new(name, ServiceType::TOMCAT)
    }

    fn window() -> TimeWindow {
        TimeWindow::new(Range::new(0, 300_000).expect("valid"))
    }

    fn selector(graph: &Arc<Graph>, selector_type: LinkSelectorType) -> LinkSelector {
        LinkSelectorFactory::new(graph.clone(), graph.clone()).create_link_selector(
            selector_type,
            Arc::new(NoOpProcessor),
            Arc::new(NoOpProcessor),
        )
    }

    fn keys(map: &LinkDataMap) -> Vec<String> {
        let mut keys: Vec<_> = map.link_data().map(|link| link.key().to_string()).collect();
        keys.sort();
        keys
    }

    #[tokio::test]
    async fn test_out_depth_bounds_the_chain() {
        let graph = Graph::new(&[(app("a"), app("b")), (app("b"), app("c")), (app("c"), app("d"))]);
        let duplex = selector(&graph, LinkSelectorType::Unidirectional)
            .select(&[app("a")], &window(), 2, 0, false)
            .await
            .expect("select");
        assert_eq!(
            keys(duplex.out_link()),
            vec!["a/TOMCAT -> b/TOMCAT", "b/TOMCAT -> c/TOMCAT"]
        );
        assert!(duplex.in_link().is_empty());
    }

    #[tokio::test]
    async fn test_unidirectional_does_not_turn_around() {
        // x -> b <- a -> c, from a: b's other caller is only reachable by turning around
        let graph = Graph::new(&[(app("a"), app("b")), (app("x"), app("b")), (app("z"), app("a"))]);
        let duplex = selector(&graph, LinkSelectorType::Unidirectional)
            .select(&[app("a")], &window(), 2, 2, false)
            .await
            .expect("select");
        assert_eq!(keys(duplex.out_link()), vec!["a/TOMCAT -> b/TOMCAT"]);
        assert_eq!(keys(duplex.in_link()), vec!["z/TOMCAT -> a/TOMCAT"]);

        let duplex = selector(&graph, LinkSelectorType::Bidirectional)
            .select(&[app("a")], &window(), 2, 2, false)
            .await
            .expect("select");
        assert!(duplex
            .in_link()
            .get(&LinkKey::new(app("x"), app("b")))
            .is_some());
    }

    #[tokio::test]
    async fn test_cycles_are_queried_once() {
        let graph = Graph::new(&[(app("a"), app("b")), (app("b"), app("a"))]);
        let duplex = selector(&graph, LinkSelectorType::Unidirectional)
            .select(&[app("a")], &window(), 10, 0, false)
            .await
            .expect("select");
        assert_eq!(duplex.out_link().len(), 2);
        assert_eq!(graph.queries.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_terminal_nodes_are_not_expanded() {
        let db = Application::new("orders-db", ServiceType::MYSQL);
        let graph = Graph::new(&[(app("a"), db)]);
        let duplex = selector(&graph, LinkSelectorType::Unidirectional)
            .select(&[app("a")], &window(), 3, 0, false)
            .await
            .expect("select");
        assert_eq!(duplex.out_link().len(), 1);
        assert_eq!(graph.queries.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_processors_filter_before_expansion() {
        let db = Application::new("orders-db", ServiceType::MYSQL);
        let graph = Graph::new(&[(app("a"), db), (app("a"), app("b"))]);
        let selector = LinkSelectorFactory::new(graph.clone(), graph.clone()).create_link_selector(
            LinkSelectorType::Unidirectional,
            Arc::new(WasOnlyProcessor),
            Arc::new(NoOpProcessor),
        );
        let duplex = selector
            .select(&[app("a")], &window(), 1, 0, false)
            .await
            .expect("select");
        assert_eq!(keys(duplex.out_link()), vec!["a/TOMCAT -> b/TOMCAT"]);
    }
}
