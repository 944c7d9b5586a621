// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod checker;
pub mod collector;
pub mod rule;

pub use checker::AlarmChecker;
pub use collector::{CallCount, DataCollector, MapOutLinkDataCollector, ResponseTimeDataCollector};
pub use rule::{CheckerCategory, DataCollectorCategory, Rule};

use crate::errors::AlarmError;
use crate::link::dao::{MapOutLinkDao, MapResponseDao};
use pinpoint_common::application::Application;
use std::sync::Arc;
use tracing::warn;

/// Window every rule is evaluated over.
pub const DEFAULT_SLOT_INTERVAL_MILLIS: i64 = 5 * 60 * 1000;

/// Evaluates the rules of one application. Each run builds fresh collectors, and every
/// collector is fetched once however many rules read it.
pub struct AlarmService {
    response_dao: Arc<dyn MapResponseDao>,
    out_link_dao: Arc<dyn MapOutLinkDao>,
    slot_interval: i64,
}

impl AlarmService {
    pub fn new(response_dao: Arc<dyn MapResponseDao>, out_link_dao: Arc<dyn MapOutLinkDao>) -> Self {
        Self {
            response_dao,
            out_link_dao,
            slot_interval: DEFAULT_SLOT_INTERVAL_MILLIS,
        }
    }

    pub fn with_slot_interval(mut self, slot_interval: i64) -> Self {
        self.slot_interval = slot_interval;
        self
    }

    /// Checkers of the rules ending at `time_slot_end_time`. Rules naming an unknown checker
    /// are skipped.
    pub async fn check_rules(
        &self,
        application: &Application,
        rules: Vec<Rule>,
        time_slot_end_time: i64,
    ) -> Result<Vec<AlarmChecker>, AlarmError> {
        let mut checkers = Vec::with_capacity(rules.len());
        for rule in rules {
            match AlarmChecker::new(rule) {
                Ok(checker) => checkers.push(checker),
                Err(error) => warn!("skipping alarm rule of {application}: {error}"),
            }
        }

        let mut response_time = None;
        let mut caller_stat = None;
        for checker in &mut checkers {
            let collector = match checker.category().collector_category() {
                DataCollectorCategory::ResponseTime => {
                    response_time.get_or_insert_with(|| {
                        DataCollector::ResponseTime(ResponseTimeDataCollector::new(
                            *application,
                            Arc::clone(&self.response_dao),
                            time_slot_end_time,
                            self.slot_interval,
                        ))
                    })
                }
                DataCollectorCategory::CallerStat => caller_stat.get_or_insert_with(|| {
                    DataCollector::CallerStat(MapOutLinkDataCollector::new(
                        *application,
                        Arc::clone(&self.out_link_dao),
                        time_slot_end_time,
                        self.slot_interval,
                    ))
                }),
            };
            collector.collect().await?;
            checker.check(collector)?;
        }
        Ok(checkers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::dao::ResponseTime;
    use crate::link::data::LinkDataMap;
    use crate::time_window::TimeWindow;
    use async_trait::async_trait;
    use pinpoint_common::errors::StoreError;
    use pinpoint_common::service_type::ServiceType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        responses: AtomicUsize,
        links: AtomicUsize,
    }

    #[async_trait]
    impl MapResponseDao for Counting {
        async fn select_response_time(
            &self,
            application: &Application,
            _time_window: &TimeWindow,
        ) -> Result<Vec<ResponseTime>, StoreError> {
            self.responses.fetch_add(1, Ordering::Relaxed);
            let mut response_time = ResponseTime::new(*application, 0);
            response_time.add_response_time("agent-1", -1, 3);
            response_time.add_response_time("agent-1", 1000, 7);
            Ok(vec![response_time])
        }
    }

    #[async_trait]
    impl MapOutLinkDao for Counting {
        async fn select_out_link(
            &self,
            application: &Application,
            _time_window: &TimeWindow,
            _time_aggregated: bool,
        ) -> Result<LinkDataMap, StoreError> {
            self.links.fetch_add(1, Ordering::Relaxed);
            let mut map = LinkDataMap::new();
            let db = Application::new("orders-db", ServiceType::MYSQL);
            map.add_link_data(*application, "agent-1", db, "db:3306", 0, 1000, 4);
            Ok(map)
        }
    }

    fn rule(checker_name: &str, threshold: i64, notes: &str) -> Rule {
        Rule {
            application_id: "order-api".to_string(),
            service_type: "TOMCAT".to_string(),
            checker_name: checker_name.to_string(),
            threshold,
            user_group_id: "ops".to_string(),
            sms_send: true,
            email_send: false,
            webhook_send: false,
            notes: notes.to_string(),
        }
    }

    #[tokio::test]
    async fn test_collectors_are_shared_between_rules() {
        let dao = Arc::new(Counting::default());
        let service = AlarmService::new(dao.clone(), dao.clone());
        let application = Application::new("order-api", ServiceType::TOMCAT);
        let checkers = service
            .check_rules(
                &application,
                vec![
                    rule("ERROR RATE", 30, ""),
                    rule("ERROR COUNT", 4, ""),
                    rule("TOTAL COUNT TO CALLEE", 4, "orders-db"),
                    rule("APDEX", 1, ""),
                ],
                600_000,
            )
            .await
            .expect("checkers");

        assert_eq!(checkers.len(), 3);
        assert!(checkers[0].is_detected());
        assert!(!checkers[1].is_detected());
        assert!(checkers[2].is_detected());
        assert_eq!(dao.responses.load(Ordering::Relaxed), 1);
        assert_eq!(dao.links.load(Ordering::Relaxed), 1);
    }
}
