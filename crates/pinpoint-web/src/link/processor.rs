// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::link::data::{LinkData, LinkDataMap};
use crate::time_window::TimeWindow;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum LinkDirection {
    #[display("out")]
    OutLink,
    #[display("in")]
    InLink,
}

/// Hook applied to every link map the selector reads, before it is accumulated.
pub trait LinkDataMapProcessor: Send + Sync {
    fn process_link_data_map(
        &self,
        direction: LinkDirection,
        link_data_map: LinkDataMap,
        time_window: &TimeWindow,
    ) -> LinkDataMap;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProcessor;

impl LinkDataMapProcessor for NoOpProcessor {
    fn process_link_data_map(
        &self,
        _direction: LinkDirection,
        link_data_map: LinkDataMap,
        _time_window: &TimeWindow,
    ) -> LinkDataMap {
        link_data_map
    }
}

/// Keeps only links between two WAS applications.
#[derive(Debug, Clone, Copy, Default)]
pub struct WasOnlyProcessor;

impl WasOnlyProcessor {
    fn accept(link_data: &LinkData) -> bool {
        link_data.from_application().service_type().is_was()
            && link_data.to_application().service_type().is_was()
    }
}

impl LinkDataMapProcessor for WasOnlyProcessor {
    fn process_link_data_map(
        &self,
        direction: LinkDirection,
        link_data_map: LinkDataMap,
        _time_window: &TimeWindow,
    ) -> LinkDataMap {
        let mut filtered = LinkDataMap::new();
        for link_data in link_data_map.into_link_data() {
            if Self::accept(&link_data) {
                filtered.insert(link_data);
            } else {
                debug!("{direction} link {} filtered, not was to was", link_data.key());
            }
        }
        filtered
    }
}
