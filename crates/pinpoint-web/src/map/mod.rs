// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod builder;
pub mod histogram;
pub mod limiter;
pub mod model;
pub mod server;
pub mod service;

pub use builder::ApplicationMapBuilder;
pub use histogram::{
    DefaultNodeHistogramFactory, NodeHistogram, NodeHistogramFactory,
    SimplifiedNodeHistogramFactory,
};
pub use limiter::LinkDataLimiter;
pub use model::{ApplicationMap, Link, Node};
pub use server::{
    AgentInfo, AgentStatus, DefaultServerGroupListFactory, InMemoryAgentInfoDataSource,
    ServerGroupList, ServerGroupListDataSource, ServerGroupListFactory, ServerInstance,
    StatisticsServerGroupListFactory,
};
pub use service::{MapService, MapServiceOption, SearchOption};
