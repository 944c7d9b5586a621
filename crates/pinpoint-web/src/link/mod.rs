// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

pub mod dao;
pub mod data;
pub mod processor;
pub mod selector;

pub use dao::{
    MapInLinkDao, MapOutLinkDao, MapResponseDao, ResponseTime, StoreMapInLinkDao,
    StoreMapOutLinkDao, StoreMapResponseDao,
};
pub use data::{LinkCallData, LinkCallDataMap, LinkData, LinkDataDuplexMap, LinkDataMap, LinkKey};
pub use processor::{LinkDataMapProcessor, LinkDirection, NoOpProcessor, WasOnlyProcessor};
pub use selector::{LinkSelector, LinkSelectorFactory, LinkSelectorType};
