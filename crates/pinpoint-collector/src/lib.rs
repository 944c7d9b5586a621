// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector side of the APM pipeline: agent streams are decoded, bound into spans, stored, and
//! turned into application-map statistics through the bulk write path.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod binder;
pub mod bulk;
pub mod codec;
pub mod config;
pub mod errors;
pub mod handler;
pub mod message;
pub mod metadata_service;
pub mod receiver;
pub mod span_store;
pub mod statistics;
