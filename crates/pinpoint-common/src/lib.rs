// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared domain model for the collector and web crates.
//!
//! Everything that both sides of the pipeline must agree on lives here: identifiers,
//! service types and their histogram schemas, the span value objects produced by the
//! collector, the byte layouts of statistics and metadata rows, the salted row-key
//! distributor, and the wide-column [`store::Store`] interface.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod application;
pub mod buffer;
pub mod collections;
pub mod config;
pub mod distributor;
pub mod errors;
pub mod histogram;
pub mod id;
pub mod metadata;
pub mod service_type;
pub mod span;
pub mod statistics;
pub mod store;
pub mod table;
