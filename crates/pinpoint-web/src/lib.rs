// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read side of the APM pipeline: application maps stitched from the collector's statistics
//! tables, metadata lookups, and alarm checks over recent windows.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod alarm;
pub mod config;
pub mod errors;
pub mod link;
pub mod map;
pub mod metadata;
pub mod time_window;
