// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::MapError;
use crate::link::data::LinkDataDuplexMap;

/// Refuses to build maps over more link entries than `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkDataLimiter {
    threshold: usize,
}

impl LinkDataLimiter {
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn excess(&self, count: usize) -> bool {
        count > self.threshold
    }

    pub fn check(&self, link_data_duplex_map: &LinkDataDuplexMap) -> Result<(), MapError> {
        let count = link_data_duplex_map.total_count();
        if self.excess(count) {
            return Err(MapError::LinkLimitExceeded {
                count,
                threshold: self.threshold,
            });
        }
        Ok(())
    }
}
