// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::service_type::ServiceType;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use ustr::Ustr;

/// A named service of a given type. Names are interned since they repeat on every link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Application {
    name: Ustr,
    service_type: ServiceType,
}

impl Application {
    pub fn new(name: impl AsRef<str>, service_type: ServiceType) -> Self {
        Self {
            name: Ustr::from(name.as_ref()),
            service_type,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn interned_name(&self) -> Ustr {
        self.name
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.service_type)
    }
}

impl Serialize for Application {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Application", 3)?;
        state.serialize_field("applicationName", self.name.as_str())?;
        state.serialize_field("serviceType", self.service_type.name())?;
        state.serialize_field("serviceTypeCode", &self.service_type.code())?;
        state.end()
    }
}
