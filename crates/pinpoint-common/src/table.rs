// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use derive_more::Display;
use ustr::Ustr;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Fully qualified `namespace:table` name.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName(Ustr);

impl TableName {
    pub fn new(namespace: &str, qualifier: &str) -> Self {
        TableName(Ustr::from(format!("{namespace}:{qualifier}").as_str()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// A table plus one of its column families. All descriptors are compile-time constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnFamily {
    pub table: &'static str,
    pub family: &'static [u8],
}

impl ColumnFamily {
    pub const API_METADATA_API: ColumnFamily = ColumnFamily {
        table: "ApiMetaData",
        family: b"Api",
    };
    pub const STRING_METADATA_STR: ColumnFamily = ColumnFamily {
        table: "StringMetaData",
        family: b"Str",
    };
    pub const SQL_METADATA_SQL: ColumnFamily = ColumnFamily {
        table: "SqlMetaData",
        family: b"Sql",
    };
    /// Outbound links: row = caller application, column = callee.
    pub const MAP_STATISTICS_CALLER_COUNTER: ColumnFamily = ColumnFamily {
        table: "ApplicationMapStatisticsCaller_Ver2",
        family: b"C",
    };
    /// Inbound links: row = callee application, column = caller.
    pub const MAP_STATISTICS_CALLEE_COUNTER: ColumnFamily = ColumnFamily {
        table: "ApplicationMapStatisticsCallee_Ver2",
        family: b"C",
    };
    /// Per-agent response times of an application.
    pub const MAP_STATISTICS_SELF_COUNTER: ColumnFamily = ColumnFamily {
        table: "ApplicationMapStatisticsSelf_Ver2",
        family: b"C",
    };
}

/// Qualifier of the metadata cell holding the serialized value.
pub const METADATA_SIGNATURE_QUALIFIER: &[u8] = b"P";

/// Resolves table names within the configured namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNameProvider {
    namespace: String,
}

impl TableNameProvider {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn table_name(&self, column_family: &ColumnFamily) -> TableName {
        TableName::new(&self.namespace, column_family.table)
    }
}

impl Default for TableNameProvider {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_provider() {
        let provider = TableNameProvider::new("pinpoint");
        let name = provider.table_name(&ColumnFamily::API_METADATA_API);
        assert_eq!(name.to_string(), "pinpoint:ApiMetaData");
        assert_eq!(name, TableName::new("pinpoint", "ApiMetaData"));
        assert_eq!(
            TableNameProvider::default()
                .table_name(&ColumnFamily::MAP_STATISTICS_SELF_COUNTER)
                .as_str(),
            "default:ApplicationMapStatisticsSelf_Ver2"
        );
    }
}
