// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::RowInfo;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::store::Increment;
use pinpoint_common::table::TableName;
use std::collections::{BTreeMap, HashMap};

type RowColumns = BTreeMap<(Vec<u8>, &'static [u8]), Vec<(Vec<u8>, i64)>>;

/// Coalesces a drained snapshot into one multi-column increment per salted row.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowKeyMerge;

impl RowKeyMerge {
    pub fn merge(
        &self,
        snapshot: Vec<(RowInfo, i64)>,
        distributor: &RowKeyDistributorByHashPrefix,
    ) -> HashMap<TableName, Vec<Increment>> {
        // rows sorted per table so requests are deterministic
        let mut tables: HashMap<TableName, RowColumns> = HashMap::new();
        for (row, delta) in snapshot {
            tables
                .entry(row.table_key.table)
                .or_default()
                .entry((row.row_key, row.table_key.family))
                .or_default()
                .push((row.column_name, delta));
        }

        tables
            .into_iter()
            .map(|(table_name, rows)| {
                let increments = rows
                    .into_iter()
                    .map(|((row_key, family), mut columns)| {
                        columns.sort();
                        Increment {
                            row: distributor.distributed_key(&row_key),
                            family: family.to_vec(),
                            columns,
                        }
                    })
                    .collect();
                (table_name, increments)
            })
            .collect()
    }
}
