// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lookups of the API, string and SQL metadata agents register, used to render call stacks.

use crate::errors::MetadataError;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::metadata::{
    ApiMetaDataMapper, MetaDataRowKey, MetadataEncoder, SqlMetaDataMapper, StringMetaDataMapper,
};
use pinpoint_common::span::{ApiMetaData, SqlMetaData, StringMetaData};
use pinpoint_common::store::{Row, Store};
use pinpoint_common::table::{ColumnFamily, TableNameProvider};
use std::sync::Arc;
use tracing::debug;

pub struct MetadataDao {
    store: Arc<dyn Store>,
    table_names: Arc<TableNameProvider>,
    encoder: MetadataEncoder,
    api_mapper: ApiMetaDataMapper,
    string_mapper: StringMetaDataMapper,
    sql_mapper: SqlMetaDataMapper,
}

impl MetadataDao {
    pub fn new(
        store: Arc<dyn Store>,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: Arc<TableNameProvider>,
    ) -> Self {
        Self {
            store,
            table_names,
            encoder: MetadataEncoder::new(Arc::clone(&distributor)),
            api_mapper: ApiMetaDataMapper::new(Arc::clone(&distributor)),
            string_mapper: StringMetaDataMapper::new(Arc::clone(&distributor)),
            sql_mapper: SqlMetaDataMapper::new(distributor),
        }
    }

    /// Every cell of the row, legacy cells included. Empty when the agent never sent the id.
    pub async fn select_api_metadata(
        &self,
        agent_id: &str,
        agent_start_time: i64,
        api_id: i32,
    ) -> Result<Vec<ApiMetaData>, MetadataError> {
        let key = MetaDataRowKey::new(agent_id, agent_start_time, api_id);
        match self.select_row(&ColumnFamily::API_METADATA_API, &key).await? {
            Some(row) => Ok(self.api_mapper.map_row(&row)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn select_string_metadata(
        &self,
        agent_id: &str,
        agent_start_time: i64,
        string_id: i32,
    ) -> Result<Vec<StringMetaData>, MetadataError> {
        let key = MetaDataRowKey::new(agent_id, agent_start_time, string_id);
        match self
            .select_row(&ColumnFamily::STRING_METADATA_STR, &key)
            .await?
        {
            Some(row) => Ok(self.string_mapper.map_row(&row)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn select_sql_metadata(
        &self,
        agent_id: &str,
        agent_start_time: i64,
        sql_id: i32,
    ) -> Result<Vec<SqlMetaData>, MetadataError> {
        let key = MetaDataRowKey::new(agent_id, agent_start_time, sql_id);
        match self.select_row(&ColumnFamily::SQL_METADATA_SQL, &key).await? {
            Some(row) => Ok(self.sql_mapper.map_row(&row)?),
            None => Ok(Vec::new()),
        }
    }

    async fn select_row(
        &self,
        column_family: &ColumnFamily,
        key: &MetaDataRowKey,
    ) -> Result<Option<Row>, MetadataError> {
        let table = self.table_names.table_name(column_family);
        let row_key = self.encoder.salted_row_key(key)?;
        let row = self.store.get(table, &row_key).await?;
        if row.is_none() {
            debug!("no metadata {} of {} in {}", key.id, key.agent_id, table);
        }
        Ok(row)
    }
}
