// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::HandlerError;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::metadata::{
    encode_api_metadata_value, encode_string_metadata_value, MetaDataRowKey, MetadataEncoder,
};
use pinpoint_common::span::{ApiMetaData, SqlMetaData, StringMetaData};
use pinpoint_common::store::{Put, Store};
use pinpoint_common::table::{ColumnFamily, TableNameProvider, METADATA_SIGNATURE_QUALIFIER};
use std::sync::Arc;
use tracing::debug;

/// Persists API, string and SQL metadata under the signature qualifier.
pub struct MetadataService {
    encoder: MetadataEncoder,
    table_names: Arc<TableNameProvider>,
    store: Arc<dyn Store>,
}

impl MetadataService {
    pub fn new(
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: Arc<TableNameProvider>,
        store: Arc<dyn Store>,
    ) -> Self {
        Self {
            encoder: MetadataEncoder::new(distributor),
            table_names,
            store,
        }
    }

    pub async fn insert_api_metadata(&self, metadata: &ApiMetaData) -> Result<(), HandlerError> {
        let key = MetaDataRowKey::new(&metadata.agent_id, metadata.agent_start_time, metadata.api_id);
        let value = encode_api_metadata_value(
            &metadata.api_info,
            metadata.line_number,
            metadata.method_type,
            metadata.location.as_deref(),
        );
        self.put(&ColumnFamily::API_METADATA_API, &key, value).await
    }

    pub async fn insert_string_metadata(
        &self,
        metadata: &StringMetaData,
    ) -> Result<(), HandlerError> {
        let key = MetaDataRowKey::new(
            &metadata.agent_id,
            metadata.agent_start_time,
            metadata.string_id,
        );
        let value = encode_string_metadata_value(&metadata.value);
        self.put(&ColumnFamily::STRING_METADATA_STR, &key, value).await
    }

    pub async fn insert_sql_metadata(&self, metadata: &SqlMetaData) -> Result<(), HandlerError> {
        let key = MetaDataRowKey::new(&metadata.agent_id, metadata.agent_start_time, metadata.sql_id);
        let value = encode_string_metadata_value(&metadata.sql);
        self.put(&ColumnFamily::SQL_METADATA_SQL, &key, value).await
    }

    async fn put(
        &self,
        column_family: &ColumnFamily,
        key: &MetaDataRowKey,
        value: Vec<u8>,
    ) -> Result<(), HandlerError> {
        let table = self.table_names.table_name(column_family);
        let put = Put {
            row: self.encoder.salted_row_key(key)?,
            family: column_family.family.to_vec(),
            qualifier: METADATA_SIGNATURE_QUALIFIER.to_vec(),
            value,
        };
        self.store.put(table, put).await?;
        debug!("stored metadata {} of {} in {}", key.id, key.agent_id, table);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinpoint_common::metadata::{ApiMetaDataMapper, SqlMetaDataMapper, StringMetaDataMapper};
    use pinpoint_common::span::MethodType;
    use pinpoint_common::store::InMemoryStore;

    struct Fixture {
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        store: Arc<InMemoryStore>,
        service: MetadataService,
    }

    fn fixture() -> Fixture {
        let distributor = Arc::new(RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid"));
        let store = Arc::new(InMemoryStore::new());
        let service = MetadataService::new(
            Arc::clone(&distributor),
            Arc::new(TableNameProvider::default()),
            store.clone(),
        );
        Fixture {
            distributor,
            store,
            service,
        }
    }

    async fn stored_row(f: &Fixture, column_family: &ColumnFamily, id: i32) -> pinpoint_common::store::Row {
        let key = MetadataEncoder::new(Arc::clone(&f.distributor))
            .salted_row_key(&MetaDataRowKey::new("agent-1", 7, id))
            .expect("valid key");
        f.store
            .get(TableNameProvider::default().table_name(column_family), &key)
            .await
            .expect("store")
            .expect("row")
    }

    #[tokio::test]
    async fn test_api_metadata_round_trip() {
        let f = fixture();
        let metadata = ApiMetaData {
            agent_id: "agent-1".to_string(),
            agent_start_time: 7,
            api_id: 12,
            api_info: "OrderController.place(Order order)".to_string(),
            line_number: 42,
            method_type: MethodType::WebRequest,
            location: Some("OrderController.java".to_string()),
        };
        f.service.insert_api_metadata(&metadata).await.expect("stored");

        let row = stored_row(&f, &ColumnFamily::API_METADATA_API, 12).await;
        let mapped = ApiMetaDataMapper::new(Arc::clone(&f.distributor))
            .map_row(&row)
            .expect("decodes");
        assert_eq!(mapped, vec![metadata]);
    }

    #[tokio::test]
    async fn test_string_and_sql_metadata_round_trip() {
        let f = fixture();
        let string = StringMetaData {
            agent_id: "agent-1".to_string(),
            agent_start_time: 7,
            string_id: 3,
            value: "orders".to_string(),
        };
        let sql = SqlMetaData {
            agent_id: "agent-1".to_string(),
            agent_start_time: 7,
            sql_id: 4,
            sql: "SELECT * FROM orders WHERE id = ?".to_string(),
        };
        f.service.insert_string_metadata(&string).await.expect("stored");
        f.service.insert_sql_metadata(&sql).await.expect("stored");

        let row = stored_row(&f, &ColumnFamily::STRING_METADATA_STR, 3).await;
        assert_eq!(
            StringMetaDataMapper::new(Arc::clone(&f.distributor)).map_row(&row),
            Ok(vec![string])
        );
        let row = stored_row(&f, &ColumnFamily::SQL_METADATA_SQL, 4).await;
        assert_eq!(
            SqlMetaDataMapper::new(Arc::clone(&f.distributor)).map_row(&row),
            Ok(vec![sql])
        );
    }

    #[tokio::test]
    async fn test_agent_id_too_long() {
        let f = fixture();
        let metadata = SqlMetaData {
            agent_id: "a".repeat(30),
            agent_start_time: 7,
            sql_id: 4,
            sql: "SELECT 1".to_string(),
        };
        assert!(matches!(
            f.service.insert_sql_metadata(&metadata).await,
            Err(HandlerError::Row(_))
        ));
    }

    #[tokio::test]
    async fn test_store_failure() {
        let f = fixture();
        f.store.fail_next(1);
        let metadata = SqlMetaData {
            agent_id: "agent-1".to_string(),
            agent_start_time: 7,
            sql_id: 4,
            sql: "SELECT 1".to_string(),
        };
        assert!(matches!(
            f.service.insert_sql_metadata(&metadata).await,
            Err(HandlerError::Store(_))
        ));
    }
}
