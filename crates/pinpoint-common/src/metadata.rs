// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metadata rows: API signatures, strings and SQL texts registered by agents.
//!
//! Row key: `salt || agent id (24 bytes, zero padded) || agent start time (i64) || id (i32)`.
//! The modern cell stores the payload as the value of the `P` qualifier. Legacy rows stored the
//! payload in the qualifier itself, with an empty value.

use crate::buffer::{BufMutExt, FixedBuffer};
use crate::distributor::RowKeyDistributorByHashPrefix;
use crate::errors::RowError;
use crate::id::MAX_ID_LENGTH;
use crate::span::{ApiMetaData, MethodType, SqlMetaData, StringMetaData};
use crate::store::{Cell, Row};
use crate::table::METADATA_SIGNATURE_QUALIFIER;
use bytes::BufMut;
use std::sync::Arc;
use tracing::debug;

const ROW_KEY_LENGTH: usize = MAX_ID_LENGTH + 8 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaDataRowKey {
    pub agent_id: String,
    pub agent_start_time: i64,
    pub id: i32,
}

impl MetaDataRowKey {
    pub fn new(agent_id: impl Into<String>, agent_start_time: i64, id: i32) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_start_time,
            id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataEncoder {
    distributor: Arc<RowKeyDistributorByHashPrefix>,
}

impl MetadataEncoder {
    pub fn new(distributor: Arc<RowKeyDistributorByHashPrefix>) -> Self {
        Self { distributor }
    }

    /// Encodes the key after `salt_size` reserved zero bytes.
    pub fn encode_row_key(salt_size: usize, key: &MetaDataRowKey) -> Result<Vec<u8>, RowError> {
        if key.agent_id.len() > MAX_ID_LENGTH {
            return Err(RowError::AgentIdTooLong(key.agent_id.clone()));
        }
        let mut bytes = Vec::with_capacity(salt_size + ROW_KEY_LENGTH);
        bytes.put_bytes(0, salt_size);
        bytes.put_padded_string(&key.agent_id, MAX_ID_LENGTH);
        bytes.put_i64(key.agent_start_time);
        bytes.put_i32(key.id);
        Ok(bytes)
    }

    pub fn salted_row_key(&self, key: &MetaDataRowKey) -> Result<Vec<u8>, RowError> {
        let mut bytes = Self::encode_row_key(self.distributor.salt_size(), key)?;
        self.distributor.write_salt_key(&mut bytes)?;
        Ok(bytes)
    }
}

pub struct MetadataDecoder;

impl MetadataDecoder {
    /// Decodes an unsalted row key.
    pub fn decode_row_key(bytes: &[u8]) -> Result<MetaDataRowKey, RowError> {
        let mut buffer = FixedBuffer::new(bytes);
        let agent_id = buffer.read_padded_string(MAX_ID_LENGTH)?;
        let agent_start_time = buffer.read_i64()?;
        let id = buffer.read_i32()?;
        Ok(MetaDataRowKey {
            agent_id,
            agent_start_time,
            id,
        })
    }
}

pub fn encode_api_metadata_value(
    api_info: &str,
    line_number: i32,
    method_type: MethodType,
    location: Option<&str>,
) -> Vec<u8> {
    let mut value = Vec::new();
    value.put_prefixed_string(Some(api_info));
    value.put_i32(line_number);
    value.put_i32(method_type.code());
    if let Some(location) = location {
        value.put_prefixed_string(Some(location));
    }
    value
}

pub fn encode_string_metadata_value(value: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.put_prefixed_string(Some(value));
    bytes
}

/// Payload of a metadata cell.
///
/// The signature qualifier always reads from the value. Any other qualifier is a legacy cell: its
/// value wins when non-empty, otherwise the qualifier bytes are the payload.
fn cell_payload(cell: &Cell) -> &[u8] {
    if cell.qualifier == METADATA_SIGNATURE_QUALIFIER || !cell.value.is_empty() {
        &cell.value
    } else {
        &cell.qualifier
    }
}

#[derive(Debug, Clone)]
pub struct ApiMetaDataMapper {
    distributor: Arc<RowKeyDistributorByHashPrefix>,
}

impl ApiMetaDataMapper {
    pub fn new(distributor: Arc<RowKeyDistributorByHashPrefix>) -> Self {
        Self { distributor }
    }

    pub fn map_row(&self, row: &Row) -> Result<Vec<ApiMetaData>, RowError> {
        if row.cells.is_empty() {
            return Ok(Vec::new());
        }
        let key = MetadataDecoder::decode_row_key(self.distributor.original_key(&row.key)?)?;

        let mut result = Vec::with_capacity(row.cells.len());
        for cell in &row.cells {
            let mut buffer = FixedBuffer::new(cell_payload(cell));
            let api_info = buffer.read_prefixed_string()?.unwrap_or_default();
            let line_number = buffer.read_i32()?;
            let method_type = if buffer.has_remaining() {
                MethodType::from_code(buffer.read_i32()?)
            } else {
                MethodType::Default
            };
            let location = if buffer.has_remaining() {
                buffer.read_prefixed_string()?
            } else {
                None
            };
            let api_metadata = ApiMetaData {
                agent_id: key.agent_id.clone(),
                agent_start_time: key.agent_start_time,
                api_id: key.id,
                api_info,
                line_number,
                method_type,
                location,
            };
            debug!("read apiAnnotation: {api_metadata:?}");
            result.push(api_metadata);
        }
        Ok(result)
    }
}

#[derive(Debug, Clone)]
pub struct StringMetaDataMapper {
    distributor: Arc<RowKeyDistributorByHashPrefix>,
}

impl StringMetaDataMapper {
    pub fn new(distributor: Arc<RowKeyDistributorByHashPrefix>) -> Self {
        Self { distributor }
    }

    pub fn map_row(&self, row: &Row) -> Result<Vec<StringMetaData>, RowError> {
        if row.cells.is_empty() {
            return Ok(Vec::new());
        }
        let key = MetadataDecoder::decode_row_key(self.distributor.original_key(&row.key)?)?;
        row.cells
            .iter()
            .map(|cell| {
                let value = FixedBuffer::new(cell_payload(cell))
                    .read_prefixed_string()?
                    .unwrap_or_default();
                Ok(StringMetaData {
                    agent_id: key.agent_id.clone(),
                    agent_start_time: key.agent_start_time,
                    string_id: key.id,
                    value,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct SqlMetaDataMapper {
    distributor: Arc<RowKeyDistributorByHashPrefix>,
}

impl SqlMetaDataMapper {
    pub fn new(distributor: Arc<RowKeyDistributorByHashPrefix>) -> Self {
        Self { distributor }
    }

    pub fn map_row(&self, row: &Row) -> Result<Vec<SqlMetaData>, RowError> {
        if row.cells.is_empty() {
            return Ok(Vec::new());
        }
        let key = MetadataDecoder::decode_row_key(self.distributor.original_key(&row.key)?)?;
        row.cells
            .iter()
            .map(|cell| {
                let sql = FixedBuffer::new(cell_payload(cell))
                    .read_prefixed_string()?
                    .unwrap_or_default();
                Ok(SqlMetaData {
                    agent_id: key.agent_id.clone(),
                    agent_start_time: key.agent_start_time,
                    sql_id: key.id,
                    sql,
                })
            })
            .collect()
    }
}
