// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Big-endian readers and writers for row keys, column names and cell values.
//!
//! Strings are written with an `i32` length prefix; a length of `-1` encodes an absent string.

use crate::errors::BufferError;
use bytes::BufMut;

const NULL_STRING_LENGTH: i32 = -1;

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct FixedBuffer<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FixedBuffer<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn with_offset(bytes: &'a [u8], offset: usize) -> Self {
        Self {
            bytes,
            offset: offset.min(bytes.len()),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], BufferError> {
        if self.remaining() < len {
            return Err(BufferError::Underflow {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], BufferError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> Result<u8, BufferError> {
        Ok(self.take_array::<1>()?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16, BufferError> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, BufferError> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, BufferError> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BufferError> {
        self.take(len)
    }

    /// Reads a fixed-width field, dropping the zero padding on the right.
    pub fn read_padded_string(&mut self, width: usize) -> Result<String, BufferError> {
        let raw = self.take(width)?;
        let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8(raw[..end].to_vec())?)
    }

    pub fn read_prefixed_string(&mut self) -> Result<Option<String>, BufferError> {
        let len = self.read_i32()?;
        if len == NULL_STRING_LENGTH {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| BufferError::InvalidLength(len))?;
        let raw = self.take(len)?;
        Ok(Some(String::from_utf8(raw.to_vec())?))
    }
}

/// Writers matching [`FixedBuffer`]'s readers.
pub trait BufMutExt: BufMut {
    fn put_prefixed_string(&mut self, value: Option<&str>) {
        match value {
            None => self.put_i32(NULL_STRING_LENGTH),
            Some(value) => {
                // strings written here are ids and short texts, far below i32::MAX
                self.put_i32(i32::try_from(value.len()).unwrap_or(i32::MAX));
                self.put_slice(value.as_bytes());
            }
        }
    }

    /// Writes `value` right-padded with zeros to `width` bytes. Longer values are rejected by
    /// the caller before reaching here.
    fn put_padded_string(&mut self, value: &str, width: usize) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(width);
        self.put_slice(&bytes[..len]);
        self.put_bytes(0, width - len);
    }
}

impl<T: BufMut + ?Sized> BufMutExt for T {}
