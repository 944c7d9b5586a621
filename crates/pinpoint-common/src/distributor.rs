// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Salted row keys.
//!
//! Row keys that grow monotonically (time slots, sequences) would pile up on a single store
//! region. Every key is written as `salt || key`, where the salt is a deterministic hash of the
//! key, so writes spread over a fixed number of buckets. Reads of a key range fan out to one scan
//! per bucket.

use crate::errors::DistributorError;
use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::Arc;

pub const DEFAULT_BUCKETS: usize = 16;
pub const MAX_ONE_BYTE_BUCKETS: usize = 256;

/// Computes the salt prepended to a row key.
pub trait ByteHasher: Send + Sync + std::fmt::Debug {
    fn salt_size(&self) -> usize;

    fn hash(&self, key: &[u8]) -> Vec<u8>;

    /// Every salt this hasher can produce, in ascending order.
    fn all_possible_prefixes(&self) -> Vec<Vec<u8>>;
}

/// One byte salt: `fnv1a(key) mod max_buckets`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneByteSimpleHash {
    max_buckets: usize,
}

impl OneByteSimpleHash {
    pub fn new(max_buckets: usize) -> Result<Self, DistributorError> {
        if max_buckets == 0 || max_buckets > MAX_ONE_BYTE_BUCKETS {
            return Err(DistributorError::InvalidBucketCount(max_buckets));
        }
        Ok(Self { max_buckets })
    }

    pub fn max_buckets(&self) -> usize {
        self.max_buckets
    }

    fn bucket(&self, key: &[u8]) -> u8 {
        let mut hasher = FnvHasher::default();
        hasher.write(key);
        let hash = hasher.finish();
        // fnv's low bits only see the low bits of each input byte, fold the high half in
        let folded = hash ^ (hash >> 32);
        let folded = folded ^ (folded >> 16);
        // max_buckets <= 256, so the remainder fits in a byte
        (folded % self.max_buckets as u64) as u8
    }
}

impl ByteHasher for OneByteSimpleHash {
    fn salt_size(&self) -> usize {
        1
    }

    fn hash(&self, key: &[u8]) -> Vec<u8> {
        vec![self.bucket(key)]
    }

    fn all_possible_prefixes(&self) -> Vec<Vec<u8>> {
        (0..self.max_buckets).map(|bucket| vec![bucket as u8]).collect()
    }
}

/// Encodes and decodes salted row keys. Immutable once built and shared between writers.
#[derive(Debug, Clone)]
pub struct RowKeyDistributorByHashPrefix {
    hasher: Arc<dyn ByteHasher>,
}

impl RowKeyDistributorByHashPrefix {
    pub fn new(hasher: Arc<dyn ByteHasher>) -> Self {
        Self { hasher }
    }

    pub fn with_buckets(max_buckets: usize) -> Result<Self, DistributorError> {
        Ok(Self::new(Arc::new(OneByteSimpleHash::new(max_buckets)?)))
    }

    pub fn salt_size(&self) -> usize {
        self.hasher.salt_size()
    }

    pub fn distributed_key(&self, original_key: &[u8]) -> Vec<u8> {
        let salt = self.hasher.hash(original_key);
        let mut key = Vec::with_capacity(salt.len() + original_key.len());
        key.extend_from_slice(&salt);
        key.extend_from_slice(original_key);
        key
    }

    pub fn original_key<'a>(&self, distributed_key: &'a [u8]) -> Result<&'a [u8], DistributorError> {
        let salt_size = self.salt_size();
        distributed_key
            .get(salt_size..)
            .ok_or(DistributorError::KeyTooShort {
                len: distributed_key.len(),
                salt_size,
            })
    }

    /// Salts a key in place. The first `salt_size` bytes must be reserved and are overwritten.
    pub fn write_salt_key(&self, key: &mut [u8]) -> Result<(), DistributorError> {
        let salt_size = self.salt_size();
        if key.len() < salt_size {
            return Err(DistributorError::KeyTooShort {
                len: key.len(),
                salt_size,
            });
        }
        let salt = self.hasher.hash(&key[salt_size..]);
        key[..salt_size].copy_from_slice(&salt);
        Ok(())
    }

    /// The key under every possible salt, for point reads of an unknown bucket.
    pub fn all_distributed_keys(&self, original_key: &[u8]) -> Vec<Vec<u8>> {
        self.hasher
            .all_possible_prefixes()
            .into_iter()
            .map(|mut prefix| {
                prefix.extend_from_slice(original_key);
                prefix
            })
            .collect()
    }

    /// One `[start, stop)` scan range per bucket covering the unsalted range `[start, stop)`.
    pub fn scan_ranges(&self, start: &[u8], stop: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.all_distributed_keys(start)
            .into_iter()
            .zip(self.all_distributed_keys(stop))
            .collect()
    }
}
