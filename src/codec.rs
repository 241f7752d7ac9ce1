//! Codec
//!
//! Converts application keys and values to the bytes the persistent engine
//! stores. The engine orders entries by these bytes, so the codec decides
//! fold order for the persistent backend.

use std::marker::PhantomData;

use bincode::Options as _;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Symmetric byte encoding for one type
pub trait Codec<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// Default codec: bincode with big-endian fixed-width integers.
///
/// Big-endian fixed-width encoding makes unsigned integer keys sort
/// numerically. Strings and byte vectors carry a length prefix, so they
/// sort by length first.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

fn options() -> impl bincode::Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

impl<T> Codec<T> for BincodeCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        options()
            .serialize(value)
            .map_err(|e| StoreError::Serialization(format!("encode: {}", e)))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        options()
            .deserialize(bytes)
            .map_err(|e| StoreError::Serialization(format!("decode: {}", e)))
    }
}
