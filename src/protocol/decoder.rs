//! Caller-supplied decoders for response bodies.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// A response body could not be turned into the caller's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DecodeError(String);

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Turns the opaque result body of a successful response into `Output`.
pub trait ResponseDecoder: Send + Sync + 'static {
    type Output: Send + 'static;

    fn decode(&self, body: Bytes) -> Result<Self::Output, DecodeError>;
}

/// Returns the body untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl ResponseDecoder for RawDecoder {
    type Output = Bytes;

    fn decode(&self, body: Bytes) -> Result<Bytes, DecodeError> {
        Ok(body)
    }
}

/// Deserializes a JSON body.
pub struct JsonDecoder<T>(PhantomData<fn() -> T>);

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonDecoder")
    }
}

impl<T: DeserializeOwned + Send + 'static> ResponseDecoder for JsonDecoder<T> {
    type Output = T;

    fn decode(&self, body: Bytes) -> Result<T, DecodeError> {
        serde_json::from_slice(&body).map_err(|e| DecodeError::new(format!("invalid JSON body: {}", e)))
    }
}

/// Adapts a closure into a decoder.
pub struct FnDecoder<F>(F);

impl<F, T> FnDecoder<F>
where
    F: Fn(Bytes) -> Result<T, DecodeError> + Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, T> ResponseDecoder for FnDecoder<F>
where
    F: Fn(Bytes) -> Result<T, DecodeError> + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn decode(&self, body: Bytes) -> Result<T, DecodeError> {
        (self.0)(body)
    }
}
