//! Request and response payloads carried inside frames.
//!
//! Request payload:
//! ```text
//! u8  version
//! u16 request_id length, request_id (UTF-8)
//! u16 username length,   username   (UTF-8)
//! u16 password length,   password   (UTF-8)
//! ..  opaque body
//! ```
//!
//! Response payload:
//! ```text
//! u8  version
//! i32 status (200 = success)
//! u16 request_id length, request_id (UTF-8)
//! u32 message length,    message    (UTF-8)
//! ..  opaque result body
//! ```
//!
//! All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use uuid::Uuid;

use crate::config::CredentialsConfig;

pub const PROTOCOL_VERSION: u8 = 1;

/// Status code of a successful response.
pub const STATUS_OK: i32 = 200;

/// Errors encoding or decoding a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("payload truncated while reading {0}")]
    Truncated(&'static str),

    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("field {field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// A caller's request: a unique ID plus an opaque, already-serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    request_id: String,
    body: Bytes,
}

impl Request {
    /// New request with a random UUID v4 request ID.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), body)
    }

    pub fn with_id(request_id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            request_id: request_id.into(),
            body: body.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Request payload with `credentials` stamped on.
    pub fn encode(&self, credentials: &CredentialsConfig) -> Result<Bytes, ProtocolError> {
        RequestEnvelope {
            request_id: self.request_id.clone(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            body: self.body.clone(),
        }
        .encode()
    }
}

/// A request as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    pub request_id: String,
    pub username: String,
    pub password: String,
    pub body: Bytes,
}

impl RequestEnvelope {
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::with_capacity(
            1 + 6 + self.request_id.len() + self.username.len() + self.password.len() + self.body.len(),
        );
        buf.put_u8(PROTOCOL_VERSION);
        put_short_str(&mut buf, "request_id", &self.request_id)?;
        put_short_str(&mut buf, "username", &self.username)?;
        put_short_str(&mut buf, "password", &self.password)?;
        buf.extend_from_slice(&self.body);
        Ok(buf.freeze())
    }

    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        check_version(&mut payload)?;
        let request_id = get_short_str(&mut payload, "request_id")?;
        let username = get_short_str(&mut payload, "username")?;
        let password = get_short_str(&mut payload, "password")?;
        Ok(Self {
            request_id,
            username,
            password,
            body: payload,
        })
    }
}

/// A server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub request_id: String,
    pub message: String,
    pub body: Bytes,
}

impl Response {
    pub fn ok(request_id: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status: STATUS_OK,
            request_id: request_id.into(),
            message: String::new(),
            body: body.into(),
        }
    }

    pub fn error(request_id: impl Into<String>, status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            request_id: request_id.into(),
            message: message.into(),
            body: Bytes::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf =
            BytesMut::with_capacity(1 + 4 + 2 + self.request_id.len() + 4 + self.message.len() + self.body.len());
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_i32(self.status);
        put_short_str(&mut buf, "request_id", &self.request_id)?;
        if self.message.len() > u32::MAX as usize {
            return Err(ProtocolError::FieldTooLong {
                field: "message",
                len: self.message.len(),
                max: u32::MAX as usize,
            });
        }
        buf.put_u32(self.message.len() as u32);
        buf.extend_from_slice(self.message.as_bytes());
        buf.extend_from_slice(&self.body);
        Ok(buf.freeze())
    }

    pub fn decode(mut payload: Bytes) -> Result<Self, ProtocolError> {
        check_version(&mut payload)?;
        if payload.remaining() < 4 {
            return Err(ProtocolError::Truncated("status"));
        }
        let status = payload.get_i32();
        let request_id = get_short_str(&mut payload, "request_id")?;
        if payload.remaining() < 4 {
            return Err(ProtocolError::Truncated("message length"));
        }
        let len = payload.get_u32() as usize;
        let message = take_str(&mut payload, len, "message")?;
        Ok(Self {
            status,
            request_id,
            message,
            body: payload,
        })
    }
}

fn check_version(payload: &mut Bytes) -> Result<(), ProtocolError> {
    if !payload.has_remaining() {
        return Err(ProtocolError::Truncated("version"));
    }
    match payload.get_u8() {
        PROTOCOL_VERSION => Ok(()),
        other => Err(ProtocolError::UnsupportedVersion(other)),
    }
}

fn put_short_str(buf: &mut BytesMut, field: &'static str, value: &str) -> Result<(), ProtocolError> {
    let max = u16::MAX as usize;
    if value.len() > max {
        return Err(ProtocolError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    buf.put_u16(value.len() as u16);
    buf.extend_from_slice(value.as_bytes());
    Ok(())
}

fn get_short_str(payload: &mut Bytes, field: &'static str) -> Result<String, ProtocolError> {
    if payload.remaining() < 2 {
        return Err(ProtocolError::Truncated(field));
    }
    let len = payload.get_u16() as usize;
    take_str(payload, len, field)
}

fn take_str(payload: &mut Bytes, len: usize, field: &'static str) -> Result<String, ProtocolError> {
    if payload.remaining() < len {
        return Err(ProtocolError::Truncated(field));
    }
    let raw = payload.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8(field))
}
