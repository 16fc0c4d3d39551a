//! Wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Request (id + opaque body)
//!     → message.rs (envelope with credentials)
//!     → net/frame.rs (length prefix) → socket
//!
//! socket → net/frame.rs → message.rs (Response envelope)
//!     → status / request-id checks
//!     → decoder.rs (caller's ResponseDecoder) → typed result
//! ```

pub mod decoder;
pub mod message;

pub use decoder::{DecodeError, FnDecoder, JsonDecoder, RawDecoder, ResponseDecoder};
pub use message::{ProtocolError, Request, RequestEnvelope, Response, PROTOCOL_VERSION, STATUS_OK};
