//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Driver.send(request, decoder, timeout)
//!     → dispatcher.rs: encode → Router.acquire() → install handler → write
//!     → call.rs: first of { response frame, timer, close, write error }
//!     → dispatcher.rs: cleanup → Router.release() → typed result
//! ```

pub mod call;
pub mod dispatcher;

pub use call::{correlate, CallOutcome, CallState, PendingCall};
pub use dispatcher::Dispatcher;
