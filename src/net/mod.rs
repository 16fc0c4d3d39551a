//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! TcpStream (from pool hooks)
//!     → frame.rs (length-prefixed codec installed)
//!     → connection.rs (I/O task, handler slot, liveness)
//!     → reaper.rs (idle signal → close / keep)
//!
//! Connection States:
//!     Open (idle in pool) ⇄ Open (on loan) → Closed
//! ```
//!
//! # Design Decisions
//! - Each connection is driven by exactly one task
//! - Oversized or malformed frames fail the connection
//! - Close is observable: a listener runs once when the task exits

pub mod connection;
pub mod frame;
pub mod reaper;

pub use connection::{Connection, ConnectionError, ConnectionId, InboundHandler};
pub use frame::{FrameCodec, FrameError, MAX_FRAME_SIZE};
pub use reaper::{IdleAction, IdleReaper};
