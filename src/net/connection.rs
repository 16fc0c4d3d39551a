//! Physical connection to one graph server.
//!
//! # Responsibilities
//! - Own the framed TCP stream inside a dedicated I/O task
//! - Deliver inbound frames to the handler of the call currently using it
//! - Track liveness, last-active time and loan state
//! - Raise the idle signal and notify the close listener on exit
//!
//! # Design Decisions
//! - One in-flight call per connection; the handler slot holds at most one
//! - The I/O task is the only owner of the socket, so frames are processed in
//!   arrival order
//! - Dropping the [`Connection`] handle ends the I/O task and closes the socket

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::codec::Framed;

use crate::load_balancer::ServerAddress;
use crate::net::frame::{FrameCodec, FrameError};
use crate::net::reaper::{IdleAction, IdleReaper};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Queue depth between a connection handle and its I/O task.
const COMMAND_BUFFER: usize = 8;

/// Loan states. A connection leaves `LOAN_IDLE` either to a caller or to the
/// idle reaper, never both.
const LOAN_IDLE: u8 = 0;
const LOAN_ACTIVE: u8 = 1;
const LOAN_RETIRED: u8 = 2;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Receives the inbound events of the call currently using a connection.
///
/// Both methods run on the connection's I/O task and must not block.
pub trait InboundHandler: Send + Sync {
    fn on_frame(&self, frame: Bytes);
    fn on_closed(&self);
}

/// Invoked once when the I/O task exits.
pub type CloseListener = Box<dyn FnOnce(&ServerAddress) + Send>;

/// Errors from writing to a connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

enum Command {
    Write {
        payload: Bytes,
        done: oneshot::Sender<Result<(), FrameError>>,
    },
    Ping {
        done: oneshot::Sender<()>,
    },
}

struct Shared {
    id: ConnectionId,
    address: ServerAddress,
    epoch: Instant,
    last_active_ms: AtomicU64,
    open: AtomicBool,
    loan: AtomicU8,
    handler: Mutex<Option<Arc<dyn InboundHandler>>>,
    close_requested: Notify,
}

impl Shared {
    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn since_touch(&self) -> Duration {
        let last = self.last_active_ms.load(Ordering::Acquire);
        Duration::from_millis(self.elapsed_ms().saturating_sub(last))
    }

    fn transition(&self, from: u8, to: u8) -> bool {
        self.loan
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn handler_slot(&self) -> MutexGuard<'_, Option<Arc<dyn InboundHandler>>> {
        self.handler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_handler(&self) -> Option<Arc<dyn InboundHandler>> {
        self.handler_slot().clone()
    }

    fn take_handler(&self) -> Option<Arc<dyn InboundHandler>> {
        self.handler_slot().take()
    }
}

/// Handle to a live connection and its I/O task.
pub struct Connection {
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Install the codec on `stream` and start the I/O task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        stream: TcpStream,
        address: ServerAddress,
        codec: FrameCodec,
        reaper: Option<IdleReaper>,
        on_close: CloseListener,
    ) -> Self {
        let shared = Arc::new(Shared {
            id: ConnectionId::new(),
            address,
            epoch: Instant::now(),
            last_active_ms: AtomicU64::new(0),
            open: AtomicBool::new(true),
            loan: AtomicU8::new(LOAN_IDLE),
            handler: Mutex::new(None),
            close_requested: Notify::new(),
        });

        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        let framed = Framed::new(stream, codec);
        let task = tokio::spawn(drive(framed, rx, shared.clone(), reaper, on_close));

        Self {
            shared,
            commands,
            task,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn address(&self) -> &ServerAddress {
        &self.shared.address
    }

    /// Transport still open and the I/O task still running.
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
            && !self.task.is_finished()
            && !self.commands.is_closed()
    }

    /// Time since the last successful use or health check.
    pub fn idle_for(&self) -> Duration {
        self.shared.since_touch()
    }

    /// Refresh the last-active timestamp.
    pub fn touch(&self) {
        self.shared
            .last_active_ms
            .store(self.shared.elapsed_ms(), Ordering::Release);
    }

    pub fn is_on_loan(&self) -> bool {
        self.shared.loan.load(Ordering::Acquire) == LOAN_ACTIVE
    }

    /// Claim the connection for a caller. Fails if the idle reaper already
    /// claimed it for closing.
    pub(crate) fn try_lend(&self) -> bool {
        self.shared.transition(LOAN_IDLE, LOAN_ACTIVE)
    }

    pub(crate) fn end_loan(&self) {
        self.shared.transition(LOAN_ACTIVE, LOAN_IDLE);
    }

    /// Install the scoped handler for the next call. Returns any handler that
    /// was still installed.
    pub fn install_handler(&self, handler: Arc<dyn InboundHandler>) -> Option<Arc<dyn InboundHandler>> {
        self.shared.handler_slot().replace(handler)
    }

    pub fn remove_handler(&self) -> Option<Arc<dyn InboundHandler>> {
        self.shared.take_handler()
    }

    pub fn has_handler(&self) -> bool {
        self.shared.handler_slot().is_some()
    }

    /// Write one frame and wait until it has been flushed to the socket.
    pub async fn write(&self, payload: Bytes) -> Result<(), ConnectionError> {
        let (done, ack) = oneshot::channel();
        self.commands
            .send(Command::Write { payload, done })
            .await
            .map_err(|_| ConnectionError::Closed)?;
        ack.await.map_err(|_| ConnectionError::Closed)??;
        Ok(())
    }

    /// Round-trip a liveness ping through the I/O task.
    pub async fn ping(&self, timeout: Duration) -> bool {
        let (done, ack) = oneshot::channel();
        if self.commands.try_send(Command::Ping { done }).is_err() {
            return false;
        }
        matches!(time::timeout(timeout, ack).await, Ok(Ok(())))
    }

    /// Ask the I/O task to close the socket.
    pub fn close(&self) {
        self.shared.close_requested.notify_one();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("address", &self.shared.address)
            .field("open", &self.is_open())
            .field("on_loan", &self.is_on_loan())
            .finish()
    }
}

async fn drive(
    mut framed: Framed<TcpStream, FrameCodec>,
    mut commands: mpsc::Receiver<Command>,
    shared: Arc<Shared>,
    reaper: Option<IdleReaper>,
    on_close: CloseListener,
) {
    let idle_window = reaper
        .as_ref()
        .map_or(Duration::from_secs(3600), IdleReaper::window);
    let mut last_traffic = time::Instant::now();

    let reason = 'io: loop {
        let idle_deadline = last_traffic + idle_window;

        tokio::select! {
            _ = shared.close_requested.notified() => break 'io "closed locally",

            command = commands.recv() => match command {
                Some(Command::Write { payload, done }) => {
                    last_traffic = time::Instant::now();
                    // A peer that stops reading must not pin the task inside send.
                    let sent = tokio::select! {
                        sent = framed.send(payload) => sent,
                        _ = shared.close_requested.notified() => break 'io "closed during write",
                    };
                    match sent {
                        Ok(()) => {
                            let _ = done.send(Ok(()));
                        }
                        Err(e) => {
                            tracing::warn!(
                                connection_id = %shared.id,
                                server = %shared.address,
                                error = %e,
                                "Write failed"
                            );
                            let _ = done.send(Err(e));
                            break 'io "write failed";
                        }
                    }
                }
                Some(Command::Ping { done }) => {
                    let _ = done.send(());
                }
                None => break 'io "handle dropped",
            },

            inbound = framed.next() => match inbound {
                Some(Ok(frame)) => {
                    last_traffic = time::Instant::now();
                    match shared.current_handler() {
                        Some(handler) => handler.on_frame(frame),
                        None => tracing::warn!(
                            connection_id = %shared.id,
                            server = %shared.address,
                            bytes = frame.len(),
                            "Dropping unsolicited frame"
                        ),
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(
                        connection_id = %shared.id,
                        server = %shared.address,
                        error = %e,
                        "Inbound frame error"
                    );
                    break 'io "frame error";
                }
                None => break 'io "closed by peer",
            },

            _ = time::sleep_until(idle_deadline), if reaper.is_some() => {
                let now = time::Instant::now();
                // A health check or use since the deadline was armed counts as activity.
                let touched = shared.since_touch();
                if touched < idle_window {
                    last_traffic = now.checked_sub(touched).unwrap_or(now);
                    continue 'io;
                }
                last_traffic = now;
                // In-flight calls keep their connection.
                if !shared.transition(LOAN_IDLE, LOAN_RETIRED) {
                    continue 'io;
                }
                if let Some(reaper) = &reaper {
                    if reaper.on_idle(shared.id, &shared.address) == IdleAction::Close {
                        break 'io "idle";
                    }
                }
                shared.transition(LOAN_RETIRED, LOAN_IDLE);
            }
        }
    };

    shared.open.store(false, Ordering::Release);
    shared.loan.store(LOAN_RETIRED, Ordering::Release);
    tracing::debug!(
        connection_id = %shared.id,
        server = %shared.address,
        reason,
        "Connection closed"
    );

    if let Some(handler) = shared.take_handler() {
        handler.on_closed();
    }
    on_close(&shared.address);
}
