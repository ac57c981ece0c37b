//! Serial link management.
//!
//! [`SerialLink`] owns the single physical connection to the board. One
//! spawned task holds the port exclusively and multiplexes three duties:
//! the blocking read loop, serialized command writes, and teardown/reopen
//! during reconnection. Because only that task ever touches the handle, a
//! write can never interleave with a concurrent read or a half-torn
//! connection; writers reach it through a bounded command channel and get a
//! bounded wait rather than a hang.

pub mod port;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::protocol::{LineFramer, MAX_LINE_LEN, looks_corrupt, parse_line};
use crate::state::BotState;

pub use port::{DEFAULT_BAUD_RATE, PortFactory, SerialPortFactory, list_ports};

/// Default pause after a command write before inbound reads resume.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Default interval between reconnection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Consecutive implausible records that force a reconnect.
const CORRUPT_LINE_LIMIT: u32 = 3;

/// Serial link lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection has been established yet.
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// The read loop is live.
    Connected,
    /// A previously live connection failed; reconnection is pending.
    Degraded,
}

/// Tuning knobs for the link task.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Pause after a command write before reads resume.
    pub settle_delay: Duration,
    /// Interval between reconnection attempts, and the bound on a writer's
    /// wait for the link task.
    pub retry_interval: Duration,
    /// Length guard handed to the framer.
    pub max_line_len: usize,
}

impl LinkConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            settle_delay: DEFAULT_SETTLE_DELAY,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            max_line_len: MAX_LINE_LEN,
        }
    }

    /// Sets the settle delay.
    #[must_use]
    pub const fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the reconnection retry interval.
    #[must_use]
    pub const fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct WriteRequest {
    command: u8,
    done: oneshot::Sender<Result<()>>,
}

/// Handle to the spawned link task.
pub struct SerialLink {
    cmd_tx: mpsc::Sender<WriteRequest>,
    shutdown_tx: watch::Sender<bool>,
    write_timeout: Duration,
    task: Option<JoinHandle<()>>,
}

impl SerialLink {
    /// Spawns the link task; the first connection is opened in the
    /// background and retried until it succeeds.
    #[must_use]
    pub fn spawn<F: PortFactory>(factory: F, config: LinkConfig, state: Arc<BotState>) -> Self {
        Self::spawn_inner(factory, None, config, state)
    }

    /// Spawns the link task around an already opened port.
    #[must_use]
    pub fn spawn_with_port<F: PortFactory>(
        factory: F,
        port: F::Port,
        config: LinkConfig,
        state: Arc<BotState>,
    ) -> Self {
        Self::spawn_inner(factory, Some(port), config, state)
    }

    fn spawn_inner<F: PortFactory>(
        factory: F,
        initial: Option<F::Port>,
        config: LinkConfig,
        state: Arc<BotState>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let write_timeout = config.retry_interval;

        let task = tokio::spawn(run(factory, initial, config, state, cmd_rx, shutdown_rx));

        Self {
            cmd_tx,
            shutdown_tx,
            write_timeout,
            task: Some(task),
        }
    }

    /// Sends a single command byte to the board.
    ///
    /// Completion includes the settle delay: when this returns `Ok`, the
    /// board has had its chance to react before inbound reads resumed. The
    /// wait is bounded by the reconnection retry interval.
    ///
    /// # Errors
    ///
    /// [`Error::LinkDown`] when no connection is established, when the
    /// write itself fails, or when the bounded wait elapses.
    pub async fn write(&self, command: u8) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.cmd_tx
            .send(WriteRequest {
                command,
                done: done_tx,
            })
            .await
            .map_err(|_| Error::LinkDown)?;

        match tokio::time::timeout(self.write_timeout, done_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => Err(Error::LinkDown),
        }
    }

    /// Signals the link task to close the port and waits for it to exit.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Why the drive loop returned.
#[derive(Debug, PartialEq, Eq)]
enum LinkEnd {
    /// Shutdown was signalled.
    Shutdown,
    /// The connection failed and should be reopened.
    Failed,
}

async fn run<F: PortFactory>(
    factory: F,
    mut initial: Option<F::Port>,
    config: LinkConfig,
    state: Arc<BotState>,
    mut cmd_rx: mpsc::Receiver<WriteRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ever_connected = false;

    loop {
        let port = if let Some(port) = initial.take() {
            Some(port)
        } else {
            state.set_connection_state(ConnectionState::Connecting).await;
            match factory.open().await {
                Ok(port) => Some(port),
                Err(e) => {
                    tracing::warn!("serial open failed: {e}");
                    None
                }
            }
        };

        if let Some(port) = port {
            ever_connected = true;
            state.set_connection_state(ConnectionState::Connected).await;
            tracing::info!("serial link established");

            match drive(port, &config, &state, &mut cmd_rx, &mut shutdown_rx).await {
                LinkEnd::Shutdown => break,
                LinkEnd::Failed => {
                    state.set_connection_state(ConnectionState::Degraded).await;
                }
            }
        } else {
            // Never-connected and connection-lost read differently on the
            // dashboard; both sit here until the next attempt.
            let down = if ever_connected {
                ConnectionState::Degraded
            } else {
                ConnectionState::Disconnected
            };
            state.set_connection_state(down).await;
        }

        if wait_retry(&config, &mut cmd_rx, &mut shutdown_rx).await {
            break;
        }
    }

    state
        .set_connection_state(ConnectionState::Disconnected)
        .await;
    tracing::debug!("serial link task exiting");
}

/// Runs one live connection until it fails or shutdown is signalled.
async fn drive<P: AsyncRead + AsyncWrite + Unpin>(
    mut port: P,
    config: &LinkConfig,
    state: &BotState,
    cmd_rx: &mut mpsc::Receiver<WriteRequest>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LinkEnd {
    let mut framer = LineFramer::with_max_line(config.max_line_len);
    let mut buf = [0u8; 1024];
    let mut corrupt_run = 0u32;

    loop {
        enum Step {
            Shutdown(bool),
            Write(Option<WriteRequest>),
            Read(std::io::Result<usize>),
        }

        let step = tokio::select! {
            biased;
            res = shutdown_rx.changed() => Step::Shutdown(res.is_err()),
            req = cmd_rx.recv() => Step::Write(req),
            r = port.read(&mut buf) => Step::Read(r),
        };

        match step {
            Step::Shutdown(sender_gone) => {
                if sender_gone || *shutdown_rx.borrow_and_update() {
                    return LinkEnd::Shutdown;
                }
            }
            Step::Write(None) => return LinkEnd::Shutdown,
            Step::Write(Some(req)) => {
                // Exclusive write section: anything buffered inbound is
                // stale relative to the command's expected response.
                let drained = drain_pending(&mut port).await;
                framer.reset();
                if drained > 0 {
                    tracing::trace!("discarded {drained} stale bytes before write");
                }

                let result = write_command(&mut port, req.command, config.settle_delay).await;
                let failed = result.is_err();
                let _ = req.done.send(result);
                if failed {
                    return LinkEnd::Failed;
                }
            }
            Step::Read(Ok(0)) => {
                tracing::debug!("serial port closed");
                return LinkEnd::Failed;
            }
            Step::Read(Ok(n)) => {
                tracing::trace!("received {n} bytes");
                framer.feed(&buf[..n]);

                while let Some(line) = framer.next_line() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if looks_corrupt(&line) {
                        corrupt_run += 1;
                        tracing::warn!(
                            "corrupted record ({corrupt_run}/{CORRUPT_LINE_LIMIT}): {line:?}"
                        );
                        if corrupt_run >= CORRUPT_LINE_LIMIT {
                            tracing::warn!("too many corrupted records, reopening link");
                            return LinkEnd::Failed;
                        }
                        continue;
                    }
                    corrupt_run = 0;

                    let update = parse_line(&line);
                    if update.is_empty() {
                        tracing::trace!("record carried no recognized fields: {line:?}");
                    } else {
                        state.apply_telemetry(update).await;
                    }
                }
            }
            Step::Read(Err(e)) => {
                tracing::error!("serial read error: {e}");
                return LinkEnd::Failed;
            }
        }
    }
}

/// Writes the command byte and holds off reads for the settle delay.
async fn write_command<P: AsyncWrite + Unpin>(
    port: &mut P,
    command: u8,
    settle_delay: Duration,
) -> Result<()> {
    let outcome: std::io::Result<()> = async {
        port.write_all(&[command]).await?;
        port.flush().await
    }
    .await;

    if let Err(e) = outcome {
        tracing::warn!("command write failed: {e}");
        return Err(Error::LinkDown);
    }

    tracing::debug!("sent command byte {:?}", char::from(command));
    tokio::time::sleep(settle_delay).await;
    Ok(())
}

/// Swallows whatever input is immediately pending on the port.
async fn drain_pending<P: AsyncRead + Unpin>(port: &mut P) -> usize {
    let mut drained = 0usize;
    let mut buf = [0u8; 256];
    let deadline = tokio::time::Instant::now() + Duration::from_millis(25);

    while tokio::time::Instant::now() < deadline {
        match tokio::time::timeout(Duration::from_millis(5), port.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => drained += n,
            _ => break,
        }
    }
    drained
}

/// Sits out the retry interval, answering writers with `LinkDown` instead of
/// letting them queue against a dead connection. Returns true on shutdown.
async fn wait_retry(
    config: &LinkConfig,
    cmd_rx: &mut mpsc::Receiver<WriteRequest>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let wait = tokio::time::sleep(config.retry_interval);
    tokio::pin!(wait);

    loop {
        tokio::select! {
            biased;
            res = shutdown_rx.changed() => {
                if res.is_err() || *shutdown_rx.borrow_and_update() {
                    return true;
                }
            }
            () = &mut wait => return false,
            req = cmd_rx.recv() => match req {
                Some(req) => {
                    let _ = req.done.send(Err(Error::LinkDown));
                }
                None => return true,
            },
        }
    }
}
