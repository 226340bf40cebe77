//! Reference TCP transport.
//!
//! One TCP connection per device handle, carrying length-prefixed JSON
//! frames (see [`castctl_core::protocol::codec`]).
//!
//! # Tasks
//!
//! ```text
//!                 ┌──────────── connection task ────────────┐
//! TcpStream ──────┤ connect → emit Connected → read frames   ├──► DeviceEvent / session inboxes / pending replies
//!                 └─────────────────────────────────────────┘
//! outbound queue ──► writer task ──► TcpStream (write half)
//! ```
//!
//! Requests that expect an answer carry a request id from a
//! [`SequenceCounter`]; the connection task completes the matching oneshot
//! when the reply arrives.  Everything else is queued on the outbound channel
//! and written in order by the writer task, which keeps draining after
//! `stop()` until it reaches the close marker.  A fire-and-forget send issued
//! just before `stop()` therefore still reaches the device.
//!
//! # Sessions
//!
//! When a `session_started` reply arrives, the connection task registers the
//! session inbox *before* completing the request.  Session messages that the
//! device sends right behind the reply are therefore never lost.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use castctl_core::protocol::codec::{declared_len, HEADER_SIZE};
use castctl_core::protocol::SequenceCounter;
use castctl_core::{
    decode_frame, encode_frame, CastError, DeviceEndpoint, DeviceStatus, Envelope, Frame, FrameError,
};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::application::transport::{
    Application, ConnectOptions, Device, DeviceEvent, DeviceLink, PresenceEvent, ScanOptions,
    Session, Transport,
};
use crate::infrastructure::discovery;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// [`Transport`] over plain TCP, with UDP discovery for `scan`.
#[derive(Default)]
pub struct TcpTransport {
    writers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits, up to `limit`, for every writer task to flush its queue.
    ///
    /// Call once the command has stopped, before the runtime shuts down, so
    /// fire-and-forget frames queued right before `stop()` are not lost.
    pub async fn drain(&self, limit: Duration) {
        let writers: Vec<_> = lock(&self.writers).drain(..).collect();
        if writers.is_empty() {
            return;
        }
        let flushed = tokio::time::timeout(limit, async {
            for writer in writers {
                let _ = writer.await;
            }
        })
        .await;
        if flushed.is_err() {
            warn!(?limit, "gave up waiting for queued frames to flush");
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn connect(&self, endpoint: &DeviceEndpoint, options: &ConnectOptions) -> DeviceLink {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(endpoint.clone(), events_tx, outbound_tx));

        debug!(endpoint = %endpoint, reconnect = options.reconnect, "opening connection");
        let task = tokio::spawn(run_connection(
            Arc::clone(&shared),
            outbound_rx,
            Arc::clone(&self.writers),
        ));
        *lock(&shared.connection) = Some(task);

        DeviceLink {
            device: Arc::new(TcpDevice { shared }),
            events: events_rx,
        }
    }

    async fn scan(&self, options: &ScanOptions) -> Result<mpsc::Receiver<PresenceEvent>, CastError> {
        discovery::scan(options)
            .await
            .map_err(|e| CastError::Connection(e.to_string()))
    }
}

// ── Connection state ──────────────────────────────────────────────────────────

type Pending = Mutex<HashMap<u64, oneshot::Sender<Reply>>>;

/// Removes a request's waiter when the request finishes or is dropped, so a
/// request abandoned by a step timeout leaves nothing behind.
struct PendingEntry<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(&self.id);
    }
}

enum Outbound {
    Frame(Vec<u8>),
    Close,
}

/// A reply, plus the inbox of the session it opened, if any.
struct Reply {
    frame: Frame,
    inbox: Option<mpsc::UnboundedReceiver<Value>>,
}

/// State shared by the device objects and the connection task.
struct Shared {
    endpoint: DeviceEndpoint,
    sequence: SequenceCounter,
    pending: Pending,
    sessions: Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    events: mpsc::UnboundedSender<DeviceEvent>,
    connection: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl Shared {
    fn new(
        endpoint: DeviceEndpoint,
        events: mpsc::UnboundedSender<DeviceEvent>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            endpoint,
            sequence: SequenceCounter::new(),
            pending: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            outbound: Mutex::new(Some(outbound)),
            events,
            connection: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Lifecycle events are suppressed once the handle has been stopped.
    fn emit(&self, event: DeviceEvent) {
        if !self.is_stopped() {
            let _ = self.events.send(event);
        }
    }

    fn enqueue(&self, envelope: &Envelope) -> Result<(), CastError> {
        let bytes = encode_frame(envelope).map_err(|e| CastError::Protocol(e.to_string()))?;
        let outbound = lock(&self.outbound);
        let tx = outbound
            .as_ref()
            .ok_or_else(|| CastError::Connection(format!("connection to {} is closed", self.endpoint)))?;
        tx.send(Outbound::Frame(bytes))
            .map_err(|_| CastError::Connection(format!("connection to {} is closed", self.endpoint)))?;
        trace!(kind = envelope.frame.kind(), request_id = envelope.request_id, "queued frame");
        Ok(())
    }

    fn notify(&self, frame: Frame) -> Result<(), CastError> {
        self.enqueue(&Envelope::notify(frame))
    }

    /// Sends `frame` and waits for the correlated reply.
    ///
    /// `subject` names the application or namespace the request is about and
    /// is carried into any error built from a `failure` reply.
    async fn request(&self, frame: Frame, subject: &str) -> Result<Reply, CastError> {
        let id = self.sequence.next();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        let _pending = PendingEntry { pending: &self.pending, id };

        self.enqueue(&Envelope::request(id, frame))?;

        let reply = rx.await.map_err(|_| {
            CastError::Connection(format!("connection to {} lost before reply", self.endpoint))
        })?;
        match reply.frame {
            Frame::Failure { kind, message } => Err(CastError::from_failure(kind, subject, message)),
            _ => Ok(reply),
        }
    }

    /// Routes one inbound frame to its waiter, session, or event stream.
    fn route(&self, envelope: Envelope) {
        match (envelope.request_id, envelope.frame) {
            (Some(id), frame) => {
                let session_id = match &frame {
                    Frame::SessionStarted { session_id } => Some(session_id.clone()),
                    _ => None,
                };
                let inbox = session_id.as_deref().map(|sid| self.register_session(sid));
                let waiter = lock(&self.pending).remove(&id);
                let delivered = match waiter {
                    Some(tx) => tx.send(Reply { frame, inbox }).is_ok(),
                    None => {
                        debug!(request_id = id, "reply for unknown request");
                        false
                    }
                };
                if let (false, Some(session_id)) = (delivered, session_id) {
                    lock(&self.sessions).remove(&session_id);
                }
            }
            (None, Frame::DeviceMessage { payload }) => self.emit(DeviceEvent::Message(payload)),
            (None, Frame::SessionMessage { session_id, payload }) => {
                let sessions = lock(&self.sessions);
                match sessions.get(&session_id) {
                    Some(inbox) => {
                        let _ = inbox.send(payload);
                    }
                    None => debug!(session_id, "message for unknown session"),
                }
            }
            (None, Frame::SessionClosed { session_id }) => {
                debug!(session_id, "session closed by device");
                lock(&self.sessions).remove(&session_id);
            }
            (None, other) => debug!(kind = other.kind(), "ignoring unsolicited frame"),
        }
    }

    fn register_session(&self, session_id: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.sessions).insert(session_id.to_string(), tx);
        rx
    }

    /// Fails every pending request and ends every session stream.
    fn release(&self) {
        lock(&self.pending).clear();
        lock(&self.sessions).clear();
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        // The writer flushes everything queued ahead of the marker, then
        // shuts the socket down.
        if let Some(tx) = lock(&self.outbound).take() {
            let _ = tx.send(Outbound::Close);
        }
        self.release();
        if let Some(task) = lock(&self.connection).take() {
            task.abort();
        }
        debug!(endpoint = %self.endpoint, "connection stopped");
    }
}

// ── Connection and writer tasks ───────────────────────────────────────────────

async fn run_connection(
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    writers: Arc<Mutex<Vec<JoinHandle<()>>>>,
) {
    let endpoint = shared.endpoint.clone();
    let stream = match TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await {
        Ok(stream) => stream,
        Err(e) => {
            shared.emit(DeviceEvent::Error(format!("failed to connect to {endpoint}: {e}")));
            shared.release();
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();

    lock(&writers).push(tokio::spawn(write_frames(write_half, outbound, endpoint.clone())));
    shared.emit(DeviceEvent::Connected);
    debug!(endpoint = %endpoint, "connected");

    let outcome = read_frames(read_half, &shared).await;
    match outcome {
        Ok(()) => {
            debug!(endpoint = %endpoint, "device closed the connection");
            shared.emit(DeviceEvent::Disconnected);
        }
        Err(cause) => {
            warn!(endpoint = %endpoint, "{cause}");
            shared.emit(DeviceEvent::Error(cause));
        }
    }
    // Dropping the sender ends the writer once it has drained.
    lock(&shared.outbound).take();
    shared.release();
}

/// Reads frames until EOF (`Ok`) or a transport error (`Err` with the cause).
async fn read_frames(mut read_half: OwnedReadHalf, shared: &Shared) -> Result<(), String> {
    let mut recv_buf: Vec<u8> = Vec::with_capacity(4096);
    let mut read_tmp = vec![0u8; 4096];

    loop {
        let n = match read_half.read(&mut read_tmp).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(format!("read from {} failed: {e}", shared.endpoint)),
        };
        recv_buf.extend_from_slice(&read_tmp[..n]);

        // One read may carry several frames, or only part of one.
        loop {
            match decode_frame(&recv_buf) {
                Ok((envelope, consumed)) => {
                    recv_buf.drain(..consumed);
                    shared.route(envelope);
                }
                Err(e) if e.is_incomplete() => break,
                Err(FrameError::Malformed(e)) => {
                    // The length prefix was sound, so the stream is still in sync.
                    let skip = HEADER_SIZE + declared_len(&recv_buf).unwrap_or(0);
                    warn!(endpoint = %shared.endpoint, "skipping malformed frame: {e}");
                    recv_buf.drain(..skip.min(recv_buf.len()));
                }
                Err(e) => return Err(format!("stream from {} is corrupt: {e}", shared.endpoint)),
            }
        }
    }
}

async fn write_frames(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    endpoint: DeviceEndpoint,
) {
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(bytes) => {
                if let Err(e) = write_half.write_all(&bytes).await {
                    warn!(endpoint = %endpoint, "write failed: {e}");
                    return;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = write_half.shutdown().await;
    trace!(endpoint = %endpoint, "writer finished");
}

// ── Device objects ────────────────────────────────────────────────────────────

fn unexpected(frame: &Frame, wanted: &str) -> CastError {
    CastError::Protocol(format!("expected {wanted}, device sent {}", frame.kind()))
}

struct TcpDevice {
    shared: Arc<Shared>,
}

#[async_trait]
impl Device for TcpDevice {
    async fn status(&self) -> Result<DeviceStatus, CastError> {
        let reply = self.shared.request(Frame::GetStatus, "").await?;
        match reply.frame {
            Frame::Status { status } => Ok(status),
            other => Err(unexpected(&other, "status")),
        }
    }

    async fn application(&self, app_id: &str) -> Result<Box<dyn Application>, CastError> {
        let frame = Frame::ResolveApp {
            app_id: app_id.to_string(),
        };
        let reply = self.shared.request(frame, app_id).await?;
        match reply.frame {
            Frame::AppResolved { app_id } => Ok(Box::new(TcpApplication {
                shared: Arc::clone(&self.shared),
                app_id,
            })),
            other => Err(unexpected(&other, "app_resolved")),
        }
    }

    fn stop(&self) {
        self.shared.stop();
    }
}

struct TcpApplication {
    shared: Arc<Shared>,
    app_id: String,
}

impl TcpApplication {
    async fn open(&self, frame: Frame, namespace: Option<&str>) -> Result<Box<dyn Session>, CastError> {
        let subject = namespace.unwrap_or(self.app_id.as_str());
        let reply = self.shared.request(frame, subject).await?;
        match reply {
            Reply {
                frame: Frame::SessionStarted { session_id },
                inbox: Some(inbox),
            } => Ok(Box::new(TcpSession {
                shared: Arc::clone(&self.shared),
                session_id,
                namespace: namespace.map(str::to_string),
                inbox,
                stopped: false,
            })),
            Reply { frame, .. } => Err(unexpected(&frame, "session_started")),
        }
    }
}

#[async_trait]
impl Application for TcpApplication {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    fn launch(&mut self) -> Result<(), CastError> {
        self.shared.notify(Frame::LaunchApp {
            app_id: self.app_id.clone(),
        })
    }

    async fn run(&mut self, namespace: Option<&str>) -> Result<Box<dyn Session>, CastError> {
        let frame = Frame::StartSession {
            app_id: self.app_id.clone(),
            namespace: namespace.map(str::to_string),
        };
        self.open(frame, namespace).await
    }

    async fn join(&mut self, namespace: &str) -> Result<Box<dyn Session>, CastError> {
        let frame = Frame::JoinSession {
            app_id: self.app_id.clone(),
            namespace: namespace.to_string(),
        };
        self.open(frame, Some(namespace)).await
    }
}

struct TcpSession {
    shared: Arc<Shared>,
    session_id: String,
    namespace: Option<String>,
    inbox: mpsc::UnboundedReceiver<Value>,
    stopped: bool,
}

impl TcpSession {
    fn frame(&self, payload: Value) -> Frame {
        Frame::Send {
            session_id: self.session_id.clone(),
            payload,
        }
    }
}

#[async_trait]
impl Session for TcpSession {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn send(&mut self, payload: Value) -> Result<(), CastError> {
        let frame = self.frame(payload);
        self.shared
            .notify(frame)
            .map_err(|e| CastError::SendFailed(e.to_string()))
    }

    async fn send_acked(&mut self, payload: Value) -> Result<(), CastError> {
        let frame = self.frame(payload);
        let subject = self.namespace.clone().unwrap_or_default();
        let reply = self.shared.request(frame, &subject).await.map_err(|e| match e {
            CastError::Connection(cause) => CastError::SendFailed(cause),
            other => other,
        })?;
        match reply.frame {
            Frame::Ack => Ok(()),
            other => Err(unexpected(&other, "ack")),
        }
    }

    async fn recv(&mut self) -> Option<Value> {
        if self.stopped {
            return None;
        }
        self.inbox.recv().await
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        lock(&self.shared.sessions).remove(&self.session_id);
        let _ = self.shared.notify(Frame::StopSession {
            session_id: self.session_id.clone(),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
