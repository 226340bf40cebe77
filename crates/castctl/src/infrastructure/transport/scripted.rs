//! Scripted transport for unit and integration testing.
//!
//! Replays a [`DeviceScript`] instead of talking to a real receiver, and
//! records every call an orchestrator makes in a shared [`Recorder`], stamped
//! with `tokio::time::Instant` so tests running on paused time can assert on
//! delays.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use castctl_core::{CastError, DeviceEndpoint, DeviceStatus};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::application::transport::{
    Application, ConnectOptions, Device, DeviceEvent, DeviceLink, PresenceEvent, ScanOptions,
    Session, Transport,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Produces the receiver's replies to one outbound session message.
pub type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

// ── Call log ──────────────────────────────────────────────────────────────────

/// One operation issued against the scripted device.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect { endpoint: DeviceEndpoint },
    Scan,
    Status,
    Resolve { app_id: String },
    Launch { app_id: String },
    Run { app_id: String, namespace: Option<String> },
    Join { app_id: String, namespace: String },
    Send { payload: Value },
    SendAcked { payload: Value },
    SessionStop,
    Stop,
}

/// Shared, time-stamped call log.
#[derive(Debug, Default)]
pub struct Recorder {
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl Recorder {
    pub fn record(&self, call: Call) {
        lock(&self.calls).push((Instant::now(), call));
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).iter().map(|(_, c)| c.clone()).collect()
    }

    /// Time at which the first call matching `pred` was made.
    pub fn first_at(&self, pred: impl Fn(&Call) -> bool) -> Option<Instant> {
        lock(&self.calls).iter().find(|(_, c)| pred(c)).map(|(at, _)| *at)
    }

    pub fn stop_count(&self) -> usize {
        self.count(|c| matches!(c, Call::Stop))
    }

    pub fn session_stop_count(&self) -> usize {
        self.count(|c| matches!(c, Call::SessionStop))
    }

    /// Payloads passed to `send` and `send_acked`, in order.
    pub fn sent(&self) -> Vec<Value> {
        lock(&self.calls)
            .iter()
            .filter_map(|(_, c)| match c {
                Call::Send { payload } | Call::SendAcked { payload } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        lock(&self.calls).iter().filter(|(_, c)| pred(c)).count()
    }
}

// ── Script ────────────────────────────────────────────────────────────────────

/// What the scripted device does.
///
/// `DeviceScript::default()` emits no lifecycle events at all, so a command
/// driven against it waits for `connected` forever.
pub struct DeviceScript {
    events: Vec<DeviceEvent>,
    presence: Vec<PresenceEvent>,
    scan_error: Option<CastError>,
    status: Result<DeviceStatus, CastError>,
    missing_apps: Vec<String>,
    run_error: Option<CastError>,
    join_error: Option<CastError>,
    send_error: Option<CastError>,
    session_messages: Vec<Value>,
    close_session: bool,
    responder: Option<Responder>,
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            presence: Vec::new(),
            scan_error: None,
            status: Ok(DeviceStatus::default()),
            missing_apps: Vec::new(),
            run_error: None,
            join_error: None,
            send_error: None,
            session_messages: Vec::new(),
            close_session: false,
            responder: None,
        }
    }
}

impl DeviceScript {
    /// A device that connects and then behaves.
    pub fn connected() -> Self {
        Self::default().with_events(vec![DeviceEvent::Connected])
    }

    /// A device whose connection attempt fails with `cause`.
    pub fn refused(cause: &str) -> Self {
        Self::default().with_events(vec![DeviceEvent::Error(cause.to_string())])
    }

    /// Lifecycle events emitted, in order, as soon as `connect` is called.
    pub fn with_events(mut self, events: Vec<DeviceEvent>) -> Self {
        self.events = events;
        self
    }

    /// Presence events delivered by `scan`; the stream ends after them.
    pub fn with_presence(mut self, presence: Vec<PresenceEvent>) -> Self {
        self.presence = presence;
        self
    }

    pub fn fail_scan(mut self, error: CastError) -> Self {
        self.scan_error = Some(error);
        self
    }

    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = Ok(status);
        self
    }

    pub fn fail_status(mut self, error: CastError) -> Self {
        self.status = Err(error);
        self
    }

    pub fn without_app(mut self, app_id: &str) -> Self {
        self.missing_apps.push(app_id.to_string());
        self
    }

    pub fn fail_run(mut self, error: CastError) -> Self {
        self.run_error = Some(error);
        self
    }

    pub fn fail_join(mut self, error: CastError) -> Self {
        self.join_error = Some(error);
        self
    }

    pub fn fail_send(mut self, error: CastError) -> Self {
        self.send_error = Some(error);
        self
    }

    /// Messages waiting on every session as soon as it starts.
    pub fn with_session_messages(mut self, messages: Vec<Value>) -> Self {
        self.session_messages = messages;
        self
    }

    /// Sessions end once their initial messages have been read.
    pub fn closing_session(mut self) -> Self {
        self.close_session = true;
        self
    }

    /// Replies pushed onto the session for every outbound message.
    pub fn respond_with<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&Value) -> Vec<Value> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }
}

// ── Transport ─────────────────────────────────────────────────────────────────

/// A [`Transport`] that replays one [`DeviceScript`].
pub struct ScriptedTransport {
    recorder: Arc<Recorder>,
    script: Arc<Mutex<DeviceScript>>,
    events: Mutex<Option<mpsc::UnboundedSender<DeviceEvent>>>,
}

impl ScriptedTransport {
    pub fn new(script: DeviceScript) -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            script: Arc::new(Mutex::new(script)),
            events: Mutex::new(None),
        }
    }

    pub fn recorder(&self) -> Arc<Recorder> {
        Arc::clone(&self.recorder)
    }

    /// Pushes a lifecycle event onto the most recent connection, as if the
    /// device had just reported it.  Returns `false` if nothing is listening.
    pub fn emit(&self, event: DeviceEvent) -> bool {
        match lock(&self.events).as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn connect(&self, endpoint: &DeviceEndpoint, _options: &ConnectOptions) -> DeviceLink {
        self.recorder.record(Call::Connect {
            endpoint: endpoint.clone(),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        for event in &lock(&self.script).events {
            let _ = tx.send(event.clone());
        }
        // The sender stays with the transport so the stream never ends on
        // its own; tests push later events through `emit`.
        *lock(&self.events) = Some(tx);
        DeviceLink {
            device: Arc::new(ScriptedDevice {
                recorder: Arc::clone(&self.recorder),
                script: Arc::clone(&self.script),
            }),
            events: rx,
        }
    }

    async fn scan(&self, _options: &ScanOptions) -> Result<mpsc::Receiver<PresenceEvent>, CastError> {
        self.recorder.record(Call::Scan);
        let script = lock(&self.script);
        if let Some(error) = &script.scan_error {
            return Err(error.clone());
        }
        let (tx, rx) = mpsc::channel(script.presence.len().max(1));
        for event in &script.presence {
            let _ = tx.try_send(event.clone());
        }
        Ok(rx)
    }
}

struct ScriptedDevice {
    recorder: Arc<Recorder>,
    script: Arc<Mutex<DeviceScript>>,
}

#[async_trait]
impl Device for ScriptedDevice {
    async fn status(&self) -> Result<DeviceStatus, CastError> {
        self.recorder.record(Call::Status);
        lock(&self.script).status.clone()
    }

    async fn application(&self, app_id: &str) -> Result<Box<dyn Application>, CastError> {
        self.recorder.record(Call::Resolve {
            app_id: app_id.to_string(),
        });
        if lock(&self.script).missing_apps.iter().any(|a| a == app_id) {
            return Err(CastError::ApplicationNotFound {
                app_id: app_id.to_string(),
            });
        }
        Ok(Box::new(ScriptedApplication {
            app_id: app_id.to_string(),
            recorder: Arc::clone(&self.recorder),
            script: Arc::clone(&self.script),
        }))
    }

    fn stop(&self) {
        self.recorder.record(Call::Stop);
    }
}

struct ScriptedApplication {
    app_id: String,
    recorder: Arc<Recorder>,
    script: Arc<Mutex<DeviceScript>>,
}

#[async_trait]
impl Application for ScriptedApplication {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    fn launch(&mut self) -> Result<(), CastError> {
        self.recorder.record(Call::Launch {
            app_id: self.app_id.clone(),
        });
        Ok(())
    }

    async fn run(&mut self, namespace: Option<&str>) -> Result<Box<dyn Session>, CastError> {
        self.recorder.record(Call::Run {
            app_id: self.app_id.clone(),
            namespace: namespace.map(str::to_string),
        });
        if let Some(error) = &lock(&self.script).run_error {
            return Err(error.clone());
        }
        Ok(Box::new(ScriptedSession::open(
            Arc::clone(&self.recorder),
            namespace,
            Arc::clone(&self.script),
        )))
    }

    async fn join(&mut self, namespace: &str) -> Result<Box<dyn Session>, CastError> {
        self.recorder.record(Call::Join {
            app_id: self.app_id.clone(),
            namespace: namespace.to_string(),
        });
        if let Some(error) = &lock(&self.script).join_error {
            return Err(error.clone());
        }
        Ok(Box::new(ScriptedSession::open(
            Arc::clone(&self.recorder),
            Some(namespace),
            Arc::clone(&self.script),
        )))
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// A session whose inbound stream is fed from the script.
pub struct ScriptedSession {
    recorder: Arc<Recorder>,
    namespace: Option<String>,
    inbox: mpsc::UnboundedReceiver<Value>,
    tx: Option<mpsc::UnboundedSender<Value>>,
    script: Option<Arc<Mutex<DeviceScript>>>,
    stopped: bool,
}

impl ScriptedSession {
    /// A standalone session that yields `messages` and then waits forever.
    pub fn with_messages(recorder: Arc<Recorder>, namespace: Option<&str>, messages: Vec<Value>) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        for message in messages {
            let _ = tx.send(message);
        }
        Self {
            recorder,
            namespace: namespace.map(str::to_string),
            inbox,
            tx: Some(tx),
            script: None,
            stopped: false,
        }
    }

    fn open(recorder: Arc<Recorder>, namespace: Option<&str>, script: Arc<Mutex<DeviceScript>>) -> Self {
        let (messages, closing) = {
            let script = lock(&script);
            (script.session_messages.clone(), script.close_session)
        };
        let mut session = Self::with_messages(recorder, namespace, messages);
        if closing {
            session.tx = None;
        }
        session.script = Some(script);
        session
    }

    fn deliver(&mut self, payload: &Value) -> Result<(), CastError> {
        let Some(script) = &self.script else {
            return Ok(());
        };
        let mut script = lock(script);
        if let Some(error) = &script.send_error {
            return Err(error.clone());
        }
        if let (Some(responder), Some(tx)) = (script.responder.as_mut(), self.tx.as_ref()) {
            for reply in responder(payload) {
                let _ = tx.send(reply);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn send(&mut self, payload: Value) -> Result<(), CastError> {
        self.recorder.record(Call::Send {
            payload: payload.clone(),
        });
        self.deliver(&payload)
    }

    async fn send_acked(&mut self, payload: Value) -> Result<(), CastError> {
        self.recorder.record(Call::SendAcked {
            payload: payload.clone(),
        });
        self.deliver(&payload)
    }

    async fn recv(&mut self) -> Option<Value> {
        if self.stopped {
            return None;
        }
        self.inbox.recv().await
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.tx = None;
            self.recorder.record(Call::SessionStop);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
