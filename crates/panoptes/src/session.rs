//! Session actors and the registry.
//!
//! Each client session is a task that owns its `LifecycleController`. HTTP
//! handlers talk to it over a bounded command channel; timers and loads talk
//! to it over the controller's event channel. One task per session means the
//! controller is never touched concurrently and needs no lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use base64::Engine;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};

use argus_common::{ArgusError, DeviceClass, SessionView};

use crate::deterrence::ClientEvent;
use crate::lifecycle::{ChallengeEngine, LifecycleController, SessionEvent};
use crate::scratch::PointerEvent;

const COMMAND_BUFFER: usize = 32;
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Client request applied to the controller
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    Snapshot,
    Refresh,
    View,
    Dismiss,
    Submit { answer: String },
    Pointer { events: Vec<PointerEvent> },
    CheckScratch,
    Client { event: ClientEvent },
    SetDevice { compact: bool },
}

enum Command {
    Apply {
        action: Action,
        reply: oneshot::Sender<Result<SessionView, ArgusError>>,
    },
    Surface {
        reply: oneshot::Sender<Result<String, ArgusError>>,
    },
    Close,
}

fn apply(ctrl: &mut LifecycleController, action: Action) -> Result<SessionView, ArgusError> {
    match action {
        Action::Snapshot => {}
        Action::Refresh => {
            ctrl.request_refresh();
        }
        Action::View => ctrl.open_view()?,
        Action::Dismiss => {
            ctrl.dismiss();
        }
        Action::Submit { answer } => {
            ctrl.submit(&answer)?;
        }
        Action::Pointer { events } => ctrl.pointer(&events)?,
        Action::CheckScratch => {
            ctrl.check_scratch()?;
        }
        Action::Client { event } => {
            ctrl.observe_client_event(&event);
        }
        Action::SetDevice { compact } => ctrl.set_device(compact),
    }
    Ok(ctrl.view())
}

async fn run_session(
    mut ctrl: LifecycleController,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Apply { action, reply }) => {
                    let _ = reply.send(apply(&mut ctrl, action));
                }
                Some(Command::Surface { reply }) => {
                    let _ = reply.send(ctrl.scratch_surface());
                }
                Some(Command::Close) | None => break,
            },
            Some(event) = events.recv() => ctrl.handle_event(event),
        }
    }

    ctrl.shutdown();
    tracing::debug!(round = ctrl.state().round, "Session task finished");
}

/// Cheap handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Command>,
    last_seen: Arc<AtomicI64>,
}

impl SessionHandle {
    fn touch(&self) {
        self.last_seen
            .store(chrono::Utc::now().timestamp(), Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn apply(&self, action: Action) -> Result<SessionView, ArgusError> {
        self.touch();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Apply { action, reply })
            .await
            .map_err(|_| ArgusError::SessionClosed)?;
        rx.await.map_err(|_| ArgusError::SessionClosed)?
    }

    /// Scratch overlay as a PNG data URL
    pub async fn surface(&self) -> Result<String, ArgusError> {
        self.touch();
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Surface { reply })
            .await
            .map_err(|_| ArgusError::SessionClosed)?;
        rx.await.map_err(|_| ArgusError::SessionClosed)?
    }

    fn close(&self) {
        let _ = self.tx.try_send(Command::Close);
    }
}

/// Live sessions by id
pub struct SessionRegistry {
    engine: Arc<ChallengeEngine>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
    ttl_secs: i64,
}

impl SessionRegistry {
    pub fn new(engine: Arc<ChallengeEngine>, ttl_secs: u64) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
            ttl_secs: i64::try_from(ttl_secs).unwrap_or(i64::MAX),
        }
    }

    /// Spawn a session and start its first round
    pub async fn create(&self, compact: bool) -> SessionView {
        let session_id = generate_session_id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);

        let mut ctrl = LifecycleController::new(
            session_id.clone(),
            DeviceClass::from_compact(compact),
            self.engine.clone(),
            events_tx,
        );
        ctrl.request_refresh();
        let view = ctrl.view();

        tokio::spawn(run_session(ctrl, rx, events_rx));

        let handle = SessionHandle {
            tx,
            last_seen: Arc::new(AtomicI64::new(chrono::Utc::now().timestamp())),
        };
        self.sessions.write().await.insert(session_id.clone(), handle);

        tracing::info!(session = %session_id, compact, "Session created");
        view
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, ArgusError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| ArgusError::SessionNotFound(session_id.to_string()))
    }

    /// Stop the session; returns false if it did not exist
    pub async fn remove(&self, session_id: &str) -> bool {
        match self.sessions.write().await.remove(session_id) {
            Some(handle) => {
                handle.close();
                tracing::info!(session = %session_id, "Session closed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle since before `now - ttl` or whose task has ended
    pub async fn sweep(&self, now: i64) -> usize {
        let cutoff = now.saturating_sub(self.ttl_secs);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();

        sessions.retain(|_, handle| {
            let keep = !handle.is_closed() && handle.last_seen() >= cutoff;
            if !keep {
                handle.close();
            }
            keep
        });

        before - sessions.len()
    }

    pub async fn close_all(&self) {
        let mut sessions = self.sessions.write().await;
        for handle in sessions.values() {
            handle.close();
        }
        sessions.clear();
    }
}

/// URL-safe random id
fn generate_session_id() -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Background worker evicting idle sessions
pub async fn session_sweeper(
    registry: Arc<SessionRegistry>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(ttl_secs = registry.ttl_secs, "Session sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                let evicted = registry.sweep(chrono::Utc::now().timestamp()).await;
                if evicted > 0 {
                    let remaining = registry.len().await;
                    tracing::info!(evicted, remaining, "Evicted idle sessions");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Session sweeper shutting down...");
                registry.close_all().await;
                break;
            }
        }
    }
}
