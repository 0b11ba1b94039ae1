use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Handle held in the registry, used to queue text frames onto a session's
/// control channel. The connection task owning the socket drains the queue.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    /// Channel sender for delivering frames to the connection task.
    pub tx: mpsc::Sender<String>,
}

impl ControlHandle {
    /// Wrap a delivery queue sender.
    #[must_use]
    pub const fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }
}

/// One campus entry. Retained after its connection closes.
#[derive(Debug)]
struct Session {
    control: ControlHandle,
    epoch: u64,
    last_liveness: DateTime<Utc>,
    liveness_addr: Option<SocketAddr>,
    active: bool,
}

/// Outcome of [`SessionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The campus is now active. `epoch` identifies this session for
    /// [`SessionRegistry::deactivate`].
    Registered {
        /// Registration sequence number.
        epoch: u64,
    },
    /// Another session for the campus is still active; nothing changed.
    AlreadyActive,
}

/// Outcome of [`SessionRegistry::update_liveness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessUpdate {
    /// The entry's timestamp and address were updated.
    Applied,
    /// No entry exists for the campus.
    UnknownSession,
}

/// Operator view of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Campus name.
    pub campus: String,
    /// Whether the campus currently holds an open, authenticated connection.
    pub active: bool,
    /// Registration time or most recent heartbeat, whichever is later.
    pub last_liveness: DateTime<Utc>,
    /// Broadcast return address learned from heartbeats.
    pub liveness_addr: Option<SocketAddr>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    next_epoch: u64,
}

/// Campus name → session directory.
///
/// Every operation takes the same mutex for a short, non-blocking section.
/// Nothing here awaits or performs I/O while the lock is held.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `campus` active with the given control handle.
    ///
    /// Check-and-insert happens under one lock, so two concurrent
    /// registrations for the same campus cannot both succeed. A retained
    /// inactive entry is reused; its liveness address is cleared until the
    /// new session sends a heartbeat.
    pub fn register(&self, campus: &str, control: ControlHandle) -> Registration {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        inner.next_epoch += 1;
        let epoch = inner.next_epoch;

        if let Some(session) = inner.sessions.get_mut(campus) {
            if session.active {
                return Registration::AlreadyActive;
            }
            session.control = control;
            session.epoch = epoch;
            session.last_liveness = now;
            session.liveness_addr = None;
            session.active = true;
        } else {
            inner.sessions.insert(
                campus.to_string(),
                Session {
                    control,
                    epoch,
                    last_liveness: now,
                    liveness_addr: None,
                    active: true,
                },
            );
        }
        Registration::Registered { epoch }
    }

    /// Mark the session registered under `epoch` inactive.
    ///
    /// A stale epoch (the campus has since re-registered) is ignored.
    pub fn deactivate(&self, campus: &str, epoch: u64) {
        let mut inner = self.inner.lock();
        if let Some(session) = inner.sessions.get_mut(campus) {
            if session.epoch == epoch {
                session.active = false;
            }
        }
    }

    /// Look up the control handle of an active session.
    ///
    /// Inactive and unknown campuses are indistinguishable here.
    #[must_use]
    pub fn lookup_active(&self, campus: &str) -> Option<ControlHandle> {
        let inner = self.inner.lock();
        inner
            .sessions
            .get(campus)
            .filter(|s| s.active)
            .map(|s| s.control.clone())
    }

    /// Record a heartbeat. Never changes whether the session is active.
    pub fn update_liveness(
        &self,
        campus: &str,
        addr: SocketAddr,
        at: DateTime<Utc>,
    ) -> LivenessUpdate {
        let mut inner = self.inner.lock();
        match inner.sessions.get_mut(campus) {
            Some(session) => {
                session.last_liveness = at;
                session.liveness_addr = Some(addr);
                LivenessUpdate::Applied
            }
            None => LivenessUpdate::UnknownSession,
        }
    }

    /// Active sessions that have a known broadcast address.
    #[must_use]
    pub fn snapshot_active_with_address(&self) -> Vec<(String, SocketAddr)> {
        let inner = self.inner.lock();
        inner
            .sessions
            .iter()
            .filter(|(_, s)| s.active)
            .filter_map(|(name, s)| s.liveness_addr.map(|addr| (name.clone(), addr)))
            .collect()
    }

    /// Every retained entry, sorted by campus name.
    #[must_use]
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut out: Vec<SessionSummary> = {
            let inner = self.inner.lock();
            inner
                .sessions
                .iter()
                .map(|(name, s)| SessionSummary {
                    campus: name.clone(),
                    active: s.active,
                    last_liveness: s.last_liveness,
                    liveness_addr: s.liveness_addr,
                })
                .collect()
        };
        out.sort_by(|a, b| a.campus.cmp(&b.campus));
        out
    }

    /// Number of active sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner
            .lock()
            .sessions
            .values()
            .filter(|s| s.active)
            .count()
    }
}
