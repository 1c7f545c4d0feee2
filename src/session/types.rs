use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::message::Message;

/// Opaque per-connection identity handed to a client on join; presented back
/// on every subsequent request so the server can tell a reconnect from a new
/// participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ClientToken(Uuid);

impl ClientToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ClientToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ClientToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[derive(Debug, Clone)]
pub struct ClientEntry {
    pub channel_id: u64,
    pub connected: bool,
}

/// Events a session fans out to its connected clients' transport handlers.
/// Deliberately decoupled from the wire format: the event channel gateway
/// translates these into whatever JSON shape it sends over the socket.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    UserConnected,
    UserDisconnected,
    MessageReceived(Message),
}

/// A pairing session shared by up to two participants. Owned behind a
/// per-session `tokio::sync::Mutex` in [`super::manager::SessionManager`] so
/// filesystem work for uploads never happens while this lock is held.
pub struct Session {
    pub code: String,
    pub created_at: i64,
    pub last_activity_at: i64,
    pub has_activity: bool,
    pub storage_used: u64,
    pub clients: HashMap<ClientToken, ClientEntry>,
    pub history: Vec<Message>,
    pub(crate) senders: HashMap<ClientToken, mpsc::UnboundedSender<RoomEvent>>,
    pub(crate) cleanup_epoch: u64,
    pub(crate) cleanup_pending: bool,
}

impl Session {
    pub fn new(code: String) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            code,
            created_at: now,
            last_activity_at: now,
            has_activity: false,
            storage_used: 0,
            clients: HashMap::new(),
            history: Vec::new(),
            senders: HashMap::new(),
            cleanup_epoch: 0,
            cleanup_pending: false,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.clients.values().filter(|c| c.connected).count()
    }

    pub fn touch_activity(&mut self) {
        self.last_activity_at = chrono::Utc::now().timestamp_millis();
        self.has_activity = true;
    }

    /// Cancels any outstanding cleanup timer: a stale firing will see a
    /// mismatched epoch and no-op.
    pub fn cancel_cleanup(&mut self) {
        self.cleanup_epoch += 1;
        self.cleanup_pending = false;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active: i64,
    pub max: i64,
    pub usage_percent: f64,
}
