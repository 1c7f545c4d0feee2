use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::message::{Message, MessageBody};
use crate::pairing::PairingCodeAllocator;
use crate::storage::StorageBackend;

use super::error::{SessionError, SessionResult};
use super::types::{ClientEntry, ClientToken, RoomEvent, Session, SessionStats};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_active_sessions: i64,
    pub max_session_storage_bytes: i64,
    pub unused_grace: Duration,
    pub active_grace: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_active_sessions: -1,
            max_session_storage_bytes: -1,
            unused_grace: Duration::from_secs(60),
            active_grace: Duration::from_secs(1200),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

pub enum JoinOutcome {
    Joined {
        token: ClientToken,
        history: Vec<Message>,
        receiver: mpsc::UnboundedReceiver<RoomEvent>,
    },
    Reconnected {
        history: Vec<Message>,
        receiver: mpsc::UnboundedReceiver<RoomEvent>,
    },
}

/// Owns every live pairing session and the two-party rendezvous, quota, and
/// timed-cleanup rules around them. Sessions live entirely in memory; the
/// filesystem is touched only through [`StorageBackend`], never under the
/// per-session lock.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Mutex<Session>>>,
    channel_index: DashMap<u64, (String, ClientToken)>,
    next_channel_id: AtomicU64,
    allocator: PairingCodeAllocator,
    storage: Arc<StorageBackend>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(storage: Arc<StorageBackend>, config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            channel_index: DashMap::new(),
            next_channel_id: AtomicU64::new(1),
            allocator: PairingCodeAllocator::new(),
            storage,
            config,
        })
    }

    pub fn storage(&self) -> &StorageBackend {
        &self.storage
    }

    pub fn code_exists(&self, code: &str) -> bool {
        self.sessions.contains_key(code)
    }

    pub fn allocate_channel_id(&self) -> u64 {
        self.next_channel_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn stats(&self) -> SessionStats {
        let active = self.sessions.len() as i64;
        let max = self.config.max_active_sessions;
        let usage_percent = if max < 0 {
            0.0
        } else if max == 0 {
            100.0
        } else {
            active as f64 / max as f64 * 100.0
        };
        SessionStats {
            active,
            max,
            usage_percent,
        }
    }

    /// Allocates a fresh pairing code and an empty session. The storage tree
    /// is pre-created best-effort; a failure there is logged, not fatal, since
    /// the tree is also created lazily on first upload.
    pub async fn create_session(self: &Arc<Self>) -> SessionResult<String> {
        if self.config.max_active_sessions >= 0
            && self.sessions.len() as i64 >= self.config.max_active_sessions
        {
            return Err(SessionError::RateLimited);
        }

        let code = self
            .allocator
            .allocate(|candidate| self.sessions.contains_key(candidate))?;

        if let Err(e) = self.storage.create_session_tree(&code).await {
            warn!(code = %code, error = %e, "failed to pre-create session storage tree");
        }

        self.sessions
            .insert(code.clone(), Arc::new(Mutex::new(Session::new(code.clone()))));
        info!(code = %code, "session created");
        Ok(code)
    }

    /// Joins `code` as a brand-new participant, or — when `client_token`
    /// names an existing member of this session — reconnects it on the given
    /// `channel_id`. Either path cancels any pending cleanup timer.
    pub async fn join_session(
        self: &Arc<Self>,
        code: &str,
        client_token: Option<ClientToken>,
        channel_id: u64,
    ) -> SessionResult<JoinOutcome> {
        let session_arc = self
            .sessions
            .get(code)
            .map(|e| e.value().clone())
            .ok_or(SessionError::InvalidCode)?;

        let mut session = session_arc.lock().await;

        if let Some(token) = client_token {
            if session.clients.contains_key(&token) {
                let already_connected = session.clients.get(&token).map(|e| e.connected).unwrap_or(false);
                if !already_connected && session.connected_count() >= 2 {
                    return Err(SessionError::SessionFull);
                }
                let (tx, rx) = mpsc::unbounded_channel();
                let was_full = session.connected_count() == 2;
                if let Some(entry) = session.clients.get_mut(&token) {
                    entry.connected = true;
                    entry.channel_id = channel_id;
                }
                session.senders.insert(token, tx);
                session.cancel_cleanup();
                let history = session.history.clone();
                drop(session);

                self.channel_index.insert(channel_id, (code.to_string(), token));
                if !was_full && self.connected_count(&session_arc).await == 2 {
                    self.broadcast(&session_arc, RoomEvent::UserConnected).await;
                }
                info!(code = %code, token = %token, "client reconnected");
                return Ok(JoinOutcome::Reconnected { history, receiver: rx });
            }
        }

        if session.clients.len() >= 2 {
            return Err(SessionError::SessionFull);
        }

        let token = ClientToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        session
            .clients
            .insert(token, ClientEntry { channel_id, connected: true });
        session.senders.insert(token, tx);
        session.cancel_cleanup();
        let history = session.history.clone();
        let now_full = session.connected_count() == 2;
        drop(session);

        self.channel_index.insert(channel_id, (code.to_string(), token));
        if now_full {
            self.broadcast(&session_arc, RoomEvent::UserConnected).await;
        }
        info!(code = %code, token = %token, "client joined");
        Ok(JoinOutcome::Joined { token, history, receiver: rx })
    }

    async fn connected_count(&self, session_arc: &Arc<Mutex<Session>>) -> usize {
        session_arc.lock().await.connected_count()
    }

    async fn broadcast(&self, session_arc: &Arc<Mutex<Session>>, event: RoomEvent) {
        let session = session_arc.lock().await;
        for (token, tx) in session.senders.iter() {
            if session.clients.get(token).map(|c| c.connected).unwrap_or(false) {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Marks the channel's owning client disconnected. When it was the last
    /// connected client in the session, schedules the tiered cleanup timer;
    /// otherwise notifies the remaining peer.
    pub async fn handle_disconnect(self: &Arc<Self>, channel_id: u64) {
        let Some((_, (code, token))) = self.channel_index.remove(&channel_id) else {
            return;
        };
        let Some(session_arc) = self.sessions.get(&code).map(|e| e.value().clone()) else {
            return;
        };

        let should_schedule = {
            let mut session = session_arc.lock().await;
            if let Some(entry) = session.clients.get_mut(&token) {
                if entry.channel_id == channel_id {
                    entry.connected = false;
                    session.senders.remove(&token);
                }
            }
            session.connected_count() == 0
        };

        if should_schedule {
            self.schedule_cleanup(code.clone()).await;
        } else {
            self.broadcast(&session_arc, RoomEvent::UserDisconnected).await;
        }
        info!(code = %code, token = %token, "client disconnected");
    }

    /// Appends a message to the session's history and broadcasts it to any
    /// connected peer. Fails if `client_token` is not a connected member.
    pub async fn append_message(
        self: &Arc<Self>,
        code: &str,
        client_token: ClientToken,
        body: MessageBody,
    ) -> SessionResult<Message> {
        let session_arc = self
            .sessions
            .get(code)
            .map(|e| e.value().clone())
            .ok_or(SessionError::InvalidCode)?;

        let message = {
            let mut session = session_arc.lock().await;
            let entry = session
                .clients
                .get(&client_token)
                .ok_or(SessionError::NotMember)?;
            if !entry.connected {
                return Err(SessionError::NotConnected);
            }
            let message = Message {
                body,
                sender: client_token.to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            };
            session.history.push(message.clone());
            session.touch_activity();
            session.cancel_cleanup();
            message
        };

        self.broadcast(&session_arc, RoomEvent::MessageReceived(message.clone()))
            .await;
        Ok(message)
    }

    /// Checks whether `additional_bytes` would push the session over its
    /// storage quota. A disabled quota (`< 0`) always passes. A failure to
    /// read current usage fails open rather than denying the upload.
    pub async fn check_quota(&self, code: &str, additional_bytes: u64) -> SessionResult<()> {
        if !self.sessions.contains_key(code) {
            return Err(SessionError::InvalidCode);
        }
        let limit = self.config.max_session_storage_bytes;
        if limit < 0 {
            return Ok(());
        }

        let usage = match self.storage.session_usage(code).await {
            Ok(usage) => usage.bytes,
            Err(e) => {
                warn!(code = %code, error = %e, "quota check failed to read usage, failing open");
                return Ok(());
            }
        };

        if usage + additional_bytes > limit as u64 {
            return Err(SessionError::QuotaExceeded {
                current: usage,
                limit: limit as u64,
            });
        }
        Ok(())
    }

    /// Records that storage was written for `code`: updates the advisory
    /// in-memory accumulator and cancels the cleanup timer. The filesystem
    /// scan remains the source of truth for quota checks.
    pub async fn account_storage(self: &Arc<Self>, code: &str, added_bytes: u64) {
        let Some(session_arc) = self.sessions.get(code).map(|e| e.value().clone()) else {
            return;
        };
        let mut session = session_arc.lock().await;
        session.storage_used += added_bytes;
        session.touch_activity();
        session.cancel_cleanup();
    }

    async fn schedule_cleanup(self: &Arc<Self>, code: String) {
        let Some(session_arc) = self.sessions.get(&code).map(|e| e.value().clone()) else {
            return;
        };

        let scheduled = {
            let mut session = session_arc.lock().await;
            if session.cleanup_pending {
                None
            } else {
                session.cleanup_epoch += 1;
                session.cleanup_pending = true;
                let epoch = session.cleanup_epoch;
                let grace = if session.has_activity {
                    self.config.active_grace
                } else {
                    self.config.unused_grace
                };
                Some((epoch, grace))
            }
        };

        let Some((epoch, grace)) = scheduled else {
            return;
        };

        let manager = self.clone();
        tokio::spawn(async move {
            sleep(grace).await;
            manager.fire_cleanup(&code, epoch).await;
        });
    }

    /// Fires at the end of a cleanup grace period. Re-verifies under the
    /// session's own mutex that the epoch hasn't moved and no client has
    /// reconnected before deleting the session and its storage tree.
    async fn fire_cleanup(self: &Arc<Self>, code: &str, epoch: u64) {
        let Some(session_arc) = self.sessions.get(code).map(|e| e.value().clone()) else {
            return;
        };

        let should_delete = {
            let mut session = session_arc.lock().await;
            let matches_epoch = session.cleanup_epoch == epoch;
            if matches_epoch {
                session.cleanup_pending = false;
            }
            matches_epoch && session.connected_count() == 0
        };

        if should_delete {
            self.sessions.remove(code);
            if let Err(e) = self.storage.delete_session_tree(code).await {
                warn!(code = %code, error = %e, "failed to delete session storage tree on cleanup");
            }
            info!(code = %code, "session cleaned up");
        }
    }

    /// Spawns the periodic sweeper: re-applies the tiered grace rule to any
    /// empty session without a pending timer, then asks storage to remove
    /// orphaned directories left behind by a crash or a missed cleanup.
    pub async fn run_sweeper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        loop {
            interval.tick().await;
            self.sweep_once().await;
        }
    }

    async fn sweep_once(self: &Arc<Self>) {
        let codes: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for code in &codes {
            let Some(session_arc) = self.sessions.get(code).map(|e| e.value().clone()) else {
                continue;
            };
            let needs_schedule = {
                let session = session_arc.lock().await;
                session.connected_count() == 0 && !session.cleanup_pending
            };
            if needs_schedule {
                self.schedule_cleanup(code.clone()).await;
            }
        }

        let live: HashSet<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        if let Err(e) = self.storage.sweep_orphans(&live).await {
            warn!(error = %e, "orphan storage sweep failed");
        }
    }
}
