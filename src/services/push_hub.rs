use crate::models::actor::{ActorInfo, ActorRole};
use crate::models::notification::Notification;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Frames the server pushes to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    ConnectionEstablished { connection_id: Uuid },
    Pong,
    Notification { notification: Notification },
    NotificationsList { notifications: Vec<Notification> },
    UnreadCount { count: i64 },
    Broadcast { message: String, level: String },
}

/// Frames subscribers may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Ping,
    GetNotifications {
        #[serde(default)]
        unread_only: bool,
        limit: Option<i64>,
    },
    MarkRead {
        id: Uuid,
    },
    GetUnreadCount,
}

struct ConnEntry {
    actor_id: Uuid,
    role: ActorRole,
    tx: mpsc::Sender<ServerFrame>,
    last_ping: Instant,
}

#[derive(Default)]
struct HubInner {
    conns: HashMap<Uuid, ConnEntry>,
    by_actor: HashMap<Uuid, HashSet<Uuid>>,
    by_role: HashMap<ActorRole, HashSet<Uuid>>,
    /// admin/HR connections eligible for operator broadcasts
    broadcast_group: HashSet<Uuid>,
}

/// In-memory registry of live push subscribers. Nothing here is durable;
/// clients recover missed frames by re-reading the notifications table.
#[derive(Clone)]
pub struct PushHub {
    inner: Arc<RwLock<HubInner>>,
    send_buffer: usize,
    heartbeat_interval: Duration,
}

impl PushHub {
    pub fn new(send_buffer: usize, heartbeat_interval: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HubInner::default())),
            send_buffer,
            heartbeat_interval,
        }
    }

    /// Registers a live connection for `actor` and returns the connection id
    /// together with the frame receiver the transport task drains.
    pub fn register(&self, actor: &ActorInfo) -> (Uuid, mpsc::Receiver<ServerFrame>) {
        let (tx, rx) = mpsc::channel(self.send_buffer);
        let conn_id = Uuid::new_v4();

        let mut inner = self.inner.write().expect("push hub lock poisoned");
        inner.conns.insert(
            conn_id,
            ConnEntry {
                actor_id: actor.id,
                role: actor.role,
                tx,
                last_ping: Instant::now(),
            },
        );
        inner.by_actor.entry(actor.id).or_default().insert(conn_id);
        inner.by_role.entry(actor.role).or_default().insert(conn_id);
        if matches!(actor.role, ActorRole::Admin | ActorRole::Hr) {
            inner.broadcast_group.insert(conn_id);
        }
        tracing::debug!(%conn_id, actor = %actor.id, total = inner.conns.len(), "push subscriber registered");
        (conn_id, rx)
    }

    pub fn unregister(&self, conn_id: Uuid) {
        let mut inner = self.inner.write().expect("push hub lock poisoned");
        remove_conn(&mut inner, conn_id);
    }

    pub fn heartbeat(&self, conn_id: Uuid) {
        let mut inner = self.inner.write().expect("push hub lock poisoned");
        if let Some(entry) = inner.conns.get_mut(&conn_id) {
            entry.last_ping = Instant::now();
        }
    }

    /// Pushes a freshly materialised notification to every live connection of
    /// its recipient. Subscribers whose send buffer is full are disconnected;
    /// they re-sync from the durable table on reconnect.
    pub fn deliver(&self, notification: &Notification) {
        let mut inner = self.inner.write().expect("push hub lock poisoned");
        let Some(conn_ids) = inner.by_actor.get(&notification.recipient_id).cloned() else {
            return;
        };
        let frame = ServerFrame::Notification {
            notification: notification.clone(),
        };
        let mut overflowed = Vec::new();
        for conn_id in conn_ids {
            if let Some(entry) = inner.conns.get(&conn_id) {
                if entry.tx.try_send(frame.clone()).is_err() {
                    overflowed.push(conn_id);
                }
            }
        }
        for conn_id in overflowed {
            tracing::warn!(%conn_id, "push send buffer overflow, dropping subscriber");
            remove_conn(&mut inner, conn_id);
        }
    }

    /// Sends an operator broadcast to the given role groups, or to the
    /// admin/HR broadcast group when no roles are given.
    pub fn broadcast(&self, message: &str, level: &str, roles: Option<&[ActorRole]>) {
        let mut inner = self.inner.write().expect("push hub lock poisoned");
        let targets: HashSet<Uuid> = match roles {
            Some(roles) => roles
                .iter()
                .filter_map(|r| inner.by_role.get(r))
                .flatten()
                .copied()
                .collect(),
            None => inner.broadcast_group.iter().copied().collect(),
        };
        let frame = ServerFrame::Broadcast {
            message: message.to_string(),
            level: level.to_string(),
        };
        let mut overflowed = Vec::new();
        for conn_id in targets {
            if let Some(entry) = inner.conns.get(&conn_id) {
                if entry.tx.try_send(frame.clone()).is_err() {
                    overflowed.push(conn_id);
                }
            }
        }
        for conn_id in overflowed {
            remove_conn(&mut inner, conn_id);
        }
    }

    /// Queues a frame for one specific connection (protocol replies). Returns
    /// false when the connection is gone or its buffer overflowed.
    pub fn send_to(&self, conn_id: Uuid, frame: ServerFrame) -> bool {
        let mut inner = self.inner.write().expect("push hub lock poisoned");
        let Some(entry) = inner.conns.get(&conn_id) else {
            return false;
        };
        if entry.tx.try_send(frame).is_err() {
            tracing::warn!(%conn_id, "push send buffer overflow, dropping subscriber");
            remove_conn(&mut inner, conn_id);
            return false;
        }
        true
    }

    /// Drops connections silent for longer than twice the heartbeat interval.
    pub fn reap_stale(&self) -> usize {
        let cutoff = self.heartbeat_interval * 2;
        let mut inner = self.inner.write().expect("push hub lock poisoned");
        let stale: Vec<Uuid> = inner
            .conns
            .iter()
            .filter(|(_, entry)| entry.last_ping.elapsed() > cutoff)
            .map(|(id, _)| *id)
            .collect();
        let count = stale.len();
        for conn_id in stale {
            tracing::info!(%conn_id, "reaping silent push subscriber");
            remove_conn(&mut inner, conn_id);
        }
        count
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn connection_count(&self) -> usize {
        self.inner.read().expect("push hub lock poisoned").conns.len()
    }
}

fn remove_conn(inner: &mut HubInner, conn_id: Uuid) {
    let Some(entry) = inner.conns.remove(&conn_id) else {
        return;
    };
    if let Some(set) = inner.by_actor.get_mut(&entry.actor_id) {
        set.remove(&conn_id);
        if set.is_empty() {
            inner.by_actor.remove(&entry.actor_id);
        }
    }
    if let Some(set) = inner.by_role.get_mut(&entry.role) {
        set.remove(&conn_id);
        if set.is_empty() {
            inner.by_role.remove(&entry.role);
        }
    }
    inner.broadcast_group.remove(&conn_id);
}
