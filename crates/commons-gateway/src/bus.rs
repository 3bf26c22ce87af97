use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use commons_types::events::PushEvent;

pub type ConnectionId = Uuid;

/// The sending half of one live connection's push queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<PushEvent>,
}

impl ConnectionHandle {
    /// A fresh handle plus the receiver its connection drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PushEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Process-wide publish/subscribe addressed by group name.
///
/// Live-only: a send reaches the connections joined at that moment and is
/// never replayed to later joiners. Sends from one caller to one group are
/// delivered to each member in the order they were issued.
pub trait BroadcastBus: Send + Sync {
    fn join(&self, group: &str, handle: ConnectionHandle);

    /// Leaving a group you never joined is a no-op.
    fn leave(&self, group: &str, id: ConnectionId);

    /// Returns how many connections the event was handed to.
    fn send(&self, group: &str, event: PushEvent) -> usize;
}

pub type SharedBus = Arc<dyn BroadcastBus>;

type Members = HashMap<ConnectionId, mpsc::UnboundedSender<PushEvent>>;

/// Single-node bus: group name -> members, each group behind its own lock.
#[derive(Default)]
pub struct InMemoryBus {
    groups: RwLock<HashMap<String, Arc<Mutex<Members>>>>,
}

fn lock(members: &Mutex<Members>) -> MutexGuard<'_, Members> {
    members.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedBus {
        Arc::new(Self::new())
    }

    /// Number of connections currently joined to `group`.
    pub fn group_size(&self, group: &str) -> usize {
        let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
        groups.get(group).map_or(0, |m| lock(m).len())
    }

    pub fn group_count(&self) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl BroadcastBus for InMemoryBus {
    fn join(&self, group: &str, handle: ConnectionHandle) {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let members = groups.entry(group.to_string()).or_default();
        lock(members).insert(handle.id, handle.tx);
        trace!("{} joined group {}", handle.id, group);
    }

    fn leave(&self, group: &str, id: ConnectionId) {
        // Join and leave both hold the outer write lock, so an emptied group
        // can be dropped without racing a concurrent join.
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let Some(members) = groups.get(group) else {
            return;
        };

        let now_empty = {
            let mut members = lock(members);
            members.remove(&id);
            members.is_empty()
        };
        if now_empty {
            groups.remove(group);
        }
        trace!("{} left group {}", id, group);
    }

    fn send(&self, group: &str, event: PushEvent) -> usize {
        let members = {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            match groups.get(group) {
                Some(members) => members.clone(),
                None => {
                    debug!("No live connections in group {}, dropping {:?}", group, event.key);
                    return 0;
                }
            }
        };

        let mut members = lock(&members);
        // Receivers that hung up without leaving are pruned here.
        members.retain(|_, tx| tx.send(event.clone()).is_ok());
        members.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use commons_types::events::EventKey;

    fn event(n: usize) -> PushEvent {
        PushEvent::notification(EventKey::Notification, "alice", Some(n.to_string()), None)
    }

    #[test]
    fn send_reaches_every_member_once() {
        let bus = InMemoryBus::new();
        let (h1, mut rx1) = ConnectionHandle::new();
        let (h2, mut rx2) = ConnectionHandle::new();
        bus.join("room", h1);
        bus.join("room", h2);

        assert_eq!(bus.send("room", event(1)), 2);
        assert_eq!(rx1.try_recv().unwrap(), event(1));
        assert_eq!(rx2.try_recv().unwrap(), event(1));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn late_joiners_get_no_backlog() {
        let bus = InMemoryBus::new();
        assert_eq!(bus.send("room", event(1)), 0);

        let (h, mut rx) = ConnectionHandle::new();
        bus.join("room", h);
        assert!(rx.try_recv().is_err());

        bus.send("room", event(2));
        assert_eq!(rx.try_recv().unwrap(), event(2));
    }

    #[test]
    fn groups_are_isolated() {
        let bus = InMemoryBus::new();
        let (ha, mut rxa) = ConnectionHandle::new();
        let (hb, mut rxb) = ConnectionHandle::new();
        bus.join("alice", ha);
        bus.join("bob", hb);

        bus.send("bob", event(1));
        assert!(rxa.try_recv().is_err());
        assert_eq!(rxb.try_recv().unwrap(), event(1));
    }

    #[test]
    fn per_group_order_is_preserved() {
        let bus = InMemoryBus::new();
        let (h, mut rx) = ConnectionHandle::new();
        bus.join("room", h);

        for n in 0..100 {
            bus.send("room", event(n));
        }
        for n in 0..100 {
            assert_eq!(rx.try_recv().unwrap(), event(n));
        }
    }

    #[test]
    fn leave_is_idempotent_and_drops_empty_groups() {
        let bus = InMemoryBus::new();
        let (h, _rx) = ConnectionHandle::new();
        let id = h.id();
        bus.join("room", h);
        assert_eq!(bus.group_size("room"), 1);

        bus.leave("room", id);
        bus.leave("room", id);
        bus.leave("never-joined", id);
        assert_eq!(bus.group_size("room"), 0);
        assert_eq!(bus.group_count(), 0);
    }

    #[test]
    fn dropped_receivers_are_pruned_on_send() {
        let bus = InMemoryBus::new();
        let (h1, rx1) = ConnectionHandle::new();
        let (h2, _rx2) = ConnectionHandle::new();
        bus.join("room", h1);
        bus.join("room", h2);
        drop(rx1);

        assert_eq!(bus.send("room", event(1)), 1);
        assert_eq!(bus.group_size("room"), 1);
    }
}
