use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, trace, warn};
use uuid::Uuid;

use commons_types::events::PushEvent;
use commons_types::models::Channel;

use crate::bus::{ConnectionHandle, ConnectionId, SharedBus};

/// Who is on the other end of a socket, as established at upgrade time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub username: String,
}

/// Admits authenticated sockets and wires them into bus groups.
#[derive(Clone)]
pub struct Gateway {
    bus: SharedBus,
}

impl Gateway {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    /// Admit a connection on `channel`.
    ///
    /// Returns `None` for anonymous callers, who must be closed without any
    /// group join. Otherwise the group join has already happened when this
    /// returns, so every later send to that group reaches the session.
    pub fn connect(&self, identity: Option<Identity>, channel: Channel) -> Option<Session> {
        let Some(identity) = identity else {
            warn!("Rejecting unauthenticated {:?} socket", channel);
            return None;
        };

        let (handle, rx) = ConnectionHandle::new();
        let id = handle.id();
        let group = channel.group_for(&identity.username);
        self.bus.join(&group, handle);

        info!(
            "{} ({}) connected to {:?} gateway as {}",
            identity.username, identity.user_id, channel, id
        );

        Some(Session {
            id,
            identity,
            channel,
            groups: vec![group],
            rx,
            bus: self.bus.clone(),
        })
    }
}

/// One admitted connection. Leaves its groups on disconnect or drop.
pub struct Session {
    id: ConnectionId,
    identity: Identity,
    channel: Channel,
    groups: Vec<String>,
    rx: mpsc::UnboundedReceiver<PushEvent>,
    bus: SharedBus,
}

impl Session {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// The socket is push-only: inbound text is echoed straight back to the
    /// sender as a JSON string and never routed anywhere else.
    pub fn receive(&self, text: &str) -> String {
        trace!("{} echo ({} bytes)", self.identity.username, text.len());
        serde_json::Value::String(text.to_owned()).to_string()
    }

    /// Next event delivered by the bus, or `None` once the bus side is gone.
    pub async fn next_push(&mut self) -> Option<PushEvent> {
        self.rx.recv().await
    }

    /// Leave every joined group. Safe to call more than once.
    pub fn disconnect(&mut self, code: Option<u16>) {
        if self.groups.is_empty() {
            return;
        }
        for group in self.groups.drain(..) {
            self.bus.leave(&group, self.id);
        }
        info!(
            "{} ({}) disconnected from {:?} gateway (code {:?})",
            self.identity.username, self.identity.user_id, self.channel, code
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect(None);
    }
}

/// Drive one WebSocket until either side goes away.
///
/// `session` is `None` when the upgrade carried no valid identity; the
/// socket is then closed before anything else is written.
pub async fn serve(socket: WebSocket, session: Option<Session>, heartbeat_interval: Duration) {
    let Some(mut session) = session else {
        let mut socket = socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let (mut sender, mut receiver) = socket.split();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<String>();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_recv = pong_received.clone();

    // Read frames from client; text goes back through the session.
    let username = session.identity().username.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut close_code = None;
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if inbound_tx.send(text.as_str().to_owned()).is_err() {
                        break;
                    }
                }
                Message::Pong(_) => {
                    pong_received.store(true, Ordering::Release);
                }
                Message::Close(frame) => {
                    close_code = frame.map(|f| f.code);
                    break;
                }
                _ => {
                    trace!("{} sent a non-text frame, ignoring", username);
                }
            }
        }
        close_code
    });

    let mut heartbeat = tokio::time::interval(heartbeat_interval);
    heartbeat.tick().await;
    let mut missed_heartbeats: u8 = 0;

    let close_code = loop {
        tokio::select! {
            push = session.next_push() => {
                let Some(event) = push else { break None };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to encode push event: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break None;
                }
            }
            inbound = inbound_rx.recv() => {
                let Some(text) = inbound else { break None };
                let reply = session.receive(&text);
                if sender.send(Message::Text(reply.into())).await.is_err() {
                    break None;
                }
            }
            code = &mut recv_task => {
                break code.ok().flatten();
            }
            _ = heartbeat.tick() => {
                if pong_flag_recv.swap(false, Ordering::Acquire) {
                    missed_heartbeats = 0;
                } else {
                    missed_heartbeats += 1;
                    if missed_heartbeats >= 2 {
                        warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                        break None;
                    }
                }
                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break None;
                }
            }
        }
    };

    recv_task.abort();
    session.disconnect(close_code);
}
