use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, RwLock};
use tokio::time;
use tracing::{debug, info, warn};

use super::room::{Room, RoomHandle};
use super::session::{CloseMessage, Outbound, Session};
use super::RelayConfig;

/// Room id → running room actor.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, RoomHandle>>,
    config: Arc<RelayConfig>,
    /// Number of entries in `rooms`
    room_count: watch::Sender<usize>,
    /// Connections whose pumps have not finished yet
    live_sessions: Arc<watch::Sender<usize>>,
}

/// Counts a connection as live until dropped.
pub struct SessionTicket {
    live_sessions: Arc<watch::Sender<usize>>,
}

impl Drop for SessionTicket {
    fn drop(&mut self) {
        self.live_sessions.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl RoomRegistry {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            rooms: RwLock::new(HashMap::new()),
            config: Arc::new(config),
            room_count: watch::channel(0).0,
            live_sessions: Arc::new(watch::channel(0).0),
        })
    }

    /// Hold the returned ticket for as long as the connection's pumps run; shutdown waits for
    /// every ticket to be dropped.
    pub fn track_session(&self) -> SessionTicket {
        self.live_sessions.send_modify(|n| *n += 1);
        SessionTicket {
            live_sessions: self.live_sessions.clone(),
        }
    }

    pub fn live_sessions(&self) -> usize {
        *self.live_sessions.borrow()
    }

    /// Register a new session `session_id` in room `room_id`.
    pub async fn join(
        self: &Arc<Self>,
        room_id: &str,
        session_id: &str,
    ) -> (RoomHandle, Arc<Session>, mpsc::Receiver<Outbound>) {
        let room = self.get_or_create(room_id).await;
        self.join_room(room, session_id).await
    }

    /// Register through `room`. If that actor terminated before it saw the registration, its
    /// entry is dropped and the session joins a fresh room under the same id.
    pub async fn join_room(
        self: &Arc<Self>,
        mut room: RoomHandle,
        session_id: &str,
    ) -> (RoomHandle, Arc<Session>, mpsc::Receiver<Outbound>) {
        loop {
            let (session, outbound) = Session::new(session_id, &room, self.config.send_buffer_size);
            match room.register(session.clone()).await {
                Ok(()) => return (room, session, outbound),
                Err(e) => {
                    debug!(room_id = room.id(), session_id, "Retrying registration: {}", e);
                    self.remove_room(&room).await;
                    let room_id = room.id().to_string();
                    room = self.get_or_create(&room_id).await;
                }
            }
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub async fn get(&self, id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(id).cloned()
    }

    /// Return the room for `id`, starting a new actor if there is none.
    pub async fn get_or_create(self: &Arc<Self>, id: &str) -> RoomHandle {
        if let Some(room) = self.rooms.read().await.get(id) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(room_id = id, "Creating room");
                Room::spawn(id.to_string(), self.config.clone(), Arc::downgrade(self))
            })
            .clone();
        self.room_count.send_replace(rooms.len());
        room
    }

    /// Drop the mapping for `id`, whatever room it points to.
    pub async fn remove(&self, id: &str) -> Option<RoomHandle> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.remove(id);
        self.room_count.send_replace(rooms.len());
        room
    }

    /// Drop the mapping only if it still points to `room`; a successor under the same id is left alone.
    pub async fn remove_room(&self, room: &Room) -> bool {
        let mut rooms = self.rooms.write().await;
        match rooms.get(room.id()) {
            Some(entry) if std::ptr::eq(Arc::as_ptr(entry), room) => {
                rooms.remove(room.id());
                self.room_count.send_replace(rooms.len());
                info!(room_id = room.id(), "Room removed from registry");
                true
            }
            _ => false,
        }
    }

    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&RoomHandle),
    {
        for room in self.rooms.read().await.values() {
            f(room);
        }
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }

    /// Ask every room to close its sessions, then wait up to `timeout` until every room has left
    /// and every tracked connection has finished its pumps.
    /// Returns false if the timeout elapsed first.
    pub async fn shutdown(&self, close: CloseMessage, timeout: Duration) -> bool {
        let mut n_rooms: usize = 0;
        self.for_each(|room| {
            n_rooms += 1;
            let _ = room.shutdown(Some(close.clone()));
        })
        .await;
        info!(n_rooms, live_sessions = self.live_sessions(), "Shutting down rooms");

        let mut rooms = self.room_count.subscribe();
        let mut sessions = self.live_sessions.subscribe();
        let drained = time::timeout(timeout, async {
            let _ = rooms.wait_for(|n| *n == 0).await;
            let _ = sessions.wait_for(|n| *n == 0).await;
        })
        .await
        .is_ok();

        if !drained {
            let remaining_rooms = self.len().await;
            warn!(
                rooms = remaining_rooms,
                live_sessions = self.live_sessions(),
                "Rooms did not drain before the shutdown timeout"
            );
        }
        drained
    }
}
