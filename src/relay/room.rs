use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::models::CmdMsg;

use super::playback::PlaybackState;
use super::registry::RoomRegistry;
use super::session::{CloseMessage, Session};
use super::{RelayConfig, RoomClosed, SessionError};

pub type RoomHandle = Arc<Room>;

/// Point-in-time view of a room, produced by its actor.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSnapshot {
    pub id: String,
    pub video_url: Option<String>,
    /// Member session ids, sorted
    pub members: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub dropped_frames: u64,
}

enum RoomOp {
    Register {
        session: Arc<Session>,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        session_id: String,
    },
    Deliver {
        raw: String,
        sender_id: String,
    },
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Shutdown {
        close: Option<CloseMessage>,
    },
}

/// Handle to a running room actor. Every operation is queued and applied in arrival order.
pub struct Room {
    id: String,
    ops: mpsc::UnboundedSender<RoomOp>,
    dropped_frames: AtomicU64,
}

impl Room {
    /// Start the actor for `id`. It removes itself from `registry` when it terminates.
    pub(crate) fn spawn(
        id: String,
        config: Arc<RelayConfig>,
        registry: Weak<RoomRegistry>,
    ) -> RoomHandle {
        let (ops, rx) = mpsc::unbounded_channel();
        let room = Arc::new(Room {
            id,
            ops,
            dropped_frames: AtomicU64::new(0),
        });
        let actor = RoomActor {
            room: room.clone(),
            registry,
            config,
            ops: rx,
            members: HashMap::new(),
            last_sync: None,
        };
        tokio::spawn(actor.run());
        room
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add `session` and send it the current state (or a sync request when there is none).
    /// Resolves once the actor has applied the registration.
    pub async fn register(&self, session: Arc<Session>) -> Result<(), RoomClosed> {
        let (ack, done) = oneshot::channel();
        self.send_op(RoomOp::Register { session, ack })?;
        done.await.map_err(|_| RoomClosed)
    }

    pub fn unregister(&self, session_id: &str) -> Result<(), RoomClosed> {
        self.send_op(RoomOp::Unregister {
            session_id: session_id.to_string(),
        })
    }

    /// Hand a raw client message to the room for caching and fan-out.
    pub fn deliver(&self, raw: String, sender_id: &str) -> Result<(), RoomClosed> {
        self.send_op(RoomOp::Deliver {
            raw,
            sender_id: sender_id.to_string(),
        })
    }

    /// Close every member and stop the actor.
    pub fn shutdown(&self, close: Option<CloseMessage>) -> Result<(), RoomClosed> {
        self.send_op(RoomOp::Shutdown { close })
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, RoomClosed> {
        let (reply, rx) = oneshot::channel();
        self.send_op(RoomOp::Snapshot { reply })?;
        rx.await.map_err(|_| RoomClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.ops.is_closed()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Non-fatal send failure reported by a member session.
    pub fn session_error(&self, session_id: &str, err: &SessionError) {
        if *err == SessionError::SendBufferFull {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            warn!(room_id = %self.id, session_id, "Dropping frame: {}", err);
        } else {
            info!(room_id = %self.id, session_id, error = %err, "Session error");
        }
    }

    fn send_op(&self, op: RoomOp) -> Result<(), RoomClosed> {
        self.ops.send(op).map_err(|_| RoomClosed)
    }
}

enum Flow {
    Continue,
    /// A fresh sync was cached; the idle refresh starts over.
    Synced,
    Stop,
}

struct RoomActor {
    room: RoomHandle,
    registry: Weak<RoomRegistry>,
    config: Arc<RelayConfig>,
    ops: mpsc::UnboundedReceiver<RoomOp>,
    members: HashMap<String, Arc<Session>>,
    last_sync: Option<PlaybackState>,
}

impl RoomActor {
    async fn run(mut self) {
        let period = self.config.sync_interval;
        let mut refresh = time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                op = self.ops.recv() => {
                    let Some(op) = op else { break };
                    match self.apply(op) {
                        Flow::Continue => {}
                        Flow::Synced => refresh.reset(),
                        Flow::Stop => break,
                    }
                }
                _ = refresh.tick() => self.request_sync_from_one(),
            }
        }

        // Leave the registry before the queue is dropped, so a failed registration always finds
        // the id free when it retries.
        if let Some(registry) = self.registry.upgrade() {
            registry.remove_room(&self.room).await;
        }
        info!(room_id = %self.room.id, "Room closed");
    }

    fn apply(&mut self, op: RoomOp) -> Flow {
        match op {
            RoomOp::Register { session, ack } => self.register(session, ack),
            RoomOp::Unregister { session_id } => self.unregister(&session_id),
            RoomOp::Deliver { raw, sender_id } => {
                if self.deliver(raw, &sender_id) {
                    Flow::Synced
                } else {
                    Flow::Continue
                }
            }
            RoomOp::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                Flow::Continue
            }
            RoomOp::Shutdown { close } => {
                self.shutdown(close);
                Flow::Stop
            }
        }
    }

    fn register(&mut self, session: Arc<Session>, ack: oneshot::Sender<()>) -> Flow {
        let session_id = session.id().to_string();
        self.members.insert(session_id.clone(), session.clone());
        debug!(room_id = %self.room.id, session_id = %session_id, members = self.members.len(), "Session registered");

        let greeting = match &self.last_sync {
            Some(state) => CmdMsg::sync(&state.reconstruct(Instant::now())),
            None => Ok(CmdMsg::req_sync()),
        };
        match greeting.and_then(|cmd| cmd.to_json()) {
            Ok(json) => {
                if let Err(e) = session.send(json) {
                    debug!(room_id = %self.room.id, session_id = %session_id, error = %e, "Failed to greet session");
                }
            }
            Err(e) => error!(room_id = %self.room.id, "Failed to encode greeting: {}", e),
        }

        if ack.send(()).is_err() {
            // The connection went away while waiting for us.
            return self.unregister(&session_id);
        }
        Flow::Continue
    }

    fn unregister(&mut self, session_id: &str) -> Flow {
        if self.members.remove(session_id).is_none() {
            return Flow::Continue;
        }
        debug!(room_id = %self.room.id, session_id, members = self.members.len(), "Session unregistered");
        if self.members.is_empty() {
            info!(room_id = %self.room.id, "Room is empty");
            return Flow::Stop;
        }
        Flow::Continue
    }

    /// Returns true when the message was a valid sync command.
    fn deliver(&mut self, raw: String, sender_id: &str) -> bool {
        debug!(room_id = %self.room.id, session_id = sender_id, msg = %raw, "Handle message");
        let cmd = match CmdMsg::parse(&raw) {
            Ok(cmd) => cmd,
            Err(e) => {
                debug!(room_id = %self.room.id, session_id = sender_id, "Ignoring malformed message: {}", e);
                return false;
            }
        };

        let is_sync = cmd.is_sync();
        if is_sync {
            match cmd.sync_payload() {
                Ok(sync) => self.last_sync = Some(PlaybackState::record(sync)),
                Err(e) => {
                    debug!(room_id = %self.room.id, session_id = sender_id, "Ignoring malformed sync command: {}", e);
                    return false;
                }
            }
        }

        self.broadcast_others(&raw, sender_id);
        is_sync
    }

    fn broadcast_others(&self, raw: &str, sender_id: &str) {
        for (id, session) in &self.members {
            if id != sender_id {
                // Overflow is reported by the session itself.
                let _ = session.send(raw);
            }
        }
    }

    /// Ask a single member to re-report; its answer is trusted as is.
    fn request_sync_from_one(&self) {
        let Some(session) = self.members.values().next() else {
            return;
        };
        match CmdMsg::req_sync().to_json() {
            Ok(json) => {
                debug!(room_id = %self.room.id, session_id = session.id(), "Requesting periodic sync");
                let _ = session.send(json);
            }
            Err(e) => error!(room_id = %self.room.id, "Failed to encode sync request: {}", e),
        }
    }

    fn shutdown(&mut self, close: Option<CloseMessage>) {
        info!(room_id = %self.room.id, members = self.members.len(), "Shutting down room");
        for session in self.members.values() {
            if let Err(e) = session.close_with_message(close.clone()) {
                // No room for the close frame; tear the connection down without it.
                debug!(room_id = %self.room.id, session_id = session.id(), error = %e, "Closing session without close frame");
                session.close();
            }
        }
        self.members.clear();
    }

    fn snapshot(&self) -> RoomSnapshot {
        let mut members: Vec<String> = self.members.keys().cloned().collect();
        members.sort();
        RoomSnapshot {
            id: self.room.id.clone(),
            video_url: self.last_sync.as_ref().map(|s| s.page_url().to_string()),
            members,
            updated_at: self.last_sync.as_ref().map(PlaybackState::recorded_wall),
            dropped_frames: self.room.dropped_frames(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlaybackEvent, SyncCmd, CMD_REQ_SYNC};
    use crate::relay::session::Outbound;
    use std::time::Duration;

    fn sync_json(event: &str, current_time: f64, playback_rate: f64) -> String {
        serde_json::json!({
            "cmd": "sync",
            "p": {
                "pageUrl": "https://video.example/watch?v=1",
                "event": event,
                "currentTime": current_time,
                "playbackRate": playback_rate,
            }
        })
        .to_string()
    }

    async fn join(
        room: &RoomHandle,
        id: &str,
    ) -> (Arc<Session>, mpsc::Receiver<Outbound>) {
        let (session, rx) = Session::new(id, room, 16);
        room.register(session.clone()).await.unwrap();
        (session, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn text(frame: &Outbound) -> &str {
        match frame {
            Outbound::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn first_joiner_gets_exactly_one_sync_request() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, mut rx) = join(&room, "a").await;

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        let cmd = CmdMsg::parse(text(&frames[0])).unwrap();
        assert_eq!(cmd.command, CMD_REQ_SYNC);
    }

    #[tokio::test]
    async fn deliver_skips_sender_and_reaches_everyone_else() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, mut rx_a) = join(&room, "a").await;
        let (b, mut rx_b) = join(&room, "b").await;
        let (_c, mut rx_c) = join(&room, "c").await;
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        let raw = sync_json("pause", 42.0, 1.0);
        room.deliver(raw.clone(), "a").unwrap();
        room.snapshot().await.unwrap();

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![Outbound::Text(raw.clone())]);
        assert_eq!(drain(&mut rx_c), vec![Outbound::Text(raw)]);
    }

    #[tokio::test]
    async fn non_sync_commands_are_forwarded_without_touching_cache() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, _rx_a) = join(&room, "a").await;
        let (b, mut rx_b) = join(&room, "b").await;
        drain(&mut rx_b);

        let raw = r#"{"cmd":"reqSync","p":null}"#.to_string();
        room.deliver(raw.clone(), "a").unwrap();
        let snapshot = room.snapshot().await.unwrap();

        assert_eq!(drain(&mut rx_b), vec![Outbound::Text(raw)]);
        assert_eq!(snapshot.video_url, None);
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, _rx_a) = join(&room, "a").await;
        let (b, mut rx_b) = join(&room, "b").await;

        room.deliver(sync_json("play", 10.0, 1.0), "a").unwrap();
        room.snapshot().await.unwrap();
        drain(&mut rx_b);

        room.deliver("{not json".to_string(), "a").unwrap();
        room.deliver(r#"{"cmd":"sync","p":{"pageUrl":"other"}}"#.to_string(), "a").unwrap();
        let snapshot = room.snapshot().await.unwrap();

        assert!(drain(&mut rx_b).is_empty());
        assert_eq!(
            snapshot.video_url.as_deref(),
            Some("https://video.example/watch?v=1")
        );
    }

    #[tokio::test]
    async fn sync_without_offsets_is_cached_and_forwarded() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, _rx_a) = join(&room, "a").await;
        let (_b, mut rx_b) = join(&room, "b").await;
        drain(&mut rx_b);

        let raw = r#"{"cmd":"sync","p":{"pageUrl":"https://video.example/2","event":"pause"}}"#.to_string();
        room.deliver(raw.clone(), "a").unwrap();
        let snapshot = room.snapshot().await.unwrap();

        assert_eq!(drain(&mut rx_b), vec![Outbound::Text(raw)]);
        assert_eq!(snapshot.video_url.as_deref(), Some("https://video.example/2"));

        let (_c, mut rx_c) = join(&room, "c").await;
        let frames = drain(&mut rx_c);
        let sync = CmdMsg::parse(text(&frames[0])).unwrap().sync_payload().unwrap();
        assert_eq!(sync.event, PlaybackEvent::Pause);
        assert_eq!(sync.current_time, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_gets_time_compensated_sync() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, _rx_a) = join(&room, "a").await;

        room.deliver(sync_json("play", 10.0, 2.0), "a").unwrap();
        room.snapshot().await.unwrap();
        time::advance(Duration::from_secs(5)).await;

        let (b, mut rx_b) = join(&room, "b").await;
        let frames = drain(&mut rx_b);
        assert_eq!(frames.len(), 1);

        let cmd = CmdMsg::parse(text(&frames[0])).unwrap();
        let sync: SyncCmd = cmd.sync_payload().unwrap();
        assert_eq!(sync.event, PlaybackEvent::Play);
        assert!((sync.current_time - 20.0).abs() < 1e-9, "got {}", sync.current_time);
        assert_eq!(sync.playback_rate, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_joiner_to_paused_room_gets_recorded_offset() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, _rx_a) = join(&room, "a").await;

        room.deliver(sync_json("pause", 10.0, 1.0), "a").unwrap();
        room.snapshot().await.unwrap();
        time::advance(Duration::from_secs(30)).await;

        let (b, mut rx_b) = join(&room, "b").await;
        let frames = drain(&mut rx_b);
        let sync = CmdMsg::parse(text(&frames[0])).unwrap().sync_payload().unwrap();
        assert_eq!(sync.current_time, 10.0);
    }

    #[tokio::test]
    async fn membership_tracks_registrations() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, _rx_a) = join(&room, "a").await;
        let (_b, _rx_b) = join(&room, "b").await;
        let (_c, _rx_c) = join(&room, "c").await;

        room.unregister("b").unwrap();
        room.unregister("unknown").unwrap();
        let snapshot = room.snapshot().await.unwrap();
        assert_eq!(snapshot.members, vec!["a".to_string(), "c".to_string()]);

        room.unregister("b").unwrap();
        assert_eq!(room.snapshot().await.unwrap().members.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_refresh_asks_exactly_one_member() {
        let config = RelayConfig::default();
        let registry = RoomRegistry::new(config.clone());
        let room = registry.get_or_create("r1").await;
        let (_a, mut rx_a) = join(&room, "a").await;
        let (b, mut rx_b) = join(&room, "b").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        time::sleep(config.sync_interval + Duration::from_millis(10)).await;
        room.snapshot().await.unwrap();

        let asked = drain(&mut rx_a).len() + drain(&mut rx_b).len();
        assert_eq!(asked, 1);
    }

    #[tokio::test]
    async fn shutdown_closes_every_member_and_stops() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (_a, mut rx_a) = join(&room, "a").await;
        let (b, mut rx_b) = join(&room, "b").await;
        drain(&mut rx_a);
        drain(&mut rx_b);

        let close = CloseMessage::going_away("Server is shutting down");
        room.shutdown(Some(close.clone())).unwrap();

        assert_eq!(rx_a.recv().await, Some(Outbound::Close(Some(close.clone()))));
        assert_eq!(rx_b.recv().await, Some(Outbound::Close(Some(close))));
        assert_eq!(room.snapshot().await, Err(RoomClosed));
        assert!(room.is_closed());
    }

    #[tokio::test]
    async fn shutdown_tears_down_member_with_full_queue() {
        let registry = RoomRegistry::new(RelayConfig::default());
        let room = registry.get_or_create("r1").await;
        let (full, _rx_full) = Session::new("full", &room, 1);
        room.register(full.clone()).await.unwrap();
        let (b, mut rx_b) = join(&room, "b").await;
        drain(&mut rx_b);

        // The greeting already fills the single slot.
        assert_eq!(full.send("more"), Err(SessionError::SendBufferFull));

        room.shutdown(Some(CloseMessage::going_away("bye"))).unwrap();
        assert_eq!(room.snapshot().await, Err(RoomClosed));

        assert!(full.is_closed());
        assert!(!b.is_closed());
        assert_eq!(rx_b.recv().await, Some(Outbound::Close(Some(CloseMessage::going_away("bye")))));
    }
}
