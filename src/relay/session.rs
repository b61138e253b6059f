use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::room::Room;
use super::{RelayConfig, SessionError};

/// Close code and reason written in a websocket close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseMessage {
    pub code: u16,
    pub reason: String,
}

impl CloseMessage {
    pub fn going_away(reason: impl Into<String>) -> Self {
        Self {
            code: 1001,
            reason: reason.into(),
        }
    }
}

/// A frame waiting in a session's outbound queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Written last; the write pump stops after it.
    Close(Option<CloseMessage>),
}

impl Outbound {
    fn into_message(self) -> Message {
        match self {
            Outbound::Text(text) => Message::Text(text),
            Outbound::Close(close) => Message::Close(close.map(|c| CloseFrame {
                code: c.code,
                reason: Cow::Owned(c.reason),
            })),
        }
    }
}

/// Server-side handle for one client connection.
///
/// The session knows its room only through a weak reference; membership is owned by the room
/// and lifetime by the connection.
pub struct Session {
    id: String,
    room: Weak<Room>,
    outbound: mpsc::Sender<Outbound>,
    opened: Mutex<bool>,
    done: watch::Sender<bool>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Create a session bound to `room`. The receiver is the outbound queue, to be drained by
    /// [`write_pump`].
    pub fn new(
        id: impl Into<String>,
        room: &Arc<Room>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let (done, _) = watch::channel(false);
        let session = Arc::new(Self {
            id: id.into(),
            room: Arc::downgrade(room),
            outbound,
            opened: Mutex::new(true),
            done,
        });
        (session, rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue an application message without blocking.
    ///
    /// A full queue drops the message and reports it to the room.
    pub fn send(&self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.enqueue(Outbound::Text(text.into()))
    }

    /// Queue a close frame. The connection is torn down once it has been written.
    pub fn close_with_message(&self, close: Option<CloseMessage>) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.enqueue(Outbound::Close(close))
    }

    pub fn is_closed(&self) -> bool {
        !*self.opened.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the session closed and wake both pumps. Returns false if it was already closed.
    pub fn close(&self) -> bool {
        {
            let mut opened = self.opened.lock().unwrap_or_else(PoisonError::into_inner);
            if !*opened {
                return false;
            }
            *opened = false;
        }
        self.done.send_replace(true);
        true
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        let mut done = self.done.subscribe();
        let _ = done.wait_for(|closed| *closed).await;
    }

    fn enqueue(&self, frame: Outbound) -> Result<(), SessionError> {
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let err = SessionError::SendBufferFull;
                if let Some(room) = self.room.upgrade() {
                    room.session_error(&self.id, &err);
                }
                Err(err)
            }
            Err(TrySendError::Closed(_)) => Err(SessionError::Closed),
        }
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    PeerClosed,
    SessionClosed,
    CloseWritten,
    RoomGone,
    ReadDeadline,
    WriteDeadline,
    FrameTooLarge(usize),
    ReadError(String),
    WriteError(String),
}

impl PumpExit {
    /// Orderly endings that are not worth reporting as session errors.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            PumpExit::PeerClosed | PumpExit::SessionClosed | PumpExit::CloseWritten
        )
    }
}

impl fmt::Display for PumpExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpExit::PeerClosed => write!(f, "peer closed the connection"),
            PumpExit::SessionClosed => write!(f, "session closed"),
            PumpExit::CloseWritten => write!(f, "close frame written"),
            PumpExit::RoomGone => write!(f, "room is closed"),
            PumpExit::ReadDeadline => write!(f, "read deadline exceeded"),
            PumpExit::WriteDeadline => write!(f, "write deadline exceeded"),
            PumpExit::FrameTooLarge(len) => write!(f, "frame of {len} bytes exceeds limit"),
            PumpExit::ReadError(e) => write!(f, "read error: {e}"),
            PumpExit::WriteError(e) => write!(f, "write error: {e}"),
        }
    }
}

/// Inbound direction: hand every text frame to the room until the connection fails or the
/// session is closed. The read deadline only moves forward when a pong arrives.
pub async fn read_pump<S, E>(
    session: &Session,
    room: &Room,
    mut stream: S,
    config: &RelayConfig,
) -> PumpExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let next = tokio::select! {
            _ = session.closed() => return PumpExit::SessionClosed,
            _ = time::sleep_until(deadline) => return PumpExit::ReadDeadline,
            next = stream.next() => next,
        };

        match next {
            None | Some(Ok(Message::Close(_))) => return PumpExit::PeerClosed,
            Some(Err(e)) => return PumpExit::ReadError(e.to_string()),
            Some(Ok(Message::Text(text))) => {
                if text.len() > config.max_message_size {
                    return PumpExit::FrameTooLarge(text.len());
                }
                if room.deliver(text, session.id()).is_err() {
                    return PumpExit::RoomGone;
                }
            }
            Some(Ok(Message::Pong(_))) => deadline = Instant::now() + config.pong_wait,
            Some(Ok(_)) => {}
        }
    }
}

/// Outbound direction: drain the queue in order, pinging when idle. Closes the session on exit.
pub async fn write_pump<K>(
    session: &Session,
    mut sink: K,
    mut outbound: mpsc::Receiver<Outbound>,
    config: &RelayConfig,
) -> PumpExit
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    let mut ping = time::interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;
            _ = session.closed() => break PumpExit::SessionClosed,
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break PumpExit::SessionClosed;
                };
                let is_close = matches!(frame, Outbound::Close(_));
                if let Err(exit) = write_frame(&mut sink, frame.into_message(), config.send_wait).await {
                    break exit;
                }
                if is_close {
                    break PumpExit::CloseWritten;
                }
                ping.reset();
            }
            _ = ping.tick() => {
                if let Err(exit) = write_frame(&mut sink, Message::Ping(Vec::new()), config.send_wait).await {
                    break exit;
                }
            }
        }
    };

    session.close();
    exit
}

async fn write_frame<K>(sink: &mut K, msg: Message, send_wait: Duration) -> Result<(), PumpExit>
where
    K: Sink<Message> + Unpin,
    K::Error: fmt::Display,
{
    match time::timeout(send_wait, sink.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(PumpExit::WriteError(e.to_string())),
        Err(_) => Err(PumpExit::WriteDeadline),
    }
}
