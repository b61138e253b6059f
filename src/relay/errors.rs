/// Failure of a send attempted on a session.
///
/// Neither variant is fatal to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    Closed,
    SendBufferFull,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Closed => write!(f, "session is already closed"),
            SessionError::SendBufferFull => write!(f, "session send buffer is full"),
        }
    }
}

impl std::error::Error for SessionError {}

/// The room actor has terminated and accepts no further operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomClosed;

impl std::fmt::Display for RoomClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "room is closed")
    }
}

impl std::error::Error for RoomClosed {}
