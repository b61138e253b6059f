use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope command carrying a [`SyncCmd`] payload.
pub const CMD_SYNC: &str = "sync";
/// Envelope command asking a peer to re-broadcast its current state. No payload.
pub const CMD_REQ_SYNC: &str = "reqSync";

/// Control envelope exchanged with clients in both directions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CmdMsg {
    #[serde(rename = "cmd")]
    pub command: String,
    #[serde(rename = "p", default)]
    pub payload: Option<Value>,
}

impl CmdMsg {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn sync(cmd: &SyncCmd) -> Result<Self, serde_json::Error> {
        Ok(Self {
            command: CMD_SYNC.to_string(),
            payload: Some(serde_json::to_value(cmd)?),
        })
    }

    pub fn req_sync() -> Self {
        Self {
            command: CMD_REQ_SYNC.to_string(),
            payload: None,
        }
    }

    pub fn is_sync(&self) -> bool {
        self.command == CMD_SYNC
    }

    /// Decode the payload as a sync command. A missing payload is an error.
    pub fn sync_payload(&self) -> Result<SyncCmd, serde_json::Error> {
        let payload = self.payload.clone().unwrap_or(Value::Null);
        serde_json::from_value(payload)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Playback event observed by a client.
///
/// Only `play` has meaning to the relay; anything else is carried through verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum PlaybackEvent {
    Play,
    Pause,
    Other(String),
}

impl From<String> for PlaybackEvent {
    fn from(value: String) -> Self {
        match value.as_str() {
            "play" => PlaybackEvent::Play,
            "pause" => PlaybackEvent::Pause,
            _ => PlaybackEvent::Other(value),
        }
    }
}

impl From<PlaybackEvent> for String {
    fn from(value: PlaybackEvent) -> Self {
        match value {
            PlaybackEvent::Play => "play".to_string(),
            PlaybackEvent::Pause => "pause".to_string(),
            PlaybackEvent::Other(other) => other,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncCmd {
    pub page_url: String,
    pub event: PlaybackEvent,
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub playback_rate: f64,
}
