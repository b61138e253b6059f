use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::relay::RoomSnapshot;

/// A session currently registered in a room
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct MemberResponse {
    pub id: String,
}

/// Read-only view of a room
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: String,
    /// Page URL of the last sync command, null until one has been received
    pub video_url: Option<String>,
    pub members: Vec<MemberResponse>,
    /// When the last sync command was received
    pub updated_at: Option<DateTime<Utc>>,
    /// Outbound frames dropped because a member's send buffer was full
    pub dropped_frames: u64,
}

impl From<RoomSnapshot> for RoomResponse {
    fn from(snapshot: RoomSnapshot) -> Self {
        Self {
            id: snapshot.id,
            video_url: snapshot.video_url,
            members: snapshot
                .members
                .into_iter()
                .map(|id| MemberResponse { id })
                .collect(),
            updated_at: snapshot.updated_at,
            dropped_frames: snapshot.dropped_frames,
        }
    }
}
