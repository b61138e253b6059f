use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::models::{PlaybackEvent, SyncCmd};

/// Last sync command received by a room, stamped with its arrival.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    cmd: SyncCmd,
    recorded_at: Instant,
    recorded_wall: DateTime<Utc>,
}

impl PlaybackState {
    pub fn record(cmd: SyncCmd) -> Self {
        Self::record_at(cmd, Instant::now())
    }

    pub fn record_at(cmd: SyncCmd, recorded_at: Instant) -> Self {
        Self {
            cmd,
            recorded_at,
            recorded_wall: Utc::now(),
        }
    }

    pub fn page_url(&self) -> &str {
        &self.cmd.page_url
    }

    pub fn recorded_wall(&self) -> DateTime<Utc> {
        self.recorded_wall
    }

    /// Rebuild the command as it should be applied at `now`.
    pub fn reconstruct(&self, now: Instant) -> SyncCmd {
        SyncCmd {
            current_time: effective_offset(
                &self.cmd.event,
                self.cmd.current_time,
                self.cmd.playback_rate,
                self.recorded_at,
                now,
            ),
            ..self.cmd.clone()
        }
    }
}

/// Playback offset at `now` for a state recorded at `recorded_at`.
///
/// Only a playing video advances; every other event pins the offset.
pub fn effective_offset(
    event: &PlaybackEvent,
    offset: f64,
    rate: f64,
    recorded_at: Instant,
    now: Instant,
) -> f64 {
    match event {
        PlaybackEvent::Play => {
            offset + rate * now.saturating_duration_since(recorded_at).as_secs_f64()
        }
        _ => offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cmd(event: PlaybackEvent, current_time: f64, playback_rate: f64) -> SyncCmd {
        SyncCmd {
            page_url: "https://example.com/watch".to_string(),
            event,
            current_time,
            playback_rate,
        }
    }

    #[test]
    fn play_advances_with_elapsed_time() {
        let t0 = Instant::now();
        let later = t0 + Duration::from_secs(5);

        let state = PlaybackState::record_at(cmd(PlaybackEvent::Play, 10.0, 1.0), t0);
        assert_eq!(state.reconstruct(later).current_time, 15.0);

        let state = PlaybackState::record_at(cmd(PlaybackEvent::Play, 10.0, 2.0), t0);
        assert_eq!(state.reconstruct(later).current_time, 20.0);
    }

    #[test]
    fn non_play_events_keep_recorded_offset() {
        let t0 = Instant::now();
        for event in [
            PlaybackEvent::Pause,
            PlaybackEvent::Other("seeked".to_string()),
        ] {
            let state = PlaybackState::record_at(cmd(event, 10.0, 2.0), t0);
            assert_eq!(state.reconstruct(t0 + Duration::from_secs(600)).current_time, 10.0);
        }
    }

    #[test]
    fn reconstruction_keeps_other_fields() {
        let t0 = Instant::now();
        let original = cmd(PlaybackEvent::Play, 1.0, 1.25);
        let rebuilt = PlaybackState::record_at(original.clone(), t0).reconstruct(t0);
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn read_before_record_does_not_rewind() {
        let t0 = Instant::now() + Duration::from_secs(10);
        let offset = effective_offset(&PlaybackEvent::Play, 4.0, 1.0, t0, Instant::now());
        assert_eq!(offset, 4.0);
    }
}
