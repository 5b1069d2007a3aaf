//! State carried by the renderer and the read-only views handed to the
//! UPnP toolkit.

use std::{fmt, time::SystemTime};

use serde::Serialize;

use crate::time_utils::{format_hhmmss, format_optional, NOT_IMPLEMENTED};

/// AVTransport `TransportState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransportState {
    NoMedia,
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    /// Value of the `TransportState` state variable.
    pub fn as_upnp(&self) -> &'static str {
        match self {
            TransportState::NoMedia => "NO_MEDIA_PRESENT",
            TransportState::Stopped => "STOPPED",
            TransportState::Playing => "PLAYING",
            TransportState::Paused => "PAUSED_PLAYBACK",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_upnp())
    }
}

/// Actions advertised through `CurrentTransportActions`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TransportAction {
    Play,
    Stop,
    Pause,
}

impl TransportAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportAction::Play => "Play",
            TransportAction::Stop => "Stop",
            TransportAction::Pause => "Pause",
        }
    }
}

/// Comma separated list, as carried by `CurrentTransportActions`.
pub fn format_actions(actions: &[TransportAction]) -> String {
    actions
        .iter()
        .map(TransportAction::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// The resource set by the last successful SetAVTransportURI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaItem {
    pub uri: String,
    pub metadata: String,
    pub duration_seconds: Option<u64>,
}

/// Point-in-time playback position.
///
/// Built through [`PositionSnapshot::new`], which keeps the elapsed time
/// within the duration whenever the duration is known.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    pub elapsed_seconds: Option<u64>,
    pub duration_seconds: Option<u64>,
    pub uri: Option<String>,
}

impl PositionSnapshot {
    pub fn new(elapsed: Option<u64>, duration: Option<u64>, uri: Option<String>) -> Self {
        let elapsed = match (elapsed, duration) {
            (Some(e), Some(d)) if d > 0 => Some(e.min(d)),
            (e, _) => e,
        };
        Self {
            elapsed_seconds: elapsed,
            duration_seconds: duration,
            uri,
        }
    }
}

/// A state variable change waiting for the next notifier tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub variable: String,
    pub value: String,
    pub produced_at: SystemTime,
}

impl ChangeEvent {
    pub fn new(variable: &str, value: impl Into<String>) -> Self {
        Self {
            variable: variable.to_string(),
            value: value.into(),
            produced_at: SystemTime::now(),
        }
    }
}

/// GetPositionInfo response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PositionInfo {
    pub track: u32,
    pub track_duration: String,
    pub track_meta_data: String,
    #[serde(rename = "TrackURI")]
    pub track_uri: String,
    pub rel_time: String,
    pub abs_time: String,
    pub rel_count: i32,
    pub abs_count: i32,
}

impl PositionInfo {
    pub(crate) fn from_snapshot(snapshot: &PositionSnapshot, media: Option<&MediaItem>) -> Self {
        let Some(media) = media else {
            return Self {
                track: 0,
                track_duration: format_hhmmss(0),
                track_meta_data: String::new(),
                track_uri: String::new(),
                rel_time: NOT_IMPLEMENTED.to_string(),
                abs_time: NOT_IMPLEMENTED.to_string(),
                rel_count: i32::MAX,
                abs_count: i32::MAX,
            };
        };

        Self {
            track: 1,
            track_duration: format_optional(snapshot.duration_seconds),
            track_meta_data: media.metadata.clone(),
            track_uri: snapshot.uri.clone().unwrap_or_else(|| media.uri.clone()),
            rel_time: format_optional(snapshot.elapsed_seconds),
            abs_time: NOT_IMPLEMENTED.to_string(),
            rel_count: i32::MAX,
            abs_count: i32::MAX,
        }
    }

    /// Elapsed time in seconds, when reported.
    pub fn rel_time_seconds(&self) -> Option<u64> {
        crate::time_utils::parse_upnp_duration(&self.rel_time).ok()
    }
}

/// GetMediaInfo response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaInfo {
    pub nr_tracks: u32,
    pub media_duration: String,
    #[serde(rename = "CurrentURI")]
    pub current_uri: String,
    #[serde(rename = "CurrentURIMetaData")]
    pub current_uri_meta_data: String,
    #[serde(rename = "NextURI")]
    pub next_uri: String,
    #[serde(rename = "NextURIMetaData")]
    pub next_uri_meta_data: String,
    pub play_medium: String,
    pub record_medium: String,
    pub write_status: String,
}

impl MediaInfo {
    pub(crate) fn from_media(media: Option<&MediaItem>, duration: Option<u64>) -> Self {
        let (nr_tracks, uri, metadata) = match media {
            Some(m) => (1, m.uri.clone(), m.metadata.clone()),
            None => (0, String::new(), String::new()),
        };
        Self {
            nr_tracks,
            media_duration: format_optional(duration),
            current_uri: uri,
            current_uri_meta_data: metadata,
            next_uri: String::new(),
            next_uri_meta_data: String::new(),
            play_medium: "NETWORK".to_string(),
            record_medium: NOT_IMPLEMENTED.to_string(),
            write_status: NOT_IMPLEMENTED.to_string(),
        }
    }
}

/// GetTransportInfo response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransportInfo {
    pub current_transport_state: String,
    pub current_transport_status: String,
    pub current_speed: String,
}

impl TransportInfo {
    pub(crate) fn from_state(state: TransportState) -> Self {
        Self {
            current_transport_state: state.as_upnp().to_string(),
            current_transport_status: "OK".to_string(),
            current_speed: "1".to_string(),
        }
    }
}

/// GetDeviceCapabilities response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceCapabilities {
    pub play_media: String,
    pub rec_media: String,
    pub rec_quality_modes: String,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            play_media: "NETWORK".to_string(),
            rec_media: NOT_IMPLEMENTED.to_string(),
            rec_quality_modes: NOT_IMPLEMENTED.to_string(),
        }
    }
}

/// GetTransportSettings response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransportSettings {
    pub play_mode: String,
    pub rec_quality_mode: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            play_mode: "NORMAL".to_string(),
            rec_quality_mode: NOT_IMPLEMENTED.to_string(),
        }
    }
}
