//! Backend playback engines.
//!
//! [`PlaybackEngine`] is a closed set of variants; adding a backend means
//! adding a variant and handling it in every `match` below.

pub mod capabilities;
pub mod daemon;
pub mod libvlc;
pub mod mpd_client;
pub mod native;
pub mod process;

use std::{fmt, str::FromStr};

use tracing::info;

use crate::errors::{PlayerError, RendererError};

pub use capabilities::{PlaybackPosition, TransportControl};
pub use daemon::{DaemonEngine, DaemonSettings};
pub use native::{NativeBinding, NativeEngine, NativeSettings, PlaybackEvents};
pub use process::{ProcessEngine, ProcessSettings};

/// Engine selector read from `renderer.engine`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// MPlayer child process in slave mode.
    Process,
    /// libvlc loaded at runtime.
    Native,
    /// Remote MPD server.
    Daemon,
}

impl EngineKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Process => "mplayer",
            EngineKind::Native => "vlc",
            EngineKind::Daemon => "mpd",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EngineKind {
    type Err = RendererError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mplayer" | "process" => Ok(EngineKind::Process),
            "vlc" | "vlcj" | "libvlc" | "native" => Ok(EngineKind::Native),
            "mpd" | "daemon" => Ok(EngineKind::Daemon),
            _ => Err(RendererError::UnknownEngineType(s.to_string())),
        }
    }
}

/// Everything needed to build any of the engines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub kind: EngineKind,
    pub process: ProcessSettings,
    pub native: NativeSettings,
    pub daemon: DaemonSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: EngineKind::Process,
            process: ProcessSettings::default(),
            native: NativeSettings::default(),
            daemon: DaemonSettings::default(),
        }
    }
}

pub enum PlaybackEngine {
    Process(ProcessEngine),
    Native(NativeEngine),
    Daemon(DaemonEngine),
}

impl PlaybackEngine {
    /// Builds the engine selected by `settings.kind`.
    pub fn build(settings: &EngineSettings) -> Result<Self, PlayerError> {
        info!(engine = %settings.kind, "Building playback engine");
        match settings.kind {
            EngineKind::Process => Ok(PlaybackEngine::Process(ProcessEngine::spawn(
                &settings.process,
            )?)),
            EngineKind::Native => Ok(PlaybackEngine::Native(NativeEngine::load(&settings.native)?)),
            EngineKind::Daemon => Ok(PlaybackEngine::Daemon(DaemonEngine::new(&settings.daemon))),
        }
    }

    pub fn kind(&self) -> EngineKind {
        match self {
            PlaybackEngine::Process(_) => EngineKind::Process,
            PlaybackEngine::Native(_) => EngineKind::Native,
            PlaybackEngine::Daemon(_) => EngineKind::Daemon,
        }
    }

    pub fn supports_pause(&self) -> bool {
        match self {
            PlaybackEngine::Process(_) | PlaybackEngine::Daemon(_) => true,
            PlaybackEngine::Native(e) => e.supports_pause(),
        }
    }

    /// True when the media finished without a Stop action.
    pub fn playback_ended(&self) -> bool {
        match self {
            PlaybackEngine::Process(e) => e.playback_ended(),
            PlaybackEngine::Native(e) => e.playback_ended(),
            PlaybackEngine::Daemon(e) => e.playback_ended(),
        }
    }

    /// Releases the backend: kills the child, unloads the player or closes
    /// the connection.
    pub fn cleanup(&self) {
        info!(engine = %self.kind(), "Cleaning up playback engine");
        match self {
            PlaybackEngine::Process(e) => e.cleanup(),
            PlaybackEngine::Native(e) => e.cleanup(),
            PlaybackEngine::Daemon(e) => e.cleanup(),
        }
    }
}

impl TransportControl for PlaybackEngine {
    fn load(&self, uri: &str) -> Result<(), PlayerError> {
        match self {
            PlaybackEngine::Process(e) => e.load(uri),
            PlaybackEngine::Native(e) => e.load(uri),
            PlaybackEngine::Daemon(e) => e.load(uri),
        }
    }

    fn play(&self) -> Result<(), PlayerError> {
        match self {
            PlaybackEngine::Process(e) => e.play(),
            PlaybackEngine::Native(e) => e.play(),
            PlaybackEngine::Daemon(e) => e.play(),
        }
    }

    fn pause(&self) -> Result<(), PlayerError> {
        if !self.supports_pause() {
            return Err(PlayerError::unsupported("pause", self.kind().name()));
        }
        match self {
            PlaybackEngine::Process(e) => e.pause(),
            PlaybackEngine::Native(e) => e.pause(),
            PlaybackEngine::Daemon(e) => e.pause(),
        }
    }

    fn stop(&self) -> Result<(), PlayerError> {
        match self {
            PlaybackEngine::Process(e) => e.stop(),
            PlaybackEngine::Native(e) => e.stop(),
            PlaybackEngine::Daemon(e) => e.stop(),
        }
    }

    fn skip(&self, offset_seconds: i64) -> Result<(), PlayerError> {
        match self {
            PlaybackEngine::Process(e) => e.skip(offset_seconds),
            PlaybackEngine::Native(e) => e.skip(offset_seconds),
            PlaybackEngine::Daemon(e) => e.skip(offset_seconds),
        }
    }
}

impl PlaybackPosition for PlaybackEngine {
    fn position(&self) -> Option<u64> {
        match self {
            PlaybackEngine::Process(e) => e.position(),
            PlaybackEngine::Native(e) => e.position(),
            PlaybackEngine::Daemon(e) => e.position(),
        }
    }

    fn duration(&self) -> Option<u64> {
        match self {
            PlaybackEngine::Process(e) => e.duration(),
            PlaybackEngine::Native(e) => e.duration(),
            PlaybackEngine::Daemon(e) => e.duration(),
        }
    }

    fn current_uri(&self) -> Option<String> {
        match self {
            PlaybackEngine::Process(e) => e.current_uri(),
            PlaybackEngine::Native(e) => e.current_uri(),
            PlaybackEngine::Daemon(e) => e.current_uri(),
        }
    }
}
