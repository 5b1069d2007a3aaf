//! Playback through a natively bound library driven by push callbacks.
//!
//! The library reports position, length and stop events on its own threads.
//! [`EventSnapshot`] stores the latest values; `position()` and `duration()`
//! only read that snapshot.

use std::{path::PathBuf, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    engine::{
        capabilities::{PlaybackPosition, TransportControl},
        libvlc::LibVlc,
    },
    errors::PlayerError,
};

/// Settings of the native-binding engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeSettings {
    /// Directories searched for the library before the system loader.
    pub library_path: Vec<PathBuf>,
}

impl Default for NativeSettings {
    fn default() -> Self {
        Self {
            library_path: vec![PathBuf::from("/usr/lib")],
        }
    }
}

/// Notifications pushed by a native player.
pub trait PlaybackEvents: Send + Sync {
    /// Position as a fraction of the media length, in `0.0..=1.0`.
    fn on_position_changed(&self, fraction: f32);
    fn on_duration_changed(&self, millis: i64);
    fn on_stopped(&self);
}

/// Operations the engine needs from a native player library.
pub trait NativeBinding: Send + Sync {
    /// Registers the receiver of push notifications.
    fn attach(&self, events: Arc<dyn PlaybackEvents>) -> Result<(), PlayerError>;
    fn play_media(&self, uri: &str) -> Result<(), PlayerError>;
    fn set_pause(&self, paused: bool) -> Result<(), PlayerError>;
    fn stop(&self) -> Result<(), PlayerError>;
    fn skip(&self, offset_millis: i64) -> Result<(), PlayerError>;

    fn can_pause(&self) -> bool {
        true
    }

    /// Releases native resources. Called once on cleanup.
    fn release(&self) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct PositionSample {
    fraction: f32,
    duration_ms: Option<u64>,
    stopped: bool,
}

/// Latest pushed values, replaced as a whole on every notification.
#[derive(Debug, Default)]
pub struct EventSnapshot {
    sample: Mutex<PositionSample>,
}

impl EventSnapshot {
    fn current(&self) -> PositionSample {
        *self.sample.lock()
    }

    fn replace(&self, update: impl FnOnce(PositionSample) -> PositionSample) {
        let mut guard = self.sample.lock();
        *guard = update(*guard);
    }

    fn reset(&self) {
        *self.sample.lock() = PositionSample::default();
    }

    /// Elapsed whole seconds: `fraction × duration`.
    pub fn elapsed_seconds(&self) -> Option<u64> {
        let sample = self.current();
        let duration_ms = sample.duration_ms?;
        let fraction = f64::from(sample.fraction.clamp(0.0, 1.0));
        Some((fraction * duration_ms as f64 / 1000.0).floor() as u64)
    }

    pub fn duration_seconds(&self) -> Option<u64> {
        self.current().duration_ms.map(|ms| ms / 1000)
    }

    pub fn stopped(&self) -> bool {
        self.current().stopped
    }
}

impl PlaybackEvents for EventSnapshot {
    fn on_position_changed(&self, fraction: f32) {
        if fraction.is_finite() {
            self.replace(|s| PositionSample { fraction, ..s });
        }
    }

    fn on_duration_changed(&self, millis: i64) {
        let duration_ms = u64::try_from(millis).ok().filter(|ms| *ms > 0);
        self.replace(|s| PositionSample { duration_ms, ..s });
    }

    fn on_stopped(&self) {
        debug!("Native player stopped");
        self.replace(|s| PositionSample { stopped: true, ..s });
    }
}

#[derive(Debug, Default)]
struct NativeState {
    uri: Option<String>,
    started: bool,
    paused: bool,
}

pub struct NativeEngine {
    binding: Box<dyn NativeBinding>,
    events: Arc<EventSnapshot>,
    state: Mutex<NativeState>,
}

impl NativeEngine {
    /// Wraps a binding and subscribes to its notifications.
    pub fn new(binding: Box<dyn NativeBinding>) -> Result<Self, PlayerError> {
        let events = Arc::new(EventSnapshot::default());
        binding.attach(events.clone())?;
        Ok(Self {
            binding,
            events,
            state: Mutex::new(NativeState::default()),
        })
    }

    /// Loads libvlc from the configured search path.
    pub fn load(settings: &NativeSettings) -> Result<Self, PlayerError> {
        let library = LibVlc::open(&settings.library_path)?;
        info!(library = %library.location(), "✅ Native player library loaded");
        Self::new(Box::new(library))
    }

    pub fn supports_pause(&self) -> bool {
        self.binding.can_pause()
    }

    /// True when the library reported a stop while we were playing.
    pub fn playback_ended(&self) -> bool {
        let state = self.state.lock();
        state.started && !state.paused && self.events.stopped()
    }

    pub fn cleanup(&self) {
        if let Err(err) = self.binding.stop() {
            debug!("Ignoring stop failure during cleanup: {}", err);
        }
        self.binding.release();
        *self.state.lock() = NativeState::default();
    }
}

impl TransportControl for NativeEngine {
    fn load(&self, uri: &str) -> Result<(), PlayerError> {
        *self.state.lock() = NativeState {
            uri: Some(uri.to_string()),
            ..NativeState::default()
        };
        self.events.reset();
        Ok(())
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        let uri = state.uri.clone().ok_or(PlayerError::NoMedia)?;

        if state.started && !self.events.stopped() {
            if state.paused {
                self.binding.set_pause(false)?;
                state.paused = false;
            }
            return Ok(());
        }

        self.events.reset();
        self.binding.play_media(&uri)?;
        state.started = true;
        state.paused = false;
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if !state.started {
            return Err(PlayerError::NoMedia);
        }
        if !state.paused {
            self.binding.set_pause(true)?;
            state.paused = true;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        if state.started {
            self.binding.stop()?;
        }
        state.started = false;
        state.paused = false;
        Ok(())
    }

    fn skip(&self, offset_seconds: i64) -> Result<(), PlayerError> {
        if !self.state.lock().started {
            return Err(PlayerError::NoMedia);
        }
        self.binding.skip(offset_seconds.saturating_mul(1000))
    }
}

impl PlaybackPosition for NativeEngine {
    fn position(&self) -> Option<u64> {
        if !self.state.lock().started {
            return None;
        }
        self.events.elapsed_seconds()
    }

    fn duration(&self) -> Option<u64> {
        if !self.state.lock().started {
            return None;
        }
        self.events.duration_seconds()
    }

    fn current_uri(&self) -> Option<String> {
        self.state.lock().uri.clone()
    }
}
