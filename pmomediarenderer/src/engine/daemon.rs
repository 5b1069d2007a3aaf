//! Playback delegated to a remote Music Player Daemon.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{
    engine::{
        capabilities::{PlaybackPosition, TransportControl},
        mpd_client::{quote, MpdClient, MpdStatus, DEFAULT_TIMEOUT_SECS, MPD_DEFAULT_PORT},
    },
    errors::PlayerError,
};

/// Settings of the daemon-client engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DaemonSettings {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: MPD_DEFAULT_PORT,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Default)]
struct DaemonMedia {
    uri: Option<String>,
    started: bool,
    paused: bool,
    last_status: Option<MpdStatus>,
}

struct DaemonInner {
    client: MpdClient,
    media: DaemonMedia,
}

pub struct DaemonEngine {
    inner: Mutex<DaemonInner>,
}

impl DaemonEngine {
    /// Creates the engine. Nothing is opened until the first command.
    pub fn new(settings: &DaemonSettings) -> Self {
        Self {
            inner: Mutex::new(DaemonInner {
                client: MpdClient::new(&settings.host, settings.port, settings.timeout),
                media: DaemonMedia::default(),
            }),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().client.is_connected()
    }

    /// True when the last status read showed the daemon stopped on its own.
    pub fn playback_ended(&self) -> bool {
        let inner = self.inner.lock();
        inner.media.started
            && !inner.media.paused
            && inner
                .media
                .last_status
                .as_ref()
                .is_some_and(MpdStatus::is_stopped)
    }

    /// Disconnects from the daemon, tolerating an already closed connection.
    pub fn cleanup(&self) {
        let mut inner = self.inner.lock();
        if inner.media.started {
            if let Err(err) = inner.client.command("stop") {
                debug!("Ignoring stop failure during cleanup: {}", err);
            }
        }
        inner.client.close();
        inner.media = DaemonMedia::default();
    }

    fn status(&self) -> Option<MpdStatus> {
        let mut inner = self.inner.lock();
        if !inner.media.started {
            return None;
        }
        match inner.client.command("status") {
            Ok(pairs) => {
                let status = MpdStatus::from_pairs(&pairs);
                inner.media.last_status = Some(status.clone());
                Some(status)
            }
            Err(err) => {
                warn!("Cannot read MPD status: {}", err);
                inner.media.last_status.clone()
            }
        }
    }
}

impl TransportControl for DaemonEngine {
    fn load(&self, uri: &str) -> Result<(), PlayerError> {
        self.inner.lock().media = DaemonMedia {
            uri: Some(uri.to_string()),
            ..DaemonMedia::default()
        };
        Ok(())
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        let uri = inner.media.uri.clone().ok_or(PlayerError::NoMedia)?;

        let ended = inner
            .media
            .last_status
            .as_ref()
            .is_some_and(MpdStatus::is_stopped);
        if inner.media.started && !ended {
            if inner.media.paused {
                inner.client.command("pause 0")?;
                inner.media.paused = false;
            }
            return Ok(());
        }

        inner.client.command("clear")?;
        inner.client.command(&format!("add {}", quote(&uri)))?;
        inner.client.command("play")?;
        inner.media.started = true;
        inner.media.paused = false;
        inner.media.last_status = None;
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        if !inner.media.started {
            return Err(PlayerError::NoMedia);
        }
        if !inner.media.paused {
            inner.client.command("pause 1")?;
            inner.media.paused = true;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        if inner.media.started {
            inner.client.command("stop")?;
        }
        inner.media.started = false;
        inner.media.paused = false;
        Ok(())
    }

    fn skip(&self, offset_seconds: i64) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        if !inner.media.started {
            return Err(PlayerError::NoMedia);
        }
        inner
            .client
            .command(&format!("seekcur {:+}", offset_seconds))
            .map(|_| ())
    }
}

impl PlaybackPosition for DaemonEngine {
    fn position(&self) -> Option<u64> {
        self.status()?.elapsed.map(|s| s.max(0.0).floor() as u64)
    }

    fn duration(&self) -> Option<u64> {
        self.status()?.duration.map(|s| s.max(0.0).floor() as u64)
    }

    fn current_uri(&self) -> Option<String> {
        self.inner.lock().media.uri.clone()
    }
}
