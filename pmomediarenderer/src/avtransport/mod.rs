//! # AVTransport Service - Contrôle de transport du renderer
//!
//! Ce module implémente la machine d'états AVTransport du renderer :
//!
//! ```text
//! NO_MEDIA_PRESENT ──SetAVTransportURI──▶ STOPPED ──Play──▶ PLAYING ◀──Play── PAUSED_PLAYBACK
//!                                            ▲                 │  └──Pause──────────▲
//!                                            └──────Stop───────┴─────────Stop───────┘
//! ```
//!
//! ## Actions
//!
//! - ✅ SetAVTransportURI, Play, Pause, Stop
//! - ✅ GetPositionInfo, GetMediaInfo, GetTransportInfo, GetDeviceCapabilities,
//!   GetTransportSettings, GetCurrentTransportActions
//! - ❌ Seek, Record, Next, Previous, SetNextAVTransportURI, SetPlayMode,
//!   SetRecordQualityMode : toujours refusées avec `InvalidAction`
//!
//! ## Atomicité
//!
//! Une action réussit entièrement (état + événements mis à jour) ou échoue
//! sans rien modifier. Les validations (URI, schéma, accessibilité) ont lieu
//! avant la prise du verrou ; l'état n'est muté qu'après le dernier appel
//! faillible au moteur.
//!
//! ## Verrouillage
//!
//! Toutes les actions et le notifier passent par un unique mutex, acquis
//! avec un délai borné. Au-delà, l'action échoue avec `TransportLocked`.

use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    didl::res_duration_seconds,
    engine::{PlaybackEngine, PlaybackPosition, TransportControl},
    errors::RendererError,
    factory::EngineFactory,
    lastchange::{ChangeAccumulator, AVTRANSPORT_NAMESPACE},
    model::{
        format_actions, ChangeEvent, DeviceCapabilities, MediaInfo, MediaItem, PositionInfo,
        PositionSnapshot, TransportAction, TransportInfo, TransportSettings, TransportState,
    },
    notifier::EventedService,
    probe::ReachabilityProbe,
    time_utils::format_optional,
};

pub const SERVICE_NAME: &str = "AVTransport";
pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:AVTransport:1";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);

/// Point-in-time copy of the transport state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub media: Option<MediaItem>,
    pub position: PositionSnapshot,
    pub allowed_actions: Vec<TransportAction>,
}

struct TransportInner {
    state: TransportState,
    media: Option<MediaItem>,
    engine: Option<Arc<PlaybackEngine>>,
    allowed: Vec<TransportAction>,
    position: PositionSnapshot,
    changes: ChangeAccumulator,
}

impl TransportInner {
    fn engine(&self) -> Result<Arc<PlaybackEngine>, RendererError> {
        self.engine.clone().ok_or_else(|| {
            RendererError::invalid_action_state("No player created, set the media URI first")
        })
    }

    fn transition(&mut self, state: TransportState, allowed: Vec<TransportAction>) {
        self.state = state;
        self.allowed = allowed;
        self.changes.record("TransportState", state.as_upnp());
        self.changes
            .record("CurrentTransportActions", format_actions(&self.allowed));
    }
}

/// The AVTransport action contract on top of a [`PlaybackEngine`].
pub struct TransportController {
    factory: Arc<EngineFactory>,
    probe: Arc<dyn ReachabilityProbe>,
    schemes: Vec<String>,
    lock_timeout: Duration,
    inner: Mutex<TransportInner>,
}

impl TransportController {
    pub fn new(
        factory: Arc<EngineFactory>,
        probe: Arc<dyn ReachabilityProbe>,
        schemes: Vec<String>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            probe,
            schemes: schemes.into_iter().map(|s| s.to_ascii_lowercase()).collect(),
            lock_timeout,
            inner: Mutex::new(TransportInner {
                state: TransportState::NoMedia,
                media: None,
                engine: None,
                allowed: Vec::new(),
                position: PositionSnapshot::default(),
                changes: ChangeAccumulator::new(),
            }),
        }
    }

    pub fn factory(&self) -> &Arc<EngineFactory> {
        &self.factory
    }

    fn lock(&self) -> Result<MutexGuard<'_, TransportInner>, RendererError> {
        self.inner.try_lock_for(self.lock_timeout).ok_or_else(|| {
            warn!(timeout = ?self.lock_timeout, "AVTransport lock not acquired");
            RendererError::TransportLocked(self.lock_timeout)
        })
    }

    fn validate_uri(&self, uri: &str) -> Result<(), RendererError> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(RendererError::argument("CurrentURI can not be empty"));
        }

        let url = Url::parse(trimmed).map_err(|e| {
            RendererError::ArgumentError(format!("CurrentURI is malformed ({}): {}", e, trimmed))
        })?;

        if !self.schemes.iter().any(|s| s == url.scheme()) {
            return Err(RendererError::UnsupportedProtocol(format!(
                "'{}' is not a network stream (accepted schemes: {})",
                trimmed,
                self.schemes.join(", ")
            )));
        }

        self.probe
            .probe(&url)
            .map_err(|reason| RendererError::ReadError(format!("{}: {}", trimmed, reason)))
    }

    /// SetAVTransportURI.
    pub fn set_transport_uri(&self, uri: &str, metadata: &str) -> Result<(), RendererError> {
        self.validate_uri(uri)?;
        let uri = uri.trim().to_string();
        let duration = res_duration_seconds(metadata);

        let mut inner = self.lock()?;
        let engine = self.factory.engine()?;

        if inner.engine.is_some() {
            if let Err(err) = engine.stop() {
                warn!("Stopping previous media failed: {}", err);
            }
        }
        engine.load(&uri).map_err(RendererError::PlayerError)?;

        info!(uri = %uri, engine = %engine.kind(), "🎵 New transport URI");

        inner.media = Some(MediaItem {
            uri: uri.clone(),
            metadata: metadata.to_string(),
            duration_seconds: duration,
        });
        inner.engine = Some(engine);
        inner.position = PositionSnapshot::new(None, duration, Some(uri.clone()));
        inner.transition(TransportState::Stopped, vec![TransportAction::Play]);
        inner.changes.record("AVTransportURI", uri.as_str());
        inner.changes.record("AVTransportURIMetaData", metadata);
        inner.changes.record("CurrentTrackURI", uri.as_str());
        inner.changes.record("NumberOfTracks", "1");
        inner
            .changes
            .record("CurrentMediaDuration", format_optional(duration));
        Ok(())
    }

    /// Play. The speed argument is accepted but only normal speed exists.
    pub fn play(&self, speed: &str) -> Result<(), RendererError> {
        let mut inner = self.lock()?;
        let engine = inner.engine()?;

        if speed.trim() != "1" {
            debug!(speed, "Ignoring play speed");
        }
        engine
            .play()
            .map_err(|e| RendererError::action_failed("Play", e))?;

        let mut allowed = vec![TransportAction::Stop];
        if engine.supports_pause() {
            allowed.push(TransportAction::Pause);
        }
        inner.transition(TransportState::Playing, allowed);
        info!(engine = %engine.kind(), "▶️ Playing");
        Ok(())
    }

    pub fn pause(&self) -> Result<(), RendererError> {
        let mut inner = self.lock()?;
        let engine = inner.engine()?;

        if !engine.supports_pause() {
            return Err(RendererError::invalid_action("Pause"));
        }
        if inner.state != TransportState::Playing {
            return Err(RendererError::InvalidActionState(format!(
                "Cannot pause while {}",
                inner.state
            )));
        }
        engine
            .pause()
            .map_err(|e| RendererError::action_failed("Pause", e))?;

        inner.transition(
            TransportState::Paused,
            vec![TransportAction::Stop, TransportAction::Play],
        );
        info!("⏸️ Paused");
        Ok(())
    }

    pub fn stop(&self) -> Result<(), RendererError> {
        let mut inner = self.lock()?;
        let engine = inner.engine()?;

        engine
            .stop()
            .map_err(|e| RendererError::action_failed("Stop", e))?;

        let duration = inner.position.duration_seconds;
        let uri = inner.position.uri.clone();
        inner.position = PositionSnapshot::new(None, duration, uri);
        inner.transition(TransportState::Stopped, vec![TransportAction::Play]);
        info!("⏹️ Stopped");
        Ok(())
    }

    /// GetPositionInfo. Asks the engine for fresh values while a media is
    /// active and keeps the result as the cached snapshot.
    pub fn get_position_info(&self) -> Result<PositionInfo, RendererError> {
        let mut inner = self.lock()?;
        let Some(media) = inner.media.clone() else {
            return Ok(PositionInfo::from_snapshot(&PositionSnapshot::default(), None));
        };

        let snapshot = match (&inner.engine, inner.state) {
            (Some(engine), TransportState::Playing | TransportState::Paused) => {
                let elapsed = engine.position().or(inner.position.elapsed_seconds);
                let duration = engine
                    .duration()
                    .or(media.duration_seconds)
                    .or(inner.position.duration_seconds);
                PositionSnapshot::new(elapsed, duration, Some(media.uri.clone()))
            }
            _ => PositionSnapshot::new(
                Some(0),
                inner.position.duration_seconds.or(media.duration_seconds),
                Some(media.uri.clone()),
            ),
        };

        inner.position = snapshot.clone();
        Ok(PositionInfo::from_snapshot(&snapshot, Some(&media)))
    }

    pub fn get_media_info(&self) -> Result<MediaInfo, RendererError> {
        let inner = self.lock()?;
        let duration = inner
            .media
            .as_ref()
            .and_then(|m| m.duration_seconds)
            .or(inner.position.duration_seconds);
        Ok(MediaInfo::from_media(inner.media.as_ref(), duration))
    }

    pub fn get_transport_info(&self) -> Result<TransportInfo, RendererError> {
        let inner = self.lock()?;
        Ok(TransportInfo::from_state(inner.state))
    }

    pub fn get_device_capabilities(&self) -> DeviceCapabilities {
        DeviceCapabilities::default()
    }

    pub fn get_transport_settings(&self) -> TransportSettings {
        TransportSettings::default()
    }

    /// GetCurrentTransportActions, as the comma separated wire value.
    pub fn get_current_transport_actions(&self) -> Result<String, RendererError> {
        let inner = self.lock()?;
        Ok(format_actions(&inner.allowed))
    }

    pub fn state(&self) -> Result<TransportState, RendererError> {
        Ok(self.lock()?.state)
    }

    pub fn snapshot(&self) -> Result<TransportSnapshot, RendererError> {
        let inner = self.lock()?;
        Ok(TransportSnapshot {
            state: inner.state,
            media: inner.media.clone(),
            position: inner.position.clone(),
            allowed_actions: inner.allowed.clone(),
        })
    }

    pub fn seek(&self, unit: &str, target: &str) -> Result<(), RendererError> {
        debug!(unit, target, "Seek requested");
        Err(RendererError::invalid_action("Seek"))
    }

    pub fn record(&self) -> Result<(), RendererError> {
        Err(RendererError::invalid_action("Record"))
    }

    pub fn next(&self) -> Result<(), RendererError> {
        Err(RendererError::invalid_action("Next"))
    }

    pub fn previous(&self) -> Result<(), RendererError> {
        Err(RendererError::invalid_action("Previous"))
    }

    pub fn set_next_transport_uri(&self, uri: &str, _metadata: &str) -> Result<(), RendererError> {
        debug!(uri, "SetNextAVTransportURI requested");
        Err(RendererError::invalid_action("SetNextAVTransportURI"))
    }

    pub fn set_play_mode(&self, mode: &str) -> Result<(), RendererError> {
        debug!(mode, "SetPlayMode requested");
        Err(RendererError::invalid_action("SetPlayMode"))
    }

    pub fn set_record_quality_mode(&self, mode: &str) -> Result<(), RendererError> {
        debug!(mode, "SetRecordQualityMode requested");
        Err(RendererError::invalid_action("SetRecordQualityMode"))
    }

    /// Moves PLAYING to STOPPED when the engine finished the media on its own.
    ///
    /// Returns whether the state changed.
    pub fn reconcile(&self) -> Result<bool, RendererError> {
        let mut inner = self.lock()?;
        Ok(Self::reconcile_locked(&mut inner))
    }

    fn reconcile_locked(inner: &mut TransportInner) -> bool {
        let ended = match (&inner.engine, inner.state) {
            (Some(engine), TransportState::Playing) => engine.playback_ended(),
            _ => false,
        };
        if ended {
            info!("End of media reached");
            let duration = inner.position.duration_seconds;
            let uri = inner.position.uri.clone();
            inner.position = PositionSnapshot::new(None, duration, uri);
            inner.transition(TransportState::Stopped, vec![TransportAction::Play]);
        }
        ended
    }

    /// Stops playback and releases the engine.
    pub fn shutdown(&self) {
        match self.lock() {
            Ok(mut inner) => {
                if let Some(engine) = inner.engine.take() {
                    if let Err(err) = engine.stop() {
                        warn!("Stop during shutdown failed: {}", err);
                    }
                }
                inner.state = TransportState::NoMedia;
                inner.media = None;
                inner.allowed.clear();
            }
            Err(err) => warn!("Shutting down without the transport lock: {}", err),
        }
        self.factory.cleanup();
    }
}

impl EventedService for TransportController {
    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn lastchange_namespace(&self) -> &str {
        AVTRANSPORT_NAMESPACE
    }

    fn drain_events(&self) -> Result<Vec<ChangeEvent>, RendererError> {
        let mut inner = self.lock()?;
        Self::reconcile_locked(&mut inner);
        Ok(inner.changes.drain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineSettings;

    fn controller(schemes: &[&str]) -> TransportController {
        let probe: Arc<dyn ReachabilityProbe> = Arc::new(|_: &Url| Ok::<(), String>(()));
        TransportController::new(
            Arc::new(EngineFactory::new(EngineSettings::default())),
            probe,
            schemes.iter().map(|s| s.to_string()).collect(),
            DEFAULT_LOCK_TIMEOUT,
        )
    }

    #[test]
    fn test_uri_validation_order() {
        let c = controller(&["http", "https"]);
        assert!(matches!(
            c.set_transport_uri("", "meta"),
            Err(RendererError::ArgumentError(_))
        ));
        assert!(matches!(
            c.set_transport_uri("not a uri", "meta"),
            Err(RendererError::ArgumentError(_))
        ));
        assert!(matches!(
            c.set_transport_uri("file:///music/a.mp3", "meta"),
            Err(RendererError::UnsupportedProtocol(_))
        ));
        // nothing was built for rejected URIs
        assert_eq!(c.factory().instantiations(), 0);
        assert_eq!(c.state().unwrap(), TransportState::NoMedia);
    }

    #[test]
    fn test_scheme_match_is_case_insensitive() {
        let c = controller(&["HTTP"]);
        // passes validation, then fails building the default mplayer engine
        // or succeeds if one is installed; either way it is not a protocol error
        let result = c.set_transport_uri("http://host/a.mp3", "meta");
        assert!(!matches!(result, Err(RendererError::UnsupportedProtocol(_))));
        c.shutdown();
    }

    #[test]
    fn test_actions_without_engine() {
        let c = controller(&["http"]);
        assert!(matches!(c.play("1"), Err(RendererError::InvalidActionState(_))));
        assert!(matches!(c.pause(), Err(RendererError::InvalidActionState(_))));
        assert!(matches!(c.stop(), Err(RendererError::InvalidActionState(_))));
        assert_eq!(c.state().unwrap(), TransportState::NoMedia);
        assert_eq!(c.get_current_transport_actions().unwrap(), "");
        assert!(c.drain_events().unwrap().is_empty());
    }

    #[test]
    fn test_lock_timeout() {
        let c = Arc::new(TransportController::new(
            Arc::new(EngineFactory::new(EngineSettings::default())),
            Arc::new(|_: &Url| Ok::<(), String>(())),
            vec!["http".into()],
            Duration::from_millis(50),
        ));
        let guard = c.inner.lock();
        assert!(matches!(
            c.get_transport_info(),
            Err(RendererError::TransportLocked(_))
        ));
        drop(guard);
        assert!(c.get_transport_info().is_ok());
    }
}
