use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    engine::{EngineKind, EngineSettings, PlaybackEngine},
    errors::RendererError,
};

/// Builds the configured engine once and hands out the cached instance.
///
/// Child processes and daemon connections are too costly to recreate for
/// every track: a new SetAVTransportURI only changes the media target of the
/// cached engine.
pub struct EngineFactory {
    settings: EngineSettings,
    cached: Mutex<Option<Arc<PlaybackEngine>>>,
    instantiations: AtomicUsize,
}

impl EngineFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            settings,
            cached: Mutex::new(None),
            instantiations: AtomicUsize::new(0),
        }
    }

    /// Factory serving a prebuilt engine.
    pub fn with_engine(engine: PlaybackEngine) -> Self {
        let settings = EngineSettings {
            kind: engine.kind(),
            ..EngineSettings::default()
        };
        Self {
            settings,
            cached: Mutex::new(Some(Arc::new(engine))),
            instantiations: AtomicUsize::new(0),
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.settings.kind
    }

    /// The cached engine, built on first call.
    ///
    /// A construction failure is reported as `PlayerError` and nothing is
    /// cached, so a later call tries again.
    pub fn engine(&self) -> Result<Arc<PlaybackEngine>, RendererError> {
        let mut cached = self.cached.lock();
        if let Some(engine) = cached.as_ref() {
            debug!(engine = %engine.kind(), "Reusing cached playback engine");
            return Ok(engine.clone());
        }

        let engine = Arc::new(PlaybackEngine::build(&self.settings).map_err(RendererError::PlayerError)?);
        self.instantiations.fetch_add(1, Ordering::SeqCst);
        info!(engine = %engine.kind(), "✅ Playback engine ready");
        *cached = Some(engine.clone());
        Ok(engine)
    }

    /// Number of engines actually constructed by this factory.
    pub fn instantiations(&self) -> usize {
        self.instantiations.load(Ordering::SeqCst)
    }

    pub fn is_built(&self) -> bool {
        self.cached.lock().is_some()
    }

    /// Tears the cached engine down. The next `engine()` call builds a new one.
    pub fn cleanup(&self) {
        if let Some(engine) = self.cached.lock().take() {
            engine.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::{DaemonSettings, ProcessSettings};

    #[test]
    fn test_engine_is_built_once() {
        let factory = EngineFactory::new(EngineSettings {
            kind: EngineKind::Daemon,
            daemon: DaemonSettings {
                host: "127.0.0.1".into(),
                port: 1,
                timeout: Duration::from_millis(100),
            },
            ..EngineSettings::default()
        });
        assert!(!factory.is_built());

        let first = factory.engine().unwrap();
        let second = factory.engine().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.instantiations(), 1);

        factory.cleanup();
        assert!(!factory.is_built());
        factory.engine().unwrap();
        assert_eq!(factory.instantiations(), 2);
    }

    #[test]
    fn test_construction_failure_is_player_error() {
        let factory = EngineFactory::new(EngineSettings {
            kind: EngineKind::Process,
            process: ProcessSettings {
                path: "/nonexistent/player".into(),
                args: vec![],
                query_timeout: Duration::from_millis(100),
            },
            ..EngineSettings::default()
        });

        assert!(matches!(factory.engine(), Err(RendererError::PlayerError(_))));
        assert_eq!(factory.instantiations(), 0);
        assert!(!factory.is_built());
    }
}
