use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use pmomediarenderer::{
    EngineFactory, EventedService, PlaybackEngine, PlayerError, RendererError, TransportController,
    TransportState,
    engine::{NativeBinding, NativeEngine, PlaybackEvents},
};
use url::Url;

/// Scripted native player: records calls and fails the operation named in
/// `fail_on`.
#[derive(Default)]
struct Script {
    calls: Mutex<Vec<String>>,
    fail_on: Mutex<Option<&'static str>>,
    events: Mutex<Option<Arc<dyn PlaybackEvents>>>,
    no_pause: bool,
}

impl Script {
    fn check(&self, operation: &'static str, call: String) -> Result<(), PlayerError> {
        if *self.fail_on.lock() == Some(operation) {
            return Err(PlayerError::Native(format!("{} refused", operation)));
        }
        self.calls.lock().push(call);
        Ok(())
    }

    fn events(&self) -> Arc<dyn PlaybackEvents> {
        self.events.lock().clone().unwrap()
    }
}

struct ScriptedBinding(Arc<Script>);

impl NativeBinding for ScriptedBinding {
    fn attach(&self, events: Arc<dyn PlaybackEvents>) -> Result<(), PlayerError> {
        *self.0.events.lock() = Some(events);
        Ok(())
    }

    fn play_media(&self, uri: &str) -> Result<(), PlayerError> {
        self.0.check("play", format!("play {}", uri))
    }

    fn set_pause(&self, paused: bool) -> Result<(), PlayerError> {
        self.0.check("pause", format!("pause {}", paused))
    }

    fn stop(&self) -> Result<(), PlayerError> {
        self.0.check("stop", "stop".to_string())
    }

    fn skip(&self, offset_millis: i64) -> Result<(), PlayerError> {
        self.0.check("skip", format!("skip {}", offset_millis))
    }

    fn can_pause(&self) -> bool {
        !self.0.no_pause
    }
}

fn controller_with(script: Arc<Script>) -> TransportController {
    let engine = NativeEngine::new(Box::new(ScriptedBinding(script))).unwrap();
    let factory = Arc::new(EngineFactory::with_engine(PlaybackEngine::Native(engine)));
    let probe: Arc<dyn pmomediarenderer::ReachabilityProbe> =
        Arc::new(|_: &Url| Ok::<(), String>(()));
    TransportController::new(
        factory,
        probe,
        vec!["http".to_string(), "https".to_string()],
        Duration::from_millis(200),
    )
}

fn controller() -> (TransportController, Arc<Script>) {
    let script = Arc::new(Script::default());
    (controller_with(script.clone()), script)
}

fn actions(c: &TransportController) -> String {
    c.get_current_transport_actions().unwrap()
}

#[test]
fn test_scenario_play_pause_stop() {
    let (c, script) = controller();

    c.set_transport_uri("http://host/a.mp3", "meta").unwrap();
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
    assert_eq!(actions(&c), "Play");

    c.play("1").unwrap();
    assert_eq!(c.state().unwrap(), TransportState::Playing);
    assert_eq!(actions(&c), "Stop,Pause");

    c.pause().unwrap();
    assert_eq!(c.state().unwrap(), TransportState::Paused);
    assert_eq!(actions(&c), "Stop,Play");
    assert_eq!(
        c.get_transport_info().unwrap().current_transport_state,
        "PAUSED_PLAYBACK"
    );

    c.stop().unwrap();
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
    assert_eq!(actions(&c), "Play");

    assert_eq!(
        *script.calls.lock(),
        vec!["play http://host/a.mp3", "pause true", "stop"]
    );
}

#[test]
fn test_resume_from_pause_does_not_reload() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();
    c.pause().unwrap();
    c.play("1").unwrap();

    assert_eq!(c.state().unwrap(), TransportState::Playing);
    assert_eq!(
        *script.calls.lock(),
        vec!["play http://host/a.mp3", "pause true", "pause false"]
    );
}

#[test]
fn test_unsupported_scheme_keeps_state() {
    let (c, _) = controller();
    c.set_transport_uri("http://host/a.mp3", "meta").unwrap();
    c.play("1").unwrap();

    let err = c.set_transport_uri("ftp://host/a.mp3", "meta").unwrap_err();
    assert!(matches!(err, RendererError::UnsupportedProtocol(_)));
    assert_eq!(err.upnp_code(), 704);
    assert_eq!(c.state().unwrap(), TransportState::Playing);
    assert_eq!(c.get_media_info().unwrap().current_uri, "http://host/a.mp3");
}

#[test]
fn test_unreachable_uri_is_read_error() {
    let engine = NativeEngine::new(Box::new(ScriptedBinding(Arc::new(Script::default())))).unwrap();
    let probe: Arc<dyn pmomediarenderer::ReachabilityProbe> =
        Arc::new(|url: &Url| Err::<(), String>(format!("{} does not answer", url)));
    let c = TransportController::new(
        Arc::new(EngineFactory::with_engine(PlaybackEngine::Native(engine))),
        probe,
        vec!["http".to_string()],
        Duration::from_millis(200),
    );

    let err = c.set_transport_uri("http://host/gone.mp3", "").unwrap_err();
    assert!(matches!(err, RendererError::ReadError(_)));
    assert_eq!(c.state().unwrap(), TransportState::NoMedia);
}

#[test]
fn test_actions_without_media() {
    let (c, _) = controller();

    assert!(matches!(c.play("1"), Err(RendererError::InvalidActionState(_))));
    assert!(matches!(c.stop(), Err(RendererError::InvalidActionState(_))));
    assert!(matches!(c.pause(), Err(RendererError::InvalidActionState(_))));
    assert_eq!(c.state().unwrap(), TransportState::NoMedia);
    assert_eq!(
        c.get_transport_info().unwrap().current_transport_state,
        "NO_MEDIA_PRESENT"
    );

    let position = c.get_position_info().unwrap();
    assert_eq!(position.track, 0);
    assert_eq!(position.rel_time, "NOT_IMPLEMENTED");
}

#[test]
fn test_media_info_returns_uri_and_metadata_unchanged() {
    let (c, _) = controller();
    let metadata = r#"<DIDL-Lite xmlns="urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/"><item id="1"><res duration="0:02:05.000">http://host/a.mp3</res></item></DIDL-Lite>"#;

    c.set_transport_uri("http://host/a.mp3", metadata).unwrap();
    c.play("1").unwrap();
    c.stop().unwrap();

    let info = c.get_media_info().unwrap();
    assert_eq!(info.current_uri, "http://host/a.mp3");
    assert_eq!(info.current_uri_meta_data, metadata);
    assert_eq!(info.nr_tracks, 1);
    assert_eq!(info.media_duration, "00:02:05");
}

#[test]
fn test_out_of_range_duration_is_ignored() {
    let (c, _) = controller();
    let metadata = r#"<DIDL-Lite><item><res duration="9999999999999999:00:00">x</res></item></DIDL-Lite>"#;

    c.set_transport_uri("http://host/a.mp3", metadata).unwrap();

    let info = c.get_media_info().unwrap();
    assert_eq!(info.current_uri_meta_data, metadata);
    assert_eq!(info.media_duration, "NOT_IMPLEMENTED");
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
}

#[test]
fn test_two_uris_share_the_engine() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "a").unwrap();
    c.play("1").unwrap();
    let first = c.snapshot().unwrap().media.unwrap();

    c.set_transport_uri("http://host/b.mp3", "b").unwrap();
    let second = c.snapshot().unwrap().media.unwrap();

    assert_ne!(first, second);
    assert_eq!(second.uri, "http://host/b.mp3");
    assert_eq!(c.factory().instantiations(), 0);
    assert!(c.factory().is_built());
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
    // Loading the new media stopped the previous one.
    assert_eq!(
        *script.calls.lock(),
        vec!["play http://host/a.mp3", "stop"]
    );

    c.play("1").unwrap();
    assert_eq!(script.calls.lock().last().unwrap(), "play http://host/b.mp3");
}

#[test]
fn test_failed_play_leaves_state_unchanged() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.drain_events().unwrap();

    *script.fail_on.lock() = Some("play");
    let err = c.play("1").unwrap_err();
    assert!(matches!(err, RendererError::ActionFailed { .. }));
    assert_eq!(err.upnp_code(), 501);
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
    assert_eq!(actions(&c), "Play");
    assert!(c.drain_events().unwrap().is_empty());
}

#[test]
fn test_failed_stop_and_pause_leave_state_unchanged() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();

    *script.fail_on.lock() = Some("stop");
    assert!(matches!(c.stop(), Err(RendererError::ActionFailed { .. })));
    assert_eq!(c.state().unwrap(), TransportState::Playing);

    *script.fail_on.lock() = Some("pause");
    assert!(matches!(c.pause(), Err(RendererError::ActionFailed { .. })));
    assert_eq!(c.state().unwrap(), TransportState::Playing);
    assert_eq!(actions(&c), "Stop,Pause");
}

#[test]
fn test_engine_without_pause() {
    let script = Arc::new(Script {
        no_pause: true,
        ..Script::default()
    });
    let c = controller_with(script);
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();

    assert_eq!(actions(&c), "Stop");
    assert!(matches!(c.pause(), Err(RendererError::InvalidAction(_))));
    assert_eq!(c.state().unwrap(), TransportState::Playing);
}

#[test]
fn test_pause_requires_playing() {
    let (c, _) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    assert!(matches!(c.pause(), Err(RendererError::InvalidActionState(_))));
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
}

#[test]
fn test_unsupported_actions_produce_no_event() {
    let (c, _) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();
    c.drain_events().unwrap();
    let before = c.snapshot().unwrap();

    let results = [
        c.seek("REL_TIME", "00:01:00"),
        c.record(),
        c.next(),
        c.previous(),
        c.set_next_transport_uri("http://host/b.mp3", ""),
        c.set_play_mode("SHUFFLE"),
        c.set_record_quality_mode("0:BASIC"),
    ];
    for result in results {
        let err = result.unwrap_err();
        assert!(matches!(err, RendererError::InvalidAction(_)));
        assert_eq!(err.upnp_code(), 401);
    }

    assert!(c.drain_events().unwrap().is_empty());
    assert_eq!(c.snapshot().unwrap(), before);
}

#[test]
fn test_position_never_exceeds_duration() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();

    let events = script.events();
    events.on_duration_changed(100_000);
    events.on_position_changed(0.5);
    let position = c.get_position_info().unwrap();
    assert_eq!(position.rel_time, "00:00:50");
    assert_eq!(position.track_duration, "00:01:40");

    events.on_position_changed(1.7);
    let position = c.get_position_info().unwrap();
    assert!(position.rel_time_seconds().unwrap() <= 100);
    assert_eq!(position.track_uri, "http://host/a.mp3");
}

#[test]
fn test_position_after_stop_is_zero() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();
    script.events().on_duration_changed(60_000);
    script.events().on_position_changed(0.5);
    c.stop().unwrap();

    let position = c.get_position_info().unwrap();
    assert_eq!(position.rel_time, "00:00:00");
}

#[test]
fn test_events_are_drained_once() {
    let (c, _) = controller();
    c.set_transport_uri("http://host/a.mp3", "meta").unwrap();

    let events = c.drain_events().unwrap();
    let find = |name: &str| {
        events
            .iter()
            .find(|e| e.variable == name)
            .map(|e| e.value.clone())
    };
    assert_eq!(find("TransportState").as_deref(), Some("STOPPED"));
    assert_eq!(find("CurrentTransportActions").as_deref(), Some("Play"));
    assert_eq!(find("AVTransportURI").as_deref(), Some("http://host/a.mp3"));
    assert_eq!(find("AVTransportURIMetaData").as_deref(), Some("meta"));
    assert!(c.drain_events().unwrap().is_empty());

    // Only the latest value of a variable is kept between drains.
    c.play("1").unwrap();
    c.pause().unwrap();
    let events = c.drain_events().unwrap();
    let states: Vec<_> = events
        .iter()
        .filter(|e| e.variable == "TransportState")
        .collect();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].value, "PAUSED_PLAYBACK");
}

#[test]
fn test_end_of_media_moves_to_stopped() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();
    c.drain_events().unwrap();

    script.events().on_stopped();
    let events = c.drain_events().unwrap();

    assert_eq!(c.state().unwrap(), TransportState::Stopped);
    assert!(
        events
            .iter()
            .any(|e| e.variable == "TransportState" && e.value == "STOPPED")
    );

    // Play starts the media again.
    c.play("1").unwrap();
    assert_eq!(
        script.calls.lock().iter().filter(|c| c.starts_with("play")).count(),
        2
    );
}

/// Blocks inside `play_media` until released.
struct SlowBinding(Arc<Mutex<()>>);

impl NativeBinding for SlowBinding {
    fn attach(&self, _events: Arc<dyn PlaybackEvents>) -> Result<(), PlayerError> {
        Ok(())
    }
    fn play_media(&self, _uri: &str) -> Result<(), PlayerError> {
        let _gate = self.0.lock();
        Ok(())
    }
    fn set_pause(&self, _paused: bool) -> Result<(), PlayerError> {
        Ok(())
    }
    fn stop(&self) -> Result<(), PlayerError> {
        Ok(())
    }
    fn skip(&self, _offset_millis: i64) -> Result<(), PlayerError> {
        Ok(())
    }
}

#[test]
fn test_stuck_engine_times_out_other_actions() {
    let gate = Arc::new(Mutex::new(()));
    let engine = NativeEngine::new(Box::new(SlowBinding(gate.clone()))).unwrap();
    let probe: Arc<dyn pmomediarenderer::ReachabilityProbe> =
        Arc::new(|_: &Url| Ok::<(), String>(()));
    let c = Arc::new(TransportController::new(
        Arc::new(EngineFactory::with_engine(PlaybackEngine::Native(engine))),
        probe,
        vec!["http".to_string()],
        Duration::from_millis(100),
    ));
    c.set_transport_uri("http://host/a.mp3", "").unwrap();

    let held = gate.lock();
    let player = {
        let c = c.clone();
        thread::spawn(move || c.play("1"))
    };
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let err = c.get_transport_info().unwrap_err();
    assert!(matches!(err, RendererError::TransportLocked(_)));
    assert_eq!(err.upnp_code(), 705);
    assert!(started.elapsed() < Duration::from_secs(2));

    drop(held);
    player.join().unwrap().unwrap();
    assert_eq!(c.state().unwrap(), TransportState::Playing);
}

#[test]
fn test_shutdown_releases_engine() {
    let (c, script) = controller();
    c.set_transport_uri("http://host/a.mp3", "").unwrap();
    c.play("1").unwrap();

    c.shutdown();
    assert_eq!(c.state().unwrap(), TransportState::NoMedia);
    assert!(!c.factory().is_built());
    assert!(script.calls.lock().iter().any(|call| call == "stop"));
}
