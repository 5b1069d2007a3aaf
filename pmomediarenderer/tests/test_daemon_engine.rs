use std::{
    io::{BufRead, BufReader, Write},
    net::{TcpListener, TcpStream},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use pmomediarenderer::{
    EngineFactory, EngineKind, EngineSettings, PlaybackPosition, PlayerError, RendererError,
    TransportControl, TransportController, TransportState,
    engine::{DaemonEngine, DaemonSettings},
};
use url::Url;

/// Minimal MPD server: records commands and answers `status` from `state`.
#[derive(Default)]
struct FakeMpd {
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    state: Mutex<String>,
    drop_next: AtomicBool,
}

impl FakeMpd {
    fn start() -> (Arc<Self>, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = Arc::new(FakeMpd {
            state: Mutex::new("play".to_string()),
            ..FakeMpd::default()
        });

        let shared = server.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                shared.connections.fetch_add(1, Ordering::SeqCst);
                let session = shared.clone();
                thread::spawn(move || session.serve(stream));
            }
        });
        (server, port)
    }

    fn serve(&self, stream: TcpStream) {
        let mut writer = stream.try_clone().unwrap();
        let reader = BufReader::new(stream);
        if writer.write_all(b"OK MPD 0.23.5\n").is_err() {
            return;
        }

        for line in reader.lines() {
            let Ok(command) = line else { break };
            if self.drop_next.swap(false, Ordering::SeqCst) {
                return;
            }
            if command == "close" {
                return;
            }
            self.commands.lock().push(command.clone());

            let answer = match command.as_str() {
                "status" => format!(
                    "volume: 100\nstate: {}\nelapsed: 12.345\nduration: 200.100\nOK\n",
                    self.state.lock()
                ),
                "bogus" => "ACK [5@0] {bogus} unknown command \"bogus\"\n".to_string(),
                _ => "OK\n".to_string(),
            };
            if writer.write_all(answer.as_bytes()).is_err() {
                return;
            }
        }
    }

    fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn settings(port: u16) -> DaemonSettings {
    DaemonSettings {
        host: "127.0.0.1".to_string(),
        port,
        timeout: Duration::from_secs(2),
    }
}

/// A port nothing listens on.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_connects_lazily() {
    let (server, port) = FakeMpd::start();
    let engine = DaemonEngine::new(&settings(port));
    engine.load("http://host/a.mp3").unwrap();

    assert!(!engine.is_connected());
    assert_eq!(server.connections(), 0);
}

#[test]
fn test_play_pause_stop_commands() {
    let (server, port) = FakeMpd::start();
    let engine = DaemonEngine::new(&settings(port));

    engine.load("http://host/a.mp3").unwrap();
    engine.play().unwrap();
    engine.pause().unwrap();
    engine.play().unwrap();
    engine.skip(10).unwrap();
    engine.stop().unwrap();

    assert_eq!(
        server.commands(),
        vec![
            "clear",
            r#"add "http://host/a.mp3""#,
            "play",
            "pause 1",
            "pause 0",
            "seekcur +10",
            "stop",
        ]
    );
    assert_eq!(server.connections(), 1);
}

#[test]
fn test_status_gives_position_and_end_of_media() {
    let (server, port) = FakeMpd::start();
    let engine = DaemonEngine::new(&settings(port));
    engine.load("http://host/a.mp3").unwrap();
    assert_eq!(engine.position(), None);

    engine.play().unwrap();
    assert_eq!(engine.position(), Some(12));
    assert_eq!(engine.duration(), Some(200));
    assert!(!engine.playback_ended());

    *server.state.lock() = "stop".to_string();
    engine.position();
    assert!(engine.playback_ended());

    // Play after the end enqueues the media again.
    engine.play().unwrap();
    assert_eq!(
        server
            .commands()
            .iter()
            .filter(|c| c.starts_with("add "))
            .count(),
        2
    );
}

#[test]
fn test_ack_is_a_protocol_error() {
    let (_server, port) = FakeMpd::start();
    let mut client =
        pmomediarenderer::engine::mpd_client::MpdClient::new("127.0.0.1", port, Duration::from_secs(2));

    assert!(matches!(client.command("bogus"), Err(PlayerError::Protocol(_))));
    // The connection survives a rejected command.
    assert!(client.is_connected());
    assert_eq!(client.server_version(), Some("0.23.5"));
    client.close();
    assert!(!client.is_connected());
    client.close();
}

#[test]
fn test_reconnects_after_connection_loss() {
    let (server, port) = FakeMpd::start();
    let engine = DaemonEngine::new(&settings(port));
    engine.load("http://host/a.mp3").unwrap();
    engine.play().unwrap();

    server.drop_next.store(true, Ordering::SeqCst);
    engine.pause().unwrap();

    assert_eq!(server.connections(), 2);
    assert_eq!(server.commands().last().unwrap(), "pause 1");
}

#[test]
fn test_unreachable_daemon_is_recoverable() {
    let engine = DaemonEngine::new(&settings(closed_port()));
    engine.load("http://host/a.mp3").unwrap();

    assert!(matches!(engine.play(), Err(PlayerError::Connect(..))));
    assert!(!engine.is_connected());
    // Nothing to disconnect.
    engine.cleanup();
}

fn daemon_controller(port: u16) -> TransportController {
    let factory = EngineFactory::new(EngineSettings {
        kind: EngineKind::Daemon,
        daemon: settings(port),
        ..EngineSettings::default()
    });
    let probe: Arc<dyn pmomediarenderer::ReachabilityProbe> =
        Arc::new(|_: &Url| Ok::<(), String>(()));
    TransportController::new(
        Arc::new(factory),
        probe,
        vec!["http".to_string()],
        Duration::from_secs(2),
    )
}

#[test]
fn test_consecutive_uris_reuse_the_connection() {
    let (server, port) = FakeMpd::start();
    let c = daemon_controller(port);

    c.set_transport_uri("http://host/a.mp3", "first").unwrap();
    c.play("1").unwrap();
    let first = c.snapshot().unwrap().media.unwrap();

    c.set_transport_uri("http://host/b.mp3", "second").unwrap();
    c.play("1").unwrap();
    let second = c.snapshot().unwrap().media.unwrap();

    assert_ne!(first, second);
    assert_eq!(c.factory().instantiations(), 1);
    assert_eq!(server.connections(), 1);
    assert_eq!(
        server.commands(),
        vec![
            "clear",
            r#"add "http://host/a.mp3""#,
            "play",
            "stop",
            "clear",
            r#"add "http://host/b.mp3""#,
            "play",
        ]
    );

    c.shutdown();
    assert!(!c.factory().is_built());
}

#[test]
fn test_daemon_failure_surfaces_as_action_failed() {
    let c = daemon_controller(closed_port());
    c.set_transport_uri("http://host/a.mp3", "").unwrap();

    let err = c.play("1").unwrap_err();
    assert!(matches!(
        err,
        RendererError::ActionFailed {
            source: PlayerError::Connect(..),
            ..
        }
    ));
    assert_eq!(c.state().unwrap(), TransportState::Stopped);
}
