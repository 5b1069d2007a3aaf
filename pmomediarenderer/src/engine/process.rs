//! Playback through a long-lived MPlayer child process in slave mode.
//!
//! Control commands are written to the child's stdin and not acknowledged.
//! Queries (`get_property …`) are answered on stdout with `ANS_<name>=<value>`
//! lines, interleaved with whatever else the player prints. A reader thread
//! forwards every stdout line to a bounded channel, dropping the oldest
//! lines when nobody reads them; a query scans that channel up to a deadline
//! and returns the first matching answer.

use std::{
    io::{BufRead, BufReader, Write},
    process::{Child, ChildStdin, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    engine::capabilities::{PlaybackPosition, TransportControl},
    errors::PlayerError,
    time_utils::parse_seconds,
};

const ANSWER_PREFIX: &str = "ANS_";
const ANSWER_ERROR: &str = "ANS_ERROR=";
const END_OF_FILE_PREFIX: &str = "EOF code:";
/// Player output kept between two queries.
const OUTPUT_BACKLOG: usize = 256;

/// Settings of the process-driven engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessSettings {
    pub path: String,
    pub args: Vec<String>,
    pub query_timeout: Duration,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            path: "mplayer".to_string(),
            args: vec![
                "-slave".into(),
                "-quiet".into(),
                "-idle".into(),
                // `EOF code:` is only printed at verbose level.
                "-msglevel".into(),
                "global=6".into(),
            ],
            query_timeout: Duration::from_millis(500),
        }
    }
}

enum Answer {
    Value(String),
    Unavailable,
    Silent,
}

#[derive(Debug, Default)]
struct MediaState {
    uri: Option<String>,
    loaded: bool,
    paused: bool,
    last_position: Option<u64>,
    last_duration: Option<u64>,
}

struct ProcessInner {
    child: Child,
    stdin: Option<ChildStdin>,
    media: MediaState,
}

pub struct ProcessEngine {
    command: String,
    inner: Mutex<ProcessInner>,
    lines: Receiver<String>,
    reader: Mutex<Option<JoinHandle<()>>>,
    ended: Arc<AtomicBool>,
    query_timeout: Duration,
}

impl ProcessEngine {
    /// Spawns the player and starts pumping its output.
    pub fn spawn(settings: &ProcessSettings) -> Result<Self, PlayerError> {
        let command = std::iter::once(settings.path.as_str())
            .chain(settings.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let mut child = Command::new(&settings.path)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| PlayerError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PlayerError::protocol("player stdout is not captured"))?;

        let (tx, rx) = crossbeam_channel::bounded(OUTPUT_BACKLOG);
        let backlog = rx.clone();
        let ended = Arc::new(AtomicBool::new(false));
        let reader_ended = ended.clone();

        let reader = thread::Builder::new()
            .name("player-stdout".into())
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if line.starts_with(END_OF_FILE_PREFIX) {
                        reader_ended.store(true, Ordering::SeqCst);
                    }
                    if !forward_line(&tx, &backlog, line) {
                        break;
                    }
                }
                debug!("Player stdout closed");
            })
            .map_err(PlayerError::Io)?;

        info!(command = %command, pid = child.id(), "✅ Player process started");

        Ok(Self {
            command,
            inner: Mutex::new(ProcessInner {
                child,
                stdin,
                media: MediaState::default(),
            }),
            lines: rx,
            reader: Mutex::new(Some(reader)),
            ended,
            query_timeout: settings.query_timeout,
        })
    }

    /// Returns true once the child process is gone.
    pub fn has_exited(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.stdin.is_none() || matches!(inner.child.try_wait(), Ok(Some(_)) | Err(_))
    }

    pub fn pid(&self) -> u32 {
        self.inner.lock().child.id()
    }

    /// Set when the player reported the end of the current media.
    pub fn playback_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Asks the player for `property` and returns the raw answer.
    ///
    /// `Ok(None)` means the player did not answer in time or reported the
    /// property as unavailable.
    pub fn query_property(&self, property: &str) -> Result<Option<String>, PlayerError> {
        let mut inner = self.inner.lock();
        match self.query_locked(&mut inner, property)? {
            Answer::Value(value) => Ok(Some(value)),
            Answer::Unavailable | Answer::Silent => Ok(None),
        }
    }

    /// Kills the player. Later operations fail with `ProcessExited`.
    pub fn cleanup(&self) {
        {
            let mut inner = self.inner.lock();
            if let Some(mut stdin) = inner.stdin.take() {
                let _ = writeln!(stdin, "quit");
                let _ = stdin.flush();
            }
            if let Ok(None) = inner.child.try_wait() {
                if let Err(err) = inner.child.kill() {
                    warn!(command = %self.command, "Cannot kill player: {}", err);
                }
            }
            let _ = inner.child.wait();
            inner.media = MediaState::default();
        }

        if let Some(handle) = self.reader.lock().take() {
            let _ = handle.join();
        }
        info!(command = %self.command, "Player process stopped");
    }

    fn send(&self, inner: &mut ProcessInner, command: &str) -> Result<(), PlayerError> {
        if let Ok(Some(status)) = inner.child.try_wait() {
            debug!(command = %self.command, %status, "Player has exited");
            inner.stdin = None;
            return Err(PlayerError::ProcessExited);
        }
        let stdin = inner.stdin.as_mut().ok_or(PlayerError::ProcessExited)?;

        debug!(player_command = %command, "→ player");
        let written = writeln!(stdin, "{}", command).and_then(|_| stdin.flush());
        match written {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => {
                inner.stdin = None;
                Err(PlayerError::ProcessExited)
            }
            Err(err) => Err(PlayerError::Io(err)),
        }
    }

    fn query_locked(
        &self,
        inner: &mut ProcessInner,
        property: &str,
    ) -> Result<Answer, PlayerError> {
        // Answers left over from an earlier timed-out query.
        loop {
            match self.lines.try_recv() {
                Ok(line) => absorb_stale(&mut inner.media, &line),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        self.send(inner, &format!("get_property {}", property))?;

        let expected = format!("{}{}=", ANSWER_PREFIX, property);
        let deadline = Instant::now() + self.query_timeout;
        loop {
            match self.lines.recv_deadline(deadline) {
                Ok(line) => {
                    if let Some(value) = line.strip_prefix(&expected) {
                        return Ok(Answer::Value(value.trim().to_string()));
                    }
                    if let Some(reason) = line.strip_prefix(ANSWER_ERROR) {
                        debug!(property, reason, "Player cannot answer");
                        return Ok(Answer::Unavailable);
                    }
                    debug!(line = %line, "Ignoring player output");
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(property, timeout = ?self.query_timeout, "Player did not answer in time");
                    return Ok(Answer::Silent);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    inner.stdin = None;
                    return Err(PlayerError::ProcessExited);
                }
            }
        }
    }

    /// Queries a numeric property and folds the answer into the cache.
    fn sample(&self, property: &str) -> Option<u64> {
        let mut inner = self.inner.lock();
        if !inner.media.loaded {
            return None;
        }

        let cached = |media: &MediaState| match property {
            "time_pos" => media.last_position,
            _ => media.last_duration,
        };

        match self.query_locked(&mut inner, property) {
            Ok(Answer::Value(answer)) => {
                let value = parse_seconds(&answer);
                match property {
                    "time_pos" => inner.media.last_position = value.or(inner.media.last_position),
                    _ => inner.media.last_duration = value.or(inner.media.last_duration),
                }
                value.or_else(|| cached(&inner.media))
            }
            Ok(Answer::Unavailable) => {
                // An idle player has no position: the media played to its end.
                // Before the first position the stream is still opening.
                if property == "time_pos"
                    && !inner.media.paused
                    && inner.media.last_position.is_some()
                {
                    self.ended.store(true, Ordering::SeqCst);
                }
                cached(&inner.media)
            }
            Ok(Answer::Silent) => cached(&inner.media),
            Err(err) => {
                debug!(property, "Player query failed: {}", err);
                cached(&inner.media)
            }
        }
    }
}

/// Queues a player line, evicting the oldest one when the backlog is full.
///
/// Returns false once the engine side of the channel is gone.
fn forward_line(tx: &Sender<String>, backlog: &Receiver<String>, mut line: String) -> bool {
    loop {
        match tx.try_send(line) {
            Ok(()) => return true,
            Err(TrySendError::Full(rejected)) => {
                let _ = backlog.try_recv();
                line = rejected;
            }
            Err(TrySendError::Disconnected(_)) => return false,
        }
    }
}

fn absorb_stale(media: &mut MediaState, line: &str) {
    if let Some(value) = line.strip_prefix("ANS_time_pos=") {
        media.last_position = parse_seconds(value).or(media.last_position);
    } else if let Some(value) = line.strip_prefix("ANS_length=") {
        media.last_duration = parse_seconds(value).or(media.last_duration);
    }
}

/// Quotes an argument of a slave command.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

impl TransportControl for ProcessEngine {
    fn load(&self, uri: &str) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        inner.media = MediaState {
            uri: Some(uri.to_string()),
            ..MediaState::default()
        };
        self.ended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        let uri = inner.media.uri.clone().ok_or(PlayerError::NoMedia)?;
        let ended = self.ended.load(Ordering::SeqCst);

        if inner.media.loaded && inner.media.paused && !ended {
            // `pause` toggles, so it resumes here.
            self.send(&mut inner, "pause")?;
            inner.media.paused = false;
            return Ok(());
        }
        if inner.media.loaded && !inner.media.paused && !ended {
            return Ok(());
        }

        // Cleared first: the end-of-file line may arrive before `send` returns.
        self.ended.store(false, Ordering::SeqCst);
        self.send(&mut inner, &format!("loadfile {} 0", quote(&uri)))?;
        inner.media.loaded = true;
        inner.media.paused = false;
        inner.media.last_position = None;
        inner.media.last_duration = None;
        Ok(())
    }

    fn pause(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        if !inner.media.loaded {
            return Err(PlayerError::NoMedia);
        }
        if inner.media.paused {
            return Ok(());
        }
        self.send(&mut inner, "pause")?;
        inner.media.paused = true;
        Ok(())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        if inner.media.loaded {
            self.send(&mut inner, "stop")?;
        }
        inner.media.loaded = false;
        inner.media.paused = false;
        Ok(())
    }

    fn skip(&self, offset_seconds: i64) -> Result<(), PlayerError> {
        let mut inner = self.inner.lock();
        if !inner.media.loaded {
            return Err(PlayerError::NoMedia);
        }
        self.send(&mut inner, &format!("seek {} 0", offset_seconds))
    }
}

impl PlaybackPosition for ProcessEngine {
    fn position(&self) -> Option<u64> {
        self.sample("time_pos")
    }

    fn duration(&self) -> Option<u64> {
        self.sample("length")
    }

    fn current_uri(&self) -> Option<String> {
        self.inner.lock().media.uri.clone()
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Ok(None) = inner.child.try_wait() {
            let _ = inner.child.kill();
            let _ = inner.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("http://host/a.mp3"), "\"http://host/a.mp3\"");
        assert_eq!(quote("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }

    #[test]
    fn test_absorb_stale_answers() {
        let mut media = MediaState::default();
        absorb_stale(&mut media, "ANS_time_pos=3.2");
        absorb_stale(&mut media, "ANS_length=180.00");
        absorb_stale(&mut media, "Starting playback...");
        assert_eq!(media.last_position, Some(3));
        assert_eq!(media.last_duration, Some(180));
    }

    #[test]
    fn test_full_backlog_drops_oldest_lines() {
        let (tx, rx) = crossbeam_channel::bounded(2);
        for line in ["one", "two", "three"] {
            assert!(forward_line(&tx, &rx, line.to_string()));
        }
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["two", "three"]);
    }

    #[test]
    fn test_default_args_report_end_of_file() {
        let settings = ProcessSettings::default();
        assert!(settings.args.windows(2).any(|w| w == ["-msglevel", "global=6"]));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let settings = ProcessSettings {
            path: "/nonexistent/definitely-not-a-player".into(),
            args: vec![],
            query_timeout: Duration::from_millis(100),
        };
        match ProcessEngine::spawn(&settings) {
            Err(PlayerError::Spawn { command, .. }) => {
                assert_eq!(command, "/nonexistent/definitely-not-a-player")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("spawn should fail"),
        }
    }
}
