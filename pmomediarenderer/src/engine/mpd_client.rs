use std::{
    io::{BufRead, BufReader, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::errors::PlayerError;

pub const MPD_DEFAULT_PORT: u16 = 6600;
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

const GREETING_PREFIX: &str = "OK MPD ";

struct MpdConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    version: String,
}

/// Line-oriented client for the MPD protocol.
///
/// The connection is opened on first use. Any I/O failure drops it; the next
/// command opens a fresh one.
pub struct MpdClient {
    host: String,
    port: u16,
    timeout: Duration,
    connection: Option<MpdConnection>,
}

impl MpdClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout,
            connection: None,
        }
    }

    fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Protocol version announced by the server, once connected.
    pub fn server_version(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.version.as_str())
    }

    fn connect(&mut self) -> Result<&mut MpdConnection, PlayerError> {
        if self.connection.is_none() {
            let address = self.address();
            let connect_error = |e: &dyn std::fmt::Display| PlayerError::Connect(address.clone(), e.to_string());

            let addrs = address
                .to_socket_addrs()
                .map_err(|e| connect_error(&e))?
                .collect::<Vec<_>>();

            let mut last_error = None;
            let mut stream = None;
            for addr in addrs {
                match TcpStream::connect_timeout(&addr, self.timeout) {
                    Ok(s) => {
                        stream = Some(s);
                        break;
                    }
                    Err(e) => last_error = Some(e),
                }
            }
            let stream = match (stream, last_error) {
                (Some(s), _) => s,
                (None, Some(e)) => return Err(connect_error(&e)),
                (None, None) => return Err(connect_error(&"no address")),
            };

            stream.set_read_timeout(Some(self.timeout))?;
            stream.set_write_timeout(Some(self.timeout))?;
            let _ = stream.set_nodelay(true);

            let writer = stream.try_clone()?;
            let mut reader = BufReader::new(stream);

            let mut greeting = String::new();
            reader.read_line(&mut greeting).map_err(|e| connect_error(&e))?;
            let version = greeting
                .trim_end()
                .strip_prefix(GREETING_PREFIX)
                .ok_or_else(|| {
                    PlayerError::Protocol(format!("unexpected MPD greeting: {}", greeting.trim_end()))
                })?
                .to_string();

            info!(address = %address, version = %version, "Connected to MPD");
            self.connection = Some(MpdConnection {
                reader,
                writer,
                version,
            });
        }

        self.connection
            .as_mut()
            .ok_or_else(|| PlayerError::protocol("MPD connection missing"))
    }

    /// Sends `command` and returns the `key: value` pairs of the answer.
    ///
    /// A stale connection (closed by the server after its idle timeout) is
    /// reopened once before giving up.
    pub fn command(&mut self, command: &str) -> Result<Vec<(String, String)>, PlayerError> {
        let reused = self.connection.is_some();
        match self.exchange(command) {
            Err(PlayerError::Io(err)) if reused => {
                debug!(command, "MPD connection lost ({}), reconnecting", err);
                self.exchange(command)
            }
            other => other,
        }
    }

    fn exchange(&mut self, command: &str) -> Result<Vec<(String, String)>, PlayerError> {
        let result = self.exchange_on_connection(command);
        if let Err(PlayerError::Io(_)) | Err(PlayerError::Connect(..)) = &result {
            self.connection = None;
        }
        result
    }

    fn exchange_on_connection(&mut self, command: &str) -> Result<Vec<(String, String)>, PlayerError> {
        let connection = self.connect()?;

        debug!(mpd_command = %command, "→ mpd");
        connection.writer.write_all(command.as_bytes())?;
        connection.writer.write_all(b"\n")?;
        connection.writer.flush()?;

        let mut pairs = Vec::new();
        loop {
            let mut line = String::new();
            let read = connection.reader.read_line(&mut line)?;
            if read == 0 {
                return Err(PlayerError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "MPD closed the connection",
                )));
            }

            let line = line.trim_end_matches(['\r', '\n']);
            if line == "OK" {
                return Ok(pairs);
            }
            if line.starts_with("ACK ") {
                warn!(mpd_command = %command, answer = %line, "MPD rejected command");
                return Err(PlayerError::Protocol(line.to_string()));
            }
            match line.split_once(": ") {
                Some((key, value)) => pairs.push((key.to_string(), value.to_string())),
                None => debug!(line, "Ignoring MPD output"),
            }
        }
    }

    /// Says goodbye and drops the connection. Does nothing when not connected.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.writer.write_all(b"close\n");
            let _ = connection.writer.flush();
            let _ = connection.writer.shutdown(Shutdown::Both);
            debug!(address = %self.address(), "MPD connection closed");
        }
    }
}

/// Quotes a command argument (`"` and `\` are escaped).
pub fn quote(argument: &str) -> String {
    format!("\"{}\"", argument.replace('\\', "\\\\").replace('"', "\\\""))
}

/// The fields of `status` the engine uses.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MpdStatus {
    pub state: Option<String>,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
}

impl MpdStatus {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut status = MpdStatus::default();
        let mut time_field: Option<(f64, f64)> = None;

        for (key, value) in pairs {
            match key.as_str() {
                "state" => status.state = Some(value.clone()),
                "elapsed" => status.elapsed = value.parse().ok(),
                "duration" => status.duration = value.parse().ok(),
                "time" => {
                    time_field = value
                        .split_once(':')
                        .and_then(|(a, b)| Some((a.parse().ok()?, b.parse().ok()?)));
                }
                _ => {}
            }
        }

        if let Some((elapsed, total)) = time_field {
            status.elapsed = status.elapsed.or(Some(elapsed));
            if total > 0.0 {
                status.duration = status.duration.or(Some(total));
            }
        }
        status
    }

    pub fn is_stopped(&self) -> bool {
        self.state.as_deref() == Some("stop")
    }
}
