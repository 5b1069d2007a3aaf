use std::{io, time::Duration};

use thiserror::Error;

/// Failures reported by a playback engine.
///
/// These never reach a control point as such: the transport controller
/// converts them into a [`RendererError`] at the engine boundary.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Cannot spawn player '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Player process has exited")]
    ProcessExited,
    #[error("Player I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Cannot load native library: {0}")]
    LibraryLoad(String),
    #[error("Native library does not export {0}")]
    Symbol(String),
    #[error("Native player error: {0}")]
    Native(String),
    #[error("Cannot connect to {0}: {1}")]
    Connect(String, String),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("No media loaded")]
    NoMedia,
    #[error("Operation '{0}' is not supported by the {1} engine")]
    Unsupported(String, String),
}

impl PlayerError {
    pub fn protocol(message: &str) -> Self {
        PlayerError::Protocol(message.to_string())
    }

    pub fn unsupported(operation: &str, engine: &str) -> Self {
        PlayerError::Unsupported(operation.to_string(), engine.to_string())
    }
}

/// Errors surfaced by renderer actions.
///
/// Every variant maps onto a UPnP error code through [`upnp_code`](Self::upnp_code).
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Invalid argument: {0}")]
    ArgumentError(String),
    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),
    #[error("Unable to read requested URI: {0}")]
    ReadError(String),
    #[error("Action {action} failed: {source}")]
    ActionFailed {
        action: String,
        #[source]
        source: PlayerError,
    },
    #[error("Action not allowed in the current state: {0}")]
    InvalidActionState(String),
    #[error("{0} not supported")]
    InvalidAction(String),
    #[error("Unknown engine type '{0}'")]
    UnknownEngineType(String),
    #[error("Cannot create player: {0}")]
    PlayerError(#[source] PlayerError),
    #[error("Transport is locked (waited {0:?})")]
    TransportLocked(Duration),
    #[error("Unsupported audio channel: {0}")]
    InvalidChannel(String),
}

impl RendererError {
    pub fn argument(message: &str) -> Self {
        RendererError::ArgumentError(message.to_string())
    }

    pub fn action_failed(action: &str, source: PlayerError) -> Self {
        RendererError::ActionFailed {
            action: action.to_string(),
            source,
        }
    }

    pub fn invalid_action_state(message: &str) -> Self {
        RendererError::InvalidActionState(message.to_string())
    }

    pub fn invalid_action(action: &str) -> Self {
        RendererError::InvalidAction(action.to_string())
    }

    /// UPnP / AVTransport error code for this error.
    pub fn upnp_code(&self) -> u16 {
        match self {
            RendererError::ArgumentError(_) | RendererError::InvalidChannel(_) => 402,
            RendererError::UnsupportedProtocol(_) => 704,
            RendererError::ReadError(_) => 703,
            RendererError::ActionFailed { .. }
            | RendererError::UnknownEngineType(_)
            | RendererError::PlayerError(_) => 501,
            RendererError::InvalidActionState(_) => 701,
            RendererError::InvalidAction(_) => 401,
            RendererError::TransportLocked(_) => 705,
        }
    }

    /// Standard description associated with [`upnp_code`](Self::upnp_code).
    pub fn upnp_description(&self) -> &'static str {
        match self.upnp_code() {
            401 => "Invalid Action",
            402 => "Invalid Args",
            701 => "Transition not available",
            703 => "Read error",
            704 => "Format not supported for playback",
            705 => "Transport is locked",
            _ => "Action Failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upnp_codes() {
        assert_eq!(RendererError::argument("uri").upnp_code(), 402);
        assert_eq!(RendererError::UnsupportedProtocol("ftp".into()).upnp_code(), 704);
        assert_eq!(RendererError::ReadError("x".into()).upnp_code(), 703);
        assert_eq!(
            RendererError::action_failed("Play", PlayerError::ProcessExited).upnp_code(),
            501
        );
        assert_eq!(RendererError::invalid_action_state("no engine").upnp_code(), 701);
        assert_eq!(RendererError::invalid_action("Seek").upnp_code(), 401);
        assert_eq!(RendererError::UnknownEngineType("foo".into()).upnp_code(), 501);
        assert_eq!(RendererError::PlayerError(PlayerError::NoMedia).upnp_code(), 501);
        assert_eq!(
            RendererError::TransportLocked(Duration::from_millis(2000)).upnp_code(),
            705
        );
        assert_eq!(RendererError::InvalidChannel("LF".into()).upnp_code(), 402);
    }

    #[test]
    fn test_descriptions_follow_codes() {
        assert_eq!(RendererError::invalid_action("Seek").upnp_description(), "Invalid Action");
        assert_eq!(
            RendererError::TransportLocked(Duration::ZERO).upnp_description(),
            "Transport is locked"
        );
        assert_eq!(
            RendererError::UnknownEngineType("foo".into()).upnp_description(),
            "Action Failed"
        );
    }

    #[test]
    fn test_action_failed_keeps_source() {
        use std::error::Error;

        let err = RendererError::action_failed("Stop", PlayerError::protocol("ACK [5@0]"));
        assert_eq!(err.to_string(), "Action Stop failed: Protocol error: ACK [5@0]");
        assert!(err.source().is_some());
    }
}
