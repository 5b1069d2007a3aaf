//! # ConnectionManager Service
//!
//! Le renderer n'a qu'une connexion implicite (`0`). Le service annonce les
//! formats acceptés en entrée (Sink) et rien en sortie (Source).

use serde::Serialize;

use crate::errors::RendererError;

pub const SERVICE_NAME: &str = "ConnectionManager";
pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:ConnectionManager:1";

/// MIME types advertised as playable.
pub const DEFAULT_SINK_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/mpeg3",
    "audio/mp4",
    "audio/x-flac",
    "audio/flac",
    "audio/ogg",
    "audio/wav",
    "audio/x-wav",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProtocolInfo {
    pub source: String,
    pub sink: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectionInfo {
    #[serde(rename = "RcsID")]
    pub rcs_id: i32,
    #[serde(rename = "AVTransportID")]
    pub av_transport_id: i32,
    pub protocol_info: String,
    pub peer_connection_manager: String,
    #[serde(rename = "PeerConnectionID")]
    pub peer_connection_id: i32,
    pub direction: String,
    pub status: String,
}

pub struct ConnectionManager {
    sink: String,
}

impl ConnectionManager {
    pub fn new(mime_types: &[&str]) -> Self {
        let sink = mime_types
            .iter()
            .map(|mime| format!("http-get:*:{}:*", mime))
            .collect::<Vec<_>>()
            .join(",");
        Self { sink }
    }

    pub fn get_protocol_info(&self) -> ProtocolInfo {
        ProtocolInfo {
            source: String::new(),
            sink: self.sink.clone(),
        }
    }

    pub fn get_current_connection_ids(&self) -> String {
        "0".to_string()
    }

    pub fn get_current_connection_info(&self, connection_id: i32) -> Result<ConnectionInfo, RendererError> {
        if connection_id != 0 {
            return Err(RendererError::ArgumentError(format!(
                "Unknown connection id {}",
                connection_id
            )));
        }
        Ok(ConnectionInfo {
            rcs_id: 0,
            av_transport_id: 0,
            protocol_info: String::new(),
            peer_connection_manager: String::new(),
            peer_connection_id: -1,
            direction: "Input".to_string(),
            status: "OK".to_string(),
        })
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(DEFAULT_SINK_MIME_TYPES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_info() {
        let cm = ConnectionManager::new(&["audio/mpeg", "audio/flac"]);
        let info = cm.get_protocol_info();
        assert_eq!(info.source, "");
        assert_eq!(info.sink, "http-get:*:audio/mpeg:*,http-get:*:audio/flac:*");
    }

    #[test]
    fn test_single_implicit_connection() {
        let cm = ConnectionManager::default();
        assert_eq!(cm.get_current_connection_ids(), "0");
        let info = cm.get_current_connection_info(0).unwrap();
        assert_eq!(info.direction, "Input");
        assert!(cm.get_current_connection_info(3).is_err());
    }
}
