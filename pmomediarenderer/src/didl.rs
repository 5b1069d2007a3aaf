use quick_xml::{events::Event, Reader};
use tracing::debug;

use crate::time_utils::parse_upnp_duration;

/// Duration of the first `<res duration="…">` found in a DIDL-Lite document.
///
/// Metadata is opaque to the renderer, so malformed documents simply give
/// `None`.
pub fn res_duration_seconds(metadata: &str) -> Option<u64> {
    if metadata.trim().is_empty() {
        return None;
    }

    let mut reader = Reader::from_str(metadata);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"res" => {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"duration" {
                        let value = String::from_utf8_lossy(&attr.value);
                        return parse_upnp_duration(&value).ok();
                    }
                }
            }
            Ok(Event::Eof) => return None,
            Ok(_) => {}
            Err(err) => {
                debug!("Ignoring unparsable DIDL-Lite metadata: {}", err);
                return None;
            }
        }
    }
}
