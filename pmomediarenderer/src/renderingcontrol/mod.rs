//! # RenderingControl Service
//!
//! Service minimal exigé par les points de contrôle pour accepter le
//! renderer : le volume vaut toujours 100, le mute est toujours désactivé,
//! et les modifications sont acceptées puis ignorées. Seul le canal
//! `Master` est reconnu.

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    errors::RendererError,
    lastchange::{ChangeAccumulator, RENDERINGCONTROL_NAMESPACE},
    model::ChangeEvent,
    notifier::EventedService,
};

pub const SERVICE_NAME: &str = "RenderingControl";
pub const SERVICE_TYPE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

pub const MASTER_CHANNEL: &str = "Master";
pub const DEFAULT_VOLUME: u16 = 100;
pub const MAX_VOLUME: u16 = 100;

pub struct RenderingControl {
    changes: Mutex<ChangeAccumulator>,
}

impl Default for RenderingControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderingControl {
    /// Creates the service with its initial values pending for subscribers.
    pub fn new() -> Self {
        let mut changes = ChangeAccumulator::new();
        changes.record("Volume", DEFAULT_VOLUME.to_string());
        changes.record("Mute", "0");
        Self {
            changes: Mutex::new(changes),
        }
    }

    fn check_channel(channel: &str) -> Result<(), RendererError> {
        if channel == MASTER_CHANNEL {
            Ok(())
        } else {
            Err(RendererError::InvalidChannel(channel.to_string()))
        }
    }

    pub fn get_mute(&self, channel: &str) -> Result<bool, RendererError> {
        Self::check_channel(channel)?;
        Ok(false)
    }

    pub fn set_mute(&self, channel: &str, desired: bool) -> Result<(), RendererError> {
        Self::check_channel(channel)?;
        debug!(desired, "SetMute ignored");
        Ok(())
    }

    pub fn get_volume(&self, channel: &str) -> Result<u16, RendererError> {
        Self::check_channel(channel)?;
        Ok(DEFAULT_VOLUME)
    }

    pub fn set_volume(&self, channel: &str, desired: u16) -> Result<(), RendererError> {
        Self::check_channel(channel)?;
        if desired > MAX_VOLUME {
            return Err(RendererError::ArgumentError(format!(
                "Volume {} is out of range 0..={}",
                desired, MAX_VOLUME
            )));
        }
        debug!(desired, "SetVolume ignored");
        Ok(())
    }
}

impl EventedService for RenderingControl {
    fn service_name(&self) -> &str {
        SERVICE_NAME
    }

    fn lastchange_namespace(&self) -> &str {
        RENDERINGCONTROL_NAMESPACE
    }

    fn drain_events(&self) -> Result<Vec<ChangeEvent>, RendererError> {
        Ok(self.changes.lock().drain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_on_master() {
        let rc = RenderingControl::new();
        assert!(!rc.get_mute("Master").unwrap());
        assert_eq!(rc.get_volume("Master").unwrap(), 100);
        rc.set_mute("Master", true).unwrap();
        rc.set_volume("Master", 20).unwrap();
        // setters are no-ops
        assert!(!rc.get_mute("Master").unwrap());
        assert_eq!(rc.get_volume("Master").unwrap(), 100);
    }

    #[test]
    fn test_other_channels_rejected() {
        let rc = RenderingControl::new();
        assert!(matches!(rc.get_volume("LF"), Err(RendererError::InvalidChannel(_))));
        assert!(matches!(rc.set_mute("master", true), Err(RendererError::InvalidChannel(_))));
        assert!(matches!(
            rc.set_volume("Master", 101),
            Err(RendererError::ArgumentError(_))
        ));
    }

    #[test]
    fn test_initial_snapshot_then_empty() {
        let rc = RenderingControl::new();
        let first = rc.drain_events().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].variable, "Volume");
        assert_eq!(first[0].value, "100");
        assert!(rc.drain_events().unwrap().is_empty());
    }
}
