//! Module MediaRenderer UPnP.
//!
//! Ce crate implémente le cœur d'un MediaRenderer UPnP audio piloté par un
//! lecteur externe. Un point de contrôle choisit un flux réseau, puis
//! demande la lecture, la pause ou l'arrêt ; le renderer délègue la
//! lecture réelle à l'un des trois moteurs disponibles.
//!
//! # Architecture
//!
//! - **AVTransport** : machine d'états de transport ([`TransportController`])
//! - **RenderingControl** : volume et mute figés ([`RenderingControl`])
//! - **ConnectionManager** : formats acceptés ([`ConnectionManager`])
//! - **Moteurs** : MPlayer en mode esclave, libvlc chargée dynamiquement,
//!   ou serveur MPD ([`PlaybackEngine`])
//! - **Notifier** : envoi périodique des LastChange ([`ChangeNotifier`])
//!
//! # Device UPnP
//!
//! - Type : `urn:schemas-upnp-org:device:MediaRenderer:1`
//! - Services : AVTransport:1, RenderingControl:1, ConnectionManager:1
//!
//! # Utilisation
//!
//! ```ignore
//! use pmoconfig::Config;
//! use pmomediarenderer::{MediaRendererDevice, RendererConfigExt};
//!
//! let config = Config::load_config("")?;
//! let device = MediaRendererDevice::new(config.get_renderer_settings()?);
//! device.avtransport().set_transport_uri("http://nas/track.flac", "")?;
//! device.avtransport().play("1")?;
//! ```

pub mod avtransport;
pub mod config_ext;
pub mod connectionmanager;
pub mod device;
pub mod didl;
pub mod engine;
pub mod errors;
pub mod factory;
pub mod lastchange;
pub mod model;
pub mod notifier;
pub mod probe;
pub mod renderingcontrol;
pub mod time_utils;

pub use avtransport::{TransportController, TransportSnapshot};
pub use config_ext::{RendererConfigExt, RendererSettings};
pub use connectionmanager::ConnectionManager;
pub use device::{DeviceDetails, MediaRendererDevice};
pub use engine::{EngineKind, EngineSettings, PlaybackEngine, PlaybackPosition, TransportControl};
pub use errors::{PlayerError, RendererError};
pub use factory::EngineFactory;
pub use lastchange::LastChangeBatch;
pub use model::{
    ChangeEvent, MediaInfo, MediaItem, PositionInfo, PositionSnapshot, TransportAction,
    TransportInfo, TransportState,
};
pub use notifier::{ChangeNotifier, ChannelTransport, EventTransport, EventedService};
pub use probe::{HttpProbe, ReachabilityProbe};
pub use renderingcontrol::RenderingControl;
