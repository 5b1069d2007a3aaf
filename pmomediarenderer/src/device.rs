//! Définition du device MediaRenderer.
//!
//! Le device assemble les trois services obligatoires autour d'une unique
//! fabrique de moteurs, et possède le notifier qui pousse les LastChange
//! vers la pile UPnP.

use std::{path::PathBuf, sync::Arc, time::Duration};

use tracing::info;

use crate::{
    avtransport::TransportController,
    config_ext::RendererSettings,
    connectionmanager::ConnectionManager,
    factory::EngineFactory,
    notifier::{ChangeNotifier, EventTransport, EventedService},
    probe::{HttpProbe, ReachabilityProbe},
    renderingcontrol::RenderingControl,
};

pub const DEVICE_TYPE: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
pub const MANUFACTURER: &str = "PMOMusic";
pub const MODEL_NAME: &str = "CliMediaRenderer";
pub const MODEL_DESCRIPTION: &str = "Commandline UPnP/DLNA media renderer/DMR";
pub const MODEL_NUMBER: &str = "1.0";

/// Icon advertised in the device description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIcon {
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub path: PathBuf,
}

/// Fields of the device description document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDetails {
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub model_description: String,
    pub model_number: String,
    pub udn: String,
    pub icon: DeviceIcon,
}

impl DeviceDetails {
    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self {
            device_type: DEVICE_TYPE.to_string(),
            friendly_name: settings.name.clone(),
            manufacturer: MANUFACTURER.to_string(),
            model_name: MODEL_NAME.to_string(),
            model_description: MODEL_DESCRIPTION.to_string(),
            model_number: MODEL_NUMBER.to_string(),
            udn: format!("uuid:{}", settings.udn),
            icon: DeviceIcon {
                mime_type: "image/png".to_string(),
                width: 48,
                height: 48,
                depth: 8,
                path: settings.icon.clone(),
            },
        }
    }
}

/// Device MediaRenderer UPnP.
///
/// # Services inclus
///
/// - **AVTransport:1** : Contrôle de la lecture
/// - **RenderingControl:1** : Volume et mute (valeurs fixes)
/// - **ConnectionManager:1** : Formats acceptés
///
/// # Exemple
///
/// ```ignore
/// use pmomediarenderer::{ChannelTransport, MediaRendererDevice, RendererSettings};
///
/// let mut device = MediaRendererDevice::new(RendererSettings::default());
/// let (transport, mut rx) = ChannelTransport::new(64);
/// device.start(Arc::new(transport));
/// device.avtransport().set_transport_uri("http://nas/track.flac", "")?;
/// device.avtransport().play("1")?;
/// ```
pub struct MediaRendererDevice {
    details: DeviceDetails,
    notify_interval: Duration,
    avtransport: Arc<TransportController>,
    renderingcontrol: Arc<RenderingControl>,
    connectionmanager: Arc<ConnectionManager>,
    notifier: Option<ChangeNotifier>,
}

impl MediaRendererDevice {
    pub fn new(settings: RendererSettings) -> Self {
        let factory = Arc::new(EngineFactory::new(settings.engine.clone()));
        let probe: Arc<dyn ReachabilityProbe> = Arc::new(HttpProbe::new(settings.probe_timeout));
        Self::with_parts(&settings, factory, probe)
    }

    /// Builds the device around an existing factory and probe.
    pub fn with_parts(
        settings: &RendererSettings,
        factory: Arc<EngineFactory>,
        probe: Arc<dyn ReachabilityProbe>,
    ) -> Self {
        let avtransport = TransportController::new(
            factory,
            probe,
            settings.schemes.clone(),
            settings.lock_timeout,
        );
        Self {
            details: DeviceDetails::from_settings(settings),
            notify_interval: settings.notify_interval,
            avtransport: Arc::new(avtransport),
            renderingcontrol: Arc::new(RenderingControl::new()),
            connectionmanager: Arc::new(ConnectionManager::default()),
            notifier: None,
        }
    }

    pub fn details(&self) -> &DeviceDetails {
        &self.details
    }

    pub fn avtransport(&self) -> &Arc<TransportController> {
        &self.avtransport
    }

    pub fn renderingcontrol(&self) -> &Arc<RenderingControl> {
        &self.renderingcontrol
    }

    pub fn connectionmanager(&self) -> &Arc<ConnectionManager> {
        &self.connectionmanager
    }

    pub fn is_running(&self) -> bool {
        self.notifier.as_ref().is_some_and(|n| n.is_running())
    }

    /// Démarre le notifier des services évènementiels
    ///
    /// Sans effet si le notifier tourne déjà. Doit être appelé depuis un
    /// runtime Tokio.
    pub fn start(&mut self, transport: Arc<dyn EventTransport>) {
        if self.notifier.is_some() {
            return;
        }
        let services: Vec<Arc<dyn EventedService>> = vec![
            self.avtransport.clone(),
            self.renderingcontrol.clone(),
        ];
        self.notifier = Some(ChangeNotifier::start(
            services,
            transport,
            self.notify_interval,
        ));
        info!(
            "✅ MediaRenderer '{}' ready ({})",
            self.details.friendly_name, self.details.udn
        );
    }

    /// Arrête le notifier, la lecture, puis libère le moteur
    pub async fn shutdown(&mut self) {
        if let Some(notifier) = self.notifier.take() {
            notifier.shutdown().await;
        }
        let avtransport = self.avtransport.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || avtransport.shutdown()).await {
            tracing::error!("Transport shutdown panicked: {}", err);
        }
        info!("MediaRenderer '{}' stopped", self.details.friendly_name);
    }
}
