//! Extension pour intégrer la configuration du renderer dans pmoconfig
//!
//! Ce module fournit le trait `RendererConfigExt`, qui lit les sections
//! `renderer`, `mplayer`, `vlc` et `mpd` de `pmoconfig::Config` et les
//! convertit en un [`RendererSettings`] typé. Le cœur du renderer ne voit
//! jamais la configuration brute.

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use pmoconfig::Config;

use crate::engine::{DaemonSettings, EngineKind, EngineSettings, NativeSettings, ProcessSettings};

// Constantes par défaut
pub const DEFAULT_RENDERER_NAME: &str = "CliMediaRenderer";
pub const DEFAULT_ICON_PATH: &str = "icon.png";
pub const DEFAULT_ENGINE: &str = "mplayer";
pub const DEFAULT_NOTIFY_INTERVAL_MS: u64 = 250;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_SCHEMES: &[&str] = &["http", "https"];

const DEFAULT_MPLAYER_PATH: &str = "mplayer";
const DEFAULT_MPLAYER_ARGS: &[&str] = &["-slave", "-quiet", "-idle", "-msglevel", "global=6"];
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 500;
const DEFAULT_VLC_LIBRARY_PATH: &str = "/usr/lib";
const DEFAULT_MPD_HOST: &str = "localhost";
const DEFAULT_MPD_PORT: u16 = 6600;
const DEFAULT_MPD_TIMEOUT_MS: u64 = 3000;

const DEVICE_TYPE: &str = "mediarenderer";

/// Typed renderer configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RendererSettings {
    pub name: String,
    pub icon: PathBuf,
    pub udn: String,
    pub schemes: Vec<String>,
    pub notify_interval: Duration,
    pub lock_timeout: Duration,
    pub probe_timeout: Duration,
    pub engine: EngineSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_RENDERER_NAME.to_string(),
            icon: PathBuf::from(DEFAULT_ICON_PATH),
            udn: uuid::Uuid::new_v4().to_string(),
            schemes: DEFAULT_SCHEMES.iter().map(|s| s.to_string()).collect(),
            notify_interval: Duration::from_millis(DEFAULT_NOTIFY_INTERVAL_MS),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            engine: EngineSettings::default(),
        }
    }
}

/// Trait d'extension pour ajouter la configuration du renderer à pmoconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::Config;
/// use pmomediarenderer::RendererConfigExt;
///
/// let config = Config::load_config("")?;
/// let settings = config.get_renderer_settings()?;
/// ```
pub trait RendererConfigExt {
    /// Sélecteur de moteur (`renderer.engine`), validé
    ///
    /// # Errors
    ///
    /// `UnknownEngineType` si la valeur n'est pas reconnue.
    fn get_renderer_engine(&self) -> Result<EngineKind>;

    /// Nom affiché du renderer (défaut: "CliMediaRenderer")
    fn get_renderer_name(&self) -> String;

    /// Définit le nom affiché du renderer
    fn set_renderer_name(&self, name: String) -> Result<()>;

    /// Intervalle du notifier (défaut: 250 ms)
    fn get_notify_interval(&self) -> Result<Duration>;

    /// Construit l'ensemble des réglages typés
    ///
    /// L'UDN est lu dans `devices.mediarenderer.<name>.udn`, ou généré et
    /// sauvegardé au premier appel.
    fn get_renderer_settings(&self) -> Result<RendererSettings>;
}

impl RendererConfigExt for Config {
    fn get_renderer_engine(&self) -> Result<EngineKind> {
        let raw = self.get_string(&["renderer", "engine"], DEFAULT_ENGINE);
        raw.parse::<EngineKind>()
            .with_context(|| "renderer.engine must be one of mplayer, vlc, mpd")
    }

    fn get_renderer_name(&self) -> String {
        let name = self.get_string(&["renderer", "name"], DEFAULT_RENDERER_NAME);
        if name.trim().is_empty() {
            DEFAULT_RENDERER_NAME.to_string()
        } else {
            name
        }
    }

    fn set_renderer_name(&self, name: String) -> Result<()> {
        self.set_value(&["renderer", "name"], serde_yaml::Value::String(name))
    }

    fn get_notify_interval(&self) -> Result<Duration> {
        let ms = self.get_u64(&["renderer", "notify_interval_ms"], DEFAULT_NOTIFY_INTERVAL_MS)?;
        anyhow::ensure!(ms > 0, "renderer.notify_interval_ms must be positive");
        Ok(Duration::from_millis(ms))
    }

    fn get_renderer_settings(&self) -> Result<RendererSettings> {
        let kind = self.get_renderer_engine()?;
        let name = self.get_renderer_name();

        let engine = EngineSettings {
            kind,
            process: ProcessSettings {
                path: self.get_string(&["mplayer", "path"], DEFAULT_MPLAYER_PATH),
                args: self.get_string_list(&["mplayer", "args"], DEFAULT_MPLAYER_ARGS),
                query_timeout: Duration::from_millis(
                    self.get_u64(&["mplayer", "query_timeout_ms"], DEFAULT_QUERY_TIMEOUT_MS)?,
                ),
            },
            native: NativeSettings {
                library_path: std::env::split_paths(&self.get_string(
                    &["vlc", "library_path"],
                    DEFAULT_VLC_LIBRARY_PATH,
                ))
                .collect(),
            },
            daemon: DaemonSettings {
                host: self.get_string(&["mpd", "host"], DEFAULT_MPD_HOST),
                port: self.get_u16(&["mpd", "port"], DEFAULT_MPD_PORT)?,
                timeout: Duration::from_millis(
                    self.get_u64(&["mpd", "timeout_ms"], DEFAULT_MPD_TIMEOUT_MS)?,
                ),
            },
        };

        let schemes = self.get_string_list(&["renderer", "schemes"], DEFAULT_SCHEMES);
        anyhow::ensure!(!schemes.is_empty(), "renderer.schemes must not be empty");

        let icon = PathBuf::from(self.get_string(&["renderer", "icon"], DEFAULT_ICON_PATH));
        let icon = match (icon.is_relative(), self.config_dir()) {
            (true, Some(dir)) => dir.join(icon),
            _ => icon,
        };

        Ok(RendererSettings {
            udn: self.get_device_udn(DEVICE_TYPE, &name)?,
            name,
            icon,
            schemes,
            notify_interval: self.get_notify_interval()?,
            lock_timeout: Duration::from_millis(
                self.get_u64(&["renderer", "lock_timeout_ms"], DEFAULT_LOCK_TIMEOUT_MS)?,
            ),
            probe_timeout: Duration::from_millis(
                self.get_u64(&["renderer", "probe_timeout_ms"], DEFAULT_PROBE_TIMEOUT_MS)?,
            ),
            engine,
        })
    }
}
