//! # PMORenderer Configuration Module
//!
//! This module provides configuration management for PMORenderer, including:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//!
//! There is no global instance: the binary loads one [`Config`] at startup and
//! hands it (or values derived from it) to whoever needs it.
//!
//! ## Usage
//!
//! ```no_run
//! use pmoconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let engine = config.get_string(&["renderer", "engine"], "mplayer");
//! config.set_value(&["renderer", "name"], "Living room".into())?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};
use uuid::Uuid;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmorenderer.yaml");

const ENV_CONFIG_DIR: &str = "PMORENDERER_CONFIG";
const ENV_PREFIX: &str = "PMORENDERER_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmorenderer";
const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;

/// Configuration manager for PMORenderer
///
/// Holds the merged YAML tree behind a lock so that a shared `Arc<Config>`
/// can still be updated. A configuration built with
/// [`from_yaml_str`](Self::from_yaml_str) has no backing file and is never
/// written to disk.
#[derive(Debug)]
pub struct Config {
    config_dir: Option<PathBuf>,
    path: Option<PathBuf>,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Creates the directory if needed and checks it is a writable directory.
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!("{} is not a directory", path.display()));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        Ok(())
    }

    /// Loads the configuration from the specified directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMORENDERER_CONFIG` environment variable
    /// 3. `.pmorenderer` in the current directory
    /// 4. `.pmorenderer` in the user's home directory
    ///
    /// The embedded defaults are merged with `config.yaml` when it exists,
    /// `PMORENDERER_CONFIG__SECTION__KEY=value` variables are applied on top,
    /// and the merged tree is written back so the user can edit it.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        Self::validate_config_dir(&config_dir)?;
        info!(config_dir = %config_dir.display(), "Using config directory");

        let path = config_dir.join(CONFIG_FILE_NAME);

        let mut merged: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        match fs::read(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external: Value = serde_yaml::from_slice(&data)?;
                merge_yaml(&mut merged, &external);
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using embedded defaults");
            }
        }

        let mut config_value = lower_keys_value(merged);
        apply_env_overrides(&mut config_value);

        let config = Config {
            config_dir: Some(config_dir),
            path: Some(path),
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration: defaults merged with `yaml`.
    ///
    /// Environment overrides are not applied, so the result only depends on
    /// its input.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut merged: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if !yaml.trim().is_empty() {
            let external: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut merged, &external);
        }

        Ok(Config {
            config_dir: None,
            path: None,
            data: Mutex::new(lower_keys_value(merged)),
        })
    }

    /// Directory the configuration was loaded from, if any.
    pub fn config_dir(&self) -> Option<&Path> {
        self.config_dir.as_deref()
    }

    /// Saves the current configuration to its `config.yaml` file.
    ///
    /// In-memory configurations have nothing to save and return `Ok(())`.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.data.lock())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["mpd", "port"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock();
            set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock();
        get_value_internal(&data, path)
    }

    /// String value at `path`, or `default` when missing or not a scalar.
    ///
    /// Numbers and booleans are accepted and rendered as strings, which lets
    /// environment overrides such as `PMORENDERER_CONFIG__MPD__HOST=10` work.
    pub fn get_string(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            Ok(Value::Number(n)) => n.to_string(),
            Ok(Value::Bool(b)) => b.to_string(),
            _ => default.to_string(),
        }
    }

    /// Unsigned integer at `path`.
    ///
    /// A missing key yields `default`; a present but unusable value is an
    /// error, so that a typo in the configuration is reported at startup.
    pub fn get_u64(&self, path: &[&str], default: u64) -> Result<u64> {
        match self.get_value(path) {
            Err(_) | Ok(Value::Null) => Ok(default),
            Ok(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| anyhow!("{} must be a non-negative integer, got {}", path.join("."), n)),
            Ok(Value::String(s)) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| anyhow!("{} must be a non-negative integer, got '{}'", path.join("."), s)),
            Ok(other) => Err(anyhow!("{} must be a non-negative integer, got {:?}", path.join("."), other)),
        }
    }

    /// Same as [`get_u64`](Self::get_u64), checked against the `u16` range.
    pub fn get_u16(&self, path: &[&str], default: u16) -> Result<u16> {
        let value = self.get_u64(path, u64::from(default))?;
        u16::try_from(value).map_err(|_| anyhow!("{} is out of range: {}", path.join("."), value))
    }

    /// Boolean at `path`, or `default` when missing or not a boolean.
    pub fn get_bool(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            Ok(Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => true,
                "false" | "no" | "0" => false,
                _ => default,
            },
            _ => default,
        }
    }

    /// List of strings at `path`.
    ///
    /// A single string is accepted as a one-element list, and a
    /// comma-separated string is split.
    pub fn get_string_list(&self, path: &[&str], default: &[&str]) -> Vec<String> {
        match self.get_value(path) {
            Ok(Value::Sequence(seq)) => seq
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            Ok(Value::String(s)) => s
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Sets an unsigned integer value.
    pub fn set_u64(&self, path: &[&str], value: u64) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value)))
    }

    /// Gets the UDN (Unique Device Name) for a device, generating one if it doesn't exist
    ///
    /// The UDN is stored without its `uuid:` prefix.
    pub fn get_device_udn(&self, devtype: &str, name: &str) -> Result<String> {
        let path = &["devices", devtype, name, "udn"];
        match self.get_value(path) {
            Ok(Value::String(udn)) => {
                let udn = udn.trim();
                Ok(udn.strip_prefix("uuid:").unwrap_or(udn).to_string())
            }
            _ => {
                let new_udn = Uuid::new_v4().to_string();
                self.set_value(path, Value::String(new_udn.clone()))?;
                Ok(new_udn)
            }
        }
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> String {
        self.get_string(&["host", "logger", "min_level"], DEFAULT_LOG_MIN_LEVEL)
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }

    /// Indique si les logs doivent être affichés sur la console
    pub fn get_log_enable_console(&self) -> bool {
        self.get_bool(&["host", "logger", "enable_console"], DEFAULT_LOG_ENABLE_CONSOLE)
    }
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
    let mut current = data;
    for (i, key) in path.iter().enumerate() {
        match current {
            Value::Mapping(map) => match map.get(Value::String(key.to_lowercase())) {
                Some(next) => current = next,
                None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
            },
            _ => return Err(anyhow!("Path {} is not a map", path[..i].join("."))),
        }
    }
    Ok(current.clone())
}

fn apply_env_overrides(config: &mut Value) {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = convert_env_value(&value);
            if let Err(err) = set_value_internal(config, &key_path, yaml_value) {
                warn!(variable = %key, "Ignoring environment override: {}", err);
            }
        }
    }
}

fn convert_env_value(value: &str) -> Value {
    serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(key, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges external YAML configuration into default configuration
///
/// Mappings are merged key by key; scalars and sequences from `external`
/// replace the default value.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
