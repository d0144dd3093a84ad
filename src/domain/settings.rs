use crate::domain::models::{DeviceAddress, PairedDevice};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Logging configuration. `level` applies to this crate's targets;
/// everything else (tokio, other libraries) logs at `dependency_level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_dependency_level")]
    pub dependency_level: String,
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            dependency_level: default_dependency_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_dependency_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "aura_pairing".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingSettings {
    /// Advertised name prefix that marks a device as an Aura sensor.
    #[serde(default = "default_name_prefix")]
    pub device_name_prefix: String,
    #[serde(default)]
    pub known_device_addresses: Vec<DeviceAddress>,
    #[serde(default)]
    pub last_paired_device: Option<PairedDevice>,
    /// Weakest signal accepted by automatic pairing, in dBm.
    #[serde(default = "default_min_rssi")]
    pub min_rssi: i16,
    /// Publish `Disconnected` even when ending pairing while already unpaired.
    #[serde(default = "default_false")]
    pub notify_redundant_disconnect: bool,
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            device_name_prefix: default_name_prefix(),
            known_device_addresses: Vec::new(),
            last_paired_device: None,
            min_rssi: default_min_rssi(),
            notify_redundant_disconnect: default_false(),
        }
    }
}

fn default_name_prefix() -> String {
    "Aura".to_string()
}
fn default_min_rssi() -> i16 {
    -90
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,
    #[serde(default)]
    pub pairing: PairingSettings,
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults when it
    /// is missing or unreadable.
    pub fn with_path(settings_path: impl Into<PathBuf>) -> Self {
        let settings_path = settings_path.into();
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("AuraDevicePairing");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_paired_device(&mut self, device: &PairedDevice) -> anyhow::Result<()> {
        let pairing = &mut self.settings.pairing;
        if !pairing.known_device_addresses.contains(&device.address) {
            pairing.known_device_addresses.push(device.address);
        }
        pairing.last_paired_device = Some(device.clone());
        self.save()
    }
}
