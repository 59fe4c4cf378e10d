use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::device::{LinkConfig, DEFAULT_SETTLE_DELAY};
use crate::risk::GradingPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceSettings {
    /// Probe paired last, offered for one-tap reconnect.
    pub last_address: Option<String>,
    pub settle_delay_ms: u64,
    /// Keep the link up when a limb screen is closed.
    pub keep_alive_on_leave: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            last_address: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY.as_millis() as u64,
            keep_alive_on_leave: false,
        }
    }
}

impl DeviceSettings {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DisplaySettings {
    pub dark_theme: bool,
    /// 0 = off, otherwise the palette variant.
    pub color_blind_mode: u8,
    pub font_scale: f32,
    pub language: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            dark_theme: true,
            color_blind_mode: 0,
            font_scale: 1.0,
            language: "pt".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    device: DeviceSettings,
    grading: GradingPolicy,
    display: DisplaySettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path`; an unreadable or corrupt file falls back to defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring corrupt settings at {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn device(&self) -> DeviceSettings {
        self.read().device.clone()
    }

    pub fn grading(&self) -> GradingPolicy {
        self.read().grading
    }

    pub fn display(&self) -> DisplaySettings {
        self.read().display.clone()
    }

    pub fn update_device(&self, settings: DeviceSettings) -> Result<()> {
        self.update(|data| data.device = settings)
    }

    /// Remembers the probe that just connected.
    pub fn remember_address(&self, address: &str) -> Result<()> {
        let address = address.to_string();
        self.update(|data| data.device.last_address = Some(address))
    }

    pub fn update_grading(&self, policy: GradingPolicy) -> Result<()> {
        self.update(|data| data.grading = policy)
    }

    pub fn update_display(&self, settings: DisplaySettings) -> Result<()> {
        self.update(|data| data.display = settings)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = data;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, UserSettings> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<F: FnOnce(&mut UserSettings)>(&self, apply: F) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
