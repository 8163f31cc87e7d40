use std::collections::HashMap;
use std::sync::RwLock;

use color_eyre::Result;
use eyre::eyre;
use log::warn;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::bridge::transform::OutputCommand;
use crate::bridge::BridgeError;
use crate::settings::DeviceSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Sync,
    Manual,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Manual => "manual",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Rgb,
    Cct,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Rgb => "rgb",
            DeviceType::Cct => "cct",
        }
    }
}

/// Per-device configuration plus the runtime state the throttler needs.
#[derive(Clone, Debug)]
pub struct Device {
    pub name: String,
    pub topic: String,
    pub kind: DeviceType,
    pub brightness_multiplier: f32,
    pub mode: Mode,

    /// Last command actually sent, used for dedup. Cleared on the
    /// manual -> sync transition so the first post-transition publish is
    /// never suppressed.
    pub last_sent_color: Option<OutputCommand>,
    pub last_sent_at: Option<Instant>,
}

fn valid_multiplier(value: f32) -> bool {
    value == -1.0 || (0.0..=1.0).contains(&value)
}

impl Device {
    fn from_entry(entry: &DeviceSettings) -> Result<Self, BridgeError> {
        let invalid = |reason: &str| BridgeError::InvalidConfig {
            device: entry.name.clone(),
            reason: reason.to_string(),
        };

        if entry.name.is_empty() {
            return Err(invalid("missing name"));
        }

        let topic = entry
            .topic
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| invalid("missing topic"))?
            .to_string();

        let kind = match entry.kind.as_deref() {
            Some("rgb") => DeviceType::Rgb,
            Some("cct") => DeviceType::Cct,
            Some(other) => return Err(invalid(&format!("unknown device type '{other}'"))),
            None => return Err(invalid("missing type")),
        };

        let brightness_multiplier = entry.brightness_multiplier.unwrap_or(1.0);
        if !valid_multiplier(brightness_multiplier) {
            return Err(invalid(&format!(
                "brightness_multiplier must be -1 or within [0.0, 1.0], got {brightness_multiplier}"
            )));
        }

        let mode = match entry.mode.as_deref() {
            None | Some("sync") => Mode::Sync,
            Some("manual") => Mode::Manual,
            Some(other) => return Err(invalid(&format!("unknown mode '{other}'"))),
        };

        Ok(Device {
            name: entry.name.clone(),
            topic,
            kind,
            brightness_multiplier,
            mode,
            last_sent_color: None,
            last_sent_at: None,
        })
    }
}

/// Thread-safe name -> device map. One lock covers mode mutation and the
/// sync-device listing, so a device is never observed as both excluded
/// from sync and receiving a sync update.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Device>>,
}

impl DeviceRegistry {
    /// Builds the registry from configuration, skipping malformed entries
    /// with a warning. Zero valid devices is a startup-fatal condition.
    pub fn from_settings(entries: &[DeviceSettings]) -> Result<Self> {
        let mut devices = HashMap::new();

        for entry in entries {
            match Device::from_entry(entry) {
                Ok(device) => {
                    if devices.insert(device.name.clone(), device).is_some() {
                        warn!("duplicate device name '{}', keeping the last entry", entry.name);
                    }
                }
                Err(e) => warn!("skipping device: {e}"),
            }
        }

        if devices.is_empty() {
            return Err(eyre!("no valid devices configured"));
        }

        Ok(DeviceRegistry {
            devices: RwLock::new(devices),
        })
    }

    pub fn get(&self, name: &str) -> Option<Device> {
        self.devices.read().unwrap().get(name).cloned()
    }

    /// All devices, sorted by name for stable log output.
    pub fn all(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.read().unwrap().values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    /// Devices currently driven by the sync cycle.
    pub fn list_sync_devices(&self) -> Vec<Device> {
        self.devices
            .read()
            .unwrap()
            .values()
            .filter(|d| d.mode == Mode::Sync)
            .cloned()
            .collect()
    }

    pub fn set_mode(&self, name: &str, mode: Mode) -> Result<(), BridgeError> {
        let mut devices = self.devices.write().unwrap();
        let device = devices.get_mut(name).ok_or_else(|| BridgeError::InvalidConfig {
            device: name.to_string(),
            reason: "not configured".to_string(),
        })?;

        if device.mode == Mode::Manual && mode == Mode::Sync {
            // Invalidate the dedup cache so the first sync publish after
            // the switch is not suppressed as a duplicate.
            device.last_sent_color = None;
        }
        device.mode = mode;

        Ok(())
    }

    pub fn set_multiplier(&self, name: &str, value: f32) -> Result<(), BridgeError> {
        if !valid_multiplier(value) {
            return Err(BridgeError::InvalidConfig {
                device: name.to_string(),
                reason: format!(
                    "brightness_multiplier must be -1 or within [0.0, 1.0], got {value}"
                ),
            });
        }

        let mut devices = self.devices.write().unwrap();
        let device = devices.get_mut(name).ok_or_else(|| BridgeError::InvalidConfig {
            device: name.to_string(),
            reason: "not configured".to_string(),
        })?;
        device.brightness_multiplier = value;

        Ok(())
    }

    /// Stamps the throttle/dedup state after a successful publish.
    pub fn mark_sent(&self, name: &str, command: OutputCommand, at: Instant) {
        if let Some(device) = self.devices.write().unwrap().get_mut(name) {
            device.last_sent_color = Some(command);
            device.last_sent_at = Some(at);
        }
    }
}
