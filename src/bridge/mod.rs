use std::fmt;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::zigbee_payload::ColorPayload;

use self::registry::Mode;

pub mod registry;
pub mod sync;
pub mod throttle;
pub mod transform;

/// Failure conditions with a contract attached to them. Everything else
/// travels as an eyre report.
#[derive(Clone, Debug)]
pub enum BridgeError {
    SourceUnavailable,
    PublishFailed { device: String, cause: String },
    InvalidConfig { device: String, reason: String },
    ModeMismatch { device: String },
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::SourceUnavailable => {
                write!(f, "no color sample available from the capture source")
            }
            BridgeError::PublishFailed { device, cause } => {
                write!(f, "publish to device '{device}' failed: {cause}")
            }
            BridgeError::InvalidConfig { device, reason } => {
                write!(f, "invalid configuration for device '{device}': {reason}")
            }
            BridgeError::ModeMismatch { device } => {
                write!(
                    f,
                    "manual command for device '{device}' rejected: device is in sync mode"
                )
            }
        }
    }
}

impl std::error::Error for BridgeError {}

/// Explicit user command for a device in manual mode. Immediately
/// authoritative; bypasses the color transform entirely.
#[derive(Builder, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[builder(setter(into, strip_option), default)]
pub struct ManualCommand {
    pub name: String,
    pub state: Option<String>,
    pub brightness: Option<u8>,
    pub color: Option<ColorPayload>,
    pub color_temp: Option<u16>,
}

/// Inbound messages for the bridge loop. All of them are drained between
/// sync cycles, so mode transitions and tuning changes take effect at a
/// cycle boundary and never interleave with an in-flight publish.
#[derive(Clone, Debug)]
pub enum BridgeMessage {
    Manual(ManualCommand),
    SetMode { name: String, mode: Mode },
    SetMultiplier { name: String, value: f32 },
    SetWarmth(f32),
    SetThrottle(Duration),
}
