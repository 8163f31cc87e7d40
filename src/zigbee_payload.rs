use serde::{Deserialize, Serialize};

use crate::bridge::transform::OutputCommand;
use crate::bridge::ManualCommand;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ColorPayload {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// The Zigbee2MQTT "set" payload. Field names must match the Zigbee2MQTT
/// schema exactly; the firmware silently drops fields it does not know.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct LightPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// 1-254.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorPayload>,

    /// Color temperature in mireds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_temp: Option<u16>,

    /// Transition time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<f32>,
}

impl LightPayload {
    pub fn from_output(command: &OutputCommand, transition: f32) -> Self {
        let mut payload = LightPayload {
            state: Some("ON".to_string()),
            transition: Some(transition),
            ..Default::default()
        };

        match *command {
            OutputCommand::Rgb { color, brightness } => {
                payload.brightness = Some(brightness);
                payload.color = Some(ColorPayload {
                    r: color.red,
                    g: color.green,
                    b: color.blue,
                });
            }
            OutputCommand::Cct { mireds, brightness } => {
                payload.brightness = Some(brightness);
                payload.color_temp = Some(mireds);
            }
        }

        payload
    }

    /// Manual commands pass through as-is; no transition is applied so the
    /// light reacts immediately to the user.
    pub fn from_manual(command: &ManualCommand) -> Self {
        LightPayload {
            state: command.state.clone(),
            brightness: command.brightness,
            color: command.color,
            color_temp: command.color_temp,
            transition: None,
        }
    }
}
