use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct HyperionSettings {
    /// Address (host:port) of the Hyperion JSON-RPC websocket endpoint.
    pub addr: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct MqttSettings {
    pub id: String,
    pub host: String,
    pub port: u16,

    /// Topic template the bridge subscribes to for manual commands, mode
    /// toggles and tuning changes. `{name}` is replaced with `+`.
    pub control_topic: String,
}

#[derive(Clone, Deserialize, Debug)]
pub struct BridgeSettings {
    /// Warmth blend factor, 0.0 (unchanged) to 1.0 (pure anchor color).
    #[serde(default)]
    pub warmth: f32,

    /// Minimum interval between publishes to one device.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Sync cycle scheduler tick, independent of Hyperion's frame rate.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Transition time (seconds) forwarded to the lights on sync updates.
    #[serde(default = "default_transition")]
    pub transition: f32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            warmth: 0.0,
            throttle_ms: default_throttle_ms(),
            tick_ms: default_tick_ms(),
            transition: default_transition(),
        }
    }
}

fn default_throttle_ms() -> u64 {
    1000
}

fn default_tick_ms() -> u64 {
    100
}

fn default_transition() -> f32 {
    0.1
}

/// One configured light. Fields other than `name` are validated when the
/// device registry is built, so a single malformed entry does not take
/// down the rest of the device list.
#[derive(Clone, Default, Deserialize, Debug)]
pub struct DeviceSettings {
    pub name: String,
    pub topic: Option<String>,

    /// "rgb" or "cct".
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// 1.0 = 100%, fractional values scale down, -1 forces hardware max.
    pub brightness_multiplier: Option<f32>,

    /// Initial mode, "sync" (default) or "manual".
    pub mode: Option<String>,
}

#[derive(Clone, Deserialize, Debug)]
pub struct Settings {
    pub hyperion: HyperionSettings,
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub bridge: BridgeSettings,
    pub devices: Vec<DeviceSettings>,
}

pub fn read_settings() -> Result<Settings, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name("Settings"))
        .build()?
        .try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Settings {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn parses_full_settings_document() {
        let settings = parse(
            r#"
            [hyperion]
            addr = "127.0.0.1:8090"

            [mqtt]
            id = "hyperion2mqtt"
            host = "127.0.0.1"
            port = 1883
            control_topic = "hyperion2mqtt/{name}/set"

            [bridge]
            warmth = 0.4
            throttle_ms = 500

            [[devices]]
            name = "Desk"
            topic = "zigbee2mqtt/desk/set"
            type = "rgb"
            brightness_multiplier = 1.0

            [[devices]]
            name = "Shelf"
            topic = "zigbee2mqtt/shelf/set"
            type = "cct"
            brightness_multiplier = -1
            mode = "manual"
        "#,
        );

        assert_eq!(settings.hyperion.addr, "127.0.0.1:8090");
        assert_eq!(settings.bridge.warmth, 0.4);
        assert_eq!(settings.bridge.throttle_ms, 500);
        // Unset tuning values fall back to defaults
        assert_eq!(settings.bridge.tick_ms, 100);
        assert_eq!(settings.devices.len(), 2);
        assert_eq!(settings.devices[1].brightness_multiplier, Some(-1.0));
        assert_eq!(settings.devices[1].mode.as_deref(), Some("manual"));
    }

    #[test]
    fn bridge_section_is_optional() {
        let settings = parse(
            r#"
            [hyperion]
            addr = "127.0.0.1:8090"

            [mqtt]
            id = "hyperion2mqtt"
            host = "127.0.0.1"
            port = 1883
            control_topic = "hyperion2mqtt/{name}/set"

            [[devices]]
            name = "Desk"
        "#,
        );

        assert_eq!(settings.bridge.throttle_ms, 1000);
        assert_eq!(settings.bridge.transition, 0.1);
        assert!(settings.devices[0].topic.is_none());
    }
}
