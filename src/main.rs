use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use log::info;
use tokio::sync::{mpsc, watch};

use crate::bridge::registry::DeviceRegistry;
use crate::bridge::sync::{BridgeLoop, Tuning};
use crate::hyperion::stream::start_hyperion_stream;
use crate::protocols::mqtt::{mk_mqtt_client, MqttPublisher};
use crate::settings::{read_settings, Settings};

mod bridge;
mod hyperion;
mod protocols;
mod settings;
mod zigbee_payload;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    pretty_env_logger::init();

    let settings = read_settings()?;
    let registry = Arc::new(DeviceRegistry::from_settings(&settings.devices)?);
    log_startup(&settings, &registry);

    let (bridge_tx, bridge_rx) = mpsc::channel(16);
    let (stop_tx, stop_rx) = watch::channel(false);

    let mqtt_client = mk_mqtt_client(&settings, bridge_tx.clone()).await?;
    let source = start_hyperion_stream(&settings, stop_rx.clone());
    let publisher = MqttPublisher::new(&mqtt_client);

    let tuning = Tuning {
        warmth: settings.bridge.warmth.clamp(0.0, 1.0),
        throttle: Duration::from_millis(settings.bridge.throttle_ms),
        transition: settings.bridge.transition,
    };

    let bridge = BridgeLoop::new(
        source,
        publisher,
        registry,
        tuning,
        Duration::from_millis(settings.bridge.tick_ms),
        bridge_rx,
        stop_rx,
    );
    let bridge_task = tokio::spawn(bridge.run());

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = stop_tx.send(true);
    bridge_task.await?;

    Ok(())
}

fn log_startup(settings: &Settings, registry: &DeviceRegistry) {
    info!("Hyperion -> Zigbee2MQTT bridge");
    info!("Hyperion: ws://{}/json-rpc", settings.hyperion.addr);
    info!("MQTT broker: {}:{}", settings.mqtt.host, settings.mqtt.port);

    for device in registry.all() {
        let brightness = if device.brightness_multiplier == -1.0 {
            "Max".to_string()
        } else {
            format!("{}%", (device.brightness_multiplier * 100.0).round())
        };
        info!(
            "  {} ({}, {}) [{}]",
            device.name,
            device.kind.as_str(),
            brightness,
            device.mode.as_str()
        );
    }

    info!(
        "throttle: one update per {}ms, warmth {}",
        settings.bridge.throttle_ms, settings.bridge.warmth
    );
}
