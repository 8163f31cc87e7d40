use std::future::Future;
use std::time::Duration;

use color_eyre::Result;
use log::warn;
use rand::Rng;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task;
use tokio::time::timeout;

use crate::bridge::registry::Mode;
use crate::bridge::sync::CommandPublisher;
use crate::bridge::{BridgeError, BridgeMessage, ManualCommand};
use crate::settings::Settings;
use crate::zigbee_payload::LightPayload;

// Long keep-alive so a brief broker hiccup does not drop the session
const KEEP_ALIVE: Duration = Duration::from_secs(120);
const SEND_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct MqttClient {
    pub client: AsyncClient,
}

/// Control messages arriving on the set-topic wildcard. Untagged: the
/// variants are tried in order, so the shape of the payload decides.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ControlPayload {
    SetMode { name: String, mode: Mode },
    SetMultiplier { name: String, brightness_multiplier: f32 },
    SetWarmth { warmth: f32 },
    SetThrottle { throttle_ms: u64 },
    Manual(ManualCommand),
}

impl From<ControlPayload> for BridgeMessage {
    fn from(payload: ControlPayload) -> Self {
        match payload {
            ControlPayload::SetMode { name, mode } => BridgeMessage::SetMode { name, mode },
            ControlPayload::SetMultiplier {
                name,
                brightness_multiplier,
            } => BridgeMessage::SetMultiplier {
                name,
                value: brightness_multiplier,
            },
            ControlPayload::SetWarmth { warmth } => BridgeMessage::SetWarmth(warmth),
            ControlPayload::SetThrottle { throttle_ms } => {
                BridgeMessage::SetThrottle(Duration::from_millis(throttle_ms))
            }
            ControlPayload::Manual(command) => BridgeMessage::Manual(command),
        }
    }
}

/// Connects to the broker, subscribes to the control topic and spawns
/// the eventloop task that forwards inbound control payloads to the
/// bridge loop.
pub async fn mk_mqtt_client(
    settings: &Settings,
    bridge_tx: mpsc::Sender<BridgeMessage>,
) -> Result<MqttClient> {
    // Random suffix so a lingering session on the broker never kicks us
    let client_id = format!(
        "{}-{:04}",
        settings.mqtt.id,
        rand::thread_rng().gen_range(1000..10000)
    );

    let mut options = MqttOptions::new(client_id, settings.mqtt.host.clone(), settings.mqtt.port);
    options.set_keep_alive(KEEP_ALIVE);
    let (client, mut eventloop) = AsyncClient::new(options, 10);

    let control_filter = settings.mqtt.control_topic.replace("{name}", "+");
    client
        .subscribe(control_filter.clone(), QoS::AtMostOnce)
        .await?;

    {
        let client = client.clone();
        task::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(notification) => {
                        let res =
                            handle_incoming(notification, &client, &control_filter, &bridge_tx)
                                .await;

                        if let Err(e) = res {
                            warn!("MQTT error: {e:?}");
                        }
                    }
                    Err(e) => {
                        warn!("MQTT connection error: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });
    }

    Ok(MqttClient { client })
}

async fn handle_incoming(
    event: rumqttc::Event,
    client: &AsyncClient,
    control_filter: &str,
    bridge_tx: &mpsc::Sender<BridgeMessage>,
) -> Result<()> {
    match event {
        rumqttc::Event::Incoming(rumqttc::Packet::ConnAck(_)) => {
            // Subscriptions do not survive a reconnect
            client
                .subscribe(control_filter.to_string(), QoS::AtMostOnce)
                .await?;
        }
        rumqttc::Event::Incoming(rumqttc::Packet::Publish(msg)) => {
            let de = &mut serde_json::Deserializer::from_slice(&msg.payload);
            let payload: ControlPayload = serde_path_to_error::deserialize(de)?;

            bridge_tx.send(payload.into()).await?;
        }
        _ => {}
    }

    Ok(())
}

/// Publishes device commands in the Zigbee2MQTT wire format. QoS 0 and
/// no retain: a lost sync frame is superseded by the next cycle anyway.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(mqtt_client: &MqttClient) -> Self {
        MqttPublisher {
            client: mqtt_client.client.clone(),
        }
    }
}

impl CommandPublisher for MqttPublisher {
    fn publish(
        &self,
        topic: &str,
        device_name: &str,
        payload: &LightPayload,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send {
        async move {
            let failed = |cause: String| BridgeError::PublishFailed {
                device: device_name.to_string(),
                cause,
            };

            let json = serde_json::to_string(payload).map_err(|e| failed(e.to_string()))?;

            match timeout(
                SEND_TIMEOUT,
                self.client
                    .publish(topic.to_string(), QoS::AtMostOnce, false, json),
            )
            .await
            {
                Err(_) => Err(failed("send timed out".to_string())),
                Ok(Err(e)) => Err(failed(e.to_string())),
                Ok(Ok(())) => Ok(()),
            }
        }
    }
}
