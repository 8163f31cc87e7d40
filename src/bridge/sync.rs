use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::bridge::registry::{DeviceRegistry, Mode};
use crate::bridge::throttle::{self, Verdict};
use crate::bridge::transform::{transform, CapturedColor};
use crate::bridge::{BridgeError, BridgeMessage, ManualCommand};
use crate::zigbee_payload::LightPayload;

/// Samples older than this are treated the same as a missing sample; the
/// capture feed has clearly stalled and holding the last color is better
/// than acting on it.
const SAMPLE_MAX_AGE: Duration = Duration::from_secs(5);

/// Anything that can hand out the most recent captured color. The push
/// and poll implementations look the same from here: the newest sample
/// wins and nothing is ever queued.
pub trait ColorSource {
    fn latest(&self) -> Result<CapturedColor, BridgeError>;
}

/// Seam toward the message bus; the MQTT implementation lives in
/// `protocols::mqtt`.
pub trait CommandPublisher {
    fn publish(
        &self,
        topic: &str,
        device_name: &str,
        payload: &LightPayload,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Runtime-tunable knobs, snapshotted per cycle and passed into the pure
/// transform/throttle functions by value.
#[derive(Clone, Copy, Debug)]
pub struct Tuning {
    pub warmth: f32,
    pub throttle: Duration,
    pub transition: f32,
}

/// Drives the whole bridge: one sync pass per scheduler tick, with
/// manual commands, mode toggles and tuning changes drained from the
/// message channel between passes. A single task owns every publish, so
/// manual and sync writes for one device can never interleave on the
/// wire.
pub struct BridgeLoop<S, P> {
    source: S,
    publisher: P,
    registry: Arc<DeviceRegistry>,
    tuning: Tuning,
    tick: Duration,
    rx: mpsc::Receiver<BridgeMessage>,
    stop: watch::Receiver<bool>,
    source_misses: u32,
}

impl<S, P> BridgeLoop<S, P>
where
    S: ColorSource + Send,
    P: CommandPublisher + Send + Sync,
{
    pub fn new(
        source: S,
        publisher: P,
        registry: Arc<DeviceRegistry>,
        tuning: Tuning,
        tick: Duration,
        rx: mpsc::Receiver<BridgeMessage>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        BridgeLoop {
            source,
            publisher,
            registry,
            tuning,
            tick,
            rx,
            stop,
            source_misses: 0,
        }
    }

    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => self.run_cycle().await,
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle_message(msg).await,
                    None => break,
                },
                changed = self.stop.changed() => {
                    if changed.is_err() || *self.stop.borrow() {
                        break;
                    }
                }
            }
        }

        info!("bridge loop stopped");
    }

    /// One sync pass: latest sample, then transform -> throttle ->
    /// publish for every device currently in sync mode. Per-device
    /// failures are logged and never abort the pass.
    async fn run_cycle(&mut self) {
        let sample = match self.source.latest() {
            Ok(sample) if sample.at.elapsed() <= SAMPLE_MAX_AGE => sample,
            Ok(_) => {
                self.note_source_miss();
                return;
            }
            Err(_) => {
                self.note_source_miss();
                return;
            }
        };

        if self.source_misses > 0 {
            info!("color feed recovered after {} empty cycles", self.source_misses);
            self.source_misses = 0;
        }

        for device in self.registry.list_sync_devices() {
            let command = transform(sample.color, &device, self.tuning.warmth);

            match throttle::check(&device, &command, self.tuning.throttle, Instant::now()) {
                Verdict::TooSoon | Verdict::Duplicate => continue,
                Verdict::Send => {}
            }

            let payload = LightPayload::from_output(&command, self.tuning.transition);
            match self
                .publisher
                .publish(&device.topic, &device.name, &payload)
                .await
            {
                Ok(()) => self.registry.mark_sent(&device.name, command, Instant::now()),
                // Skip, do not retry: next cycle carries a fresher sample
                Err(e) => warn!("{e}"),
            }
        }
    }

    async fn handle_message(&mut self, msg: BridgeMessage) {
        match msg {
            BridgeMessage::Manual(command) => {
                if let Err(e) = self.apply_manual(command).await {
                    warn!("{e}");
                }
            }
            BridgeMessage::SetMode { name, mode } => match self.registry.set_mode(&name, mode) {
                Ok(()) => info!("device '{name}' switched to {} mode", mode.as_str()),
                Err(e) => warn!("{e}"),
            },
            BridgeMessage::SetMultiplier { name, value } => {
                match self.registry.set_multiplier(&name, value) {
                    Ok(()) => info!("device '{name}' brightness multiplier set to {value}"),
                    Err(e) => warn!("{e}"),
                }
            }
            BridgeMessage::SetWarmth(warmth) => {
                self.tuning.warmth = warmth.clamp(0.0, 1.0);
                info!("warmth set to {}", self.tuning.warmth);
            }
            BridgeMessage::SetThrottle(window) => {
                self.tuning.throttle = window;
                info!("throttle window set to {window:?}");
            }
        }
    }

    /// Manual commands only apply to devices in manual mode. A command
    /// for a syncing device is rejected, not queued: replaying stale
    /// user intent after a later mode switch would be surprising.
    async fn apply_manual(&mut self, command: ManualCommand) -> Result<(), BridgeError> {
        let device = self
            .registry
            .get(&command.name)
            .ok_or_else(|| BridgeError::InvalidConfig {
                device: command.name.clone(),
                reason: "not configured".to_string(),
            })?;

        if device.mode == Mode::Sync {
            return Err(BridgeError::ModeMismatch {
                device: command.name,
            });
        }

        let payload = LightPayload::from_manual(&command);
        self.publisher
            .publish(&device.topic, &device.name, &payload)
            .await?;
        debug!("manual command applied to '{}'", device.name);

        Ok(())
    }

    fn note_source_miss(&mut self) {
        self.source_misses += 1;
        // Log on powers of two so a long outage does not flood the log
        if self.source_misses.is_power_of_two() {
            warn!(
                "{} ({} cycles skipped)",
                BridgeError::SourceUnavailable,
                self.source_misses
            );
        }
    }
}
