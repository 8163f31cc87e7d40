use std::time::Duration;

use color_eyre::Result;
use eyre::eyre;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::bridge::transform::CapturedColor;
use crate::hyperion::{protocol, HyperionSource};
use crate::settings::Settings;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Hyperion pushes at up to 60 fps; a silent socket means the stream is
/// dead even if TCP has not noticed yet.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

const BACKOFF_INITIAL: Duration = Duration::from_secs(2);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Spawns the websocket task feeding the LED stream into a watch
/// channel and returns the read side.
pub fn start_hyperion_stream(settings: &Settings, stop: watch::Receiver<bool>) -> HyperionSource {
    let (tx, rx) = watch::channel(None);
    let url = format!("ws://{}/json-rpc", settings.hyperion.addr);

    tokio::spawn(run_stream(url, tx, stop));

    HyperionSource::new(rx)
}

/// Connect/subscribe/read until the connection drops, then reconnect
/// with exponential backoff (reset on a successful connect). The stop
/// flag aborts both the read loop and any backoff sleep.
async fn run_stream(
    url: String,
    tx: watch::Sender<Option<CapturedColor>>,
    mut stop: watch::Receiver<bool>,
) {
    let mut backoff = BACKOFF_INITIAL;

    loop {
        if *stop.borrow() {
            break;
        }

        match timeout(CONNECT_TIMEOUT, connect_async(url.as_str())).await {
            Ok(Ok((ws, _))) => {
                info!("connected to Hyperion at {url}");
                backoff = BACKOFF_INITIAL;

                if let Err(e) = drive(ws, &tx, &mut stop).await {
                    warn!("Hyperion LED stream lost: {e}");
                }
                tx.send_replace(None);
            }
            Ok(Err(e)) => warn!("failed to connect to Hyperion at {url}: {e}"),
            Err(_) => warn!("connection to Hyperion at {url} timed out"),
        }

        if *stop.borrow() {
            break;
        }

        debug!("reconnecting to Hyperion in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = stop.changed() => {}
        }
        backoff = (backoff * 2).min(BACKOFF_MAX);
    }
}

async fn drive(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    tx: &watch::Sender<Option<CapturedColor>>,
    stop: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (mut sink, mut frames) = ws.split();

    sink.send(Message::Text(protocol::subscribe_command())).await?;
    info!("subscribed to the Hyperion LED stream");

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(());
                }
            }
            next = timeout(READ_TIMEOUT, frames.next()) => {
                let message = match next {
                    Err(_) => return Err(eyre!("no frame received for {READ_TIMEOUT:?}")),
                    Ok(None) => return Err(eyre!("stream closed by Hyperion")),
                    Ok(Some(message)) => message?,
                };

                if let Message::Text(text) = message {
                    handle_frame(&text, tx);
                }
            }
        }
    }
}

fn handle_frame(text: &str, tx: &watch::Sender<Option<CapturedColor>>) {
    let de = &mut serde_json::Deserializer::from_str(text);
    let frame: protocol::Frame = match serde_path_to_error::deserialize(de) {
        Ok(frame) => frame,
        Err(e) => {
            debug!("ignoring unparseable Hyperion frame: {e}");
            return;
        }
    };

    if frame.command != protocol::LEDSTREAM_UPDATE {
        return;
    }

    let data: protocol::LedData = match serde_json::from_value(frame.data) {
        Ok(data) => data,
        Err(e) => {
            debug!("ignoring malformed ledstream update: {e}");
            return;
        }
    };

    if let Some(color) = protocol::average_color(&data.leds) {
        tx.send_replace(Some(CapturedColor {
            color,
            at: Instant::now(),
        }));
    }
}
