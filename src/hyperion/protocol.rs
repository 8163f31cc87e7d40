use palette::Srgb;
use serde::Deserialize;
use serde_json::json;

/// Command tag on LED stream frames. Everything else on the socket
/// (subscription replies, server info) is ignored.
pub const LEDSTREAM_UPDATE: &str = "ledcolors-ledstream-update";

/// Outer JSON-RPC frame. `data` is left untyped here because its shape
/// depends on `command`.
#[derive(Deserialize, Debug, Clone)]
pub struct Frame {
    pub command: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

/// Payload of a ledstream update: a flat `[r, g, b, r, g, b, ...]`
/// array covering every configured LED.
#[derive(Deserialize, Debug, Clone)]
pub struct LedData {
    #[serde(default)]
    pub leds: Vec<i64>,
}

pub fn subscribe_command() -> String {
    json!({
        "command": "ledcolors",
        "subcommand": "ledstream-start",
    })
    .to_string()
}

/// Average color over all LED triplets. Channel values outside 0-255 are
/// clamped rather than rejected; a trailing partial triplet is dropped.
pub fn average_color(leds: &[i64]) -> Option<Srgb<u8>> {
    let count = (leds.len() / 3) as u32;
    if count == 0 {
        return None;
    }

    let (mut r, mut g, mut b) = (0u32, 0u32, 0u32);
    for led in leds.chunks_exact(3) {
        r += led[0].clamp(0, 255) as u32;
        g += led[1].clamp(0, 255) as u32;
        b += led[2].clamp(0, 255) as u32;
    }

    Some(Srgb::new(
        (r / count) as u8,
        (g / count) as u8,
        (b / count) as u8,
    ))
}
