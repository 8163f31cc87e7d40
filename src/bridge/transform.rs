use palette::{FromColor, LinSrgb, Srgb, Yxy};
use tokio::time::Instant;

use crate::bridge::registry::{Device, DeviceType};

pub const BRIGHTNESS_MAX: u8 = 254;
pub const BRIGHTNESS_MIN: u8 = 1;

/// Mired range accepted by the lights (matches the Zigbee2MQTT slider).
pub const MIREDS_MIN: u16 = 150;
pub const MIREDS_MAX: u16 = 370;

/// One averaged sample from the capture source.
#[derive(Clone, Copy, Debug)]
pub struct CapturedColor {
    pub color: Srgb<u8>,
    pub at: Instant,
}

/// What gets written to a device: never an RGB triplet for a cct light.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutputCommand {
    Rgb { color: Srgb<u8>, brightness: u8 },
    Cct { mireds: u16, brightness: u8 },
}

/// The deep orange/red the warmth setting pulls colors toward.
pub fn warm_anchor() -> Srgb<u8> {
    Srgb::new(255, 60, 0)
}

/// Pure per-device color transform: brightness scaling, warmth shaping,
/// then rgb/cct adaptation. Never fails; out-of-range inputs clamp.
pub fn transform(raw: Srgb<u8>, device: &Device, warmth: f32) -> OutputCommand {
    let brightness = scale_brightness(raw, device.brightness_multiplier);
    let shaped = shape_warmth(raw, warmth);

    match device.kind {
        DeviceType::Rgb => OutputCommand::Rgb {
            color: shaped,
            brightness,
        },
        DeviceType::Cct => OutputCommand::Cct {
            mireds: approximate_mireds(shaped),
            brightness,
        },
    }
}

/// Relative luminance (CIE Y) of an sRGB color, 0.0-1.0.
fn luminance(color: Srgb<u8>) -> f32 {
    let linear: LinSrgb<f32> = color.into_format::<f32>().into_linear();
    Yxy::from_color(linear).luma
}

/// Multiplier -1 is the "force hardware maximum" sentinel; everything
/// else scales the captured luminance into the 1-254 Zigbee range.
fn scale_brightness(raw: Srgb<u8>, multiplier: f32) -> u8 {
    if multiplier == -1.0 {
        return BRIGHTNESS_MAX;
    }

    let scaled = luminance(raw) * multiplier.clamp(0.0, 1.0) * f32::from(BRIGHTNESS_MAX);
    (scaled.round() as i32).clamp(i32::from(BRIGHTNESS_MIN), i32::from(BRIGHTNESS_MAX)) as u8
}

/// Linear per-channel blend toward the warm anchor. Blending in RGB
/// rather than on a hue angle avoids wraparound artifacts at the red
/// boundary: w=0 is the identity, w=1 is exactly the anchor.
fn shape_warmth(raw: Srgb<u8>, warmth: f32) -> Srgb<u8> {
    let w = warmth.clamp(0.0, 1.0);
    let anchor = warm_anchor();

    let blend = |a: u8, b: u8| -> u8 {
        (f32::from(a) * (1.0 - w) + f32::from(b) * w).round() as u8
    };

    Srgb::new(
        blend(raw.red, anchor.red),
        blend(raw.green, anchor.green),
        blend(raw.blue, anchor.blue),
    )
}

/// Nearest color temperature for a shaped color: chromaticity via CIE
/// Yxy, then McCamy's approximation, then kelvin -> mireds clamped to
/// the range the lights accept. Deterministic, and warmer input colors
/// map to higher mired values.
fn approximate_mireds(color: Srgb<u8>) -> u16 {
    let linear: LinSrgb<f32> = color.into_format::<f32>().into_linear();
    let yxy = Yxy::from_color(linear);

    let n = (yxy.x - 0.3320) / (0.1858 - yxy.y);
    let kelvin = 449.0 * n.powi(3) + 3525.0 * n.powi(2) + 6823.3 * n + 5520.33;

    if !kelvin.is_finite() || kelvin <= 0.0 {
        // Degenerate chromaticity (e.g. black); warmest value is the
        // least surprising output for a dark scene.
        return MIREDS_MAX;
    }

    let mireds = (1_000_000.0 / kelvin).round() as i32;
    mireds.clamp(i32::from(MIREDS_MIN), i32::from(MIREDS_MAX)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::registry::Mode;

    fn device(kind: DeviceType, multiplier: f32) -> Device {
        Device {
            name: "Desk".to_string(),
            topic: "zigbee2mqtt/desk/set".to_string(),
            kind,
            brightness_multiplier: multiplier,
            mode: Mode::Sync,
            last_sent_color: None,
            last_sent_at: None,
        }
    }

    fn distance_to_anchor(color: Srgb<u8>) -> f32 {
        let anchor = warm_anchor();
        let d = |a: u8, b: u8| (f32::from(a) - f32::from(b)).powi(2);
        (d(color.red, anchor.red) + d(color.green, anchor.green) + d(color.blue, anchor.blue))
            .sqrt()
    }

    #[test]
    fn zero_warmth_is_the_identity() {
        let raw = Srgb::new(255u8, 100, 0);
        let command = transform(raw, &device(DeviceType::Rgb, 1.0), 0.0);
        assert_eq!(
            command,
            OutputCommand::Rgb {
                color: raw,
                brightness: 77,
            }
        );
    }

    #[test]
    fn full_warmth_is_exactly_the_anchor() {
        let raw = Srgb::new(10u8, 200, 255);
        let OutputCommand::Rgb { color, .. } = transform(raw, &device(DeviceType::Rgb, 1.0), 1.0)
        else {
            panic!("expected rgb command");
        };
        assert_eq!(color, warm_anchor());
    }

    #[test]
    fn warmth_over_one_clamps_to_the_anchor() {
        let raw = Srgb::new(10u8, 200, 255);
        assert_eq!(shape_warmth(raw, 7.5), warm_anchor());
        assert_eq!(shape_warmth(raw, -0.5), raw);
    }

    #[test]
    fn increasing_warmth_moves_toward_the_anchor() {
        let raw = Srgb::new(10u8, 200, 255);
        let mut previous = f32::MAX;
        for w in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let distance = distance_to_anchor(shape_warmth(raw, w));
            assert!(
                distance <= previous,
                "distance increased at w={w}: {distance} > {previous}"
            );
            previous = distance;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn sentinel_multiplier_forces_hardware_maximum() {
        for raw in [
            Srgb::new(0u8, 0, 0),
            Srgb::new(10u8, 10, 10),
            Srgb::new(255u8, 255, 255),
        ] {
            let command = transform(raw, &device(DeviceType::Rgb, -1.0), 0.0);
            let OutputCommand::Rgb { brightness, .. } = command else {
                panic!("expected rgb command");
            };
            assert_eq!(brightness, BRIGHTNESS_MAX);
        }
    }

    #[test]
    fn brightness_scales_with_luminance_and_multiplier() {
        let raw = Srgb::new(255u8, 100, 0);
        // luminance(255, 100, 0) is ~0.30, so full multiplier lands near 77
        assert_eq!(scale_brightness(raw, 1.0), 77);
        // Half multiplier halves the output (within rounding)
        let half = scale_brightness(raw, 0.5);
        assert!((38..=39).contains(&half), "got {half}");
        // Black never drops below the Zigbee minimum of 1
        assert_eq!(scale_brightness(Srgb::new(0u8, 0, 0), 1.0), BRIGHTNESS_MIN);
        assert_eq!(scale_brightness(Srgb::new(255u8, 255, 255), 1.0), BRIGHTNESS_MAX);
    }

    #[test]
    fn cct_devices_never_receive_rgb() {
        let command = transform(Srgb::new(255u8, 100, 0), &device(DeviceType::Cct, -1.0), 0.3);
        let OutputCommand::Cct { mireds, brightness } = command else {
            panic!("cct device produced an rgb command");
        };
        assert_eq!(brightness, BRIGHTNESS_MAX);
        assert!((MIREDS_MIN..=MIREDS_MAX).contains(&mireds));
    }

    #[test]
    fn warmer_colors_map_to_higher_mireds() {
        let warm = approximate_mireds(warm_anchor());
        let neutral = approximate_mireds(Srgb::new(255u8, 240, 220));
        let cool = approximate_mireds(Srgb::new(180u8, 200, 255));

        assert!(warm > neutral, "warm={warm} neutral={neutral}");
        assert!(neutral > cool, "neutral={neutral} cool={cool}");
        assert_eq!(warm, MIREDS_MAX);
    }

    #[test]
    fn degenerate_chromaticity_falls_back_to_warmest() {
        assert_eq!(approximate_mireds(Srgb::new(0u8, 0, 0)), MIREDS_MAX);
    }

    #[test]
    fn cct_conversion_is_deterministic() {
        let color = Srgb::new(200u8, 150, 90);
        assert_eq!(approximate_mireds(color), approximate_mireds(color));
    }
}
