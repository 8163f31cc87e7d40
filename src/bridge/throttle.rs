use std::time::Duration;

use tokio::time::Instant;

use crate::bridge::registry::Device;
use crate::bridge::transform::OutputCommand;

/// Channel tolerance for dedup: radio traffic for a 1-step color change
/// is not worth it, the lights cannot show the difference anyway.
const CHANNEL_TOLERANCE: u8 = 2;
const BRIGHTNESS_TOLERANCE: u8 = 2;
const MIREDS_TOLERANCE: u16 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Send,
    /// The throttle window for this device has not elapsed yet.
    TooSoon,
    /// The command matches what was last sent, within tolerance. Takes
    /// precedence over the window check: a duplicate is suppressed even
    /// when the window has elapsed.
    Duplicate,
}

/// Gate for one device and one computed command. The caller stamps the
/// device via the registry after a successful publish; this function
/// only reads.
pub fn check(device: &Device, command: &OutputCommand, window: Duration, now: Instant) -> Verdict {
    if let Some(last) = &device.last_sent_color {
        if is_duplicate(last, command) {
            return Verdict::Duplicate;
        }
    }

    if let Some(at) = device.last_sent_at {
        if now.duration_since(at) < window {
            return Verdict::TooSoon;
        }
    }

    Verdict::Send
}

fn is_duplicate(last: &OutputCommand, next: &OutputCommand) -> bool {
    match (last, next) {
        (
            OutputCommand::Rgb {
                color: a,
                brightness: ab,
            },
            OutputCommand::Rgb {
                color: b,
                brightness: bb,
            },
        ) => {
            within_u8(a.red, b.red, CHANNEL_TOLERANCE)
                && within_u8(a.green, b.green, CHANNEL_TOLERANCE)
                && within_u8(a.blue, b.blue, CHANNEL_TOLERANCE)
                && within_u8(*ab, *bb, BRIGHTNESS_TOLERANCE)
        }
        (
            OutputCommand::Cct {
                mireds: a,
                brightness: ab,
            },
            OutputCommand::Cct {
                mireds: b,
                brightness: bb,
            },
        ) => a.abs_diff(*b) <= MIREDS_TOLERANCE && within_u8(*ab, *bb, BRIGHTNESS_TOLERANCE),
        _ => false,
    }
}

fn within_u8(a: u8, b: u8, tolerance: u8) -> bool {
    a.abs_diff(b) <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::registry::{DeviceType, Mode};
    use palette::Srgb;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn rgb(r: u8, g: u8, b: u8, brightness: u8) -> OutputCommand {
        OutputCommand::Rgb {
            color: Srgb::new(r, g, b),
            brightness,
        }
    }

    fn device(last: Option<OutputCommand>, sent_ago: Option<Duration>, now: Instant) -> Device {
        Device {
            name: "Desk".to_string(),
            topic: "zigbee2mqtt/desk/set".to_string(),
            kind: DeviceType::Rgb,
            brightness_multiplier: 1.0,
            mode: Mode::Sync,
            last_sent_color: last,
            last_sent_at: sent_ago.map(|ago| now - ago),
        }
    }

    #[test]
    fn fresh_device_sends() {
        let now = Instant::now();
        let device = device(None, None, now);
        assert_eq!(check(&device, &rgb(255, 100, 0, 77), WINDOW, now), Verdict::Send);
    }

    #[test]
    fn window_blocks_changed_commands() {
        let now = Instant::now();
        let device = device(
            Some(rgb(255, 100, 0, 77)),
            Some(Duration::from_millis(300)),
            now,
        );
        assert_eq!(
            check(&device, &rgb(0, 100, 255, 77), WINDOW, now),
            Verdict::TooSoon
        );
    }

    #[test]
    fn window_elapse_allows_changed_commands() {
        let now = Instant::now();
        let device = device(
            Some(rgb(255, 100, 0, 77)),
            Some(Duration::from_millis(1500)),
            now,
        );
        assert_eq!(check(&device, &rgb(0, 100, 255, 77), WINDOW, now), Verdict::Send);
    }

    #[test]
    fn duplicates_suppressed_even_after_window() {
        let now = Instant::now();
        let device = device(
            Some(rgb(255, 100, 0, 77)),
            Some(Duration::from_secs(30)),
            now,
        );
        assert_eq!(
            check(&device, &rgb(255, 100, 0, 77), WINDOW, now),
            Verdict::Duplicate
        );
    }

    #[test]
    fn near_identical_commands_count_as_duplicates() {
        let now = Instant::now();
        let device = device(Some(rgb(255, 100, 0, 77)), Some(Duration::from_secs(5)), now);
        assert_eq!(
            check(&device, &rgb(254, 102, 1, 78), WINDOW, now),
            Verdict::Duplicate
        );
        // Past the tolerance, it is a real change
        assert_eq!(check(&device, &rgb(250, 100, 0, 77), WINDOW, now), Verdict::Send);
    }

    #[test]
    fn cct_dedup_uses_mired_tolerance() {
        let now = Instant::now();
        let last = OutputCommand::Cct {
            mireds: 300,
            brightness: 200,
        };
        let device = device(Some(last), Some(Duration::from_secs(5)), now);

        let close = OutputCommand::Cct {
            mireds: 303,
            brightness: 201,
        };
        assert_eq!(check(&device, &close, WINDOW, now), Verdict::Duplicate);

        let far = OutputCommand::Cct {
            mireds: 320,
            brightness: 200,
        };
        assert_eq!(check(&device, &far, WINDOW, now), Verdict::Send);
    }

    #[test]
    fn command_kind_change_is_never_a_duplicate() {
        let now = Instant::now();
        let device = device(Some(rgb(255, 100, 0, 77)), Some(Duration::from_secs(5)), now);
        let cct = OutputCommand::Cct {
            mireds: 300,
            brightness: 77,
        };
        assert_eq!(check(&device, &cct, WINDOW, now), Verdict::Send);
    }
}
