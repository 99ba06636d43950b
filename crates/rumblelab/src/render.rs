//! One-line console summaries of devices, effects, snapshots and slots.

use std::fmt::Write;

use rumblelab_session::{
    Capabilities, EffectStatus, GamepadState, Hat, PolledSnapshot, SlotReading,
};
use smallvec::SmallVec;

const BUTTON_NAMES: [(u16, &str); 15] = [
    (GamepadState::A, "A"),
    (GamepadState::B, "B"),
    (GamepadState::X, "X"),
    (GamepadState::Y, "Y"),
    (GamepadState::LEFT_SHOULDER, "LB"),
    (GamepadState::RIGHT_SHOULDER, "RB"),
    (GamepadState::BACK, "Back"),
    (GamepadState::START, "Start"),
    (GamepadState::GUIDE, "Guide"),
    (GamepadState::LEFT_THUMB, "LS"),
    (GamepadState::RIGHT_THUMB, "RS"),
    (GamepadState::DPAD_UP, "Up"),
    (GamepadState::DPAD_DOWN, "Down"),
    (GamepadState::DPAD_LEFT, "Left"),
    (GamepadState::DPAD_RIGHT, "Right"),
];

pub fn hat_name(hat: Hat) -> &'static str {
    match hat {
        Hat::Centered => "-",
        Hat::Up => "N",
        Hat::UpRight => "NE",
        Hat::Right => "E",
        Hat::DownRight => "SE",
        Hat::Down => "S",
        Hat::DownLeft => "SW",
        Hat::Left => "W",
        Hat::UpLeft => "NW",
    }
}

fn marker(selected: bool) -> char {
    if selected {
        '*'
    } else {
        ' '
    }
}

pub fn device_line(
    index: usize,
    name: &str,
    caps: Option<&Capabilities>,
    selected: bool,
) -> String {
    let mut line = format!("{}{index}: {name}", marker(selected));
    if let Some(caps) = caps {
        let _ = write!(
            line,
            " ({} axes, {} buttons, {} hats",
            caps.axes, caps.buttons, caps.hats
        );
        if caps.supports_feedback() {
            let _ = write!(line, ", force feedback on {} axes)", caps.ff_axes);
        } else {
            line.push(')');
        }
    }
    line
}

pub fn effect_line(index: usize, name: &str, status: EffectStatus, selected: bool) -> String {
    let status = match status {
        EffectStatus::Idle => "",
        EffectStatus::Playing => " [playing]",
        EffectStatus::Released => " [released]",
    };
    format!("{}  {index}: {name}{status}", marker(selected))
}

/// Summarizes a device snapshot, limited to the axes and hats `caps` reports.
pub fn snapshot_line(snapshot: &PolledSnapshot, caps: &Capabilities) -> String {
    let mut parts: SmallVec<[String; 4]> = SmallVec::new();

    let axes = usize::from(caps.axes).min(snapshot.axes.len());
    if axes > 0 {
        let values: Vec<String> = snapshot.axes[..axes].iter().map(i32::to_string).collect();
        parts.push(format!("axes {}", values.join(" ")));
    }

    let buttons: Vec<String> = snapshot.buttons.iter().map(|b| b.to_string()).collect();
    if buttons.is_empty() {
        parts.push("buttons -".to_string());
    } else {
        parts.push(format!("buttons {}", buttons.join(" ")));
    }

    let hats = usize::from(caps.hats).min(snapshot.hats.len());
    if hats > 0 {
        let names: Vec<&str> = snapshot.hats[..hats].iter().map(|h| hat_name(*h)).collect();
        parts.push(format!("hats {}", names.join(" ")));
    }

    format!("#{} {}", snapshot.sequence, parts.join(" | "))
}

/// Summarizes one gamepad slot; `None` means the slot was never polled.
pub fn slot_line(slot: usize, reading: Option<&SlotReading>, feedback: bool) -> String {
    let body = match reading {
        None => "waiting".to_string(),
        Some(SlotReading::Disconnected) => "disconnected".to_string(),
        Some(SlotReading::Connected { caps, state }) => {
            let mut parts: SmallVec<[String; 4]> = SmallVec::new();
            parts.push(format!(
                "L {:+.2} {:+.2}",
                norm(state.thumb_lx),
                norm(state.thumb_ly)
            ));
            parts.push(format!(
                "R {:+.2} {:+.2}",
                norm(state.thumb_rx),
                norm(state.thumb_ry)
            ));
            parts.push(format!("LT {} RT {}", state.left_trigger, state.right_trigger));
            let pressed: Vec<&str> = BUTTON_NAMES
                .iter()
                .filter(|(mask, _)| state.is_pressed(*mask))
                .map(|(_, name)| *name)
                .collect();
            if !pressed.is_empty() {
                parts.push(pressed.join(" "));
            }
            if !caps.has_rumble {
                parts.push("no rumble".to_string());
            }
            parts.join(" | ")
        }
    };
    let feedback = if feedback { " [feedback]" } else { "" };
    format!("slot {slot}: {body}{feedback}")
}

fn norm(value: i16) -> f32 {
    f32::from(value) / f32::from(i16::MAX)
}
