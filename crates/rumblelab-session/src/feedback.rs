use std::sync::Arc;

use crate::effects::EffectStatus;
use crate::handle::{DeviceHandle, EffectHandle};
use crate::selection::ActiveRead;
use crate::types::{Capabilities, Direction, GamepadState, PolledSnapshot, SlotReading};

/// What the feedback pass did (or would do) for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDecision {
    /// Nothing playing, nothing to start.
    Idle,
    /// Start the selected effect towards `direction`.
    Start { direction: Direction },
    /// Stop the playing effect.
    Stop,
    /// Keep the playing effect as is.
    Continue,
    /// Set rumble motor speeds.
    Rumble { left: u16, right: u16 },
}

/// Direction of the two primary axes relative to the device's center.
pub fn stick_direction(snapshot: &PolledSnapshot, center: i32) -> Direction {
    Direction([
        snapshot.axis(0).saturating_sub(center),
        snapshot.axis(1).saturating_sub(center),
    ])
}

/// Normalized deflection of a stick, in `[0.0, 1.0]`.
#[inline]
pub fn stick_magnitude(x: i16, y: i16) -> f32 {
    let x = f32::from(x) / f32::from(i16::MAX);
    let y = f32::from(y) / f32::from(i16::MAX);
    (x * x + y * y).sqrt().min(1.0)
}

/// Left motor follows the left stick, right motor the right stick.
pub fn rumble_intensities(state: &GamepadState) -> (u16, u16) {
    let (lx, ly) = state.left_stick();
    let (rx, ry) = state.right_stick();
    (to_motor(stick_magnitude(lx, ly)), to_motor(stick_magnitude(rx, ry)))
}

/// Rumble command for one slot; neutral unless feedback is enabled and the pad is connected.
pub fn slot_rumble(reading: &SlotReading, enabled: bool) -> FeedbackDecision {
    let (left, right) = match reading.state() {
        Some(state) if enabled => rumble_intensities(state),
        _ => (0, 0),
    };
    FeedbackDecision::Rumble { left, right }
}

/// Rumble for a device without force-feedback effects.
///
/// While any button is held the left motor follows axes 0/1 and the right
/// motor axes 2/3; otherwise both are neutral.
pub fn device_rumble(snapshot: &PolledSnapshot, caps: &Capabilities) -> FeedbackDecision {
    if !snapshot.any_button_pressed() {
        return FeedbackDecision::Rumble { left: 0, right: 0 };
    }
    let half = (i64::from(caps.axis_max) - i64::from(caps.axis_min)) as f32 / 2.0;
    let center = caps.center();
    let deflection = |x: usize, y: usize| {
        if half <= 0.0 || usize::from(caps.axes) <= y {
            return 0.0;
        }
        let dx = snapshot.axis(x).saturating_sub(center) as f32 / half;
        let dy = snapshot.axis(y).saturating_sub(center) as f32 / half;
        (dx * dx + dy * dy).sqrt()
    };
    FeedbackDecision::Rumble {
        left: to_motor(deflection(0, 1)),
        right: to_motor(deflection(2, 3)),
    }
}

#[inline]
fn to_motor(magnitude: f32) -> u16 {
    (magnitude.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
}

/// Drives the selected effect from button presses.
///
/// Pressing any button starts the selected effect once, aimed along the primary
/// stick. Releasing all buttons, or selecting another effect while playing,
/// stops it. Devices without force-feedback axes get [`device_rumble`] instead.
#[derive(Default)]
pub struct FeedbackController {
    previous: Option<PolledSnapshot>,
    playing: Option<Arc<EffectHandle>>,
    rumbling: Option<Arc<DeviceHandle>>,
}

impl FeedbackController {
    pub fn new() -> Self {
        Self::default()
    }

    /// The effect started by this controller and not yet stopped.
    pub fn playing(&self) -> Option<&Arc<EffectHandle>> {
        self.playing.as_ref()
    }

    /// Decides the next action from `snapshot` and the previously applied one.
    pub fn decide(
        &self,
        snapshot: &PolledSnapshot,
        effect: Option<&Arc<EffectHandle>>,
        center: i32,
    ) -> FeedbackDecision {
        let pressed = snapshot.any_button_pressed();
        let was_pressed = self
            .previous
            .as_ref()
            .map(PolledSnapshot::any_button_pressed)
            .unwrap_or(false);

        if let Some(playing) = self.playing.as_ref() {
            let same_effect = effect.is_some_and(|e| Arc::ptr_eq(e, playing));
            if !pressed || !same_effect {
                return FeedbackDecision::Stop;
            }
            return FeedbackDecision::Continue;
        }

        if pressed && !was_pressed && effect.is_some() {
            return FeedbackDecision::Start {
                direction: stick_direction(snapshot, center),
            };
        }
        FeedbackDecision::Idle
    }

    /// Decides and executes the action for one poll read.
    pub fn apply(&mut self, read: &ActiveRead) -> FeedbackDecision {
        if self
            .rumbling
            .as_ref()
            .is_some_and(|d| !Arc::ptr_eq(d, &read.device))
        {
            self.silence();
        }
        let caps = match read.device.capabilities() {
            Ok(caps) => Some(caps),
            Err(e) => {
                log::debug!("no capabilities for {}: {e}", read.device.name());
                None
            }
        };
        if let Some(caps) = caps.filter(|c| !c.supports_feedback()) {
            let decision = device_rumble(&read.snapshot, &caps);
            self.rumble(&read.device, decision);
            self.previous = Some(read.snapshot);
            return decision;
        }

        let center = caps.map(|c| c.center()).unwrap_or(0);
        let decision = self.decide(&read.snapshot, read.effect.as_ref(), center);
        match decision {
            FeedbackDecision::Start { direction } => {
                if let Some(effect) = read.effect.as_ref() {
                    self.start(effect, direction);
                }
            }
            FeedbackDecision::Stop => self.stop_playing(),
            _ => {}
        }
        self.previous = Some(read.snapshot);
        decision
    }

    /// Stops a playing effect or rumble. Returns `true` when a stop was issued.
    pub fn shutdown(&mut self) -> bool {
        let was_playing = self.playing.is_some();
        self.stop_playing();
        let was_rumbling = self.silence();
        self.previous = None;
        was_playing || was_rumbling
    }

    fn rumble(&mut self, device: &Arc<DeviceHandle>, decision: FeedbackDecision) {
        let FeedbackDecision::Rumble { left, right } = decision else {
            return;
        };
        if let Err(e) = device.set_feedback(left, right) {
            log::debug!("rumble on {} failed: {e}", device.name());
        }
        self.rumbling = (left != 0 || right != 0).then(|| device.clone());
    }

    fn silence(&mut self) -> bool {
        let Some(device) = self.rumbling.take() else {
            return false;
        };
        if let Err(e) = device.set_feedback(0, 0) {
            log::debug!("failed to stop rumble on {}: {e}", device.name());
        }
        true
    }

    fn start(&mut self, effect: &Arc<EffectHandle>, direction: Direction) {
        if effect.kind().is_directional() {
            let mut applied = false;
            for axes in (1..=effect.axes().max(1)).rev() {
                match effect.set_direction(direction, axes) {
                    Ok(()) => {
                        applied = true;
                        break;
                    }
                    Err(e) => {
                        log::debug!("{}: direction over {axes} axes rejected: {e}", effect.name());
                    }
                }
            }
            if !applied {
                log::warn!("{}: starting without direction update", effect.name());
            }
        }
        match effect.start() {
            Ok(()) => self.playing = Some(effect.clone()),
            Err(e) => log::warn!("failed to start {}: {e}", effect.name()),
        }
    }

    fn stop_playing(&mut self) {
        if let Some(effect) = self.playing.take() {
            if effect.status() == EffectStatus::Released {
                return;
            }
            if let Err(e) = effect.stop() {
                log::debug!("failed to stop {}: {e}", effect.name());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EffectDefaults;
    use crate::device_registry::DeviceRegistry;
    use crate::effect_registry::EffectRegistry;
    use crate::effects::EffectKind;
    use crate::mock::{default_capabilities, MockCall, MockController, MockDiscovery};
    use crate::selection::SelectionState;
    use crate::types::SlotCaps;

    struct Rig {
        discovery: MockDiscovery,
        pad: MockController,
        _devices: DeviceRegistry,
        effects: EffectRegistry,
        selection: SelectionState,
    }

    fn rig() -> Rig {
        let discovery = MockDiscovery::new();
        let pad = discovery.add_device("Wheel");
        let mut devices = DeviceRegistry::new(Arc::new(discovery.clone()));
        devices.refresh().unwrap();
        let selection = SelectionState::new();
        let device = devices.get(0).unwrap();
        selection.select_device(Some(device.clone()));
        let mut effects = EffectRegistry::new(EffectDefaults::default());
        effects.populate(&device);
        selection.select_effect(effects.get(0));
        discovery.clear_calls();
        Rig {
            discovery,
            pad,
            _devices: devices,
            effects,
            selection,
        }
    }

    fn tick(rig: &Rig, feedback: &mut FeedbackController) -> FeedbackDecision {
        let read = rig.selection.snapshot_effect().unwrap();
        feedback.apply(&read)
    }

    fn starts(discovery: &MockDiscovery) -> Vec<Direction> {
        discovery
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Start { direction, .. } => Some(direction),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn press_starts_once_with_stick_direction() {
        let rig = rig();
        let mut feedback = FeedbackController::new();
        assert_eq!(tick(&rig, &mut feedback), FeedbackDecision::Idle);

        rig.pad.set_stick(0.8, 0.0);
        rig.pad.press(0);
        assert!(matches!(tick(&rig, &mut feedback), FeedbackDecision::Start { .. }));
        assert_eq!(tick(&rig, &mut feedback), FeedbackDecision::Continue);

        let starts = starts(&rig.discovery);
        assert_eq!(starts.len(), 1);
        let direction = starts[0];
        assert_eq!(direction.y(), 0);
        let expected = (0.8 * 32767.5_f32).round() as i32;
        assert!((direction.x() - expected).abs() <= 1, "x = {}", direction.x());
    }

    #[test]
    fn release_stops_playing_effect() {
        let rig = rig();
        let mut feedback = FeedbackController::new();
        rig.pad.press(3);
        tick(&rig, &mut feedback);
        rig.pad.release(3);
        assert_eq!(tick(&rig, &mut feedback), FeedbackDecision::Stop);
        assert!(feedback.playing().is_none());
        assert_eq!(tick(&rig, &mut feedback), FeedbackDecision::Idle);
        let stops = rig
            .discovery
            .calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Stop { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn changing_effect_while_playing_stops_previous() {
        let rig = rig();
        let mut feedback = FeedbackController::new();
        rig.pad.press(0);
        tick(&rig, &mut feedback);
        rig.selection.select_effect(rig.effects.get(1));
        assert_eq!(tick(&rig, &mut feedback), FeedbackDecision::Stop);
        // Still held: the new effect waits for the next press.
        assert_eq!(tick(&rig, &mut feedback), FeedbackDecision::Idle);
        let calls = rig.discovery.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, MockCall::Stop { kind: EffectKind::Constant, .. })));
    }

    #[test]
    fn rejected_direction_retries_with_fewer_axes() {
        let rig = rig();
        rig.pad.set_max_direction_axes(1);
        let mut feedback = FeedbackController::new();
        rig.pad.press(0);
        tick(&rig, &mut feedback);
        let calls = rig.discovery.calls();
        assert!(calls
            .iter()
            .any(|c| matches!(c, MockCall::SetDirection { axes: 1, .. })));
        assert_eq!(starts(&rig.discovery).len(), 1);
    }

    #[test]
    fn shutdown_stops_once() {
        let rig = rig();
        let mut feedback = FeedbackController::new();
        rig.pad.press(0);
        tick(&rig, &mut feedback);
        assert!(feedback.shutdown());
        assert!(!feedback.shutdown());
    }

    fn feedback_calls(discovery: &MockDiscovery) -> Vec<(u16, u16)> {
        discovery
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Feedback { left, right, .. } => Some((left, right)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn device_without_effects_rumbles_while_held() {
        let discovery = MockDiscovery::new();
        let caps = Capabilities {
            ff_axes: 0,
            ..default_capabilities()
        };
        let pad = discovery.add_device_with("Pad", caps, Vec::new());
        let mut devices = DeviceRegistry::new(Arc::new(discovery.clone()));
        devices.refresh().unwrap();
        let selection = SelectionState::new();
        selection.select_device(devices.get(0));
        let mut feedback = FeedbackController::new();
        let mut tick = || feedback.apply(&selection.snapshot_effect().unwrap());

        assert_eq!(tick(), FeedbackDecision::Rumble { left: 0, right: 0 });
        pad.set_stick(1.0, 0.0);
        pad.press(4);
        assert_eq!(
            tick(),
            FeedbackDecision::Rumble {
                left: u16::MAX,
                right: 0
            }
        );
        assert_eq!(feedback_calls(&discovery), vec![(0, 0), (u16::MAX, 0)]);

        assert!(feedback.shutdown());
        assert!(!feedback.shutdown());
        assert_eq!(feedback_calls(&discovery).last(), Some(&(0, 0)));
    }

    #[test]
    fn device_with_effects_never_gets_raw_rumble() {
        let rig = rig();
        let mut feedback = FeedbackController::new();
        rig.pad.set_stick(1.0, 0.0);
        rig.pad.press(0);
        tick(&rig, &mut feedback);
        assert!(feedback_calls(&rig.discovery).is_empty());
    }

    #[test]
    fn device_rumble_needs_a_held_button_and_enough_axes() {
        let caps = Capabilities {
            axes: 2,
            ..default_capabilities()
        };
        let center = caps.center();
        let mut snapshot = PolledSnapshot::default();
        snapshot.axes = [center; crate::types::MAX_AXES];
        snapshot.axes[3] = caps.axis_max;
        assert_eq!(
            device_rumble(&snapshot, &caps),
            FeedbackDecision::Rumble { left: 0, right: 0 }
        );
        snapshot.buttons.insert(1);
        // Axes 2/3 are beyond what the device reports.
        assert_eq!(
            device_rumble(&snapshot, &caps),
            FeedbackDecision::Rumble { left: 0, right: 0 }
        );
    }

    #[test]
    fn rumble_is_proportional_to_stick_deflection() {
        let state = GamepadState {
            thumb_lx: i16::MAX,
            thumb_ry: i16::MAX / 2,
            ..GamepadState::default()
        };
        let (left, right) = rumble_intensities(&state);
        assert_eq!(left, u16::MAX);
        assert!((i32::from(right) - 32768).abs() < 8, "right = {right}");
        assert_eq!(rumble_intensities(&GamepadState::default()), (0, 0));
    }

    #[test]
    fn slot_rumble_is_neutral_when_disabled_or_disconnected() {
        let reading = SlotReading::Connected {
            caps: SlotCaps::default(),
            state: GamepadState {
                thumb_lx: 1000,
                ..GamepadState::default()
            },
        };
        assert_eq!(
            slot_rumble(&reading, false),
            FeedbackDecision::Rumble { left: 0, right: 0 }
        );
        assert_eq!(
            slot_rumble(&SlotReading::Disconnected, true),
            FeedbackDecision::Rumble { left: 0, right: 0 }
        );
        assert!(matches!(
            slot_rumble(&reading, true),
            FeedbackDecision::Rumble { left, right: 0 } if left > 0
        ));
    }
}
