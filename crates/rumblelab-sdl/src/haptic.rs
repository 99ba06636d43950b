//! Thin wrapper over SDL's haptic API, which the safe `sdl2` bindings only
//! expose as simple rumble.
//!
//! Everything here must stay on the runtime thread.

use std::mem;

use rumblelab_session::{
    ConditionKind, Direction, EffectKind, EffectParams, Waveform,
};
use sdl2::sys;

use crate::error::{Error, Result};

/// Effect kinds in the order they are advertised, with their SDL feature bit.
const KIND_BITS: [(EffectKind, u32); 10] = [
    (EffectKind::Constant, sys::SDL_HAPTIC_CONSTANT as u32),
    (EffectKind::Periodic(Waveform::Sine), sys::SDL_HAPTIC_SINE as u32),
    (EffectKind::Periodic(Waveform::Triangle), sys::SDL_HAPTIC_TRIANGLE as u32),
    (EffectKind::Periodic(Waveform::SawtoothUp), sys::SDL_HAPTIC_SAWTOOTHUP as u32),
    (EffectKind::Periodic(Waveform::SawtoothDown), sys::SDL_HAPTIC_SAWTOOTHDOWN as u32),
    (EffectKind::Ramp, sys::SDL_HAPTIC_RAMP as u32),
    (EffectKind::Condition(ConditionKind::Spring), sys::SDL_HAPTIC_SPRING as u32),
    (EffectKind::Condition(ConditionKind::Damper), sys::SDL_HAPTIC_DAMPER as u32),
    (EffectKind::Condition(ConditionKind::Inertia), sys::SDL_HAPTIC_INERTIA as u32),
    (EffectKind::Condition(ConditionKind::Friction), sys::SDL_HAPTIC_FRICTION as u32),
];

/// Effect kinds present in an `SDL_HapticQuery` feature mask.
pub(crate) fn kinds_from_mask(mask: u32) -> Vec<EffectKind> {
    KIND_BITS
        .iter()
        .filter(|(_, bit)| mask & bit != 0)
        .map(|(kind, _)| *kind)
        .collect()
}

fn type_bits(kind: EffectKind) -> Option<u16> {
    KIND_BITS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, bit)| *bit as u16)
}

fn level(value: f32) -> i16 {
    (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

fn saturation(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * f32::from(u16::MAX)).round() as u16
}

fn direction(direction: Direction, axes: u8) -> sys::SDL_HapticDirection {
    let y = if axes >= 2 { direction.y() } else { 0 };
    sys::SDL_HapticDirection {
        type_: sys::SDL_HAPTIC_CARTESIAN as u8,
        dir: [direction.x(), y, 0],
    }
}

/// Builds the SDL effect description for `params`.
///
/// Effects play until stopped. Square waves have no SDL counterpart.
pub(crate) fn build_effect(
    params: &EffectParams,
    dir: Direction,
    axes: u8,
) -> Result<sys::SDL_HapticEffect> {
    let type_ = type_bits(params.kind()).ok_or(Error::Unsupported)?;
    // SAFETY: SDL_HapticEffect is a plain C union; all-zero is a valid value.
    let mut effect: sys::SDL_HapticEffect = unsafe { mem::zeroed() };
    let length = sys::SDL_HAPTIC_INFINITY as u32;

    match *params {
        EffectParams::Constant { magnitude } => {
            // SAFETY: as above.
            let mut constant: sys::SDL_HapticConstant = unsafe { mem::zeroed() };
            constant.type_ = type_;
            constant.direction = direction(dir, axes);
            constant.length = length;
            constant.level = level(magnitude);
            effect.constant = constant;
        }
        EffectParams::Periodic {
            magnitude,
            period_ms,
            ..
        } => {
            // SAFETY: as above.
            let mut periodic: sys::SDL_HapticPeriodic = unsafe { mem::zeroed() };
            periodic.type_ = type_;
            periodic.direction = direction(dir, axes);
            periodic.length = length;
            periodic.period = period_ms;
            periodic.magnitude = level(magnitude);
            effect.periodic = periodic;
        }
        EffectParams::Ramp { start, end } => {
            // SAFETY: as above.
            let mut ramp: sys::SDL_HapticRamp = unsafe { mem::zeroed() };
            ramp.type_ = type_;
            ramp.direction = direction(dir, axes);
            ramp.length = length;
            ramp.start = level(start);
            ramp.end = level(end);
            effect.ramp = ramp;
        }
        EffectParams::Condition {
            saturation: sat,
            coefficient,
            ..
        } => {
            // SAFETY: as above.
            let mut condition: sys::SDL_HapticCondition = unsafe { mem::zeroed() };
            condition.type_ = type_;
            condition.length = length;
            condition.right_sat = [saturation(sat); 3];
            condition.left_sat = [saturation(sat); 3];
            condition.right_coeff = [level(coefficient); 3];
            condition.left_coeff = [level(coefficient); 3];
            effect.condition = condition;
        }
    }
    Ok(effect)
}

/// Single strength for SDL's simple rumble from the two motor levels.
pub(crate) fn rumble_strength(left: u16, right: u16) -> f32 {
    f32::from(left.max(right)) / f32::from(u16::MAX)
}

/// USB vendor and product ids of an open joystick, zero when unknown.
pub(crate) fn usb_ids(instance_id: u32) -> (u16, u16) {
    // SAFETY: returns null for instance ids that are not open.
    let joystick = unsafe { sys::SDL_JoystickFromInstanceID(instance_id as sys::SDL_JoystickID) };
    if joystick.is_null() {
        return (0, 0);
    }
    // SAFETY: `joystick` is a live handle owned by the joystick subsystem.
    unsafe {
        (
            sys::SDL_JoystickGetVendor(joystick),
            sys::SDL_JoystickGetProduct(joystick),
        )
    }
}

/// An open haptic device bound to one joystick.
pub(crate) struct Haptic {
    raw: *mut sys::SDL_Haptic,
    axes: u8,
    features: u32,
    rumble_ready: bool,
}

impl Haptic {
    /// Opens the haptic interface of the joystick with `instance_id`, if it has one.
    pub(crate) fn open(instance_id: u32) -> Option<Self> {
        // SAFETY: null-checked below; the joystick stays open while the haptic
        // device does.
        let raw = unsafe {
            let joystick = sys::SDL_JoystickFromInstanceID(instance_id as sys::SDL_JoystickID);
            if joystick.is_null() || sys::SDL_JoystickIsHaptic(joystick) <= 0 {
                return None;
            }
            sys::SDL_HapticOpenFromJoystick(joystick)
        };
        if raw.is_null() {
            log::debug!("joystick {instance_id}: haptic open failed: {}", sdl2::get_error());
            return None;
        }
        // SAFETY: `raw` is a valid, open haptic device.
        let (features, axes) = unsafe { (sys::SDL_HapticQuery(raw), sys::SDL_HapticNumAxes(raw)) };
        Some(Self {
            raw,
            axes: axes.clamp(0, i32::from(u8::MAX)) as u8,
            features,
            rumble_ready: false,
        })
    }

    pub(crate) fn axes(&self) -> u8 {
        self.axes
    }

    pub(crate) fn kinds(&self) -> Vec<EffectKind> {
        kinds_from_mask(self.features)
    }

    pub(crate) fn create(&mut self, effect: &mut sys::SDL_HapticEffect) -> Result<i32> {
        // SAFETY: `self.raw` is open; SDL copies the effect description.
        let id = unsafe { sys::SDL_HapticNewEffect(self.raw, effect) };
        if id < 0 {
            return Err(last_error());
        }
        Ok(id)
    }

    pub(crate) fn update(&mut self, id: i32, effect: &mut sys::SDL_HapticEffect) -> Result<()> {
        // SAFETY: as in `create`.
        check(unsafe { sys::SDL_HapticUpdateEffect(self.raw, id, effect) })
    }

    pub(crate) fn run(&mut self, id: i32) -> Result<()> {
        // SAFETY: `self.raw` is open; unknown ids are rejected by SDL.
        check(unsafe { sys::SDL_HapticRunEffect(self.raw, id, 1) })
    }

    pub(crate) fn stop(&mut self, id: i32) -> Result<()> {
        // SAFETY: as in `run`.
        check(unsafe { sys::SDL_HapticStopEffect(self.raw, id) })
    }

    pub(crate) fn destroy(&mut self, id: i32) {
        // SAFETY: as in `run`.
        unsafe { sys::SDL_HapticDestroyEffect(self.raw, id) }
    }

    /// Simple rumble for joysticks whose driver has no native rumble.
    /// Zero on both motors stops it.
    pub(crate) fn rumble(&mut self, left: u16, right: u16, ms: u32) -> Result<()> {
        let strength = rumble_strength(left, right);
        if strength <= 0.0 {
            if !self.rumble_ready {
                return Ok(());
            }
            // SAFETY: `self.raw` is open and rumble was initialised.
            return check(unsafe { sys::SDL_HapticRumbleStop(self.raw) });
        }
        if !self.rumble_ready {
            // SAFETY: `self.raw` is open.
            check(unsafe { sys::SDL_HapticRumbleInit(self.raw) })?;
            self.rumble_ready = true;
        }
        // SAFETY: `self.raw` is open and rumble was initialised.
        check(unsafe { sys::SDL_HapticRumblePlay(self.raw, strength, ms) })
    }
}

impl Drop for Haptic {
    fn drop(&mut self) {
        // SAFETY: closes the device opened in `open`, destroying its effects.
        unsafe { sys::SDL_HapticClose(self.raw) }
    }
}

fn check(code: i32) -> Result<()> {
    if code < 0 {
        Err(last_error())
    } else {
        Ok(())
    }
}

fn last_error() -> Error {
    Error::Backend(sdl2::get_error())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_maps_to_kinds_in_order() {
        let mask = sys::SDL_HAPTIC_SPRING as u32
            | sys::SDL_HAPTIC_CONSTANT as u32
            | sys::SDL_HAPTIC_SINE as u32;
        assert_eq!(
            kinds_from_mask(mask),
            vec![
                EffectKind::Constant,
                EffectKind::Periodic(Waveform::Sine),
                EffectKind::Condition(ConditionKind::Spring),
            ]
        );
        assert!(kinds_from_mask(0).is_empty());
    }

    #[test]
    fn constant_effect_carries_level_and_direction() {
        let params = EffectParams::Constant { magnitude: 0.5 };
        let effect = build_effect(&params, Direction([100, -40]), 2).unwrap();
        // SAFETY: built as a constant effect above.
        let constant = unsafe { effect.constant };
        assert_eq!(constant.type_, sys::SDL_HAPTIC_CONSTANT as u16);
        assert_eq!(constant.level, 16384);
        assert_eq!(constant.direction.dir, [100, -40, 0]);
        assert_eq!(constant.length, sys::SDL_HAPTIC_INFINITY as u32);
    }

    #[test]
    fn single_axis_direction_drops_y() {
        let params = EffectParams::Ramp { start: -1.0, end: 1.0 };
        let effect = build_effect(&params, Direction([7, 9]), 1).unwrap();
        // SAFETY: built as a ramp effect above.
        let ramp = unsafe { effect.ramp };
        assert_eq!(ramp.direction.dir, [7, 0, 0]);
        assert_eq!((ramp.start, ramp.end), (-i16::MAX, i16::MAX));
    }

    #[test]
    fn rumble_strength_follows_stronger_motor() {
        assert_eq!(rumble_strength(0, 0), 0.0);
        assert_eq!(rumble_strength(u16::MAX, 0), 1.0);
        assert_eq!(rumble_strength(0, u16::MAX), 1.0);
        let half = rumble_strength(1000, 32768);
        assert!((half - 0.5).abs() < 0.001);
    }

    #[test]
    fn square_wave_is_unsupported() {
        let params = EffectParams::Periodic {
            waveform: Waveform::Square,
            magnitude: 1.0,
            period_ms: 50,
        };
        assert!(matches!(
            build_effect(&params, Direction::default(), 1),
            Err(Error::Unsupported)
        ));
    }
}
