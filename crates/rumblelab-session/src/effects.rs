use std::fmt;

use crate::config::EffectDefaults;
use crate::types::Direction;

/// Periodic effect waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    SawtoothUp,
    SawtoothDown,
}

/// Condition effect flavour; all share the saturation/coefficient payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Spring,
    Damper,
    Inertia,
    Friction,
}

/// Closed set of haptic effect kinds a device can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Constant,
    Periodic(Waveform),
    Ramp,
    Condition(ConditionKind),
}

impl EffectKind {
    /// Builds the default parameter payload for this kind.
    pub fn default_params(&self, defaults: &EffectDefaults) -> EffectParams {
        match *self {
            EffectKind::Constant => EffectParams::Constant {
                magnitude: defaults.constant_magnitude,
            },
            EffectKind::Periodic(waveform) => EffectParams::Periodic {
                waveform,
                magnitude: defaults.periodic_magnitude,
                period_ms: defaults.periodic_period_ms,
            },
            EffectKind::Ramp => EffectParams::Ramp {
                start: defaults.ramp_start,
                end: defaults.ramp_end,
            },
            EffectKind::Condition(kind) => EffectParams::Condition {
                kind,
                saturation: defaults.condition_saturation,
                coefficient: defaults.condition_coefficient,
            },
        }
    }

    pub fn is_directional(&self) -> bool {
        !matches!(self, EffectKind::Condition(_))
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EffectKind::Constant => "Constant Force",
            EffectKind::Periodic(Waveform::Sine) => "Sine Wave",
            EffectKind::Periodic(Waveform::Square) => "Square Wave",
            EffectKind::Periodic(Waveform::Triangle) => "Triangle Wave",
            EffectKind::Periodic(Waveform::SawtoothUp) => "Sawtooth Up",
            EffectKind::Periodic(Waveform::SawtoothDown) => "Sawtooth Down",
            EffectKind::Ramp => "Ramp Force",
            EffectKind::Condition(ConditionKind::Spring) => "Spring",
            EffectKind::Condition(ConditionKind::Damper) => "Damper",
            EffectKind::Condition(ConditionKind::Inertia) => "Inertia",
            EffectKind::Condition(ConditionKind::Friction) => "Friction",
        };
        f.write_str(name)
    }
}

/// Per-kind effect parameters. Magnitudes are normalized to `[0.0, 1.0]`
/// (ramp endpoints to `[-1.0, 1.0]`); backends scale them to device units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectParams {
    Constant {
        magnitude: f32,
    },
    Periodic {
        waveform: Waveform,
        magnitude: f32,
        period_ms: u16,
    },
    Ramp {
        start: f32,
        end: f32,
    },
    Condition {
        kind: ConditionKind,
        saturation: f32,
        coefficient: f32,
    },
}

impl EffectParams {
    pub fn kind(&self) -> EffectKind {
        match *self {
            EffectParams::Constant { .. } => EffectKind::Constant,
            EffectParams::Periodic { waveform, .. } => EffectKind::Periodic(waveform),
            EffectParams::Ramp { .. } => EffectKind::Ramp,
            EffectParams::Condition { kind, .. } => EffectKind::Condition(kind),
        }
    }
}

/// Everything a backend needs to instantiate one effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectSpec {
    pub params: EffectParams,
    /// Number of force-feedback axes the effect spans.
    pub axes: u8,
    pub direction: Direction,
}

/// Playback status of an effect handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStatus {
    Idle,
    Playing,
    Released,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_match_kind() {
        let defaults = EffectDefaults::default();
        let kinds = [
            EffectKind::Constant,
            EffectKind::Periodic(Waveform::Triangle),
            EffectKind::Ramp,
            EffectKind::Condition(ConditionKind::Friction),
        ];
        for kind in kinds {
            assert_eq!(kind.default_params(&defaults).kind(), kind);
        }
    }

    #[test]
    fn periodic_defaults_use_configured_period() {
        let defaults = EffectDefaults {
            periodic_period_ms: 250,
            ..EffectDefaults::default()
        };
        match EffectKind::Periodic(Waveform::Sine).default_params(&defaults) {
            EffectParams::Periodic { period_ms, .. } => assert_eq!(period_ms, 250),
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn display_names_are_distinct() {
        assert_eq!(EffectKind::Constant.to_string(), "Constant Force");
        assert_eq!(
            EffectKind::Condition(ConditionKind::Spring).to_string(),
            "Spring"
        );
    }
}
