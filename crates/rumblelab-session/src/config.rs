use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

/// Maximum number of slots the multi-slot poller accepts.
pub const MAX_SLOTS: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("yaml deserialize error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// What `on_hotplug` does after the selected device disappears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HotplugPolicy {
    /// Select the first remaining device, if any.
    #[default]
    ReselectFirst,
    /// Leave the selection empty.
    Clear,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Multi-slot poll period in milliseconds.
    pub tick_ms: u64,
    /// Number of multi-slot slots.
    pub slots: usize,
    /// Capacity of the UI notification queue.
    pub ui_queue: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            slots: 4,
            ui_queue: 64,
        }
    }
}

impl PollConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Default parameter set used when instantiating effects.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EffectDefaults {
    pub constant_magnitude: f32,
    pub periodic_magnitude: f32,
    pub periodic_period_ms: u16,
    pub condition_saturation: f32,
    pub condition_coefficient: f32,
    pub ramp_start: f32,
    pub ramp_end: f32,
}

impl Default for EffectDefaults {
    fn default() -> Self {
        Self {
            constant_magnitude: 0.5,
            periodic_magnitude: 0.5,
            periodic_period_ms: 100,
            condition_saturation: 1.0,
            condition_coefficient: 0.5,
            ramp_start: 0.0,
            ramp_end: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub poll: PollConfig,
    pub effects: EffectDefaults,
    pub hotplug: HotplugPolicy,
}

impl SessionConfig {
    /// Parse and validate a yaml config.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SessionConfig = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path)?;
        Self::parse(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.tick_ms == 0 {
            return Err(invalid("poll.tick_ms", "must be greater than zero"));
        }
        if self.poll.slots == 0 || self.poll.slots > MAX_SLOTS {
            return Err(invalid(
                "poll.slots",
                format!("must be within 1..={MAX_SLOTS}"),
            ));
        }
        if self.poll.ui_queue == 0 {
            return Err(invalid("poll.ui_queue", "must be greater than zero"));
        }
        let e = &self.effects;
        for (field, value) in [
            ("effects.constant_magnitude", e.constant_magnitude),
            ("effects.periodic_magnitude", e.periodic_magnitude),
            ("effects.condition_saturation", e.condition_saturation),
            ("effects.condition_coefficient", e.condition_coefficient),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within [0, 1]"));
            }
        }
        for (field, value) in [
            ("effects.ramp_start", e.ramp_start),
            ("effects.ramp_end", e.ramp_end),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be within [-1, 1]"));
            }
        }
        if e.periodic_period_ms == 0 {
            return Err(invalid(
                "effects.periodic_period_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let config = SessionConfig::parse("").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.poll.tick(), Duration::from_millis(20));
        assert_eq!(config.poll.slots, 4);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "poll:\n  tick_ms: 10\nhotplug: clear\n";
        let config = SessionConfig::parse(yaml).unwrap();
        assert_eq!(config.poll.tick_ms, 10);
        assert_eq!(config.poll.slots, 4);
        assert_eq!(config.hotplug, HotplugPolicy::Clear);
        assert_eq!(config.effects, EffectDefaults::default());
    }

    #[test]
    fn zero_tick_is_rejected() {
        let yaml = "poll:\n  tick_ms: 0\n";
        assert!(matches!(
            SessionConfig::parse(yaml),
            Err(ConfigError::Invalid { field: "poll.tick_ms", .. })
        ));
    }

    #[test]
    fn magnitude_out_of_range_is_rejected() {
        let yaml = "effects:\n  constant_magnitude: 1.5\n";
        assert!(matches!(
            SessionConfig::parse(yaml),
            Err(ConfigError::Invalid {
                field: "effects.constant_magnitude",
                ..
            })
        ));
    }

    #[test]
    fn unknown_field_is_a_yaml_error() {
        let yaml = "poll:\n  tick: 5\n";
        assert!(matches!(SessionConfig::parse(yaml), Err(ConfigError::Yaml(_))));
    }
}
