//! Controller session management: device and effect registries, the shared
//! selection, background pollers and the feedback policy that turns input into
//! force-feedback commands.

mod backend;
mod config;
mod device_registry;
mod effect_registry;
mod effects;
mod error;
mod feedback;
mod handle;
pub mod mock;
mod notifier;
mod selection;
mod session;
mod types;
pub mod worker;

pub use crate::backend::{Device, Discovery, Effect, SlotSource};
pub use crate::config::{
    ConfigError, EffectDefaults, HotplugPolicy, PollConfig, SessionConfig, MAX_SLOTS,
};
pub use crate::device_registry::{DeviceRegistry, RefreshOutcome};
pub use crate::effect_registry::EffectRegistry;
pub use crate::effects::{
    ConditionKind, EffectKind, EffectParams, EffectSpec, EffectStatus, Waveform,
};
pub use crate::error::{Error, Result};
pub use crate::feedback::{
    device_rumble, rumble_intensities, slot_rumble, stick_direction, stick_magnitude,
    FeedbackController, FeedbackDecision,
};
pub use crate::handle::{DeviceHandle, EffectHandle};
pub use crate::notifier::{ChangeNotifier, PollMessage, StateSignal, UiMessage, UiReceiver};
pub use crate::selection::{ActiveRead, SelectionState};
pub use crate::session::{HotplugOutcome, Session};
pub use crate::types::{
    ButtonSet, Capabilities, CooperativeLevel, DeviceDescriptor, DeviceId, Direction,
    GamepadState, Hat, PolledSnapshot, SlotCaps, SlotReading, MAX_AXES, MAX_HATS,
};
