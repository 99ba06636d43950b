//! Seams to the platform device API.
//!
//! A backend provides device discovery ([`Discovery`]), open devices
//! ([`Device`]), haptic effects bound to a device ([`Effect`]) and, optionally,
//! a fixed set of gamepad slots ([`SlotSource`]). Everything above this module is
//! backend-agnostic.

use crate::effects::{EffectKind, EffectSpec};
use crate::error::Result;
use crate::notifier::{ChangeNotifier, StateSignal};
use crate::types::{
    Capabilities, CooperativeLevel, DeviceDescriptor, Direction, PolledSnapshot,
    SlotReading,
};

/// Device enumeration entry point.
pub trait Discovery: Send + Sync {
    /// Lists currently attached controllers in a stable order.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Opens a connection to one enumerated device.
    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Device>>;

    /// Installs (or removes) the listener notified on device arrival/removal.
    fn set_hotplug_listener(&self, listener: Option<ChangeNotifier>);
}

/// An open connection to one physical controller.
pub trait Device: Send + Sync {
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Sets how the device is shared; called once right after opening.
    fn configure(&self, level: CooperativeLevel) -> Result<()>;

    fn acquire(&self) -> Result<()>;

    fn unacquire(&self);

    fn capabilities(&self) -> Result<Capabilities>;

    /// Reads the full current input state.
    fn read_state(&self) -> Result<PolledSnapshot>;

    /// Lists the effect kinds the device can play.
    fn effect_kinds(&self) -> Result<Vec<EffectKind>>;

    fn create_effect(&self, spec: &EffectSpec) -> Result<Box<dyn Effect>>;

    /// Sets left/right rumble motor speeds; `(0, 0)` stops rumble.
    fn set_feedback(&self, left: u16, right: u16) -> Result<()>;

    /// Arms (`Some`) or disarms (`None`) the state-changed notification.
    fn watch(&self, signal: Option<StateSignal>);
}

/// A haptic effect instance living on a device.
pub trait Effect: Send {
    fn kind(&self) -> EffectKind;

    /// Updates the direction, using the first `axes` components.
    fn set_direction(&mut self, direction: Direction, axes: u8) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// A fixed number of independently polled gamepad slots.
pub trait SlotSource: Send + Sync {
    fn slot_count(&self) -> usize;

    /// Queries capabilities and state of `slot`.
    fn query(&self, slot: usize) -> Result<SlotReading>;

    fn set_rumble(&self, slot: usize, left: u16, right: u16) -> Result<()>;
}
