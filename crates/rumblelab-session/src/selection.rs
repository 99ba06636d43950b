use std::sync::{Arc, Mutex, MutexGuard};

use crate::handle::{DeviceHandle, EffectHandle};
use crate::notifier::StateSignal;
use crate::types::PolledSnapshot;

#[derive(Default)]
struct SelectionSlot {
    device: Option<Arc<DeviceHandle>>,
    effect: Option<Arc<EffectHandle>>,
    signal: Option<StateSignal>,
}

/// A successful state read paired with the effect selected at that moment.
#[derive(Debug, Clone)]
pub struct ActiveRead {
    pub device: Arc<DeviceHandle>,
    pub snapshot: PolledSnapshot,
    pub effect: Option<Arc<EffectHandle>>,
}

/// The currently selected device and effect.
///
/// Every accessor takes the same mutex, which only guards swapping the
/// references: readers keep using their own clones after the slot moves on.
#[derive(Default)]
pub struct SelectionState {
    slot: Mutex<SelectionSlot>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the selected device and clears the selected effect.
    ///
    /// The previous device is disarmed and unacquired; a new device is acquired
    /// and armed with the attached poller signal, which is woken once so the
    /// poller reads an initial snapshot.
    pub fn select_device(&self, device: Option<Arc<DeviceHandle>>) {
        let mut slot = self.lock();
        slot.effect = None;
        if let Some(previous) = slot.device.take() {
            previous.arm(None);
            previous.unacquire();
        }
        if let Some(device) = device.as_ref() {
            if let Err(e) = device.acquire() {
                log::warn!("failed to acquire {}: {e}", device.name());
            }
            if let Some(signal) = slot.signal.as_ref() {
                device.arm(Some(signal.clone()));
                signal.state_changed();
            }
        }
        slot.device = device;
    }

    /// Replaces the selected effect.
    ///
    /// The effect is expected to belong to the selected device; this is not
    /// checked.
    pub fn select_effect(&self, effect: Option<Arc<EffectHandle>>) {
        let mut slot = self.lock();
        slot.effect = effect;
    }

    /// Returns the selected device, or `None` when nothing is selected or the
    /// selected device has been retired.
    pub fn snapshot_device(&self) -> Option<Arc<DeviceHandle>> {
        let slot = self.lock();
        slot.device.as_ref().filter(|d| !d.is_retired()).cloned()
    }

    /// True when `device` is the selected device.
    pub fn is_selected(&self, device: &Arc<DeviceHandle>) -> bool {
        self.lock().device.as_ref().is_some_and(|d| Arc::ptr_eq(d, device))
    }

    /// Returns the selected effect without reading the device.
    pub fn selected_effect(&self) -> Option<Arc<EffectHandle>> {
        self.lock().effect.clone()
    }

    /// Reads the selected device and returns the state with the selected effect.
    ///
    /// Returns `None` when no device is selected or the read fails, so a caller
    /// never gets an effect without fresh state.
    pub fn snapshot_effect(&self) -> Option<ActiveRead> {
        let (device, effect) = {
            let slot = self.lock();
            let device = slot.device.as_ref().filter(|d| !d.is_retired())?.clone();
            (device, slot.effect.clone())
        };
        match device.read_state() {
            Ok(snapshot) => Some(ActiveRead {
                device,
                snapshot,
                effect,
            }),
            Err(e) => {
                log::debug!("read of {} failed: {e}", device.name());
                None
            }
        }
    }

    /// Installs the poller's signal and arms the selected device with it.
    pub fn attach_signal(&self, signal: StateSignal) {
        let mut slot = self.lock();
        if let Some(device) = slot.device.as_ref() {
            device.arm(Some(signal.clone()));
            signal.state_changed();
        }
        slot.signal = Some(signal);
    }

    /// Removes the poller's signal and disarms the selected device.
    pub fn detach_signal(&self) {
        let mut slot = self.lock();
        if let Some(device) = slot.device.as_ref() {
            device.arm(None);
        }
        slot.signal = None;
    }

    fn lock(&self) -> MutexGuard<'_, SelectionSlot> {
        match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
