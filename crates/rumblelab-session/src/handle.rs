use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{Device, Effect};
use crate::effects::{EffectKind, EffectStatus};
use crate::error::{Error, Result};
use crate::notifier::StateSignal;
use crate::types::{Capabilities, DeviceDescriptor, DeviceId, Direction, PolledSnapshot};

/// A shared, owned connection to one controller.
///
/// Handles are compared by identity (`Arc::ptr_eq`): a device that is unplugged
/// and plugged back in gets a new handle.
pub struct DeviceHandle {
    device: Box<dyn Device>,
    acquired: AtomicBool,
    retired: AtomicBool,
}

impl DeviceHandle {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            acquired: AtomicBool::new(false),
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.device.descriptor().id
    }

    pub fn name(&self) -> &str {
        &self.device.descriptor().name
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.device.descriptor()
    }

    pub fn capabilities(&self) -> Result<Capabilities> {
        self.device.capabilities()
    }

    pub fn read_state(&self) -> Result<PolledSnapshot> {
        self.device.read_state()
    }

    pub fn set_feedback(&self, left: u16, right: u16) -> Result<()> {
        self.device.set_feedback(left, right)
    }

    /// Returns the underlying backend device.
    pub fn device(&self) -> &dyn Device {
        self.device.as_ref()
    }

    pub fn acquire(&self) -> Result<()> {
        if self.is_retired() {
            return Err(Error::NotFound(self.id()));
        }
        self.device.acquire()?;
        self.acquired.store(true, Ordering::Release);
        Ok(())
    }

    pub fn unacquire(&self) {
        if self.acquired.swap(false, Ordering::AcqRel) {
            self.device.unacquire();
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    /// True once the registry dropped the device from its list.
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    pub(crate) fn arm(&self, signal: Option<StateSignal>) {
        self.device.watch(signal);
    }

    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.device.watch(None);
        self.unacquire();
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("acquired", &self.is_acquired())
            .field("retired", &self.is_retired())
            .finish()
    }
}

struct EffectSlot {
    effect: Option<Box<dyn Effect>>,
    status: EffectStatus,
}

/// A shared haptic effect bound to one device.
///
/// The handle keeps its device alive. Once released by its registry every
/// operation fails with [`Error::Released`].
pub struct EffectHandle {
    name: String,
    kind: EffectKind,
    axes: u8,
    device: Arc<DeviceHandle>,
    slot: Mutex<EffectSlot>,
}

impl EffectHandle {
    pub fn new(device: Arc<DeviceHandle>, effect: Box<dyn Effect>, axes: u8) -> Self {
        let kind = effect.kind();
        Self {
            name: kind.to_string(),
            kind,
            axes,
            device,
            slot: Mutex::new(EffectSlot {
                effect: Some(effect),
                status: EffectStatus::Idle,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EffectKind {
        self.kind
    }

    /// Axis count the effect was created with.
    pub fn axes(&self) -> u8 {
        self.axes
    }

    pub fn device(&self) -> &Arc<DeviceHandle> {
        &self.device
    }

    pub fn status(&self) -> EffectStatus {
        match self.slot.lock() {
            Ok(slot) => slot.status,
            Err(poisoned) => poisoned.into_inner().status,
        }
    }

    pub fn set_direction(&self, direction: Direction, axes: u8) -> Result<()> {
        let mut slot = self.lock()?;
        let effect = slot.effect.as_mut().ok_or(Error::Released)?;
        effect.set_direction(direction, axes)
    }

    pub fn start(&self) -> Result<()> {
        let mut slot = self.lock()?;
        let effect = slot.effect.as_mut().ok_or(Error::Released)?;
        effect.start()?;
        slot.status = EffectStatus::Playing;
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        let mut slot = self.lock()?;
        let effect = slot.effect.as_mut().ok_or(Error::Released)?;
        effect.stop()?;
        slot.status = EffectStatus::Idle;
        Ok(())
    }

    /// Stops playback if needed and destroys the backend effect.
    pub(crate) fn release(&self) {
        let mut slot = match self.slot.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut effect) = slot.effect.take() {
            if slot.status == EffectStatus::Playing {
                if let Err(e) = effect.stop() {
                    log::debug!("failed to stop {} on release: {e}", self.name);
                }
            }
        }
        slot.status = EffectStatus::Released;
    }

    fn lock(&self) -> Result<MutexGuard<'_, EffectSlot>> {
        self.slot.lock().map_err(|e| Error::Backend(format!("{e}")))
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectHandle")
            .field("name", &self.name)
            .field("device", &self.device.id())
            .field("axes", &self.axes)
            .field("status", &self.status())
            .finish()
    }
}
