use std::sync::Arc;

use rumblelab_session::{
    Capabilities, CooperativeLevel, Device, DeviceDescriptor, DeviceId, Direction, Effect,
    EffectKind, EffectSpec, PolledSnapshot, Result, StateSignal,
};

use crate::command::{Command, EffectId};
use crate::error::Error;
use crate::manager::{DeviceEntry, Inner};

/// Handle to a joystick opened by the runtime thread.
pub(crate) struct SdlDevice {
    descriptor: DeviceDescriptor,
    caps: Capabilities,
    inner: Arc<Inner>,
}

impl SdlDevice {
    pub(crate) fn new(entry: DeviceEntry, inner: Arc<Inner>) -> Self {
        Self {
            descriptor: entry.descriptor,
            caps: entry.caps,
            inner,
        }
    }

    fn id(&self) -> DeviceId {
        self.descriptor.id
    }
}

impl Device for SdlDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    fn configure(&self, level: CooperativeLevel) -> Result<()> {
        // Background joystick events are enabled process-wide by the runtime.
        if level == CooperativeLevel::ForegroundShared {
            log::debug!("{}: SDL has no foreground-only mode", self.descriptor.name);
        }
        Ok(())
    }

    fn acquire(&self) -> Result<()> {
        let id = self.id();
        Ok(self.inner.call(|reply| Command::Acquire { id, reply })?)
    }

    fn unacquire(&self) {
        self.inner.send(Command::Unacquire { id: self.id() });
    }

    fn capabilities(&self) -> Result<Capabilities> {
        Ok(self.caps)
    }

    fn read_state(&self) -> Result<PolledSnapshot> {
        let snapshots = self
            .inner
            .snapshots
            .read()
            .map_err(|e| Error::Backend(format!("{e}")))?;
        snapshots
            .get(&self.id())
            .copied()
            .ok_or_else(|| Error::NotFound(self.id()).into())
    }

    fn effect_kinds(&self) -> Result<Vec<EffectKind>> {
        let id = self.id();
        Ok(self.inner.call(|reply| Command::EffectKinds { id, reply })?)
    }

    fn create_effect(&self, spec: &EffectSpec) -> Result<Box<dyn Effect>> {
        let id = self.id();
        let spec = *spec;
        let effect = self
            .inner
            .call(|reply| Command::CreateEffect { id, spec, reply })?;
        Ok(Box::new(SdlEffect {
            device: id,
            effect,
            kind: spec.params.kind(),
            inner: self.inner.clone(),
        }))
    }

    fn set_feedback(&self, left: u16, right: u16) -> Result<()> {
        let id = self.id();
        Ok(self
            .inner
            .call(|reply| Command::Rumble { id, left, right, reply })?)
    }

    fn watch(&self, signal: Option<StateSignal>) {
        if let Ok(mut watchers) = self.inner.watchers.lock() {
            match signal {
                Some(signal) => {
                    watchers.insert(self.id(), signal);
                }
                None => {
                    watchers.remove(&self.id());
                }
            }
        }
    }
}

/// A haptic effect created on the runtime thread; destroyed when dropped.
pub(crate) struct SdlEffect {
    device: DeviceId,
    effect: EffectId,
    kind: EffectKind,
    inner: Arc<Inner>,
}

impl Effect for SdlEffect {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn set_direction(&mut self, direction: Direction, axes: u8) -> Result<()> {
        let (id, effect) = (self.device, self.effect);
        Ok(self.inner.call(|reply| Command::SetDirection {
            id,
            effect,
            direction,
            axes,
            reply,
        })?)
    }

    fn start(&mut self) -> Result<()> {
        let (id, effect) = (self.device, self.effect);
        Ok(self
            .inner
            .call(|reply| Command::StartEffect { id, effect, reply })?)
    }

    fn stop(&mut self) -> Result<()> {
        let (id, effect) = (self.device, self.effect);
        Ok(self
            .inner
            .call(|reply| Command::StopEffect { id, effect, reply })?)
    }
}

impl Drop for SdlEffect {
    fn drop(&mut self) {
        self.inner.send(Command::DestroyEffect {
            id: self.device,
            effect: self.effect,
        });
    }
}
