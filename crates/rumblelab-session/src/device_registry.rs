use std::sync::Arc;

use crate::backend::Discovery;
use crate::error::Result;
use crate::handle::DeviceHandle;
use crate::types::{CooperativeLevel, DeviceId};

/// Devices added and retired by one [`DeviceRegistry::refresh`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub added: Vec<DeviceId>,
    pub retired: Vec<DeviceId>,
}

impl RefreshOutcome {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.retired.is_empty()
    }
}

/// Canonical list of open controller devices.
pub struct DeviceRegistry {
    discovery: Arc<dyn Discovery>,
    devices: Vec<Arc<DeviceHandle>>,
}

impl DeviceRegistry {
    pub fn new(discovery: Arc<dyn Discovery>) -> Self {
        Self {
            discovery,
            devices: Vec::new(),
        }
    }

    /// Re-enumerates devices, opening new ones and retiring missing ones.
    ///
    /// Handles of devices still present are kept, so the list is stable by
    /// identity across refreshes without changes. Devices that fail to open are
    /// left out; only a failing enumeration is an error.
    pub fn refresh(&mut self) -> Result<RefreshOutcome> {
        self.refresh_with(|_| {})
    }

    /// Like [`DeviceRegistry::refresh`], calling `before_retire` with each
    /// missing device while it is still acquired.
    pub fn refresh_with(
        &mut self,
        mut before_retire: impl FnMut(&Arc<DeviceHandle>),
    ) -> Result<RefreshOutcome> {
        let descriptors = self.discovery.enumerate()?;
        let mut outcome = RefreshOutcome::default();
        let mut next = Vec::with_capacity(descriptors.len());

        for descriptor in &descriptors {
            if let Some(existing) = self.devices.iter().find(|h| h.id() == descriptor.id) {
                next.push(existing.clone());
                continue;
            }
            let device = match self.discovery.open(descriptor) {
                Ok(device) => device,
                Err(e) => {
                    log::warn!("skipping device {} ({}): {e}", descriptor.name, descriptor.id);
                    continue;
                }
            };
            if let Err(e) = device.configure(CooperativeLevel::BackgroundExclusive) {
                log::warn!(
                    "skipping device {} ({}): cannot set cooperative level: {e}",
                    descriptor.name,
                    descriptor.id
                );
                continue;
            }
            log::debug!("opened device {} ({})", descriptor.name, descriptor.id);
            outcome.added.push(descriptor.id);
            next.push(Arc::new(DeviceHandle::new(device)));
        }

        for old in &self.devices {
            if !next.iter().any(|h| Arc::ptr_eq(h, old)) {
                log::debug!("retiring device {} ({})", old.name(), old.id());
                before_retire(old);
                old.retire();
                outcome.retired.push(old.id());
            }
        }

        self.devices = next;
        Ok(outcome)
    }

    /// Lists `(name, handle)` pairs in enumeration order.
    pub fn list(&self) -> Vec<(String, Arc<DeviceHandle>)> {
        self.devices
            .iter()
            .map(|h| (h.name().to_string(), h.clone()))
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<Arc<DeviceHandle>> {
        self.devices.get(index).cloned()
    }

    pub fn by_id(&self, id: DeviceId) -> Option<Arc<DeviceHandle>> {
        self.devices.iter().find(|h| h.id() == id).cloned()
    }

    /// Index of `handle` in the list, by identity.
    pub fn position(&self, handle: &Arc<DeviceHandle>) -> Option<usize> {
        self.devices.iter().position(|h| Arc::ptr_eq(h, handle))
    }

    pub fn contains(&self, handle: &Arc<DeviceHandle>) -> bool {
        self.position(handle).is_some()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Retires and drops every handle.
    pub fn release_all(&mut self) {
        for handle in self.devices.drain(..) {
            handle.retire();
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.release_all();
    }
}
