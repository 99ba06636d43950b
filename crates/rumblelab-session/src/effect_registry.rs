use std::sync::Arc;

use crate::config::EffectDefaults;
use crate::effects::{EffectKind, EffectSpec};
use crate::handle::{DeviceHandle, EffectHandle};
use crate::types::Direction;

/// Playable effects of the currently bound device.
pub struct EffectRegistry {
    defaults: EffectDefaults,
    effects: Vec<Arc<EffectHandle>>,
}

impl EffectRegistry {
    pub fn new(defaults: EffectDefaults) -> Self {
        Self {
            defaults,
            effects: Vec::new(),
        }
    }

    /// Clears the list and creates one effect per kind the device supports.
    ///
    /// Each kind is tried over all force-feedback axes first, then with fewer
    /// axes. Kinds that cannot be created at all are skipped.
    pub fn populate(&mut self, device: &Arc<DeviceHandle>) -> &[Arc<EffectHandle>] {
        self.clear();

        let kinds = match device.device().effect_kinds() {
            Ok(kinds) => kinds,
            Err(e) => {
                log::warn!("cannot list effects of {}: {e}", device.name());
                return &self.effects;
            }
        };
        let max_axes = match device.capabilities() {
            Ok(caps) => caps.ff_axes.max(1),
            Err(e) => {
                log::debug!("no capabilities for {}: {e}, assuming one axis", device.name());
                1
            }
        };

        for kind in kinds {
            if let Some(effect) = self.create(device, kind, max_axes) {
                self.effects.push(Arc::new(effect));
            }
        }
        log::debug!("{} effect(s) for {}", self.effects.len(), device.name());
        &self.effects
    }

    fn create(
        &self,
        device: &Arc<DeviceHandle>,
        kind: EffectKind,
        max_axes: u8,
    ) -> Option<EffectHandle> {
        let params = kind.default_params(&self.defaults);
        for axes in (1..=max_axes).rev() {
            let spec = EffectSpec {
                params,
                axes,
                direction: Direction::default(),
            };
            match device.device().create_effect(&spec) {
                Ok(effect) => return Some(EffectHandle::new(device.clone(), effect, axes)),
                Err(e) => log::debug!("{kind} on {} with {axes} axes: {e}", device.name()),
            }
        }
        log::warn!("skipping unsupported effect {kind} on {}", device.name());
        None
    }

    /// Stops and releases every effect.
    pub fn clear(&mut self) {
        for effect in self.effects.drain(..) {
            effect.release();
        }
    }

    pub fn list(&self) -> Vec<(String, Arc<EffectHandle>)> {
        self.effects
            .iter()
            .map(|e| (e.name().to_string(), e.clone()))
            .collect()
    }

    pub fn effects(&self) -> &[Arc<EffectHandle>] {
        &self.effects
    }

    pub fn get(&self, index: usize) -> Option<Arc<EffectHandle>> {
        self.effects.get(index).cloned()
    }

    pub fn position(&self, effect: &Arc<EffectHandle>) -> Option<usize> {
        self.effects.iter().position(|e| Arc::ptr_eq(e, effect))
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Drop for EffectRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}
