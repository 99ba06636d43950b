use std::sync::Arc;

use crate::backend::{Discovery, SlotSource};
use crate::config::{HotplugPolicy, SessionConfig};
use crate::device_registry::{DeviceRegistry, RefreshOutcome};
use crate::effect_registry::EffectRegistry;
use crate::error::{Error, Result};
use crate::handle::{DeviceHandle, EffectHandle};
use crate::notifier::{ChangeNotifier, UiReceiver};
use crate::selection::SelectionState;
use crate::types::{DeviceId, PolledSnapshot, SlotReading};
use crate::worker::{
    SingleDeviceWorker, SlotBoard, SlotPoller, SlotWorker, SnapshotCell, Worker,
};

/// Result of handling a hot-plug notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotplugOutcome {
    pub refresh: RefreshOutcome,
    /// The selected device disappeared and the selection was cleared.
    pub selection_lost: bool,
    /// Device selected in its place, if any.
    pub reselected: Option<DeviceId>,
}

/// Everything one interactive test page owns: registries, selection and the
/// polling thread.
///
/// Created with [`Session::activate`]; dropping it (or calling
/// [`Session::deactivate`]) stops the poller before releasing effects and
/// devices.
pub struct Session {
    config: SessionConfig,
    discovery: Arc<dyn Discovery>,
    devices: DeviceRegistry,
    effects: EffectRegistry,
    selection: Arc<SelectionState>,
    notifier: ChangeNotifier,
    snapshot: Arc<SnapshotCell>,
    board: Option<Arc<SlotBoard>>,
    worker: Option<Worker>,
}

impl Session {
    /// Enumerates devices and hooks hot-plug notifications into the UI queue.
    pub fn activate(
        discovery: Arc<dyn Discovery>,
        config: SessionConfig,
    ) -> Result<(Self, UiReceiver)> {
        config.validate()?;
        let (notifier, rx) = ChangeNotifier::new(config.poll.ui_queue);
        let mut devices = DeviceRegistry::new(discovery.clone());
        devices.refresh()?;
        discovery.set_hotplug_listener(Some(notifier.clone()));
        log::debug!("session activated with {} device(s)", devices.len());

        let session = Self {
            effects: EffectRegistry::new(config.effects.clone()),
            config,
            discovery,
            devices,
            selection: Arc::new(SelectionState::new()),
            notifier,
            snapshot: Arc::new(SnapshotCell::new()),
            board: None,
            worker: None,
        };
        Ok((session, rx))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    pub fn selection(&self) -> &Arc<SelectionState> {
        &self.selection
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Selects the device at `index` in the registry list, or none.
    pub fn select_device(&mut self, index: Option<usize>) -> Result<Option<Arc<DeviceHandle>>> {
        let device = match index {
            Some(i) => Some(self.devices.get(i).ok_or(Error::NotFound(i as u32))?),
            None => None,
        };
        self.select_device_handle(device.clone());
        Ok(device)
    }

    /// Selects the effect at `index` in the effect list, or none.
    pub fn select_effect(&mut self, index: Option<usize>) -> Result<Option<Arc<EffectHandle>>> {
        let effect = match index {
            Some(i) => Some(self.effects.get(i).ok_or(Error::NotFound(i as u32))?),
            None => None,
        };
        self.selection.select_effect(effect.clone());
        Ok(effect)
    }

    pub fn selected_device_index(&self) -> Option<usize> {
        let device = self.selection.snapshot_device()?;
        self.devices.position(&device)
    }

    pub fn selected_effect_index(&self) -> Option<usize> {
        let effect = self.selection.selected_effect()?;
        self.effects.position(&effect)
    }

    /// Latest snapshot published by the single-device poller for the selected
    /// device.
    pub fn latest_snapshot(&self) -> Option<PolledSnapshot> {
        let device = self.selection.snapshot_device()?;
        let (id, snapshot) = self.snapshot.load()?;
        (id == device.id()).then_some(snapshot)
    }

    pub fn slot_board(&self) -> Option<&Arc<SlotBoard>> {
        self.board.as_ref()
    }

    pub fn slot_reading(&self, slot: usize) -> Option<SlotReading> {
        self.board.as_ref()?.reading(slot)
    }

    pub fn toggle_slot_feedback(&self, slot: usize) -> Result<bool> {
        let board = self.board.as_ref().ok_or(Error::NotFound(slot as u32))?;
        board.toggle_feedback(slot)
    }

    pub fn set_slot_feedback(&self, slot: usize, enabled: bool) -> Result<()> {
        let board = self.board.as_ref().ok_or(Error::NotFound(slot as u32))?;
        board.set_feedback(slot, enabled)
    }

    /// Starts the event-driven poller for the selected device, replacing any
    /// running poller.
    pub fn start_single(&mut self) -> Result<()> {
        self.stop_worker();
        self.board = None;
        let worker = SingleDeviceWorker::spawn(
            self.selection.clone(),
            self.notifier.clone(),
            self.snapshot.clone(),
        )?;
        self.worker = Some(Worker::Single(worker));
        Ok(())
    }

    /// Starts the fixed-tick poller over `source`, replacing any running poller.
    pub fn start_slots(&mut self, source: Arc<dyn SlotSource>) -> Result<Arc<SlotBoard>> {
        self.stop_worker();
        let count = self.config.poll.slots.min(source.slot_count());
        let board = Arc::new(SlotBoard::new(count));
        let poller = SlotPoller::new(source, board.clone(), self.notifier.clone());
        let worker = SlotWorker::spawn(poller, self.config.poll.tick())?;
        self.board = Some(board.clone());
        self.worker = Some(Worker::Slots(worker));
        Ok(board)
    }

    pub fn is_polling(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stops and joins the running poller, if any.
    pub fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
    }

    /// Handles a device arrival/removal reported on the UI thread.
    ///
    /// When the selected device disappears, its effects and the selection are
    /// released before the registry retires it.
    pub fn on_hotplug(&mut self) -> Result<HotplugOutcome> {
        let selection = &self.selection;
        let effects = &mut self.effects;
        let snapshot = &self.snapshot;
        let mut selection_lost = false;
        let refresh = self.devices.refresh_with(|retiring| {
            if selection.is_selected(retiring) {
                effects.clear();
                selection.select_device(None);
                snapshot.clear();
                selection_lost = true;
            }
        })?;
        let mut outcome = HotplugOutcome {
            refresh,
            selection_lost,
            reselected: None,
        };
        if !selection_lost {
            return Ok(outcome);
        }

        if self.config.hotplug == HotplugPolicy::ReselectFirst {
            if let Some(first) = self.devices.get(0) {
                outcome.reselected = Some(first.id());
                self.select_device_handle(Some(first));
            }
        }
        Ok(outcome)
    }

    /// Tears the session down; equivalent to dropping it.
    pub fn deactivate(self) {}

    fn select_device_handle(&mut self, device: Option<Arc<DeviceHandle>>) {
        self.effects.clear();
        self.selection.select_device(device.clone());
        self.snapshot.clear();
        if let Some(device) = device.as_ref() {
            self.effects.populate(device);
        }
    }

    fn teardown(&mut self) {
        self.stop_worker();
        self.effects.clear();
        self.selection.select_device(None);
        self.discovery.set_hotplug_listener(None);
        self.devices.release_all();
        log::debug!("session deactivated");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::effects::EffectStatus;
    use crate::mock::{MockCall, MockDiscovery, MockSlots};
    use crate::notifier::UiMessage;
    use crate::types::GamepadState;

    fn session_with(
        config: SessionConfig,
        names: &[&str],
    ) -> (MockDiscovery, Session, UiReceiver) {
        let discovery = MockDiscovery::new();
        for name in names {
            discovery.add_device(name);
        }
        let (session, rx) = Session::activate(Arc::new(discovery.clone()), config).unwrap();
        (discovery, session, rx)
    }

    fn wait_for(mut f: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if f() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn activation_fails_when_discovery_fails() {
        let discovery = MockDiscovery::new();
        discovery.set_enumerate_failure(true);
        let result = Session::activate(Arc::new(discovery), SessionConfig::default());
        assert!(matches!(result, Err(Error::Discovery(_))));
    }

    #[test]
    fn selecting_device_populates_effects() {
        let (_discovery, mut session, _rx) =
            session_with(SessionConfig::default(), &["Pad1", "Wheel"]);
        session.select_device(Some(1)).unwrap();
        assert_eq!(session.selected_device_index(), Some(1));
        assert_eq!(session.effects().len(), 4);
        session.select_effect(Some(2)).unwrap();
        assert_eq!(session.selected_effect_index(), Some(2));
        assert!(session.select_device(Some(7)).is_err());
    }

    #[test]
    fn reselecting_device_releases_old_effects() {
        let (_discovery, mut session, _rx) =
            session_with(SessionConfig::default(), &["Pad1", "Pad2"]);
        session.select_device(Some(0)).unwrap();
        let old = session.select_effect(Some(0)).unwrap().unwrap();
        session.select_device(Some(1)).unwrap();
        assert!(session.selection().selected_effect().is_none());
        assert_eq!(old.status(), EffectStatus::Released);
    }

    #[test]
    fn hotplug_removal_of_selected_device_clears_selection() {
        let config = SessionConfig {
            hotplug: HotplugPolicy::Clear,
            ..SessionConfig::default()
        };
        let (discovery, mut session, rx) = session_with(config, &["Pad1", "Pad2"]);
        let pad2 = session.select_device(Some(1)).unwrap().unwrap();
        session.select_effect(Some(0)).unwrap();

        discovery.unplug(pad2.id());
        assert_eq!(rx.try_recv().unwrap(), UiMessage::Hotplug);
        let outcome = session.on_hotplug().unwrap();

        assert!(outcome.selection_lost);
        assert_eq!(outcome.reselected, None);
        assert!(session.selection().snapshot_device().is_none());
        assert!(session.selection().selected_effect().is_none());
        assert!(session.effects().is_empty());
    }

    #[test]
    fn hotplug_removal_releases_effects_before_unacquiring() {
        let config = SessionConfig {
            hotplug: HotplugPolicy::Clear,
            ..SessionConfig::default()
        };
        let (discovery, mut session, _rx) = session_with(config, &["Pad1", "Pad2"]);
        let pad2 = session.select_device(Some(1)).unwrap().unwrap();
        let effect = session.select_effect(Some(0)).unwrap().unwrap();
        effect.start().unwrap();
        discovery.clear_calls();

        discovery.unplug(pad2.id());
        session.on_hotplug().unwrap();

        let calls = discovery.calls();
        let position = |f: &dyn Fn(&MockCall) -> bool| calls.iter().position(|c| f(c));
        let stop = position(&|c| matches!(c, MockCall::Stop { .. })).unwrap();
        let last_destroy = calls
            .iter()
            .rposition(|c| matches!(c, MockCall::Destroy { .. }))
            .unwrap();
        let unacquire = position(&|c| *c == MockCall::Unacquire(pad2.id())).unwrap();
        assert!(stop < unacquire, "{calls:?}");
        assert!(last_destroy < unacquire, "{calls:?}");
        let unacquires = calls
            .iter()
            .filter(|c| matches!(c, MockCall::Unacquire(_)))
            .count();
        assert_eq!(unacquires, 1);
        assert_eq!(effect.status(), EffectStatus::Released);
    }

    #[test]
    fn hotplug_removal_reselects_first_device_by_default() {
        let (discovery, mut session, _rx) =
            session_with(SessionConfig::default(), &["Pad1", "Pad2"]);
        let pad2 = session.select_device(Some(1)).unwrap().unwrap();
        session.select_effect(Some(0)).unwrap();

        discovery.unplug(pad2.id());
        let outcome = session.on_hotplug().unwrap();

        let pad1 = session.devices().get(0).unwrap();
        assert_eq!(outcome.reselected, Some(pad1.id()));
        assert!(Arc::ptr_eq(&session.selection().snapshot_device().unwrap(), &pad1));
        assert!(session.selection().selected_effect().is_none());
    }

    #[test]
    fn hotplug_of_unselected_device_keeps_selection() {
        let (discovery, mut session, _rx) = session_with(SessionConfig::default(), &["Pad1"]);
        session.select_device(Some(0)).unwrap();
        session.select_effect(Some(1)).unwrap();
        discovery.add_device("Pad2");
        let outcome = session.on_hotplug().unwrap();
        assert!(!outcome.selection_lost);
        assert_eq!(outcome.refresh.added.len(), 1);
        assert_eq!(session.selected_effect_index(), Some(1));
    }

    #[test]
    fn single_worker_publishes_snapshots() {
        let (discovery, mut session, rx) = session_with(SessionConfig::default(), &["Wheel"]);
        session.select_device(Some(0)).unwrap();
        session.select_effect(Some(0)).unwrap();
        session.start_single().unwrap();
        assert!(session.is_polling());

        let pad = discovery.controller(session.devices().get(0).unwrap().id()).unwrap();
        pad.press(1);
        assert!(wait_for(|| session
            .latest_snapshot()
            .is_some_and(|s| s.buttons.contains(1))));
        assert!(rx.try_iter().any(|m| m == UiMessage::Repaint { slot: None }));

        session.stop_worker();
        assert!(!session.is_polling());
        let stops = discovery
            .calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Stop { .. }))
            .count();
        assert_eq!(stops, 1);
    }

    #[test]
    fn starting_slots_replaces_single_worker() {
        let (discovery, mut session, _rx) = session_with(SessionConfig::default(), &["Wheel"]);
        session.select_device(Some(0)).unwrap();
        session.start_single().unwrap();
        let pad = discovery.controller(session.devices().get(0).unwrap().id()).unwrap();
        assert!(pad.is_watched());

        let slots = Arc::new(MockSlots::new(4));
        slots.connect(0, GamepadState::default());
        let board = session.start_slots(slots.clone()).unwrap();
        assert!(!pad.is_watched());
        assert_eq!(board.len(), 4);
        assert!(wait_for(|| session.slot_reading(0).is_some()));
        assert!(session.toggle_slot_feedback(0).unwrap());
    }

    #[test]
    fn snapshot_of_previous_device_is_not_reported() {
        let (_discovery, mut session, _rx) =
            session_with(SessionConfig::default(), &["Pad1", "Pad2"]);
        let pad1 = session.select_device(Some(0)).unwrap().unwrap();
        let pad2 = session.select_device(Some(1)).unwrap().unwrap();

        // An iteration that read Pad1 finishes after the switch.
        session.snapshot.store(pad1.id(), PolledSnapshot::default());
        assert!(session.latest_snapshot().is_none());

        let current = PolledSnapshot {
            sequence: 7,
            ..PolledSnapshot::default()
        };
        session.snapshot.store(pad2.id(), current);
        assert_eq!(session.latest_snapshot(), Some(current));
    }

    #[test]
    fn switching_back_to_single_drops_slot_board() {
        let (_discovery, mut session, _rx) = session_with(SessionConfig::default(), &["Wheel"]);
        let slots = Arc::new(MockSlots::new(2));
        slots.connect(0, GamepadState::default());
        session.start_slots(slots).unwrap();
        assert!(wait_for(|| session.slot_reading(0).is_some()));

        session.start_single().unwrap();
        assert!(session.slot_board().is_none());
        assert!(session.slot_reading(0).is_none());
        assert!(session.toggle_slot_feedback(0).is_err());
    }

    #[test]
    fn drop_releases_everything() {
        let (discovery, mut session, _rx) = session_with(SessionConfig::default(), &["Wheel"]);
        let device = session.select_device(Some(0)).unwrap().unwrap();
        let effect = session.select_effect(Some(0)).unwrap().unwrap();
        session.start_single().unwrap();
        session.deactivate();

        assert!(device.is_retired());
        assert!(!device.is_acquired());
        assert_eq!(effect.status(), EffectStatus::Released);
        // The hot-plug listener is gone: unplugging no longer posts.
        discovery.unplug(device.id());
    }
}
