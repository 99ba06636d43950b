//! In-memory backend.
//!
//! Scriptable devices and gamepad slots that record every call made against
//! them. Used by the unit tests and by `rumblelab --mock`.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::backend::{Device, Discovery, Effect, SlotSource};
use crate::effects::{ConditionKind, EffectKind, EffectSpec, Waveform};
use crate::error::{Error, Result};
use crate::notifier::{ChangeNotifier, StateSignal};
use crate::types::{
    Capabilities, CooperativeLevel, DeviceDescriptor, DeviceId, Direction, GamepadState, Hat,
    PolledSnapshot, SlotCaps, SlotReading, MAX_AXES, MAX_HATS,
};

/// A call observed by the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Acquire(DeviceId),
    Unacquire(DeviceId),
    CreateEffect {
        device: DeviceId,
        kind: EffectKind,
        axes: u8,
    },
    SetDirection {
        device: DeviceId,
        kind: EffectKind,
        direction: Direction,
        axes: u8,
    },
    Start {
        device: DeviceId,
        kind: EffectKind,
        direction: Direction,
    },
    Stop {
        device: DeviceId,
        kind: EffectKind,
    },
    Destroy {
        device: DeviceId,
        kind: EffectKind,
    },
    Feedback {
        device: DeviceId,
        left: u16,
        right: u16,
    },
}

type CallLog = Arc<Mutex<Vec<MockCall>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn record(log: &CallLog, call: MockCall) {
    lock(log).push(call);
}

/// Default capabilities of a mock controller.
pub fn default_capabilities() -> Capabilities {
    Capabilities {
        axes: 4,
        buttons: 12,
        hats: 1,
        ff_axes: 2,
        axis_min: 0,
        axis_max: 65535,
    }
}

/// Default effect kinds advertised by a mock controller.
pub fn default_effect_kinds() -> Vec<EffectKind> {
    vec![
        EffectKind::Constant,
        EffectKind::Periodic(Waveform::Sine),
        EffectKind::Ramp,
        EffectKind::Condition(ConditionKind::Spring),
    ]
}

struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

struct ControllerState {
    descriptor: DeviceDescriptor,
    caps: Capabilities,
    snapshot: Mutex<PolledSnapshot>,
    signal: Mutex<Option<StateSignal>>,
    kinds: Mutex<Vec<EffectKind>>,
    failing_kinds: Mutex<Vec<EffectKind>>,
    max_effect_axes: AtomicU8,
    max_direction_axes: AtomicU8,
    open_fails: AtomicBool,
    read_fails: AtomicBool,
    acquired: AtomicBool,
    gate: Mutex<Option<Gate>>,
    calls: CallLog,
}

/// Test-side handle of one mock device; mutate it to simulate input.
#[derive(Clone)]
pub struct MockController {
    state: Arc<ControllerState>,
}

impl MockController {
    fn new(
        descriptor: DeviceDescriptor,
        caps: Capabilities,
        kinds: Vec<EffectKind>,
        calls: CallLog,
    ) -> Self {
        let mut snapshot = PolledSnapshot::default();
        let center = caps.center();
        for axis in snapshot.axes.iter_mut().take(usize::from(caps.axes).min(MAX_AXES)) {
            *axis = center;
        }
        snapshot.hats = [Hat::Centered; MAX_HATS];
        Self {
            state: Arc::new(ControllerState {
                descriptor,
                caps,
                snapshot: Mutex::new(snapshot),
                signal: Mutex::new(None),
                kinds: Mutex::new(kinds),
                failing_kinds: Mutex::new(Vec::new()),
                max_effect_axes: AtomicU8::new(u8::MAX),
                max_direction_axes: AtomicU8::new(u8::MAX),
                open_fails: AtomicBool::new(false),
                read_fails: AtomicBool::new(false),
                acquired: AtomicBool::new(false),
                gate: Mutex::new(None),
                calls,
            }),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.state.descriptor.id
    }

    pub fn name(&self) -> &str {
        &self.state.descriptor.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.state.caps
    }

    pub fn is_acquired(&self) -> bool {
        self.state.acquired.load(Ordering::Acquire)
    }

    /// True while a poller signal is armed on the device.
    pub fn is_watched(&self) -> bool {
        lock(&self.state.signal).is_some()
    }

    /// Moves the primary stick; `x`/`y` are deflections in `[-1.0, 1.0]`.
    pub fn set_stick(&self, x: f32, y: f32) {
        let caps = self.state.caps;
        let center = caps.center();
        let half = (i64::from(caps.axis_max) - i64::from(caps.axis_min)) as f32 / 2.0;
        let to_axis = |v: f32| center + (v.clamp(-1.0, 1.0) * half).round() as i32;
        self.update(|s| {
            s.axes[0] = to_axis(x);
            s.axes[1] = to_axis(y);
        });
    }

    pub fn press(&self, button: u8) {
        self.update(|s| s.buttons.insert(button));
    }

    pub fn release(&self, button: u8) {
        self.update(|s| s.buttons.remove(button));
    }

    /// Posts a state-changed wake-up without modifying the state.
    pub fn poke(&self) {
        if let Some(signal) = lock(&self.state.signal).as_ref() {
            signal.state_changed();
        }
    }

    pub fn set_open_failure(&self, fail: bool) {
        self.state.open_fails.store(fail, Ordering::Release);
    }

    pub fn set_read_failure(&self, fail: bool) {
        self.state.read_fails.store(fail, Ordering::Release);
    }

    /// Makes every creation of `kind` fail.
    pub fn fail_effect(&self, kind: EffectKind) {
        lock(&self.state.failing_kinds).push(kind);
    }

    /// Effect creation fails for specs spanning more than `axes` axes.
    pub fn set_max_effect_axes(&self, axes: u8) {
        self.state.max_effect_axes.store(axes, Ordering::Release);
    }

    /// Direction updates fail for more than `axes` axes.
    pub fn set_max_direction_axes(&self, axes: u8) {
        self.state.max_direction_axes.store(axes, Ordering::Release);
    }

    /// Makes subsequent reads block until the returned gate is released or dropped.
    pub fn block_reads(&self) -> ReadGate {
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        *lock(&self.state.gate) = Some(Gate {
            entered: entered_tx,
            release: release_rx,
        });
        ReadGate {
            entered: entered_rx,
            release: Some(release_tx),
            state: self.state.clone(),
        }
    }

    fn update(&self, f: impl FnOnce(&mut PolledSnapshot)) {
        {
            let mut snapshot = lock(&self.state.snapshot);
            f(&mut snapshot);
            snapshot.sequence += 1;
        }
        self.poke();
    }
}

/// Holds reads of a [`MockController`] blocked; see [`MockController::block_reads`].
pub struct ReadGate {
    entered: Receiver<()>,
    release: Option<Sender<()>>,
    state: Arc<ControllerState>,
}

impl ReadGate {
    /// Waits until a reader is blocked on the gate.
    pub fn wait_entered(&self, timeout: Duration) -> bool {
        self.entered.recv_timeout(timeout).is_ok()
    }

    pub fn release(mut self) {
        self.open();
    }

    fn open(&mut self) {
        lock(&self.state.gate).take();
        self.release.take();
    }
}

impl Drop for ReadGate {
    fn drop(&mut self) {
        self.open();
    }
}

struct MockDevice {
    state: Arc<ControllerState>,
}

impl Device for MockDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.state.descriptor
    }

    fn configure(&self, _level: CooperativeLevel) -> Result<()> {
        Ok(())
    }

    fn acquire(&self) -> Result<()> {
        self.state.acquired.store(true, Ordering::Release);
        record(&self.state.calls, MockCall::Acquire(self.state.descriptor.id));
        Ok(())
    }

    fn unacquire(&self) {
        self.state.acquired.store(false, Ordering::Release);
        record(&self.state.calls, MockCall::Unacquire(self.state.descriptor.id));
    }

    fn capabilities(&self) -> Result<Capabilities> {
        Ok(self.state.caps)
    }

    fn read_state(&self) -> Result<PolledSnapshot> {
        let gate = lock(&self.state.gate)
            .as_ref()
            .map(|g| (g.entered.clone(), g.release.clone()));
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        if self.state.read_fails.load(Ordering::Acquire) {
            return Err(Error::Io("mock read failure".into()));
        }
        Ok(*lock(&self.state.snapshot))
    }

    fn effect_kinds(&self) -> Result<Vec<EffectKind>> {
        Ok(lock(&self.state.kinds).clone())
    }

    fn create_effect(&self, spec: &EffectSpec) -> Result<Box<dyn Effect>> {
        let kind = spec.params.kind();
        if lock(&self.state.failing_kinds).contains(&kind) {
            return Err(Error::Unsupported);
        }
        if spec.axes > self.state.max_effect_axes.load(Ordering::Acquire) {
            return Err(Error::Backend(format!("{} axes rejected", spec.axes)));
        }
        record(
            &self.state.calls,
            MockCall::CreateEffect {
                device: self.state.descriptor.id,
                kind,
                axes: spec.axes,
            },
        );
        Ok(Box::new(MockEffect {
            kind,
            direction: spec.direction,
            state: self.state.clone(),
        }))
    }

    fn set_feedback(&self, left: u16, right: u16) -> Result<()> {
        record(
            &self.state.calls,
            MockCall::Feedback {
                device: self.state.descriptor.id,
                left,
                right,
            },
        );
        Ok(())
    }

    fn watch(&self, signal: Option<StateSignal>) {
        *lock(&self.state.signal) = signal;
    }
}

struct MockEffect {
    kind: EffectKind,
    direction: Direction,
    state: Arc<ControllerState>,
}

impl Effect for MockEffect {
    fn kind(&self) -> EffectKind {
        self.kind
    }

    fn set_direction(&mut self, direction: Direction, axes: u8) -> Result<()> {
        if axes > self.state.max_direction_axes.load(Ordering::Acquire) {
            return Err(Error::Backend(format!("{axes} axes rejected")));
        }
        self.direction = direction;
        record(
            &self.state.calls,
            MockCall::SetDirection {
                device: self.state.descriptor.id,
                kind: self.kind,
                direction,
                axes,
            },
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        record(
            &self.state.calls,
            MockCall::Start {
                device: self.state.descriptor.id,
                kind: self.kind,
                direction: self.direction,
            },
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        record(
            &self.state.calls,
            MockCall::Stop {
                device: self.state.descriptor.id,
                kind: self.kind,
            },
        );
        Ok(())
    }
}

impl Drop for MockEffect {
    fn drop(&mut self) {
        record(
            &self.state.calls,
            MockCall::Destroy {
                device: self.state.descriptor.id,
                kind: self.kind,
            },
        );
    }
}

struct DiscoveryState {
    devices: Mutex<Vec<MockController>>,
    next_id: AtomicU32,
    enumerate_fails: AtomicBool,
    listener: Mutex<Option<ChangeNotifier>>,
    calls: CallLog,
}

/// Mock device-discovery API.
#[derive(Clone)]
pub struct MockDiscovery {
    state: Arc<DiscoveryState>,
}

impl Default for MockDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDiscovery {
    pub fn new() -> Self {
        Self {
            state: Arc::new(DiscoveryState {
                devices: Mutex::new(Vec::new()),
                next_id: AtomicU32::new(1),
                enumerate_fails: AtomicBool::new(false),
                listener: Mutex::new(None),
                calls: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    /// Plugs in a controller with default capabilities and effects.
    pub fn add_device(&self, name: &str) -> MockController {
        self.add_device_with(name, default_capabilities(), default_effect_kinds())
    }

    pub fn add_device_with(
        &self,
        name: &str,
        caps: Capabilities,
        kinds: Vec<EffectKind>,
    ) -> MockController {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let descriptor = DeviceDescriptor {
            id,
            name: name.to_string(),
            vendor_id: 0x1209,
            product_id: id as u16,
        };
        let controller =
            MockController::new(descriptor, caps, kinds, self.state.calls.clone());
        lock(&self.state.devices).push(controller.clone());
        self.notify_hotplug();
        controller
    }

    /// Unplugs a controller. Returns `false` when it was not plugged in.
    pub fn unplug(&self, id: DeviceId) -> bool {
        let removed = {
            let mut devices = lock(&self.state.devices);
            let before = devices.len();
            devices.retain(|c| c.id() != id);
            before != devices.len()
        };
        if removed {
            self.notify_hotplug();
        }
        removed
    }

    pub fn controller(&self, id: DeviceId) -> Option<MockController> {
        lock(&self.state.devices).iter().find(|c| c.id() == id).cloned()
    }

    pub fn set_enumerate_failure(&self, fail: bool) {
        self.state.enumerate_fails.store(fail, Ordering::Release);
    }

    /// Returns every recorded call in order.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.state.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state.calls).clear();
    }

    fn notify_hotplug(&self) {
        if let Some(listener) = lock(&self.state.listener).as_ref() {
            listener.notify_hotplug();
        }
    }
}

impl Discovery for MockDiscovery {
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        if self.state.enumerate_fails.load(Ordering::Acquire) {
            return Err(Error::Discovery("mock enumeration failure".into()));
        }
        Ok(lock(&self.state.devices)
            .iter()
            .map(|c| c.state.descriptor.clone())
            .collect())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn Device>> {
        let controller = self.controller(descriptor.id).ok_or(Error::NotFound(descriptor.id))?;
        if controller.state.open_fails.load(Ordering::Acquire) {
            return Err(Error::Open {
                id: descriptor.id,
                reason: "mock open failure".into(),
            });
        }
        Ok(Box::new(MockDevice {
            state: controller.state.clone(),
        }))
    }

    fn set_hotplug_listener(&self, listener: Option<ChangeNotifier>) {
        *lock(&self.state.listener) = listener;
    }
}

/// Mock multi-slot gamepad source.
pub struct MockSlots {
    readings: Mutex<Vec<SlotReading>>,
    failing: Mutex<Vec<bool>>,
    rumble: Mutex<Vec<(usize, u16, u16)>>,
    queries: AtomicUsize,
}

impl MockSlots {
    /// Creates `count` slots, all disconnected.
    pub fn new(count: usize) -> Self {
        Self {
            readings: Mutex::new(vec![SlotReading::Disconnected; count]),
            failing: Mutex::new(vec![false; count]),
            rumble: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, slot: usize, reading: SlotReading) {
        if let Some(r) = lock(&self.readings).get_mut(slot) {
            *r = reading;
        }
    }

    /// Connects a rumble-capable pad in `slot` with the given state.
    pub fn connect(&self, slot: usize, state: GamepadState) {
        self.set(
            slot,
            SlotReading::Connected {
                caps: SlotCaps {
                    has_rumble: true,
                    wireless: false,
                },
                state,
            },
        );
    }

    /// Makes queries of `slot` fail until cleared.
    pub fn set_query_failure(&self, slot: usize, fail: bool) {
        if let Some(f) = lock(&self.failing).get_mut(slot) {
            *f = fail;
        }
    }

    /// Number of `query` calls so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Acquire)
    }

    pub fn rumble_log(&self) -> Vec<(usize, u16, u16)> {
        lock(&self.rumble).clone()
    }

    pub fn take_rumble_log(&self) -> Vec<(usize, u16, u16)> {
        std::mem::take(&mut *lock(&self.rumble))
    }
}

impl SlotSource for MockSlots {
    fn slot_count(&self) -> usize {
        lock(&self.readings).len()
    }

    fn query(&self, slot: usize) -> Result<SlotReading> {
        self.queries.fetch_add(1, Ordering::AcqRel);
        if lock(&self.failing).get(slot).copied().unwrap_or(false) {
            return Err(Error::Io(format!("slot {slot} query failed")));
        }
        lock(&self.readings)
            .get(slot)
            .copied()
            .ok_or(Error::NotFound(slot as u32))
    }

    fn set_rumble(&self, slot: usize, left: u16, right: u16) -> Result<()> {
        if slot >= self.slot_count() {
            return Err(Error::NotFound(slot as u32));
        }
        lock(&self.rumble).push((slot, left, right));
        Ok(())
    }
}
