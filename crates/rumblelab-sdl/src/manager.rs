use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use ahash::AHashMap;
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use rumblelab_session::{
    Capabilities, ChangeNotifier, Device, DeviceDescriptor, DeviceId, Discovery,
    PolledSnapshot, SlotReading, SlotSource, StateSignal,
};

use crate::command::{Command, Reply};
use crate::device::SdlDevice;
use crate::error::{Error, Result};
use crate::runtime::start_runtime_thread;

/// Number of gamepad slots exposed through [`SlotSource`].
pub const SLOT_COUNT: usize = 4;

const REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// An enumerated joystick as published by the runtime.
#[derive(Debug, Clone)]
pub(crate) struct DeviceEntry {
    pub descriptor: DeviceDescriptor,
    pub caps: Capabilities,
}

/// Shared state used by the backend, the runtime loop and device handles.
pub(crate) struct Inner {
    pub cmd_tx: Sender<Command>,
    pub devices: RwLock<Vec<DeviceEntry>>,
    pub snapshots: RwLock<AHashMap<DeviceId, PolledSnapshot>>,
    pub watchers: Mutex<AHashMap<DeviceId, StateSignal>>,
    pub listener: Mutex<Option<ChangeNotifier>>,
    pub slots: RwLock<Vec<SlotReading>>,
}

impl Inner {
    fn new(cmd_tx: Sender<Command>) -> Self {
        Self {
            cmd_tx,
            devices: RwLock::new(Vec::new()),
            snapshots: RwLock::new(AHashMap::new()),
            watchers: Mutex::new(AHashMap::new()),
            listener: Mutex::new(None),
            slots: RwLock::new(vec![SlotReading::Disconnected; SLOT_COUNT]),
        }
    }

    /// Sends a command and waits for its reply.
    pub fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = bounded(1);
        self.cmd_tx.send(make(tx)).map_err(|_| Error::Disconnected)?;
        match rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }

    /// Sends a command without waiting for it to run.
    pub fn send(&self, command: Command) {
        if self.cmd_tx.send(command).is_err() {
            log::trace!("runtime is gone, dropping command");
        }
    }

    /// Wakes the poller watching `id`, forgetting it once it is gone.
    pub fn post_state_changed(&self, id: DeviceId) {
        if let Ok(mut watchers) = self.watchers.lock() {
            if let Some(signal) = watchers.get(&id) {
                if !signal.state_changed() {
                    watchers.remove(&id);
                }
            }
        }
    }

    pub fn post_hotplug(&self) {
        if let Ok(listener) = self.listener.lock() {
            if let Some(listener) = listener.as_ref() {
                listener.notify_hotplug();
            }
        }
    }
}

/// SDL2 implementation of device discovery and the gamepad slot source.
///
/// SDL lives entirely on a background runtime thread; this handle talks to it
/// through commands and reads the state it publishes.
pub struct SdlBackend {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

impl SdlBackend {
    /// Starts the runtime thread and waits (up to 1s) for the initial enumeration.
    pub fn new() -> Result<Self> {
        let (cmd_tx, cmd_rx) = unbounded::<Command>();
        let inner = Arc::new(Inner::new(cmd_tx));
        let (ready_tx, ready_rx) = bounded(1);
        let thread = start_runtime_thread(inner.clone(), cmd_rx, ready_tx)
            .map_err(|e| Error::BackendInit(format!("{e}")))?;

        match ready_rx.recv_timeout(REPLY_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = thread.join();
                return Err(Error::BackendInit(reason));
            }
            Err(_) => {
                return Err(Error::BackendInit("runtime did not report ready".into()));
            }
        }
        Ok(Self {
            inner,
            thread: Some(thread),
        })
    }
}

impl Drop for SdlBackend {
    fn drop(&mut self) {
        self.inner.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("SDL runtime thread panicked");
            }
        }
    }
}

impl Discovery for SdlBackend {
    fn enumerate(&self) -> rumblelab_session::Result<Vec<DeviceDescriptor>> {
        let devices = self
            .inner
            .devices
            .read()
            .map_err(|e| Error::Backend(format!("{e}")))?;
        Ok(devices.iter().map(|d| d.descriptor.clone()).collect())
    }

    fn open(&self, descriptor: &DeviceDescriptor) -> rumblelab_session::Result<Box<dyn Device>> {
        let entry = self
            .inner
            .devices
            .read()
            .ok()
            .and_then(|devices| devices.iter().find(|d| d.descriptor.id == descriptor.id).cloned())
            .ok_or_else(|| rumblelab_session::Error::Open {
                id: descriptor.id,
                reason: "joystick is no longer attached".into(),
            })?;
        Ok(Box::new(SdlDevice::new(entry, self.inner.clone())))
    }

    fn set_hotplug_listener(&self, listener: Option<ChangeNotifier>) {
        if let Ok(mut current) = self.inner.listener.lock() {
            *current = listener;
        }
    }
}

impl SlotSource for SdlBackend {
    fn slot_count(&self) -> usize {
        SLOT_COUNT
    }

    fn query(&self, slot: usize) -> rumblelab_session::Result<SlotReading> {
        let slots = self
            .inner
            .slots
            .read()
            .map_err(|e| Error::Backend(format!("{e}")))?;
        slots
            .get(slot)
            .copied()
            .ok_or_else(|| Error::NotFound(slot as u32).into())
    }

    fn set_rumble(&self, slot: usize, left: u16, right: u16) -> rumblelab_session::Result<()> {
        if slot >= SLOT_COUNT {
            return Err(Error::NotFound(slot as u32).into());
        }
        self.inner.send(Command::SlotRumble { slot, left, right });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumblelab_session::{PollMessage, UiMessage};

    #[test]
    fn call_times_out_without_runtime_reply() {
        let (tx, rx) = unbounded();
        let inner = Inner::new(tx);
        let result = inner.call(|reply| Command::Acquire { id: 1, reply });
        assert!(matches!(result, Err(Error::Timeout)));
        drop(rx);
    }

    #[test]
    fn call_fails_when_runtime_is_gone() {
        let (tx, rx) = unbounded();
        drop(rx);
        let inner = Inner::new(tx);
        let result = inner.call(|reply| Command::Acquire { id: 1, reply });
        assert!(matches!(result, Err(Error::Disconnected)));
    }

    #[test]
    fn state_changes_reach_watcher_until_it_is_gone() {
        let (tx, _rx) = unbounded();
        let inner = Inner::new(tx);
        let (signal, poll_rx) = StateSignal::channel();
        inner.watchers.lock().unwrap().insert(7, signal);

        inner.post_state_changed(7);
        assert_eq!(poll_rx.try_recv().unwrap(), PollMessage::StateChanged);

        drop(poll_rx);
        inner.post_state_changed(7);
        assert!(inner.watchers.lock().unwrap().is_empty());
    }

    #[test]
    fn hotplug_goes_to_listener() {
        let (tx, _rx) = unbounded();
        let inner = Inner::new(tx);
        inner.post_hotplug();
        let (notifier, ui_rx) = ChangeNotifier::new(4);
        *inner.listener.lock().unwrap() = Some(notifier);
        inner.post_hotplug();
        assert_eq!(ui_rx.try_recv().unwrap(), UiMessage::Hotplug);
        assert!(ui_rx.try_recv().is_err());
    }
}
