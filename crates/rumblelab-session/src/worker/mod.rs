//! Background pollers.
//!
//! Both variants create their wake-up/stop channel before the thread starts and
//! drop it only after joining the thread.

mod single;
mod slots;

use std::sync::Mutex;

pub use single::{SingleDevicePoller, SingleDeviceWorker};
pub use slots::{SlotBoard, SlotPoller, SlotWorker};

use crate::types::{DeviceId, PolledSnapshot};

/// Latest snapshot written by the single-device poller, read by the UI.
///
/// Tagged with the device it was read from: an iteration in flight while the
/// selection changes may still store a snapshot of the previous device.
#[derive(Default)]
pub struct SnapshotCell {
    latest: Mutex<Option<(DeviceId, PolledSnapshot)>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<(DeviceId, PolledSnapshot)> {
        match self.latest.lock() {
            Ok(latest) => *latest,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn store(&self, device: DeviceId, snapshot: PolledSnapshot) {
        self.replace(Some((device, snapshot)));
    }

    pub(crate) fn clear(&self) {
        self.replace(None);
    }

    fn replace(&self, value: Option<(DeviceId, PolledSnapshot)>) {
        match self.latest.lock() {
            Ok(mut latest) => *latest = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

/// The one polling thread a session runs.
pub enum Worker {
    Single(SingleDeviceWorker),
    Slots(SlotWorker),
}

impl Worker {
    /// Requests shutdown and joins the thread.
    pub fn stop(self) {
        match self {
            Worker::Single(worker) => worker.stop(),
            Worker::Slots(worker) => worker.stop(),
        }
    }

    pub fn is_finished(&self) -> bool {
        match self {
            Worker::Single(worker) => worker.is_finished(),
            Worker::Slots(worker) => worker.is_finished(),
        }
    }
}
