use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::error::{Error, Result};
use crate::feedback::{FeedbackController, FeedbackDecision};
use crate::notifier::{ChangeNotifier, PollMessage, StateSignal};
use crate::selection::SelectionState;
use crate::worker::SnapshotCell;

/// One iteration of the event-driven poller: read, feedback, notify.
pub struct SingleDevicePoller {
    selection: Arc<SelectionState>,
    notifier: ChangeNotifier,
    cell: Arc<SnapshotCell>,
    feedback: FeedbackController,
}

impl SingleDevicePoller {
    pub fn new(
        selection: Arc<SelectionState>,
        notifier: ChangeNotifier,
        cell: Arc<SnapshotCell>,
    ) -> Self {
        Self {
            selection,
            notifier,
            cell,
            feedback: FeedbackController::new(),
        }
    }

    /// Polls the selected device once. Returns `None` when idle (no device or
    /// the read failed).
    pub fn poll(&mut self) -> Option<FeedbackDecision> {
        let read = self.selection.snapshot_effect()?;
        self.cell.store(read.device.id(), read.snapshot);
        let decision = self.feedback.apply(&read);
        self.notifier.notify_ui(None);
        Some(decision)
    }

    /// Stops a playing effect or rumble. Returns `true` when a stop was issued.
    pub fn shutdown(&mut self) -> bool {
        self.feedback.shutdown()
    }

}

/// Thread running a [`SingleDevicePoller`] on state-changed wake-ups.
pub struct SingleDeviceWorker {
    signal: StateSignal,
    stop: Arc<AtomicBool>,
    selection: Arc<SelectionState>,
    thread: Option<JoinHandle<()>>,
}

impl SingleDeviceWorker {
    /// Starts the poller thread and arms the selected device.
    pub fn spawn(
        selection: Arc<SelectionState>,
        notifier: ChangeNotifier,
        cell: Arc<SnapshotCell>,
    ) -> Result<Self> {
        let (signal, rx) = StateSignal::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let poller = SingleDevicePoller::new(selection.clone(), notifier, cell);

        let stop_c = stop.clone();
        let thread = thread::Builder::new()
            .name("rumblelab-poll".into())
            .spawn(move || run(poller, rx, stop_c))
            .map_err(|e| Error::Backend(format!("{e}")))?;

        selection.attach_signal(signal.clone());
        Ok(Self {
            signal,
            stop,
            selection,
            thread: Some(thread),
        })
    }

    /// Signals stop and joins; the signal is detached only after the join.
    pub fn stop(mut self) {
        self.shutdown();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        self.signal.stop();
        if thread.join().is_err() {
            log::error!("poll thread panicked");
        }
        self.selection.detach_signal();
    }
}

impl Drop for SingleDeviceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut poller: SingleDevicePoller, rx: Receiver<PollMessage>, stop: Arc<AtomicBool>) {
    log::debug!("single-device poller started");
    while !stop.load(Ordering::Acquire) {
        match rx.recv() {
            Ok(PollMessage::StateChanged) => {}
            Ok(PollMessage::Stop) | Err(_) => break,
        }
        // Coalesce wake-ups queued while the previous iteration ran.
        let mut stop_queued = false;
        for message in rx.try_iter() {
            if message == PollMessage::Stop {
                stop_queued = true;
                break;
            }
        }
        poller.poll();
        if stop_queued {
            break;
        }
    }
    if poller.shutdown() {
        log::debug!("stopped feedback on shutdown");
    }
    log::debug!("single-device poller exited");
}
