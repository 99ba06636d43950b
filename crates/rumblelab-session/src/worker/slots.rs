use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use crate::backend::SlotSource;
use crate::error::{Error, Result};
use crate::feedback::{slot_rumble, FeedbackDecision};
use crate::notifier::ChangeNotifier;
use crate::types::SlotReading;

#[derive(Default)]
struct SlotCell {
    // `None` until the slot has been observed once.
    reading: Mutex<Option<SlotReading>>,
    feedback: AtomicBool,
}

/// Per-slot readings and feedback flags shared between the poller and the UI.
pub struct SlotBoard {
    slots: Vec<SlotCell>,
}

impl SlotBoard {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| SlotCell::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Last observed reading of `slot`, `None` if never observed.
    pub fn reading(&self, slot: usize) -> Option<SlotReading> {
        let cell = self.slots.get(slot)?;
        match cell.reading.lock() {
            Ok(reading) => *reading,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn feedback_enabled(&self, slot: usize) -> bool {
        self.slots
            .get(slot)
            .map(|c| c.feedback.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    pub fn set_feedback(&self, slot: usize, enabled: bool) -> Result<()> {
        let cell = self.slots.get(slot).ok_or(Error::NotFound(slot as u32))?;
        cell.feedback.store(enabled, Ordering::Release);
        Ok(())
    }

    /// Flips the feedback flag of `slot` and returns the new value.
    pub fn toggle_feedback(&self, slot: usize) -> Result<bool> {
        let cell = self.slots.get(slot).ok_or(Error::NotFound(slot as u32))?;
        Ok(!cell.feedback.fetch_xor(true, Ordering::AcqRel))
    }

    /// Writes `reading` if it differs from the stored one. Returns `true` on change.
    fn store(&self, slot: usize, reading: SlotReading) -> bool {
        let Some(cell) = self.slots.get(slot) else {
            return false;
        };
        let mut current = match cell.reading.lock() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.as_ref() == Some(&reading) {
            return false;
        }
        *current = Some(reading);
        true
    }
}

/// One tick of the multi-slot poller over every slot of a [`SlotBoard`].
pub struct SlotPoller {
    source: Arc<dyn SlotSource>,
    board: Arc<SlotBoard>,
    notifier: ChangeNotifier,
}

impl SlotPoller {
    pub fn new(
        source: Arc<dyn SlotSource>,
        board: Arc<SlotBoard>,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            source,
            board,
            notifier,
        }
    }

    /// Queries every slot, applies feedback and notifies the UI of changed slots.
    /// Returns the indices of the slots that changed.
    ///
    /// A slot whose query fails keeps its stored reading and gets a neutral
    /// rumble command for the tick.
    pub fn tick(&self) -> Vec<usize> {
        let mut changed = Vec::new();
        for slot in 0..self.board.len() {
            let reading = match self.source.query(slot) {
                Ok(reading) => reading,
                Err(e) => {
                    log::debug!("slot {slot}: query failed: {e}");
                    self.issue(slot, slot_rumble(&SlotReading::Disconnected, false));
                    continue;
                }
            };
            let is_changed = self.board.store(slot, reading);
            let decision = slot_rumble(&reading, self.board.feedback_enabled(slot));
            self.issue(slot, decision);
            if is_changed {
                self.notifier.notify_ui(Some(slot));
                changed.push(slot);
            }
        }
        changed
    }

    /// Issues a neutral rumble command to every slot.
    pub fn neutralize(&self) {
        for slot in 0..self.board.len() {
            self.issue(slot, FeedbackDecision::Rumble { left: 0, right: 0 });
        }
    }

    fn issue(&self, slot: usize, decision: FeedbackDecision) {
        if let FeedbackDecision::Rumble { left, right } = decision {
            if let Err(e) = self.source.set_rumble(slot, left, right) {
                log::trace!("slot {slot}: rumble failed: {e}");
            }
        }
    }
}

/// Thread running a [`SlotPoller`] every tick until stopped.
pub struct SlotWorker {
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SlotWorker {
    pub fn spawn(poller: SlotPoller, tick: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("rumblelab-slots".into())
            .spawn(move || run(poller, stop_rx, tick))
            .map_err(|e| Error::Backend(format!("{e}")))?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Signals stop and joins the thread.
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
        if let Some(tx) = self.stop_tx.as_ref() {
            let _ = tx.try_send(());
        }
        if thread.join().is_err() {
            log::error!("slot poll thread panicked");
        }
        self.stop_tx = None;
    }
}

impl Drop for SlotWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(poller: SlotPoller, stop_rx: Receiver<()>, tick: Duration) {
    log::debug!("slot poller started, tick {tick:?}");
    loop {
        match stop_rx.recv_timeout(tick) {
            Err(RecvTimeoutError::Timeout) => {
                poller.tick();
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    poller.neutralize();
    log::debug!("slot poller exited");
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::mock::MockSlots;
    use crate::notifier::{UiMessage, UiReceiver};
    use crate::types::GamepadState;

    fn pad(lx: i16, packet: u32) -> GamepadState {
        GamepadState {
            packet,
            thumb_lx: lx,
            ..GamepadState::default()
        }
    }

    fn setup() -> (Arc<MockSlots>, Arc<SlotBoard>, SlotPoller, UiReceiver) {
        let source = Arc::new(MockSlots::new(4));
        source.connect(0, pad(0, 1));
        source.connect(1, pad(0, 1));
        let board = Arc::new(SlotBoard::new(4));
        let (notifier, rx) = ChangeNotifier::new(64);
        let poller = SlotPoller::new(source.clone(), board.clone(), notifier);
        (source, board, poller, rx)
    }

    fn repainted(rx: &UiReceiver) -> Vec<usize> {
        rx.try_iter()
            .filter_map(|m| match m {
                UiMessage::Repaint { slot } => slot,
                UiMessage::Hotplug => None,
            })
            .collect()
    }

    #[test]
    fn notifies_only_changed_slots() {
        let (source, board, poller, rx) = setup();

        assert_eq!(poller.tick(), vec![0, 1, 2, 3]);
        assert_eq!(repainted(&rx), vec![0, 1, 2, 3]);
        assert_eq!(board.reading(2), Some(SlotReading::Disconnected));

        assert!(poller.tick().is_empty());
        assert!(repainted(&rx).is_empty());

        source.connect(0, pad(1200, 2));
        assert_eq!(poller.tick(), vec![0]);
        assert_eq!(repainted(&rx), vec![0]);
        assert!(poller.tick().is_empty());
    }

    #[test]
    fn failed_query_leaves_slot_untouched() {
        let (source, board, poller, _rx) = setup();
        poller.tick();
        source.set_query_failure(1, true);
        source.connect(1, pad(500, 9));
        assert!(poller.tick().is_empty());
        assert_eq!(board.reading(1).and_then(|r| r.state().copied()), Some(pad(0, 1)));
        source.set_query_failure(1, false);
        assert_eq!(poller.tick(), vec![1]);
    }

    #[test]
    fn failed_query_silences_rumbling_slot() {
        let (source, board, poller, _rx) = setup();
        source.connect(0, pad(i16::MAX, 1));
        board.set_feedback(0, true).unwrap();
        poller.tick();
        source.take_rumble_log();

        source.set_query_failure(0, true);
        poller.tick();
        let log = source.take_rumble_log();
        assert!(log.contains(&(0, 0, 0)), "{log:?}");
        assert!(board.reading(0).is_some_and(|r| r.is_connected()));
    }

    #[test]
    fn feedback_flag_drives_rumble_every_tick() {
        let (source, board, poller, _rx) = setup();
        source.connect(0, pad(i16::MAX, 1));
        board.set_feedback(0, true).unwrap();
        poller.tick();
        poller.tick();
        let log = source.take_rumble_log();
        let slot0: Vec<_> = log.iter().filter(|(s, _, _)| *s == 0).collect();
        assert_eq!(slot0.len(), 2);
        assert!(slot0.iter().all(|(_, l, r)| *l == u16::MAX && *r == 0));
        let others: Vec<_> = log.iter().filter(|(s, _, _)| *s != 0).collect();
        assert_eq!(others.len(), 6);
        assert!(others.iter().all(|(_, l, r)| *l == 0 && *r == 0));
    }

    #[test]
    fn toggle_feedback_flips_flag() {
        let board = SlotBoard::new(2);
        assert!(board.toggle_feedback(1).unwrap());
        assert!(board.feedback_enabled(1));
        assert!(!board.toggle_feedback(1).unwrap());
        assert!(board.toggle_feedback(5).is_err());
    }

    #[test]
    fn worker_neutralizes_rumble_on_stop() {
        let (source, board, poller, _rx) = setup();
        board.set_feedback(0, true).unwrap();
        source.connect(0, pad(i16::MAX, 1));
        let worker = SlotWorker::spawn(poller, Duration::from_millis(2)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while source.query_count() < 8 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        worker.stop();
        let log = source.rumble_log();
        let tail = &log[log.len() - 4..];
        assert_eq!(tail, &[(0, 0, 0), (1, 0, 0), (2, 0, 0), (3, 0, 0)]);
    }
}
