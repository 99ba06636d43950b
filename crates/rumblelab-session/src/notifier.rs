use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

/// Messages posted to the UI thread's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiMessage {
    /// Fresh state is available; `slot` is set by the multi-slot poller.
    Repaint { slot: Option<usize> },
    /// The platform reported a device arrival or removal.
    Hotplug,
}

/// Receiving end of the UI queue.
pub type UiReceiver = Receiver<UiMessage>;

/// Bridges worker and backend threads into the UI thread's message queue.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: Sender<UiMessage>,
}

impl ChangeNotifier {
    /// Creates a notifier with a bounded queue of `capacity` messages.
    pub fn new(capacity: usize) -> (Self, UiReceiver) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Requests a repaint. Never blocks; a full queue drops the message.
    pub fn notify_ui(&self, slot: Option<usize>) {
        self.post(UiMessage::Repaint { slot });
    }

    /// Reports a hot-plug event. Never blocks.
    pub fn notify_hotplug(&self) {
        self.post(UiMessage::Hotplug);
    }

    fn post(&self, message: UiMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::trace!("ui queue full, dropping {message:?}");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::trace!("ui queue closed, dropping {message:?}");
            }
        }
    }
}

/// Messages consumed by the single-device poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMessage {
    StateChanged,
    Stop,
}

/// Sender half of the poller's wake-up channel, handed to devices when armed.
#[derive(Debug, Clone)]
pub struct StateSignal {
    tx: Sender<PollMessage>,
}

impl StateSignal {
    pub fn channel() -> (Self, Receiver<PollMessage>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    /// Wakes the poller. Returns `false` once the poller is gone.
    pub fn state_changed(&self) -> bool {
        self.tx.send(PollMessage::StateChanged).is_ok()
    }

    pub(crate) fn stop(&self) -> bool {
        self.tx.send(PollMessage::Stop).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_ui_does_not_block_when_full() {
        let (notifier, rx) = ChangeNotifier::new(2);
        for slot in 0..10 {
            notifier.notify_ui(Some(slot));
        }
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                UiMessage::Repaint { slot: Some(0) },
                UiMessage::Repaint { slot: Some(1) }
            ]
        );
    }

    #[test]
    fn notify_after_receiver_dropped_is_silent() {
        let (notifier, rx) = ChangeNotifier::new(4);
        drop(rx);
        notifier.notify_hotplug();
        notifier.notify_ui(None);
    }

    #[test]
    fn state_signal_reports_closed_channel() {
        let (signal, rx) = StateSignal::channel();
        assert!(signal.state_changed());
        assert_eq!(rx.recv().unwrap(), PollMessage::StateChanged);
        drop(rx);
        assert!(!signal.state_changed());
    }
}
