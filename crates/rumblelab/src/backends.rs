use std::f32::consts::TAU;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, tick, Sender};
use rumblelab_session::mock::{MockController, MockDiscovery, MockSlots};
use rumblelab_session::{Discovery, GamepadState, Result, SlotSource};

const DEMO_TICK: Duration = Duration::from_millis(250);

/// The discovery API and slot source a console session runs against.
pub(crate) struct Backends {
    pub(crate) discovery: Arc<dyn Discovery>,
    pub(crate) slots: Arc<dyn SlotSource>,
    _demo: Option<DemoDriver>,
}

impl Backends {
    pub(crate) fn open(mock: bool) -> Result<Self> {
        if mock {
            return Ok(Self::mock());
        }
        Self::sdl()
    }

    #[cfg(feature = "sdl2-backend")]
    fn sdl() -> Result<Self> {
        let backend = Arc::new(rumblelab_sdl::SdlBackend::new()?);
        Ok(Self {
            discovery: backend.clone(),
            slots: backend,
            _demo: None,
        })
    }

    #[cfg(not(feature = "sdl2-backend"))]
    fn sdl() -> Result<Self> {
        Err(rumblelab_session::Error::Discovery(
            "built without the sdl2-backend feature; use --mock".into(),
        ))
    }

    /// Simulated wheel and gamepad whose inputs move on their own.
    fn mock() -> Self {
        let discovery = MockDiscovery::new();
        let wheel = discovery.add_device("Mock Wheel");
        discovery.add_device("Mock Pad");
        let slots = Arc::new(MockSlots::new(4));
        let demo = DemoDriver::spawn(wheel, slots.clone());
        Self {
            discovery: Arc::new(discovery),
            slots,
            _demo: demo,
        }
    }
}

/// Sweeps the stick of a mock device and slot 0 in a circle and taps button 0.
struct DemoDriver {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl DemoDriver {
    fn spawn(wheel: MockController, slots: Arc<MockSlots>) -> Option<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("rumblelab-demo".into())
            .spawn(move || {
                let ticker = tick(DEMO_TICK);
                let mut step = 0u32;
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            step = step.wrapping_add(1);
                            drive(&wheel, &slots, step);
                        }
                    }
                }
            });
        match thread {
            Ok(thread) => Some(Self {
                stop_tx,
                thread: Some(thread),
            }),
            Err(e) => {
                log::warn!("mock input driver not started: {e}");
                None
            }
        }
    }
}

impl Drop for DemoDriver {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn drive(wheel: &MockController, slots: &MockSlots, step: u32) {
    let angle = (step % 16) as f32 / 16.0 * TAU;
    let (x, y) = (angle.cos() * 0.8, angle.sin() * 0.8);
    wheel.set_stick(x, y);
    if step % 8 < 4 {
        wheel.press(0);
    } else {
        wheel.release(0);
    }

    let axis = |v: f32| (v * f32::from(i16::MAX)).round() as i16;
    slots.connect(
        0,
        GamepadState {
            packet: step,
            buttons: if step % 8 < 4 { GamepadState::A } else { 0 },
            thumb_lx: axis(x),
            thumb_ly: axis(y),
            ..GamepadState::default()
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumblelab_session::SlotReading;

    #[test]
    fn mock_backends_list_two_devices() {
        let backends = Backends::open(true).unwrap();
        let names: Vec<_> = backends
            .discovery
            .enumerate()
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Mock Wheel", "Mock Pad"]);
        assert_eq!(backends.slots.slot_count(), 4);
    }

    #[test]
    fn drive_moves_stick_and_slot() {
        let discovery = MockDiscovery::new();
        let wheel = discovery.add_device("Wheel");
        let slots = MockSlots::new(2);
        drive(&wheel, &slots, 4);
        match slots.query(0).unwrap() {
            SlotReading::Connected { state, .. } => {
                assert_eq!(state.packet, 4);
                assert_eq!(state.thumb_lx, 0);
                assert!(state.thumb_ly > 0);
            }
            SlotReading::Disconnected => panic!("slot 0 should be connected"),
        }
        assert_eq!(slots.query(1).unwrap(), SlotReading::Disconnected);
    }
}
