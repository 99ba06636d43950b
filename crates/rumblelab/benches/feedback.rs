use std::sync::Arc;

use codspeed_criterion_compat::{black_box, criterion_group, criterion_main, Criterion};
use rumblelab::render::snapshot_line;
use rumblelab_session::mock::{default_capabilities, MockDiscovery};
use rumblelab_session::{
    slot_rumble, FeedbackController, GamepadState, PolledSnapshot, Session, SessionConfig,
    SlotCaps, SlotReading,
};

fn snapshots() -> Vec<PolledSnapshot> {
    (0..16u32)
        .map(|t| {
            let angle = t as f32 * 0.392_699_1;
            let mut snapshot = PolledSnapshot {
                sequence: u64::from(t),
                ..PolledSnapshot::default()
            };
            snapshot.axes[0] = 32767 + (angle.cos() * 30000.0) as i32;
            snapshot.axes[1] = 32767 + (angle.sin() * 30000.0) as i32;
            if t % 4 < 2 {
                snapshot.buttons.insert((t % 12) as u8);
            }
            snapshot
        })
        .collect()
}

pub fn bench_feedback_decide(c: &mut Criterion) {
    let discovery = MockDiscovery::new();
    discovery.add_device("bench");
    let (mut session, _ui_rx) =
        Session::activate(Arc::new(discovery), SessionConfig::default()).unwrap();
    session.select_device(Some(0)).unwrap();
    let effect = session.select_effect(Some(0)).unwrap();
    let controller = FeedbackController::new();
    let center = default_capabilities().center();
    let snapshots = snapshots();

    c.bench_function("feedback_decide", |b| {
        b.iter(|| {
            for snapshot in &snapshots {
                black_box(controller.decide(black_box(snapshot), effect.as_ref(), center));
            }
        })
    });
}

pub fn bench_slot_rumble(c: &mut Criterion) {
    let readings: Vec<SlotReading> = (0..16i16)
        .map(|t| SlotReading::Connected {
            caps: SlotCaps {
                has_rumble: true,
                wireless: false,
            },
            state: GamepadState {
                thumb_lx: t * 2000,
                thumb_ly: -t * 1500,
                thumb_rx: t * 1000,
                ..GamepadState::default()
            },
        })
        .collect();

    c.bench_function("slot_rumble", |b| {
        b.iter(|| {
            for reading in &readings {
                black_box(slot_rumble(black_box(reading), true));
            }
        })
    });
}

pub fn bench_snapshot_line(c: &mut Criterion) {
    let caps = default_capabilities();
    let snapshots = snapshots();

    c.bench_function("snapshot_line", |b| {
        b.iter(|| {
            for snapshot in &snapshots {
                black_box(snapshot_line(black_box(snapshot), &caps));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_feedback_decide,
    bench_slot_rumble,
    bench_snapshot_line
);
criterion_main!(benches);
