use crossbeam_channel::Sender;
use rumblelab_session::{DeviceId, Direction, EffectKind, EffectSpec};

use crate::error::Result;

/// Reply channel of a blocking command.
pub(crate) type Reply<T> = Sender<Result<T>>;

/// SDL-side effect identifier.
pub(crate) type EffectId = i32;

/// Internal commands sent to the runtime thread.
pub(crate) enum Command {
    Acquire { id: DeviceId, reply: Reply<()> },
    Unacquire { id: DeviceId },
    EffectKinds { id: DeviceId, reply: Reply<Vec<EffectKind>> },
    CreateEffect { id: DeviceId, spec: EffectSpec, reply: Reply<EffectId> },
    SetDirection {
        id: DeviceId,
        effect: EffectId,
        direction: Direction,
        axes: u8,
        reply: Reply<()>,
    },
    StartEffect { id: DeviceId, effect: EffectId, reply: Reply<()> },
    StopEffect { id: DeviceId, effect: EffectId, reply: Reply<()> },
    DestroyEffect { id: DeviceId, effect: EffectId },
    Rumble { id: DeviceId, left: u16, right: u16, reply: Reply<()> },
    SlotRumble { slot: usize, left: u16, right: u16 },
    Shutdown,
}
