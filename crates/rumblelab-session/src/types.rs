/// Unique identifier of a controller device, stable while it stays plugged in.
pub type DeviceId = u32;

/// Maximum number of axes carried in a [`PolledSnapshot`].
pub const MAX_AXES: usize = 8;

/// Maximum number of hats (POV switches) carried in a [`PolledSnapshot`].
pub const MAX_HATS: usize = 4;

/// Opaque descriptor returned by device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub id: DeviceId,
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// How a device is shared with other applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooperativeLevel {
    /// Readable while the window is unfocused, exclusive force-feedback access.
    BackgroundExclusive,
    /// Readable only while focused, shared with other applications.
    ForegroundShared,
}

/// Capability summary of an open device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub axes: u8,
    pub buttons: u8,
    pub hats: u8,
    /// Axes usable by force-feedback effects.
    pub ff_axes: u8,
    /// Logical axis range reported by [`PolledSnapshot::axes`].
    pub axis_min: i32,
    pub axis_max: i32,
}

impl Capabilities {
    /// Logical center of the axis range.
    pub fn center(&self) -> i32 {
        ((i64::from(self.axis_min) + i64::from(self.axis_max)) / 2) as i32
    }

    pub fn supports_feedback(&self) -> bool {
        self.ff_axes > 0
    }
}

/// POV / hat switch position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Hat {
    #[default]
    Centered,
    Up,
    UpRight,
    Right,
    DownRight,
    Down,
    DownLeft,
    Left,
    UpLeft,
}

/// Pressed-button bitmap for up to 128 buttons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ButtonSet(pub u128);

impl ButtonSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Marks button `index` as pressed. Indices past 127 are ignored.
    #[inline]
    pub fn insert(&mut self, index: u8) {
        if index < 128 {
            self.0 |= 1u128 << index;
        }
    }

    #[inline]
    pub fn remove(&mut self, index: u8) {
        if index < 128 {
            self.0 &= !(1u128 << index);
        }
    }

    #[inline]
    pub fn contains(&self, index: u8) -> bool {
        index < 128 && self.0 & (1u128 << index) != 0
    }

    #[inline]
    pub fn any(&self) -> bool {
        self.0 != 0
    }

    #[inline]
    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates over pressed button indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..128u8).filter(move |i| self.contains(*i))
    }
}

/// A full point-in-time read of one device's input state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolledSnapshot {
    /// Monotonic read counter assigned by the backend.
    pub sequence: u64,
    pub axes: [i32; MAX_AXES],
    pub buttons: ButtonSet,
    pub hats: [Hat; MAX_HATS],
}

impl PolledSnapshot {
    #[inline]
    pub fn any_button_pressed(&self) -> bool {
        self.buttons.any()
    }

    /// Returns the value of axis `index`, or zero when out of range.
    #[inline]
    pub fn axis(&self, index: usize) -> i32 {
        self.axes.get(index).copied().unwrap_or(0)
    }
}

/// Effect direction in cartesian device units, one component per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Direction(pub [i32; 2]);

impl Direction {
    pub fn x(&self) -> i32 {
        self.0[0]
    }

    pub fn y(&self) -> i32 {
        self.0[1]
    }
}

/// Gamepad state for the fixed-layout multi-slot poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GamepadState {
    /// Incremented by the source every time the state changes.
    pub packet: u32,
    pub buttons: u16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub thumb_lx: i16,
    pub thumb_ly: i16,
    pub thumb_rx: i16,
    pub thumb_ry: i16,
}

impl GamepadState {
    pub const DPAD_UP: u16 = 0x0001;
    pub const DPAD_DOWN: u16 = 0x0002;
    pub const DPAD_LEFT: u16 = 0x0004;
    pub const DPAD_RIGHT: u16 = 0x0008;
    pub const START: u16 = 0x0010;
    pub const BACK: u16 = 0x0020;
    pub const LEFT_THUMB: u16 = 0x0040;
    pub const RIGHT_THUMB: u16 = 0x0080;
    pub const LEFT_SHOULDER: u16 = 0x0100;
    pub const RIGHT_SHOULDER: u16 = 0x0200;
    pub const GUIDE: u16 = 0x0400;
    pub const A: u16 = 0x1000;
    pub const B: u16 = 0x2000;
    pub const X: u16 = 0x4000;
    pub const Y: u16 = 0x8000;

    pub fn left_stick(&self) -> (i16, i16) {
        (self.thumb_lx, self.thumb_ly)
    }

    pub fn right_stick(&self) -> (i16, i16) {
        (self.thumb_rx, self.thumb_ry)
    }

    #[inline]
    pub fn is_pressed(&self, mask: u16) -> bool {
        self.buttons & mask != 0
    }
}

/// Capabilities of a connected gamepad slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCaps {
    pub has_rumble: bool,
    pub wireless: bool,
}

/// Result of querying one slot of the multi-slot poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotReading {
    Disconnected,
    Connected { caps: SlotCaps, state: GamepadState },
}

impl SlotReading {
    pub fn is_connected(&self) -> bool {
        matches!(self, SlotReading::Connected { .. })
    }

    pub fn state(&self) -> Option<&GamepadState> {
        match self {
            SlotReading::Connected { state, .. } => Some(state),
            SlotReading::Disconnected => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_set_insert_remove() {
        let mut set = ButtonSet::empty();
        assert!(!set.any());
        set.insert(0);
        set.insert(127);
        set.insert(200);
        assert!(set.contains(0));
        assert!(set.contains(127));
        assert!(!set.contains(200));
        assert_eq!(set.count(), 2);
        set.remove(0);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![127]);
    }

    #[test]
    fn capabilities_center_handles_signed_and_unsigned_ranges() {
        let caps = Capabilities {
            axes: 2,
            buttons: 4,
            hats: 0,
            ff_axes: 2,
            axis_min: 0,
            axis_max: 65535,
        };
        assert_eq!(caps.center(), 32767);
        let caps = Capabilities {
            axis_min: i32::from(i16::MIN),
            axis_max: i32::from(i16::MAX),
            ..caps
        };
        assert_eq!(caps.center(), 0);
    }

    #[test]
    fn snapshot_axis_out_of_range_is_zero() {
        let snap = PolledSnapshot::default();
        assert_eq!(snap.axis(MAX_AXES + 3), 0);
    }
}
