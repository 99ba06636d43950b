use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ahash::AHashMap;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use rumblelab_session::{
    Capabilities, DeviceDescriptor, DeviceId, Direction, EffectSpec, GamepadState,
    Hat, PolledSnapshot, SlotCaps, SlotReading, MAX_AXES, MAX_HATS,
};
use sdl2::controller::{Axis as SdlAxis, Button as SdlButton, GameController};
use sdl2::event::Event;
use sdl2::joystick::{HatState, Joystick};
use sdl2::{GameControllerSubsystem, HapticSubsystem, JoystickSubsystem};

use crate::command::{Command, EffectId};
use crate::error::{Error, Result};
use crate::haptic::{build_effect, usb_ids, Haptic};
use crate::manager::{DeviceEntry, Inner, SLOT_COUNT};

/// Rumble duration per command; slot rumble is refreshed every poll tick.
const RUMBLE_HOLD_MS: u32 = 1000;

struct OpenEffect {
    spec: EffectSpec,
}

struct OpenJoystick {
    // Declared first so it closes before the joystick it was opened from.
    haptic: Option<Haptic>,
    effects: AHashMap<EffectId, OpenEffect>,
    acquired: bool,
    joystick: Joystick,
}

impl OpenJoystick {
    fn stop_all(&mut self) {
        if let Some(haptic) = self.haptic.as_mut() {
            for id in self.effects.keys() {
                let _ = haptic.stop(*id);
            }
        }
    }
}

struct Slot {
    controller: GameController,
    packet: u32,
}

/// SDL state owned by the runtime thread.
struct Runtime {
    // Devices are declared before the subsystems they were opened from.
    joysticks: AHashMap<DeviceId, OpenJoystick>,
    slots: Vec<Option<Slot>>,
    sequence: u64,
    inner: Arc<Inner>,
    joystick_subsystem: JoystickSubsystem,
    controller_subsystem: GameControllerSubsystem,
    _haptic_subsystem: HapticSubsystem,
}

/// Starts the SDL2-backed runtime thread that drives device discovery, state
/// events and haptic commands.
pub(crate) fn start_runtime_thread(
    inner: Arc<Inner>,
    cmd_rx: Receiver<Command>,
    ready_tx: Sender<std::result::Result<(), String>>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("rumblelab-sdl".into())
        .spawn(move || {
            // Keep joystick events flowing while the console is unfocused.
            sdl2::hint::set("SDL_JOYSTICK_ALLOW_BACKGROUND_EVENTS", "1");

            // SDL must live entirely within this thread
            let sdl_ctx = match sdl2::init() {
                Ok(ctx) => ctx,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let subsystems = sdl_ctx.joystick().and_then(|joystick| {
                let controller = sdl_ctx.game_controller()?;
                let haptic = sdl_ctx.haptic()?;
                let pump = sdl_ctx.event_pump()?;
                Ok((joystick, controller, haptic, pump))
            });
            let (joystick_subsystem, controller_subsystem, haptic_subsystem, mut event_pump) =
                match subsystems {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

            let mut runtime = Runtime {
                inner,
                joystick_subsystem,
                controller_subsystem,
                _haptic_subsystem: haptic_subsystem,
                joysticks: AHashMap::new(),
                slots: (0..SLOT_COUNT).map(|_| None).collect(),
                sequence: 0,
            };
            runtime.enumerate();
            let _ = ready_tx.send(Ok(()));

            'run: loop {
                // Wait for an SDL event or timeout to reduce idle CPU usage
                if let Some(event) = event_pump.wait_event_timeout(10) {
                    runtime.handle_event(event);
                    for event in event_pump.poll_iter() {
                        runtime.handle_event(event);
                    }
                }

                loop {
                    match cmd_rx.try_recv() {
                        Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => break 'run,
                        Ok(cmd) => runtime.handle_command(cmd),
                        Err(TryRecvError::Empty) => break,
                    }
                }
            }
            runtime.close_all();
            log::debug!("SDL runtime exited");
        })
}

impl Runtime {
    fn enumerate(&mut self) {
        let count = match self.joystick_subsystem.num_joysticks() {
            Ok(count) => count,
            Err(e) => {
                log::warn!("failed to count joysticks: {e}");
                return;
            }
        };
        for index in 0..count {
            self.open_joystick(index);
            if self.controller_subsystem.is_game_controller(index) {
                self.open_controller(index);
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::JoyDeviceAdded { which, .. } => {
                if self.open_joystick(which) {
                    self.inner.post_hotplug();
                }
            }
            Event::JoyDeviceRemoved { which, .. } => {
                if self.close_joystick(which) {
                    self.inner.post_hotplug();
                }
            }
            Event::JoyAxisMotion {
                which,
                axis_idx,
                value,
                ..
            } => self.update_snapshot(which, |s| {
                if let Some(axis) = s.axes.get_mut(usize::from(axis_idx)) {
                    *axis = i32::from(value);
                }
            }),
            Event::JoyButtonDown {
                which, button_idx, ..
            } => self.update_snapshot(which, |s| s.buttons.insert(button_idx)),
            Event::JoyButtonUp {
                which, button_idx, ..
            } => self.update_snapshot(which, |s| s.buttons.remove(button_idx)),
            Event::JoyHatMotion {
                which,
                hat_idx,
                state,
                ..
            } => self.update_snapshot(which, |s| {
                if let Some(hat) = s.hats.get_mut(usize::from(hat_idx)) {
                    *hat = map_hat(state);
                }
            }),
            Event::ControllerDeviceAdded { which, .. } => self.open_controller(which),
            Event::ControllerDeviceRemoved { which, .. } => self.close_controller(which),
            Event::ControllerAxisMotion { which, .. }
            | Event::ControllerButtonDown { which, .. }
            | Event::ControllerButtonUp { which, .. } => self.refresh_slot(which),
            _ => {}
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Acquire { id, reply } => {
                let result = self.joystick(id).map(|js| js.acquired = true);
                let _ = reply.send(result);
            }
            Command::Unacquire { id } => {
                if let Ok(js) = self.joystick(id) {
                    js.acquired = false;
                    js.stop_all();
                }
            }
            Command::EffectKinds { id, reply } => {
                let result = self
                    .joystick(id)
                    .map(|js| js.haptic.as_ref().map(Haptic::kinds).unwrap_or_default());
                let _ = reply.send(result);
            }
            Command::CreateEffect { id, spec, reply } => {
                let _ = reply.send(self.create_effect(id, spec));
            }
            Command::SetDirection {
                id,
                effect,
                direction,
                axes,
                reply,
            } => {
                let _ = reply.send(self.set_direction(id, effect, direction, axes));
            }
            Command::StartEffect { id, effect, reply } => {
                let result = self.with_effect(id, effect, |haptic, js_acquired| {
                    if !js_acquired {
                        return Err(Error::Backend("device is not acquired".into()));
                    }
                    haptic.run(effect)
                });
                let _ = reply.send(result);
            }
            Command::StopEffect { id, effect, reply } => {
                let result = self.with_effect(id, effect, |haptic, _| haptic.stop(effect));
                let _ = reply.send(result);
            }
            Command::DestroyEffect { id, effect } => {
                if let Ok(js) = self.joystick(id) {
                    if js.effects.remove(&effect).is_some() {
                        if let Some(haptic) = js.haptic.as_mut() {
                            haptic.destroy(effect);
                        }
                    }
                }
            }
            Command::Rumble {
                id,
                left,
                right,
                reply,
            } => {
                let result = self.joystick(id).and_then(|js| {
                    match js.joystick.set_rumble(left, right, RUMBLE_HOLD_MS) {
                        Ok(()) => Ok(()),
                        Err(e) => match js.haptic.as_mut() {
                            Some(haptic) => haptic.rumble(left, right, RUMBLE_HOLD_MS),
                            None => Err(Error::Backend(format!("{e}"))),
                        },
                    }
                });
                let _ = reply.send(result);
            }
            Command::SlotRumble { slot, left, right } => {
                if let Some(Some(slot)) = self.slots.get_mut(slot) {
                    if let Err(e) = slot.controller.set_rumble(left, right, RUMBLE_HOLD_MS) {
                        log::trace!("failed to set rumble: {e}");
                    }
                }
            }
            Command::Shutdown => {}
        }
    }

    fn joystick(&mut self, id: DeviceId) -> Result<&mut OpenJoystick> {
        self.joysticks.get_mut(&id).ok_or(Error::NotFound(id))
    }

    fn with_effect<T>(
        &mut self,
        id: DeviceId,
        effect: EffectId,
        f: impl FnOnce(&mut Haptic, bool) -> Result<T>,
    ) -> Result<T> {
        let js = self.joystick(id)?;
        if !js.effects.contains_key(&effect) {
            return Err(Error::NotFound(effect as u32));
        }
        let acquired = js.acquired;
        let haptic = js.haptic.as_mut().ok_or(Error::Unsupported)?;
        f(haptic, acquired)
    }

    fn create_effect(&mut self, id: DeviceId, spec: EffectSpec) -> Result<EffectId> {
        let js = self.joystick(id)?;
        let haptic = js.haptic.as_mut().ok_or(Error::Unsupported)?;
        if spec.axes > haptic.axes() {
            return Err(Error::Backend(format!(
                "{} axes requested, device has {}",
                spec.axes,
                haptic.axes()
            )));
        }
        let mut data = build_effect(&spec.params, spec.direction, spec.axes)?;
        let effect = haptic.create(&mut data)?;
        js.effects.insert(effect, OpenEffect { spec });
        Ok(effect)
    }

    fn set_direction(
        &mut self,
        id: DeviceId,
        effect: EffectId,
        direction: Direction,
        axes: u8,
    ) -> Result<()> {
        let js = self.joystick(id)?;
        let haptic = js.haptic.as_mut().ok_or(Error::Unsupported)?;
        let open = js
            .effects
            .get(&effect)
            .ok_or(Error::NotFound(effect as u32))?;
        if axes > haptic.axes() {
            return Err(Error::Backend(format!("{axes} axes rejected")));
        }
        let mut data = build_effect(&open.spec.params, direction, axes)?;
        haptic.update(effect, &mut data)
    }

    /// Opens the joystick at `index`. Returns `true` when it was not open yet.
    fn open_joystick(&mut self, index: u32) -> bool {
        let joystick = match self.joystick_subsystem.open(index) {
            Ok(joystick) => joystick,
            Err(e) => {
                log::warn!("failed to open joystick {index}: {e}");
                return false;
            }
        };
        let id: DeviceId = joystick.instance_id();
        if self.joysticks.contains_key(&id) {
            return false;
        }

        let haptic = Haptic::open(id);
        let (vendor_id, product_id) = usb_ids(id);
        let caps = Capabilities {
            axes: joystick.num_axes().min(MAX_AXES as u32) as u8,
            buttons: joystick.num_buttons().min(128) as u8,
            hats: joystick.num_hats().min(MAX_HATS as u32) as u8,
            ff_axes: haptic.as_ref().map_or(0, Haptic::axes),
            axis_min: i32::from(i16::MIN),
            axis_max: i32::from(i16::MAX),
        };
        let descriptor = DeviceDescriptor {
            id,
            name: joystick.name(),
            vendor_id,
            product_id,
        };
        self.sequence += 1;
        let snapshot = read_joystick(&joystick, &caps, self.sequence);
        log::debug!(
            "joystick {} ({id}): {} axes, {} buttons, {} hats, {} ff axes",
            descriptor.name,
            caps.axes,
            caps.buttons,
            caps.hats,
            caps.ff_axes
        );

        if let Ok(mut snapshots) = self.inner.snapshots.write() {
            snapshots.insert(id, snapshot);
        }
        if let Ok(mut devices) = self.inner.devices.write() {
            devices.push(DeviceEntry { descriptor, caps });
        }
        self.joysticks.insert(
            id,
            OpenJoystick {
                haptic,
                effects: AHashMap::new(),
                acquired: false,
                joystick,
            },
        );
        true
    }

    /// Closes the joystick with instance `id`. Returns `true` when it was open.
    fn close_joystick(&mut self, id: DeviceId) -> bool {
        let Some(mut js) = self.joysticks.remove(&id) else {
            return false;
        };
        js.stop_all();
        if let Ok(mut devices) = self.inner.devices.write() {
            devices.retain(|d| d.descriptor.id != id);
        }
        if let Ok(mut snapshots) = self.inner.snapshots.write() {
            snapshots.remove(&id);
        }
        // Wake the poller so it observes the failed read.
        self.inner.post_state_changed(id);
        log::debug!("joystick {id} removed");
        true
    }

    fn update_snapshot(&mut self, id: DeviceId, f: impl FnOnce(&mut PolledSnapshot)) {
        self.sequence += 1;
        let sequence = self.sequence;
        if let Ok(mut snapshots) = self.inner.snapshots.write() {
            let Some(snapshot) = snapshots.get_mut(&id) else {
                return;
            };
            f(snapshot);
            snapshot.sequence = sequence;
        }
        self.inner.post_state_changed(id);
    }

    fn open_controller(&mut self, index: u32) {
        let controller = match self.controller_subsystem.open(index) {
            Ok(controller) => controller,
            Err(e) => {
                log::warn!("failed to open game controller {index}: {e}");
                return;
            }
        };
        let id = controller.instance_id();
        if self.slot_of(id).is_some() {
            return;
        }
        let Some(free) = self.slots.iter().position(Option::is_none) else {
            log::debug!("no free slot for game controller {}", controller.name());
            return;
        };
        log::debug!("game controller {} in slot {free}", controller.name());
        self.slots[free] = Some(Slot {
            controller,
            packet: 0,
        });
        self.publish_slot(free);
    }

    fn close_controller(&mut self, id: u32) {
        let Some(index) = self.slot_of(id) else {
            return;
        };
        self.slots[index] = None;
        self.publish_slot(index);
    }

    fn refresh_slot(&mut self, id: u32) {
        if let Some(index) = self.slot_of(id) {
            self.publish_slot(index);
        }
    }

    fn slot_of(&self, id: u32) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|s| s.controller.instance_id() == id)
        })
    }

    fn publish_slot(&mut self, index: usize) {
        let reading = match self.slots.get_mut(index) {
            Some(Some(slot)) => {
                slot.packet = slot.packet.wrapping_add(1);
                SlotReading::Connected {
                    caps: SlotCaps {
                        has_rumble: slot.controller.has_rumble(),
                        wireless: false,
                    },
                    state: read_controller(&slot.controller, slot.packet),
                }
            }
            _ => SlotReading::Disconnected,
        };
        if let Ok(mut slots) = self.inner.slots.write() {
            if let Some(current) = slots.get_mut(index) {
                *current = reading;
            }
        }
    }

    fn close_all(&mut self) {
        let ids: Vec<DeviceId> = self.joysticks.keys().copied().collect();
        for id in ids {
            self.close_joystick(id);
        }
        for index in 0..self.slots.len() {
            self.slots[index] = None;
            self.publish_slot(index);
        }
    }
}

fn read_joystick(joystick: &Joystick, caps: &Capabilities, sequence: u64) -> PolledSnapshot {
    let mut snapshot = PolledSnapshot {
        sequence,
        ..PolledSnapshot::default()
    };
    for i in 0..caps.axes {
        if let Ok(value) = joystick.axis(u32::from(i)) {
            snapshot.axes[usize::from(i)] = i32::from(value);
        }
    }
    for i in 0..caps.buttons {
        if joystick.button(u32::from(i)).unwrap_or(false) {
            snapshot.buttons.insert(i);
        }
    }
    for i in 0..caps.hats {
        if let Ok(state) = joystick.hat(u32::from(i)) {
            snapshot.hats[usize::from(i)] = map_hat(state);
        }
    }
    snapshot
}

fn read_controller(controller: &GameController, packet: u32) -> GamepadState {
    let mut buttons = 0u16;
    for (button, mask) in BUTTON_MASKS {
        if controller.button(button) {
            buttons |= mask;
        }
    }
    GamepadState {
        packet,
        buttons,
        left_trigger: trigger(controller.axis(SdlAxis::TriggerLeft)),
        right_trigger: trigger(controller.axis(SdlAxis::TriggerRight)),
        thumb_lx: controller.axis(SdlAxis::LeftX),
        thumb_ly: controller.axis(SdlAxis::LeftY).saturating_neg(),
        thumb_rx: controller.axis(SdlAxis::RightX),
        thumb_ry: controller.axis(SdlAxis::RightY).saturating_neg(),
    }
}

const BUTTON_MASKS: [(SdlButton, u16); 15] = [
    (SdlButton::DPadUp, GamepadState::DPAD_UP),
    (SdlButton::DPadDown, GamepadState::DPAD_DOWN),
    (SdlButton::DPadLeft, GamepadState::DPAD_LEFT),
    (SdlButton::DPadRight, GamepadState::DPAD_RIGHT),
    (SdlButton::Start, GamepadState::START),
    (SdlButton::Back, GamepadState::BACK),
    (SdlButton::LeftStick, GamepadState::LEFT_THUMB),
    (SdlButton::RightStick, GamepadState::RIGHT_THUMB),
    (SdlButton::LeftShoulder, GamepadState::LEFT_SHOULDER),
    (SdlButton::RightShoulder, GamepadState::RIGHT_SHOULDER),
    (SdlButton::Guide, GamepadState::GUIDE),
    (SdlButton::A, GamepadState::A),
    (SdlButton::B, GamepadState::B),
    (SdlButton::X, GamepadState::X),
    (SdlButton::Y, GamepadState::Y),
];

/// Maps an SDL trigger value (`0..=32767`) onto `0..=255`.
fn trigger(value: i16) -> u8 {
    (i32::from(value.max(0)) * 255 / i32::from(i16::MAX)) as u8
}

fn map_hat(state: HatState) -> Hat {
    match state {
        HatState::Centered => Hat::Centered,
        HatState::Up => Hat::Up,
        HatState::RightUp => Hat::UpRight,
        HatState::Right => Hat::Right,
        HatState::RightDown => Hat::DownRight,
        HatState::Down => Hat::Down,
        HatState::LeftDown => Hat::DownLeft,
        HatState::Left => Hat::Left,
        HatState::LeftUp => Hat::UpLeft,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_scales_to_byte() {
        assert_eq!(trigger(0), 0);
        assert_eq!(trigger(-5), 0);
        assert_eq!(trigger(i16::MAX), 255);
        assert_eq!(trigger(16384), 127);
    }

    #[test]
    fn hats_map_diagonals() {
        assert_eq!(map_hat(HatState::RightUp), Hat::UpRight);
        assert_eq!(map_hat(HatState::LeftDown), Hat::DownLeft);
        assert_eq!(map_hat(HatState::Centered), Hat::Centered);
    }

    #[test]
    fn button_masks_are_distinct() {
        let all = BUTTON_MASKS.iter().fold(0u16, |acc, (_, m)| {
            assert_eq!(acc & m, 0);
            acc | m
        });
        assert_eq!(all.count_ones(), 15);
    }
}
