use std::io::{self, BufRead};
use std::thread;

use colored::Colorize;
use crossbeam_channel::{select, unbounded, Receiver};
use rumblelab::commands::{parse_command, ConsoleCommand, HELP};
use rumblelab::render::{device_line, effect_line, slot_line, snapshot_line};
use rumblelab::{print_error, print_info, print_warning};
use rumblelab_session::{Result, Session, SessionConfig, UiMessage, UiReceiver};

use crate::backends::Backends;

/// Prints every device with its capabilities and effects.
pub(crate) fn list(backends: &Backends, config: SessionConfig) -> Result<()> {
    let (mut session, _ui_rx) = Session::activate(backends.discovery.clone(), config)?;
    if session.devices().is_empty() {
        print_info!("no controllers found");
        return Ok(());
    }
    for index in 0..session.devices().len() {
        session.select_device(Some(index))?;
        print_device(&session, index);
        print_effects(&session);
    }
    session.select_device(None)?;
    Ok(())
}

/// Interactive single-device session.
pub(crate) fn test(
    backends: &Backends,
    config: SessionConfig,
    device: Option<usize>,
    effect: Option<usize>,
    stop_rx: &Receiver<()>,
) -> Result<()> {
    let (session, ui_rx) = Session::activate(backends.discovery.clone(), config)?;
    let mut console = TestConsole {
        session,
        last_sequence: None,
    };

    let device = device.or((!console.session.devices().is_empty()).then_some(0));
    console.session.select_device(device)?;
    if effect.is_some() {
        console.session.select_effect(effect)?;
    }
    console.session.start_single()?;
    console.list();
    print_info!("{HELP}");

    run_loop(stop_rx, &ui_rx, |event| match event {
        LoopEvent::Line(line) => console.command(&line),
        LoopEvent::Ui(UiMessage::Hotplug) => {
            console.hotplug();
            true
        }
        LoopEvent::Ui(UiMessage::Repaint { .. }) => {
            console.repaint();
            true
        }
    });

    console.session.deactivate();
    print_info!("session closed");
    Ok(())
}

/// Interactive multi-slot session.
pub(crate) fn slots(
    backends: &Backends,
    config: SessionConfig,
    feedback: &[usize],
    stop_rx: &Receiver<()>,
) -> Result<()> {
    let (mut session, ui_rx) = Session::activate(backends.discovery.clone(), config)?;
    let board = session.start_slots(backends.slots.clone())?;
    for slot in feedback {
        session.set_slot_feedback(*slot, true)?;
    }
    print_info!("watching {} slots; f <slot> toggles feedback, q quits", board.len());

    run_loop(stop_rx, &ui_rx, |event| match event {
        LoopEvent::Line(line) => match parse_command(&line) {
            Ok(ConsoleCommand::ToggleFeedback(slot)) => {
                match session.toggle_slot_feedback(slot) {
                    Ok(enabled) => {
                        let state = if enabled { "on" } else { "off" };
                        print_info!("slot {slot}: feedback {state}");
                    }
                    Err(e) => {
                        print_warning!("slot {slot}: {e}");
                    }
                }
                true
            }
            Ok(ConsoleCommand::Quit) => false,
            Ok(ConsoleCommand::List) => {
                for slot in 0..board.len() {
                    print_info!(
                        "{}",
                        slot_line(slot, board.reading(slot).as_ref(), board.feedback_enabled(slot))
                    );
                }
                true
            }
            Ok(_) => {
                print_info!("only f <slot>, l and q are available here");
                true
            }
            Err(e) => {
                print_warning!("{e}");
                true
            }
        },
        LoopEvent::Ui(UiMessage::Repaint { slot: Some(slot) }) => {
            print_info!(
                "{}",
                slot_line(slot, board.reading(slot).as_ref(), board.feedback_enabled(slot))
            );
            true
        }
        LoopEvent::Ui(_) => true,
    });

    session.deactivate();
    print_info!("session closed");
    Ok(())
}

enum LoopEvent {
    Line(String),
    Ui(UiMessage),
}

/// Feeds console lines and UI messages to `handle` until it returns `false`,
/// Ctrl+C is pressed or stdin closes.
fn run_loop(stop_rx: &Receiver<()>, ui_rx: &UiReceiver, mut handle: impl FnMut(LoopEvent) -> bool) {
    let lines = spawn_stdin_reader();
    loop {
        let keep_going = select! {
            recv(stop_rx) -> _ => false,
            recv(lines) -> line => match line {
                Ok(line) => handle(LoopEvent::Line(line)),
                Err(_) => false,
            },
            recv(ui_rx) -> msg => match msg {
                Ok(msg) => handle(LoopEvent::Ui(msg)),
                Err(_) => false,
            },
        };
        if !keep_going {
            break;
        }
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("rumblelab-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        print_error!("failed to read stdin: {e}");
    }
    rx
}

struct TestConsole {
    session: Session,
    last_sequence: Option<u64>,
}

impl TestConsole {
    fn command(&mut self, line: &str) -> bool {
        let command = match parse_command(line) {
            Ok(command) => command,
            Err(e) => {
                print_warning!("{e}");
                return true;
            }
        };
        let result = match command {
            ConsoleCommand::SelectDevice(index) => {
                self.last_sequence = None;
                self.session.select_device(Some(index)).map(|_| self.list())
            }
            ConsoleCommand::SelectEffect(index) => {
                self.session.select_effect(Some(index)).map(|_| self.list())
            }
            ConsoleCommand::Deselect => {
                self.last_sequence = None;
                self.session.select_device(None).map(|_| ())
            }
            ConsoleCommand::List => {
                self.list();
                Ok(())
            }
            ConsoleCommand::ToggleFeedback(_) => {
                print_info!("feedback slots are only available in `rumblelab slots`");
                Ok(())
            }
            ConsoleCommand::Help => {
                print_info!("{HELP}");
                Ok(())
            }
            ConsoleCommand::Quit => return false,
        };
        if let Err(e) = result {
            print_warning!("{e}");
        }
        true
    }

    fn list(&self) {
        if self.session.devices().is_empty() {
            print_info!("no controllers found");
            return;
        }
        for index in 0..self.session.devices().len() {
            print_device(&self.session, index);
        }
        print_effects(&self.session);
    }

    fn repaint(&mut self) {
        let Some(snapshot) = self.session.latest_snapshot() else {
            return;
        };
        if self.last_sequence == Some(snapshot.sequence) {
            return;
        }
        self.last_sequence = Some(snapshot.sequence);
        let Some(device) = self.session.selection().snapshot_device() else {
            return;
        };
        let Ok(caps) = device.capabilities() else {
            return;
        };
        let mut line = snapshot_line(&snapshot, &caps);
        if let Some(effect) = self.session.selection().selected_effect() {
            line.push_str(&format!(" | {} {:?}", effect.name(), effect.status()));
        }
        print_info!("{line}");
    }

    fn hotplug(&mut self) {
        match self.session.on_hotplug() {
            Ok(outcome) if outcome.refresh.is_unchanged() => {}
            Ok(outcome) => {
                if outcome.selection_lost {
                    self.last_sequence = None;
                    print_warning!("selected controller was removed");
                }
                self.list();
            }
            Err(e) => {
                print_error!("device refresh failed: {e}");
            }
        }
    }
}

fn print_device(session: &Session, index: usize) {
    let Some(device) = session.devices().get(index) else {
        return;
    };
    let caps = device.capabilities().ok();
    let selected = session.selected_device_index() == Some(index);
    let line = device_line(index, device.name(), caps.as_ref(), selected);
    if selected {
        print_info!("{}", line.bold());
    } else {
        print_info!("{line}");
    }
}

fn print_effects(session: &Session) {
    if session.selected_device_index().is_none() {
        return;
    }
    if session.effects().is_empty() {
        print_info!("   no force-feedback effects");
        return;
    }
    let selected = session.selected_effect_index();
    for (index, effect) in session.effects().effects().iter().enumerate() {
        print_info!(
            "{}",
            effect_line(index, effect.name(), effect.status(), selected == Some(index))
        );
    }
}
