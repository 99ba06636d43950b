//! SDL2 backend: joystick discovery, input state and haptic effects for
//! `rumblelab-session`.

mod command;
mod device;
mod error;
mod haptic;
mod manager;
mod runtime;

pub use crate::error::{Error, Result};
pub use crate::manager::{SdlBackend, SLOT_COUNT};
