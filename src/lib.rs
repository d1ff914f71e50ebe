//! Driver for USB SNES-style gamepads that speak an 8-byte HID report.
//!
//! Attached pads are turned into edge-triggered navigation keys for a
//! text-mode menu. Nothing here blocks: key queries poll a background
//! interrupt read and hand out queued keys.
//!
//! - [`usb`] - host controller abstraction and a scripted simulator
//! - [`controller`] - report decoding, edge detection, compatibility table
//! - [`mapping`] - configurable trigger to key bindings
//! - [`session`] - per-device sessions and the registry that owns them
//! - [`terminal`] - `getkey`/`checkkey` entry points for the input layer
//! - [`config`] - TOML configuration

pub mod config;
pub mod controller;
pub mod mapping;
pub mod session;
pub mod terminal;
pub mod usb;

pub use config::{ConfigError, DriverConfig};
pub use mapping::{KeyId, KeyMap};
pub use session::{SessionRegistry, StatusReport};
pub use terminal::{InputRegistry, SourceId};
