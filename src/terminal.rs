//! Boundary towards the host's text-input layer.
//!
//! Each live session is exposed as one named input source. The input layer
//! asks for keys through [`getkey`] and [`checkkey`]; how a [`KeyId`] becomes
//! the terminal's own key code is supplied by the caller via [`KeyCodes`].

use std::collections::BTreeMap;
use std::fmt;

use crate::mapping::KeyId;
use crate::session::registry::SessionRegistry;
use crate::usb::UsbHost;

pub const INPUT_NAME: &str = "usb_snes_gamepad";

/// Names one session's input source. The generation changes every time a
/// slot is reused, so a handle to a detached session never reaches the
/// session that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId {
    pub slot: usize,
    pub generation: u32,
}

impl SourceId {
    pub const fn new(slot: usize, generation: u32) -> Self {
        Self { slot, generation }
    }

    pub fn input_name(&self) -> String {
        format!("{}{}", INPUT_NAME, self.slot)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.input_name(), self.generation)
    }
}

/// Registration surface of the host's input layer.
pub trait InputRegistry {
    fn register_input(&mut self, source: SourceId, name: &str);
    fn unregister_input(&mut self, source: SourceId);
}

/// Caller-supplied translation from logical keys to terminal key codes.
pub trait KeyCodes {
    /// Sentinel returned when no key is pending.
    fn no_key(&self) -> i32;

    fn code(&self, key: KeyId) -> i32;
}

/// `getkey` entry point of an input source.
pub fn getkey<H: UsbHost, C: KeyCodes>(
    registry: &mut SessionRegistry,
    host: &mut H,
    source: SourceId,
    codes: &C,
) -> i32 {
    registry
        .get_key(host, source)
        .map(|key| codes.code(key))
        .unwrap_or_else(|| codes.no_key())
}

/// `checkkey` entry point of an input source.
pub fn checkkey<H: UsbHost>(registry: &mut SessionRegistry, host: &mut H, source: SourceId) -> bool {
    registry.has_key(host, source)
}

/// Plain bookkeeping implementation of [`InputRegistry`].
#[derive(Debug, Default)]
pub struct InputTable {
    inputs: BTreeMap<SourceId, String>,
}

impl InputTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sources(&self) -> impl Iterator<Item = SourceId> + '_ {
        self.inputs.keys().copied()
    }

    pub fn name(&self, source: SourceId) -> Option<&str> {
        self.inputs.get(&source).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl InputRegistry for InputTable {
    fn register_input(&mut self, source: SourceId, name: &str) {
        self.inputs.insert(source, name.to_string());
    }

    fn unregister_input(&mut self, source: SourceId) {
        self.inputs.remove(&source);
    }
}
