//! Table of controllers known to speak the 8-byte SNES report.
//!
//! Find the ids of a new pad with `lsusb | grep -i game` and append it to the
//! `extra_controllers` list of the driver config.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::usb::DeviceIds;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatEntry {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: Cow<'static, str>,
}

impl CompatEntry {
    pub const fn new(vendor_id: u16, product_id: u16, name: &'static str) -> Self {
        Self {
            vendor_id,
            product_id,
            name: Cow::Borrowed(name),
        }
    }

    pub fn ids(&self) -> DeviceIds {
        DeviceIds::new(self.vendor_id, self.product_id)
    }

    pub fn matches(&self, ids: DeviceIds) -> bool {
        self.vendor_id == ids.vendor_id && self.product_id == ids.product_id
    }
}

impl fmt::Display for CompatEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.ids())
    }
}

pub const BUILTIN_CONTROLLERS: &[CompatEntry] = &[
    CompatEntry::new(0x0810, 0xe501, "Generic Chinese SNES"),
    CompatEntry::new(0x0079, 0x0011, "DragonRise Generic"),
    CompatEntry::new(0x0583, 0x2060, "iBuffalo SNES"),
    CompatEntry::new(0x2dc8, 0x9018, "8BitDo SN30"),
    CompatEntry::new(0x12bd, 0xd015, "Generic 2-pack SNES"),
    CompatEntry::new(0x1a34, 0x0802, "USB Gamepad"),
    CompatEntry::new(0x0810, 0x0001, "Generic USB Gamepad"),
    CompatEntry::new(0x0079, 0x0006, "DragonRise Gamepad"),
];

/// Built-in entries followed by configured extras. Lookup is a linear
/// scan; the first exact (vendor, product) match wins.
#[derive(Debug, Clone)]
pub struct CompatTable {
    extra: Vec<CompatEntry>,
}

impl CompatTable {
    pub fn builtin() -> Self {
        Self { extra: Vec::new() }
    }

    pub fn with_extra(extra: Vec<CompatEntry>) -> Self {
        Self { extra }
    }

    pub fn lookup(&self, ids: DeviceIds) -> Option<&CompatEntry> {
        self.iter().find(|entry| entry.matches(ids))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompatEntry> {
        BUILTIN_CONTROLLERS.iter().chain(self.extra.iter())
    }

    pub fn len(&self) -> usize {
        BUILTIN_CONTROLLERS.len() + self.extra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CompatTable {
    fn default() -> Self {
        Self::builtin()
    }
}
