//! Translation of controller edges into logical key events.
//!
//! A [`KeyMap`] is an ordered list of [`Binding`]s from a [`Trigger`] (a D-pad
//! direction or a button) to a [`KeyId`]. The map is configuration, not
//! state: sessions look triggers up on every edge, and a trigger without a
//! binding simply produces nothing.
//!
//! The default table targets a boot menu:
//!
//! | Trigger      | Key        |
//! |--------------|------------|
//! | D-pad        | arrow keys |
//! | A, Start     | Enter      |
//! | B, X         | Escape     |
//! | Select       | `e` (edit entry) |
//! | Y            | `c` (command line) |
//! | L / R        | PageUp / PageDown |

pub mod error;

pub use error::MappingError;

use crate::controller::report::{Button, Direction};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Logical key token handed to the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyId {
    Up,
    Down,
    Left,
    Right,
    Enter,
    Escape,
    PageUp,
    PageDown,
    Char(char),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyId::Up => write!(f, "Up"),
            KeyId::Down => write!(f, "Down"),
            KeyId::Left => write!(f, "Left"),
            KeyId::Right => write!(f, "Right"),
            KeyId::Enter => write!(f, "Enter"),
            KeyId::Escape => write!(f, "Escape"),
            KeyId::PageUp => write!(f, "PageUp"),
            KeyId::PageDown => write!(f, "PageDown"),
            KeyId::Char(c) => write!(f, "'{}'", c),
        }
    }
}

/// What fires a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Dpad(Direction),
    Button(Button),
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Dpad(direction) => write!(f, "D-pad {:?}", direction),
            Trigger::Button(button) => write!(f, "button {}", button.label()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub trigger: Trigger,
    pub key: KeyId,
}

impl Binding {
    pub const fn new(trigger: Trigger, key: KeyId) -> Self {
        Self { trigger, key }
    }
}

const DEFAULT_BINDINGS: [Binding; 12] = [
    Binding::new(Trigger::Dpad(Direction::Up), KeyId::Up),
    Binding::new(Trigger::Dpad(Direction::Down), KeyId::Down),
    Binding::new(Trigger::Dpad(Direction::Left), KeyId::Left),
    Binding::new(Trigger::Dpad(Direction::Right), KeyId::Right),
    Binding::new(Trigger::Button(Button::A), KeyId::Enter),
    Binding::new(Trigger::Button(Button::B), KeyId::Escape),
    Binding::new(Trigger::Button(Button::Start), KeyId::Enter),
    Binding::new(Trigger::Button(Button::Select), KeyId::Char('e')),
    Binding::new(Trigger::Button(Button::Y), KeyId::Char('c')),
    Binding::new(Trigger::Button(Button::X), KeyId::Escape),
    Binding::new(Trigger::Button(Button::L), KeyId::PageUp),
    Binding::new(Trigger::Button(Button::R), KeyId::PageDown),
];

/// Ordered trigger → key table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyMap {
    bindings: Vec<Binding>,
}

impl KeyMap {
    pub fn new(bindings: Vec<Binding>) -> Result<Self, MappingError> {
        let map = Self { bindings };
        map.validate()?;
        Ok(map)
    }

    /// Default boot-menu table.
    pub fn default_config() -> Self {
        Self {
            bindings: DEFAULT_BINDINGS.to_vec(),
        }
    }

    /// A map with no bindings; every edge is swallowed.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        let mut seen = HashSet::new();
        for binding in &self.bindings {
            if !seen.insert(binding.trigger) {
                return Err(MappingError::DuplicateTrigger(binding.trigger));
            }
            if let KeyId::Char(c) = binding.key {
                if !c.is_ascii_graphic() && c != ' ' {
                    return Err(MappingError::UnprintableChar(c));
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, trigger: Trigger) -> Option<KeyId> {
        self.bindings
            .iter()
            .find(|binding| binding.trigger == trigger)
            .map(|binding| binding.key)
    }

    /// Replace or add the binding for `trigger`.
    pub fn bind(&mut self, trigger: Trigger, key: KeyId) {
        match self.bindings.iter_mut().find(|b| b.trigger == trigger) {
            Some(binding) => binding.key = key,
            None => self.bindings.push(Binding::new(trigger, key)),
        }
    }

    pub fn unbind(&mut self, trigger: Trigger) -> Option<KeyId> {
        let pos = self.bindings.iter().position(|b| b.trigger == trigger)?;
        Some(self.bindings.remove(pos).key)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

impl Default for KeyMap {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table() {
        let map = KeyMap::default_config();
        assert!(map.validate().is_ok());
        assert_eq!(map.lookup(Trigger::Button(Button::A)), Some(KeyId::Enter));
        assert_eq!(map.lookup(Trigger::Button(Button::B)), Some(KeyId::Escape));
        assert_eq!(map.lookup(Trigger::Button(Button::Start)), Some(KeyId::Enter));
        assert_eq!(map.lookup(Trigger::Button(Button::Select)), Some(KeyId::Char('e')));
        assert_eq!(map.lookup(Trigger::Button(Button::Y)), Some(KeyId::Char('c')));
        assert_eq!(map.lookup(Trigger::Button(Button::L)), Some(KeyId::PageUp));
        assert_eq!(map.lookup(Trigger::Button(Button::R)), Some(KeyId::PageDown));
        assert_eq!(map.lookup(Trigger::Dpad(Direction::Left)), Some(KeyId::Left));
    }

    #[test]
    fn duplicate_triggers_are_rejected() {
        let result = KeyMap::new(vec![
            Binding::new(Trigger::Button(Button::A), KeyId::Enter),
            Binding::new(Trigger::Button(Button::A), KeyId::Escape),
        ]);
        assert_eq!(
            result,
            Err(MappingError::DuplicateTrigger(Trigger::Button(Button::A)))
        );
    }

    #[test]
    fn control_characters_are_rejected() {
        let result = KeyMap::new(vec![Binding::new(
            Trigger::Button(Button::X),
            KeyId::Char('\u{7}'),
        )]);
        assert_eq!(result, Err(MappingError::UnprintableChar('\u{7}')));
    }

    #[test]
    fn bind_replaces_existing_binding() {
        let mut map = KeyMap::default_config();
        let before = map.bindings().len();
        map.bind(Trigger::Button(Button::X), KeyId::Char('x'));
        assert_eq!(map.bindings().len(), before);
        assert_eq!(map.lookup(Trigger::Button(Button::X)), Some(KeyId::Char('x')));

        assert_eq!(map.unbind(Trigger::Button(Button::X)), Some(KeyId::Char('x')));
        assert_eq!(map.lookup(Trigger::Button(Button::X)), None);
        assert_eq!(map.unbind(Trigger::Button(Button::X)), None);
    }
}
