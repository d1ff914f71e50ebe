//! Rising-edge detection between two consecutive reports.
//!
//! Only 0 → 1 transitions produce events. Evaluation order is fixed so that
//! a burst of simultaneous changes always comes out the same way:
//!
//! 1. vertical axis (up, down)
//! 2. horizontal axis (left, right)
//! 3. buttons in bit order X, A, B, Y, L, R, Select, Start

use crate::controller::report::{Button, DecodedState, Direction, RawReport};
use crate::mapping::{KeyId, KeyMap, Trigger};

/// Upper bound on edges in one poll: one per axis plus eight buttons.
pub const MAX_EDGES: usize = 10;

const DIRECTION_ORDER: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

/// Fixed-capacity, ordered list of key events from one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edges {
    keys: [KeyId; MAX_EDGES],
    len: usize,
}

impl Edges {
    fn new() -> Self {
        Self {
            keys: [KeyId::Escape; MAX_EDGES],
            len: 0,
        }
    }

    fn push(&mut self, key: KeyId) {
        // capacity equals the number of possible triggers, so this never drops
        if let Some(slot) = self.keys.get_mut(self.len) {
            *slot = key;
            self.len += 1;
        }
    }

    pub fn as_slice(&self) -> &[KeyId] {
        &self.keys[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyId> {
        self.as_slice().iter()
    }
}

impl<'a> IntoIterator for &'a Edges {
    type Item = &'a KeyId;
    type IntoIter = std::slice::Iter<'a, KeyId>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Triggers that went from inactive to active, in evaluation order.
pub fn rising_triggers(
    previous: &DecodedState,
    current: &DecodedState,
) -> impl Iterator<Item = Trigger> {
    let previous = *previous;
    let current = *current;

    let directions = DIRECTION_ORDER
        .into_iter()
        .filter(move |&d| current.direction(d) && !previous.direction(d))
        .map(Trigger::Dpad);

    let pressed = current.buttons & !previous.buttons;
    let buttons = Button::ALL
        .into_iter()
        .filter(move |b| pressed & b.mask() != 0)
        .map(Trigger::Button);

    directions.chain(buttons)
}

/// Map the rising edges between two reports through `keymap`.
///
/// Unbound triggers are skipped; the relative order of the rest is kept.
pub fn detect(previous: &RawReport, current: &RawReport, keymap: &KeyMap) -> Edges {
    let mut edges = Edges::new();
    for trigger in rising_triggers(&previous.decode(), &current.decode()) {
        if let Some(key) = keymap.lookup(trigger) {
            edges.push(key);
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::Binding;

    fn report(x: u8, y: u8, buttons: u8) -> RawReport {
        RawReport::new([x, y, 0x7F, 0x7F, buttons, 0, 0, 0])
    }

    #[test]
    fn single_button_press_fires_once() {
        let map = KeyMap::default_config();
        let edges = detect(&RawReport::BASELINE, &report(0x7F, 0x7F, 0x02), &map);
        assert_eq!(edges.as_slice(), &[KeyId::Enter]);
    }

    #[test]
    fn unchanged_state_fires_nothing() {
        let map = KeyMap::default_config();
        let held = report(0x00, 0xFF, 0xFF);
        assert!(detect(&held, &held, &map).is_empty());
        assert!(detect(&RawReport::BASELINE, &RawReport::BASELINE, &map).is_empty());
    }

    #[test]
    fn release_fires_nothing() {
        let map = KeyMap::default_config();
        let edges = detect(&report(0x00, 0x00, 0x02), &RawReport::BASELINE, &map);
        assert!(edges.is_empty());
    }

    #[test]
    fn axis_entering_a_zone_fires() {
        let map = KeyMap::default_config();
        assert_eq!(
            detect(&RawReport::BASELINE, &report(0x00, 0x7F, 0), &map).as_slice(),
            &[KeyId::Left]
        );
        assert_eq!(
            detect(&RawReport::BASELINE, &report(0x7F, 0xFF, 0), &map).as_slice(),
            &[KeyId::Down]
        );
        // staying inside the dead-zone is not a move
        assert!(detect(&RawReport::BASELINE, &report(0x3F, 0xBF, 0), &map).is_empty());
    }

    #[test]
    fn swinging_across_center_fires_the_new_side() {
        let map = KeyMap::default_config();
        let edges = detect(&report(0x00, 0x7F, 0), &report(0xFF, 0x7F, 0), &map);
        assert_eq!(edges.as_slice(), &[KeyId::Right]);
    }

    #[test]
    fn simultaneous_changes_follow_fixed_order() {
        let map = KeyMap::default_config();
        // everything at once: up-left plus all buttons
        let edges = detect(&RawReport::BASELINE, &report(0x00, 0x00, 0xFF), &map);
        assert_eq!(
            edges.as_slice(),
            &[
                KeyId::Up,
                KeyId::Left,
                KeyId::Escape,   // X
                KeyId::Enter,    // A
                KeyId::Escape,   // B
                KeyId::Char('c'), // Y
                KeyId::PageUp,   // L
                KeyId::PageDown, // R
                KeyId::Char('e'), // Select
                KeyId::Enter,    // Start
            ]
        );
    }

    #[test]
    fn unbound_triggers_are_skipped() {
        let map = KeyMap::new(vec![Binding::new(
            Trigger::Button(Button::Start),
            KeyId::Enter,
        )])
        .unwrap();
        let edges = detect(&RawReport::BASELINE, &report(0x00, 0x7F, 0x81), &map);
        assert_eq!(edges.as_slice(), &[KeyId::Enter]);
    }

    #[test]
    fn only_new_bits_count() {
        let map = KeyMap::default_config();
        // A held, B newly pressed
        let edges = detect(&report(0x7F, 0x7F, 0x02), &report(0x7F, 0x7F, 0x06), &map);
        assert_eq!(edges.as_slice(), &[KeyId::Escape]);
    }
}
