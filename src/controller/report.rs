//! SNES HID report codec
//!
//! Generic SNES USB pads send one fixed 8-byte input report:
//!
//! ```text
//! byte 0   X axis   0x00 left  .. 0x7F center .. 0xFF right
//! byte 1   Y axis   0x00 up    .. 0x7F center .. 0xFF down
//! byte 2-3 unused   (usually 0x7F)
//! byte 4   buttons  bit0 X, bit1 A, bit2 B, bit3 Y,
//!                   bit4 L, bit5 R, bit6 Select, bit7 Start
//! byte 5-7 unused   (usually 0x00)
//! ```
//!
//! Decoding is pure and total: any 8 bytes are a valid report.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const REPORT_SIZE: usize = 8;

pub const AXIS_CENTER: u8 = 0x7F;
pub const AXIS_THRESHOLD: u8 = 0x40;
/// Values strictly below this are "low" (left/up).
pub const AXIS_LOW: u8 = AXIS_CENTER - AXIS_THRESHOLD;
/// Values strictly above this are "high" (right/down).
pub const AXIS_HIGH: u8 = AXIS_CENTER + AXIS_THRESHOLD;

const X_AXIS: usize = 0;
const Y_AXIS: usize = 1;
const BUTTONS: usize = 4;

/// Position of one axis relative to the dead-zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisZone {
    Low,
    Neutral,
    High,
}

/// Classify an axis byte against the fixed dead-zone.
pub fn classify(value: u8) -> AxisZone {
    if value < AXIS_LOW {
        AxisZone::Low
    } else if value > AXIS_HIGH {
        AxisZone::High
    } else {
        AxisZone::Neutral
    }
}

/// D-pad direction derived from the axis bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Face, shoulder and system buttons, in report bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    X,
    A,
    B,
    Y,
    L,
    R,
    Select,
    Start,
}

impl Button {
    /// All buttons ordered by their bit position.
    pub const ALL: [Button; 8] = [
        Button::X,
        Button::A,
        Button::B,
        Button::Y,
        Button::L,
        Button::R,
        Button::Select,
        Button::Start,
    ];

    pub const fn bit(self) -> u8 {
        self as u8
    }

    pub const fn mask(self) -> u8 {
        1 << self.bit()
    }

    pub fn label(self) -> &'static str {
        match self {
            Button::X => "X",
            Button::A => "A",
            Button::B => "B",
            Button::Y => "Y",
            Button::L => "L",
            Button::R => "R",
            Button::Select => "Select",
            Button::Start => "Start",
        }
    }
}

/// Logical view of one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub buttons: u8,
}

impl DecodedState {
    pub fn direction(&self, direction: Direction) -> bool {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn pressed(&self, button: Button) -> bool {
        self.buttons & button.mask() != 0
    }
}

/// One raw 8-byte input report.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawReport([u8; REPORT_SIZE]);

impl RawReport {
    /// Idle controller: both axes centered, padding 0x7F/0x00, no buttons.
    pub const BASELINE: RawReport =
        RawReport([AXIS_CENTER, AXIS_CENTER, AXIS_CENTER, AXIS_CENTER, 0, 0, 0, 0]);

    pub const fn new(bytes: [u8; REPORT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a report from a read buffer. Anything shorter than a full
    /// report is not usable data.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let head = bytes.get(..REPORT_SIZE)?;
        let mut raw = [0u8; REPORT_SIZE];
        raw.copy_from_slice(head);
        Some(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_SIZE] {
        &self.0
    }

    pub fn x_axis(&self) -> u8 {
        self.0[X_AXIS]
    }

    pub fn y_axis(&self) -> u8 {
        self.0[Y_AXIS]
    }

    pub fn buttons(&self) -> u8 {
        self.0[BUTTONS]
    }

    pub fn decode(&self) -> DecodedState {
        let x = classify(self.x_axis());
        let y = classify(self.y_axis());
        DecodedState {
            up: y == AxisZone::Low,
            down: y == AxisZone::High,
            left: x == AxisZone::Low,
            right: x == AxisZone::High,
            buttons: self.buttons(),
        }
    }

    /// Byte positions where `self` (pressed) differs from `baseline`.
    pub fn diff(&self, baseline: &RawReport) -> Vec<ByteChange> {
        baseline
            .0
            .iter()
            .zip(self.0.iter())
            .enumerate()
            .filter(|(_, (before, after))| before != after)
            .map(|(byte, (&before, &after))| ByteChange {
                byte,
                baseline: before,
                pressed: after,
            })
            .collect()
    }

    /// The report seen most often; ties go to the earliest one.
    pub fn most_common(reports: &[RawReport]) -> Option<RawReport> {
        let mut best: Option<(RawReport, usize)> = None;
        for candidate in reports {
            let count = reports.iter().filter(|r| *r == candidate).count();
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((*candidate, count)),
            }
        }
        best.map(|(report, _)| report)
    }
}

impl Default for RawReport {
    fn default() -> Self {
        Self::BASELINE
    }
}

impl fmt::Debug for RawReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawReport({})", self)
    }
}

impl fmt::Display for RawReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// One differing byte between a baseline and a pressed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteChange {
    pub byte: usize,
    pub baseline: u8,
    pub pressed: u8,
}

impl ByteChange {
    pub fn xor(&self) -> u8 {
        self.baseline ^ self.pressed
    }
}

impl fmt::Display for ByteChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "byte[{}] 0x{:02x} -> 0x{:02x}",
            self.byte, self.baseline, self.pressed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn classify_boundaries() {
        assert_eq!(classify(0x00), AxisZone::Low);
        assert_eq!(classify(0x3E), AxisZone::Low);
        assert_eq!(classify(0x3F), AxisZone::Neutral);
        assert_eq!(classify(0x7F), AxisZone::Neutral);
        assert_eq!(classify(0xBF), AxisZone::Neutral);
        assert_eq!(classify(0xC0), AxisZone::High);
        assert_eq!(classify(0xFF), AxisZone::High);
    }

    proptest! {
        #[test]
        fn classify_matches_inequalities(v in any::<u8>()) {
            let zone = classify(v);
            prop_assert_eq!(zone == AxisZone::Low, v < 0x3F);
            prop_assert_eq!(zone == AxisZone::High, v > 0xBF);
            prop_assert_eq!(zone == AxisZone::Neutral, (0x3F..=0xBF).contains(&v));
        }

        #[test]
        fn decode_never_reports_opposite_directions(bytes in any::<[u8; 8]>()) {
            let state = RawReport::new(bytes).decode();
            prop_assert!(!(state.up && state.down));
            prop_assert!(!(state.left && state.right));
            prop_assert_eq!(state.buttons, bytes[4]);
        }
    }

    #[test]
    fn baseline_is_idle() {
        let state = RawReport::BASELINE.decode();
        assert!(!state.up && !state.down && !state.left && !state.right);
        assert_eq!(state.buttons, 0);
    }

    #[test]
    fn field_offsets() {
        let report = RawReport::new([0x00, 0xFF, 0x7F, 0x7F, 0x82, 0, 0, 0]);
        let state = report.decode();
        assert!(state.left);
        assert!(state.down);
        assert!(state.pressed(Button::A));
        assert!(state.pressed(Button::Start));
        assert!(!state.pressed(Button::X));
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(RawReport::from_bytes(&[0x7F; 7]).is_none());
        assert!(RawReport::from_bytes(&[]).is_none());
        let long = [1u8, 2, 3, 4, 5, 6, 7, 8, 9];
        assert_eq!(
            RawReport::from_bytes(&long).map(|r| *r.as_bytes()),
            Some([1, 2, 3, 4, 5, 6, 7, 8])
        );
    }

    #[test]
    fn button_masks_follow_bit_order() {
        let masks: Vec<u8> = Button::ALL.iter().map(|b| b.mask()).collect();
        assert_eq!(masks, vec![0x01, 0x02, 0x04, 0x08, 0x10, 0x20, 0x40, 0x80]);
    }

    #[test]
    fn diff_lists_changed_bytes() {
        let pressed = RawReport::new([0x7F, 0x00, 0x7F, 0x7F, 0x04, 0, 0, 0]);
        let changes = pressed.diff(&RawReport::BASELINE);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].byte, 1);
        assert_eq!(changes[1].xor(), 0x04);
        assert_eq!(changes[1].to_string(), "byte[4] 0x00 -> 0x04");
    }

    #[test]
    fn most_common_picks_the_modal_report() {
        let noisy = RawReport::new([0x80, 0x7F, 0x7F, 0x7F, 0, 0, 0, 0]);
        let reports = [
            noisy,
            RawReport::BASELINE,
            RawReport::BASELINE,
            noisy,
            RawReport::BASELINE,
        ];
        assert_eq!(RawReport::most_common(&reports), Some(RawReport::BASELINE));
        assert_eq!(RawReport::most_common(&[]), None);
    }
}
