//! Controller-side decoding for SNES USB pads
//!
//! Implements the stateless half of the driver:
//!
//! 1. [`report`] - 8-byte report codec and dead-zone classification
//! 2. [`edge_detector`] - rising edges between two reports, mapped to keys
//! 3. [`compat`] - which vendor/product pairs speak this report format
//! 4. [`mapper`] - discover how an unknown pad lays out its report
//!
//! # Architecture
//!
//! ```text
//! [u8; 8] ──► RawReport ──► DecodedState ──► EdgeDetector ──► KeyId*
//!                              (prev, cur)     (KeyMap)
//! ```

pub mod compat;
pub mod edge_detector;
pub mod mapper;
pub mod report;

pub use compat::{CompatEntry, CompatTable, BUILTIN_CONTROLLERS};
pub use edge_detector::{detect, rising_triggers, Edges, MAX_EDGES};
pub use mapper::{ControllerMap, Detection, MapperError, ReportMapper};
pub use report::{
    classify, AxisZone, Button, ByteChange, DecodedState, Direction, RawReport, REPORT_SIZE,
};
