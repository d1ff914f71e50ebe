//! Button discovery for pads that are not in the built-in table.
//!
//! Samples the idle report, waits for each control to be pressed once and
//! compares the pressed report against the idle one. The outcome becomes an
//! `extra_controllers` entry, plus key map corrections for pads whose
//! buttons sit on other bits than the usual layout.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, DriverConfig};
use crate::controller::compat::{CompatEntry, CompatTable};
use crate::controller::edge_detector::rising_triggers;
use crate::controller::report::{Button, ByteChange, Direction, RawReport, REPORT_SIZE};
use crate::mapping::{KeyMap, Trigger};
use crate::usb::{DeviceHandle, EndpointDescriptor, UsbError, UsbHost};

/// Reports sampled to find the idle state.
pub const BASELINE_SAMPLES: usize = 20;
pub const READ_TIMEOUT_MS: u64 = 50;
/// Reads spent waiting for one press, roughly 30 s at the read timeout.
pub const DEFAULT_MAX_READS: usize = 600;

/// Controls asked for, in prompt order.
pub const PROMPTS: [Trigger; 12] = [
    Trigger::Dpad(Direction::Up),
    Trigger::Dpad(Direction::Down),
    Trigger::Dpad(Direction::Left),
    Trigger::Dpad(Direction::Right),
    Trigger::Button(Button::A),
    Trigger::Button(Button::B),
    Trigger::Button(Button::X),
    Trigger::Button(Button::Y),
    Trigger::Button(Button::Start),
    Trigger::Button(Button::Select),
    Trigger::Button(Button::L),
    Trigger::Button(Button::R),
];

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("No report received from {0} while sampling the idle state")]
    NoBaseline(DeviceHandle),

    #[error("Read failed: {0}")]
    Usb(#[from] UsbError),
}

/// One observed press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub report: RawReport,
    pub changes: Vec<ByteChange>,
    /// The single control the report decodes to in the usual layout, if any.
    pub decoded: Option<Trigger>,
}

impl Detection {
    fn new(baseline: &RawReport, report: RawReport) -> Self {
        let mut rising = rising_triggers(&baseline.decode(), &report.decode());
        let decoded = match (rising.next(), rising.next()) {
            (Some(trigger), None) => Some(trigger),
            _ => None,
        };
        Self {
            report,
            changes: report.diff(baseline),
            decoded,
        }
    }
}

pub struct ReportMapper<'h, H: UsbHost> {
    host: &'h mut H,
    device: DeviceHandle,
    endpoint: EndpointDescriptor,
    max_reads: usize,
}

impl<'h, H: UsbHost> ReportMapper<'h, H> {
    pub fn new(host: &'h mut H, device: DeviceHandle, endpoint: EndpointDescriptor) -> Self {
        Self {
            host,
            device,
            endpoint,
            max_reads: DEFAULT_MAX_READS,
        }
    }

    pub fn with_max_reads(mut self, max_reads: usize) -> Self {
        self.max_reads = max_reads.max(1);
        self
    }

    /// One bounded read. Timeouts and short reads yield `None`.
    fn read(&mut self) -> Result<Option<RawReport>, MapperError> {
        let mut buf = [0u8; REPORT_SIZE];
        match self.host.read_timeout(
            self.device,
            &self.endpoint,
            &mut buf,
            Duration::from_millis(READ_TIMEOUT_MS),
        ) {
            Ok(len) => Ok(RawReport::from_bytes(&buf[..len.min(REPORT_SIZE)])),
            Err(UsbError::Timeout) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The most frequent of `samples` reads.
    pub fn capture_baseline(&mut self, samples: usize) -> Result<RawReport, MapperError> {
        let mut reports = Vec::with_capacity(samples);
        for _ in 0..samples {
            if let Some(report) = self.read()? {
                reports.push(report);
            }
        }

        let baseline =
            RawReport::most_common(&reports).ok_or(MapperError::NoBaseline(self.device))?;
        info!("Baseline: {}", baseline);
        Ok(baseline)
    }

    /// Wait for the first report that differs from `baseline`, then for the
    /// pad to return to it. `None` when nothing was pressed in time.
    pub fn wait_for_press(
        &mut self,
        baseline: &RawReport,
    ) -> Result<Option<Detection>, MapperError> {
        let mut pressed = None;
        for _ in 0..self.max_reads {
            match self.read()? {
                Some(report) if report != *baseline => {
                    pressed = Some(report);
                    break;
                }
                _ => {}
            }
        }
        let Some(report) = pressed else {
            return Ok(None);
        };

        let detection = Detection::new(baseline, report);
        for change in &detection.changes {
            debug!("Detected: {}", change);
        }

        let mut released = false;
        for _ in 0..self.max_reads {
            if self.read()? == Some(*baseline) {
                released = true;
                break;
            }
        }
        if !released {
            warn!("Pad did not return to its idle report");
        }

        Ok(Some(detection))
    }

    /// Sample the baseline and ask for every control in [`PROMPTS`].
    /// `prompt` is called before each wait.
    pub fn map_all<F: FnMut(Trigger)>(mut self, mut prompt: F) -> Result<ControllerMap, MapperError> {
        let baseline = self.capture_baseline(BASELINE_SAMPLES)?;
        let mut map = ControllerMap {
            baseline,
            detections: Vec::new(),
            skipped: Vec::new(),
        };

        for trigger in PROMPTS {
            prompt(trigger);
            match self.wait_for_press(&baseline)? {
                Some(detection) => map.detections.push((trigger, detection)),
                None => {
                    warn!("Timeout - skipping {}", trigger);
                    map.skipped.push(trigger);
                }
            }
        }
        Ok(map)
    }
}

/// Result of a full mapping run.
#[derive(Debug, Clone)]
pub struct ControllerMap {
    pub baseline: RawReport,
    pub detections: Vec<(Trigger, Detection)>,
    pub skipped: Vec<Trigger>,
}

impl ControllerMap {
    /// Every control was seen and decodes to itself.
    pub fn is_standard_layout(&self) -> bool {
        self.skipped.is_empty()
            && self
                .detections
                .iter()
                .all(|(asked, detection)| detection.decoded == Some(*asked))
    }

    /// Move each key of `keymap` onto the control that actually produced
    /// the press. Presses that decode to nothing leave the map alone.
    pub fn remap(&self, keymap: &KeyMap) -> KeyMap {
        let mut remapped = keymap.clone();
        for (asked, detection) in &self.detections {
            let Some(actual) = detection.decoded else {
                warn!("{} does not decode to a known control, left unmapped", asked);
                continue;
            };
            if actual == *asked {
                continue;
            }
            match keymap.lookup(*asked) {
                Some(key) => remapped.bind(actual, key),
                None => {
                    remapped.unbind(actual);
                }
            }
        }
        remapped
    }

    /// Register `entry` as an extra controller and apply [`remap`](Self::remap).
    pub fn apply(&self, config: &mut DriverConfig, entry: CompatEntry) -> Result<(), ConfigError> {
        let known = CompatTable::with_extra(config.extra_controllers.clone())
            .lookup(entry.ids())
            .is_some();
        if known {
            info!("{} is already supported", entry);
        } else {
            info!("Adding {} to extra controllers", entry);
            config.extra_controllers.push(entry);
        }
        config.keymap = self.remap(&config.keymap);
        config.validate()
    }
}

impl fmt::Display for ControllerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Baseline (neutral): {}", self.baseline)?;
        for (asked, detection) in &self.detections {
            let changes: Vec<String> = detection.changes.iter().map(|c| c.to_string()).collect();
            write!(f, "  {}: {}", asked, changes.join(", "))?;
            match detection.decoded {
                Some(actual) if actual == *asked => writeln!(f)?,
                Some(actual) => writeln!(f, " (reads as {})", actual)?,
                None => writeln!(f, " (unknown)")?,
            }
        }
        for trigger in &self.skipped {
            writeln!(f, "  {}: skipped", trigger)?;
        }
        Ok(())
    }
}
