//! One attached, recognised controller and its poll/refill cycle.
//!
//! In background mode a session keeps exactly one interrupt read in flight.
//! Every poll checks it without blocking:
//!
//! ```text
//!            ┌──────────── Pending ───────────┐
//!            ▼                                │
//!   [transfer in flight] ── poll_transfer ────┤
//!            ▲                                │ Ready / Failed
//!            │ resubmit ok                    ▼
//!            └──────────────────────── decode, edges, snapshot
//!                                             │ resubmit failed
//!                                             ▼
//!                                       [degraded] ── next poll re-arms
//! ```
//!
//! The scratch buffer is only written by the engine inside `poll_transfer`
//! on completion, so a pending read never exposes partial bytes.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::config::MAX_BLOCKING_TIMEOUT_MS;
use crate::controller::edge_detector;
use crate::controller::report::{RawReport, REPORT_SIZE};
use crate::mapping::{KeyId, KeyMap};
use crate::session::event_queue::{EventQueue, OverflowPolicy, DEFAULT_QUEUE_CAPACITY};
use crate::session::status::{SessionStats, SessionStatus};
use crate::terminal::SourceId;
use crate::usb::{DeviceHandle, DeviceIds, EndpointDescriptor, TransferId, TransferStatus, UsbError, UsbHost};

/// How reports are fetched from the pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// One interrupt read always in flight, checked without blocking.
    #[default]
    Background,
    /// A short synchronous read on each poll that finds the queue empty.
    Blocking { timeout_ms: u64 },
}

impl ReadMode {
    /// Blocking timeouts pulled into `1..=MAX_BLOCKING_TIMEOUT_MS`, so a
    /// zero never turns into "wait forever" in the host engine.
    pub fn bounded(self) -> Self {
        match self {
            ReadMode::Blocking { timeout_ms } => ReadMode::Blocking {
                timeout_ms: timeout_ms.clamp(1, MAX_BLOCKING_TIMEOUT_MS),
            },
            background => background,
        }
    }
}

/// Per-session settings shared by every slot of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    pub read_mode: ReadMode,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::OverwriteOldest,
            read_mode: ReadMode::Background,
        }
    }
}

/// What one poll cycle observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Read still in flight, or nothing arrived within the timeout.
    Pending,
    /// A full report was decoded and produced this many keys.
    Report { keys: usize },
    /// Completed with fewer than 8 bytes; previous state kept.
    ShortRead(usize),
    /// The read completed with an error; no new keys.
    Failed(UsbError),
    /// Blocking mode with keys still queued; no read issued.
    Skipped,
    /// No read in flight and re-arming failed again.
    Degraded,
    /// No read was in flight; a new one has just been submitted.
    Rearmed,
}

#[derive(Debug)]
pub struct DeviceSession {
    device: DeviceHandle,
    ids: DeviceIds,
    name: Cow<'static, str>,
    endpoint: EndpointDescriptor,
    transfer: Option<TransferId>,
    previous: RawReport,
    current: [u8; REPORT_SIZE],
    queue: EventQueue,
    read_mode: ReadMode,
    attached_at: DateTime<Local>,
    stats: SessionStats,
}

impl DeviceSession {
    /// Build a session with an idle baseline and, in background mode,
    /// submit its first read. A failed submission yields no session.
    pub fn open<H: UsbHost>(
        host: &mut H,
        device: DeviceHandle,
        ids: DeviceIds,
        name: Cow<'static, str>,
        endpoint: EndpointDescriptor,
        settings: &SessionSettings,
    ) -> Result<Self, UsbError> {
        debug!(
            "Opening session for {} on endpoint 0x{:02x} (max packet {})",
            device, endpoint.address, endpoint.max_packet
        );

        let mut session = Self {
            device,
            ids,
            name,
            endpoint,
            transfer: None,
            previous: RawReport::BASELINE,
            current: *RawReport::BASELINE.as_bytes(),
            queue: EventQueue::new(settings.queue_capacity, settings.overflow),
            read_mode: settings.read_mode.bounded(),
            attached_at: Local::now(),
            stats: SessionStats::default(),
        };

        if session.read_mode == ReadMode::Background {
            session.arm(host)?;
        }
        Ok(session)
    }

    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn ids(&self) -> DeviceIds {
        self.ids
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &EndpointDescriptor {
        &self.endpoint
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn previous_report(&self) -> &RawReport {
        &self.previous
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// True while a background read is in flight.
    pub fn is_armed(&self) -> bool {
        self.transfer.is_some()
    }

    /// Background session that lost its read and has not re-armed yet.
    pub fn is_degraded(&self) -> bool {
        self.read_mode == ReadMode::Background && self.transfer.is_none()
    }

    /// Run one poll cycle, then hand out the oldest pending key.
    pub fn poll_and_pop<H: UsbHost>(&mut self, host: &mut H, keymap: &KeyMap) -> Option<KeyId> {
        self.poll(host, keymap);
        let key = self.queue.pop();
        if let Some(key) = key {
            trace!("{} -> {}", self.name, key);
        }
        key
    }

    /// Run one poll cycle and report whether a key is waiting, without
    /// consuming it.
    pub fn has_key<H: UsbHost>(&mut self, host: &mut H, keymap: &KeyMap) -> bool {
        if !self.queue.is_empty() {
            return true;
        }
        self.poll(host, keymap);
        !self.queue.is_empty()
    }

    /// One poll cycle: check for a finished read, fold it into the queue and
    /// keep a read in flight.
    pub fn poll<H: UsbHost>(&mut self, host: &mut H, keymap: &KeyMap) -> PollOutcome {
        match self.read_mode {
            ReadMode::Background => self.poll_background(host, keymap),
            ReadMode::Blocking { timeout_ms } => {
                self.poll_blocking(host, keymap, Duration::from_millis(timeout_ms))
            }
        }
    }

    fn poll_background<H: UsbHost>(&mut self, host: &mut H, keymap: &KeyMap) -> PollOutcome {
        let Some(transfer) = self.transfer else {
            return match self.arm(host) {
                Ok(()) => {
                    info!("{} recovered, read re-armed", self.name);
                    PollOutcome::Rearmed
                }
                Err(e) => {
                    debug!("{} still degraded: {}", self.name, e);
                    self.stats.resubmit_failures += 1;
                    PollOutcome::Degraded
                }
            };
        };

        let outcome = match host.poll_transfer(transfer, &mut self.current) {
            TransferStatus::Pending => return PollOutcome::Pending,
            TransferStatus::Ready(len) => {
                self.transfer = None;
                self.absorb(len, keymap)
            }
            TransferStatus::Failed(e) => {
                self.transfer = None;
                self.stats.transfer_errors += 1;
                warn!("Read on {} failed: {}", self.name, e);
                PollOutcome::Failed(e)
            }
        };

        if let Err(e) = self.arm(host) {
            error!(
                "Failed to resubmit read for {}: {} (session degraded)",
                self.name, e
            );
            self.stats.resubmit_failures += 1;
        }

        outcome
    }

    fn poll_blocking<H: UsbHost>(
        &mut self,
        host: &mut H,
        keymap: &KeyMap,
        timeout: Duration,
    ) -> PollOutcome {
        if !self.queue.is_empty() {
            return PollOutcome::Skipped;
        }

        match host.read_timeout(self.device, &self.endpoint, &mut self.current, timeout) {
            Ok(len) => self.absorb(len, keymap),
            Err(UsbError::Timeout) => PollOutcome::Pending,
            Err(e) => {
                self.stats.transfer_errors += 1;
                debug!("Blocking read on {} failed: {}", self.name, e);
                PollOutcome::Failed(e)
            }
        }
    }

    /// Fold a completed read of `len` bytes into the queue. Anything past
    /// the eighth byte is not part of the report.
    fn absorb(&mut self, len: usize, keymap: &KeyMap) -> PollOutcome {
        let len = len.min(REPORT_SIZE);
        let Some(report) = RawReport::from_bytes(&self.current[..len]) else {
            self.stats.short_reads += 1;
            debug!("Short report ({} bytes) from {}, ignored", len, self.name);
            return PollOutcome::ShortRead(len);
        };

        self.stats.reports += 1;
        let edges = edge_detector::detect(&self.previous, &report, keymap);
        for &key in &edges {
            if self.queue.push(key).lost_key() {
                self.stats.keys_lost += 1;
                warn!("Key queue of {} full, lost a key", self.name);
            }
        }
        if !edges.is_empty() {
            debug!("{}: report {} -> {:?}", self.name, report, edges.as_slice());
        }

        self.previous = report;
        PollOutcome::Report { keys: edges.len() }
    }

    fn arm<H: UsbHost>(&mut self, host: &mut H) -> Result<(), UsbError> {
        let transfer = host.submit_interrupt_read(self.device, &self.endpoint, REPORT_SIZE)?;
        self.transfer = Some(transfer);
        Ok(())
    }

    /// Cancel the in-flight read, then release the session.
    pub fn close<H: UsbHost>(mut self, host: &mut H) {
        self.cancel(host);
    }

    fn cancel<H: UsbHost>(&mut self, host: &mut H) {
        if let Some(transfer) = self.transfer.take() {
            debug!("Cancelling {:?} for {}", transfer, self.name);
            host.cancel_transfer(transfer);
        }
    }

    pub fn status(&self, source: SourceId) -> SessionStatus {
        SessionStatus {
            source,
            name: self.name.to_string(),
            ids: self.ids,
            device: self.device,
            attached_at: self.attached_at,
            queued: self.queue.len(),
            armed: self.is_armed(),
            stats: self.stats,
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        if let Some(transfer) = self.transfer {
            error!(
                "Session {} dropped with {:?} still in flight",
                self.name, transfer
            );
        }
    }
}
