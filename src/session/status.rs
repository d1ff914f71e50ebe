//! Read-only status snapshot for an operator command.

use chrono::{DateTime, Local};
use std::fmt;

use crate::controller::compat::CompatEntry;
use crate::terminal::SourceId;
use crate::usb::{DeviceHandle, DeviceIds};

/// Running counters of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Full reports decoded
    pub reports: u64,
    pub short_reads: u64,
    pub transfer_errors: u64,
    pub resubmit_failures: u64,
    /// Keys evicted or dropped by a full queue
    pub keys_lost: u64,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub source: SourceId,
    pub name: String,
    pub ids: DeviceIds,
    pub device: DeviceHandle,
    pub attached_at: DateTime<Local>,
    pub queued: usize,
    pub armed: bool,
    pub stats: SessionStats,
}

#[derive(Debug, Clone)]
pub enum StatusReport {
    Connected(Vec<SessionStatus>),
    /// Nothing attached; lists what would be accepted.
    Idle { supported: Vec<CompatEntry> },
}

impl StatusReport {
    pub fn is_connected(&self) -> bool {
        matches!(self, StatusReport::Connected(_))
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Connected(sessions) => {
                for session in sessions {
                    writeln!(f, "SNES controller connected: {}", session.name)?;
                    writeln!(f, "  Vendor ID:  0x{:04x}", session.ids.vendor_id)?;
                    writeln!(f, "  Product ID: 0x{:04x}", session.ids.product_id)?;
                    writeln!(f, "  Input:      {}", session.source.input_name())?;
                    writeln!(
                        f,
                        "  Since:      {}",
                        session.attached_at.format("%H:%M:%S")
                    )?;
                    writeln!(
                        f,
                        "  Reports:    {} ({} short, {} errors, {} keys lost){}",
                        session.stats.reports,
                        session.stats.short_reads,
                        session.stats.transfer_errors,
                        session.stats.keys_lost,
                        if session.armed { "" } else { " [no read pending]" }
                    )?;
                }
                Ok(())
            }
            StatusReport::Idle { supported } => {
                writeln!(f, "No SNES controller connected")?;
                writeln!(f)?;
                writeln!(f, "Supported controllers:")?;
                for entry in supported {
                    writeln!(f, "  {}", entry)?;
                }
                Ok(())
            }
        }
    }
}
