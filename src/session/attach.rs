//! Attach pipeline for a freshly enumerated device.
//!
//! A probe walks through typed states so a session can only be built from a
//! device that matched the table and exposed an interrupt-IN endpoint:
//!
//! ```text
//! AttachProbe<Matched> ──route──► AttachProbe<Routed> ──arm──► DeviceSession
//! ```

use statum::{machine, state};
use tracing::debug;

use crate::controller::compat::{CompatEntry, CompatTable};
use crate::session::device_session::{DeviceSession, SessionSettings};
use crate::usb::{find_interrupt_in, DeviceHandle, DeviceIds, EndpointDescriptor, UsbError, UsbHost};

/// Reasons an attach notification is declined. None of them are fatal;
/// the device is simply not ours.
#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("{0} is not a supported controller")]
    Unsupported(DeviceIds),

    #[error("{0} already has a session")]
    AlreadyAttached(DeviceHandle),

    #[error("all {0} controller slots are in use")]
    RegistryFull(usize),

    #[error("{0} has no interrupt IN endpoint")]
    NoInterruptEndpoint(String),

    #[error("{0} is not known to the USB layer")]
    UnknownDevice(DeviceHandle),

    #[error("initial read could not be submitted: {0}")]
    SubmitFailed(#[source] UsbError),
}

#[state]
#[derive(Debug, Clone)]
pub enum ProbeState {
    Matched,
    Routed(EndpointDescriptor),
}

#[machine]
#[derive(Debug)]
pub struct AttachProbe<S: ProbeState> {
    device: DeviceHandle,
    ids: DeviceIds,
    controller: CompatEntry,
}

impl<S: ProbeState> AttachProbe<S> {
    pub fn controller(&self) -> &CompatEntry {
        &self.controller
    }
}

impl AttachProbe<Matched> {
    /// Look the device up in the compatibility table.
    pub fn start(
        table: &CompatTable,
        device: DeviceHandle,
        ids: DeviceIds,
    ) -> Result<Self, AttachError> {
        let entry = table.lookup(ids).ok_or(AttachError::Unsupported(ids))?;
        debug!("Found controller: {} ({}) on {}", entry.name, ids, device);
        Ok(Self::new(device, ids, entry.clone()))
    }

    /// Pick the first interrupt-IN endpoint of the interface.
    pub fn route(
        self,
        endpoints: &[EndpointDescriptor],
    ) -> Result<AttachProbe<Routed>, AttachError> {
        match find_interrupt_in(endpoints) {
            Some(endpoint) => {
                debug!(
                    "Using endpoint 0x{:02x} of {}",
                    endpoint.address, self.controller.name
                );
                Ok(self.transition_with(endpoint))
            }
            None => {
                debug!("No interrupt endpoint found on {}", self.controller.name);
                Err(AttachError::NoInterruptEndpoint(
                    self.controller.name.to_string(),
                ))
            }
        }
    }
}

impl AttachProbe<Routed> {
    pub fn endpoint(&self) -> Option<EndpointDescriptor> {
        self.get_state_data().copied()
    }

    /// Build the session and submit its first read.
    pub fn arm<H: UsbHost>(
        self,
        host: &mut H,
        settings: &SessionSettings,
    ) -> Result<DeviceSession, AttachError> {
        let endpoint = self
            .endpoint()
            .ok_or_else(|| AttachError::NoInterruptEndpoint(self.controller.name.to_string()))?;

        DeviceSession::open(
            host,
            self.device,
            self.ids,
            self.controller.name.clone(),
            endpoint,
            settings,
        )
        .map_err(AttachError::SubmitFailed)
    }
}
