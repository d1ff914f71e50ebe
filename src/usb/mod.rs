//! USB host boundary
//!
//! The driver never talks to a bus directly. Enumeration, descriptor storage
//! and the transfer engine belong to the host runtime, which exposes them
//! through the [`UsbHost`] trait. Everything here is plain data plus that one
//! seam.
//!
//! ```text
//! UsbHost ──attach/detach──► SessionRegistry ──poll──► DeviceSession
//!    ▲                                                     │
//!    └───────────── submit / poll / cancel transfer ───────┘
//! ```

pub mod sim;

use std::fmt;
use std::time::Duration;

/// Opaque, non-owning reference to a device known to the USB layer.
///
/// The handle stays valid until the USB layer sends the matching detach
/// notification; a session never outlives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceHandle(pub u32);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "usb#{}", self.0)
    }
}

/// Vendor and product id pair from the device descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIds {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIds {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VID={:04x} PID={:04x}", self.vendor_id, self.product_id)
    }
}

/// Transfer type encoded in bits 0..1 of `bmAttributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointType {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

impl EndpointType {
    pub fn from_attributes(attributes: u8) -> Self {
        match attributes & 0x03 {
            0 => EndpointType::Control,
            1 => EndpointType::Isochronous,
            2 => EndpointType::Bulk,
            _ => EndpointType::Interrupt,
        }
    }
}

/// Endpoint descriptor as handed over by the USB layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`; bit 7 set means IN.
    pub address: u8,
    /// `bmAttributes`
    pub attributes: u8,
    pub max_packet: u16,
}

impl EndpointDescriptor {
    pub const fn new(address: u8, attributes: u8, max_packet: u16) -> Self {
        Self {
            address,
            attributes,
            max_packet,
        }
    }

    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }

    pub fn transfer_type(&self) -> EndpointType {
        EndpointType::from_attributes(self.attributes)
    }

    pub fn is_interrupt_in(&self) -> bool {
        self.is_in() && self.transfer_type() == EndpointType::Interrupt
    }

    pub fn number(&self) -> u8 {
        self.address & 0x0F
    }
}

/// First interrupt-IN endpoint in descriptor order, if any.
pub fn find_interrupt_in(endpoints: &[EndpointDescriptor]) -> Option<EndpointDescriptor> {
    endpoints.iter().copied().find(EndpointDescriptor::is_interrupt_in)
}

/// Handle of a submitted background read. Owned by whoever submitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(pub u32);

/// Result of a non-blocking completion check.
///
/// `Ready` and `Failed` retire the transfer: the engine forgets the id and
/// the owner must not cancel or poll it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Pending,
    /// Completed; this many bytes were copied into the caller's buffer.
    Ready(usize),
    Failed(UsbError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsbError {
    #[error("endpoint stalled")]
    Stall,

    #[error("transfer timed out")]
    Timeout,

    #[error("device is gone")]
    NoDevice,

    #[error("babble detected")]
    Babble,

    #[error("transfer failed: {0}")]
    Transfer(String),
}

/// Services the driver consumes from the host's USB subsystem.
///
/// Every method must return promptly. `read_timeout` is the only call allowed
/// to wait, and never longer than the timeout it is given.
pub trait UsbHost {
    /// Vendor/product ids of an enumerated device.
    fn device_ids(&self, device: DeviceHandle) -> Option<DeviceIds>;

    /// Endpoint descriptors of one interface of one configuration.
    fn interface_endpoints(
        &self,
        device: DeviceHandle,
        config: u8,
        interface: u8,
    ) -> Vec<EndpointDescriptor>;

    /// Queue a background interrupt read of up to `len` bytes.
    fn submit_interrupt_read(
        &mut self,
        device: DeviceHandle,
        endpoint: &EndpointDescriptor,
        len: usize,
    ) -> Result<TransferId, UsbError>;

    /// Check a submitted read. On `Ready(n)` the first `n` bytes of `buf`
    /// hold the data; on any other status `buf` is left untouched.
    fn poll_transfer(&mut self, transfer: TransferId, buf: &mut [u8]) -> TransferStatus;

    /// Abort a submitted read. Once this returns the engine no longer
    /// references any buffer belonging to the transfer.
    fn cancel_transfer(&mut self, transfer: TransferId);

    /// Synchronous read bounded by `timeout`.
    fn read_timeout(
        &mut self,
        device: DeviceHandle,
        endpoint: &EndpointDescriptor,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_in_detection() {
        let bulk_in = EndpointDescriptor::new(0x81, 0x02, 64);
        let int_out = EndpointDescriptor::new(0x02, 0x03, 8);
        let int_in = EndpointDescriptor::new(0x83, 0x03, 8);

        assert!(!bulk_in.is_interrupt_in());
        assert!(!int_out.is_interrupt_in());
        assert!(int_in.is_interrupt_in());
        assert_eq!(int_in.number(), 3);
    }

    #[test]
    fn first_interrupt_in_wins() {
        let endpoints = [
            EndpointDescriptor::new(0x01, 0x03, 8),
            EndpointDescriptor::new(0x81, 0x03, 8),
            EndpointDescriptor::new(0x82, 0x03, 16),
        ];
        assert_eq!(find_interrupt_in(&endpoints), Some(endpoints[1]));
        assert_eq!(find_interrupt_in(&endpoints[..1]), None);
        assert_eq!(find_interrupt_in(&[]), None);
    }

    #[test]
    fn attribute_decoding_ignores_upper_bits() {
        assert_eq!(EndpointType::from_attributes(0x0F), EndpointType::Interrupt);
        assert_eq!(EndpointType::from_attributes(0x0D), EndpointType::Isochronous);
        assert_eq!(EndpointType::from_attributes(0x00), EndpointType::Control);
    }
}
