//! Scripted in-memory transfer engine
//!
//! Stands in for a real host controller in the demo binary and in tests.
//! Reports are queued per device and handed out one per completed transfer,
//! so the driver sees exactly the sequence a script pushes.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tracing::{debug, trace};

use super::{DeviceHandle, DeviceIds, EndpointDescriptor, TransferId, TransferStatus, UsbError, UsbHost};

#[derive(Debug)]
struct SimDevice {
    ids: DeviceIds,
    endpoints: Vec<EndpointDescriptor>,
    reports: VecDeque<Vec<u8>>,
    failing_submits: u32,
    failing_polls: VecDeque<UsbError>,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    device: DeviceHandle,
    len: usize,
}

/// Simulated USB host with per-device report scripts.
#[derive(Debug, Default)]
pub struct SimulatedHost {
    devices: HashMap<DeviceHandle, SimDevice>,
    in_flight: HashMap<TransferId, InFlight>,
    cancelled: Vec<TransferId>,
    next_device: u32,
    next_transfer: u32,
    submits: u32,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate a new device and return its handle.
    pub fn plug(&mut self, ids: DeviceIds, endpoints: Vec<EndpointDescriptor>) -> DeviceHandle {
        self.next_device += 1;
        let handle = DeviceHandle(self.next_device);
        debug!("Simulated plug of {} as {}", ids, handle);
        self.devices.insert(
            handle,
            SimDevice {
                ids,
                endpoints,
                reports: VecDeque::new(),
                failing_submits: 0,
                failing_polls: VecDeque::new(),
            },
        );
        handle
    }

    /// Remove a device. Transfers still in flight for it fail with `NoDevice`.
    pub fn unplug(&mut self, device: DeviceHandle) {
        debug!("Simulated unplug of {}", device);
        self.devices.remove(&device);
    }

    /// Queue one report for the next completing transfer on `device`.
    pub fn push_report(&mut self, device: DeviceHandle, bytes: &[u8]) {
        if let Some(dev) = self.devices.get_mut(&device) {
            dev.reports.push_back(bytes.to_vec());
        }
    }

    /// Make the next `count` submissions for `device` fail.
    pub fn fail_submits(&mut self, device: DeviceHandle, count: u32) {
        if let Some(dev) = self.devices.get_mut(&device) {
            dev.failing_submits = count;
        }
    }

    /// Make the next poll of a transfer on `device` complete with `error`.
    pub fn fail_next_poll(&mut self, device: DeviceHandle, error: UsbError) {
        if let Some(dev) = self.devices.get_mut(&device) {
            dev.failing_polls.push_back(error);
        }
    }

    /// Transfers submitted and not yet completed or cancelled.
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    pub fn outstanding_for(&self, device: DeviceHandle) -> usize {
        self.in_flight
            .values()
            .filter(|flight| flight.device == device)
            .count()
    }

    pub fn cancelled(&self) -> &[TransferId] {
        &self.cancelled
    }

    /// Total successful submissions so far.
    pub fn submits(&self) -> u32 {
        self.submits
    }

    pub fn pending_reports(&self, device: DeviceHandle) -> usize {
        self.devices
            .get(&device)
            .map(|dev| dev.reports.len())
            .unwrap_or(0)
    }
}

fn copy_report(report: &[u8], limit: usize, buf: &mut [u8]) -> usize {
    let n = report.len().min(limit).min(buf.len());
    buf[..n].copy_from_slice(&report[..n]);
    n
}

impl UsbHost for SimulatedHost {
    fn device_ids(&self, device: DeviceHandle) -> Option<DeviceIds> {
        self.devices.get(&device).map(|dev| dev.ids)
    }

    fn interface_endpoints(
        &self,
        device: DeviceHandle,
        _config: u8,
        _interface: u8,
    ) -> Vec<EndpointDescriptor> {
        self.devices
            .get(&device)
            .map(|dev| dev.endpoints.clone())
            .unwrap_or_default()
    }

    fn submit_interrupt_read(
        &mut self,
        device: DeviceHandle,
        endpoint: &EndpointDescriptor,
        len: usize,
    ) -> Result<TransferId, UsbError> {
        let dev = self.devices.get_mut(&device).ok_or(UsbError::NoDevice)?;
        if dev.failing_submits > 0 {
            dev.failing_submits -= 1;
            return Err(UsbError::Transfer("simulated submit failure".to_string()));
        }

        self.next_transfer += 1;
        self.submits += 1;
        let id = TransferId(self.next_transfer);
        trace!(
            "Submitted {:?} on {} endpoint 0x{:02x}",
            id,
            device,
            endpoint.address
        );
        self.in_flight.insert(id, InFlight { device, len });
        Ok(id)
    }

    fn poll_transfer(&mut self, transfer: TransferId, buf: &mut [u8]) -> TransferStatus {
        let Some(flight) = self.in_flight.get(&transfer).copied() else {
            return TransferStatus::Failed(UsbError::Transfer(format!(
                "unknown transfer {:?}",
                transfer
            )));
        };

        let Some(dev) = self.devices.get_mut(&flight.device) else {
            self.in_flight.remove(&transfer);
            return TransferStatus::Failed(UsbError::NoDevice);
        };

        if let Some(error) = dev.failing_polls.pop_front() {
            self.in_flight.remove(&transfer);
            return TransferStatus::Failed(error);
        }

        match dev.reports.pop_front() {
            Some(report) => {
                self.in_flight.remove(&transfer);
                TransferStatus::Ready(copy_report(&report, flight.len, buf))
            }
            None => TransferStatus::Pending,
        }
    }

    fn cancel_transfer(&mut self, transfer: TransferId) {
        if self.in_flight.remove(&transfer).is_some() {
            trace!("Cancelled {:?}", transfer);
            self.cancelled.push(transfer);
        }
    }

    fn read_timeout(
        &mut self,
        device: DeviceHandle,
        _endpoint: &EndpointDescriptor,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbError> {
        let dev = self.devices.get_mut(&device).ok_or(UsbError::NoDevice)?;
        if let Some(error) = dev.failing_polls.pop_front() {
            return Err(error);
        }
        match dev.reports.pop_front() {
            Some(report) => Ok(copy_report(&report, buf.len(), buf)),
            None => Err(UsbError::Timeout),
        }
    }
}
