//! Fixed-capacity table of live sessions.
//!
//! The registry is the only mutable state shared between the USB layer's
//! attach/detach notifications and the input layer's key queries. It is
//! owned by the caller and passed by `&mut` into every entry point.
//!
//! # Invariants
//!
//! - at most one session per device handle
//! - the slot count is fixed at construction
//! - a session leaves its slot only after its in-flight read is cancelled

use tracing::{debug, info, warn};

use crate::config::{ConfigError, DriverConfig};
use crate::controller::compat::CompatTable;
use crate::mapping::{KeyId, KeyMap};
use crate::session::attach::{AttachError, AttachProbe};
use crate::session::device_session::{DeviceSession, SessionSettings};
use crate::session::status::StatusReport;
use crate::terminal::{InputRegistry, SourceId};
use crate::usb::{DeviceHandle, DeviceIds, EndpointDescriptor, UsbHost};

pub const DEFAULT_MAX_SESSIONS: usize = 8;

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    session: Option<DeviceSession>,
}

#[derive(Debug)]
pub struct SessionRegistry {
    slots: Vec<Slot>,
    table: CompatTable,
    keymap: KeyMap,
    settings: SessionSettings,
}

impl SessionRegistry {
    /// `capacity` is clamped to at least one slot.
    pub fn new(
        capacity: usize,
        table: CompatTable,
        keymap: KeyMap,
        settings: SessionSettings,
    ) -> Self {
        let capacity = capacity.max(1);
        debug!("Creating session registry with {} slots", capacity);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        Self {
            slots,
            table,
            keymap,
            settings,
        }
    }

    /// Build a registry from a config, rejecting one that fails
    /// [`DriverConfig::validate`].
    pub fn from_config(config: &DriverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            config.max_sessions,
            CompatTable::with_extra(config.extra_controllers.clone()),
            config.keymap.clone(),
            config.session_settings(),
        ))
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.session.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table(&self) -> &CompatTable {
        &self.table
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    /// Takes effect on the next poll of every session.
    pub fn set_keymap(&mut self, keymap: KeyMap) {
        info!("Key map replaced ({} bindings)", keymap.bindings().len());
        self.keymap = keymap;
    }

    /// Live input sources in slot order.
    pub fn sources(&self) -> Vec<SourceId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.session.is_some())
            .map(|(index, slot)| SourceId::new(index, slot.generation))
            .collect()
    }

    pub fn session(&self, source: SourceId) -> Option<&DeviceSession> {
        self.slots
            .get(source.slot)
            .filter(|slot| slot.generation == source.generation)
            .and_then(|slot| slot.session.as_ref())
    }

    pub fn source_of(&self, device: DeviceHandle) -> Option<SourceId> {
        self.slot_of(device)
            .map(|index| SourceId::new(index, self.slots[index].generation))
    }

    fn slot_of(&self, device: DeviceHandle) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.session
                .as_ref()
                .is_some_and(|session| session.device() == device)
        })
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|slot| slot.session.is_none())
    }

    /// Attach hook of the USB layer. Returns whether the device was claimed.
    pub fn on_attach<H: UsbHost, I: InputRegistry>(
        &mut self,
        host: &mut H,
        inputs: &mut I,
        device: DeviceHandle,
        config: u8,
        interface: u8,
    ) -> bool {
        let Some(ids) = host.device_ids(device) else {
            warn!("{}", AttachError::UnknownDevice(device));
            return false;
        };
        let endpoints = host.interface_endpoints(device, config, interface);
        self.match_and_attach(host, inputs, device, ids, &endpoints)
            .is_ok()
    }

    /// Detach hook of the USB layer.
    pub fn on_detach<H: UsbHost, I: InputRegistry>(
        &mut self,
        host: &mut H,
        inputs: &mut I,
        device: DeviceHandle,
        _config: u8,
        _interface: u8,
    ) {
        self.detach(host, inputs, device);
    }

    /// Claim `device` if it is a supported controller with an interrupt-IN
    /// endpoint and a slot is free. Declines are logged and returned.
    pub fn match_and_attach<H: UsbHost, I: InputRegistry>(
        &mut self,
        host: &mut H,
        inputs: &mut I,
        device: DeviceHandle,
        ids: DeviceIds,
        endpoints: &[EndpointDescriptor],
    ) -> Result<SourceId, AttachError> {
        let result = self.try_attach(host, inputs, device, ids, endpoints);
        match &result {
            Ok(_) => {}
            Err(e @ AttachError::Unsupported(_)) => debug!("Declining {}: {}", device, e),
            Err(e) => warn!("Declining {}: {}", device, e),
        }
        result
    }

    fn try_attach<H: UsbHost, I: InputRegistry>(
        &mut self,
        host: &mut H,
        inputs: &mut I,
        device: DeviceHandle,
        ids: DeviceIds,
        endpoints: &[EndpointDescriptor],
    ) -> Result<SourceId, AttachError> {
        let probe = AttachProbe::start(&self.table, device, ids)?;

        if self.slot_of(device).is_some() {
            return Err(AttachError::AlreadyAttached(device));
        }
        let index = self
            .free_slot()
            .ok_or(AttachError::RegistryFull(self.capacity()))?;

        let session = probe.route(endpoints)?.arm(host, &self.settings)?;

        let slot = &mut self.slots[index];
        slot.generation = slot.generation.wrapping_add(1);
        let source = SourceId::new(index, slot.generation);
        let name = source.input_name();

        info!(
            "SNES controller attached: {} ({}) as {}",
            session.name(),
            ids,
            name
        );
        slot.session = Some(session);
        inputs.register_input(source, &name);
        Ok(source)
    }

    /// Release the session owned by `device`. Unknown devices and repeated
    /// calls are no-ops. Returns whether a session was removed.
    pub fn detach<H: UsbHost, I: InputRegistry>(
        &mut self,
        host: &mut H,
        inputs: &mut I,
        device: DeviceHandle,
    ) -> bool {
        let Some(index) = self.slot_of(device) else {
            debug!("Detach for {} without a session, ignored", device);
            return false;
        };

        let slot = &mut self.slots[index];
        let source = SourceId::new(index, slot.generation);
        let Some(session) = slot.session.take() else {
            return false;
        };

        info!("SNES controller detached: {}", session.name());
        session.close(host);
        inputs.unregister_input(source);
        true
    }

    /// Detach every remaining session, e.g. on driver unload.
    pub fn teardown<H: UsbHost, I: InputRegistry>(&mut self, host: &mut H, inputs: &mut I) {
        let devices: Vec<DeviceHandle> = self
            .slots
            .iter()
            .filter_map(|slot| slot.session.as_ref().map(DeviceSession::device))
            .collect();

        if !devices.is_empty() {
            info!("Tearing down {} session(s)", devices.len());
        }
        for device in devices {
            self.detach(host, inputs, device);
        }
    }

    /// `getkey` for one input source: poll, then pop one key.
    pub fn get_key<H: UsbHost>(&mut self, host: &mut H, source: SourceId) -> Option<KeyId> {
        let Self { slots, keymap, .. } = self;
        let session = live_session(slots, source)?;
        session.poll_and_pop(host, keymap)
    }

    /// `checkkey` for one input source: poll, then report without popping.
    pub fn has_key<H: UsbHost>(&mut self, host: &mut H, source: SourceId) -> bool {
        let Self { slots, keymap, .. } = self;
        live_session(slots, source).is_some_and(|session| session.has_key(host, keymap))
    }

    pub fn status(&self) -> StatusReport {
        let sessions: Vec<_> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.session
                    .as_ref()
                    .map(|session| session.status(SourceId::new(index, slot.generation)))
            })
            .collect();

        if sessions.is_empty() {
            StatusReport::Idle {
                supported: self.table.iter().cloned().collect(),
            }
        } else {
            StatusReport::Connected(sessions)
        }
    }
}

fn live_session(slots: &mut [Slot], source: SourceId) -> Option<&mut DeviceSession> {
    slots
        .get_mut(source.slot)
        .filter(|slot| slot.generation == source.generation)
        .and_then(|slot| slot.session.as_mut())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::report::Button;
    use crate::mapping::Trigger;
    use crate::session::device_session::ReadMode;
    use crate::terminal::InputTable;
    use crate::usb::sim::SimulatedHost;

    const SNES: DeviceIds = DeviceIds::new(0x0810, 0xe501);
    const EP: EndpointDescriptor = EndpointDescriptor::new(0x81, 0x03, 8);

    fn registry(capacity: usize) -> SessionRegistry {
        SessionRegistry::new(
            capacity,
            CompatTable::builtin(),
            KeyMap::default_config(),
            SessionSettings::default(),
        )
    }

    #[test]
    fn unsupported_device_creates_no_session() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(4);
        let ids = DeviceIds::new(0x046d, 0xc52b);
        let dev = host.plug(ids, vec![EP]);

        let result = reg.match_and_attach(&mut host, &mut inputs, dev, ids, &[EP]);
        assert!(matches!(result, Err(AttachError::Unsupported(_))));
        assert_eq!(reg.len(), 0);
        assert!(inputs.is_empty());
        assert_eq!(host.outstanding(), 0);
    }

    #[test]
    fn supported_device_without_interrupt_in_is_declined() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(4);
        let bulk = EndpointDescriptor::new(0x81, 0x02, 64);
        let dev = host.plug(SNES, vec![bulk]);

        assert!(!reg.on_attach(&mut host, &mut inputs, dev, 0, 0));
        assert_eq!(reg.len(), 0);
        assert!(inputs.is_empty());
    }

    #[test]
    fn duplicate_attach_is_rejected() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(4);
        let dev = host.plug(SNES, vec![EP]);

        assert!(reg.on_attach(&mut host, &mut inputs, dev, 0, 0));
        let again = reg.match_and_attach(&mut host, &mut inputs, dev, SNES, &[EP]);
        assert!(matches!(again, Err(AttachError::AlreadyAttached(_))));
        assert_eq!(reg.len(), 1);
        assert_eq!(host.outstanding(), 1);
        reg.teardown(&mut host, &mut inputs);
    }

    #[test]
    fn full_registry_declines() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(2);

        for _ in 0..2 {
            let dev = host.plug(SNES, vec![EP]);
            assert!(reg.on_attach(&mut host, &mut inputs, dev, 0, 0));
        }
        let third = host.plug(SNES, vec![EP]);
        let result = reg.match_and_attach(&mut host, &mut inputs, third, SNES, &[EP]);
        assert!(matches!(result, Err(AttachError::RegistryFull(2))));
        assert_eq!(reg.len(), 2);
        assert_eq!(inputs.len(), 2);
        reg.teardown(&mut host, &mut inputs);
    }

    #[test]
    fn failed_first_read_leaves_slot_free() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(1);
        let dev = host.plug(SNES, vec![EP]);
        host.fail_submits(dev, 1);

        assert!(!reg.on_attach(&mut host, &mut inputs, dev, 0, 0));
        assert!(reg.is_empty());
        assert!(inputs.is_empty());

        // next notification succeeds and reuses the slot
        assert!(reg.on_attach(&mut host, &mut inputs, dev, 0, 0));
        assert_eq!(reg.len(), 1);
        reg.teardown(&mut host, &mut inputs);
    }

    #[test]
    fn detach_cancels_and_is_idempotent() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(4);
        let dev = host.plug(SNES, vec![EP]);
        let source = reg
            .match_and_attach(&mut host, &mut inputs, dev, SNES, &[EP])
            .unwrap();
        assert_eq!(inputs.name(source), Some("usb_snes_gamepad0"));

        assert!(reg.detach(&mut host, &mut inputs, dev));
        assert_eq!(host.outstanding(), 0);
        assert_eq!(host.cancelled().len(), 1);
        assert!(inputs.is_empty());

        assert!(!reg.detach(&mut host, &mut inputs, dev));
        assert!(!reg.detach(&mut host, &mut inputs, DeviceHandle(999)));
        assert_eq!(host.cancelled().len(), 1);
        assert!(reg.is_empty());
    }

    #[test]
    fn stale_source_never_reaches_a_new_session() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(1);

        let first = host.plug(SNES, vec![EP]);
        let old = reg
            .match_and_attach(&mut host, &mut inputs, first, SNES, &[EP])
            .unwrap();
        reg.detach(&mut host, &mut inputs, first);
        host.unplug(first);

        let second = host.plug(SNES, vec![EP]);
        let new = reg
            .match_and_attach(&mut host, &mut inputs, second, SNES, &[EP])
            .unwrap();
        assert_eq!(old.slot, new.slot);
        assert_ne!(old, new);

        host.push_report(second, &[0x7F, 0x7F, 0x7F, 0x7F, 0x02, 0, 0, 0]);
        assert_eq!(reg.get_key(&mut host, old), None);
        assert!(reg.session(old).is_none());
        assert_eq!(reg.get_key(&mut host, new), Some(KeyId::Enter));
        reg.teardown(&mut host, &mut inputs);
    }

    #[test]
    fn sessions_are_independent() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(4);
        let a = host.plug(SNES, vec![EP]);
        let b = host.plug(DeviceIds::new(0x2dc8, 0x9018), vec![EP]);
        assert!(reg.on_attach(&mut host, &mut inputs, a, 0, 0));
        assert!(reg.on_attach(&mut host, &mut inputs, b, 0, 0));
        let src_a = reg.source_of(a).unwrap();
        let src_b = reg.source_of(b).unwrap();

        host.push_report(b, &[0x7F, 0x7F, 0x7F, 0x7F, 0x10, 0, 0, 0]);
        assert_eq!(reg.get_key(&mut host, src_a), None);
        assert!(reg.has_key(&mut host, src_b));
        assert_eq!(reg.get_key(&mut host, src_b), Some(KeyId::PageUp));
        assert_eq!(reg.sources(), vec![src_a, src_b]);

        reg.teardown(&mut host, &mut inputs);
        assert!(reg.is_empty());
        assert!(inputs.is_empty());
        assert_eq!(host.outstanding(), 0);
    }

    #[test]
    fn from_config_rejects_unbounded_blocking_reads() {
        for timeout_ms in [0, 60_000] {
            let config = DriverConfig {
                read_mode: ReadMode::Blocking { timeout_ms },
                ..DriverConfig::default()
            };
            let result = SessionRegistry::from_config(&config);
            assert!(matches!(result, Err(ConfigError::Invalid(_))));
        }

        let config = DriverConfig {
            max_sessions: 3,
            read_mode: ReadMode::Blocking { timeout_ms: 20 },
            ..DriverConfig::default()
        };
        assert_eq!(SessionRegistry::from_config(&config).unwrap().capacity(), 3);
    }

    #[test]
    fn key_map_swap_applies_to_live_sessions() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(2);
        let dev = host.plug(SNES, vec![EP]);
        assert!(reg.on_attach(&mut host, &mut inputs, dev, 0, 0));
        let source = reg.source_of(dev).unwrap();

        let mut keymap = reg.keymap().clone();
        keymap.bind(Trigger::Button(Button::A), KeyId::Char('y'));
        reg.set_keymap(keymap);

        host.push_report(dev, &[0x7F, 0x7F, 0x7F, 0x7F, 0x02, 0, 0, 0]);
        assert_eq!(reg.get_key(&mut host, source), Some(KeyId::Char('y')));

        reg.set_keymap(KeyMap::empty());
        host.push_report(dev, &[0x7F, 0x7F, 0x7F, 0x7F, 0x00, 0, 0, 0]);
        host.push_report(dev, &[0x7F, 0x7F, 0x7F, 0x7F, 0x02, 0, 0, 0]);
        assert_eq!(reg.get_key(&mut host, source), None);
        assert_eq!(reg.get_key(&mut host, source), None);
        assert_eq!(reg.session(source).unwrap().stats().reports, 3);
        reg.teardown(&mut host, &mut inputs);
    }

    #[test]
    fn status_switches_between_idle_and_connected() {
        let mut host = SimulatedHost::new();
        let mut inputs = InputTable::new();
        let mut reg = registry(4);

        match reg.status() {
            StatusReport::Idle { supported } => assert_eq!(supported.len(), reg.table().len()),
            other => panic!("unexpected status {:?}", other),
        }

        let dev = host.plug(SNES, vec![EP]);
        reg.on_attach(&mut host, &mut inputs, dev, 0, 0);
        let status = reg.status();
        assert!(status.is_connected());
        let text = status.to_string();
        assert!(text.contains("SNES controller connected: Generic Chinese SNES"));
        assert!(text.contains("Vendor ID:  0x0810"));
        assert!(text.contains("Product ID: 0xe501"));
        reg.teardown(&mut host, &mut inputs);
    }
}
