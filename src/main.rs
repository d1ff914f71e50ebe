use color_eyre::{eyre::eyre, Result};
use snespad::controller::compat::CompatEntry;
use snespad::controller::mapper::{ReportMapper, BASELINE_SAMPLES, PROMPTS};
use snespad::controller::report::{Direction, RawReport};
use snespad::mapping::Trigger;
use snespad::terminal::{self, InputTable, KeyCodes};
use snespad::usb::sim::SimulatedHost;
use snespad::usb::{find_interrupt_in, DeviceHandle, DeviceIds, EndpointDescriptor, UsbHost};
use snespad::{DriverConfig, KeyId, SessionRegistry};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const POLL_INTERVAL_MS: u64 = 20;
const NO_KEY: i32 = -1;
const IDLE: [u8; 8] = [0x7F, 0x7F, 0x7F, 0x7F, 0x00, 0x00, 0x00, 0x00];

/// Scripted input: press Down, release, press A, release, Start held for
/// three reports.
const SCRIPT: [[u8; 8]; 7] = [
    [0x7F, 0xFF, 0x7F, 0x7F, 0x00, 0x00, 0x00, 0x00],
    [0x7F, 0x7F, 0x7F, 0x7F, 0x00, 0x00, 0x00, 0x00],
    [0x7F, 0x7F, 0x7F, 0x7F, 0x02, 0x00, 0x00, 0x00],
    [0x7F, 0x7F, 0x7F, 0x7F, 0x00, 0x00, 0x00, 0x00],
    [0x7F, 0x7F, 0x7F, 0x7F, 0x80, 0x00, 0x00, 0x00],
    [0x7F, 0x7F, 0x7F, 0x7F, 0x80, 0x00, 0x00, 0x00],
    [0x7F, 0x7F, 0x7F, 0x7F, 0x80, 0x00, 0x00, 0x00],
];

/// Terminal-style key codes: ASCII for characters, private range for the rest.
struct DemoCodes;

impl KeyCodes for DemoCodes {
    fn no_key(&self) -> i32 {
        NO_KEY
    }

    fn code(&self, key: KeyId) -> i32 {
        match key {
            KeyId::Enter => 0x0d,
            KeyId::Escape => 0x1b,
            KeyId::Char(c) => c as i32,
            KeyId::Up => 0x100,
            KeyId::Down => 0x101,
            KeyId::Left => 0x102,
            KeyId::Right => 0x103,
            KeyId::PageUp => 0x104,
            KeyId::PageDown => 0x105,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let mut args = std::env::args().skip(1).peekable();
    let map_mode = args.peek().is_some_and(|arg| arg == "map");
    if map_mode {
        args.next();
    }
    let path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(DriverConfig::default_path);
    let config = DriverConfig::load_or_default(&path)
        .map_err(|e| eyre!("Failed to load config {}: {}", path.display(), e))?;

    if map_mode {
        map_controller(config, &path)
    } else {
        run_driver(config).await
    }
}

/// Idle loop of a menu against a simulated pad.
async fn run_driver(config: DriverConfig) -> Result<()> {
    info!(
        "Starting driver with {} slots, queue capacity {}",
        config.max_sessions, config.queue_capacity
    );

    let mut host = SimulatedHost::new();
    let mut inputs = InputTable::new();
    let mut registry = SessionRegistry::from_config(&config)
        .map_err(|e| eyre!("Invalid config: {}", e))?;

    print!("{}", registry.status());

    let ids = DeviceIds::new(0x0810, 0xe501);
    let device = host.plug(ids, vec![EndpointDescriptor::new(0x81, 0x03, 8)]);
    if !registry.on_attach(&mut host, &mut inputs, device, 0, 0) {
        return Err(eyre!("Simulated controller {} was not claimed", ids));
    }
    let source = registry
        .source_of(device)
        .ok_or_else(|| eyre!("No input source for {}", device))?;

    print!("{}", registry.status());

    let codes = DemoCodes;
    let mut script = SCRIPT.iter();
    let mut interval = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
    let mut idle_ticks = 0;

    // idle loop of a menu: feed one report per tick, ask for a key every tick
    while idle_ticks < 5 {
        interval.tick().await;

        match script.next() {
            Some(bytes) => {
                debug!("Pad sends {}", RawReport::new(*bytes));
                host.push_report(device, bytes);
                idle_ticks = 0;
            }
            None => idle_ticks += 1,
        }

        while terminal::checkkey(&mut registry, &mut host, source) {
            let code = terminal::getkey(&mut registry, &mut host, source, &codes);
            if code == NO_KEY {
                warn!("checkkey reported a key but getkey returned none");
                break;
            }
            println!("key 0x{:03x}", code);
        }
    }

    print!("{}", registry.status());

    registry.detach(&mut host, &mut inputs, device);
    host.unplug(device);
    registry.teardown(&mut host, &mut inputs);
    info!("Driver stopped, {} transfer(s) outstanding", host.outstanding());

    Ok(())
}

/// Report a simulated pad sends while `trigger` is held.
fn pressed(trigger: Trigger) -> [u8; 8] {
    let mut bytes = IDLE;
    match trigger {
        Trigger::Dpad(Direction::Up) => bytes[1] = 0x00,
        Trigger::Dpad(Direction::Down) => bytes[1] = 0xFF,
        Trigger::Dpad(Direction::Left) => bytes[0] = 0x00,
        Trigger::Dpad(Direction::Right) => bytes[0] = 0xFF,
        Trigger::Button(button) => bytes[4] = button.mask(),
    }
    bytes
}

/// Discover the layout of an unknown pad and store it in the config.
fn map_controller(mut config: DriverConfig, path: &Path) -> Result<()> {
    let mut host = SimulatedHost::new();
    let ids = DeviceIds::new(0x1234, 0x5678);
    let device: DeviceHandle = host.plug(ids, vec![EndpointDescriptor::new(0x81, 0x03, 8)]);

    // the scripted user waits for the baseline, then presses each control once
    for _ in 0..BASELINE_SAMPLES {
        host.push_report(device, &IDLE);
    }
    for trigger in PROMPTS {
        host.push_report(device, &pressed(trigger));
        host.push_report(device, &IDLE);
    }

    let endpoint = find_interrupt_in(&host.interface_endpoints(device, 0, 0))
        .ok_or_else(|| eyre!("{} has no interrupt IN endpoint", ids))?;

    info!("Reading baseline (don't press anything)...");
    let map = ReportMapper::new(&mut host, device, endpoint)
        .map_all(|trigger| println!(">>> Press {} <<<", trigger))
        .map_err(|e| eyre!("Mapping failed: {}", e))?;
    print!("{}", map);

    if map.is_standard_layout() {
        info!("{} uses the standard SNES layout", ids);
    } else {
        warn!("{} differs from the standard layout, key map adjusted", ids);
    }

    let entry = CompatEntry {
        vendor_id: ids.vendor_id,
        product_id: ids.product_id,
        name: Cow::Owned("Mapped controller".to_string()),
    };
    map.apply(&mut config, entry)
        .map_err(|e| eyre!("Mapped config is invalid: {}", e))?;
    config
        .save(path)
        .map_err(|e| eyre!("Failed to save config {}: {}", path.display(), e))?;
    info!("Saved config: {}", path.display());
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
