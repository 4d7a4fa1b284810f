//! BLE gateway firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                       │
//! │                                                                  │
//! │  UART (nRF)   HttpClient   MqttRelay    NvsAdapter   SystemClock │
//! │  ServiceAdapter   TaskWatchdog   EspSystem   LogIndicator        │
//! │                                                                  │
//! │  ──────────────── Port Trait Boundary ───────────────────        │
//! │                                                                  │
//! │  uart_rx task ──▶ AdvIngest ──▶ AdvTable ◀── adv_post task       │
//! │                                     ▲        (RelayTask)         │
//! │                       HistoryQuery ─┘                            │
//! │  main task: Supervisor (heap, fw checks, cfg mode, services)     │
//! │  IP events ──▶ LinkMonitor ──▶ NetworkStatus + Supervisor        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};

use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use blegw::adapters::device_id;
use blegw::adapters::http::{EspPoster, HttpClient};
use blegw::adapters::indicator::LogIndicator;
use blegw::adapters::mqtt::{EspMqttPublisher, MqttRelay, MqttSlot};
use blegw::adapters::network::{self, LinkMonitor};
use blegw::adapters::nvs::NvsAdapter;
use blegw::adapters::services::ServiceAdapter;
use blegw::adapters::system::{self, EspSystem};
use blegw::adapters::time::SystemClock;
use blegw::adv::GatewayAdvTable;
use blegw::app::ports::{ConfigError, ConfigPort, GatewayServices};
use blegw::config::{GatewayConfig, ShortString, bounded};
use blegw::drivers::watchdog::{self, TaskWatchdog};
use blegw::ingest::AdvIngest;
use blegw::metrics::GatewayMetrics;
use blegw::net_status::NetworkStatus;
use blegw::os::task::{self, Core, TaskSpec};
use blegw::relay::{RelayIdentity, RelayPorts, RelayTask};
use blegw::serial::uart::{self, SerialReader};
use blegw::supervisor::{Supervisor, SupervisorPorts};

const NRF_UART_BAUD: u32 = 115_200;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const UART_RX_TASK: TaskSpec = TaskSpec {
    name: "uart_rx\0",
    core: Core::Pro,
    priority: 10,
    stack_kb: 4,
};

const ADV_POST_TASK: TaskSpec = TaskSpec {
    name: "adv_post\0",
    core: Core::App,
    priority: 5,
    stack_kb: 12,
};

fn load_config(nvs: &NvsAdapter) -> GatewayConfig {
    match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(ConfigError::NotFound) => {
            info!("No stored config, using defaults");
            GatewayConfig::default()
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            GatewayConfig::default()
        }
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  BLE Gateway v{}                  ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    system::log_reset_reason();
    watchdog::configure();

    // ── 2. Config from NVS (or defaults) ──────────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let config = load_config(&nvs);

    // ── 3. Identity and shared state ──────────────────────────
    let gw_mac = device_id::read_mac();
    info!("Gateway MAC: {} (AP: {})", gw_mac, device_id::ap_ssid(&gw_mac));

    // Built on this stack, then moved; sdkconfig.defaults sizes the main task for it.
    let table = Arc::new(GatewayAdvTable::new());
    let net = Arc::new(NetworkStatus::new());
    let metrics = Arc::new(GatewayMetrics::new());

    // ── 4. nRF co-processor UART ──────────────────────────────
    let peripherals = Peripherals::take()?;
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio4,
        peripherals.pins.gpio5,
        AnyInputPin::none(),
        AnyOutputPin::none(),
        &UartConfig::new().baudrate(Hertz(NRF_UART_BAUD)),
    )
    .context("nRF UART init")?;
    let (mut uart_tx, uart_rx) = uart.into_split();
    if let Err(e) = uart::request_device_id(&mut uart_tx) {
        warn!("Scanner device id request failed: {}", e);
    }

    // ── 5. Services (MQTT slot shared with the relay) ─────────
    let mqtt_slot: MqttSlot<EspMqttPublisher> = MqttSlot::new();
    let mqtt_net = Arc::clone(&net);
    let mut services = ServiceAdapter::new(
        uart_tx,
        mqtt_slot.clone(),
        Box::new(move |cfg| EspMqttPublisher::connect(cfg, Arc::clone(&mqtt_net))),
        Arc::clone(&net),
        gw_mac,
    );
    services.send_scan_settings(&config);

    // ── 6. UART reader task ───────────────────────────────────
    let ingest = AdvIngest::new(
        Arc::clone(&table),
        Arc::clone(&metrics),
        SystemClock::new(),
        config.filter.company_id,
        config.ntp.use_timestamps,
    );
    let mut reader = SerialReader::new(uart_rx, ingest);
    let reader_stop = reader.stop_flag();
    let scanner_addr = reader.scanner_addr();
    let reader_task = task::spawn(UART_RX_TASK, move || reader.run())?;

    // ── 7. Relay task ─────────────────────────────────────────
    let identity = RelayIdentity {
        gw_mac,
        device_addr: scanner_addr,
        esp_fw: bounded(concat!("v", env!("CARGO_PKG_VERSION"))),
        nrf_fw: ShortString::new(),
    };
    let relay_ports = RelayPorts {
        http: HttpClient::new(EspPoster::new(HTTP_TIMEOUT), SystemClock::new(), &config, gw_mac),
        mqtt: MqttRelay::new(mqtt_slot, SystemClock::new(), &config, gw_mac),
        watchdog: TaskWatchdog::new("adv_post"),
        system: EspSystem::new(),
        time: SystemClock::new(),
    };
    let (relay, relay_handle) = RelayTask::new(
        Arc::clone(&table),
        Arc::clone(&net),
        config.clone(),
        identity,
        relay_ports,
    )?;
    let relay_task = relay.spawn(ADV_POST_TASK)?;

    // ── 8. Supervisor on the main task ────────────────────────
    let (supervisor, supervisor_handle) = Supervisor::new(
        config,
        Arc::clone(&net),
        relay_handle.clone(),
        SupervisorPorts {
            services,
            config_store: nvs,
            watchdog: TaskWatchdog::new("main"),
            system: EspSystem::new(),
            time: SystemClock::new(),
            indicator: LogIndicator::new(),
        },
    )?;

    // ── 9. Wi-Fi station and link tracking ────────────────────
    let sysloop = EspSystemEventLoop::take()?;
    let _link = LinkMonitor::new(Arc::clone(&net), supervisor_handle)
        .subscribe(&sysloop)
        .context("IP event subscription")?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let _wifi = network::start_station(peripherals.modem, sysloop, nvs_partition).context("Wi-Fi start")?;

    info!("System ready. Entering main loop.");
    supervisor.run();

    // ── 10. Teardown ───────────────────────────────────────────
    relay_handle.stop();
    reader_stop.store(true, Ordering::Release);
    if relay_task.join().is_err() {
        error!("adv_post task panicked");
    }
    if reader_task.join().is_err() {
        error!("uart_rx task panicked");
    }
    info!("Metrics at shutdown:\n{}", metrics.render());
    Ok(())
}
