//! Network-side services driven by the supervisor.
//!
//! MQTT connects through a caller-supplied connector and lands in the
//! shared [`MqttSlot`] the relay publishes through.  Scan settings go out
//! over the co-processor UART.  Access point, mDNS, remote configuration
//! and firmware checks belong to components outside this crate; the
//! adapter logs the request and tracks the resulting state.

use std::sync::Arc;

use log::{error, info, warn};

use super::device_id;
use super::mqtt::{MqttPublish, MqttSlot};
use crate::adv::MacAddr;
use crate::app::ports::GatewayServices;
use crate::config::{GatewayConfig, MqttConfig};
use crate::error::CommsError;
use crate::net_status::{MQTT_CONNECTED, NetworkStatus};
use crate::serial::uart::{SerialWrite, send_settings};

pub type MqttConnector<P> = Box<dyn FnMut(&MqttConfig) -> Result<P, CommsError> + Send>;

/// What the adapter has been asked to keep running.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServiceState {
    pub mdns: bool,
    pub access_point: bool,
    pub remote_cfg_requests: u32,
    pub fw_checks: u32,
    pub reconnects: u32,
}

pub struct ServiceAdapter<W: SerialWrite, P: MqttPublish> {
    serial: W,
    mqtt: MqttSlot<P>,
    connect_mqtt: MqttConnector<P>,
    net: Arc<NetworkStatus>,
    gw_mac: MacAddr,
    state: ServiceState,
}

impl<W: SerialWrite, P: MqttPublish> ServiceAdapter<W, P> {
    pub fn new(
        serial: W,
        mqtt: MqttSlot<P>,
        connect_mqtt: MqttConnector<P>,
        net: Arc<NetworkStatus>,
        gw_mac: MacAddr,
    ) -> Self {
        Self {
            serial,
            mqtt,
            connect_mqtt,
            net,
            gw_mac,
            state: ServiceState::default(),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn serial(&self) -> &W {
        &self.serial
    }
}

impl<W: SerialWrite, P: MqttPublish> GatewayServices for ServiceAdapter<W, P> {
    fn start_mqtt(&mut self, config: &GatewayConfig) {
        if !config.mqtt.use_mqtt {
            return;
        }
        match (self.connect_mqtt)(&config.mqtt) {
            Ok(client) => {
                self.mqtt.fill(client);
                info!("MQTT: client started for {}", config.mqtt.server);
            }
            Err(e) => error!("MQTT: start failed: {}", e),
        }
    }

    fn stop_mqtt(&mut self) {
        if self.mqtt.clear() {
            info!("MQTT: client stopped");
        }
        self.net.clear(MQTT_CONNECTED);
    }

    fn start_mdns(&mut self) {
        self.state.mdns = true;
        info!("mDNS: advertising {}.local", device_id::hostname(&self.gw_mac));
    }

    fn stop_mdns(&mut self) {
        if self.state.mdns {
            info!("mDNS: stopped");
        }
        self.state.mdns = false;
    }

    fn request_remote_cfg(&mut self, config: &GatewayConfig) {
        self.state.remote_cfg_requests += 1;
        info!("Remote configuration requested from {}", config.remote_cfg.url);
    }

    fn check_for_fw_updates(&mut self) -> bool {
        self.state.fw_checks += 1;
        warn!("Firmware release server is not reachable from this build");
        false
    }

    fn reconnect_network(&mut self) {
        self.state.reconnects += 1;
        info!("Network: reconnect requested");
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: the station was started by `network::start_station`.
            let ret = unsafe { esp_idf_svc::sys::esp_wifi_connect() };
            if ret != esp_idf_svc::sys::ESP_OK {
                warn!("esp_wifi_connect returned {}", ret);
            }
        }
    }

    fn start_cfg_access_point(&mut self) {
        self.state.access_point = true;
        info!("Access point '{}' started", device_id::ap_ssid(&self.gw_mac));
    }

    fn stop_cfg_access_point(&mut self) {
        self.state.access_point = false;
        info!("Access point stopped");
    }

    fn send_scan_settings(&mut self, config: &GatewayConfig) {
        if let Err(e) = send_settings(&mut self.serial, &config.filter, &config.scan) {
            error!("Failed to send scan settings: {}", e);
        }
    }
}
