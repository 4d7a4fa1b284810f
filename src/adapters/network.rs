//! Network link tracking.
//!
//! Turns link up/down events into [`NetworkStatus`] bits and forwards the
//! connected/disconnected edges to the supervisor.  Losing the Wi-Fi
//! station link also asks the supervisor for a reconnect.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`LinkMonitor::subscribe`] hooks the
//!   station's IP events on the system event loop, and [`start_station`]
//!   brings up Wi-Fi with the credentials kept in the driver's NVS storage.
//! - **all other targets**: events are fed through [`LinkMonitor::on_event`].

use std::sync::Arc;

use log::{info, warn};

use crate::net_status::{ETH_CONNECTED, NetworkStatus, WIFI_CONNECTED};
use crate::supervisor::{SupervisorHandle, SupervisorSig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Wifi,
    Ethernet,
}

impl Link {
    const fn mask(self) -> u32 {
        match self {
            Self::Wifi => WIFI_CONNECTED,
            Self::Ethernet => ETH_CONNECTED,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Up(Link),
    Down(Link),
}

pub struct LinkMonitor {
    net: Arc<NetworkStatus>,
    supervisor: SupervisorHandle,
}

impl LinkMonitor {
    pub fn new(net: Arc<NetworkStatus>, supervisor: SupervisorHandle) -> Self {
        Self { net, supervisor }
    }

    pub fn on_event(&self, event: LinkEvent) {
        let was_connected = self.net.is_network_connected();
        match event {
            LinkEvent::Up(link) => self.net.set(link.mask()),
            LinkEvent::Down(link) => self.net.clear(link.mask()),
        }
        let connected = self.net.is_network_connected();

        match (was_connected, connected) {
            (false, true) => {
                info!("Network connected ({})", self.net.connection_kind());
                self.supervisor.network_connected();
            }
            (true, false) => {
                warn!("Network disconnected");
                self.supervisor.network_disconnected();
            }
            _ => {}
        }
        if event == LinkEvent::Down(Link::Wifi) {
            self.supervisor.send(SupervisorSig::ReconnectNetwork);
        }
    }
}

// ── ESP-IDF ───────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::{LinkSubscription, start_station};

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::Arc;

    use esp_idf_hal::modem::Modem;
    use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
    use esp_idf_svc::netif::IpEvent;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys::EspError;
    use esp_idf_svc::wifi::EspWifi;
    use log::info;

    use super::{Link, LinkEvent, LinkMonitor};

    /// Keeps the event-loop subscription alive.
    pub struct LinkSubscription {
        _ip: EspSubscription<'static, System>,
    }

    impl LinkMonitor {
        /// Track the station interface through its DHCP lease.
        pub fn subscribe(self, sysloop: &EspSystemEventLoop) -> Result<LinkSubscription, EspError> {
            let monitor = Arc::new(self);
            let ip = sysloop.subscribe::<IpEvent, _>(move |event| match event {
                IpEvent::DhcpIpAssigned(_) => monitor.on_event(LinkEvent::Up(Link::Wifi)),
                IpEvent::DhcpIpDeassigned(_) => monitor.on_event(LinkEvent::Down(Link::Wifi)),
                _ => {}
            })?;
            Ok(LinkSubscription { _ip: ip })
        }
    }

    /// Start the Wi-Fi station with the configuration stored by the driver
    /// and begin connecting.  Reconnects go through `esp_wifi_connect`.
    pub fn start_station(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
    ) -> Result<EspWifi<'static>, EspError> {
        let mut wifi = EspWifi::new(modem, sysloop, Some(nvs))?;
        wifi.start()?;
        info!("Wi-Fi station started, connecting");
        wifi.connect()?;
        Ok(wifi)
    }
}
