//! MQTT publication of advertisement records.
//!
//! Each record goes to `<prefix><tag MAC>` as its own JSON message.  The
//! client library sits behind [`MqttPublish`] so topic building and
//! payload rendering run on the host with [`LoggerPublisher`].

use std::sync::{Arc, Mutex, PoisonError};

use log::{error, info};

use crate::adv::{AdvReport, MacAddr};
use crate::app::ports::{MqttPublisher, TimePort};
use crate::config::{GatewayConfig, MqttConfig, ShortString};
use crate::error::CommsError;
use crate::json::{RecordsHeader, mqtt_record_json};
use crate::net_status::{MQTT_CONNECTED, NetworkStatus};

pub type Topic = heapless::String<96>;

/// Minimal publish interface, independent of the client crate.
pub trait MqttPublish {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError>;
}

/// `<prefix><AA:BB:CC:DD:EE:FF>`, `None` if it does not fit.
pub fn record_topic(prefix: &str, tag_mac: &MacAddr) -> Option<Topic> {
    use core::fmt::Write;
    let mut topic = Topic::new();
    write!(topic, "{prefix}{tag_mac}").ok()?;
    Some(topic)
}

/// `mqtt://host:port` (scheme from the configured transport).
pub fn broker_url(cfg: &MqttConfig) -> String {
    format!("{}://{}:{}", cfg.transport.scheme(), cfg.server, cfg.port)
}

pub struct MqttRelay<P: MqttPublish, T: TimePort> {
    publisher: P,
    time: T,
    prefix: ShortString,
    gw_mac: MacAddr,
    coordinates: ShortString,
    use_timestamps: bool,
}

impl<P: MqttPublish, T: TimePort> MqttRelay<P, T> {
    pub fn new(publisher: P, time: T, config: &GatewayConfig, gw_mac: MacAddr) -> Self {
        Self {
            publisher,
            time,
            prefix: config.mqtt.prefix.clone(),
            gw_mac,
            coordinates: config.coordinates.clone(),
            use_timestamps: config.ntp.use_timestamps,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    fn publish_record(&mut self, record: &AdvReport, header: &RecordsHeader<'_>) -> Result<(), CommsError> {
        let topic = record_topic(&self.prefix, &record.tag_mac).ok_or(CommsError::PayloadTooLarge)?;
        let payload = mqtt_record_json(record, header).map_err(|_| CommsError::PayloadTooLarge)?;
        self.publisher.publish(&topic, payload.as_bytes())
    }
}

impl<P: MqttPublish, T: TimePort> MqttPublisher for MqttRelay<P, T> {
    fn publish_batch(&mut self, records: &[AdvReport]) -> bool {
        let gw_mac = self.gw_mac.to_hstring();
        let coordinates = self.coordinates.clone();
        let header = RecordsHeader {
            coordinates: &coordinates,
            gw_mac: &gw_mac,
            timestamp: self.time.unix_time(),
            nonce: None,
            use_timestamps: self.use_timestamps,
        };
        for record in records {
            if let Err(e) = self.publish_record(record, &header) {
                error!("MQTT: publish for {} failed: {}", record.tag_mac, e);
                return false;
            }
        }
        true
    }
}

/// Log-only publisher for host builds.
#[derive(Debug, Default)]
pub struct LoggerPublisher {
    published: u32,
}

impl LoggerPublisher {
    pub fn published(&self) -> u32 {
        self.published
    }
}

impl MqttPublish for LoggerPublisher {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError> {
        self.published = self.published.wrapping_add(1);
        info!(
            "MQTT(sim) publish {} ({} bytes): {}",
            topic,
            payload.len(),
            core::str::from_utf8(payload).unwrap_or("<binary>")
        );
        Ok(())
    }
}

/// Client slot shared between the relay task, which publishes through
/// it, and the service adapter, which connects and drops the client.
pub struct MqttSlot<P>(Arc<Mutex<Option<P>>>);

impl<P> Clone for MqttSlot<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> Default for MqttSlot<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> MqttSlot<P> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    pub fn fill(&self, client: P) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(client);
    }

    /// Drop the client.  `true` if there was one.
    pub fn clear(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take().is_some()
    }

    pub fn is_filled(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

impl<P: MqttPublish> MqttPublish for MqttSlot<P> {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError> {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).as_mut() {
            Some(client) => client.publish(topic, payload),
            None => Err(CommsError::NotConnected),
        }
    }
}

/// Mirror the broker connection into the shared status bits.
pub fn on_connection_change(net: &Arc<NetworkStatus>, connected: bool) {
    if connected {
        info!("MQTT: connected");
        net.set(MQTT_CONNECTED);
    } else {
        info!("MQTT: disconnected");
        net.clear(MQTT_CONNECTED);
    }
}

#[cfg(target_os = "espidf")]
pub use esp::EspMqttPublisher;

#[cfg(target_os = "espidf")]
mod esp {
    use std::sync::Arc;

    use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
    use log::error;

    use super::{MqttPublish, broker_url, on_connection_change};
    use crate::config::MqttConfig;
    use crate::error::CommsError;
    use crate::net_status::NetworkStatus;

    pub struct EspMqttPublisher {
        client: EspMqttClient<'static>,
    }

    impl EspMqttPublisher {
        /// Connect to the configured broker.  The MQTT connected bit
        /// follows the client's connection events.
        pub fn connect(cfg: &MqttConfig, net: Arc<NetworkStatus>) -> Result<Self, CommsError> {
            let url = broker_url(cfg);
            let conf = MqttClientConfiguration {
                client_id: (!cfg.client_id.is_empty()).then_some(cfg.client_id.as_str()),
                username: (!cfg.user.is_empty()).then_some(cfg.user.as_str()),
                password: (!cfg.pass.is_empty()).then_some(cfg.pass.as_str()),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
                EventPayload::Connected(_) => on_connection_change(&net, true),
                EventPayload::Disconnected => on_connection_change(&net, false),
                _ => {}
            })
            .map_err(|e| {
                error!("MQTT: client for {} failed: {}", url, e);
                CommsError::MqttPublishFailed
            })?;
            Ok(Self { client })
        }
    }

    impl MqttPublish for EspMqttPublisher {
        fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), CommsError> {
            self.client
                .enqueue(topic, QoS::AtLeastOnce, false, payload)
                .map(|_| ())
                .map_err(|e| {
                    error!("MQTT: enqueue failed: {}", e);
                    CommsError::MqttPublishFailed
                })
        }
    }
}
