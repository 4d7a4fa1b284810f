//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter     | Implements        | Connects to                       |
//! |-------------|-------------------|-----------------------------------|
//! | `device_id` | -                 | eFuse factory MAC                 |
//! | `http`      | HttpSender        | ESP-IDF HTTP client (HTTPS, HMAC) |
//! | `indicator` | StatusIndicator   | Serial log output                 |
//! | `mqtt`      | MqttPublisher     | ESP-IDF MQTT client               |
//! | `network`   | -                 | Wi-Fi station and IP events       |
//! | `nvs`       | ConfigPort        | NVS / in-memory store             |
//! |             | StoragePort       |                                   |
//! | `services`  | GatewayServices   | MQTT slot, co-processor UART      |
//! | `system`    | SystemPort        | esp_restart, heap statistics      |
//! | `time`      | TimePort          | ESP32 system timer, SNTP clock    |

pub mod device_id;
pub mod http;
pub mod indicator;
pub mod mqtt;
pub mod network;
pub mod nvs;
pub mod services;
pub mod system;
pub mod time;
