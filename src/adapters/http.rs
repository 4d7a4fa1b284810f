//! HTTP(S) transport for record batches, online status and statistics.
//!
//! Every POST carries `Content-Type: application/json`, basic
//! authentication when a user name is configured, and an HMAC-SHA256
//! signature of the body once the backend has handed out a key in the
//! `Ruuvi-HMAC-KEY` response header.
//!
//! The connection itself sits behind [`HttpPost`]: `EspPoster` opens an
//! `EspHttpConnection` per request on the device, `LogPoster` only logs
//! on the host.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, error, info, warn};

use crate::adv::{AdvReport, MacAddr};
use crate::app::ports::{HttpSender, TimePort};
use crate::config::{CredString, GatewayConfig, HttpConfig, HttpStatConfig, ShortString};
use crate::error::CommsError;
use crate::json::{RecordsHeader, online_status_json, records_json};

pub const HMAC_SIGNATURE_HEADER: &str = "Ruuvi-HMAC-SHA256";
pub const HMAC_KEY_HEADER: &str = "Ruuvi-HMAC-KEY";
const MAX_HMAC_KEY_LEN: usize = 64;

pub struct PostRequest<'a> {
    pub url: &'a str,
    pub authorization: Option<String>,
    pub signature: Option<String>,
    pub body: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostResponse {
    pub status: u16,
    /// Value of the `Ruuvi-HMAC-KEY` header, if the backend sent one.
    pub hmac_key: Option<String>,
}

pub trait HttpPost {
    fn post(&mut self, req: &PostRequest<'_>) -> Result<PostResponse, CommsError>;
}

/// `Basic <base64(user:pass)>`, or `None` without a user name.
pub fn basic_auth(user: &str, pass: &str) -> Option<String> {
    if user.is_empty() {
        return None;
    }
    Some(format!("Basic {}", STANDARD.encode(format!("{user}:{pass}"))))
}

/// Lower-case hex HMAC-SHA256 of `body`.
pub fn hmac_signature(key: &[u8], body: &str) -> String {
    use core::fmt::Write;
    let mac = hmac_sha256::HMAC::mac(body.as_bytes(), key);
    let mut out = String::with_capacity(mac.len() * 2);
    for b in mac {
        let _ = write!(out, "{b:02x}");
    }
    out
}

pub struct HttpClient<P: HttpPost, T: TimePort> {
    poster: P,
    time: T,
    http: HttpConfig,
    stat: HttpStatConfig,
    gw_mac: MacAddr,
    coordinates: ShortString,
    use_timestamps: bool,
    hmac_key: Option<Vec<u8>>,
}

impl<P: HttpPost, T: TimePort> HttpClient<P, T> {
    pub fn new(poster: P, time: T, config: &GatewayConfig, gw_mac: MacAddr) -> Self {
        Self {
            poster,
            time,
            http: config.http.clone(),
            stat: config.http_stat.clone(),
            gw_mac,
            coordinates: config.coordinates.clone(),
            use_timestamps: config.ntp.use_timestamps,
            hmac_key: None,
        }
    }

    pub fn set_hmac_key(&mut self, key: &str) -> bool {
        if key.is_empty() || key.len() > MAX_HMAC_KEY_LEN {
            warn!("HTTP: rejected HMAC key of {} bytes", key.len());
            return false;
        }
        self.hmac_key = Some(key.as_bytes().to_vec());
        true
    }

    pub fn has_hmac_key(&self) -> bool {
        self.hmac_key.is_some()
    }

    pub fn poster(&self) -> &P {
        &self.poster
    }

    fn post(&mut self, url: &str, user: &CredString, pass: &CredString, body: &str) -> Result<(), CommsError> {
        let req = PostRequest {
            url,
            authorization: basic_auth(user, pass),
            signature: self.hmac_key.as_deref().map(|k| hmac_signature(k, body)),
            body,
        };
        let resp = self.poster.post(&req)?;
        if let Some(key) = resp.hmac_key.as_deref() {
            if self.set_hmac_key(key) {
                info!("HTTP: HMAC key updated");
            }
        }
        if !(200..300).contains(&resp.status) {
            return Err(CommsError::HttpStatus(resp.status));
        }
        debug!("HTTP POST {}: status {}", url, resp.status);
        Ok(())
    }
}

impl<P: HttpPost, T: TimePort> HttpSender for HttpClient<P, T> {
    fn send_batch(&mut self, records: &[AdvReport], nonce: u32) -> bool {
        if !self.http.use_http {
            return false;
        }
        let gw_mac = self.gw_mac.to_hstring();
        let body = match records_json(
            records,
            &RecordsHeader {
                coordinates: &self.coordinates,
                gw_mac: &gw_mac,
                timestamp: self.time.unix_time(),
                nonce: Some(nonce),
                use_timestamps: self.use_timestamps,
            },
        ) {
            Ok(body) => body,
            Err(e) => {
                error!("HTTP: failed to generate records json: {}", e);
                return false;
            }
        };
        debug!("HTTP POST: {}", body);
        let url = self.http.url.clone();
        let (user, pass) = (self.http.user.clone(), self.http.pass.clone());
        match self.post(&url, &user, &pass, &body) {
            Ok(()) => true,
            Err(e) => {
                error!("HTTP POST of {} records failed: {}", records.len(), e);
                false
            }
        }
    }

    fn send_online_status(&mut self, nonce: u32) -> bool {
        if !self.http.use_http {
            return false;
        }
        let body = match online_status_json(&self.gw_mac) {
            Ok(body) => body,
            Err(e) => {
                error!("HTTP: failed to generate status json: {}", e);
                return false;
            }
        };
        debug!("HTTP POST online status, nonce {}", nonce);
        let url = self.http.url.clone();
        let (user, pass) = (self.http.user.clone(), self.http.pass.clone());
        match self.post(&url, &user, &pass, &body) {
            Ok(()) => true,
            Err(e) => {
                warn!("HTTP: online status not delivered: {}", e);
                false
            }
        }
    }

    fn send_statistics(&mut self, status_json: &str) -> bool {
        if !self.stat.use_http_stat {
            return false;
        }
        let url = self.stat.url.clone();
        let (user, pass) = (self.stat.user.clone(), self.stat.pass.clone());
        match self.post(&url, &user, &pass, status_json) {
            Ok(()) => true,
            Err(e) => {
                warn!("HTTP: statistics not delivered: {}", e);
                false
            }
        }
    }
}

// ── Host poster ───────────────────────────────────────────────

/// Logs the request and answers 200.
#[derive(Debug, Default)]
pub struct LogPoster;

impl HttpPost for LogPoster {
    fn post(&mut self, req: &PostRequest<'_>) -> Result<PostResponse, CommsError> {
        info!(
            "HTTP(sim) POST {} ({} bytes, auth={}, signed={})",
            req.url,
            req.body.len(),
            req.authorization.is_some(),
            req.signature.is_some()
        );
        Ok(PostResponse {
            status: 200,
            hmac_key: None,
        })
    }
}

// ── ESP-IDF poster ────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::EspPoster;

#[cfg(target_os = "espidf")]
mod esp {
    use std::time::Duration;

    use esp_idf_svc::http::Method;
    use esp_idf_svc::http::client::{Configuration, EspHttpConnection};
    use esp_idf_svc::io::Write;
    use log::error;

    use super::{HMAC_KEY_HEADER, HMAC_SIGNATURE_HEADER, HttpPost, PostRequest, PostResponse};
    use crate::error::CommsError;

    pub struct EspPoster {
        timeout: Duration,
    }

    impl EspPoster {
        pub fn new(timeout: Duration) -> Self {
            Self { timeout }
        }
    }

    fn failed(stage: &'static str) -> impl FnOnce(esp_idf_svc::sys::EspError) -> CommsError {
        move |e| {
            error!("HTTP: {} failed: {}", stage, e);
            CommsError::HttpSendFailed
        }
    }

    impl HttpPost for EspPoster {
        fn post(&mut self, req: &PostRequest<'_>) -> Result<PostResponse, CommsError> {
            let cfg = Configuration {
                timeout: Some(self.timeout),
                crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
                ..Default::default()
            };
            let mut conn = EspHttpConnection::new(&cfg).map_err(failed("client init"))?;

            let content_len = req.body.len().to_string();
            let mut headers = vec![("Content-Type", "application/json"), ("Content-Length", content_len.as_str())];
            if let Some(auth) = req.authorization.as_deref() {
                headers.push(("Authorization", auth));
            }
            if let Some(sig) = req.signature.as_deref() {
                headers.push((HMAC_SIGNATURE_HEADER, sig));
            }

            conn.initiate_request(Method::Post, req.url, &headers)
                .map_err(failed("request"))?;
            conn.write_all(req.body.as_bytes()).map_err(failed("write"))?;
            conn.initiate_response().map_err(failed("response"))?;

            Ok(PostResponse {
                status: conn.status(),
                hmac_key: conn.header(HMAC_KEY_HEADER).map(str::to_owned),
            })
        }
    }
}
