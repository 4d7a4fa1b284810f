//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`] for the gateway.
//!
//! - The gateway configuration is one postcard blob under
//!   `gw_cfg::config`.
//! - Configuration is validated before it is written; a stored blob that
//!   no longer decodes is reported as [`ConfigError::Corrupted`] and the
//!   caller falls back to defaults.
//! - ESP-IDF NVS commits are atomic per `nvs_commit()`.  The simulation
//!   backend is an in-memory map.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::GatewayConfig;
use log::info;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;
#[cfg(target_os = "espidf")]
use log::warn;

pub const CONFIG_NAMESPACE: &str = "gw_cfg";
pub const CONFIG_KEY: &str = "config";

/// NVS keys and namespaces are limited to 15 characters.
const NVS_NAME_MAX: usize = 15;

#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 4000;

#[cfg(target_os = "espidf")]
const NOT_FOUND: esp_err_t = ESP_ERR_NVS_NOT_FOUND as esp_err_t;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

/// NUL-terminated copy of an NVS name, truncated to the NVS limit.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn nvs_name(name: &str) -> [u8; NVS_NAME_MAX + 1] {
    let mut buf = [0u8; NVS_NAME_MAX + 1];
    let len = name.len().min(NVS_NAME_MAX);
    buf[..len].copy_from_slice(&name.as_bytes()[..len]);
    buf
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// On first boot or after a layout version change the partition is
    /// erased and initialised again.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the main task before any other NVS
            // access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as esp_err_t || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as esp_err_t {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK || unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open a namespace, run `f` with the handle, close it again.
    #[cfg(target_os = "espidf")]
    fn with_handle<T>(
        namespace: &str,
        write: bool,
        f: impl FnOnce(nvs_handle_t) -> Result<T, esp_err_t>,
    ) -> Result<T, esp_err_t> {
        let ns = nvs_name(namespace);
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        unsafe { nvs_close(handle) };
        result
    }

    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow()
                .get(&Self::composite_key(namespace, key))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let k = nvs_name(key);
            let result = Self::with_handle(namespace, false, |handle| {
                let mut size: usize = 0;
                // Size query first.
                let ret = unsafe { nvs_get_blob(handle, k.as_ptr().cast(), core::ptr::null_mut(), &mut size) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH as esp_err_t);
                }
                let mut buf = vec![0u8; size];
                let ret = unsafe { nvs_get_blob(handle, k.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                buf.truncate(size);
                Ok(buf)
            });
            result.map_err(|e| {
                if e == NOT_FOUND {
                    StorageError::NotFound
                } else {
                    warn!("NvsAdapter: read {}::{} failed: {}", namespace, key, e);
                    StorageError::IoError
                }
            })
        }
    }

    fn write_blob(&self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = nvs_name(key);
            let result = Self::with_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_set_blob(handle, k.as_ptr().cast(), data.as_ptr().cast(), data.len()) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    ESP_OK => Ok(()),
                    err => Err(err),
                }
            });
            result.map_err(|e| {
                warn!("NvsAdapter: write {}::{} failed: {}", namespace, key, e);
                if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE as esp_err_t {
                    StorageError::Full
                } else {
                    StorageError::IoError
                }
            })
        }
    }

    fn erase_key(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.borrow_mut().remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = nvs_name(key);
            let result = Self::with_handle(namespace, true, |handle| {
                let ret = unsafe { nvs_erase_key(handle, k.as_ptr().cast()) };
                if ret != ESP_OK && ret != NOT_FOUND {
                    return Err(ret);
                }
                match unsafe { nvs_commit(handle) } {
                    ESP_OK => Ok(()),
                    err => Err(err),
                }
            });
            match result {
                // Namespace never written: nothing to erase.
                Ok(()) | Err(NOT_FOUND) => Ok(()),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    /// Remove the stored configuration so the next boot starts from
    /// defaults.
    pub fn erase_config(&self) -> Result<(), StorageError> {
        self.erase_key(CONFIG_NAMESPACE, CONFIG_KEY)
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let bytes = self.read_blob(CONFIG_NAMESPACE, CONFIG_KEY).map_err(|e| match e {
            StorageError::NotFound => ConfigError::NotFound,
            StorageError::Full | StorageError::IoError => ConfigError::IoError,
        })?;
        let cfg: GatewayConfig = postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
        info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&self, config: &GatewayConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.write_blob(CONFIG_NAMESPACE, CONFIG_KEY, &bytes).map_err(|e| match e {
            StorageError::Full => ConfigError::StorageFull,
            StorageError::NotFound | StorageError::IoError => ConfigError::IoError,
        })?;
        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.read_blob(namespace, key)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.write_blob(namespace, key, data)
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.erase_key(namespace, key)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.read_blob(namespace, key).is_ok()
    }
}
