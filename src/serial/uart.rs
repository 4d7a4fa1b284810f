//! Reader task for the co-processor UART.
//!
//! Bytes are pulled in chunks, framed by [`FrameDecoder`] and routed by
//! command byte.  Advertisement reports go to [`AdvIngest`], the scanner's
//! `DeviceId` lands in [`ScannerAddr`]; everything else is only logged.  The reader never blocks on the table.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use super::codec::{FRAME_OVERHEAD, FrameDecoder, encode_frame};
use super::{ScannerAddr, SerialCmd, parse_device_addr};
use super::settings::settings_frame;
use crate::app::ports::{MetricsPort, TimePort};
use crate::config::{FilterConfig, ScanConfig};
use crate::error::{CommsError, Result};
use crate::ingest::AdvIngest;

/// Size of one UART read.
pub const READ_CHUNK: usize = 256;

/// Read timeout, so the stop flag is checked regularly.
pub const READ_TIMEOUT_MS: u32 = 100;

/// Receiving half of the link.
pub trait SerialRead {
    /// Read up to `buf.len()` bytes, waiting at most `timeout_ms`.
    /// `Ok(0)` on timeout.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize>;
}

/// Transmitting half of the link.
pub trait SerialWrite {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
}

/// Send filter and scan settings to the co-processor.
pub fn send_settings<W: SerialWrite>(link: &mut W, filter: &FilterConfig, scan: &ScanConfig) -> Result<()> {
    let frame = settings_frame(filter, scan);
    info!(
        "Send scan settings: company_id=0x{:04X} filtering={}",
        filter.company_id, filter.company_use_filtering
    );
    link.write_all(&frame)
}

/// Ask the scanner to report its device id and address.
pub fn request_device_id<W: SerialWrite>(link: &mut W) -> Result<()> {
    let mut frame = [0u8; FRAME_OVERHEAD + 1];
    let n = encode_frame(SerialCmd::GetDeviceId as u8, &[], &mut frame).ok_or(CommsError::SerialFailed)?;
    link.write_all(&frame[..n])
}

/// Owns the receive half and the ingestion path.
pub struct SerialReader<R: SerialRead, T: TimePort, M: MetricsPort> {
    link: R,
    decoder: FrameDecoder,
    ingest: AdvIngest<T, M>,
    scanner: Arc<ScannerAddr>,
    stop: Arc<AtomicBool>,
}

impl<R: SerialRead, T: TimePort, M: MetricsPort> SerialReader<R, T, M> {
    pub fn new(link: R, ingest: AdvIngest<T, M>) -> Self {
        Self {
            link,
            decoder: FrameDecoder::new(),
            ingest,
            scanner: Arc::new(ScannerAddr::default()),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that ends [`run`](Self::run) after the current read.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Address cell updated from `DeviceId` frames.
    pub fn scanner_addr(&self) -> Arc<ScannerAddr> {
        Arc::clone(&self.scanner)
    }

    pub fn ingest_mut(&mut self) -> &mut AdvIngest<T, M> {
        &mut self.ingest
    }

    /// Feed already-received bytes.  Returns the number of frames routed.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut routed = 0;
        let ingest = &mut self.ingest;
        let scanner = &self.scanner;
        self.decoder.feed(bytes, |body| {
            routed += 1;
            route_frame(ingest, scanner, body);
        });
        routed
    }

    /// One read from the link.
    pub fn poll(&mut self) -> Result<usize> {
        let mut buf = [0u8; READ_CHUNK];
        let n = self.link.read(&mut buf, READ_TIMEOUT_MS)?;
        Ok(self.feed(&buf[..n]))
    }

    /// Read until the stop flag is raised.
    pub fn run(&mut self) {
        info!("Serial reader started");
        while !self.stop.load(Ordering::Acquire) {
            if let Err(e) = self.poll() {
                warn!("UART read failed: {}", e);
                self.decoder.reset();
            }
        }
        let stats = self.decoder.stats();
        info!(
            "Serial reader stopped: frames={} crc_errors={} framing_errors={}",
            stats.frames, stats.crc_errors, stats.framing_errors
        );
    }
}

fn route_frame<T: TimePort, M: MetricsPort>(ingest: &mut AdvIngest<T, M>, scanner: &ScannerAddr, body: &[u8]) {
    match body.first().copied().and_then(SerialCmd::from_u8) {
        Some(SerialCmd::AdvReport) => {
            // Failures are logged and counted inside ingestion.
            let _ = ingest.on_frame(Some(body));
        }
        Some(SerialCmd::DeviceId) => match parse_device_addr(body) {
            Some(addr) => {
                info!("Scanner address: {}", addr);
                scanner.set(addr);
            }
            None => warn!("Short DeviceId frame ({} bytes)", body.len()),
        },
        Some(SerialCmd::Ack) => debug!("Scanner ack"),
        Some(cmd) => warn!("Unexpected command from scanner: {:?}", cmd),
        None => warn!("Unknown command byte from scanner: {:02X?}", body.first()),
    }
}

// ── ESP-IDF UART ──────────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_hal::delay::TickType;
    use esp_idf_hal::uart::{UartRxDriver, UartTxDriver};

    use super::{SerialRead, SerialWrite};
    use crate::error::{CommsError, Result};

    impl SerialRead for UartRxDriver<'_> {
        fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize> {
            UartRxDriver::read(self, buf, TickType::new_millis(u64::from(timeout_ms)).ticks())
                .map_err(|_| CommsError::SerialFailed.into())
        }
    }

    impl SerialWrite for UartTxDriver<'_> {
        fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
            while !data.is_empty() {
                let n = UartTxDriver::write(self, data).map_err(|_| CommsError::SerialFailed)?;
                data = &data[n..];
            }
            Ok(())
        }
    }
}
