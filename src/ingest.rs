//! Ingestion of advertisement reports from the BLE co-processor.
//!
//! Body of an [`SerialCmd::AdvReport`] frame:
//! ```text
//! ┌─────┬──────────┬──────────┬──────────┬──────────────────┐
//! │ CMD │ MAC (6B) │ RSSI (i8)│ LEN (u8) │ ADV DATA (LEN B) │
//! └─────┴──────────┴──────────┴──────────┴──────────────────┘
//! ```
//!
//! A frame is validated in full before anything reaches the table, so a
//! rejected frame never leaves a partial record behind.  There is no
//! backpressure: when the table is full the report is counted and dropped
//! and the serial link keeps delivering.

use std::sync::Arc;

use log::{debug, error, warn};

use crate::adv::{ADV_DATA_MAX_LEN, AdvData, AdvReport, AdvTable, MAX_ADVS_TABLE, MacAddr, PutOutcome};
use crate::app::ports::{MetricsPort, TimePort};
use crate::error::{FrameError, Result};
use crate::serial::SerialCmd;

const MAC_OFFSET: usize = 1;
const RSSI_OFFSET: usize = MAC_OFFSET + 6;
const LEN_OFFSET: usize = RSSI_OFFSET + 1;
const DATA_OFFSET: usize = LEN_OFFSET + 1;

/// AD type of manufacturer specific data.
const AD_TYPE_MANUFACTURER: u8 = 0xFF;

/// Count manufacturer-specific AD structures that carry `company_id`.
///
/// Malformed structures end the scan; what was counted so far stands.
pub fn count_sensor_samples(adv: &[u8], company_id: u16) -> u16 {
    let mut count = 0u16;
    let mut rest = adv;
    while let [len, tail @ ..] = rest {
        let len = usize::from(*len);
        if len == 0 || len > tail.len() {
            break;
        }
        let (structure, next) = tail.split_at(len);
        if let [AD_TYPE_MANUFACTURER, lo, hi, ..] = structure {
            if u16::from_le_bytes([*lo, *hi]) == company_id {
                count += 1;
            }
        }
        rest = next;
    }
    count
}

/// Validate an advertisement frame body and build a record from it.
///
/// `timestamp` is stored as given; `company_id` selects which
/// manufacturer data counts as a sensor sample.
pub fn parse_adv_report(
    frame: Option<&[u8]>,
    timestamp: u32,
    company_id: u16,
) -> core::result::Result<AdvReport, FrameError> {
    let body = match frame {
        Some(b) if !b.is_empty() => b,
        _ => return Err(FrameError::Null),
    };
    if body[0] != SerialCmd::AdvReport as u8 {
        return Err(FrameError::WrongCommand(body[0]));
    }
    if body.len() < DATA_OFFSET {
        return Err(FrameError::Truncated {
            len: body.len(),
            need: DATA_OFFSET,
        });
    }
    let adv_len = usize::from(body[LEN_OFFSET]);
    if adv_len > ADV_DATA_MAX_LEN {
        return Err(FrameError::PayloadTooLong {
            len: adv_len,
            max: ADV_DATA_MAX_LEN,
        });
    }
    let adv = body
        .get(DATA_OFFSET..DATA_OFFSET + adv_len)
        .ok_or(FrameError::Truncated {
            len: body.len(),
            need: DATA_OFFSET + adv_len,
        })?;

    let mut mac = [0u8; 6];
    mac.copy_from_slice(&body[MAC_OFFSET..RSSI_OFFSET]);
    let data = AdvData::from_slice(adv).map_err(|()| FrameError::PayloadTooLong {
        len: adv_len,
        max: ADV_DATA_MAX_LEN,
    })?;

    Ok(AdvReport {
        tag_mac: MacAddr(mac),
        timestamp,
        samples_counter: count_sensor_samples(adv, company_id),
        rssi: body[RSSI_OFFSET] as i8,
        data,
    })
}

/// Feeds decoded co-processor frames into the advertisement table.
pub struct AdvIngest<T: TimePort, M: MetricsPort, const N: usize = MAX_ADVS_TABLE> {
    table: Arc<AdvTable<N>>,
    metrics: Arc<M>,
    time: T,
    company_id: u16,
    use_timestamps: bool,
    /// Stamp for records while wall-clock time is unavailable.  Starts at 1
    /// because 0 marks a free slot.
    counter: u32,
}

impl<T: TimePort, M: MetricsPort, const N: usize> AdvIngest<T, M, N> {
    pub fn new(
        table: Arc<AdvTable<N>>,
        metrics: Arc<M>,
        time: T,
        company_id: u16,
        use_timestamps: bool,
    ) -> Self {
        Self {
            table,
            metrics,
            time,
            company_id,
            use_timestamps,
            counter: 0,
        }
    }

    /// Apply new filter/timestamp settings after a configuration change.
    pub fn reconfigure(&mut self, company_id: u16, use_timestamps: bool) {
        self.company_id = company_id;
        self.use_timestamps = use_timestamps;
    }

    fn next_timestamp(&mut self) -> u32 {
        match self.time.unix_time() {
            Some(now) if self.use_timestamps && now != 0 => now,
            _ => {
                self.counter = self.counter.wrapping_add(1).max(1);
                self.counter
            }
        }
    }

    /// Handle one advertisement frame body.
    ///
    /// Every failure is logged and counted here; the result is for
    /// callers that want the outcome, not for error propagation.
    pub fn on_frame(&mut self, frame: Option<&[u8]>) -> Result<PutOutcome> {
        self.metrics.increment_received_advertisements();

        // Validate with a placeholder stamp so rejected frames do not
        // consume counter values.
        let mut report = match parse_adv_report(frame, 0, self.company_id) {
            Ok(r) => r,
            Err(e) => {
                error!("adv frame rejected: {}", e);
                self.metrics.increment_malformed_frames();
                return Err(e.into());
            }
        };
        report.timestamp = self.next_timestamp();

        match self.table.put(&report) {
            Ok(outcome) => {
                debug!(
                    "adv {} rssi={} len={} -> {:?}",
                    report.tag_mac,
                    report.rssi,
                    report.data.len(),
                    outcome
                );
                Ok(outcome)
            }
            Err(e) => {
                warn!("Adv report table full, adv dropped ({})", report.tag_mac);
                self.metrics.increment_dropped_advertisements();
                Err(e)
            }
        }
    }

    pub fn table(&self) -> &Arc<AdvTable<N>> {
        &self.table
    }
}

impl<T: TimePort, M: MetricsPort, const N: usize> core::fmt::Debug for AdvIngest<T, M, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AdvIngest")
            .field("company_id", &self.company_id)
            .field("use_timestamps", &self.use_timestamps)
            .field("counter", &self.counter)
            .finish_non_exhaustive()
    }
}

/// Build a frame body for tests and the simulator.
pub fn adv_report_body(mac: [u8; 6], rssi: i8, adv: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(DATA_OFFSET + adv.len());
    body.push(SerialCmd::AdvReport as u8);
    body.extend_from_slice(&mac);
    body.push(rssi as u8);
    body.push(adv.len() as u8);
    body.extend_from_slice(adv);
    body
}
