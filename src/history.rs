//! History queries from local clients (`GET /history?...`).
//!
//! With timestamps in use, `time=<secs>` limits the answer to records seen
//! in the last `<secs>` seconds; without a parameter the last hour is
//! returned.  The age filter only applies while the clock is
//! synchronised.  In counter mode, `counter=<n>` returns the records
//! stamped after counter `n`.

use std::sync::Arc;

use log::info;

use crate::adv::{AdvBatch, GatewayAdvTable, MacAddr};
use crate::json::{RecordsHeader, records_json};
use crate::relay::RelayHandle;
use crate::supervisor::SupervisorHandle;

pub const DEFAULT_HISTORY_INTERVAL_SECS: u32 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFilter {
    /// Everything tracked.
    All,
    /// Records not older than this many seconds.
    MaxAge(u32),
    /// Records stamped with a counter above this value.
    SinceCounter(u32),
}

/// Leading decimal digits of `s`, as `strtoul` would read them; 0 when
/// there are none.
fn leading_u32(s: &str) -> u32 {
    s.bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, d| acc.saturating_mul(10).saturating_add(u32::from(d - b'0')))
}

pub fn filter_from_params(params: Option<&str>, use_timestamps: bool, time_synced: bool) -> HistoryFilter {
    let params = params.unwrap_or("");
    if use_timestamps {
        let secs = params
            .strip_prefix("time=")
            .map_or(DEFAULT_HISTORY_INTERVAL_SECS, leading_u32);
        if time_synced {
            HistoryFilter::MaxAge(secs)
        } else {
            HistoryFilter::All
        }
    } else {
        params
            .strip_prefix("counter=")
            .map_or(HistoryFilter::All, |v| HistoryFilter::SinceCounter(leading_u32(v)))
    }
}

/// Per-request context.
#[derive(Debug, Clone, Copy)]
pub struct HistoryRequest<'a> {
    pub params: Option<&'a str>,
    pub use_timestamps: bool,
    /// Current unix time, `None` while not synchronised.
    pub unix_time: Option<u32>,
    pub coordinates: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryResponse {
    pub json: String,
    pub num_records: usize,
    pub filter: HistoryFilter,
}

pub struct HistoryQuery {
    table: Arc<GatewayAdvTable>,
    relay: RelayHandle,
    supervisor: SupervisorHandle,
    gw_mac: MacAddr,
    batch: Box<AdvBatch>,
}

impl HistoryQuery {
    pub fn new(
        table: Arc<GatewayAdvTable>,
        relay: RelayHandle,
        supervisor: SupervisorHandle,
        gw_mac: MacAddr,
    ) -> Self {
        Self {
            table,
            relay,
            supervisor,
            gw_mac,
            batch: Box::new(AdvBatch::new()),
        }
    }

    /// Read the table and render the answer.
    ///
    /// A non-empty answer counts as network communication for the relay
    /// task's watchdog.  Every query, empty or not, resets the supervisor's
    /// poll timeout.
    pub fn run(&mut self, req: &HistoryRequest<'_>) -> serde_json::Result<HistoryResponse> {
        let filter = filter_from_params(req.params, req.use_timestamps, req.unix_time.is_some());
        let now = req.unix_time.unwrap_or(0);
        match filter {
            HistoryFilter::All => self.table.read_history(now, 0, false, &mut *self.batch),
            HistoryFilter::MaxAge(secs) => self.table.read_history(now, secs, true, &mut *self.batch),
            HistoryFilter::SinceCounter(counter) => {
                self.table.read_history(now, 0, false, &mut *self.batch);
                // Most recently touched first, so counters only decrease.
                let keep = self
                    .batch
                    .iter()
                    .position(|r| r.timestamp <= counter)
                    .unwrap_or(self.batch.len());
                self.batch.truncate(keep);
            }
        }

        let gw_mac = self.gw_mac.to_hstring();
        let json = records_json(
            &self.batch,
            &RecordsHeader {
                coordinates: req.coordinates,
                gw_mac: &gw_mac,
                timestamp: req.unix_time,
                nonce: None,
                use_timestamps: req.use_timestamps,
            },
        )?;

        match filter {
            HistoryFilter::MaxAge(secs) => info!("History on {} seconds interval: {} records", secs, self.batch.len()),
            HistoryFilter::SinceCounter(c) => {
                info!("History starting from counter {}: {} records", c, self.batch.len());
            }
            HistoryFilter::All => info!("History (without filtering): {} records", self.batch.len()),
        }

        if !self.batch.is_empty() {
            self.relay.notify_history_served();
        }
        self.supervisor.on_get_history();

        Ok(HistoryResponse {
            json,
            num_records: self.batch.len(),
            filter,
        })
    }
}
