//! When the gateway may ask the release server for new firmware.

use core::fmt;
use std::time::Duration;

use crate::config::{AutoUpdateConfig, AutoUpdateCycle};

/// First check after boot or after services restart.
pub const DELAY_AFTER_BOOT: Duration = Duration::from_secs(10 * 60);
/// Check was skipped or failed.
pub const DELAY_BEFORE_RETRY: Duration = Duration::from_secs(60 * 60);
/// Release info downloaded.
pub const DELAY_AFTER_SUCCESS: Duration = Duration::from_secs(14 * 24 * 60 * 60);

const SECS_PER_HOUR: i64 = 60 * 60;
const SECS_PER_DAY: i64 = 24 * SECS_PER_HOUR;

const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NetworkDown,
    TimeNotSynced,
    ManualCycle,
    /// 0 = Sunday.
    WeekdayNotAllowed(u8),
    HourOutOfRange(u8),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkDown => write!(f, "not connected to WiFi or Ethernet"),
            Self::TimeNotSynced => write!(f, "time is not synchronized"),
            Self::ManualCycle => write!(f, "manual updating mode"),
            Self::WeekdayNotAllowed(day) => {
                write!(f, "weekday {} does not match", WEEKDAY_NAMES[usize::from(*day % 7)])
            }
            Self::HourOutOfRange(hour) => write!(f, "current hour {hour:02} is out of range"),
        }
    }
}

/// Local weekday (0 = Sunday) and hour of `unix_time` shifted by
/// `tz_offset_hours`.
pub fn local_weekday_and_hour(unix_time: u32, tz_offset_hours: i8) -> (u8, u8) {
    let local = i64::from(unix_time) + i64::from(tz_offset_hours) * SECS_PER_HOUR;
    let days = local.div_euclid(SECS_PER_DAY);
    let secs_of_day = local.rem_euclid(SECS_PER_DAY);
    // 1970-01-01 was a Thursday.
    let weekday = (days + 4).rem_euclid(7) as u8;
    let hour = (secs_of_day / SECS_PER_HOUR) as u8;
    (weekday, hour)
}

/// Decide whether a firmware check may run now.
pub fn check_allowed(
    cfg: &AutoUpdateConfig,
    network_connected: bool,
    unix_time: Option<u32>,
) -> Result<(), SkipReason> {
    if !network_connected {
        return Err(SkipReason::NetworkDown);
    }
    let Some(now) = unix_time else {
        return Err(SkipReason::TimeNotSynced);
    };
    if cfg.cycle == AutoUpdateCycle::Manual {
        return Err(SkipReason::ManualCycle);
    }
    let (weekday, hour) = local_weekday_and_hour(now, cfg.tz_offset_hours);
    if cfg.weekdays_bitmask & (1 << weekday) == 0 {
        return Err(SkipReason::WeekdayNotAllowed(weekday));
    }
    if hour < cfg.interval_from || hour >= cfg.interval_to {
        return Err(SkipReason::HourOutOfRange(hour));
    }
    Ok(())
}
