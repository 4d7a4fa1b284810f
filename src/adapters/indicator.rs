//! Log-based status indication.
//!
//! Implements [`StatusIndicator`] by logging state changes.  Boards with a
//! status LED would drive it from the same three calls.

use log::{info, warn};

use crate::app::ports::StatusIndicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indication {
    #[default]
    Idle,
    PollOk,
    PollTimeout,
    CfgMode,
}

/// Logs each change of indication once.
#[derive(Debug, Default)]
pub struct LogIndicator {
    current: Indication,
    before_cfg: Indication,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Indication {
        self.current
    }

    fn show(&mut self, next: Indication) {
        if next != self.current {
            info!("INDICATION | {:?} -> {:?}", self.current, next);
            self.current = next;
        }
    }
}

impl StatusIndicator for LogIndicator {
    fn http_poll_ok(&mut self) {
        if self.current == Indication::CfgMode {
            self.before_cfg = Indication::PollOk;
        } else {
            self.show(Indication::PollOk);
        }
    }

    fn http_poll_timeout(&mut self) {
        if self.current == Indication::CfgMode {
            self.before_cfg = Indication::PollTimeout;
        } else {
            warn!("No history requests within the polling timeout");
            self.show(Indication::PollTimeout);
        }
    }

    fn cfg_mode(&mut self, active: bool) {
        if active {
            if self.current != Indication::CfgMode {
                self.before_cfg = self.current;
            }
            self.show(Indication::CfgMode);
        } else if self.current == Indication::CfgMode {
            let restored = self.before_cfg;
            self.show(restored);
        }
    }
}
