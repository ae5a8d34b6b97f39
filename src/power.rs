// SPDX-License-Identifier: MPL-2.0

//! Display power control.
//!
//! Displays are kept on while the item scheduler has something live and
//! put into standby once it runs dry.

use tracing::{info, warn};

/// Power state of a display, or of all displays together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerStatus {
    On,
    Standby,
    /// waking up
    ToOn,
    /// going to standby
    ToStandby,
    Unknown,
}

impl PowerStatus {
    /// Combine the statuses of two displays.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        use PowerStatus::*;

        match (self, other) {
            (a, b) if a == b => a,
            (On, ToOn) | (ToOn, On) => ToOn,
            (Standby, ToStandby) | (ToStandby, Standby) => ToStandby,
            _ => Unknown,
        }
    }
}

/// Aggregate status of all connected displays.
///
/// Displays that agree give their common status, displays still catching up
/// with the others give the transition, anything else is unknown. Without
/// displays there is nothing to switch off, which counts as on.
#[must_use]
pub fn aggregate(statuses: impl IntoIterator<Item = PowerStatus>) -> PowerStatus {
    statuses
        .into_iter()
        .reduce(PowerStatus::and)
        .unwrap_or(PowerStatus::On)
}

pub trait PowerControl {
    /// Wake (`true`) or standby (`false`) every connected display.
    fn set_power(&mut self, on: bool) -> eyre::Result<()>;

    fn status(&self) -> PowerStatus;
}

/// Power control without display hardware. Tracks and logs the requests.
#[derive(Debug)]
pub struct LoggingPower {
    displays: Vec<PowerStatus>,
}

impl LoggingPower {
    #[must_use]
    pub fn new(displays: usize) -> Self {
        Self {
            displays: vec![PowerStatus::Unknown; displays],
        }
    }
}

impl PowerControl for LoggingPower {
    fn set_power(&mut self, on: bool) -> eyre::Result<()> {
        let status = if on {
            PowerStatus::On
        } else {
            PowerStatus::Standby
        };

        info!(displays = self.displays.len(), ?status, "switching displays");
        self.displays.fill(status);
        Ok(())
    }

    fn status(&self) -> PowerStatus {
        aggregate(self.displays.iter().copied())
    }
}

/// Requests display power changes, skipping requests for the current state.
#[derive(Debug)]
pub struct Power<P> {
    control: P,
    // None until the first request succeeded.
    powered: Option<bool>,
}

impl<P: PowerControl> Power<P> {
    #[must_use]
    pub fn new(control: P) -> Self {
        Self {
            control,
            powered: None,
        }
    }

    /// Ask for the displays to be on or in standby.
    ///
    /// A failed request is logged and retried on the next call.
    pub fn request(&mut self, on: bool) {
        if self.powered == Some(on) {
            return;
        }

        match self.control.set_power(on) {
            Ok(()) => {
                self.powered = Some(on);
                info!(on, status = ?self.control.status(), "display power changed");
            }
            Err(why) => warn!(on, "failed to switch display power: {why:#}"),
        }
    }

    #[cfg(test)]
    pub fn powered(&self) -> Option<bool> {
        self.powered
    }
}
