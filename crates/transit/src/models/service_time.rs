//! Time-of-day values as they appear in stop-time plans.

use std::fmt;
use std::str::FromStr;

use crate::models::types::{Result, TransitError};

/// Seconds since midnight of the service day.
///
/// Values past 24:00:00 are legal and denote the small hours of the following
/// calendar day (e.g., `25:30:00` is 1:30am).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime(u32);

/// Service days longer than this are rejected as garbage.
const MAX_SERVICE_HOURS: u32 = 48;

impl ServiceTime {
    pub fn from_secs(secs: u32) -> Self {
        Self(secs)
    }

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }

    /// Parse `HH:MM` or `HH:MM:SS`.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || TransitError::InvalidServiceTime(s.to_string());

        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }

        let field = |part: &str| -> Result<u32> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let hours = field(parts[0])?;
        let minutes = field(parts[1])?;
        let seconds = match parts.get(2) {
            Some(part) => field(part)?,
            None => 0,
        };

        if hours >= MAX_SERVICE_HOURS || minutes >= 60 || seconds >= 60 {
            return Err(invalid());
        }

        Ok(Self::from_hms(hours, minutes, seconds))
    }
}

impl FromStr for ServiceTime {
    type Err = TransitError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3600;
        let minutes = (self.0 % 3600) / 60;
        let seconds = self.0 % 60;
        write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}
