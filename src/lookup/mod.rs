//! Lookup capabilities consumed by the dispatcher.
//!
//! The dispatcher only depends on the [`GeoLookup`], [`PhoneLookup`] and
//! [`TimeSource`] traits. Implementations must be safe to call from many
//! connections at once and must not hold on to the input strings.
//!
//! Default implementations:
//! - [`ResolvingGeoLookup`]: resolves the address, returns a configured location
//! - [`OfflinePhoneLookup`]: built-in numbering plan, no network access
//! - [`SystemClock`]: wall clock in milliseconds

pub mod geo;
pub mod phone;

pub use geo::ResolvingGeoLookup;
pub use phone::{OfflinePhoneLookup, ParseErrorKind};

use crate::protocol::{Location, TimeResult};
use thiserror::Error;

/// Errors produced by lookup capabilities.
///
/// The `Display` output is the exact text placed in `Response.error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The address could not be parsed or resolved.
    #[error("UnknownHostException: {0}")]
    UnknownHost(String),

    /// The input is not a phone number at all.
    #[error("{kind}. {} ({input})", .kind.detail())]
    PhoneParse { kind: ParseErrorKind, input: String },

    /// The input parses but is not a valid number for any region.
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

/// IP geolocation capability.
pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: &str) -> Result<Location, LookupError>;
}

/// Phone number geocoding capability.
pub trait PhoneLookup: Send + Sync {
    fn lookup(&self, number: &str) -> Result<Location, LookupError>;
}

/// Source of the server time used by the time echo.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Echo a client timestamp against the server clock. Never fails.
pub fn time_echo(time_sent: i64, clock: &dyn TimeSource) -> TimeResult {
    TimeResult::new(time_sent, clock.now_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(i64);

    impl TimeSource for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn test_time_echo() {
        let result = time_echo(1_000, &FixedClock(1_250));
        assert_eq!(result.time_sent, 1_000);
        assert_eq!(result.server_time, 1_250);
        assert_eq!(result.round_trip_hint, 250);
    }

    #[test]
    fn test_time_echo_client_ahead() {
        let result = time_echo(5_000, &FixedClock(4_000));
        assert_eq!(result.round_trip_hint, -1_000);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            LookupError::UnknownHost("trash: no such host".to_string()).to_string(),
            "UnknownHostException: trash: no such host"
        );
        assert_eq!(
            LookupError::InvalidNumber("+1555".to_string()).to_string(),
            "Invalid number: +1555"
        );
        assert_eq!(
            LookupError::PhoneParse {
                kind: ParseErrorKind::NotANumber,
                input: "asdf".to_string(),
            }
            .to_string(),
            "NOT_A_NUMBER. The string supplied did not seem to be a phone number. (asdf)"
        );
    }
}
