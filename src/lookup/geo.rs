//! Resolving stand-in for IP geolocation.
//!
//! Validates that the query names a reachable address (an IP literal, or a
//! host name the system resolver knows) and answers with a fixed, configured
//! location. It carries no geolocation data of its own.

use super::{GeoLookup, LookupError};
use crate::protocol::Location;
use std::net::{IpAddr, ToSocketAddrs};
use tracing::debug;

/// [`GeoLookup`] that resolves the address and returns a fixed location.
#[derive(Debug, Clone)]
pub struct ResolvingGeoLookup {
    location: Location,
    resolve_hostnames: bool,
}

impl ResolvingGeoLookup {
    /// Create a lookup answering with `location` for every resolvable address.
    ///
    /// With `resolve_hostnames` off, only IP literals are accepted.
    pub fn new(location: Location, resolve_hostnames: bool) -> Self {
        Self {
            location,
            resolve_hostnames,
        }
    }

    fn resolve(&self, host: &str) -> Result<IpAddr, LookupError> {
        if host.is_empty() {
            return Err(LookupError::UnknownHost(": empty address".to_string()));
        }
        if let Ok(addr) = host.parse::<IpAddr>() {
            return Ok(addr);
        }
        if !self.resolve_hostnames {
            return Err(LookupError::UnknownHost(format!(
                "{host}: not an IP address literal"
            )));
        }

        let mut addrs = (host, 0)
            .to_socket_addrs()
            .map_err(|e| LookupError::UnknownHost(format!("{host}: {e}")))?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| LookupError::UnknownHost(format!("{host}: no addresses found")))
    }
}

impl Default for ResolvingGeoLookup {
    fn default() -> Self {
        Self::new(default_location(), true)
    }
}

impl GeoLookup for ResolvingGeoLookup {
    fn lookup(&self, ip: &str) -> Result<Location, LookupError> {
        let addr = self.resolve(ip)?;
        debug!(query = ip, address = %addr, "Resolved address");
        Ok(self.location.clone())
    }
}

/// Location returned when none is configured.
pub fn default_location() -> Location {
    Location {
        country_iso: "MX".to_string(),
        country_name: "Mexico".to_string(),
        city_name: "CDMX".to_string(),
        postal: "11800".to_string(),
        subdivision_name: String::new(),
    }
}
