//! geo-lookup-server: a framed binary RPC server
//!
//! Answers three kinds of lookup over TCP:
//! - IP address geolocation
//! - Phone number geocoding
//! - Server time echo
//!
//! Configuration comes from CLI arguments or a TOML file.

use geo_lookup_server::config::Config;
use geo_lookup_server::lookup::{OfflinePhoneLookup, ResolvingGeoLookup};
use geo_lookup_server::server::{Server, ServerSettings};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        threads = config.threads,
        lookup_timeout_ms = ?config.lookup_timeout_ms,
        resolve_hostnames = config.resolve_hostnames,
        "Starting geo-lookup-server"
    );

    let geo = ResolvingGeoLookup::new(config.location.clone().into(), config.resolve_hostnames);
    let phone = OfflinePhoneLookup::new();

    let mut server = Server::new(ServerSettings::from(&config), Arc::new(geo), Arc::new(phone))?;
    server.start()?;
    server.wait_for_ctrl_c()?;
    server.stop();

    Ok(())
}
