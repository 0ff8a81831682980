//! geo-lookup-server: IP, phone and time lookups over a framed binary protocol.
//!
//! Clients send length-prefixed protobuf requests over TCP. Each request
//! carries exactly one query (an IP address, a phone number or a timestamp)
//! and gets back exactly one response with the same id: a location, a time
//! echo, or an error message.
//!
//! The lookup capabilities are traits ([`lookup::GeoLookup`],
//! [`lookup::PhoneLookup`]) injected into the [`server::Server`] at
//! construction.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod lookup;
pub mod metrics;
pub mod protocol;
pub mod server;
