//! Request dispatcher.
//!
//! Routes a decoded request to the capability for its query kind and builds
//! the response. Capability errors are turned into error responses here and
//! never propagate further; the response id always equals the request id.

use crate::lookup::{time_echo, GeoLookup, LookupError, PhoneLookup, SystemClock, TimeSource};
use crate::metrics::{MetricsSink, NoopMetrics, Outcome};
use crate::protocol::{
    Location, Query, QueryKind, Request, Response, ResponseBody, UNSET_QUERY_ERROR,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Routes requests to lookup capabilities.
pub struct Dispatcher {
    geo: Arc<dyn GeoLookup>,
    phone: Arc<dyn PhoneLookup>,
    clock: Arc<dyn TimeSource>,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    /// Create a dispatcher using the system clock and no metrics.
    pub fn new(geo: Arc<dyn GeoLookup>, phone: Arc<dyn PhoneLookup>) -> Self {
        Self {
            geo,
            phone,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle one request.
    pub fn dispatch(&self, request: Request) -> Response {
        let id = request.id;

        let body = match request.query {
            Query::Ip(ip) => {
                debug!(id, ip = %ip, "IP lookup");
                self.timed(QueryKind::Ip, || self.geo.lookup(&ip))
            }
            Query::Time(time_sent) => {
                debug!(id, time_sent, "Time request");
                ResponseBody::Time(time_echo(time_sent, self.clock.as_ref()))
            }
            Query::Phone(number) => {
                debug!(id, phone = %number, "Phone lookup");
                self.timed(QueryKind::Phone, || self.phone.lookup(&number))
            }
            Query::Unset => {
                debug!(id, "Request without query");
                ResponseBody::Error(UNSET_QUERY_ERROR.to_string())
            }
        };

        Response { id, body }
    }

    fn timed<F>(&self, kind: QueryKind, lookup: F) -> ResponseBody
    where
        F: FnOnce() -> Result<Location, LookupError>,
    {
        let start = Instant::now();
        let result = lookup();
        let elapsed = start.elapsed();

        let (outcome, body) = match result {
            Ok(location) => (Outcome::Ok, ResponseBody::Location(location)),
            Err(e) => {
                debug!(kind = %kind, error = %e, "Lookup failed");
                (Outcome::Bad, ResponseBody::Error(e.to_string()))
            }
        };

        self.metrics.record_latency(kind, elapsed);
        self.metrics.record_outcome(kind, outcome);
        debug!(
            kind = %kind,
            outcome = outcome.as_str(),
            elapsed_us = elapsed.as_micros() as u64,
            "Lookup finished"
        );
        body
    }
}
