//! Lookup protocol: typed request/response model.
//!
//! A request carries a caller-assigned id and at most one query. A response
//! echoes the id and carries exactly one result. Byte-level framing and
//! payload encoding live in [`codec`]; the protobuf message definitions that
//! travel on the wire live in [`wire`].
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+---------------------------+
//! | length (u32 BE)| protobuf payload (length) |
//! +----------------+---------------------------+
//! ```

pub mod codec;
pub mod wire;

pub use codec::{CodecError, DecodeState, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN};

use std::fmt;

/// Error text returned when a request carries no query.
pub const UNSET_QUERY_ERROR: &str = "You must set one of ip, time or phone fields.";

/// A decoded client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Caller-assigned correlation id, echoed back in the response.
    pub id: i64,
    pub query: Query,
}

impl Request {
    pub fn new(id: i64, query: Query) -> Self {
        Self { id, query }
    }

    pub fn ip(id: i64, ip: impl Into<String>) -> Self {
        Self::new(id, Query::Ip(ip.into()))
    }

    pub fn phone(id: i64, number: impl Into<String>) -> Self {
        Self::new(id, Query::Phone(number.into()))
    }

    pub fn time(id: i64, time_sent: i64) -> Self {
        Self::new(id, Query::Time(time_sent))
    }

    pub fn unset(id: i64) -> Self {
        Self::new(id, Query::Unset)
    }
}

/// The query carried by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Geolocate an IP address (or host name).
    Ip(String),
    /// Echo a client timestamp in milliseconds since the epoch.
    Time(i64),
    /// Geocode a phone number.
    Phone(String),
    /// No query field was set on the wire.
    Unset,
}

impl Query {
    /// The kind of this query, or `None` when unset.
    pub fn kind(&self) -> Option<QueryKind> {
        match self {
            Query::Ip(_) => Some(QueryKind::Ip),
            Query::Time(_) => Some(QueryKind::Time),
            Query::Phone(_) => Some(QueryKind::Phone),
            Query::Unset => None,
        }
    }
}

/// Query kind, used for logging and metric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Ip,
    Time,
    Phone,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Ip => "ip",
            QueryKind::Time => "time",
            QueryKind::Phone => "phone",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response to a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: i64,
    pub body: ResponseBody,
}

impl Response {
    pub fn location(id: i64, location: Location) -> Self {
        Self {
            id,
            body: ResponseBody::Location(location),
        }
    }

    pub fn time(id: i64, time: TimeResult) -> Self {
        Self {
            id,
            body: ResponseBody::Time(time),
        }
    }

    pub fn error(id: i64, message: impl Into<String>) -> Self {
        Self {
            id,
            body: ResponseBody::Error(message.into()),
        }
    }

    /// Error message, if this is an error response.
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Error(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<&Location> {
        match &self.body {
            ResponseBody::Location(location) => Some(location),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<&TimeResult> {
        match &self.body {
            ResponseBody::Time(time) => Some(time),
            _ => None,
        }
    }
}

/// Result carried by a response. Exactly one variant is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Location(Location),
    Time(TimeResult),
    Error(String),
}

/// Geographic location returned by IP and phone lookups.
///
/// Optional fields are empty strings when unknown, matching proto3 defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    /// ISO 3166-1 alpha-2 country code.
    pub country_iso: String,
    pub country_name: String,
    pub city_name: String,
    pub postal: String,
    pub subdivision_name: String,
}

/// Result of a time echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeResult {
    /// Client timestamp, echoed verbatim.
    pub time_sent: i64,
    /// Server clock at processing time, ms since the epoch.
    pub server_time: i64,
    /// `server_time - time_sent`. Negative when clocks disagree.
    pub round_trip_hint: i64,
}

impl TimeResult {
    pub fn new(time_sent: i64, server_time: i64) -> Self {
        Self {
            time_sent,
            server_time,
            round_trip_hint: server_time.wrapping_sub(time_sent),
        }
    }
}

impl From<wire::Request> for Request {
    fn from(msg: wire::Request) -> Self {
        let query = match msg.search {
            Some(wire::request::Search::Ip(ip)) => Query::Ip(ip),
            Some(wire::request::Search::Time(time)) => Query::Time(time),
            Some(wire::request::Search::Phone(phone)) => Query::Phone(phone),
            None => Query::Unset,
        };
        Request { id: msg.id, query }
    }
}

impl From<&Request> for wire::Request {
    fn from(request: &Request) -> Self {
        let search = match &request.query {
            Query::Ip(ip) => Some(wire::request::Search::Ip(ip.clone())),
            Query::Time(time) => Some(wire::request::Search::Time(*time)),
            Query::Phone(phone) => Some(wire::request::Search::Phone(phone.clone())),
            Query::Unset => None,
        };
        wire::Request {
            id: request.id,
            search,
        }
    }
}

impl From<&Response> for wire::Response {
    fn from(response: &Response) -> Self {
        let result = match &response.body {
            ResponseBody::Location(location) => wire::response::Result::Loc(location.into()),
            ResponseBody::Time(time) => wire::response::Result::Time(wire::Time {
                time_sent: time.time_sent,
                server_time: time.server_time,
                stt: time.round_trip_hint,
            }),
            ResponseBody::Error(message) => wire::response::Result::Error(message.clone()),
        };
        wire::Response {
            id: response.id,
            result: Some(result),
        }
    }
}

impl TryFrom<wire::Response> for Response {
    type Error = CodecError;

    fn try_from(msg: wire::Response) -> Result<Self, Self::Error> {
        let body = match msg.result {
            Some(wire::response::Result::Loc(loc)) => ResponseBody::Location(loc.into()),
            Some(wire::response::Result::Time(time)) => ResponseBody::Time(TimeResult {
                time_sent: time.time_sent,
                server_time: time.server_time,
                round_trip_hint: time.stt,
            }),
            Some(wire::response::Result::Error(message)) => ResponseBody::Error(message),
            None => return Err(CodecError::MissingResult { id: msg.id }),
        };
        Ok(Response { id: msg.id, body })
    }
}

impl From<&Location> for wire::Location {
    fn from(location: &Location) -> Self {
        wire::Location {
            country_iso: location.country_iso.clone(),
            country_name: location.country_name.clone(),
            city_name: location.city_name.clone(),
            postal: location.postal.clone(),
            subdivision_name: location.subdivision_name.clone(),
        }
    }
}

impl From<wire::Location> for Location {
    fn from(loc: wire::Location) -> Self {
        Location {
            country_iso: loc.country_iso,
            country_name: loc.country_name,
            city_name: loc.city_name,
            postal: loc.postal,
            subdivision_name: loc.subdivision_name,
        }
    }
}
