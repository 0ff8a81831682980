//! Protobuf messages exchanged on the wire.
//!
//! Field numbers are fixed; existing clients depend on them.
//!
//! ```proto
//! message Request  { int64 id = 1; oneof search { string ip = 2; int64 time = 3; string phone = 4; } }
//! message Location { string country_iso = 1; string country_name = 2; string city_name = 3;
//!                    string postal = 4; string subdivision_name = 5; }
//! message Time     { int64 time_sent = 1; int64 server_time = 2; int64 stt = 3; }
//! message Response { int64 id = 1; oneof result { Location loc = 2; Time time = 3; string error = 4; } }
//! ```

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(oneof = "request::Search", tags = "2, 3, 4")]
    pub search: Option<request::Search>,
}

pub mod request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Search {
        #[prost(string, tag = "2")]
        Ip(String),
        #[prost(int64, tag = "3")]
        Time(i64),
        #[prost(string, tag = "4")]
        Phone(String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Location {
    #[prost(string, tag = "1")]
    pub country_iso: String,
    #[prost(string, tag = "2")]
    pub country_name: String,
    #[prost(string, tag = "3")]
    pub city_name: String,
    #[prost(string, tag = "4")]
    pub postal: String,
    #[prost(string, tag = "5")]
    pub subdivision_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Time {
    #[prost(int64, tag = "1")]
    pub time_sent: i64,
    #[prost(int64, tag = "2")]
    pub server_time: i64,
    /// Server time minus sent time.
    #[prost(int64, tag = "3")]
    pub stt: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(oneof = "response::Result", tags = "2, 3, 4")]
    pub result: Option<response::Result>,
}

pub mod response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "2")]
        Loc(super::Location),
        #[prost(message, tag = "3")]
        Time(super::Time),
        #[prost(string, tag = "4")]
        Error(String),
    }
}
