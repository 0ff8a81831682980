//! End-to-end tests against a real server on an ephemeral port.

use bytes::BytesMut;
use geo_lookup_server::client::{Client, ClientError};
use geo_lookup_server::lookup::{GeoLookup, LookupError, OfflinePhoneLookup, PhoneLookup};
use geo_lookup_server::protocol::codec;
use geo_lookup_server::protocol::{Location, Request, UNSET_QUERY_ERROR};
use geo_lookup_server::server::{Server, ServerSettings};
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::sync::mpsc;
use std::time::{Duration, Instant};

/// Answers every address with a fixed Mexican location.
struct StaticGeo;

impl GeoLookup for StaticGeo {
    fn lookup(&self, ip: &str) -> Result<Location, LookupError> {
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(LookupError::UnknownHost(format!("{ip}: unknown host")));
        }
        Ok(Location {
            country_iso: "MX".to_string(),
            country_name: "Mexico".to_string(),
            city_name: "CDMX".to_string(),
            postal: "11800".to_string(),
            subdivision_name: String::new(),
        })
    }
}

/// Sleeps before answering every number with an empty location.
struct SlowPhone(Duration);

impl PhoneLookup for SlowPhone {
    fn lookup(&self, _number: &str) -> Result<Location, LookupError> {
        thread::sleep(self.0);
        Ok(Location {
            country_iso: "US".to_string(),
            ..Default::default()
        })
    }
}

fn local_settings(threads: usize, shutdown_grace: Duration) -> ServerSettings {
    ServerSettings {
        host: "127.0.0.1".to_string(),
        shutdown_grace,
        ..ServerSettings::new(0, threads)
    }
}

fn start_with(settings: ServerSettings, phone: Arc<dyn PhoneLookup>) -> (Server, SocketAddr) {
    let mut server = Server::new(settings, Arc::new(StaticGeo), phone).unwrap();
    let addr = server.start().unwrap();
    (server, addr)
}

fn start_server() -> (Server, SocketAddr) {
    start_with(
        local_settings(2, Duration::from_millis(500)),
        Arc::new(OfflinePhoneLookup::new()),
    )
}

fn request_frame(request: &Request) -> BytesMut {
    let mut buf = BytesMut::new();
    codec::encode_request(request, &mut buf);
    buf
}

fn client(addr: SocketAddr) -> Client {
    Client::connect(addr)
        .unwrap()
        .with_timeout(Duration::from_secs(5))
        .unwrap()
}

#[test]
fn test_ip_lookup() {
    let (_server, addr) = start_server();
    let location = client(addr).lookup_ip("72.229.28.185").unwrap();
    assert_eq!(location.country_iso, "MX");
    assert_eq!(location.postal, "11800");
}

#[test]
fn test_ip_lookup_error_keeps_connection_open() {
    let (_server, addr) = start_server();
    let mut client = client(addr);
    match client.lookup_ip("trash") {
        Err(ClientError::Server(message)) => {
            assert!(message.starts_with("UnknownHostException: "), "{message}")
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert!(client.lookup_ip("1.2.3.4").is_ok());
}

#[test]
fn test_unset_query() {
    let (_server, addr) = start_server();
    let response = client(addr).send(&Request::unset(9)).unwrap();
    assert_eq!(response.id, 9);
    assert_eq!(response.error_message(), Some(UNSET_QUERY_ERROR));
}

#[test]
fn test_phone_lookups() {
    let (_server, addr) = start_server();
    let mut client = client(addr);

    let response = client.send(&Request::phone(1, "asdf")).unwrap();
    assert!(response.error_message().is_some());
    assert!(response.as_location().is_none());

    let location = client.lookup_phone("+16046811111").unwrap();
    assert_eq!(location.country_iso, "CA");

    let location = client.lookup_phone("+5215591996109").unwrap();
    assert_eq!(location.country_iso, "MX");
}

#[test]
fn test_time_echo() {
    let (_server, addr) = start_server();
    let sent = chrono::Utc::now().timestamp_millis();
    let time = client(addr).time(sent).unwrap();
    assert_eq!(time.time_sent, sent);
    assert!(time.server_time >= sent);
}

#[test]
fn test_pipelined_requests_answered_in_order() {
    let (_server, addr) = start_server();
    let mut client = client(addr);

    let mut buf = request_frame(&Request::ip(1, "72.229.28.185"));
    codec::encode_request(&Request::phone(2, "+16504556864"), &mut buf);
    codec::encode_request(&Request::time(3, 0), &mut buf);
    client.send_raw(&buf).unwrap();

    let ids: Vec<i64> = (0..3).map(|_| client.read_response().unwrap().id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_oversized_frame_closes_connection() {
    let (_server, addr) = start_server();
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    std::io::Write::write_all(&mut stream, &(64u32 * 1024).to_be_bytes()).unwrap();

    // No response: the server closes the socket
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0);
}

#[test]
fn test_oversized_frame_via_client() {
    let (_server, addr) = start_server();
    let mut client = client(addr);
    client.send_raw(&(1u32 << 20).to_be_bytes()).unwrap();
    match client.read_response() {
        Err(ClientError::Io(_)) => {}
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_concurrent_clients() {
    let (server, addr) = start_server();

    let handles: Vec<_> = (0..8)
        .map(|n| {
            thread::spawn(move || {
                let mut client = client(addr);
                for i in 0..25 {
                    let id = n * 1000 + i;
                    let response = client.send(&Request::ip(id, "72.229.28.185")).unwrap();
                    assert_eq!(response.id, id);
                    assert_eq!(response.as_location().unwrap().country_iso, "MX");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = server.metrics().snapshot();
    assert_eq!(snapshot.ip.ok, 200);
    assert_eq!(snapshot.ip.timed, 200);
}

#[test]
fn test_stop_closes_idle_connections() {
    let (mut server, addr) = start_server();
    let mut client = client(addr);
    assert!(client.time(1).is_ok());

    server.stop();
    assert!(client.time(2).is_err());
}

#[test]
fn test_slow_lookup_does_not_delay_other_connections() {
    let (_server, addr) = start_with(
        local_settings(1, Duration::from_millis(200)),
        Arc::new(SlowPhone(Duration::from_secs(2))),
    );

    let mut stalled = client(addr);
    stalled
        .send_raw(&request_frame(&Request::phone(1, "+16504556864")))
        .unwrap();
    thread::sleep(Duration::from_millis(100));

    let started = Instant::now();
    let location = client(addr).lookup_ip("72.229.28.185").unwrap();
    let elapsed = started.elapsed();
    assert_eq!(location.country_iso, "MX");
    assert!(elapsed < Duration::from_secs(1), "served after {elapsed:?}");
}

#[test]
fn test_in_flight_response_delivered_during_stop() {
    let (mut server, addr) = start_with(
        local_settings(2, Duration::from_secs(3)),
        Arc::new(SlowPhone(Duration::from_millis(300))),
    );

    let (sent_tx, sent_rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        let mut client = client(addr);
        client
            .send_raw(&request_frame(&Request::phone(42, "+16504556864")))
            .unwrap();
        sent_tx.send(()).unwrap();
        client.read_response()
    });

    sent_rx.recv().unwrap();
    // Let the lookup start before shutting down
    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    server.stop();
    assert!(started.elapsed() < Duration::from_secs(3));

    let response = reader.join().unwrap().unwrap();
    assert_eq!(response.id, 42);
    assert_eq!(response.as_location().unwrap().country_iso, "US");
}
