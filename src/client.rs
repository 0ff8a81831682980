//! Blocking client for the lookup protocol.
//!
//! One request is written, then one response is read. Requests pipelined
//! through [`Client::send_raw`] come back in the order they were sent and
//! can be collected with repeated [`Client::read_response`] calls.

use crate::protocol::codec::{self, CodecError, DEFAULT_MAX_FRAME_SIZE, HEADER_LEN};
use crate::protocol::{Location, Request, Response, TimeResult};
use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

/// Errors talking to a lookup server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("response id {actual} does not match request id {expected}")]
    IdMismatch { expected: i64, actual: i64 },

    /// The server answered with `Response.error`.
    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected response variant for request {id}")]
    UnexpectedResponse { id: i64 },
}

/// A blocking connection to a lookup server.
pub struct Client {
    stream: TcpStream,
    max_frame_size: usize,
    next_id: i64,
    write_buf: BytesMut,
}

impl Client {
    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            next_id: 1,
            write_buf: BytesMut::new(),
        })
    }

    /// Fail reads and writes that take longer than `timeout`.
    pub fn with_timeout(self, timeout: Duration) -> Result<Self, ClientError> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(self)
    }

    /// Largest response payload this client accepts.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Allocate a request id, unique for this client.
    pub fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Send one request and wait for its response.
    pub fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        self.write_buf.clear();
        codec::encode_request(request, &mut self.write_buf);
        self.stream.write_all(&self.write_buf)?;
        self.stream.flush()?;

        let response = self.read_response()?;
        if response.id != request.id {
            return Err(ClientError::IdMismatch {
                expected: request.id,
                actual: response.id,
            });
        }
        Ok(response)
    }

    /// Write bytes to the connection as-is.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    /// Read the next response frame.
    ///
    /// The declared length is checked before the payload is read.
    pub fn read_response(&mut self) -> Result<Response, ClientError> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header)?;
        let len = u32::from_be_bytes(header) as usize;
        if len > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_frame_size,
            }
            .into());
        }

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload)?;
        Ok(codec::decode_response(&payload)?)
    }

    /// Geolocate an IP address.
    pub fn lookup_ip(&mut self, ip: &str) -> Result<Location, ClientError> {
        let id = self.next_id();
        let response = self.send(&Request::ip(id, ip))?;
        expect_location(response)
    }

    /// Geocode a phone number in international format.
    pub fn lookup_phone(&mut self, number: &str) -> Result<Location, ClientError> {
        let id = self.next_id();
        let response = self.send(&Request::phone(id, number))?;
        expect_location(response)
    }

    /// Echo `time_sent` off the server clock.
    pub fn time(&mut self, time_sent: i64) -> Result<TimeResult, ClientError> {
        let id = self.next_id();
        let response = self.send(&Request::time(id, time_sent))?;
        if let Some(message) = response.error_message() {
            return Err(ClientError::Server(message.to_string()));
        }
        response
            .as_time()
            .copied()
            .ok_or(ClientError::UnexpectedResponse { id })
    }
}

fn expect_location(response: Response) -> Result<Location, ClientError> {
    if let Some(message) = response.error_message() {
        return Err(ClientError::Server(message.to_string()));
    }
    let id = response.id;
    response
        .as_location()
        .cloned()
        .ok_or(ClientError::UnexpectedResponse { id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire;
    use prost::Message;
    use std::net::TcpListener;
    use std::thread;

    /// Accept one connection and answer each request with `reply(request)`.
    fn serve_once<F>(reply: F) -> std::net::SocketAddr
    where
        F: Fn(wire::Request) -> Vec<u8> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            loop {
                let mut header = [0u8; 4];
                if stream.read_exact(&mut header).is_err() {
                    return;
                }
                let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
                stream.read_exact(&mut payload).unwrap();
                let request = wire::Request::decode(payload.as_slice()).unwrap();
                stream.write_all(&reply(request)).unwrap();
            }
        });
        addr
    }

    fn frame(response: &Response) -> Vec<u8> {
        let mut buf = BytesMut::new();
        codec::encode_response(response, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn test_ids_increment() {
        let addr = serve_once(|req| frame(&Response::time(req.id, TimeResult::new(5, 9))));
        let mut client = Client::connect(addr).unwrap();
        assert_eq!(client.next_id(), 1);
        assert_eq!(client.next_id(), 2);
        let time = client.time(5).unwrap();
        assert_eq!(time.time_sent, 5);
        assert_eq!(time.server_time, 9);
    }

    #[test]
    fn test_server_error_surfaces() {
        let addr = serve_once(|req| frame(&Response::error(req.id, "nope")));
        let mut client = Client::connect(addr).unwrap();
        match client.lookup_ip("1.2.3.4") {
            Err(ClientError::Server(message)) => assert_eq!(message, "nope"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_id_mismatch() {
        let addr = serve_once(|req| frame(&Response::error(req.id + 100, "late")));
        let mut client = Client::connect(addr).unwrap();
        match client.send(&Request::ip(7, "1.2.3.4")) {
            Err(ClientError::IdMismatch { expected, actual }) => {
                assert_eq!(expected, 7);
                assert_eq!(actual, 107);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_response_rejected() {
        let addr = serve_once(|_| (64u32 * 1024).to_be_bytes().to_vec());
        let mut client = Client::connect(addr)
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .unwrap();
        assert!(matches!(
            client.lookup_phone("+16504556864"),
            Err(ClientError::Codec(CodecError::FrameTooLarge { .. }))
        ));
    }

    #[test]
    fn test_custom_max_frame_size() {
        let location = Location {
            country_iso: "MX".to_string(),
            country_name: "Mexico".to_string(),
            ..Default::default()
        };
        let addr = serve_once(move |req| frame(&Response::location(req.id, location.clone())));
        let mut client = Client::connect(addr)
            .unwrap()
            .with_timeout(Duration::from_secs(5))
            .unwrap()
            .with_max_frame_size(8);
        match client.lookup_ip("1.2.3.4") {
            Err(ClientError::Codec(CodecError::FrameTooLarge { max, .. })) => assert_eq!(max, 8),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
