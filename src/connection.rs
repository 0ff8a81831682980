//! Per-connection request loop.
//!
//! A connection reads frames, dispatches each request and writes the
//! response before touching the next frame, so responses leave in request
//! order. The lifecycle is tracked as an explicit [`ConnState`]:
//!
//! ```text
//! AwaitingHeader -> AwaitingPayload -> Dispatching -> Writing -+
//!       ^                                                      |
//!       +------------------------------------------------------+
//! any state -> Closed
//! ```
//!
//! Lookups run on the blocking pool so a slow capability only delays this
//! connection. Framing errors close the connection without a response; lookup
//! failures, timeouts and panics become error responses.

use crate::dispatch::Dispatcher;
use crate::protocol::codec::{self, CodecError, DecodeState, FrameDecoder};
use crate::protocol::{Request, Response};
use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

/// Initial read buffer size.
const READ_BUFFER_SIZE: usize = 4 * 1024;

/// Error text sent when a lookup task fails unexpectedly.
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for the 4-byte length prefix.
    AwaitingHeader,
    /// Header read; waiting for the rest of the payload.
    AwaitingPayload { len: usize },
    /// Request decoded; lookup in progress.
    Dispatching { id: i64 },
    /// Writing the response frame.
    Writing { id: i64, len: usize },
    /// Connection finished.
    Closed,
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_frame_size: usize,
    /// Upper bound on a single lookup. `None` waits indefinitely.
    pub lookup_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_frame_size: codec::DEFAULT_MAX_FRAME_SIZE,
            lookup_timeout: None,
        }
    }
}

/// Reasons a connection ends abnormally.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("connection I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("peer closed connection mid-frame ({buffered} bytes buffered)")]
    UnexpectedEof { buffered: usize },
}

/// A single client connection.
pub struct Connection<S> {
    stream: S,
    state: ConnState,
    decoder: FrameDecoder,
    read_buf: BytesMut,
    write_buf: BytesMut,
    dispatcher: Arc<Dispatcher>,
    lookup_timeout: Option<Duration>,
    shutdown: watch::Receiver<bool>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        dispatcher: Arc<Dispatcher>,
        config: &ConnectionConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream,
            state: ConnState::AwaitingHeader,
            decoder: FrameDecoder::new(config.max_frame_size),
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: BytesMut::new(),
            dispatcher,
            lookup_timeout: config.lookup_timeout,
            shutdown,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Serve requests until the peer closes, shutdown is signalled, or an
    /// unrecoverable error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        let result = self.serve().await;
        if let Err(ref e) = result {
            match e {
                ConnectionError::Codec(e) => warn!(error = %e, "Closing connection on framing error"),
                _ => debug!(error = %e, "Connection error"),
            }
        }
        self.transition(ConnState::Closed);
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete frame already buffered before reading again
            while let Some(payload) = self.decoder.decode_frame(&mut self.read_buf)? {
                let request = codec::decode_request(&payload)?;
                let response = self.dispatch(request).await;
                self.write_response(&response).await?;
            }
            self.sync_read_state();

            let n = tokio::select! {
                n = self.stream.read_buf(&mut self.read_buf) => n?,
                _ = shutdown_requested(&mut self.shutdown) => {
                    debug!(state = ?self.state, "Shutdown requested, closing connection");
                    return Ok(());
                }
            };

            if n == 0 {
                if self.decoder.is_idle(&self.read_buf) {
                    trace!("Connection closed by client");
                    return Ok(());
                }
                return Err(ConnectionError::UnexpectedEof {
                    buffered: self.read_buf.len(),
                });
            }
        }
    }

    async fn dispatch(&mut self, request: Request) -> Response {
        let id = request.id;
        self.transition(ConnState::Dispatching { id });

        let dispatcher = Arc::clone(&self.dispatcher);
        let task = tokio::task::spawn_blocking(move || dispatcher.dispatch(request));

        let joined = match self.lookup_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(id, timeout_ms = limit.as_millis() as u64, "Lookup timed out");
                    return Response::error(
                        id,
                        format!("Lookup timed out after {} ms", limit.as_millis()),
                    );
                }
            },
            None => task.await,
        };

        match joined {
            Ok(response) => response,
            Err(e) => {
                error!(id, error = %e, "Lookup task failed");
                Response::error(id, INTERNAL_ERROR)
            }
        }
    }

    async fn write_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        self.write_buf.clear();
        codec::encode_response(response, &mut self.write_buf);
        self.transition(ConnState::Writing {
            id: response.id,
            len: self.write_buf.len(),
        });

        // Header and payload go out in one buffer; nothing else writes to
        // this stream while the response is in flight.
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn sync_read_state(&mut self) {
        let state = match self.decoder.state() {
            DecodeState::AwaitingHeader => ConnState::AwaitingHeader,
            DecodeState::AwaitingPayload { len } => ConnState::AwaitingPayload { len },
        };
        self.transition(state);
    }

    fn transition(&mut self, next: ConnState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "Connection state");
            self.state = next;
        }
    }
}

/// Resolves once shutdown has been signalled or the server is gone.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
