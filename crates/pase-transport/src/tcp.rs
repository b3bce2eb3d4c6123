//! TCP exchange with length-prefixed framing.
//!
//! ## Frame Format
//!
//! ```text
//! +----------------+--------+-----------------+
//! | length (u32le) | opcode | payload         |
//! +----------------+--------+-----------------+
//! ```
//!
//! `length` counts the opcode and payload bytes. Frames larger than the
//! exchange's bound (at most [`MAX_FRAME_LENGTH`]) are rejected in both
//! directions.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use pase_core::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Exchange, Result};

/// Largest frame accepted or sent (IPv6 minimum MTU).
pub const MAX_FRAME_LENGTH: usize = 1280;

const LENGTH_PREFIX: usize = 4;

/// TCP endpoint that hands out framed exchanges.
///
/// A server endpoint owns a bound listener; a client endpoint only
/// connects. Both carry the frame bound given to their exchanges.
///
/// # Example
///
/// ```no_run
/// use pase_transport::tcp::TcpEndpoint;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Responder side
/// let server = TcpEndpoint::server("127.0.0.1:5540").await?;
/// let exchange = server.accept().await?;
///
/// // Initiator side, with a tighter frame bound
/// let exchange = TcpEndpoint::client()
///     .with_max_frame_length(512)
///     .connect("127.0.0.1:5540")
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TcpEndpoint {
    listener: Option<TcpListener>,
    max_frame_length: usize,
}

impl TcpEndpoint {
    /// Endpoint that only connects out.
    pub fn client() -> Self {
        Self {
            listener: None,
            max_frame_length: MAX_FRAME_LENGTH,
        }
    }

    /// Endpoint listening on `addr` (e.g. "0.0.0.0:5540").
    pub async fn server(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("bind {} failed: {}", addr, e)))?;

        Ok(Self {
            listener: Some(listener),
            max_frame_length: MAX_FRAME_LENGTH,
        })
    }

    /// Lower the frame bound for exchanges from this endpoint.
    ///
    /// Clamped to `1..=MAX_FRAME_LENGTH`.
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length.clamp(1, MAX_FRAME_LENGTH);
        self
    }

    /// Frame bound applied to exchanges from this endpoint.
    pub fn max_frame_length(&self) -> usize {
        self.max_frame_length
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        match &self.listener {
            Some(listener) => Ok(listener.local_addr()?),
            None => Err(Error::ConnectionFailed("client endpoint is not bound".into())),
        }
    }

    /// Open an exchange to the peer at `addr`.
    pub async fn connect(&self, addr: &str) -> Result<TcpExchange> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| Error::ConnectionFailed(format!("connect to {} failed: {}", addr, e)))?;
        Ok(TcpExchange::new(stream)?.with_max_frame_length(self.max_frame_length))
    }

    /// Wait for one incoming exchange (server endpoints only).
    pub async fn accept(&self) -> Result<TcpExchange> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| Error::ConnectionFailed("client endpoint cannot accept".into()))?;

        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted TCP connection");

        Ok(TcpExchange::new(stream)?.with_max_frame_length(self.max_frame_length))
    }
}

/// Framed PASE exchange over one TCP connection.
pub struct TcpExchange {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    peer_addr: SocketAddr,
    max_frame_length: usize,
}

impl TcpExchange {
    /// Wrap a connected stream, bounded by [`MAX_FRAME_LENGTH`].
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            peer_addr,
            max_frame_length: MAX_FRAME_LENGTH,
        })
    }

    /// Lower the frame bound, clamped to `1..=MAX_FRAME_LENGTH`.
    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length.clamp(1, MAX_FRAME_LENGTH);
        self
    }

    /// Address of the peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Shut down the write half; the peer sees end-of-stream.
    pub async fn close(&self) -> Result<()> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }
}

/// Encode one frame, rejecting it if it exceeds `max_frame_length`.
pub fn encode_frame(message: &Message, max_frame_length: usize) -> Result<Vec<u8>> {
    let length = 1 + message.payload().len();
    if length > max_frame_length {
        return Err(Error::FrameTooLarge(length));
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX + length);
    frame.extend_from_slice(&(length as u32).to_le_bytes());
    frame.push(message.opcode());
    frame.extend_from_slice(message.payload());
    Ok(frame)
}

#[async_trait]
impl Exchange for TcpExchange {
    async fn send(&self, message: Message) -> Result<()> {
        let frame = encode_frame(&message, self.max_frame_length)?;

        let mut writer = self.writer.lock().await;
        writer.write_all(&frame).await?;
        writer.flush().await?;

        debug!(
            peer = %self.peer_addr,
            message_type = %message.message_type(),
            len = frame.len(),
            "sent frame"
        );
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>> {
        let mut reader = self.reader.lock().await;

        let mut prefix = [0u8; LENGTH_PREFIX];
        match reader.read_exact(&mut prefix).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let length = u32::from_le_bytes(prefix) as usize;
        if length > self.max_frame_length {
            return Err(Error::FrameTooLarge(length));
        }
        if length == 0 {
            return Err(pase_core::Error::Decode("empty frame".into()).into());
        }

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        drop(reader);

        let payload = body.split_off(1);
        let message = Message::from_wire(body[0], payload)?;
        debug!(
            peer = %self.peer_addr,
            message_type = %message.message_type(),
            len = LENGTH_PREFIX + length,
            "received frame"
        );
        Ok(Some(message))
    }
}
