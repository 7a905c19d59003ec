//! Diameter transport layer (TCP)
//!
//! Provides TCP-based transport for Diameter messages per RFC 6733 Section 2.1.
//! Framing relies on the 3-byte length that follows the version octet in
//! every message header. Received AVPs are decoded against the transport's
//! dictionary.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::dict::Dictionary;
use crate::error::{DiameterError, DiameterResult};
use crate::message::{DiameterHeader, DiameterMessage, DIAMETER_HEADER_SIZE};

/// Maximum Diameter message size accepted (RFC allows up to 16MB)
const MAX_MESSAGE_SIZE: usize = 65536;

/// Diameter transport connection wrapping a TCP stream
pub struct DiameterTransport {
    stream: TcpStream,
    read_buf: BytesMut,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    dict: Arc<Dictionary>,
    shut_down: bool,
}

impl DiameterTransport {
    /// Wrap an existing TCP stream as a Diameter transport
    pub fn new(stream: TcpStream, dict: Arc<Dictionary>) -> DiameterResult<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            peer_addr,
            local_addr,
            dict,
            shut_down: false,
        })
    }

    /// Connect to a remote Diameter peer
    pub async fn connect(addr: SocketAddr, dict: Arc<Dictionary>) -> DiameterResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        log::debug!("TCP connected to Diameter peer {addr}");
        Self::new(stream, dict)
    }

    /// Get the remote peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the local address of the connection
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dictionary used to decode received messages
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dict
    }

    /// Send a Diameter message
    pub async fn send(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        let encoded = msg.encode();
        log::trace!(
            "send cmd={} request={} hbh={:#010x} len={}",
            msg.header.command_code,
            msg.header.is_request(),
            msg.header.hop_by_hop_id,
            encoded.len()
        );
        self.stream.write_all(&encoded).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Receive a Diameter message
    ///
    /// Reads from the TCP stream until one complete message is buffered.
    pub async fn recv(&mut self) -> DiameterResult<DiameterMessage> {
        loop {
            if let Some(msg) = self.try_parse_message()? {
                return Ok(msg);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(DiameterError::ConnectionClosed);
            }
        }
    }

    /// Try to parse a complete Diameter message from the read buffer
    fn try_parse_message(&mut self) -> DiameterResult<Option<DiameterMessage>> {
        if self.read_buf.len() < DIAMETER_HEADER_SIZE {
            return Ok(None);
        }

        let msg_len = ((self.read_buf[1] as usize) << 16)
            | ((self.read_buf[2] as usize) << 8)
            | self.read_buf[3] as usize;

        if msg_len < DIAMETER_HEADER_SIZE {
            return Err(DiameterError::InvalidMessage(format!(
                "message length {msg_len} is less than header size"
            )));
        }

        if msg_len > MAX_MESSAGE_SIZE {
            return Err(DiameterError::InvalidMessage(format!(
                "message length {msg_len} exceeds maximum {MAX_MESSAGE_SIZE}"
            )));
        }

        if self.read_buf.len() < msg_len {
            return Ok(None);
        }

        // The frame is consumed before decoding so a bad AVP cannot desync
        // the stream
        let frame = self.read_buf.split_to(msg_len).freeze();
        let msg = match DiameterMessage::decode(&mut frame.clone(), &self.dict) {
            Ok(msg) => msg,
            // A header that fails on its own is a framing error
            Err(e) => match DiameterHeader::decode(&mut frame.clone()) {
                Ok(header) => {
                    log::warn!(
                        "Undecodable cmd={} hbh={:#010x} len={}: {}",
                        header.command_code,
                        header.hop_by_hop_id,
                        msg_len,
                        e
                    );
                    return Err(DiameterError::Undecodable {
                        header,
                        reason: e.to_string(),
                    });
                }
                Err(_) => return Err(e),
            },
        };
        log::trace!(
            "recv cmd={} request={} hbh={:#010x} len={}",
            msg.header.command_code,
            msg.header.is_request(),
            msg.header.hop_by_hop_id,
            msg_len
        );
        Ok(Some(msg))
    }

    /// Shutdown the transport connection; later calls do nothing
    pub async fn shutdown(&mut self) -> DiameterResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Diameter TCP listener that accepts incoming connections
pub struct DiameterListener {
    listener: TcpListener,
    dict: Arc<Dictionary>,
}

impl DiameterListener {
    /// Bind to the given address
    pub async fn bind(addr: SocketAddr, dict: Arc<Dictionary>) -> DiameterResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, dict })
    }

    /// Accept a new incoming connection
    pub async fn accept(&self) -> DiameterResult<DiameterTransport> {
        let (stream, addr) = self.listener.accept().await?;
        log::debug!("Accepted Diameter connection from {addr}");
        DiameterTransport::new(stream, self.dict.clone())
    }

    /// Get the local address this listener is bound to
    pub fn local_addr(&self) -> DiameterResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}
