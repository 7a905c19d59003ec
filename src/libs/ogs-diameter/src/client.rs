//! Diameter request/answer client
//!
//! Wraps an initiator-side [`DiameterPeer`] and offers a blocking
//! request/answer primitive: a request is stamped with fresh Hop-by-Hop and
//! End-to-End identifiers, sent, and the caller is suspended until the
//! answer carrying the same identifiers arrives. Base protocol traffic
//! (watchdogs) is serviced while waiting, and a DWR is sent whenever the
//! peer stays silent for Tc.
//!
//! A client serves one outstanding request at a time; `send_request` takes
//! `&mut self`, so concurrent dispatch over one connection is not possible.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{interval_at, sleep_until, timeout, Instant};

use crate::common::DisconnectCause;
use crate::config::DiameterConfig;
use crate::dict::Dictionary;
use crate::error::{DiameterError, DiameterResult};
use crate::message::DiameterMessage;
use crate::peer::{DiameterPeer, PeerEvent, PeerState};
use crate::transport::DiameterTransport;

/// An established connection able to carry application requests
#[async_trait]
pub trait PeerConnection: Send {
    /// Send a request and wait for its correlated answer
    async fn send_request(&mut self, request: DiameterMessage) -> DiameterResult<DiameterMessage>;

    /// Release the connection
    async fn close(&mut self) -> DiameterResult<()>;
}

/// Diameter client connected to a single remote peer
pub struct DiameterClient {
    peer: DiameterPeer,
    answer_timeout: Duration,
    watchdog_interval: Duration,
}

impl DiameterClient {
    /// Connect over TCP and complete the capabilities exchange
    pub async fn connect(
        addr: SocketAddr,
        config: &DiameterConfig,
        dict: Arc<Dictionary>,
    ) -> DiameterResult<Self> {
        let connect_timeout = config.connect_timeout;
        let handshake = async {
            let transport = DiameterTransport::connect(addr, dict).await?;
            let mut peer = DiameterPeer::new_initiator(transport, config);
            peer.start().await?;
            loop {
                match peer.next_event().await? {
                    PeerEvent::Established {
                        origin_host,
                        origin_realm,
                    } => {
                        log::info!(
                            "Diameter peer [{origin_host}] realm [{origin_realm}] open at {addr}"
                        );
                        return Ok::<_, DiameterError>(peer);
                    }
                    other => log::debug!("Ignoring {other:?} during capabilities exchange"),
                }
            }
        };

        let peer = timeout(connect_timeout, handshake)
            .await
            .map_err(|_| DiameterError::Timeout(connect_timeout))??;

        Ok(Self {
            peer,
            answer_timeout: config.answer_timeout,
            watchdog_interval: config.watchdog_interval(),
        })
    }

    /// Current peer state
    pub fn state(&self) -> PeerState {
        self.peer.state()
    }

    /// Origin-Host announced by the remote peer
    pub fn remote_host(&self) -> Option<&str> {
        self.peer.remote_host()
    }

    async fn await_answer(&mut self, request: &DiameterMessage) -> DiameterResult<DiameterMessage> {
        let deadline = Instant::now() + self.answer_timeout;
        let tc = self.watchdog_interval;
        let mut watchdog = interval_at(Instant::now() + tc, tc);
        loop {
            let received = tokio::select! {
                received = self.peer.next_event() => received,
                _ = watchdog.tick() => {
                    log::debug!("No traffic from peer for {tc:?}, sending DWR");
                    self.peer.send_watchdog().await?;
                    continue;
                }
                _ = sleep_until(deadline) => {
                    return Err(DiameterError::Timeout(self.answer_timeout));
                }
            };
            watchdog.reset();

            let event = match received {
                Ok(event) => event,
                Err(DiameterError::Undecodable { header, reason })
                    if header.answers(&request.header) =>
                {
                    return Err(DiameterError::Undecodable { header, reason });
                }
                Err(DiameterError::Undecodable { header, reason }) => {
                    log::warn!(
                        "Discarding undecodable cmd={} hbh={:#010x}: {reason}",
                        header.command_code,
                        header.hop_by_hop_id
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };

            match event {
                PeerEvent::Message(msg) if msg.header.answers(&request.header) => return Ok(msg),
                PeerEvent::Message(msg) if msg.header.is_request() => {
                    log::warn!(
                        "Discarding unsolicited request cmd={} from peer",
                        msg.header.command_code
                    );
                }
                PeerEvent::Message(msg) => {
                    log::warn!(
                        "Discarding answer with unknown identifiers hbh={:#010x} e2e={:#010x}",
                        msg.header.hop_by_hop_id,
                        msg.header.end_to_end_id
                    );
                }
                PeerEvent::WatchdogAck => {}
                PeerEvent::Disconnected => return Err(DiameterError::ConnectionClosed),
                PeerEvent::Established { .. } => {
                    return Err(DiameterError::Protocol(
                        "capabilities exchange repeated on open connection".into(),
                    ))
                }
            }
        }
    }
}

#[async_trait]
impl PeerConnection for DiameterClient {
    async fn send_request(
        &mut self,
        mut request: DiameterMessage,
    ) -> DiameterResult<DiameterMessage> {
        self.peer.assign_identifiers(&mut request);
        self.peer.send_message(&request).await?;
        self.await_answer(&request).await
    }

    async fn close(&mut self) -> DiameterResult<()> {
        if self.peer.state() != PeerState::Open {
            // Already failed or disconnected; make sure the stream is down
            if let Err(e) = self.peer.abort().await {
                log::debug!("Shutting down closed connection: {e}");
            }
            return Ok(());
        }

        self.peer.disconnect(DisconnectCause::Rebooting).await?;
        let answer_timeout = self.answer_timeout;
        let peer = &mut self.peer;
        let wait_dpa = async {
            loop {
                match peer.next_event().await {
                    Ok(PeerEvent::Disconnected) => return Ok::<(), DiameterError>(()),
                    Ok(_) => {}
                    Err(e) if !e.is_connection_fatal() => log::debug!("While closing: {e}"),
                    Err(e) => return Err(e),
                }
            }
        };
        let outcome = timeout(answer_timeout, wait_dpa).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                log::warn!("No DPA within {answer_timeout:?}, closing anyway");
                self.peer.abort().await
            }
        }
    }
}
