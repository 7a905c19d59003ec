//! Diameter peer state machine per RFC 6733 Section 5.6
//!
//! Implements connection management for a single Diameter peer:
//! - Capabilities Exchange (CER/CEA) for initial handshake
//! - Device Watchdog (DWR/DWA) answered on behalf of the application
//! - Disconnect Peer (DPR/DPA) for graceful shutdown
//!
//! Simplified state machine:
//!   Closed -> WaitCEA (initiator sends CER)
//!   Closed -> WaitCER (responder waits for CER)
//!   WaitCEA -> Open (received CEA with success)
//!   WaitCER -> Open (received CER, sent CEA)
//!   Open -> Closing (sent DPR)
//!   Open -> Closed (received DPR, sent DPA)
//!   Closing -> Closed (received DPA)

use crate::avp::{Avp, AvpValue};
use crate::common::{avp_code, DisconnectCause, VendorSpecificApplicationId};
use crate::config::DiameterConfig;
use crate::error::{DiameterError, DiameterResult, ResultCode};
use crate::message::{base_cmd, DiameterMessage, BASE_APPLICATION_ID};
use crate::transport::DiameterTransport;

/// Peer connection state per RFC 6733
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// No connection
    Closed,
    /// Initiator: CER sent, waiting for CEA
    WaitCEA,
    /// Responder: waiting for incoming CER
    WaitCER,
    /// Capabilities exchanged, connection is operational
    Open,
    /// DPR sent, waiting for DPA before closing
    Closing,
}

/// Result of processing an incoming message in the peer state machine
#[derive(Debug)]
pub enum PeerEvent {
    /// Peer is now open and ready for application messages
    Established {
        origin_host: String,
        origin_realm: String,
    },
    /// Received an application-level message (not a base protocol message)
    Message(DiameterMessage),
    /// Peer disconnected (DPR/DPA exchange completed)
    Disconnected,
    /// Watchdog request answered or watchdog answer received
    WatchdogAck,
}

/// Diameter peer representing a single connection to a remote node
pub struct DiameterPeer {
    transport: DiameterTransport,
    state: PeerState,
    config: DiameterConfig,
    remote_host: Option<String>,
    remote_realm: Option<String>,
    hop_by_hop_seq: u32,
    end_to_end_seq: u32,
    origin_state_id: u32,
}

impl DiameterPeer {
    fn with_state(transport: DiameterTransport, config: &DiameterConfig, state: PeerState) -> Self {
        Self {
            transport,
            state,
            config: config.clone(),
            remote_host: None,
            remote_realm: None,
            hop_by_hop_seq: rand::random(),
            end_to_end_seq: initial_end_to_end(),
            origin_state_id: origin_state_id(),
        }
    }

    /// Create a new peer from an accepted transport (responder side)
    pub fn new_responder(transport: DiameterTransport, config: &DiameterConfig) -> Self {
        Self::with_state(transport, config, PeerState::WaitCER)
    }

    /// Create a new peer on a connected transport (initiator side)
    pub fn new_initiator(transport: DiameterTransport, config: &DiameterConfig) -> Self {
        Self::with_state(transport, config, PeerState::Closed)
    }

    /// Get the current peer state
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Get the remote peer's Origin-Host (available after CER/CEA exchange)
    pub fn remote_host(&self) -> Option<&str> {
        self.remote_host.as_deref()
    }

    /// Get the remote peer's Origin-Realm (available after CER/CEA exchange)
    pub fn remote_realm(&self) -> Option<&str> {
        self.remote_realm.as_deref()
    }

    fn next_hop_by_hop(&mut self) -> u32 {
        self.hop_by_hop_seq = self.hop_by_hop_seq.wrapping_add(1);
        self.hop_by_hop_seq
    }

    fn next_end_to_end(&mut self) -> u32 {
        self.end_to_end_seq = self.end_to_end_seq.wrapping_add(1);
        self.end_to_end_seq
    }

    /// Stamp fresh Hop-by-Hop and End-to-End identifiers on a request
    pub fn assign_identifiers(&mut self, msg: &mut DiameterMessage) {
        msg.header.hop_by_hop_id = self.next_hop_by_hop();
        msg.header.end_to_end_id = self.next_end_to_end();
    }

    /// Initiate the capabilities exchange by sending CER
    pub async fn start(&mut self) -> DiameterResult<()> {
        match self.state {
            PeerState::Closed => {
                self.send_cer().await?;
                self.state = PeerState::WaitCEA;
                Ok(())
            }
            PeerState::WaitCER => Ok(()),
            _ => Err(DiameterError::Protocol(format!(
                "cannot start peer in state {:?}",
                self.state
            ))),
        }
    }

    /// Process the next event from this peer
    ///
    /// Base protocol messages (CER/CEA, DWR/DWA, DPR/DPA) are handled
    /// internally; application messages are returned to the caller. A frame
    /// whose AVPs fail to decode yields [`DiameterError::Undecodable`] and
    /// leaves the state untouched; any other receive error closes the peer.
    pub async fn next_event(&mut self) -> DiameterResult<PeerEvent> {
        let msg = match self.transport.recv().await {
            Ok(msg) => msg,
            Err(e) => {
                if e.is_connection_fatal() {
                    self.state = PeerState::Closed;
                }
                return Err(e);
            }
        };
        self.process_message(msg).await
    }

    async fn process_message(&mut self, msg: DiameterMessage) -> DiameterResult<PeerEvent> {
        let cmd = msg.header.command_code;
        let is_request = msg.header.is_request();

        match (self.state, cmd, is_request) {
            (PeerState::WaitCER, base_cmd::CAPABILITIES_EXCHANGE, true) => {
                self.handle_cer(msg).await
            }
            (PeerState::WaitCEA, base_cmd::CAPABILITIES_EXCHANGE, false) => {
                self.handle_cea(msg)
            }
            (PeerState::Open | PeerState::Closing, base_cmd::DEVICE_WATCHDOG, true) => {
                self.handle_dwr(msg).await
            }
            (PeerState::Open | PeerState::Closing, base_cmd::DEVICE_WATCHDOG, false) => {
                Ok(PeerEvent::WatchdogAck)
            }
            (PeerState::Open, base_cmd::DISCONNECT_PEER, true) => self.handle_dpr(msg).await,
            (PeerState::Closing, base_cmd::DISCONNECT_PEER, false) => {
                self.state = PeerState::Closed;
                self.transport.shutdown().await?;
                Ok(PeerEvent::Disconnected)
            }
            (PeerState::Open | PeerState::Closing, _, _) => Ok(PeerEvent::Message(msg)),
            _ => Err(DiameterError::Protocol(format!(
                "unexpected command {} (request={}) in state {:?}",
                cmd, is_request, self.state
            ))),
        }
    }

    /// Send a Diameter message through this peer
    pub async fn send_message(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        if self.state != PeerState::Open {
            return Err(DiameterError::Protocol(format!(
                "cannot send message in state {:?}",
                self.state
            )));
        }
        self.transport.send(msg).await
    }

    fn identity_avps(&self) -> [Avp; 2] {
        [
            Avp::mandatory(
                avp_code::ORIGIN_HOST,
                AvpValue::DiameterIdentity(self.config.diameter_id.clone()),
            ),
            Avp::mandatory(
                avp_code::ORIGIN_REALM,
                AvpValue::DiameterIdentity(self.config.diameter_realm.clone()),
            ),
        ]
    }

    /// Capability AVPs shared by CER and CEA (RFC 6733 Section 5.3.1)
    fn capability_avps(&self) -> Vec<Avp> {
        let mut avps = Vec::from(self.identity_avps());
        avps.push(Avp::mandatory(
            avp_code::HOST_IP_ADDRESS,
            AvpValue::Address(self.transport.local_addr().ip()),
        ));
        avps.push(Avp::mandatory(
            avp_code::VENDOR_ID,
            AvpValue::Unsigned32(self.config.vendor_id),
        ));
        avps.push(Avp::scalar(
            avp_code::PRODUCT_NAME,
            AvpValue::Utf8String(self.config.product_name.clone()),
        ));
        avps.push(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpValue::Unsigned32(self.origin_state_id),
        ));
        for app in &self.config.applications {
            if app.vendor_id != 0 {
                avps.push(Avp::mandatory(
                    avp_code::SUPPORTED_VENDOR_ID,
                    AvpValue::Unsigned32(app.vendor_id),
                ));
                avps.push(Avp::from(app));
            } else {
                avps.push(Avp::mandatory(
                    avp_code::AUTH_APPLICATION_ID,
                    AvpValue::Unsigned32(app.auth_application_id),
                ));
            }
        }
        avps
    }

    async fn send_cer(&mut self) -> DiameterResult<()> {
        let mut msg =
            DiameterMessage::new_request(base_cmd::CAPABILITIES_EXCHANGE, BASE_APPLICATION_ID);
        // CER is never proxied
        msg.header.flags &= !crate::message::cmd_flags::PROXIABLE;
        self.assign_identifiers(&mut msg);
        msg.avps = self.capability_avps();

        log::debug!(
            "Sending CER [{}] to {}",
            self.config.diameter_id,
            self.transport.peer_addr()
        );
        self.transport.send(&msg).await
    }

    /// Handle incoming CER: validate and respond with CEA
    async fn handle_cer(&mut self, cer: DiameterMessage) -> DiameterResult<PeerEvent> {
        let origin_host = cer
            .origin_host()
            .ok_or_else(|| DiameterError::MissingAvp("Origin-Host".into()))?
            .to_string();
        let origin_realm = cer
            .origin_realm()
            .ok_or_else(|| DiameterError::MissingAvp("Origin-Realm".into()))?
            .to_string();

        let offered = advertised_applications(&cer);
        let common = self.config.applications.is_empty()
            || self
                .config
                .applications
                .iter()
                .any(|app| offered.contains(&app.auth_application_id));

        let result_code = if common {
            ResultCode::Success
        } else {
            ResultCode::NoCommonApplication
        };

        let mut cea = DiameterMessage::new_answer(&cer);
        cea.add_avp(Avp::mandatory(
            avp_code::RESULT_CODE,
            AvpValue::Unsigned32(result_code as u32),
        ));
        cea.avps.extend(self.capability_avps());
        self.transport.send(&cea).await?;

        if !common {
            log::warn!("CER from {origin_host} offers no common application {offered:?}");
            self.state = PeerState::Closed;
            self.transport.shutdown().await?;
            return Err(DiameterError::CapabilitiesRejected(result_code as u32));
        }

        self.remote_host = Some(origin_host.clone());
        self.remote_realm = Some(origin_realm.clone());
        self.state = PeerState::Open;

        Ok(PeerEvent::Established {
            origin_host,
            origin_realm,
        })
    }

    /// Handle incoming CEA: validate result code and transition to Open
    fn handle_cea(&mut self, cea: DiameterMessage) -> DiameterResult<PeerEvent> {
        let result_code = cea
            .result_code()
            .ok_or_else(|| DiameterError::MissingAvp("Result-Code".into()))?;

        if !ResultCode::is_success_code(result_code) {
            self.state = PeerState::Closed;
            return Err(DiameterError::CapabilitiesRejected(result_code));
        }

        let origin_host = cea
            .origin_host()
            .ok_or_else(|| DiameterError::MissingAvp("Origin-Host".into()))?
            .to_string();
        let origin_realm = cea
            .origin_realm()
            .ok_or_else(|| DiameterError::MissingAvp("Origin-Realm".into()))?
            .to_string();

        self.remote_host = Some(origin_host.clone());
        self.remote_realm = Some(origin_realm.clone());
        self.state = PeerState::Open;

        Ok(PeerEvent::Established {
            origin_host,
            origin_realm,
        })
    }

    /// Handle incoming DWR: respond with DWA
    async fn handle_dwr(&mut self, dwr: DiameterMessage) -> DiameterResult<PeerEvent> {
        let mut dwa = DiameterMessage::new_answer(&dwr);
        dwa.add_avp(Avp::mandatory(
            avp_code::RESULT_CODE,
            AvpValue::Unsigned32(ResultCode::Success as u32),
        ));
        dwa.avps.extend(self.identity_avps());
        dwa.add_avp(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpValue::Unsigned32(self.origin_state_id),
        ));

        self.transport.send(&dwa).await?;
        Ok(PeerEvent::WatchdogAck)
    }

    /// Send a DWR (Device-Watchdog-Request) to the peer
    pub async fn send_watchdog(&mut self) -> DiameterResult<()> {
        if self.state != PeerState::Open {
            return Err(DiameterError::Protocol(format!(
                "cannot send watchdog in state {:?}",
                self.state
            )));
        }

        let mut dwr = DiameterMessage::new_request(base_cmd::DEVICE_WATCHDOG, BASE_APPLICATION_ID);
        dwr.header.flags &= !crate::message::cmd_flags::PROXIABLE;
        self.assign_identifiers(&mut dwr);
        dwr.avps.extend(self.identity_avps());
        dwr.add_avp(Avp::mandatory(
            avp_code::ORIGIN_STATE_ID,
            AvpValue::Unsigned32(self.origin_state_id),
        ));

        self.transport.send(&dwr).await
    }

    /// Handle incoming DPR: respond with DPA and close
    async fn handle_dpr(&mut self, dpr: DiameterMessage) -> DiameterResult<PeerEvent> {
        let mut dpa = DiameterMessage::new_answer(&dpr);
        dpa.add_avp(Avp::mandatory(
            avp_code::RESULT_CODE,
            AvpValue::Unsigned32(ResultCode::Success as u32),
        ));
        dpa.avps.extend(self.identity_avps());

        self.transport.send(&dpa).await?;
        self.state = PeerState::Closed;
        self.transport.shutdown().await?;
        Ok(PeerEvent::Disconnected)
    }

    /// Initiate graceful disconnect by sending DPR
    pub async fn disconnect(&mut self, cause: DisconnectCause) -> DiameterResult<()> {
        if self.state != PeerState::Open {
            return Err(DiameterError::Protocol(format!(
                "cannot disconnect in state {:?}",
                self.state
            )));
        }

        let mut dpr = DiameterMessage::new_request(base_cmd::DISCONNECT_PEER, BASE_APPLICATION_ID);
        dpr.header.flags &= !crate::message::cmd_flags::PROXIABLE;
        self.assign_identifiers(&mut dpr);
        dpr.avps.extend(self.identity_avps());
        dpr.add_avp(Avp::mandatory(
            avp_code::DISCONNECT_CAUSE,
            AvpValue::Enumerated(cause as i32),
        ));

        self.transport.send(&dpr).await?;
        self.state = PeerState::Closing;
        Ok(())
    }

    /// Close the underlying stream without a DPR/DPA exchange
    pub async fn abort(&mut self) -> DiameterResult<()> {
        self.state = PeerState::Closed;
        self.transport.shutdown().await
    }
}

/// Auth-Application-Ids advertised in a CER, directly or inside
/// Vendor-Specific-Application-Id
fn advertised_applications(cer: &DiameterMessage) -> Vec<u32> {
    let mut apps = Vec::new();
    for avp in &cer.avps {
        match avp.code() {
            avp_code::AUTH_APPLICATION_ID => apps.extend(avp.as_u32()),
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID => {
                apps.extend(avp.find(avp_code::AUTH_APPLICATION_ID).and_then(Avp::as_u32))
            }
            _ => {}
        }
    }
    apps
}

impl From<&VendorSpecificApplicationId> for Avp {
    fn from(app: &VendorSpecificApplicationId) -> Self {
        Avp::group(avp_code::VENDOR_SPECIFIC_APPLICATION_ID)
            .with_mandatory()
            .child(Avp::mandatory(avp_code::VENDOR_ID, AvpValue::Unsigned32(app.vendor_id)))
            .child(Avp::mandatory(
                avp_code::AUTH_APPLICATION_ID,
                AvpValue::Unsigned32(app.auth_application_id),
            ))
    }
}

/// Origin-State-Id: seconds since the Unix epoch at peer creation
fn origin_state_id() -> u32 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// End-to-End seed per RFC 6733 Section 3: low 12 bits of the current time
/// in the high bits, random low 20 bits
fn initial_end_to_end() -> u32 {
    (origin_state_id() << 20) | (rand::random::<u32>() & 0x000F_FFFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::transport::{DiameterListener, DiameterTransport};
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn test_config(host: &str, realm: &str, app: u32) -> DiameterConfig {
        DiameterConfig {
            diameter_id: host.to_string(),
            diameter_realm: realm.to_string(),
            vendor_id: 10415,
            applications: vec![VendorSpecificApplicationId {
                vendor_id: 10415,
                auth_application_id: app,
            }],
            ..Default::default()
        }
    }

    async fn pair() -> (DiameterListener, DiameterTransport) {
        let dict = Arc::new(Dictionary::base());
        let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
        let listener = DiameterListener::bind(addr, dict.clone()).await.unwrap();
        let listen_addr = listener.local_addr().unwrap();
        let transport = DiameterTransport::connect(listen_addr, dict).await.unwrap();
        (listener, transport)
    }

    #[tokio::test]
    async fn test_cer_cea_exchange() {
        let (listener, transport) = pair().await;
        let server_cfg = test_config("pcrf.example.com", "example.com", 16777238);
        let client_cfg = test_config("qosp.example.com", "example.com", 16777238);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = DiameterPeer::new_responder(transport, &server_cfg);
            peer.start().await.unwrap();
            match peer.next_event().await.unwrap() {
                PeerEvent::Established { origin_host, origin_realm } => {
                    assert_eq!(origin_host, "qosp.example.com");
                    assert_eq!(origin_realm, "example.com");
                }
                other => panic!("expected Established event, got {other:?}"),
            }
            assert_eq!(peer.state(), PeerState::Open);
            peer
        });

        let mut client = DiameterPeer::new_initiator(transport, &client_cfg);
        client.start().await.unwrap();
        assert_eq!(client.state(), PeerState::WaitCEA);

        match client.next_event().await.unwrap() {
            PeerEvent::Established { origin_host, .. } => {
                assert_eq!(origin_host, "pcrf.example.com");
            }
            other => panic!("expected Established event, got {other:?}"),
        }
        assert_eq!(client.state(), PeerState::Open);
        assert_eq!(client.remote_realm(), Some("example.com"));

        let _server_peer = handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_no_common_application() {
        let (listener, transport) = pair().await;
        let server_cfg = test_config("pcrf.example.com", "example.com", 16777238);
        let client_cfg = test_config("qosp.example.com", "example.com", 101);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = DiameterPeer::new_responder(transport, &server_cfg);
            let result = peer.next_event().await;
            assert!(matches!(result, Err(DiameterError::CapabilitiesRejected(5010))));
            assert_eq!(peer.state(), PeerState::Closed);
        });

        let mut client = DiameterPeer::new_initiator(transport, &client_cfg);
        client.start().await.unwrap();
        let result = client.next_event().await;
        assert!(matches!(result, Err(DiameterError::CapabilitiesRejected(5010))));
        assert_eq!(client.state(), PeerState::Closed);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_watchdog_exchange() {
        let (listener, transport) = pair().await;
        let server_cfg = test_config("pcrf.example.com", "example.com", 101);
        let client_cfg = test_config("qosp.example.com", "example.com", 101);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = DiameterPeer::new_responder(transport, &server_cfg);
            let _ = peer.next_event().await.unwrap();
            let event = peer.next_event().await.unwrap();
            assert!(matches!(event, PeerEvent::WatchdogAck));
        });

        let mut client = DiameterPeer::new_initiator(transport, &client_cfg);
        client.start().await.unwrap();
        let _ = client.next_event().await.unwrap();

        client.send_watchdog().await.unwrap();
        let event = client.next_event().await.unwrap();
        assert!(matches!(event, PeerEvent::WatchdogAck));

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_exchange() {
        let (listener, transport) = pair().await;
        let server_cfg = test_config("pcrf.example.com", "example.com", 101);
        let client_cfg = test_config("qosp.example.com", "example.com", 101);

        let handle = tokio::spawn(async move {
            let transport = listener.accept().await.unwrap();
            let mut peer = DiameterPeer::new_responder(transport, &server_cfg);
            let _ = peer.next_event().await.unwrap();
            let event = peer.next_event().await.unwrap();
            assert!(matches!(event, PeerEvent::Disconnected));
            assert_eq!(peer.state(), PeerState::Closed);
        });

        let mut client = DiameterPeer::new_initiator(transport, &client_cfg);
        client.start().await.unwrap();
        let _ = client.next_event().await.unwrap();

        client.disconnect(DisconnectCause::Rebooting).await.unwrap();
        assert_eq!(client.state(), PeerState::Closing);

        let event = client.next_event().await.unwrap();
        assert!(matches!(event, PeerEvent::Disconnected));
        assert_eq!(client.state(), PeerState::Closed);

        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_before_open_rejected() {
        let (_listener, transport) = pair().await;
        let cfg = test_config("qosp.example.com", "example.com", 101);
        let mut client = DiameterPeer::new_initiator(transport, &cfg);

        let msg = DiameterMessage::new_request(272, 101);
        assert!(matches!(
            client.send_message(&msg).await,
            Err(DiameterError::Protocol(_))
        ));
    }

    #[test]
    fn test_vendor_specific_application_id_avp() {
        let app = VendorSpecificApplicationId {
            vendor_id: 10415,
            auth_application_id: 101,
        };
        let avp = Avp::from(&app);
        assert!(avp.is_mandatory());
        assert_eq!(avp.find(avp_code::VENDOR_ID).and_then(Avp::as_u32), Some(10415));
        assert_eq!(avp.find(avp_code::AUTH_APPLICATION_ID).and_then(Avp::as_u32), Some(101));
    }
}
