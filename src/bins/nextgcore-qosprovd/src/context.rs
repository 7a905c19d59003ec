//! QoS provisioning context
//!
//! Static configuration of a provisioning run, loaded from the `qosprovd`
//! section of a YAML file. Every field has a default so a partial file only
//! needs to name what differs from the reference deployment.

use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use ogs_diameter::{
    AvpKind, CcRequestType, DiameterConfig, Dictionary, ResultCode, VendorSpecificApplicationId,
    DIAMETER_PORT, OGS_3GPP_VENDOR_ID,
};
use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;

use crate::profile::{Imsi, ProfileError, QosProfile};

/// Name of the YAML section holding this daemon's settings
pub const CONFIG_SECTION: &str = "qosprovd";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("cannot resolve PCRF address '{0}'")]
    UnresolvedPeer(String),

    #[error("vendor-private AVP code {0} is configured more than once")]
    DuplicateAvpCode(u32),

    #[error("no subscribers configured")]
    NoSubscribers,

    #[error("diameter.{0} must be greater than zero")]
    ZeroTimer(&'static str),
}

/// Remote PCRF transport address
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PcrfPeer {
    pub address: String,
    pub port: u16,
}

impl Default for PcrfPeer {
    fn default() -> Self {
        Self {
            address: "192.168.1.10".to_string(),
            port: DIAMETER_PORT,
        }
    }
}

impl PcrfPeer {
    /// Resolve to the first socket address
    pub fn resolve(&self) -> Result<SocketAddr, ConfigError> {
        (self.address.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::UnresolvedPeer(format!("{}:{}", self.address, self.port)))
    }
}

/// Local identity, remote peer and timers
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiameterSection {
    pub origin_host: String,
    pub origin_realm: String,
    /// Left empty so the peer resolves the destination by routing
    pub destination_host: String,
    pub pcrf: PcrfPeer,
    pub product_name: String,
    /// Tc, seconds: a DWR goes out when the PCRF is silent this long
    /// while a CCA is awaited
    pub timer_tc: u32,
    pub connect_timeout_ms: u64,
    pub answer_timeout_ms: u64,
}

impl Default for DiameterSection {
    fn default() -> Self {
        Self {
            origin_host: "qosprovd.example.com".to_string(),
            origin_realm: "example.com".to_string(),
            destination_host: String::new(),
            pcrf: PcrfPeer::default(),
            product_name: "NextGCore".to_string(),
            timer_tc: 30,
            connect_timeout_ms: 5000,
            answer_timeout_ms: 10000,
        }
    }
}

/// CC-Request-Type as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    Initial,
    #[default]
    Update,
    Termination,
    Event,
}

impl From<RequestType> for CcRequestType {
    fn from(value: RequestType) -> Self {
        match value {
            RequestType::Initial => CcRequestType::InitialRequest,
            RequestType::Update => CcRequestType::UpdateRequest,
            RequestType::Termination => CcRequestType::TerminationRequest,
            RequestType::Event => CcRequestType::EventRequest,
        }
    }
}

/// Application identifiers carried in every CCR
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApplicationSection {
    pub application_id: u32,
    pub vendor_id: u32,
    pub service_context_id: String,
    pub cc_request_type: RequestType,
    /// Result-Code that counts as a successful update
    pub success_result_code: u32,
}

impl Default for ApplicationSection {
    fn default() -> Self {
        Self {
            application_id: 101,
            vendor_id: OGS_3GPP_VENDOR_ID,
            service_context_id: "QoS".to_string(),
            cc_request_type: RequestType::Update,
            success_result_code: ResultCode::Success as u32,
        }
    }
}

/// Vendor-private AVP codes of the QoS payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QosAvpCodes {
    /// Vendor-Specific-Data grouped container
    pub container: u32,
    pub profile_name: u32,
    pub max_bandwidth_dl: u32,
    pub max_bandwidth_ul: u32,
    pub guaranteed_bitrate_dl: u32,
    pub guaranteed_bitrate_ul: u32,
}

impl Default for QosAvpCodes {
    fn default() -> Self {
        Self {
            container: 1100,
            profile_name: 26,
            max_bandwidth_dl: 1025,
            max_bandwidth_ul: 1026,
            guaranteed_bitrate_dl: 1027,
            guaranteed_bitrate_ul: 1028,
        }
    }
}

impl QosAvpCodes {
    /// Codes of the five profile AVPs in wire order
    pub fn profile_codes(&self) -> [u32; 5] {
        [
            self.profile_name,
            self.max_bandwidth_dl,
            self.max_bandwidth_ul,
            self.guaranteed_bitrate_dl,
            self.guaranteed_bitrate_ul,
        ]
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for code in std::iter::once(self.container).chain(self.profile_codes()) {
            if !seen.insert(code) {
                return Err(ConfigError::DuplicateAvpCode(code));
            }
        }
        Ok(())
    }

    /// Add the QoS payload definitions under `vendor_id`
    pub fn register(&self, dict: &mut Dictionary, vendor_id: u32) {
        dict.register("QoS-Vendor-Specific-Data", self.container, vendor_id, AvpKind::Grouped);
        dict.register("QoS-Profile-Name", self.profile_name, vendor_id, AvpKind::Utf8String);
        dict.register("QoS-Max-Bandwidth-DL", self.max_bandwidth_dl, vendor_id, AvpKind::Unsigned32);
        dict.register("QoS-Max-Bandwidth-UL", self.max_bandwidth_ul, vendor_id, AvpKind::Unsigned32);
        dict.register(
            "QoS-Guaranteed-Bitrate-DL",
            self.guaranteed_bitrate_dl,
            vendor_id,
            AvpKind::Unsigned32,
        );
        dict.register(
            "QoS-Guaranteed-Bitrate-UL",
            self.guaranteed_bitrate_ul,
            vendor_id,
            AvpKind::Unsigned32,
        );
    }
}

/// Complete provisioning configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QosprovConfig {
    pub diameter: DiameterSection,
    pub application: ApplicationSection,
    pub qos_avp: QosAvpCodes,
    pub profile: QosProfile,
    pub subscribers: Vec<String>,
}

impl Default for QosprovConfig {
    fn default() -> Self {
        Self {
            diameter: DiameterSection::default(),
            application: ApplicationSection::default(),
            qos_avp: QosAvpCodes::default(),
            profile: QosProfile::high_priority(),
            subscribers: Vec::new(),
        }
    }
}

impl QosprovConfig {
    /// Parse YAML text. A document without a `qosprovd` section yields
    /// the defaults.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let yaml: Value = serde_yaml::from_str(text)?;
        match yaml.get(CONFIG_SECTION) {
            Some(section) => Ok(serde_yaml::from_value(section.clone())?),
            None => {
                log::warn!("No '{CONFIG_SECTION}' section in config file");
                Ok(Self::default())
            }
        }
    }

    /// Read and parse a YAML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::info!("Loading configuration from: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Check the profile and AVP codes, and parse the subscriber list
    pub fn validate(&self) -> Result<Vec<Imsi>, ConfigError> {
        self.profile.validate()?;
        self.qos_avp.validate()?;
        if self.diameter.timer_tc == 0 {
            return Err(ConfigError::ZeroTimer("timer_tc"));
        }

        if self.subscribers.is_empty() {
            return Err(ConfigError::NoSubscribers);
        }
        let subscribers = self
            .subscribers
            .iter()
            .map(|s| s.parse::<Imsi>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(subscribers)
    }

    /// Settings for the Diameter peer
    pub fn diameter_config(&self) -> DiameterConfig {
        DiameterConfig {
            diameter_id: self.diameter.origin_host.clone(),
            diameter_realm: self.diameter.origin_realm.clone(),
            product_name: self.diameter.product_name.clone(),
            vendor_id: self.application.vendor_id,
            applications: vec![VendorSpecificApplicationId {
                vendor_id: self.application.vendor_id,
                auth_application_id: self.application.application_id,
            }],
            timer_tc: self.diameter.timer_tc,
            connect_timeout: Duration::from_millis(self.diameter.connect_timeout_ms),
            answer_timeout: Duration::from_millis(self.diameter.answer_timeout_ms),
        }
    }

    /// Base dictionary extended with the QoS payload definitions
    pub fn dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::base();
        self.qos_avp.register(&mut dict, self.application.vendor_id);
        dict
    }
}
