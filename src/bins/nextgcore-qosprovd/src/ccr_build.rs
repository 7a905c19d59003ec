//! Credit-Control-Request construction
//!
//! A QoS update is a CCR whose AVP tree carries the subscriber in a
//! Subscription-Id group and the profile in a vendor-private
//! Vendor-Specific-Data group:
//!
//! ```text
//! CCR (272, R)
//!   Session-Id                "session;<u32>"
//!   Auth-Application-Id
//!   Origin-Host
//!   Origin-Realm
//!   Destination-Host          (empty)
//!   CC-Request-Type
//!   Service-Context-Id
//!   Subscription-Id           { Subscription-Id-Type = IMSI, Subscription-Id-Data }
//!   Vendor-Specific-Application-Id { Vendor-Id, Auth-Application-Id }
//!   Vendor-Specific-Data      { Vendor-Id, name, max DL, max UL, GBR DL, GBR UL }
//! ```

use std::fmt;

use ogs_diameter::{
    avp_code, cmd, find_avp, find_vendor_avp, Avp, AvpValue, CcRequestType, DiameterMessage,
    SubscriptionIdType,
};

use crate::context::{QosAvpCodes, QosprovConfig};
use crate::error::ProvisionError;
use crate::profile::{Imsi, QosProfile};

/// Source of Session-Id suffixes
pub trait RandomSource: Send {
    fn next_u32(&mut self) -> u32;
}

/// Thread-local RNG from the `rand` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_u32(&mut self) -> u32 {
        rand::random()
    }
}

/// Per-run constants stamped into every CCR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcrSettings {
    pub origin_host: String,
    pub origin_realm: String,
    pub destination_host: String,
    pub application_id: u32,
    pub vendor_id: u32,
    pub service_context_id: String,
    pub cc_request_type: CcRequestType,
    pub qos_avp: QosAvpCodes,
}

impl From<&QosprovConfig> for CcrSettings {
    fn from(config: &QosprovConfig) -> Self {
        Self {
            origin_host: config.diameter.origin_host.clone(),
            origin_realm: config.diameter.origin_realm.clone(),
            destination_host: config.diameter.destination_host.clone(),
            application_id: config.application.application_id,
            vendor_id: config.application.vendor_id,
            service_context_id: config.application.service_context_id.clone(),
            cc_request_type: config.application.cc_request_type.into(),
            qos_avp: config.qos_avp,
        }
    }
}

/// Builds QoS update requests
pub struct CcrBuilder<R = ThreadRandom> {
    settings: CcrSettings,
    rng: R,
}

impl<R: RandomSource> CcrBuilder<R> {
    pub fn new(settings: CcrSettings, rng: R) -> Self {
        Self { settings, rng }
    }

    pub fn settings(&self) -> &CcrSettings {
        &self.settings
    }

    /// Compose the CCR for one subscriber. Consumes one value from the
    /// random source and nothing else.
    pub fn build(&mut self, imsi: &Imsi, profile: &QosProfile) -> CcRequest {
        let session_id = format!("session;{}", self.rng.next_u32());
        let s = &self.settings;

        let subscription_id = Avp::group(avp_code::SUBSCRIPTION_ID)
            .with_mandatory()
            .child(Avp::mandatory(
                avp_code::SUBSCRIPTION_ID_TYPE,
                AvpValue::Enumerated(SubscriptionIdType::EndUserImsi as i32),
            ))
            .child(Avp::mandatory(
                avp_code::SUBSCRIPTION_ID_DATA,
                AvpValue::Utf8String(imsi.as_str().to_string()),
            ));

        let application = Avp::group(avp_code::VENDOR_SPECIFIC_APPLICATION_ID)
            .with_mandatory()
            .child(Avp::mandatory(avp_code::VENDOR_ID, AvpValue::Unsigned32(s.vendor_id)))
            .child(Avp::mandatory(
                avp_code::AUTH_APPLICATION_ID,
                AvpValue::Unsigned32(s.application_id),
            ));

        let codes = &s.qos_avp;
        let vendor = s.vendor_id;
        let qos = Avp::group(codes.container)
            .with_mandatory()
            .vendor(vendor)
            .child(Avp::mandatory(avp_code::VENDOR_ID, AvpValue::Unsigned32(vendor)))
            .child(Avp::vendor_mandatory(
                codes.profile_name,
                vendor,
                AvpValue::Utf8String(profile.name.clone()),
            ))
            .child(Avp::vendor_mandatory(
                codes.max_bandwidth_dl,
                vendor,
                AvpValue::Unsigned32(profile.max_bandwidth_dl),
            ))
            .child(Avp::vendor_mandatory(
                codes.max_bandwidth_ul,
                vendor,
                AvpValue::Unsigned32(profile.max_bandwidth_ul),
            ))
            .child(Avp::vendor_mandatory(
                codes.guaranteed_bitrate_dl,
                vendor,
                AvpValue::Unsigned32(profile.guaranteed_bitrate_dl),
            ))
            .child(Avp::vendor_mandatory(
                codes.guaranteed_bitrate_ul,
                vendor,
                AvpValue::Unsigned32(profile.guaranteed_bitrate_ul),
            ));

        let message = DiameterMessage::new_request(cmd::CREDIT_CONTROL, s.application_id)
            .with_avp(Avp::mandatory(
                avp_code::SESSION_ID,
                AvpValue::Utf8String(session_id),
            ))
            .with_avp(Avp::mandatory(
                avp_code::AUTH_APPLICATION_ID,
                AvpValue::Unsigned32(s.application_id),
            ))
            .with_avp(Avp::mandatory(
                avp_code::ORIGIN_HOST,
                AvpValue::DiameterIdentity(s.origin_host.clone()),
            ))
            .with_avp(Avp::mandatory(
                avp_code::ORIGIN_REALM,
                AvpValue::DiameterIdentity(s.origin_realm.clone()),
            ))
            .with_avp(Avp::mandatory(
                avp_code::DESTINATION_HOST,
                AvpValue::DiameterIdentity(s.destination_host.clone()),
            ))
            .with_avp(Avp::mandatory(
                avp_code::CC_REQUEST_TYPE,
                AvpValue::Enumerated(s.cc_request_type as i32),
            ))
            .with_avp(Avp::mandatory(
                avp_code::SERVICE_CONTEXT_ID,
                AvpValue::Utf8String(s.service_context_id.clone()),
            ))
            .with_avp(subscription_id)
            .with_avp(application)
            .with_avp(qos);

        let request = CcRequest::from_message(message, s.qos_avp, vendor);
        log::debug!(
            "Built CCR [{}] for IMSI {} profile {}",
            request.session_id().unwrap_or_default(),
            imsi,
            profile.name
        );
        request
    }
}

/// Names of the five profile AVPs, in wire order
const PROFILE_AVP_NAMES: [&str; 5] = [
    "QoS-Profile-Name",
    "QoS-Max-Bandwidth-DL",
    "QoS-Max-Bandwidth-UL",
    "QoS-Guaranteed-Bitrate-DL",
    "QoS-Guaranteed-Bitrate-UL",
];

/// Top-level base AVPs every CCR must carry
const REQUIRED_AVPS: [(u32, &str); 7] = [
    (avp_code::SESSION_ID, "Session-Id"),
    (avp_code::AUTH_APPLICATION_ID, "Auth-Application-Id"),
    (avp_code::ORIGIN_HOST, "Origin-Host"),
    (avp_code::ORIGIN_REALM, "Origin-Realm"),
    (avp_code::DESTINATION_HOST, "Destination-Host"),
    (avp_code::CC_REQUEST_TYPE, "CC-Request-Type"),
    (avp_code::SERVICE_CONTEXT_ID, "Service-Context-Id"),
];

/// A QoS update Credit-Control-Request
#[derive(Debug, Clone, PartialEq)]
pub struct CcRequest {
    message: DiameterMessage,
    qos_avp: QosAvpCodes,
    vendor_id: u32,
}

impl CcRequest {
    /// Wrap a message whose QoS payload uses `qos_avp` codes under `vendor_id`
    pub fn from_message(message: DiameterMessage, qos_avp: QosAvpCodes, vendor_id: u32) -> Self {
        Self {
            message,
            qos_avp,
            vendor_id,
        }
    }

    pub fn message(&self) -> &DiameterMessage {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut DiameterMessage {
        &mut self.message
    }

    pub fn into_message(self) -> DiameterMessage {
        self.message
    }

    pub fn session_id(&self) -> Option<&str> {
        self.message.session_id()
    }

    /// IMSI carried in Subscription-Id
    pub fn subscription_id_data(&self) -> Option<&str> {
        self.message
            .find_avp(avp_code::SUBSCRIPTION_ID)?
            .find(avp_code::SUBSCRIPTION_ID_DATA)?
            .as_utf8_string()
    }

    pub fn cc_request_type(&self) -> Option<CcRequestType> {
        let value = self.message.find_avp(avp_code::CC_REQUEST_TYPE)?.as_i32()?;
        CcRequestType::try_from(value).ok()
    }

    /// The Vendor-Specific-Data group
    pub fn qos_payload(&self) -> Option<&Avp> {
        self.message
            .find_vendor_avp(self.qos_avp.container, self.vendor_id)
    }

    /// Decode the profile back out of Vendor-Specific-Data. Returns `None`
    /// unless the group holds Vendor-Id followed by exactly the five
    /// profile AVPs in wire order.
    pub fn qos_profile(&self) -> Option<QosProfile> {
        let (vendor, fields) = self.qos_payload()?.children().split_first()?;
        if vendor.code() != avp_code::VENDOR_ID || fields.len() != PROFILE_AVP_NAMES.len() {
            return None;
        }
        let in_order = fields
            .iter()
            .zip(self.qos_avp.profile_codes())
            .all(|(avp, code)| avp.code() == code && avp.vendor_id() == Some(self.vendor_id));
        if !in_order {
            return None;
        }

        Some(QosProfile {
            name: fields[0].as_utf8_string()?.to_string(),
            max_bandwidth_dl: fields[1].as_u32()?,
            max_bandwidth_ul: fields[2].as_u32()?,
            guaranteed_bitrate_dl: fields[3].as_u32()?,
            guaranteed_bitrate_ul: fields[4].as_u32()?,
        })
    }

    /// Check that the message is a CCR and every mandatory AVP is present
    /// with its M-bit set
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let header = &self.message.header;
        if !header.is_request() || header.command_code != cmd::CREDIT_CONTROL {
            return Err(ProvisionError::MalformedRequest(format!(
                "not a Credit-Control-Request (cmd={}, request={})",
                header.command_code,
                header.is_request()
            )));
        }

        let avps = &self.message.avps;
        for (code, name) in REQUIRED_AVPS {
            require(avps, code, None, name)?;
        }

        let subscription = require(avps, avp_code::SUBSCRIPTION_ID, None, "Subscription-Id")?;
        require(
            subscription.children(),
            avp_code::SUBSCRIPTION_ID_TYPE,
            None,
            "Subscription-Id-Type",
        )?;
        require(
            subscription.children(),
            avp_code::SUBSCRIPTION_ID_DATA,
            None,
            "Subscription-Id-Data",
        )?;

        let application = require(
            avps,
            avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
            None,
            "Vendor-Specific-Application-Id",
        )?;
        require(application.children(), avp_code::VENDOR_ID, None, "Vendor-Id")?;
        require(
            application.children(),
            avp_code::AUTH_APPLICATION_ID,
            None,
            "Auth-Application-Id",
        )?;

        let qos = require(
            avps,
            self.qos_avp.container,
            Some(self.vendor_id),
            "Vendor-Specific-Data",
        )?;
        require(qos.children(), avp_code::VENDOR_ID, None, "Vendor-Id")?;
        for (code, name) in self.qos_avp.profile_codes().into_iter().zip(PROFILE_AVP_NAMES) {
            require(qos.children(), code, Some(self.vendor_id), name)?;
        }
        Ok(())
    }
}

fn require<'a>(
    avps: &'a [Avp],
    code: u32,
    vendor_id: Option<u32>,
    name: &str,
) -> Result<&'a Avp, ProvisionError> {
    let avp = match vendor_id {
        Some(vendor_id) => find_vendor_avp(avps, code, vendor_id),
        None => find_avp(avps, code),
    }
    .ok_or_else(|| ProvisionError::MalformedRequest(format!("missing mandatory AVP {name}")))?;

    if !avp.is_mandatory() {
        return Err(ProvisionError::MalformedRequest(format!(
            "AVP {name} lacks the M-bit"
        )));
    }
    Ok(avp)
}

impl fmt::Display for CcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CCR session={} imsi={} type={:?} length={}",
            self.session_id().unwrap_or("-"),
            self.subscription_id_data().unwrap_or("-"),
            self.cc_request_type(),
            self.message.calculate_length()
        )?;
        if let Some(profile) = self.qos_profile() {
            write!(
                f,
                " profile={} max={}/{} gbr={}/{}",
                profile.name,
                profile.max_bandwidth_dl,
                profile.max_bandwidth_ul,
                profile.guaranteed_bitrate_dl,
                profile.guaranteed_bitrate_ul
            )?;
        }
        Ok(())
    }
}
