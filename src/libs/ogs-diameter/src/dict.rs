//! Diameter AVP dictionary
//!
//! Maps AVP codes (qualified by Vendor-Id) to names and data types so that
//! received AVPs can be decoded into typed values and grouped AVPs can be
//! expanded into their children.

use std::collections::HashMap;

use crate::common::avp_code;

/// AVP data type as declared in a dictionary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvpKind {
    OctetString,
    Integer32,
    Integer64,
    Unsigned32,
    Unsigned64,
    Float32,
    Float64,
    Address,
    Time,
    Utf8String,
    DiameterIdentity,
    DiameterUri,
    Enumerated,
    Grouped,
}

/// Dictionary entry for one AVP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvpDef {
    pub name: String,
    pub code: u32,
    /// 0 for IETF AVPs
    pub vendor_id: u32,
    pub kind: AvpKind,
}

/// AVP dictionary
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    by_code: HashMap<(u32, u32), AvpDef>,
    by_name: HashMap<String, (u32, u32)>,
}

impl Dictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary with the base protocol (RFC 6733) and credit control
    /// (RFC 4006) AVPs
    pub fn base() -> Self {
        use AvpKind::*;

        let mut dict = Self::new();
        let entries: &[(&str, u32, AvpKind)] = &[
            ("User-Name", avp_code::USER_NAME, Utf8String),
            ("Session-Id", avp_code::SESSION_ID, Utf8String),
            ("Origin-Host", avp_code::ORIGIN_HOST, DiameterIdentity),
            ("Origin-Realm", avp_code::ORIGIN_REALM, DiameterIdentity),
            ("Destination-Host", avp_code::DESTINATION_HOST, DiameterIdentity),
            ("Destination-Realm", avp_code::DESTINATION_REALM, DiameterIdentity),
            ("Host-IP-Address", avp_code::HOST_IP_ADDRESS, Address),
            ("Vendor-Id", avp_code::VENDOR_ID, Unsigned32),
            ("Supported-Vendor-Id", avp_code::SUPPORTED_VENDOR_ID, Unsigned32),
            ("Product-Name", avp_code::PRODUCT_NAME, Utf8String),
            ("Firmware-Revision", avp_code::FIRMWARE_REVISION, Unsigned32),
            ("Result-Code", avp_code::RESULT_CODE, Unsigned32),
            ("Error-Message", avp_code::ERROR_MESSAGE, Utf8String),
            ("Auth-Application-Id", avp_code::AUTH_APPLICATION_ID, Unsigned32),
            ("Acct-Application-Id", avp_code::ACCT_APPLICATION_ID, Unsigned32),
            (
                "Vendor-Specific-Application-Id",
                avp_code::VENDOR_SPECIFIC_APPLICATION_ID,
                Grouped,
            ),
            ("Experimental-Result", avp_code::EXPERIMENTAL_RESULT, Grouped),
            ("Experimental-Result-Code", avp_code::EXPERIMENTAL_RESULT_CODE, Unsigned32),
            ("Origin-State-Id", avp_code::ORIGIN_STATE_ID, Unsigned32),
            ("Disconnect-Cause", avp_code::DISCONNECT_CAUSE, Enumerated),
            ("Failed-AVP", avp_code::FAILED_AVP, Grouped),
            ("Auth-Session-State", avp_code::AUTH_SESSION_STATE, Enumerated),
            ("Termination-Cause", avp_code::TERMINATION_CAUSE, Enumerated),
            ("CC-Request-Number", avp_code::CC_REQUEST_NUMBER, Unsigned32),
            ("CC-Request-Type", avp_code::CC_REQUEST_TYPE, Enumerated),
            ("Service-Context-Id", avp_code::SERVICE_CONTEXT_ID, Utf8String),
            ("Subscription-Id", avp_code::SUBSCRIPTION_ID, Grouped),
            ("Subscription-Id-Type", avp_code::SUBSCRIPTION_ID_TYPE, Enumerated),
            ("Subscription-Id-Data", avp_code::SUBSCRIPTION_ID_DATA, Utf8String),
        ];
        for (name, code, kind) in entries {
            dict.register(name, *code, 0, *kind);
        }
        dict
    }

    /// Register (or replace) an AVP definition
    pub fn register(&mut self, name: &str, code: u32, vendor_id: u32, kind: AvpKind) {
        if let Some(old) = self.by_code.insert(
            (code, vendor_id),
            AvpDef {
                name: name.to_string(),
                code,
                vendor_id,
                kind,
            },
        ) {
            if old.name != name {
                log::debug!(
                    "AVP {}/{} redefined: {} -> {}",
                    code, vendor_id, old.name, name
                );
                self.by_name.remove(&old.name);
            }
        }
        self.by_name.insert(name.to_string(), (code, vendor_id));
    }

    /// Look up a definition by code and Vendor-Id (0 for IETF AVPs)
    pub fn lookup(&self, code: u32, vendor_id: u32) -> Option<&AvpDef> {
        self.by_code.get(&(code, vendor_id))
    }

    /// Look up a definition by name
    pub fn by_name(&self, name: &str) -> Option<&AvpDef> {
        self.by_name.get(name).and_then(|key| self.by_code.get(key))
    }

    /// Number of registered definitions
    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    /// Check if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}
