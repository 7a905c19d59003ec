//! Common Diameter types and constants

/// AVP codes for common Diameter AVPs
pub mod avp_code {
    // RFC 6733 Base Protocol AVPs
    pub const USER_NAME: u32 = 1;
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const ACCT_APPLICATION_ID: u32 = 259;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const SUPPORTED_VENDOR_ID: u32 = 265;
    pub const VENDOR_ID: u32 = 266;
    pub const FIRMWARE_REVISION: u32 = 267;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const DISCONNECT_CAUSE: u32 = 273;
    pub const AUTH_SESSION_STATE: u32 = 277;
    pub const ORIGIN_STATE_ID: u32 = 278;
    pub const FAILED_AVP: u32 = 279;
    pub const ERROR_MESSAGE: u32 = 281;
    pub const DESTINATION_REALM: u32 = 283;
    pub const DESTINATION_HOST: u32 = 293;
    pub const TERMINATION_CAUSE: u32 = 295;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;

    // RFC 4006 Credit-Control AVPs
    pub const CC_REQUEST_NUMBER: u32 = 415;
    pub const CC_REQUEST_TYPE: u32 = 416;
    pub const SUBSCRIPTION_ID_DATA: u32 = 444;
    pub const SUBSCRIPTION_ID: u32 = 443;
    pub const SUBSCRIPTION_ID_TYPE: u32 = 450;
    pub const SERVICE_CONTEXT_ID: u32 = 461;
}

/// Command codes used by this client
pub mod cmd {
    /// Credit-Control-Request/Answer (RFC 4006)
    pub const CREDIT_CONTROL: u32 = 272;
}

/// Subscription ID type values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SubscriptionIdType {
    EndUserE164 = 0,
    EndUserImsi = 1,
    EndUserSipUri = 2,
    EndUserNai = 3,
    EndUserPrivate = 4,
}

/// CC-Request-Type values (RFC 4006 Section 8.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CcRequestType {
    InitialRequest = 1,
    UpdateRequest = 2,
    TerminationRequest = 3,
    EventRequest = 4,
}

impl TryFrom<i32> for CcRequestType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(CcRequestType::InitialRequest),
            2 => Ok(CcRequestType::UpdateRequest),
            3 => Ok(CcRequestType::TerminationRequest),
            4 => Ok(CcRequestType::EventRequest),
            other => Err(other),
        }
    }
}

/// Disconnect cause values for DPR (RFC 6733 Section 5.4.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum DisconnectCause {
    Rebooting = 0,
    Busy = 1,
    DoNotWantToTalkToYou = 2,
}

/// Vendor-Specific-Application-Id structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSpecificApplicationId {
    pub vendor_id: u32,
    pub auth_application_id: u32,
}
