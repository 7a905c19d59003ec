//! NextGCore Diameter Protocol Library
//!
//! This crate provides the Diameter base protocol pieces needed by
//! credit-control clients:
//! - AVP model (scalar and grouped) with wire encoding and decoding
//! - AVP dictionary used to decode received AVPs into typed values
//! - Message header and message codec
//! - TCP transport, peer state machine (CER/CEA, DWR/DWA, DPR/DPA)
//! - Request/answer client with Hop-by-Hop/End-to-End correlation
//!
//! The implementation follows RFC 6733 (Diameter Base Protocol) and
//! RFC 4006 (Diameter Credit-Control Application).

pub mod common;
pub mod avp;
pub mod dict;
pub mod message;
pub mod error;
pub mod config;
pub mod transport;
pub mod peer;
pub mod client;

pub use common::*;
pub use avp::*;
pub use dict::*;
pub use message::*;
pub use error::*;
pub use config::*;
pub use transport::*;
pub use peer::*;
pub use client::*;

/// 3GPP Vendor ID
pub const OGS_3GPP_VENDOR_ID: u32 = 10415;

/// Diameter protocol version
pub const DIAMETER_VERSION: u8 = 1;

/// Default Diameter port
pub const DIAMETER_PORT: u16 = 3868;
