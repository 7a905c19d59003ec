//! Diameter AVP (Attribute-Value Pair) encoding and decoding
//!
//! AVP format (RFC 6733):
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           AVP Code                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V M P r r r r r|                  AVP Length                   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Vendor-ID (opt)                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Data ...
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! An AVP is either a scalar carrying a typed value or a grouped AVP
//! carrying child AVPs. Trees are assembled with the builder methods:
//!
//! ```
//! use ogs_diameter::avp::{Avp, AvpValue};
//!
//! let sub = Avp::group(443)
//!     .with_mandatory()
//!     .child(Avp::scalar(450, AvpValue::Enumerated(1)).with_mandatory())
//!     .child(Avp::scalar(444, AvpValue::Utf8String("001010000000001".into())).with_mandatory());
//! assert_eq!(sub.children().len(), 2);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::dict::{AvpKind, Dictionary};
use crate::error::{DiameterError, DiameterResult};

/// AVP flags
pub mod avp_flags {
    /// Vendor-Specific bit
    pub const VENDOR: u8 = 0x80;
    /// Mandatory bit
    pub const MANDATORY: u8 = 0x40;
    /// Protected bit (encryption)
    pub const PROTECTED: u8 = 0x20;
}

/// AVP header size without vendor ID
pub const AVP_HEADER_SIZE: usize = 8;
/// AVP header size with vendor ID
pub const AVP_HEADER_SIZE_VENDOR: usize = 12;

/// Grouped AVPs nested deeper than this are rejected on decode
const MAX_GROUP_DEPTH: usize = 16;

/// Diameter AVP
#[derive(Debug, Clone, PartialEq)]
pub enum Avp {
    /// AVP carrying a single typed value
    Scalar {
        code: u32,
        flags: u8,
        vendor_id: Option<u32>,
        value: AvpValue,
    },
    /// AVP carrying an ordered list of child AVPs
    Grouped {
        code: u32,
        flags: u8,
        vendor_id: Option<u32>,
        children: Vec<Avp>,
    },
}

/// Scalar AVP data types
#[derive(Debug, Clone, PartialEq)]
pub enum AvpValue {
    /// OctetString
    OctetString(Bytes),
    /// Integer32
    Integer32(i32),
    /// Integer64
    Integer64(i64),
    /// Unsigned32
    Unsigned32(u32),
    /// Unsigned64
    Unsigned64(u64),
    /// Float32
    Float32(f32),
    /// Float64
    Float64(f64),
    /// Address (IPv4 or IPv6)
    Address(IpAddr),
    /// UTF8String
    Utf8String(String),
    /// DiameterIdentity (FQDN)
    DiameterIdentity(String),
    /// DiameterURI
    DiameterUri(String),
    /// Time (seconds since Jan 1, 1900)
    Time(u32),
    /// Enumerated (same as Integer32)
    Enumerated(i32),
    /// Raw bytes (unknown code or undecodable payload)
    Raw(Bytes),
}

impl Avp {
    /// Create a scalar AVP with no flags set
    pub fn scalar(code: u32, value: AvpValue) -> Self {
        Avp::Scalar {
            code,
            flags: 0,
            vendor_id: None,
            value,
        }
    }

    /// Create an empty grouped AVP with no flags set
    pub fn group(code: u32) -> Self {
        Avp::Grouped {
            code,
            flags: 0,
            vendor_id: None,
            children: Vec::new(),
        }
    }

    /// Create a mandatory scalar AVP
    pub fn mandatory(code: u32, value: AvpValue) -> Self {
        Self::scalar(code, value).with_mandatory()
    }

    /// Create a vendor-specific mandatory scalar AVP
    pub fn vendor_mandatory(code: u32, vendor_id: u32, value: AvpValue) -> Self {
        Self::scalar(code, value).with_mandatory().vendor(vendor_id)
    }

    /// Set the M-bit
    pub fn with_mandatory(mut self) -> Self {
        *self.flags_mut() |= avp_flags::MANDATORY;
        self
    }

    /// Set the V-bit and the Vendor-Id header field
    pub fn vendor(mut self, vendor_id: u32) -> Self {
        *self.flags_mut() |= avp_flags::VENDOR;
        match &mut self {
            Avp::Scalar { vendor_id: v, .. } | Avp::Grouped { vendor_id: v, .. } => {
                *v = Some(vendor_id)
            }
        }
        self
    }

    /// Append a child to a grouped AVP. Has no effect on a scalar AVP.
    pub fn child(mut self, avp: Avp) -> Self {
        if let Avp::Grouped { children, .. } = &mut self {
            children.push(avp);
        }
        self
    }

    /// AVP code
    pub fn code(&self) -> u32 {
        match self {
            Avp::Scalar { code, .. } | Avp::Grouped { code, .. } => *code,
        }
    }

    /// AVP flags
    pub fn flags(&self) -> u8 {
        match self {
            Avp::Scalar { flags, .. } | Avp::Grouped { flags, .. } => *flags,
        }
    }

    fn flags_mut(&mut self) -> &mut u8 {
        match self {
            Avp::Scalar { flags, .. } | Avp::Grouped { flags, .. } => flags,
        }
    }

    /// Vendor ID (if vendor-specific)
    pub fn vendor_id(&self) -> Option<u32> {
        match self {
            Avp::Scalar { vendor_id, .. } | Avp::Grouped { vendor_id, .. } => *vendor_id,
        }
    }

    /// Check if AVP is vendor-specific
    pub fn is_vendor_specific(&self) -> bool {
        self.flags() & avp_flags::VENDOR != 0
    }

    /// Check if AVP is mandatory
    pub fn is_mandatory(&self) -> bool {
        self.flags() & avp_flags::MANDATORY != 0
    }

    /// Scalar value, `None` for grouped AVPs
    pub fn value(&self) -> Option<&AvpValue> {
        match self {
            Avp::Scalar { value, .. } => Some(value),
            Avp::Grouped { .. } => None,
        }
    }

    /// Child AVPs, empty for scalar AVPs
    pub fn children(&self) -> &[Avp] {
        match self {
            Avp::Grouped { children, .. } => children,
            Avp::Scalar { .. } => &[],
        }
    }

    fn header_len(&self) -> usize {
        if self.vendor_id().is_some() {
            AVP_HEADER_SIZE_VENDOR
        } else {
            AVP_HEADER_SIZE
        }
    }

    fn data_len(&self) -> usize {
        match self {
            Avp::Scalar { value, .. } => value.encoded_len(),
            Avp::Grouped { children, .. } => children.iter().map(Avp::encoded_len).sum(),
        }
    }

    /// Get the encoded length of this AVP (including padding)
    pub fn encoded_len(&self) -> usize {
        (self.header_len() + self.data_len() + 3) & !3
    }

    /// Encode AVP to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        let data_len = self.data_len();
        let avp_len = self.header_len() + data_len;

        buf.put_u32(self.code());

        // The V-bit tracks the presence of the Vendor-Id field
        let mut flags = self.flags() & !avp_flags::VENDOR;
        if self.vendor_id().is_some() {
            flags |= avp_flags::VENDOR;
        }
        buf.put_u8(flags);
        buf.put_u8(((avp_len >> 16) & 0xFF) as u8);
        buf.put_u16((avp_len & 0xFFFF) as u16);

        if let Some(vendor_id) = self.vendor_id() {
            buf.put_u32(vendor_id);
        }

        match self {
            Avp::Scalar { value, .. } => value.encode(buf),
            Avp::Grouped { children, .. } => {
                for avp in children {
                    avp.encode(buf);
                }
            }
        }

        let padding = (4 - (data_len % 4)) % 4;
        buf.put_bytes(0, padding);
    }

    /// Decode AVP from bytes, resolving types through the dictionary
    pub fn decode(buf: &mut Bytes, dict: &Dictionary) -> DiameterResult<Self> {
        Self::decode_at_depth(buf, dict, 0)
    }

    fn decode_at_depth(buf: &mut Bytes, dict: &Dictionary, depth: usize) -> DiameterResult<Self> {
        if buf.remaining() < AVP_HEADER_SIZE {
            return Err(DiameterError::BufferTooSmall {
                needed: AVP_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        let code = buf.get_u32();
        let flags = buf.get_u8();
        let len_high = buf.get_u8() as usize;
        let len_low = buf.get_u16() as usize;
        let avp_len = (len_high << 16) | len_low;

        let is_vendor = flags & avp_flags::VENDOR != 0;
        let header_len = if is_vendor {
            AVP_HEADER_SIZE_VENDOR
        } else {
            AVP_HEADER_SIZE
        };

        if avp_len < header_len {
            return Err(DiameterError::InvalidAvp(format!(
                "AVP {code} length {avp_len} is less than header size {header_len}"
            )));
        }

        let vendor_id = if is_vendor {
            if buf.remaining() < 4 {
                return Err(DiameterError::BufferTooSmall {
                    needed: 4,
                    available: buf.remaining(),
                });
            }
            Some(buf.get_u32())
        } else {
            None
        };

        let data_len = avp_len - header_len;
        if buf.remaining() < data_len {
            return Err(DiameterError::BufferTooSmall {
                needed: data_len,
                available: buf.remaining(),
            });
        }
        let mut data = buf.copy_to_bytes(data_len);

        let padding = (4 - (data_len % 4)) % 4;
        buf.advance(padding.min(buf.remaining()));

        let kind = dict.lookup(code, vendor_id.unwrap_or(0)).map(|def| def.kind);
        if kind == Some(AvpKind::Grouped) {
            if depth >= MAX_GROUP_DEPTH {
                return Err(DiameterError::InvalidAvp(format!(
                    "AVP {code} exceeds grouping depth {MAX_GROUP_DEPTH}"
                )));
            }
            let mut children = Vec::new();
            while data.has_remaining() {
                children.push(Self::decode_at_depth(&mut data, dict, depth + 1)?);
            }
            return Ok(Avp::Grouped {
                code,
                flags,
                vendor_id,
                children,
            });
        }

        let value = match kind {
            Some(kind) => AvpValue::decode(kind, data),
            None => AvpValue::Raw(data),
        };
        Ok(Avp::Scalar {
            code,
            flags,
            vendor_id,
            value,
        })
    }

    /// Get data as OctetString
    pub fn as_octet_string(&self) -> Option<&Bytes> {
        match self.value()? {
            AvpValue::OctetString(b) | AvpValue::Raw(b) => Some(b),
            _ => None,
        }
    }

    /// Get data as Unsigned32
    ///
    /// Raw payloads are accepted only when exactly four octets long.
    pub fn as_u32(&self) -> Option<u32> {
        match self.value()? {
            AvpValue::Unsigned32(v) | AvpValue::Time(v) => Some(*v),
            AvpValue::Raw(b) if b.len() == 4 => Some(b.clone().get_u32()),
            _ => None,
        }
    }

    /// Get data as Unsigned64
    pub fn as_u64(&self) -> Option<u64> {
        match self.value()? {
            AvpValue::Unsigned64(v) => Some(*v),
            AvpValue::Raw(b) if b.len() == 8 => Some(b.clone().get_u64()),
            _ => None,
        }
    }

    /// Get data as Integer32 or Enumerated
    pub fn as_i32(&self) -> Option<i32> {
        match self.value()? {
            AvpValue::Integer32(v) | AvpValue::Enumerated(v) => Some(*v),
            AvpValue::Raw(b) if b.len() == 4 => Some(b.clone().get_i32()),
            _ => None,
        }
    }

    /// Get data as UTF8String, DiameterIdentity or DiameterURI
    pub fn as_utf8_string(&self) -> Option<&str> {
        match self.value()? {
            AvpValue::Utf8String(s) | AvpValue::DiameterIdentity(s) | AvpValue::DiameterUri(s) => {
                Some(s)
            }
            AvpValue::Raw(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Get data as Address
    pub fn as_address(&self) -> Option<IpAddr> {
        match self.value()? {
            AvpValue::Address(addr) => Some(*addr),
            AvpValue::Raw(b) => decode_address(b),
            _ => None,
        }
    }

    /// Find a direct child by code
    pub fn find(&self, code: u32) -> Option<&Avp> {
        find_avp(self.children(), code)
    }

    /// Find a direct child by code and vendor ID
    pub fn find_vendor(&self, code: u32, vendor_id: u32) -> Option<&Avp> {
        find_vendor_avp(self.children(), code, vendor_id)
    }
}

impl AvpValue {
    /// Get the encoded length of this data (without padding)
    pub fn encoded_len(&self) -> usize {
        match self {
            AvpValue::OctetString(b) | AvpValue::Raw(b) => b.len(),
            AvpValue::Integer32(_)
            | AvpValue::Unsigned32(_)
            | AvpValue::Enumerated(_)
            | AvpValue::Float32(_)
            | AvpValue::Time(_) => 4,
            AvpValue::Integer64(_) | AvpValue::Unsigned64(_) | AvpValue::Float64(_) => 8,
            AvpValue::Address(IpAddr::V4(_)) => 6,
            AvpValue::Address(IpAddr::V6(_)) => 18,
            AvpValue::Utf8String(s) | AvpValue::DiameterIdentity(s) | AvpValue::DiameterUri(s) => {
                s.len()
            }
        }
    }

    /// Encode data to bytes
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            AvpValue::OctetString(b) | AvpValue::Raw(b) => buf.put_slice(b),
            AvpValue::Integer32(v) | AvpValue::Enumerated(v) => buf.put_i32(*v),
            AvpValue::Integer64(v) => buf.put_i64(*v),
            AvpValue::Unsigned32(v) | AvpValue::Time(v) => buf.put_u32(*v),
            AvpValue::Unsigned64(v) => buf.put_u64(*v),
            AvpValue::Float32(v) => buf.put_f32(*v),
            AvpValue::Float64(v) => buf.put_f64(*v),
            AvpValue::Address(IpAddr::V4(v4)) => {
                buf.put_u16(1);
                buf.put_slice(&v4.octets());
            }
            AvpValue::Address(IpAddr::V6(v6)) => {
                buf.put_u16(2);
                buf.put_slice(&v6.octets());
            }
            AvpValue::Utf8String(s) | AvpValue::DiameterIdentity(s) | AvpValue::DiameterUri(s) => {
                buf.put_slice(s.as_bytes())
            }
        }
    }

    /// Decode a payload of the given dictionary type.
    ///
    /// Payloads that do not fit the declared type are kept as `Raw`.
    pub fn decode(kind: AvpKind, data: Bytes) -> Self {
        let mut b = data.clone();
        match (kind, data.len()) {
            (AvpKind::Integer32, 4) => AvpValue::Integer32(b.get_i32()),
            (AvpKind::Enumerated, 4) => AvpValue::Enumerated(b.get_i32()),
            (AvpKind::Unsigned32, 4) => AvpValue::Unsigned32(b.get_u32()),
            (AvpKind::Time, 4) => AvpValue::Time(b.get_u32()),
            (AvpKind::Float32, 4) => AvpValue::Float32(b.get_f32()),
            (AvpKind::Integer64, 8) => AvpValue::Integer64(b.get_i64()),
            (AvpKind::Unsigned64, 8) => AvpValue::Unsigned64(b.get_u64()),
            (AvpKind::Float64, 8) => AvpValue::Float64(b.get_f64()),
            (AvpKind::OctetString, _) => AvpValue::OctetString(data),
            (AvpKind::Address, _) => match decode_address(&data) {
                Some(addr) => AvpValue::Address(addr),
                None => AvpValue::Raw(data),
            },
            (AvpKind::Utf8String | AvpKind::DiameterIdentity | AvpKind::DiameterUri, _) => {
                match String::from_utf8(data.to_vec()) {
                    Ok(s) if kind == AvpKind::Utf8String => AvpValue::Utf8String(s),
                    Ok(s) if kind == AvpKind::DiameterIdentity => AvpValue::DiameterIdentity(s),
                    Ok(s) => AvpValue::DiameterUri(s),
                    Err(_) => AvpValue::Raw(data),
                }
            }
            _ => AvpValue::Raw(data),
        }
    }
}

fn decode_address(b: &Bytes) -> Option<IpAddr> {
    let mut buf = b.clone();
    if buf.remaining() < 2 {
        return None;
    }
    match (buf.get_u16(), buf.remaining()) {
        (1, 4) => {
            let octets: [u8; 4] = [buf.get_u8(), buf.get_u8(), buf.get_u8(), buf.get_u8()];
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        (2, 16) => {
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Helper to find an AVP by code in a list
pub fn find_avp(avps: &[Avp], code: u32) -> Option<&Avp> {
    avps.iter().find(|a| a.code() == code)
}

/// Helper to find an AVP by code and vendor ID in a list
pub fn find_vendor_avp(avps: &[Avp], code: u32, vendor_id: u32) -> Option<&Avp> {
    avps.iter()
        .find(|a| a.code() == code && a.vendor_id() == Some(vendor_id))
}

/// Helper to find all AVPs with a given code
pub fn find_all_avps(avps: &[Avp], code: u32) -> Vec<&Avp> {
    avps.iter().filter(|a| a.code() == code).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::avp_code;

    fn round_trip(avp: &Avp) -> Avp {
        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        assert_eq!(buf.len(), avp.encoded_len());
        let mut bytes = buf.freeze();
        let decoded = Avp::decode(&mut bytes, &Dictionary::base()).unwrap();
        assert!(!bytes.has_remaining());
        decoded
    }

    #[test]
    fn test_avp_encode_decode_u32() {
        let avp = Avp::mandatory(avp_code::RESULT_CODE, AvpValue::Unsigned32(2001));
        let decoded = round_trip(&avp);

        assert_eq!(decoded.code(), 268);
        assert_eq!(decoded.as_u32(), Some(2001));
        assert_eq!(decoded, avp);
    }

    #[test]
    fn test_avp_encode_decode_string() {
        let avp = Avp::mandatory(avp_code::SESSION_ID, AvpValue::Utf8String("test-session".into()));
        let decoded = round_trip(&avp);

        assert_eq!(decoded.code(), 263);
        assert_eq!(decoded.as_utf8_string(), Some("test-session"));
    }

    #[test]
    fn test_avp_padding() {
        let avp = Avp::mandatory(avp_code::SESSION_ID, AvpValue::Utf8String("abcde".into()));
        // 8 header + 5 data, padded to 16
        assert_eq!(avp.encoded_len(), 16);

        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        // Length field excludes padding
        assert_eq!(&buf[5..8], &[0, 0, 13]);
        assert_eq!(&buf[13..16], &[0, 0, 0]);
    }

    #[test]
    fn test_avp_vendor_specific() {
        let avp = Avp::vendor_mandatory(1032, 10415, AvpValue::Enumerated(1004));
        assert!(avp.is_vendor_specific());
        assert!(avp.is_mandatory());
        assert_eq!(avp.vendor_id(), Some(10415));
        assert_eq!(avp.encoded_len(), 16);
    }

    #[test]
    fn test_grouped_round_trip() {
        let avp = Avp::group(avp_code::SUBSCRIPTION_ID)
            .with_mandatory()
            .child(Avp::mandatory(avp_code::SUBSCRIPTION_ID_TYPE, AvpValue::Enumerated(1)))
            .child(Avp::mandatory(
                avp_code::SUBSCRIPTION_ID_DATA,
                AvpValue::Utf8String("460010000000001".into()),
            ));

        let decoded = round_trip(&avp);
        assert_eq!(decoded, avp);
        assert_eq!(
            decoded.find(avp_code::SUBSCRIPTION_ID_DATA).and_then(Avp::as_utf8_string),
            Some("460010000000001")
        );
        assert_eq!(decoded.find(avp_code::SUBSCRIPTION_ID_TYPE).and_then(Avp::as_i32), Some(1));
    }

    #[test]
    fn test_unknown_code_decodes_raw() {
        let avp = Avp::mandatory(9999, AvpValue::Unsigned32(7));
        let decoded = round_trip(&avp);
        assert!(matches!(decoded.value(), Some(AvpValue::Raw(_))));
        assert_eq!(decoded.as_u32(), Some(7));
    }

    #[test]
    fn test_wrong_width_stays_raw() {
        // Result-Code carrying eight octets is not an Unsigned32
        let avp = Avp::mandatory(avp_code::RESULT_CODE, AvpValue::Unsigned64(2001));
        let decoded = round_trip(&avp);
        assert!(matches!(decoded.value(), Some(AvpValue::Raw(_))));
        assert_eq!(decoded.as_u32(), None);
    }

    #[test]
    fn test_address_round_trip() {
        let addr: IpAddr = "10.0.0.1".parse().unwrap();
        let avp = Avp::mandatory(avp_code::HOST_IP_ADDRESS, AvpValue::Address(addr));
        assert_eq!(round_trip(&avp).as_address(), Some(addr));
    }

    #[test]
    fn test_truncated_avp() {
        let avp = Avp::mandatory(avp_code::SESSION_ID, AvpValue::Utf8String("session;1".into()));
        let mut buf = BytesMut::new();
        avp.encode(&mut buf);
        let mut bytes = buf.freeze().slice(0..10);
        assert!(matches!(
            Avp::decode(&mut bytes, &Dictionary::base()),
            Err(DiameterError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_child_on_scalar_is_ignored() {
        let avp = Avp::mandatory(avp_code::RESULT_CODE, AvpValue::Unsigned32(2001))
            .child(Avp::mandatory(avp_code::VENDOR_ID, AvpValue::Unsigned32(1)));
        assert!(avp.children().is_empty());
    }

    #[test]
    fn test_find_all_avps() {
        let avps = vec![
            Avp::mandatory(avp_code::AUTH_APPLICATION_ID, AvpValue::Unsigned32(4)),
            Avp::mandatory(avp_code::VENDOR_ID, AvpValue::Unsigned32(10415)),
            Avp::mandatory(avp_code::AUTH_APPLICATION_ID, AvpValue::Unsigned32(101)),
        ];
        let ids: Vec<u32> = find_all_avps(&avps, avp_code::AUTH_APPLICATION_ID)
            .into_iter()
            .filter_map(Avp::as_u32)
            .collect();
        assert_eq!(ids, vec![4, 101]);
        assert!(find_all_avps(&avps, avp_code::RESULT_CODE).is_empty());
    }
}
