//! Diameter error types

use std::time::Duration;

use thiserror::Error;

use crate::message::DiameterHeader;

/// Diameter error type
#[derive(Error, Debug)]
pub enum DiameterError {
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Invalid AVP: {0}")]
    InvalidAvp(String),

    #[error("Missing mandatory AVP: {0}")]
    MissingAvp(String),

    #[error("Buffer too small: need {needed}, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A complete frame arrived but its AVPs could not be decoded. The
    /// stream stays in sync, so the connection remains usable.
    #[error("Undecodable message (command {}): {reason}", .header.command_code)]
    Undecodable {
        header: DiameterHeader,
        reason: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Capabilities exchange rejected with Result-Code {0}")]
    CapabilitiesRejected(u32),

    #[error("No answer within {0:?}")]
    Timeout(Duration),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiameterError {
    /// Whether the connection can no longer be used after this error
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(self, DiameterError::Undecodable { .. })
    }
}

/// Diameter result type
pub type DiameterResult<T> = Result<T, DiameterError>;

/// Diameter Result-Code values used by the base protocol (RFC 6733)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ResultCode {
    Success = 2001,
    LimitedSuccess = 2002,
    UnableToDeliver = 3002,
    TooBusy = 3004,
    NoCommonApplication = 5010,
    UnableToComply = 5012,
}

impl ResultCode {
    /// Check if a raw result code is in the success class (2xxx)
    pub fn is_success_code(code: u32) -> bool {
        (2000..3000).contains(&code)
    }
}

impl TryFrom<u32> for ResultCode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            2001 => ResultCode::Success,
            2002 => ResultCode::LimitedSuccess,
            3002 => ResultCode::UnableToDeliver,
            3004 => ResultCode::TooBusy,
            5010 => ResultCode::NoCommonApplication,
            5012 => ResultCode::UnableToComply,
            other => return Err(other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_class() {
        assert!(ResultCode::is_success_code(ResultCode::Success as u32));
        assert!(ResultCode::is_success_code(ResultCode::LimitedSuccess as u32));
        assert!(!ResultCode::is_success_code(ResultCode::TooBusy as u32));
        assert!(!ResultCode::is_success_code(ResultCode::UnableToComply as u32));
    }

    #[test]
    fn test_result_code_from_u32() {
        assert_eq!(ResultCode::try_from(5012), Ok(ResultCode::UnableToComply));
        assert_eq!(ResultCode::try_from(2001), Ok(ResultCode::Success));
        assert_eq!(ResultCode::try_from(9999), Err(9999));
    }

    #[test]
    fn test_undecodable_keeps_connection() {
        let err = DiameterError::Undecodable {
            header: DiameterHeader::new_request(272, 4),
            reason: "truncated AVP".into(),
        };
        assert!(!err.is_connection_fatal());
        assert_eq!(
            err.to_string(),
            "Undecodable message (command 272): truncated AVP"
        );
        assert!(DiameterError::ConnectionClosed.is_connection_fatal());
    }
}
