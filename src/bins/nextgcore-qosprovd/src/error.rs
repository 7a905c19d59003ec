//! Provisioning error taxonomy

use ogs_diameter::DiameterError;
use thiserror::Error;

/// Failure of a provisioning step.
///
/// `Connection` is fatal for a whole run; every other variant is local to
/// one subscriber's request.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("failed to connect to PCRF: {0}")]
    Connection(#[source] DiameterError),

    #[error("failed to send CCR message: {0}")]
    Transport(#[source] DiameterError),

    #[error("unexpected response code: {actual_code}")]
    ProtocolMismatch { actual_code: u32 },

    #[error("malformed answer: {0}")]
    MalformedAnswer(String),

    #[error("QoS update failed with result code: {result_code}")]
    PolicyRejected { result_code: u32 },

    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

impl ProvisionError {
    /// Short machine-friendly name of the failure kind
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::Connection(_) => "connection",
            ProvisionError::Transport(_) => "transport",
            ProvisionError::ProtocolMismatch { .. } => "protocol-mismatch",
            ProvisionError::MalformedAnswer(_) => "malformed-answer",
            ProvisionError::PolicyRejected { .. } => "policy-rejected",
            ProvisionError::MalformedRequest(_) => "malformed-request",
        }
    }
}
