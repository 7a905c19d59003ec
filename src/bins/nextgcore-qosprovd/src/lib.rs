//! NextGCore QoS provisioning client library
//!
//! Provisions QoS policy for mobile subscribers at a PCRF using Diameter
//! Credit-Control:
//! - CCR construction carrying the subscriber and a vendor-private QoS payload
//! - Dispatch over an open peer connection and CCA evaluation
//! - Sequential provisioning of a subscriber list with per-subscriber outcomes

pub mod ccr_build;
pub mod ccr_path;
pub mod context;
pub mod error;
pub mod profile;
pub mod provision;

#[cfg(test)]
mod property_tests;
#[cfg(test)]
mod test_util;

// Re-export commonly used types
pub use ccr_build::{CcRequest, CcrBuilder, CcrSettings, RandomSource, ThreadRandom};
pub use ccr_path::{check_answer, dispatch};
pub use context::{ConfigError, QosAvpCodes, QosprovConfig, RequestType};
pub use error::ProvisionError;
pub use profile::{Imsi, ProfileError, QosProfile};
pub use provision::{provision_all, ProvisionOutcome, ProvisionReport};
