//! QoS profile and subscriber identity value types

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Shortest IMSI accepted (MCC + 2-digit MNC + 1-digit MSIN)
const IMSI_MIN_DIGITS: usize = 6;
/// Longest IMSI allowed by 3GPP TS 23.003
const IMSI_MAX_DIGITS: usize = 15;

/// Profile and identity validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("invalid IMSI '{0}': expected 6 to 15 decimal digits")]
    InvalidImsi(String),

    #[error("profile '{name}': guaranteed {direction} bit rate {guaranteed} kbps exceeds maximum {maximum} kbps")]
    GuaranteedExceedsMaximum {
        name: String,
        direction: &'static str,
        guaranteed: u32,
        maximum: u32,
    },
}

/// QoS profile applied to a subscriber. Bandwidths are in kbit/s.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QosProfile {
    pub name: String,
    pub max_bandwidth_dl: u32,
    pub max_bandwidth_ul: u32,
    pub guaranteed_bitrate_dl: u32,
    pub guaranteed_bitrate_ul: u32,
}

impl QosProfile {
    /// The "HighPriority" profile: 10 Mbps / 5 Mbps maximum,
    /// 512 kbps / 256 kbps guaranteed
    pub fn high_priority() -> Self {
        Self {
            name: "HighPriority".to_string(),
            max_bandwidth_dl: 10240,
            max_bandwidth_ul: 5120,
            guaranteed_bitrate_dl: 512,
            guaranteed_bitrate_ul: 256,
        }
    }

    /// Check that no guaranteed bit rate exceeds the maximum for its direction
    pub fn validate(&self) -> Result<(), ProfileError> {
        let checks = [
            ("downlink", self.guaranteed_bitrate_dl, self.max_bandwidth_dl),
            ("uplink", self.guaranteed_bitrate_ul, self.max_bandwidth_ul),
        ];
        for (direction, guaranteed, maximum) in checks {
            if guaranteed > maximum {
                return Err(ProfileError::GuaranteedExceedsMaximum {
                    name: self.name.clone(),
                    direction,
                    guaranteed,
                    maximum,
                });
            }
        }
        Ok(())
    }
}

/// International Mobile Subscriber Identity, validated to be all digits
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Imsi(String);

impl Imsi {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Imsi {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let valid = (IMSI_MIN_DIGITS..=IMSI_MAX_DIGITS).contains(&s.len())
            && s.bytes().all(|b| b.is_ascii_digit());
        if valid {
            Ok(Imsi(s.to_string()))
        } else {
            Err(ProfileError::InvalidImsi(s.to_string()))
        }
    }
}

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_priority_is_consistent() {
        let profile = QosProfile::high_priority();
        assert_eq!(profile.max_bandwidth_dl, 10240);
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_default_profile_is_consistent() {
        assert!(QosProfile::default().validate().is_ok());
    }

    #[test]
    fn test_guaranteed_above_maximum_rejected() {
        let profile = QosProfile {
            guaranteed_bitrate_ul: 6000,
            ..QosProfile::high_priority()
        };
        assert_eq!(
            profile.validate(),
            Err(ProfileError::GuaranteedExceedsMaximum {
                name: "HighPriority".to_string(),
                direction: "uplink",
                guaranteed: 6000,
                maximum: 5120,
            })
        );
    }

    #[test]
    fn test_imsi_parse() {
        let imsi: Imsi = "460010000000001".parse().unwrap();
        assert_eq!(imsi.as_str(), "460010000000001");
        assert_eq!(imsi.to_string(), "460010000000001");

        assert!(" 001010123456789 ".parse::<Imsi>().is_ok());
        assert!("4600100000000011".parse::<Imsi>().is_err());
        assert!("46001".parse::<Imsi>().is_err());
        assert!("46001000000000a".parse::<Imsi>().is_err());
        assert!("".parse::<Imsi>().is_err());
    }

    #[test]
    fn test_profile_deserialize() {
        let yaml = "name: Gold\nmax_bandwidth_dl: 2048\nmax_bandwidth_ul: 1024\n\
                    guaranteed_bitrate_dl: 128\nguaranteed_bitrate_ul: 64\n";
        let profile: QosProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile.name, "Gold");
        assert_eq!(profile.guaranteed_bitrate_ul, 64);

        let negative = yaml.replace("64", "-64");
        assert!(serde_yaml::from_str::<QosProfile>(&negative).is_err());
    }
}
