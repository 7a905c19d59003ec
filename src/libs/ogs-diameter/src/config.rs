//! Diameter configuration types

use std::time::Duration;

use crate::common::VendorSpecificApplicationId;

/// Diameter configuration of the local node
#[derive(Debug, Clone)]
pub struct DiameterConfig {
    /// Diameter Identity of the local peer (FQDN)
    pub diameter_id: String,

    /// Diameter realm of the local peer
    pub diameter_realm: String,

    /// Product-Name advertised in CER/CEA
    pub product_name: String,

    /// Vendor-Id advertised in CER/CEA
    pub vendor_id: u32,

    /// Applications advertised in CER/CEA
    pub applications: Vec<VendorSpecificApplicationId>,

    /// Tc timer, seconds. A DWR is sent when nothing has been received for
    /// this long while an answer is outstanding
    pub timer_tc: u32,

    /// Upper bound for TCP connect plus capabilities exchange
    pub connect_timeout: Duration,

    /// Upper bound for an answer to arrive after a request was sent
    pub answer_timeout: Duration,
}

impl Default for DiameterConfig {
    fn default() -> Self {
        Self {
            diameter_id: String::new(),
            diameter_realm: String::new(),
            product_name: "NextGCore".to_string(),
            vendor_id: 0,
            applications: Vec::new(),
            timer_tc: 30,
            connect_timeout: Duration::from_secs(5),
            answer_timeout: Duration::from_secs(10),
        }
    }
}

impl DiameterConfig {
    /// Watchdog interval derived from Tc, never shorter than one second
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.timer_tc.max(1)))
    }
}
