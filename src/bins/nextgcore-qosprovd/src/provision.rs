//! Provisioning run over a subscriber list

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use ogs_diameter::PeerConnection;

use crate::ccr_build::{CcrBuilder, RandomSource};
use crate::ccr_path::dispatch;
use crate::error::ProvisionError;
use crate::profile::{Imsi, QosProfile};

/// Result for one subscriber
#[derive(Debug)]
pub struct ProvisionOutcome {
    pub imsi: Imsi,
    pub result: Result<(), ProvisionError>,
}

impl ProvisionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl fmt::Display for ProvisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(()) => write!(f, "QoS updated successfully for IMSI: {}", self.imsi),
            Err(e) => write!(f, "Failed to set QoS for IMSI {}: {}", self.imsi, e),
        }
    }
}

/// Outcomes of a run, in subscriber order
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub outcomes: Vec<ProvisionOutcome>,
    /// Set when a shutdown request stopped the run early
    pub interrupted: bool,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Provision `profile` for each subscriber in turn over one connection.
///
/// A failure for one subscriber is recorded and the run moves on to the
/// next. `shutdown` is checked before each subscriber; `on_outcome` sees
/// every outcome as soon as it is known.
pub async fn provision_all<C, R, F>(
    conn: &mut C,
    builder: &mut CcrBuilder<R>,
    profile: &QosProfile,
    subscribers: &[Imsi],
    success_code: u32,
    shutdown: &AtomicBool,
    mut on_outcome: F,
) -> ProvisionReport
where
    C: PeerConnection + ?Sized,
    R: RandomSource,
    F: FnMut(&ProvisionOutcome),
{
    let mut report = ProvisionReport::default();

    for (idx, imsi) in subscribers.iter().enumerate() {
        if shutdown.load(Ordering::SeqCst) {
            log::info!(
                "Shutdown requested, {} subscriber(s) left unprovisioned",
                subscribers.len() - idx
            );
            report.interrupted = true;
            break;
        }

        let request = builder.build(imsi, profile);
        let result = dispatch(conn, request, success_code).await;
        if let Err(e) = &result {
            log::error!("Failed to set QoS for IMSI {imsi}: {e}");
        }

        let outcome = ProvisionOutcome {
            imsi: imsi.clone(),
            result,
        };
        on_outcome(&outcome);
        report.outcomes.push(outcome);
    }

    report
}
