//! Credit-Control request dispatch
//!
//! Sends a built CCR over an open peer connection and maps the correlated
//! CCA onto the provisioning outcome.

use ogs_diameter::{avp_code, cmd, DiameterError, DiameterMessage, PeerConnection, ResultCode};

use crate::ccr_build::CcRequest;
use crate::error::ProvisionError;

/// Send `request` and wait for its answer.
///
/// Succeeds only when the answer is a Credit-Control-Answer whose
/// Result-Code equals `success_code`. The request is validated first and
/// never sent if a mandatory AVP is missing.
pub async fn dispatch<C>(
    conn: &mut C,
    request: CcRequest,
    success_code: u32,
) -> Result<(), ProvisionError>
where
    C: PeerConnection + ?Sized,
{
    request.validate()?;

    let imsi = request.subscription_id_data().unwrap_or_default().to_string();
    let session_id = request.session_id().unwrap_or_default().to_string();
    log::debug!("[{session_id}] Sending CCR for IMSI {imsi}");

    let answer = conn
        .send_request(request.into_message())
        .await
        .map_err(exchange_error)?;

    check_answer(&answer, &session_id, success_code)?;
    log::info!("QoS updated successfully for IMSI: {imsi}");
    Ok(())
}

/// A correlated answer that failed to decode is the PCRF's fault, not the
/// link's
fn exchange_error(e: DiameterError) -> ProvisionError {
    match e {
        DiameterError::Undecodable { reason, .. } => ProvisionError::MalformedAnswer(reason),
        e => ProvisionError::Transport(e),
    }
}

/// Evaluate a received answer against the request's Session-Id
pub fn check_answer(
    answer: &DiameterMessage,
    session_id: &str,
    success_code: u32,
) -> Result<(), ProvisionError> {
    if answer.header.command_code != cmd::CREDIT_CONTROL {
        return Err(ProvisionError::ProtocolMismatch {
            actual_code: answer.header.command_code,
        });
    }

    match answer.session_id() {
        Some(sid) if sid != session_id => {
            log::warn!("[{session_id}] CCA carries a different Session-Id [{sid}]")
        }
        _ => {}
    }

    let result_code = answer
        .find_avp(avp_code::RESULT_CODE)
        .ok_or_else(|| ProvisionError::MalformedAnswer("Result-Code AVP missing".into()))?
        .as_u32()
        .ok_or_else(|| {
            ProvisionError::MalformedAnswer("Result-Code is not an Unsigned32".into())
        })?;

    if result_code != success_code {
        log::warn!(
            "[{session_id}] CCA Result-Code {result_code}{}{}",
            ResultCode::try_from(result_code)
                .map(|rc| format!(" {rc:?}"))
                .unwrap_or_default(),
            answer
                .error_message()
                .map(|m| format!(" ({m})"))
                .unwrap_or_default()
        );
        return Err(ProvisionError::PolicyRejected { result_code });
    }
    Ok(())
}
