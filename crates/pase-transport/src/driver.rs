//! Runs a PASE session to completion over an [`Exchange`].

use pase_core::{PaseSession, Payload, Role, SessionKeys, StatusReport, Step};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{Error, Exchange, Result};

/// Drive `session` until it is established or fails.
///
/// The initiator sends its PBKDFParamRequest first. Each wait for a peer
/// message is bounded by the session's `handshake_timeout`. On timeout or
/// peer close the session is aborted; an undecodable frame fails it with
/// `InvalidParameter`. On a local failure the failure StatusReport is sent
/// best-effort before the error is returned.
pub async fn establish<E>(session: &mut PaseSession, exchange: &E) -> Result<SessionKeys>
where
    E: Exchange + ?Sized,
{
    let wait = session.config().handshake_timeout;

    if session.role() == Role::Initiator {
        let request = session.start()?;
        if let Err(e) = exchange.send(request).await {
            session.abort(format!("send failed: {}", e));
            return Err(e);
        }
    }

    loop {
        let message = match timeout(wait, exchange.recv()).await {
            Ok(Ok(Some(message))) => message,
            Ok(Ok(None)) => {
                session.abort("peer closed the exchange");
                return Err(Error::ConnectionClosed);
            }
            Ok(Err(e)) => {
                match &e {
                    Error::Protocol(pase_core::Error::Decode(_)) | Error::FrameTooLarge(_) => {
                        session.reject_frame(e.to_string())
                    }
                    _ => session.abort(format!("receive failed: {}", e)),
                }
                send_failure_report(session.failure_report().cloned(), exchange).await;
                return Err(e);
            }
            Err(_) => {
                session.abort("handshake timed out");
                send_failure_report(session.failure_report().cloned(), exchange).await;
                return Err(Error::Timeout(wait));
            }
        };

        let step = match session.handle_message(&message) {
            Ok(step) => step,
            Err(e) => {
                send_failure_report(session.failure_report().cloned(), exchange).await;
                return Err(e.into());
            }
        };

        match step {
            Step::Send(reply) => {
                if let Err(e) = exchange.send(reply).await {
                    session.abort(format!("send failed: {}", e));
                    return Err(e);
                }
            }
            Step::SendAndComplete(reply) => {
                // The local side is established either way; a lost final
                // report surfaces as a failure on the peer.
                if let Err(e) = exchange.send(reply).await {
                    warn!(error = %e, "failed to send final StatusReport");
                }
                return finished(session);
            }
            Step::Complete => return finished(session),
        }
    }
}

fn finished(session: &PaseSession) -> Result<SessionKeys> {
    let keys = session
        .keys()
        .cloned()
        .ok_or(pase_core::Error::InvalidState("established without keys"))?;

    info!(
        role = ?keys.role,
        local_session_id = keys.local_session_id,
        peer_session_id = keys.peer_session_id,
        "PASE exchange complete"
    );
    Ok(keys)
}

async fn send_failure_report<E>(report: Option<StatusReport>, exchange: &E)
where
    E: Exchange + ?Sized,
{
    let Some(report) = report else {
        return;
    };

    match exchange.send(report.to_message()).await {
        Ok(()) => debug!(
            protocol_code = report.protocol_code,
            "sent failure StatusReport"
        ),
        Err(e) => debug!(error = %e, "failure StatusReport not delivered"),
    }
}
