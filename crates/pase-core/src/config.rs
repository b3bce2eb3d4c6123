//! Handshake configuration.

use std::time::Duration;

use crate::message::SessionParameters;
use crate::{Error, Result};

/// Default passcode id.
pub const DEFAULT_PASSCODE_ID: u16 = 0;

/// PASE session establishment timeout.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default MRP idle retransmission interval (ms).
pub const DEFAULT_IDLE_RETRANS_TIMEOUT_MS: u32 = 500;
/// Default MRP active retransmission interval (ms).
pub const DEFAULT_ACTIVE_RETRANS_TIMEOUT_MS: u32 = 300;
/// Default MRP active threshold (ms).
pub const DEFAULT_ACTIVE_THRESHOLD_MS: u16 = 4000;

// MRP intervals above one hour are rejected
const MAX_RETRANS_TIMEOUT_MS: u32 = 3_600_000;

/// PASE session configuration.
#[derive(Debug, Clone)]
pub struct PaseConfig {
    /// Passcode id sent in PBKDFParamRequest.
    pub passcode_id: u16,
    /// MRP parameters advertised to the peer.
    pub local_session_parameters: SessionParameters,
    /// Upper bound on waiting for each peer message.
    pub handshake_timeout: Duration,
    /// Whether to include session parameters in the PBKDF messages.
    pub send_session_parameters: bool,
}

impl Default for PaseConfig {
    fn default() -> Self {
        Self {
            passcode_id: DEFAULT_PASSCODE_ID,
            local_session_parameters: SessionParameters {
                idle_retrans_timeout_ms: Some(DEFAULT_IDLE_RETRANS_TIMEOUT_MS),
                active_retrans_timeout_ms: Some(DEFAULT_ACTIVE_RETRANS_TIMEOUT_MS),
                active_threshold_ms: Some(DEFAULT_ACTIVE_THRESHOLD_MS),
            },
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            send_session_parameters: true,
        }
    }
}

impl PaseConfig {
    /// Check the configuration for values no peer could use.
    pub fn validate(&self) -> Result<()> {
        if self.handshake_timeout.is_zero() {
            return Err(Error::ParameterOutOfRange(
                "handshake timeout must be non-zero".into(),
            ));
        }

        let params = &self.local_session_parameters;
        for interval in [params.idle_retrans_timeout_ms, params.active_retrans_timeout_ms]
            .into_iter()
            .flatten()
        {
            if interval == 0 || interval > MAX_RETRANS_TIMEOUT_MS {
                return Err(Error::ParameterOutOfRange(format!(
                    "retransmission interval {} ms",
                    interval
                )));
            }
        }
        Ok(())
    }

    /// Session parameters to put on the wire, if enabled.
    pub(crate) fn advertised_parameters(&self) -> Option<SessionParameters> {
        self.send_session_parameters
            .then_some(self.local_session_parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PaseConfig::default();
        assert_eq!(config.passcode_id, 0);
        assert_eq!(config.handshake_timeout, Duration::from_secs(60));
        assert_eq!(
            config.local_session_parameters.idle_retrans_timeout_ms,
            Some(500)
        );
        assert!(config.validate().is_ok());
        assert!(config.advertised_parameters().is_some());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = PaseConfig {
            handshake_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.handshake_timeout = Duration::from_secs(1);
        config.local_session_parameters.active_retrans_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.local_session_parameters.active_retrans_timeout_ms = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parameters_not_advertised_when_disabled() {
        let config = PaseConfig {
            send_session_parameters: false,
            ..Default::default()
        };
        assert!(config.advertised_parameters().is_none());
    }
}
