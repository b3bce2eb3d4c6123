//! Standalone PASE peer over TCP.
//!
//! Reads configuration from environment variables and runs one handshake
//! as initiator or responder:
//!
//! - `PASE_ROLE`: `initiator` or `responder` (default `responder`)
//! - `PASE_ADDR`: address to bind or connect to (default `127.0.0.1:5540`)
//! - `PASE_PASSCODE`: setup passcode (default `20202021`)
//! - `PASE_ITERATIONS`: PBKDF2 iterations, responder only (default `1000`)
//! - `PASE_SALT_HEX`: PBKDF2 salt as hex, responder only

use std::env;
use std::error::Error;

use pase_core::{PaseConfig, PaseSession, PbkdfParameters, Spake2pVerifier};
use pase_transport::establish;
use pase_transport::tcp::TcpEndpoint;
use tracing::{error, info};

const DEFAULT_ADDR: &str = "127.0.0.1:5540";
const DEFAULT_PASSCODE: u32 = 20202021;
const DEFAULT_ITERATIONS: u32 = 1000;
const DEFAULT_SALT: &[u8] = b"SPAKE2P Key Salt";

fn env_or<T>(name: &str, default: T) -> Result<T, Box<dyn Error>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| format!("{}: {}", name, e).into()),
        Err(_) => Ok(default),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let role = env::var("PASE_ROLE").unwrap_or_else(|_| "responder".to_string());
    let addr = env::var("PASE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let passcode: u32 = env_or("PASE_PASSCODE", DEFAULT_PASSCODE)?;
    let config = PaseConfig::default();

    info!(%role, %addr, "PASE peer starting");

    let (mut session, exchange) = match role.as_str() {
        "initiator" => {
            let session = PaseSession::initiator(config, passcode, None)?;
            let exchange = TcpEndpoint::client().connect(&addr).await?;
            (session, exchange)
        }
        "responder" => {
            let iterations: u32 = env_or("PASE_ITERATIONS", DEFAULT_ITERATIONS)?;
            let salt = match env::var("PASE_SALT_HEX") {
                Ok(salt_hex) => hex::decode(salt_hex.trim())?,
                Err(_) => DEFAULT_SALT.to_vec(),
            };

            let verifier = Spake2pVerifier::generate(passcode, &salt, iterations)?;
            let session = PaseSession::responder(
                config,
                verifier,
                PbkdfParameters::new(iterations, salt),
            )?;

            let endpoint = TcpEndpoint::server(&addr).await?;
            info!(addr = %endpoint.local_addr()?, "waiting for initiator");
            (session, endpoint.accept().await?)
        }
        other => return Err(format!("PASE_ROLE must be initiator or responder, got {}", other).into()),
    };

    match establish(&mut session, &exchange).await {
        Ok(keys) => {
            info!(
                local_session_id = keys.local_session_id,
                peer_session_id = keys.peer_session_id,
                peer_parameters = ?keys.peer_session_parameters,
                "session established"
            );
            exchange.close().await?;
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "handshake failed");
            Err(e.into())
        }
    }
}
