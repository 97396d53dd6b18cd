//! Callback webhook for the chat robot
//!
//! Inbound requests flow through these modules in order:
//!
//! - [`crypt`] - Signature and AES crypt scheme of the platform
//! - [`verifier`] - URL verification and envelope authentication
//! - [`parser`] - Decrypted document to [`schemas::RawCallbackMessage`]
//! - [`dispatcher`] - Payload validation and handler invocation
//! - [`routes`] - HTTP endpoints, acknowledge then process
//!
//! Outbound replies use [`outgoing_schemas`], [`reply`] and [`client`].
//! [`server`] ties everything together.

use derive_more::Display;
use std::str::FromStr;

pub mod client;
pub mod crypt;
pub mod dispatcher;
pub mod outgoing_schemas;
pub mod parser;
pub mod reply;
pub mod routes;
pub mod schemas;
pub mod server;
pub mod verifier;

/// Encoding of the encrypted envelope and of the decrypted document
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFormat {
    #[default]
    #[display("xml")]
    Xml,
    #[display("json")]
    Json,
}

impl FromStr for PayloadFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(PayloadFormat::Xml),
            "json" => Ok(PayloadFormat::Json),
            other => Err(format!("unknown payload format {other:?}, expected xml or json")),
        }
    }
}
