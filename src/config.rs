//! Application configuration read from the environment.
//!
//! Sensitive fields are clearly marked and must never be logged.

use crate::webhook::PayloadFormat;
use envconfig::Envconfig;
use log::LevelFilter;

/// Application configuration.
///
/// Every field maps to the upper-case environment variable of the same name.
#[derive(Envconfig, Clone)]
pub struct AppConfig {
    /// Environment name to deploy the app (NON-SENSITIVE)
    /// Values: "local", "dev", "staging", "prod"
    #[envconfig(default = "local")]
    pub env: String,

    /// Host address for web server binding (NON-SENSITIVE)
    /// Example: "0.0.0.0", "localhost"
    #[envconfig(default = "0.0.0.0")]
    pub web_server_host: String,

    /// Port for web server binding (NON-SENSITIVE)
    #[envconfig(default = "8080")]
    pub web_server_port: u16,

    /// Path the platform posts callbacks to (NON-SENSITIVE)
    #[envconfig(default = "/callback")]
    pub callback_path: String,

    /// 🔒 SENSITIVE: Token configured with the callback URL, used to sign requests
    pub callback_token: String,

    /// 🔒 SENSITIVE: 43 char `EncodingAESKey` configured with the callback URL
    pub callback_encoding_aes_key: String,

    /// Receiver id appended to every plaintext (NON-SENSITIVE)
    /// Not checked when unset
    pub callback_receive_id: Option<String>,

    /// Envelope and document format: "xml" or "json" (NON-SENSITIVE)
    #[envconfig(default = "xml")]
    pub callback_payload_format: PayloadFormat,

    /// Robot name, stripped as `@name` from text messages (NON-SENSITIVE)
    pub robot_name: Option<String>,

    /// 🔒 SENSITIVE: Logfire write token, logs go to stdout when unset
    pub logfire_token: Option<String>,

    /// Minimum level of stdout logs (NON-SENSITIVE)
    #[envconfig(default = "info")]
    pub log_level: LevelFilter,
}

impl AppConfig {
    /// Checks if running in production environment
    pub fn is_prod(&self) -> bool {
        self.env.to_lowercase() == "prod"
    }

    /// Address the web server binds to
    pub fn server_addr(&self) -> (String, u16) {
        (self.web_server_host.clone(), self.web_server_port)
    }

    pub fn robot_name(&self) -> &str {
        self.robot_name.as_deref().unwrap_or_default()
    }
}
