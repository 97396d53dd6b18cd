//! Authentication of inbound callback requests.
//!
//! Wraps a [`Crypt`] service and maps its failures onto [`CallbackError`], so
//! routes deal with a single error type.

use super::crypt::Crypt;
use crate::errors::CallbackError;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct CallbackVerifier {
    crypt: Arc<dyn Crypt>,
}

impl CallbackVerifier {
    pub fn new(crypt: Arc<dyn Crypt>) -> Self {
        Self { crypt }
    }

    /// Answers the URL ownership challenge sent when the callback URL is configured.
    ///
    /// # Returns
    ///
    /// The decrypted `echostr`, to be written back verbatim as the response body
    ///
    /// # Errors
    ///
    /// [`CallbackError::Authentication`] on a signature mismatch,
    /// [`CallbackError::Crypt`] when the echo string cannot be decrypted
    pub fn verify_challenge(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        echo: &str,
    ) -> Result<Vec<u8>, CallbackError> {
        let plain = self
            .crypt
            .verify_url(msg_signature, timestamp, nonce, echo)
            .map_err(CallbackError::from_crypt)?;

        debug!(timestamp, nonce, "callback url verified");
        Ok(plain)
    }

    /// Authenticates a POSTed envelope and returns the decrypted document
    pub fn decrypt_envelope(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, CallbackError> {
        self.crypt
            .decrypt_msg(msg_signature, timestamp, nonce, body)
            .map_err(CallbackError::from_crypt)
    }
}
