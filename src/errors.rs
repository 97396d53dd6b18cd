use crate::webhook::crypt::CryptError;
use derive_more::{Display, Error};
use ntex::{http, web};
use tracing::{error, warn};

/// Failures that terminate an inbound callback request with an HTTP error.
///
/// Handler failures are not part of this type: they happen after the
/// acknowledgment and are collected by the dispatcher instead.
#[derive(Debug, Display, Error)]
pub enum CallbackError {
    /// Signature does not match the token, timestamp, nonce and payload
    #[display("failed to authenticate callback: {_0}")]
    Authentication(CryptError),
    /// Payload authenticated but could not be decrypted
    #[display("failed to decrypt msg: {_0}")]
    Crypt(CryptError),
    /// Decrypted document does not have the expected structure
    #[display("failed to parse msg: {_0}")]
    Parse(#[error(not(source))] String),
    /// `MsgType` names a payload the document does not carry
    #[display("malformed msg {msg_id:?}: {reason}")]
    MalformedEnvelope { msg_id: String, reason: String },
}

impl CallbackError {
    /// Maps a crypt failure to the authentication or decryption side of the taxonomy
    pub fn from_crypt(err: CryptError) -> Self {
        if err.code.is_authentication() {
            CallbackError::Authentication(err)
        } else {
            CallbackError::Crypt(err)
        }
    }

    /// Numeric crypt code, when the failure came from the crypt service
    pub fn crypt_code(&self) -> Option<i32> {
        match self {
            CallbackError::Authentication(e) | CallbackError::Crypt(e) => Some(e.code.code()),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            CallbackError::Authentication(e) => {
                error!(code = e.code.code(), "rejected unauthenticated callback: {}", self)
            }
            CallbackError::Crypt(e) => {
                error!(code = e.code.code(), "rejected undecryptable callback: {}", self)
            }
            CallbackError::Parse(_) | CallbackError::MalformedEnvelope { .. } => {
                warn!("rejected callback: {}", self)
            }
        }
    }
}

impl web::error::WebResponseError for CallbackError {
    fn error_response(&self, _: &web::HttpRequest) -> web::HttpResponse {
        self.log();

        web::HttpResponse::build(self.status_code())
            .set_header("content-type", "text/plain; charset=utf-8")
            .body(self.to_string())
    }

    fn status_code(&self) -> http::StatusCode {
        http::StatusCode::BAD_REQUEST
    }
}
