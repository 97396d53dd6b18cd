//! Callback endpoint handlers
//!
//! This module handles the requests the chat platform sends to the callback URL.
//! It implements both the URL verification endpoint (GET) and the message
//! receiver (POST).
//!
//! # Security
//!
//! Both endpoints authenticate the request with the `msg_signature` query
//! parameter before anything is decrypted. Every rejected request gets a 400.
//!
//! # Processing
//!
//! The receiver acknowledges with 200 as soon as the message is authenticated,
//! parsed and validated. Handlers run afterwards in a background task, so their
//! failures never reach the platform.

use super::{
    PayloadFormat,
    dispatcher::Dispatcher,
    parser,
    verifier::CallbackVerifier,
};
use ntex::{util::Bytes, web};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Query parameters sent with every callback request.
///
/// Missing parameters are read as empty strings so they fail signature
/// verification instead of query extraction.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallbackQuery {
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    /// Encrypted challenge, only sent on URL verification
    pub echostr: String,
}

/// Shared state of the callback endpoints
#[derive(Clone)]
pub struct CallbackState {
    pub verifier: CallbackVerifier,
    pub format: PayloadFormat,
    pub dispatcher: Arc<Dispatcher>,
}

/// URL verification endpoint (GET)
///
/// The platform sends a GET request when the callback URL is saved.
/// This endpoint authenticates it and writes back the decrypted `echostr`.
///
/// # Returns
/// - 200 with the plaintext challenge if verification succeeds
/// - 400 if the signature or the ciphertext is invalid
#[web::get("")]
pub async fn verify(
    query: web::types::Query<CallbackQuery>,
    state: web::types::State<CallbackState>,
) -> Result<impl web::Responder, web::Error> {
    let challenge = state.verifier.verify_challenge(
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
        &query.echostr,
    )?;

    Ok(web::HttpResponse::Ok()
        .content_type("text/plain")
        .body(challenge))
}

/// Callback receiver endpoint (POST)
///
/// Authenticates, decrypts, parses and validates the message, then returns
/// 200 immediately and dispatches it to the registered handlers in the background.
///
/// # Returns
/// - 200 with an empty body once the message is accepted
/// - 400 on authentication, crypt, parse or malformed message failures
#[web::post("")]
pub async fn receive(
    query: web::types::Query<CallbackQuery>,
    body: Bytes,
    state: web::types::State<CallbackState>,
) -> Result<impl web::Responder, web::Error> {
    let plaintext = state.verifier.decrypt_envelope(
        &query.msg_signature,
        &query.timestamp,
        &query.nonce,
        &body,
    )?;

    let raw = parser::parse(state.format, &plaintext)?;
    let message = Arc::new(Dispatcher::validate(raw)?);

    debug!(
        msg_id = %message.msg_id,
        msg_type = %message.msg_type(),
        chat_id = %message.chat_id,
        "callback accepted"
    );

    let dispatcher = state.dispatcher.clone();
    ntex::rt::spawn(async move {
        dispatcher.dispatch(message).await;
    });

    Ok(web::HttpResponse::Ok().finish())
}

/// Mounts the callback endpoints on `path`
///
/// # Routes
/// - `GET {path}` - URL verification
/// - `POST {path}` - message receiver
pub fn configure(cfg: &mut web::ServiceConfig, path: &str) {
    cfg.service(web::scope(path).service((verify, receive)));
}
