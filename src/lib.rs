//! # Webhook Bot
//!
//! Inbound callback pipeline for an enterprise chat robot: URL verification,
//! signature authentication, decryption, parsing and handler dispatch, plus the
//! webhook client used to reply.

pub mod config;
pub mod errors;
pub mod logger;
pub mod webhook;
