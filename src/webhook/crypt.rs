//! Callback message crypt
//!
//! This module implements the chat platform's callback crypt scheme, used to
//! authenticate and decrypt every request the platform sends to the callback URL.
//!
//! # Security Background
//!
//! Each callback carries `msg_signature`, `timestamp` and `nonce` query parameters.
//! The signature is the hex SHA-1 of the lexicographically sorted concatenation of
//! the shared token, the timestamp, the nonce and the encrypted payload.
//!
//! To verify authenticity and read a payload:
//! 1. Recompute the signature and compare it in constant time
//! 2. Base64 decode the encrypted payload
//! 3. Decrypt with AES-256-CBC (key from `EncodingAESKey`, IV = first 16 key bytes)
//! 4. Strip the 32-byte block PKCS#7 padding
//! 5. Split `random(16) | len(u32 BE) | message | receive_id`
//!
//! # Important Notes
//!
//! - The signature is checked before any decryption is attempted
//! - Only a signature mismatch is an authentication failure, every other error code
//!   is a crypt failure
//! - Timestamps are not checked against a replay window

use super::PayloadFormat;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use base64::{
    Engine,
    alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig, general_purpose::STANDARD},
};
use derive_more::{Display, Error};
use rand::RngCore;
use serde::Deserialize;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// `EncodingAESKey` values are 43 chars whose last char may carry non-zero trailing bits.
const AES_KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

const ENCODING_AES_KEY_LEN: usize = 43;
const PKCS7_BLOCK_SIZE: usize = 32;
const RANDOM_PREFIX_LEN: usize = 16;
const MSG_LEN_SIZE: usize = 4;

/// Error codes of the callback crypt scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptErrorCode {
    ValidateSignature,
    ParseEnvelope,
    ComputeSignature,
    IllegalAesKey,
    ValidateReceiveId,
    EncryptAes,
    DecryptAes,
    IllegalBuffer,
    EncodeBase64,
    DecodeBase64,
    GenerateEnvelope,
}

impl CryptErrorCode {
    /// Numeric code as documented by the platform
    pub fn code(self) -> i32 {
        match self {
            CryptErrorCode::ValidateSignature => -40001,
            CryptErrorCode::ParseEnvelope => -40002,
            CryptErrorCode::ComputeSignature => -40003,
            CryptErrorCode::IllegalAesKey => -40004,
            CryptErrorCode::ValidateReceiveId => -40005,
            CryptErrorCode::EncryptAes => -40006,
            CryptErrorCode::DecryptAes => -40007,
            CryptErrorCode::IllegalBuffer => -40008,
            CryptErrorCode::EncodeBase64 => -40009,
            CryptErrorCode::DecodeBase64 => -40010,
            CryptErrorCode::GenerateEnvelope => -40011,
        }
    }

    /// Whether the failure means the request could not be authenticated
    pub fn is_authentication(self) -> bool {
        self == CryptErrorCode::ValidateSignature
    }
}

/// Failure reported by the crypt service
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[display("crypt error({}): {}", code.code(), message)]
pub struct CryptError {
    pub code: CryptErrorCode,
    pub message: String,
}

impl CryptError {
    pub fn new(code: CryptErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A reply sealed for the platform: ciphertext plus the values needed to sign it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub encrypt: String,
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
    pub format: PayloadFormat,
}

impl EncryptedMessage {
    /// Serializes the sealed message as a request/response body in its payload format
    pub fn to_body(&self) -> Vec<u8> {
        match self.format {
            PayloadFormat::Xml => format!(
                "<xml><Encrypt><![CDATA[{encrypt}]]></Encrypt><MsgSignature><![CDATA[{signature}]]></MsgSignature><TimeStamp>{timestamp}</TimeStamp><Nonce><![CDATA[{nonce}]]></Nonce></xml>",
                encrypt = self.encrypt,
                signature = self.msg_signature,
                timestamp = self.timestamp,
                nonce = self.nonce,
            )
            .into_bytes(),
            PayloadFormat::Json => serde_json::json!({
                "encrypt": self.encrypt,
                "msgsignature": self.msg_signature,
                "timestamp": self.timestamp,
                "nonce": self.nonce,
            })
            .to_string()
            .into_bytes(),
        }
    }
}

/// Authenticate-and-decrypt service consumed by the callback verifier.
#[cfg_attr(test, mockall::automock)]
pub trait Crypt: Send + Sync {
    /// Verifies a URL-ownership challenge and returns the decrypted echo string
    fn verify_url(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        echo: &str,
    ) -> Result<Vec<u8>, CryptError>;

    /// Verifies a POSTed encrypted envelope and returns the decrypted document bytes
    fn decrypt_msg(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, CryptError>;

    /// Encrypts and signs a reply document
    fn encrypt_msg(
        &self,
        reply: &[u8],
        timestamp: &str,
        nonce: &str,
    ) -> Result<EncryptedMessage, CryptError>;
}

#[derive(Debug, Deserialize)]
struct XmlEnvelope {
    #[serde(rename = "Encrypt")]
    encrypt: String,
}

#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    encrypt: String,
}

/// Computes the callback signature for the given values
///
/// # Arguments
///
/// * `token` - Token configured for the callback URL
/// * `timestamp` - `timestamp` query parameter
/// * `nonce` - `nonce` query parameter
/// * `encrypted` - Base64 ciphertext (or the `echostr` for URL verification)
///
/// # Returns
///
/// Lowercase hex SHA-1 digest
pub fn compute_signature(token: &str, timestamp: &str, nonce: &str, encrypted: &str) -> String {
    let mut parts = [token, timestamp, nonce, encrypted];
    parts.sort_unstable();

    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Crypt service keyed by the callback token and `EncodingAESKey`
#[derive(Clone)]
pub struct MsgCrypt {
    token: String,
    key: [u8; 32],
    receive_id: Option<String>,
    format: PayloadFormat,
}

impl MsgCrypt {
    /// Creates a crypt service
    ///
    /// # Arguments
    ///
    /// * `token` - Token configured for the callback URL
    /// * `encoding_aes_key` - 43 char `EncodingAESKey`
    /// * `receive_id` - Expected receiver id appended to every plaintext, not checked when `None`
    /// * `format` - Document format of POST envelopes
    ///
    /// # Errors
    ///
    /// `IllegalAesKey` if the key is not 43 chars or does not decode to 32 bytes
    pub fn new(
        token: impl Into<String>,
        encoding_aes_key: &str,
        receive_id: Option<String>,
        format: PayloadFormat,
    ) -> Result<Self, CryptError> {
        if encoding_aes_key.len() != ENCODING_AES_KEY_LEN {
            return Err(CryptError::new(
                CryptErrorCode::IllegalAesKey,
                format!(
                    "EncodingAESKey must be {ENCODING_AES_KEY_LEN} chars, got {}",
                    encoding_aes_key.len()
                ),
            ));
        }

        let decoded = AES_KEY_ENGINE
            .decode(format!("{encoding_aes_key}="))
            .map_err(|e| CryptError::new(CryptErrorCode::IllegalAesKey, e.to_string()))?;

        let key: [u8; 32] = decoded.try_into().map_err(|_| {
            CryptError::new(
                CryptErrorCode::IllegalAesKey,
                "EncodingAESKey does not decode to 32 bytes",
            )
        })?;

        Ok(Self {
            token: token.into(),
            key,
            receive_id: receive_id.filter(|id| !id.is_empty()),
            format,
        })
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    fn verify_signature(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        encrypted: &str,
    ) -> Result<(), CryptError> {
        let computed = compute_signature(&self.token, timestamp, nonce, encrypted);

        // Constant-time comparison to prevent timing attacks
        let is_valid: bool = computed.as_bytes().ct_eq(msg_signature.as_bytes()).into();
        if !is_valid {
            return Err(CryptError::new(
                CryptErrorCode::ValidateSignature,
                "signature does not match",
            ));
        }

        Ok(())
    }

    fn extract_encrypted(&self, body: &[u8]) -> Result<String, CryptError> {
        let parse_err = |e: String| CryptError::new(CryptErrorCode::ParseEnvelope, e);

        match self.format {
            PayloadFormat::Xml => {
                let body = std::str::from_utf8(body).map_err(|e| parse_err(e.to_string()))?;
                quick_xml::de::from_str::<XmlEnvelope>(body)
                    .map(|envelope| envelope.encrypt)
                    .map_err(|e| parse_err(e.to_string()))
            }
            PayloadFormat::Json => serde_json::from_slice::<JsonEnvelope>(body)
                .map(|envelope| envelope.encrypt)
                .map_err(|e| parse_err(e.to_string())),
        }
    }

    fn decrypt(&self, encrypted: &str) -> Result<Vec<u8>, CryptError> {
        let mut buf = STANDARD
            .decode(encrypted.trim())
            .map_err(|e| CryptError::new(CryptErrorCode::DecodeBase64, e.to_string()))?;

        if buf.is_empty() || buf.len() % 16 != 0 {
            return Err(CryptError::new(
                CryptErrorCode::IllegalBuffer,
                format!("ciphertext length {} is not a multiple of 16", buf.len()),
            ));
        }

        let plaintext = Aes256CbcDec::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CryptError::new(CryptErrorCode::DecryptAes, e.to_string()))?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|e| CryptError::new(CryptErrorCode::DecryptAes, e.to_string()))?;

        let plaintext = pkcs7_unpad(plaintext)?;
        if plaintext.len() < RANDOM_PREFIX_LEN + MSG_LEN_SIZE {
            return Err(CryptError::new(
                CryptErrorCode::IllegalBuffer,
                "plaintext shorter than its header",
            ));
        }

        let content = &plaintext[RANDOM_PREFIX_LEN..];
        let mut len_bytes = [0u8; MSG_LEN_SIZE];
        len_bytes.copy_from_slice(&content[..MSG_LEN_SIZE]);
        let msg_len = u32::from_be_bytes(len_bytes) as usize;

        let content = &content[MSG_LEN_SIZE..];
        if content.len() < msg_len {
            return Err(CryptError::new(
                CryptErrorCode::IllegalBuffer,
                format!(
                    "declared message length {msg_len} exceeds plaintext length {}",
                    content.len()
                ),
            ));
        }

        let (msg, receive_id) = content.split_at(msg_len);
        if let Some(expected) = &self.receive_id {
            if receive_id != expected.as_bytes() {
                return Err(CryptError::new(
                    CryptErrorCode::ValidateReceiveId,
                    "receive id does not match",
                ));
            }
        }

        Ok(msg.to_vec())
    }

    fn encrypt(&self, reply: &[u8]) -> Result<String, CryptError> {
        let receive_id = self.receive_id.as_deref().unwrap_or_default().as_bytes();
        let msg_len = u32::try_from(reply.len())
            .map_err(|_| CryptError::new(CryptErrorCode::IllegalBuffer, "reply is too large"))?;

        let mut prefix = [0u8; RANDOM_PREFIX_LEN];
        rand::thread_rng().fill_bytes(&mut prefix);

        let mut buf = Vec::with_capacity(
            RANDOM_PREFIX_LEN + MSG_LEN_SIZE + reply.len() + receive_id.len() + PKCS7_BLOCK_SIZE,
        );
        buf.extend_from_slice(&prefix);
        buf.extend_from_slice(&msg_len.to_be_bytes());
        buf.extend_from_slice(reply);
        buf.extend_from_slice(receive_id);
        pkcs7_pad(&mut buf);

        let len = buf.len();
        let ciphertext = Aes256CbcEnc::new_from_slices(&self.key, &self.key[..16])
            .map_err(|e| CryptError::new(CryptErrorCode::EncryptAes, e.to_string()))?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|e| CryptError::new(CryptErrorCode::EncryptAes, e.to_string()))?;

        Ok(STANDARD.encode(ciphertext))
    }
}

impl Crypt for MsgCrypt {
    fn verify_url(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        echo: &str,
    ) -> Result<Vec<u8>, CryptError> {
        self.verify_signature(msg_signature, timestamp, nonce, echo)?;
        self.decrypt(echo)
    }

    fn decrypt_msg(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        body: &[u8],
    ) -> Result<Vec<u8>, CryptError> {
        let encrypted = self.extract_encrypted(body)?;
        self.verify_signature(msg_signature, timestamp, nonce, &encrypted)?;
        self.decrypt(&encrypted)
    }

    fn encrypt_msg(
        &self,
        reply: &[u8],
        timestamp: &str,
        nonce: &str,
    ) -> Result<EncryptedMessage, CryptError> {
        let encrypt = self.encrypt(reply)?;
        let msg_signature = compute_signature(&self.token, timestamp, nonce, &encrypt);

        Ok(EncryptedMessage {
            encrypt,
            msg_signature,
            timestamp: timestamp.to_string(),
            nonce: nonce.to_string(),
            format: self.format,
        })
    }
}

fn pkcs7_pad(buf: &mut Vec<u8>) {
    let pad = PKCS7_BLOCK_SIZE - buf.len() % PKCS7_BLOCK_SIZE;
    buf.resize(buf.len() + pad, pad as u8);
}

fn pkcs7_unpad(buf: &[u8]) -> Result<&[u8], CryptError> {
    let pad = buf.last().copied().unwrap_or_default() as usize;
    if pad == 0 || pad > PKCS7_BLOCK_SIZE || pad > buf.len() {
        return Err(CryptError::new(
            CryptErrorCode::IllegalBuffer,
            format!("invalid padding {pad}"),
        ));
    }

    Ok(&buf[..buf.len() - pad])
}
