//! Crypto error types.

use thiserror::Error;

/// Errors from channel construction, marshalling and key encoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Channel parameters rejected before any key material was generated
    #[error("invalid channel parameters: {0}")]
    InvalidParams(String),

    /// Serialized channel definition could not be decoded
    #[error("malformed channel definition: {0}")]
    MalformedChannel(String),

    /// Decoded definition does not match its reception ID
    #[error("channel reception ID mismatch")]
    ReceptionIdMismatch,

    /// Key material could not be encoded or decoded
    #[error("key encoding error: {0}")]
    KeyEncoding(String),

    /// Hash input too short to derive a codename
    #[error("codename needs at least {needed} hash bytes, got {got}")]
    HashTooShort {
        /// Minimum number of bytes required
        needed: usize,
        /// Bytes supplied
        got: usize,
    },
}
