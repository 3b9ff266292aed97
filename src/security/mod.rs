//! Payload protection for emulated end-devices
//!
//! This module provides the payload cipher used by devices before an
//! uplink leaves for the gateway, and its inverse for verification.

pub mod crypto;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crypto::{IV_SIZE, ZERO_IV};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("Invalid key length: {0} bytes (expected 16, 24 or 32)")]
    InvalidKeyLength(usize),

    #[error("Plaintext length {0} is not a multiple of the 16-byte block size")]
    UnalignedPlaintext(usize),

    #[error("Ciphertext length {0} is not a positive multiple of the 16-byte block size")]
    UnalignedCiphertext(usize),

    #[error("Ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),

    #[error("Invalid PKCS#7 padding")]
    InvalidPadding,
}

/// How the CBC initialization vector is chosen for each message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IvMode {
    /// Fresh random IV per message, sent in front of the ciphertext
    #[default]
    Random,

    /// All-zero IV reused for every message; ciphertext only on the wire
    FixedZero,
}

impl IvMode {
    pub fn from_fixed_flag(fixed_iv: bool) -> Self {
        if fixed_iv {
            IvMode::FixedZero
        } else {
            IvMode::Random
        }
    }
}

impl std::fmt::Display for IvMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IvMode::Random => write!(f, "random-iv"),
            IvMode::FixedZero => write!(f, "fixed-zero-iv"),
        }
    }
}

/// AES-CBC payload cipher with PKCS#7 padding
///
/// Output layout depends on the IV mode:
/// - `Random`: `IV (16 bytes) || ciphertext`
/// - `FixedZero`: `ciphertext`
///
/// The ciphertext is always `(len / 16 + 1) * 16` bytes, since PKCS#7 adds
/// a whole block to input that is already aligned.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadCipher {
    iv_mode: IvMode,
}

impl PayloadCipher {
    pub fn new(iv_mode: IvMode) -> Self {
        Self { iv_mode }
    }

    pub fn iv_mode(&self) -> IvMode {
        self.iv_mode
    }

    /// Encrypt a device payload with the given key
    pub fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let padded = crypto::pkcs7_pad(plaintext);

        match self.iv_mode {
            IvMode::FixedZero => crypto::cbc_encrypt(key, &ZERO_IV, &padded),
            IvMode::Random => {
                let iv = crypto::generate_iv();
                let ciphertext = crypto::cbc_encrypt(key, &iv, &padded)?;

                let mut output = Vec::with_capacity(IV_SIZE + ciphertext.len());
                output.extend_from_slice(&iv);
                output.extend_from_slice(&ciphertext);
                Ok(output)
            }
        }
    }

    /// Recover the plaintext from the output of `encrypt`
    pub fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let (iv, ciphertext) = match self.iv_mode {
            IvMode::FixedZero => (ZERO_IV, data),
            IvMode::Random => {
                if data.len() < IV_SIZE + crypto::BLOCK_SIZE {
                    return Err(CipherError::CiphertextTooShort(data.len()));
                }
                let (iv, rest) = data.split_at(IV_SIZE);
                let mut iv_bytes = [0u8; IV_SIZE];
                iv_bytes.copy_from_slice(iv);
                (iv_bytes, rest)
            }
        };

        let padded = crypto::cbc_decrypt(key, &iv, ciphertext)?;
        crypto::pkcs7_unpad(&padded).map(|p| p.to_vec())
    }
}
