//! Cryptographic primitives for the security module
//!
//! AES in CBC mode over the `aes` block cipher, with PKCS#7 padding.
//! The key length selects AES-128, AES-192 or AES-256.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use rand::{rngs::OsRng, RngCore};

use crate::security::CipherError;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Initialization vector size (one block)
pub const IV_SIZE: usize = BLOCK_SIZE;

/// Key sizes accepted by the cipher, in bytes
pub const SUPPORTED_KEY_SIZES: [usize; 3] = [16, 24, 32];

/// The all-zero IV used by the fixed-IV mode
pub const ZERO_IV: [u8; IV_SIZE] = [0u8; IV_SIZE];

/// AES instance keyed for one of the supported strengths
enum AesKey {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl AesKey {
    fn new(key: &[u8]) -> Result<Self, CipherError> {
        // new_from_slice only fails on a wrong length, which we check first
        let invalid = |_| CipherError::InvalidKeyLength(key.len());
        match key.len() {
            16 => Ok(AesKey::Aes128(Aes128::new_from_slice(key).map_err(invalid)?)),
            24 => Ok(AesKey::Aes192(Aes192::new_from_slice(key).map_err(invalid)?)),
            32 => Ok(AesKey::Aes256(Aes256::new_from_slice(key).map_err(invalid)?)),
            n => Err(CipherError::InvalidKeyLength(n)),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            AesKey::Aes128(c) => c.encrypt_block(block),
            AesKey::Aes192(c) => c.encrypt_block(block),
            AesKey::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            AesKey::Aes128(c) => c.decrypt_block(block),
            AesKey::Aes192(c) => c.decrypt_block(block),
            AesKey::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Apply PKCS#7 padding. Aligned input gets a full extra block.
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    let mut padded = Vec::with_capacity(data.len() + pad);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad, pad as u8);
    padded
}

/// Strip and verify PKCS#7 padding
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], CipherError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::UnalignedCiphertext(data.len()));
    }

    let pad = data[data.len() - 1] as usize;
    if pad == 0 || pad > BLOCK_SIZE {
        return Err(CipherError::InvalidPadding);
    }
    if !data[data.len() - pad..].iter().all(|&b| b as usize == pad) {
        return Err(CipherError::InvalidPadding);
    }

    Ok(&data[..data.len() - pad])
}

/// Encrypt block-aligned data with AES-CBC
///
/// Fails with `UnalignedPlaintext` instead of touching a partial block.
pub fn cbc_encrypt(key: &[u8], iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = AesKey::new(key)?;
    if plaintext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::UnalignedPlaintext(plaintext.len()));
    }

    let mut output = Vec::with_capacity(plaintext.len());
    let mut chain = *iv;

    for chunk in plaintext.chunks_exact(BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        for (b, c) in block.iter_mut().zip(chain.iter()) {
            *b ^= c;
        }
        cipher.encrypt_block(&mut block);
        chain.copy_from_slice(&block);
        output.extend_from_slice(&block);
    }

    Ok(output)
}

/// Decrypt AES-CBC ciphertext. Padding is left in place.
pub fn cbc_decrypt(key: &[u8], iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = AesKey::new(key)?;
    if ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CipherError::UnalignedCiphertext(ciphertext.len()));
    }

    let mut output = Vec::with_capacity(ciphertext.len());
    let mut chain = *iv;

    for chunk in ciphertext.chunks_exact(BLOCK_SIZE) {
        let mut block = Block::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        for (b, c) in block.iter_mut().zip(chain.iter()) {
            *b ^= c;
        }
        chain.copy_from_slice(chunk);
        output.extend_from_slice(&block);
    }

    Ok(output)
}

/// Generate a random IV from the OS generator
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}
