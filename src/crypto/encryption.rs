//! AES-256-GCM frame encryption
//!
//! Sealed artifacts are split into fixed-size frames, each encrypted
//! separately. A frame nonce is the per-artifact random prefix, the frame
//! index and a final-frame flag; index and flag are also bound as
//! associated data, so dropped, reordered or appended frames all fail
//! authentication.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Random bytes at the front of every frame nonce
pub const NONCE_PREFIX_SIZE: usize = 7;

/// Size of the GCM authentication tag appended to each frame
pub const TAG_SIZE: usize = 16;

/// A nonce prefix unique to one sealed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoncePrefix([u8; NONCE_PREFIX_SIZE]);

impl NoncePrefix {
    /// Generate a fresh random prefix
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_PREFIX_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Encode for the artifact header
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Decode from the artifact header
    pub fn from_base64(encoded: &str) -> Result<Self, String> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| format!("Invalid nonce encoding: {}", e))?;
        let bytes: [u8; NONCE_PREFIX_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_PREFIX_SIZE,
                v.len()
            )
        })?;
        Ok(Self(bytes))
    }
}

/// Encrypts and decrypts the frames of one sealed artifact
pub struct FrameCipher {
    cipher: Aes256Gcm,
    prefix: NoncePrefix,
}

impl FrameCipher {
    /// Create a cipher from a derived key and the artifact's nonce prefix
    pub fn new(key: &DerivedKey, prefix: NoncePrefix) -> Result<Self, String> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| format!("Failed to create cipher: {}", e))?;
        Ok(Self { cipher, prefix })
    }

    /// Encrypt one frame
    pub fn encrypt_frame(&self, index: u32, last: bool, plaintext: &[u8]) -> Result<Vec<u8>, String> {
        let nonce_bytes = self.nonce(index, last);
        let aad = frame_aad(index, last);
        self.cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| format!("Encryption failed: {}", e))
    }

    /// Decrypt one frame
    pub fn decrypt_frame(&self, index: u32, last: bool, ciphertext: &[u8]) -> Result<Vec<u8>, String> {
        let nonce_bytes = self.nonce(index, last);
        let aad = frame_aad(index, last);
        self.cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| "invalid passphrase or corrupted data".to_string())
    }

    fn nonce(&self, index: u32, last: bool) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..NONCE_PREFIX_SIZE].copy_from_slice(&self.prefix.0);
        nonce[NONCE_PREFIX_SIZE..NONCE_SIZE - 1].copy_from_slice(&index.to_be_bytes());
        nonce[NONCE_SIZE - 1] = u8::from(last);
        nonce
    }
}

fn frame_aad(index: u32, last: bool) -> [u8; 5] {
    let mut aad = [0u8; 5];
    aad[..4].copy_from_slice(&index.to_be_bytes());
    aad[4] = u8::from(last);
    aad
}
