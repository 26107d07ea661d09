//! Key derivation using Argon2id
//!
//! Derives encryption keys from user passphrases using Argon2id,
//! a memory-hard key derivation function resistant to GPU/ASIC attacks.
//! Every sealed artifact carries its own salt and cost parameters, so an
//! artifact stays restorable after the configured costs change.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, Params,
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Largest memory cost accepted, in KiB (4 GiB)
pub const MAX_MEMORY_COST: u32 = 4 * 1024 * 1024;
/// Largest number of passes accepted
pub const MAX_TIME_COST: u32 = 64;
/// Largest number of lanes accepted
pub const MAX_PARALLELISM: u32 = 64;

/// Argon2 cost settings used when sealing new artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSettings {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 3)
    pub time_cost: u32,
    /// Parallelism degree (default: 4)
    pub parallelism: u32,
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            memory_cost: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Parameters for key derivation, as recorded in a sealed artifact header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDerivationParams {
    /// Salt for key derivation (base64 encoded)
    pub salt: String,
    pub memory_cost: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl KeyDerivationParams {
    /// Reject costs outside the range any sealer writes.
    ///
    /// Headers are read before anything is authenticated, so a corrupt
    /// header must not be able to demand unbounded memory or time.
    pub fn check_bounds(&self) -> Result<(), String> {
        if self.memory_cost > MAX_MEMORY_COST {
            return Err(format!(
                "Argon2 memory cost {} KiB exceeds the {} KiB limit",
                self.memory_cost, MAX_MEMORY_COST
            ));
        }
        if self.time_cost > MAX_TIME_COST {
            return Err(format!(
                "Argon2 time cost {} exceeds the limit of {}",
                self.time_cost, MAX_TIME_COST
            ));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(format!(
                "Argon2 parallelism {} exceeds the limit of {}",
                self.parallelism, MAX_PARALLELISM
            ));
        }
        Ok(())
    }

    /// Create new params with a random salt
    pub fn generate(settings: &KdfSettings) -> Self {
        let salt = SaltString::generate(&mut OsRng);
        Self {
            salt: salt.to_string(),
            memory_cost: settings.memory_cost,
            time_cost: settings.time_cost,
            parallelism: settings.parallelism,
        }
    }
}

/// A derived encryption key
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    /// The 32-byte key for AES-256
    key: [u8; 32],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

/// Derive an encryption key from a passphrase
///
/// Errors are plain strings; the sealer wraps them in the error variant of
/// whichever direction it is working in.
pub fn derive_key(passphrase: &str, params: &KeyDerivationParams) -> Result<DerivedKey, String> {
    params.check_bounds()?;

    let salt =
        SaltString::from_b64(&params.salt).map_err(|e| format!("Invalid salt: {}", e))?;

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(32), // Output length for AES-256
    )
    .map_err(|e| format!("Invalid Argon2 parameters: {}", e))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| format!("Key derivation failed: {}", e))?;

    let hash_output = hash
        .hash
        .ok_or_else(|| "No hash output generated".to_string())?;

    let hash_bytes = hash_output.as_bytes();

    if hash_bytes.len() < 32 {
        return Err("Hash output too short for AES-256 key".to_string());
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&hash_bytes[..32]);

    Ok(DerivedKey { key })
}

#[cfg(test)]
pub(crate) fn test_settings() -> KdfSettings {
    KdfSettings {
        memory_cost: 256,
        time_cost: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_key() {
        let params = KeyDerivationParams::generate(&test_settings());
        let key = derive_key("test_passphrase", &params).unwrap();
        assert_eq!(key.as_bytes().len(), 32);
    }

    #[test]
    fn test_same_passphrase_same_key() {
        let params = KeyDerivationParams::generate(&test_settings());
        let key1 = derive_key("test_passphrase", &params).unwrap();
        let key2 = derive_key("test_passphrase", &params).unwrap();
        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_passphrase_different_key() {
        let params = KeyDerivationParams::generate(&test_settings());
        let key1 = derive_key("passphrase1", &params).unwrap();
        let key2 = derive_key("passphrase2", &params).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let params1 = KeyDerivationParams::generate(&test_settings());
        let params2 = KeyDerivationParams::generate(&test_settings());
        let key1 = derive_key("same_passphrase", &params1).unwrap();
        let key2 = derive_key("same_passphrase", &params2).unwrap();
        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut params = KeyDerivationParams::generate(&test_settings());
        params.memory_cost = 1;
        assert!(derive_key("pass", &params).is_err());

        let mut params = KeyDerivationParams::generate(&test_settings());
        params.salt = "!".to_string();
        assert!(derive_key("pass", &params).is_err());
    }

    #[test]
    fn test_oversized_costs_rejected() {
        let mut params = KeyDerivationParams::generate(&test_settings());
        params.memory_cost = 4_000_000_000;
        assert!(params.check_bounds().is_err());
        assert!(derive_key("pass", &params).is_err());

        let mut params = KeyDerivationParams::generate(&test_settings());
        params.time_cost = u32::MAX;
        assert!(params.check_bounds().is_err());

        let mut params = KeyDerivationParams::generate(&test_settings());
        params.parallelism = MAX_PARALLELISM + 1;
        assert!(params.check_bounds().is_err());

        let defaults = KeyDerivationParams::generate(&KdfSettings::default());
        assert!(defaults.check_bounds().is_ok());
    }
}
