//! Cryptographic functions for tarseal
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation
//! for at-rest sealing of backup archives.

pub mod encryption;
pub mod key_derivation;
pub mod sealer;
pub mod secure_memory;

pub use encryption::{FrameCipher, NoncePrefix};
pub use key_derivation::{derive_key, DerivedKey, KdfSettings, KeyDerivationParams};
pub use sealer::{is_sealed, SealHeader, Sealer, SEALED_SUFFIX};
pub use secure_memory::SecureString;
