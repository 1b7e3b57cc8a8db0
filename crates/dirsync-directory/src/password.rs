//! Password capability consumed by the engine.
//!
//! The engine never builds or hashes passwords itself; it asks a
//! [`PasswordCapability`] for a fresh secret and for its stored encodings.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryResult;

/// Maximum number of candidates drawn before generation gives up.
pub const MAX_GENERATION_ATTEMPTS: usize = 1000;

/// Rules a generated password must satisfy.
///
/// Every password must contain a lower-case letter, an upper-case letter, a
/// digit and one of `special_characters`, and none of `banned_characters`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordPolicy {
    /// Number of characters.
    pub length: usize,
    /// Characters added to the alphabet; at least one is required.
    pub special_characters: String,
    /// Characters that must not appear.
    #[serde(default)]
    pub banned_characters: String,
}

impl PasswordPolicy {
    /// Create a policy.
    pub fn new(length: usize, special_characters: impl Into<String>) -> Self {
        Self {
            length,
            special_characters: special_characters.into(),
            banned_characters: String::new(),
        }
    }

    /// Set banned characters.
    pub fn with_banned(mut self, banned: impl Into<String>) -> Self {
        self.banned_characters = banned.into();
        self
    }

    /// Check a candidate against the policy.
    #[must_use]
    pub fn accepts(&self, candidate: &str) -> bool {
        candidate.chars().any(|c| c.is_ascii_lowercase())
            && candidate.chars().any(|c| c.is_ascii_uppercase())
            && candidate.chars().any(|c| c.is_ascii_digit())
            && candidate.chars().any(|c| self.special_characters.contains(c))
            && !candidate.chars().any(|c| self.banned_characters.contains(c))
    }
}

/// Storage encodings for a password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordScheme {
    /// Salted one-way hash for the POSIX password attribute.
    SaltedHash,
    /// Unsalted legacy hash for the NT password attribute.
    LegacyHash,
}

/// Generates and encodes passwords.
pub trait PasswordCapability {
    /// Produce a new secret satisfying `policy`.
    ///
    /// # Errors
    /// Returns `PasswordExhausted` when no candidate passed the policy within
    /// [`MAX_GENERATION_ATTEMPTS`].
    fn generate(&self, policy: &PasswordPolicy) -> DirectoryResult<SecretString>;

    /// Encode a secret for storage.
    fn encode(&self, secret: &SecretString, scheme: PasswordScheme) -> DirectoryResult<Vec<u8>>;
}
