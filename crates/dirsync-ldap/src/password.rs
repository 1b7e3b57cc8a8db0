//! Password generation and encoding for LDAP accounts.
//!
//! - `SaltedHash`: `{CRYPT}` followed by a SHA-512 crypt string, for `userPassword`.
//! - `LegacyHash`: upper-case hex MD4 of the UTF-16LE password, for `sambaNTPassword`.

use md4::{Digest, Md4};
use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use secrecy::{ExposeSecret, SecretString};
use sha_crypt::{sha512_simple, Sha512Params, ROUNDS_DEFAULT};
use tracing::{debug, error, instrument};

use dirsync_directory::{
    DirectoryError, DirectoryResult, PasswordCapability, PasswordPolicy, PasswordScheme,
    MAX_GENERATION_ATTEMPTS,
};

/// Scheme prefix understood by OpenLDAP for crypt(3) hashes.
const CRYPT_PREFIX: &str = "{CRYPT}";

/// Password capability backed by the OS random number generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPasswordService;

impl DefaultPasswordService {
    /// Create the service.
    pub fn new() -> Self {
        Self
    }

    fn alphabet(policy: &PasswordPolicy) -> Vec<char> {
        ('a'..='z')
            .chain('A'..='Z')
            .chain('0'..='9')
            .chain(policy.special_characters.chars())
            .collect()
    }
}

/// Encode a password as upper-case hex MD4 over its UTF-16LE bytes.
#[instrument(skip(password))]
pub fn encode_nt_hash(password: &str) -> String {
    let utf16: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
    hex::encode_upper(Md4::digest(&utf16))
}

/// Encode a password as `{CRYPT}` + SHA-512 crypt with a random salt.
#[instrument(skip(password))]
pub fn encode_crypt_sha512(password: &str) -> DirectoryResult<String> {
    let params = Sha512Params::new(ROUNDS_DEFAULT).map_err(|e| DirectoryError::PasswordEncoding {
        message: format!("invalid SHA-512 crypt parameters: {e:?}"),
    })?;
    let hashed = sha512_simple(password, &params).map_err(|e| DirectoryError::PasswordEncoding {
        message: format!("SHA-512 crypt failed: {e:?}"),
    })?;
    Ok(format!("{CRYPT_PREFIX}{hashed}"))
}

impl PasswordCapability for DefaultPasswordService {
    #[instrument(skip(self, policy), fields(length = policy.length))]
    fn generate(&self, policy: &PasswordPolicy) -> DirectoryResult<SecretString> {
        let alphabet = Self::alphabet(policy);
        let mut rng = OsRng;

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let candidate: String = (0..policy.length)
                .filter_map(|_| alphabet.choose(&mut rng).copied())
                .collect();

            if policy.accepts(&candidate) {
                debug!(attempt, "Password generated");
                return Ok(SecretString::from(candidate));
            }
        }

        error!(
            attempts = MAX_GENERATION_ATTEMPTS,
            "Unable to generate a password satisfying the policy"
        );
        Err(DirectoryError::PasswordExhausted {
            attempts: MAX_GENERATION_ATTEMPTS,
        })
    }

    fn encode(&self, secret: &SecretString, scheme: PasswordScheme) -> DirectoryResult<Vec<u8>> {
        match scheme {
            PasswordScheme::SaltedHash => {
                encode_crypt_sha512(secret.expose_secret()).map(String::into_bytes)
            }
            PasswordScheme::LegacyHash => Ok(encode_nt_hash(secret.expose_secret()).into_bytes()),
        }
    }
}
