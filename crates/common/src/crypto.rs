//! Column encryption and hashing primitives.
//!
//! Encrypted columns use AES-256-GCM. Every row carries its own random
//! 96-bit `iv`; the key is derived per column from the master secret so
//! that sibling columns of a row never share a (key, nonce) pair.
//!
//! Hashed columns store an argon2id PHC string with a random salt; the
//! configured secret is mixed in as the argon2 pepper.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::CommonError;

pub const IV_LEN: usize = 12;
pub const HASH_PREFIX: &str = "$argon2";

#[derive(Clone)]
pub struct Encryption {
    master: [u8; 32],
}

impl std::fmt::Debug for Encryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encryption").finish_non_exhaustive()
    }
}

impl Encryption {
    pub fn from_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let mut master = [0u8; 32];
        master.copy_from_slice(&digest);
        Self { master }
    }

    /// Fresh random iv, hex encoded for storage in the `iv` column.
    pub fn generate_iv() -> String {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);
        hex::encode(iv)
    }

    fn column_cipher(&self, column: &str) -> Result<Aes256Gcm, CommonError> {
        let mut hasher = Sha256::new();
        hasher.update(self.master);
        hasher.update(column.as_bytes());
        let key = hasher.finalize();
        Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CommonError::Encryption(format!("invalid key: {e}")))
    }

    fn nonce_bytes(iv: &str) -> Result<[u8; IV_LEN], CommonError> {
        let raw = hex::decode(iv).map_err(|e| CommonError::Encryption(format!("bad iv: {e}")))?;
        if raw.len() != IV_LEN {
            return Err(CommonError::Encryption(format!(
                "bad iv length {} (expected {IV_LEN})",
                raw.len()
            )));
        }
        let mut out = [0u8; IV_LEN];
        out.copy_from_slice(&raw);
        Ok(out)
    }

    /// Encrypt `plaintext` for `column`, returning base64 ciphertext.
    pub fn encrypt(&self, column: &str, plaintext: &str, iv: &str) -> Result<String, CommonError> {
        let cipher = self.column_cipher(column)?;
        let nonce_bytes = Self::nonce_bytes(iv)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CommonError::Encryption(format!("encrypt failed: {e}")))?;
        Ok(STANDARD.encode(ciphertext))
    }

    pub fn decrypt(&self, column: &str, ciphertext: &str, iv: &str) -> Result<String, CommonError> {
        let cipher = self.column_cipher(column)?;
        let nonce_bytes = Self::nonce_bytes(iv)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let raw = STANDARD
            .decode(ciphertext)
            .map_err(|e| CommonError::Encryption(format!("bad ciphertext: {e}")))?;
        let plain = cipher
            .decrypt(nonce, raw.as_ref())
            .map_err(|e| CommonError::Encryption(format!("decrypt failed: {e}")))?;
        String::from_utf8(plain).map_err(|e| CommonError::Encryption(e.to_string()))
    }
}

fn hasher(secret: &str) -> Result<Argon2<'_>, CommonError> {
    Argon2::new_with_secret(secret.as_bytes(), Algorithm::Argon2id, Version::V0x13, Params::default())
        .map_err(|e| CommonError::Hashing(e.to_string()))
}

pub fn hash_value(value: &str, secret: &str) -> Result<String, CommonError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher(secret)?
        .hash_password(value.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CommonError::Hashing(e.to_string()))
}

/// Argon2 verification compares digests in constant time.
pub fn verify_hashed(value: &str, stored: &str, secret: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    hasher(secret).is_ok_and(|argon| argon.verify_password(value.as_bytes(), &parsed).is_ok())
}

pub fn is_value_hashed(value: &str) -> bool {
    value.starts_with(HASH_PREFIX) && PasswordHash::new(value).is_ok()
}
