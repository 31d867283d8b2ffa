//! Password encryption for container payloads.
//!
//! AES-256-GCM with a key derived from the password by Argon2id. Output is
//! `[salt:16][nonce:12][ciphertext+tag]`; salt and nonce are fresh per call.

use crate::error::ContainerError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::Argon2;

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Encrypt `plaintext` under `password`.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<Vec<u8>, ContainerError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    getrandom::getrandom(&mut salt).map_err(|e| ContainerError::Encryption(e.to_string()))?;
    getrandom::getrandom(&mut nonce).map_err(|e| ContainerError::Encryption(e.to_string()))?;

    let cipher = cipher_for(password, &salt)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| ContainerError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt data produced by [`encrypt`]. A wrong password and tampered
/// data are indistinguishable and both yield [`ContainerError::Decryption`].
pub fn decrypt(data: &[u8], password: &str) -> Result<Vec<u8>, ContainerError> {
    if data.len() < SALT_LEN + NONCE_LEN {
        return Err(ContainerError::TooShort(data.len()));
    }
    let (salt, rest) = data.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let cipher = cipher_for(password, salt)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| ContainerError::Decryption)
}

fn cipher_for(password: &str, salt: &[u8]) -> Result<Aes256Gcm, ContainerError> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| ContainerError::KeyDerivation(e.to_string()))?;
    Aes256Gcm::new_from_slice(&key).map_err(|e| ContainerError::KeyDerivation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let sealed = encrypt(b"rule bytes", "hunter2").unwrap();
        assert_eq!(sealed.len(), SALT_LEN + NONCE_LEN + 10 + 16);
        assert_eq!(decrypt(&sealed, "hunter2").unwrap(), b"rule bytes");
    }

    #[test]
    fn test_fresh_salt_and_nonce() {
        let a = encrypt(b"same", "pw").unwrap();
        let b = encrypt(b"same", "pw").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_password_and_tampering() {
        let mut sealed = encrypt(b"payload", "right").unwrap();
        assert_eq!(decrypt(&sealed, "wrong"), Err(ContainerError::Decryption));

        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert_eq!(decrypt(&sealed, "right"), Err(ContainerError::Decryption));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(decrypt(&[0; 10], "pw"), Err(ContainerError::TooShort(10)));
    }
}
