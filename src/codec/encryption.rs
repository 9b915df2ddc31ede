//! Password-based entry encryption.
//!
//! Each payload gets a fresh random salt and nonce. The key is derived with
//! PBKDF2-HMAC-SHA256 and the data sealed with AES-256-GCM, so a wrong
//! password or a modified payload fails authentication instead of yielding
//! garbage.
//!
//! Layout: `[salt 16][nonce 12][ciphertext || tag 16]`

use crate::context::Password;
use crate::error::{ArchiveError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use sha2::Sha256;
use zeroize::Zeroizing;

pub const SALT_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

/// Bytes added to every encrypted payload
pub const OVERHEAD: usize = SALT_SIZE + NONCE_SIZE + TAG_SIZE;

/// PBKDF2 iteration count
pub const PBKDF2_ROUNDS: u32 = 10_000;

fn derive_key(password: &Password, salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key[..]);
    key
}

fn cipher_for(password: &Password, salt: &[u8]) -> Aes256Gcm {
    let key = derive_key(password, salt);
    let key_bytes: &[u8; 32] = &key;
    Aes256Gcm::new(key_bytes.into())
}

/// Encrypt `data` with a key derived from `password`
pub fn encrypt(data: &[u8], password: &Password) -> Result<Vec<u8>> {
    let salt: [u8; SALT_SIZE] = rand::random();
    let nonce_bytes: [u8; NONCE_SIZE] = rand::random();
    #[allow(deprecated)]
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext_with_tag = cipher_for(password, &salt)
        .encrypt(nonce, data)
        .map_err(|_| ArchiveError::EncryptionFailed)?;

    let mut payload = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext_with_tag.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce_bytes);
    payload.extend_from_slice(&ciphertext_with_tag);
    Ok(payload)
}

/// Decrypt a payload produced by [`encrypt`]
pub fn decrypt(payload: &[u8], password: &Password) -> Result<Vec<u8>> {
    if payload.len() < OVERHEAD {
        return Err(ArchiveError::DecryptionFailed);
    }

    let (salt, rest) = payload.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext_with_tag) = rest.split_at(NONCE_SIZE);
    #[allow(deprecated)]
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher_for(password, salt)
        .decrypt(nonce, ciphertext_with_tag)
        .map_err(|_| ArchiveError::DecryptionFailed)
}
