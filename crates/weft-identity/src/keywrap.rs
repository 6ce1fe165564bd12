//! Passphrase encryption for stored private keys.
//!
//! Keys at rest are PKCS#8 DER wrapped with AES-256-GCM under a key derived
//! from the passphrase with PBKDF2-HMAC-SHA256. The stored PEM payload is
//! `salt(16) || nonce(12) || ciphertext`.

use crate::{Error, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

const PEM_TAG: &str = "WEFT ENCRYPTED PRIVATE KEY";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const PBKDF2_ITERATIONS: u32 = 100_000;

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iteration count"),
        salt,
        password.as_bytes(),
        &mut key,
    );
    key
}

/// Encrypts a PKCS#8 DER private key into an armored PEM string.
pub fn encrypt_private_key(pkcs8_der: &[u8], password: &str) -> Result<String> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut salt)
        .and_then(|()| rng.fill(&mut nonce))
        .map_err(|_| Error::Crypto("random generator failure".to_string()))?;

    let key = derive_key(password, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), pkcs8_der)
        .map_err(|_| Error::Crypto("key encryption failure".to_string()))?;

    let mut payload = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    payload.extend_from_slice(&salt);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&ciphertext);

    Ok(pem::encode(&pem::Pem::new(PEM_TAG, payload)))
}

/// Decrypts an armored PEM string back into PKCS#8 DER.
///
/// # Errors
///
/// [`Error::DecryptionFailed`] for a wrong password or tampered payload.
pub fn decrypt_private_key(pem_str: &str, password: &str) -> Result<Vec<u8>> {
    let block = pem::parse(pem_str)
        .map_err(|e| Error::Certificate(format!("failed to parse key PEM: {e}")))?;
    if block.tag() != PEM_TAG {
        return Err(Error::Certificate(format!(
            "expected {PEM_TAG} PEM block, got {}",
            block.tag()
        )));
    }

    let payload = block.contents();
    if payload.len() < SALT_LEN + NONCE_LEN {
        return Err(Error::DecryptionFailed);
    }
    let (salt, rest) = payload.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

    let key = derive_key(password, salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

/// Whether a key PEM block is passphrase-encrypted.
pub fn is_encrypted(pem_str: &str) -> bool {
    pem::parse(pem_str).map(|b| b.tag() == PEM_TAG).unwrap_or(false)
}
