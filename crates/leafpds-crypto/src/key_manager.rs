//! Encrypts signing/rotation keys at rest and derives the wrapping key
//! from the deployment's `key_encryption_secret` via HKDF-SHA256, the way
//! the repository's CAR bytes are derived from a content hash: the secret
//! never touches disk directly, only a key derived from it per purpose.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use leafpds_core::{EncryptedKey, KeyType, PdsError, PdsResult};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::signing::SigningKey;

const HKDF_SALT: &[u8] = b"leaf-pds-key-encryption";
const HKDF_INFO: &[u8] = b"aes-256-gcm-key";

/// A decrypted private-key scalar. Zeroized on drop so the plaintext
/// key never outlives the single signing/export call that needed it.
pub struct DecryptedKeyMaterial(Vec<u8>);

impl Drop for DecryptedKeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl DecryptedKeyMaterial {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn derive_wrapping_key(secret: &str) -> PdsResult<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), secret.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(HKDF_INFO, &mut okm)
        .map_err(|e| PdsError::Crypto(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// Encrypt a signing key pair's raw scalar bytes for storage.
pub fn encrypt_key(secret: &str, key: &SigningKey) -> PdsResult<EncryptedKey> {
    let key_type = match key {
        SigningKey::P256(_) => KeyType::P256,
        SigningKey::K256(_) => KeyType::Secp256k1,
    };
    let plaintext = key.to_bytes();
    encrypt_bytes(secret, &plaintext, key_type)
}

/// Encrypt raw key-scalar bytes directly (used by migration re-encryption).
pub fn encrypt_bytes(secret: &str, plaintext: &[u8], key_type: KeyType) -> PdsResult<EncryptedKey> {
    let wrapping_key = derive_wrapping_key(secret)?;
    let cipher = Aes256Gcm::new_from_slice(&wrapping_key)
        .map_err(|e| PdsError::Crypto(format!("cipher init failed: {e}")))?;

    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| PdsError::Crypto(format!("encryption failed: {e}")))?;

    Ok(EncryptedKey {
        ciphertext,
        iv,
        key_type,
    })
}

/// Decrypt a stored key back into its raw scalar bytes, then reconstruct
/// the signing key handle. The plaintext bytes are held only inside the
/// returned `DecryptedKeyMaterial` wrapper.
pub fn decrypt_key(secret: &str, encrypted: &EncryptedKey) -> PdsResult<SigningKey> {
    let plaintext = decrypt_bytes(secret, encrypted)?;
    let key_type = match encrypted.key_type {
        KeyType::P256 => "p256",
        KeyType::Secp256k1 => "k256",
    };
    SigningKey::from_bytes(key_type, plaintext.as_bytes())
}

pub fn decrypt_bytes(secret: &str, encrypted: &EncryptedKey) -> PdsResult<DecryptedKeyMaterial> {
    let wrapping_key = derive_wrapping_key(secret)?;
    let cipher = Aes256Gcm::new_from_slice(&wrapping_key)
        .map_err(|e| PdsError::Crypto(format!("cipher init failed: {e}")))?;
    let nonce = Nonce::from_slice(&encrypted.iv);

    let plaintext = cipher
        .decrypt(nonce, encrypted.ciphertext.as_ref())
        .map_err(|_| PdsError::Crypto("key decryption failed: bad secret or tampered data".into()))?;

    Ok(DecryptedKeyMaterial(plaintext))
}

/// SHA-256 hash of an opaque bearer token, hex-encoded, for at-rest
/// storage of refresh tokens and OAuth tokens (plaintext never persists).
pub fn hash_token(token: &str) -> String {
    use sha2::Digest;
    let digest = sha2::Sha256::digest(token.as_bytes());
    hex::encode(digest)
}

/// Generate a random, URL-safe opaque token of `len` raw bytes.
pub fn random_token(len: usize) -> String {
    use base64::Engine;
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = SigningKey::generate_p256().unwrap();
        let secret = "a very long key encryption secret used in tests";
        let enc = encrypt_key(secret, &key).unwrap();
        let restored = decrypt_key(secret, &enc).unwrap();
        assert_eq!(key.did_key(), restored.did_key());
    }

    #[test]
    fn wrong_secret_fails() {
        let key = SigningKey::generate_k256().unwrap();
        let enc = encrypt_key("secret-one-that-is-long-enough-ok", &key).unwrap();
        let err = decrypt_key("a-different-secret-also-long-enough", &enc);
        assert!(err.is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_iv() {
        let key = SigningKey::generate_p256().unwrap();
        let secret = "a very long key encryption secret used in tests";
        let a = encrypt_key(secret, &key).unwrap();
        let b = encrypt_key(secret, &key).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn token_hash_is_stable() {
        let a = hash_token("my-token");
        let b = hash_token("my-token");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn random_token_is_unique() {
        let a = random_token(32);
        let b = random_token(32);
        assert_ne!(a, b);
    }
}
