//! Envelope encryption for opted-in state stores.
//!
//! Keyed per store name. Payload bytes are transformed to age ciphertext
//! (X25519 + ChaCha20-Poly1305) before dispatch on the write path and
//! decrypted after dispatch on the read path. The transform is binary
//! transparent: a decrypted payload is byte-identical to what was
//! submitted.

use std::io::{Read as IoRead, Write as IoWrite};

use dashmap::DashMap;
use thiserror::Error;

/// Encryption gate failures.
#[derive(Debug, Error)]
pub enum EncryptionError {
    /// The store has no encryption key registered.
    #[error("store {0} is not an encrypted store")]
    NotEnabled(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    Encrypt(String),

    /// Decryption failed (wrong key, corrupt or truncated ciphertext).
    #[error("decryption failed: {0}")]
    Decrypt(String),
}

struct StoreKey {
    identity: age::x25519::Identity,
    recipient: age::x25519::Recipient,
}

/// Opt-in envelope encryption, keyed per store name.
#[derive(Default)]
pub struct EncryptionGate {
    stores: DashMap<String, StoreKey>,
}

impl EncryptionGate {
    /// Creates a gate with no encrypted stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables encryption for a store with a freshly generated identity.
    pub fn enable_store(&self, store: impl Into<String>) {
        self.enable_store_with_identity(store, age::x25519::Identity::generate());
    }

    /// Enables encryption for a store with the given identity.
    pub fn enable_store_with_identity(
        &self,
        store: impl Into<String>,
        identity: age::x25519::Identity,
    ) {
        let recipient = identity.to_public();
        self.stores.insert(
            store.into(),
            StoreKey {
                identity,
                recipient,
            },
        );
    }

    /// Whether writes to this store must be encrypted.
    #[must_use]
    pub fn is_encrypted(&self, store: &str) -> bool {
        self.stores.contains_key(store)
    }

    /// Encrypts payload bytes for a store.
    pub fn encrypt(&self, store: &str, plaintext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let entry = self
            .stores
            .get(store)
            .ok_or_else(|| EncryptionError::NotEnabled(store.to_string()))?;

        let encryptor =
            age::Encryptor::with_recipients(vec![Box::new(entry.recipient.clone())])
                .ok_or_else(|| EncryptionError::Encrypt("no valid encryption recipients".into()))?;

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;

        writer
            .write_all(plaintext)
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| EncryptionError::Encrypt(e.to_string()))?;

        Ok(encrypted)
    }

    /// Decrypts ciphertext read from a store.
    pub fn decrypt(&self, store: &str, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        let entry = self
            .stores
            .get(store)
            .ok_or_else(|| EncryptionError::NotEnabled(store.to_string()))?;

        let age::Decryptor::Recipients(decryptor) =
            age::Decryptor::new(ciphertext).map_err(|e| EncryptionError::Decrypt(e.to_string()))?
        else {
            return Err(EncryptionError::Decrypt("unexpected decryptor type".into()));
        };

        let mut decrypted = vec![];
        let identity: &dyn age::Identity = &entry.identity;
        let mut reader = decryptor
            .decrypt(std::iter::once(identity))
            .map_err(|e| EncryptionError::Decrypt(e.to_string()))?;

        reader
            .read_to_end(&mut decrypted)
            .map_err(|e| EncryptionError::Decrypt(e.to_string()))?;

        Ok(decrypted)
    }
}

impl std::fmt::Debug for EncryptionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionGate")
            .field("stores", &self.stores.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_binary_transparent() {
        let gate = EncryptionGate::new();
        gate.enable_store("es1");

        let plaintext: Vec<u8> = (0u8..=255).collect();
        let ciphertext = gate.encrypt("es1", &plaintext).unwrap();
        assert_ne!(ciphertext, plaintext);

        let decrypted = gate.decrypt("es1", &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn ciphertexts_differ_for_identical_inputs() {
        let gate = EncryptionGate::new();
        gate.enable_store("es1");

        let first = gate.encrypt("es1", b"same").unwrap();
        let second = gate.encrypt("es1", b"same").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn unknown_store_is_rejected() {
        let gate = EncryptionGate::new();
        assert!(matches!(
            gate.encrypt("plain", b"data"),
            Err(EncryptionError::NotEnabled(_))
        ));
        assert!(!gate.is_encrypted("plain"));
    }

    #[test]
    fn corrupt_ciphertext_fails_decryption() {
        let gate = EncryptionGate::new();
        gate.enable_store("es1");

        let mut ciphertext = gate.encrypt("es1", b"payload").unwrap();
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0xFF;

        assert!(matches!(
            gate.decrypt("es1", &ciphertext),
            Err(EncryptionError::Decrypt(_))
        ));
    }

    #[test]
    fn stores_do_not_share_keys() {
        let gate = EncryptionGate::new();
        gate.enable_store("a");
        gate.enable_store("b");

        let ciphertext = gate.encrypt("a", b"payload").unwrap();
        assert!(gate.decrypt("b", &ciphertext).is_err());
    }
}
