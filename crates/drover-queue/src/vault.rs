//! Credential vault.
//!
//! Private keys are sealed with AES-256-GCM under a key derived from a
//! passphrase. Ciphertexts are `base64(nonce || sealed)`, so the store can
//! use them directly as JSON object keys.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::QueueError;

/// Passphrase used when the operator declines to set one.
pub const DEFAULT_PASSPHRASE: &str = "drover default vault passphrase";

const NONCE_LEN: usize = 12;

/// Symmetric key derived from a passphrase.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultKey([u8; 32]);

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

/// Derive a vault key from a passphrase.
pub fn derive_key(passphrase: &str) -> VaultKey {
    VaultKey(Sha256::digest(passphrase.as_bytes()).into())
}

/// Seal a secret under `key`.
pub fn encrypt(secret: &str, key: &VaultKey) -> Result<String, QueueError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let sealed = cipher
        .encrypt(&nonce, secret.as_bytes())
        .map_err(|e| QueueError::Config(format!("failed to encrypt secret: {}", e)))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(STANDARD.encode(out))
}

/// Open a ciphertext produced by [`encrypt`].
///
/// Fails with [`QueueError::Authentication`] when `key` is not the key it was sealed with.
pub fn decrypt(ciphertext: &str, key: &VaultKey) -> Result<String, QueueError> {
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| QueueError::Authentication(format!("ciphertext is not base64: {}", e)))?;
    if raw.len() <= NONCE_LEN {
        return Err(QueueError::Authentication("ciphertext too short".to_string()));
    }

    let (nonce, sealed) = raw.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| QueueError::Authentication("invalid password".to_string()))?;

    String::from_utf8(plain)
        .map_err(|e| QueueError::Authentication(format!("decrypted secret is not UTF-8: {}", e)))
}

/// Where unlock attempts get their passphrases from.
pub trait PassphraseSource {
    /// Next candidate passphrase, or `None` when the user gives up.
    fn next_passphrase(&mut self, prompt: &str) -> Option<String>;
}

/// Reads passphrases from the terminal without echo.
pub struct TerminalPrompt;

impl PassphraseSource for TerminalPrompt {
    fn next_passphrase(&mut self, prompt: &str) -> Option<String> {
        eprint!("{}", prompt);
        rpassword::read_password().ok()
    }
}

/// Holds the derived key for a run. Read-only once established.
#[derive(Debug, Clone)]
pub struct Vault {
    key: VaultKey,
}

impl Vault {
    pub fn new(key: VaultKey) -> Self {
        Self { key }
    }

    /// Build a vault from an operator-chosen passphrase; empty selects the default.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let passphrase = passphrase.trim();
        if passphrase.is_empty() {
            Self::new(derive_key(DEFAULT_PASSPHRASE))
        } else {
            Self::new(derive_key(passphrase))
        }
    }

    /// Establish the key for an existing store.
    ///
    /// `sample` is any ciphertext from the store. The default key is tried
    /// first; after that `source` is asked repeatedly until a passphrase opens
    /// the sample or it returns `None` or an empty string.
    pub fn unlock(
        sample: Option<&str>,
        source: &mut dyn PassphraseSource,
    ) -> Result<Self, QueueError> {
        let default = derive_key(DEFAULT_PASSPHRASE);
        let Some(sample) = sample else {
            return Ok(Self::new(default));
        };

        if decrypt(sample, &default).is_ok() {
            return Ok(Self::new(default));
        }

        loop {
            let passphrase = source
                .next_passphrase("Enter password to decrypt your private keys: ")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .ok_or_else(|| QueueError::Authentication("unlock aborted".to_string()))?;

            let key = derive_key(&passphrase);
            match decrypt(sample, &key) {
                Ok(_) => {
                    info!("access granted");
                    return Ok(Self::new(key));
                }
                Err(_) => warn!("invalid password"),
            }
        }
    }

    pub fn key(&self) -> &VaultKey {
        &self.key
    }

    pub fn encrypt(&self, secret: &str) -> Result<String, QueueError> {
        encrypt(secret, &self.key)
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, QueueError> {
        decrypt(ciphertext, &self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<&'static str>, usize);

    impl PassphraseSource for Scripted {
        fn next_passphrase(&mut self, _prompt: &str) -> Option<String> {
            self.1 += 1;
            self.0.pop_front().map(str::to_string)
        }
    }

    #[test]
    fn test_wrong_key_is_authentication_error() {
        let sealed = encrypt("0xsecret", &derive_key("right")).unwrap();
        let err = decrypt(&sealed, &derive_key("wrong")).unwrap_err();
        assert!(matches!(err, QueueError::Authentication(_)));
    }

    #[test]
    fn test_garbage_ciphertext_rejected() {
        let key = derive_key("k");
        assert!(matches!(
            decrypt("not base64!!", &key),
            Err(QueueError::Authentication(_))
        ));
        assert!(matches!(decrypt("AAAA", &key), Err(QueueError::Authentication(_))));
    }

    #[test]
    fn test_nonce_makes_ciphertexts_distinct() {
        let key = derive_key("k");
        assert_ne!(encrypt("same", &key).unwrap(), encrypt("same", &key).unwrap());
    }

    #[test]
    fn test_empty_passphrase_selects_default() {
        let vault = Vault::from_passphrase("  ");
        assert_eq!(vault.key(), &derive_key(DEFAULT_PASSPHRASE));
    }

    #[test]
    fn test_unlock_default_key_without_prompt() {
        let sealed = Vault::from_passphrase("").encrypt("pk").unwrap();
        let mut source = Scripted(VecDeque::new(), 0);
        let vault = Vault::unlock(Some(&sealed), &mut source).unwrap();
        assert_eq!(vault.decrypt(&sealed).unwrap(), "pk");
        assert_eq!(source.1, 0);
    }

    #[test]
    fn test_unlock_prompts_until_correct() {
        let sealed = Vault::from_passphrase("hunter2").encrypt("pk").unwrap();
        let mut source = Scripted(VecDeque::from(["nope", "still nope", "hunter2"]), 0);
        let vault = Vault::unlock(Some(&sealed), &mut source).unwrap();
        assert_eq!(vault.decrypt(&sealed).unwrap(), "pk");
        assert_eq!(source.1, 3);
    }

    #[test]
    fn test_unlock_aborts_when_source_gives_up() {
        let sealed = Vault::from_passphrase("hunter2").encrypt("pk").unwrap();
        let mut source = Scripted(VecDeque::from(["nope"]), 0);
        let err = Vault::unlock(Some(&sealed), &mut source).unwrap_err();
        assert!(matches!(err, QueueError::Authentication(_)));
    }

    #[test]
    fn test_unlock_empty_store_uses_default() {
        let mut source = Scripted(VecDeque::new(), 0);
        let vault = Vault::unlock(None, &mut source).unwrap();
        assert_eq!(vault.key(), &derive_key(DEFAULT_PASSPHRASE));
    }

    proptest! {
        #[test]
        fn vault_roundtrip(secret in ".{1,200}", passphrase in ".{0,40}") {
            let key = derive_key(&passphrase);
            let sealed = encrypt(&secret, &key).unwrap();
            prop_assert_eq!(decrypt(&sealed, &key).unwrap(), secret);
        }

        #[test]
        fn vault_wrong_key_never_opens(secret in ".{1,64}", a in "[a-z]{1,16}", b in "[A-Z]{1,16}") {
            let sealed = encrypt(&secret, &derive_key(&a)).unwrap();
            let is_auth_error = matches!(decrypt(&sealed, &derive_key(&b)), Err(QueueError::Authentication(_)));
            prop_assert!(is_auth_error);
        }
    }
}
