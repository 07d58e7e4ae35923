//! Envelope encryption for secrets at rest (exchange API keys and the like).
//!
//! Wire format, hex-encoded: `IV (16 bytes) || auth tag (16 bytes) ||
//! ciphertext`. The 16-byte IV is a compatibility constraint inherited from
//! previously stored envelopes; AES-GCM is instantiated with a 128-bit nonce
//! to match it.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{aes::Aes256, AesGcm, Nonce};
use rand::RngCore;

use crate::error::{SecurityError, SecurityResult};

/// AES-256-GCM with a 128-bit nonce.
type EnvelopeCipher = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Symmetric authenticated encryption under a single configured 256-bit key.
///
/// Performs no authorization itself; restricting `decrypt` to privileged
/// callers is the endpoint's job.
pub struct EncryptionService {
    cipher: EnvelopeCipher,
}

impl EncryptionService {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = EnvelopeCipher::new_from_slice(key).expect("key length is fixed at 32 bytes");
        Self { cipher }
    }

    /// Build from a 64-hex-character key string, as supplied by configuration.
    pub fn from_hex_key(hex_key: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(hex_key)?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("encryption key must be 32 bytes (64 hex characters)"))?;
        Ok(Self::new(&key))
    }

    /// Encrypt plaintext into a hex envelope with a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> SecurityResult<String> {
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        // The aead API appends the tag to the ciphertext; the envelope layout
        // wants IV || tag || ciphertext, so split and reorder.
        let sealed = self
            .cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext)
            .map_err(|_| SecurityError::DecryptionFailed)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        let mut envelope = Vec::with_capacity(IV_LEN + TAG_LEN + ciphertext.len());
        envelope.extend_from_slice(&iv);
        envelope.extend_from_slice(tag);
        envelope.extend_from_slice(ciphertext);
        Ok(hex::encode(envelope))
    }

    /// Decrypt a hex envelope.
    ///
    /// Malformed input, a wrong key, and tampered data all surface as the
    /// same [`SecurityError::DecryptionFailed`]; the distinction is logged
    /// locally only.
    pub fn decrypt(&self, envelope_hex: &str) -> SecurityResult<Vec<u8>> {
        let envelope = hex::decode(envelope_hex).map_err(|e| {
            tracing::debug!(error = %e, "Envelope is not valid hex");
            SecurityError::DecryptionFailed
        })?;

        if envelope.len() < IV_LEN + TAG_LEN {
            tracing::debug!(len = envelope.len(), "Envelope shorter than IV + tag");
            return Err(SecurityError::DecryptionFailed);
        }

        let (iv, rest) = envelope.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
        sealed.extend_from_slice(ciphertext);
        sealed.extend_from_slice(tag);

        self.cipher
            .decrypt(Nonce::<U16>::from_slice(iv), sealed.as_ref())
            .map_err(|_| {
                tracing::debug!("Envelope failed authentication");
                SecurityError::DecryptionFailed
            })
    }
}
