//! AEAD cipher functions: AES-256-GCM and ChaCha20-Poly1305.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, CHACHA20_POLY1305};

use super::keypair::{Key, KEY_SIZE};

/// AEAD tag size (both ciphers).
pub const TAG_SIZE: usize = 16;

/// AEAD nonce size (both ciphers).
pub const NONCE_SIZE: usize = 12;

/// Counter value reserved by the Noise framework; never used for encryption.
pub const MAX_NONCE: u64 = u64::MAX;

/// Cipher functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cipher {
    /// AES-256-GCM, big-endian counter.
    AesGcm,
    /// ChaCha20-Poly1305, little-endian counter.
    ChaChaPoly,
}

impl Cipher {
    /// All supported ciphers.
    pub const ALL: &'static [Cipher] = &[Cipher::AesGcm, Cipher::ChaChaPoly];

    /// Canonical protocol-name token.
    pub fn name(&self) -> &'static str {
        match self {
            Cipher::AesGcm => "AESGCM",
            Cipher::ChaChaPoly => "ChaChaPoly",
        }
    }

    /// Key length in bytes.
    pub fn key_len(&self) -> usize {
        KEY_SIZE
    }

    /// Nonce length in bytes.
    pub fn nonce_len(&self) -> usize {
        NONCE_SIZE
    }

    /// First counter that may not be used; the all-ones value is reserved.
    pub fn nonce_ceiling(&self) -> u64 {
        MAX_NONCE
    }

    fn algorithm(&self) -> &'static ring::aead::Algorithm {
        match self {
            Cipher::AesGcm => &AES_256_GCM,
            Cipher::ChaChaPoly => &CHACHA20_POLY1305,
        }
    }

    /// Builds the 96-bit nonce for `counter`.
    pub fn make_nonce(&self, counter: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = [0u8; NONCE_SIZE];
        match self {
            Cipher::AesGcm => nonce[4..].copy_from_slice(&counter.to_be_bytes()),
            Cipher::ChaChaPoly => nonce[4..].copy_from_slice(&counter.to_le_bytes()),
        }
        nonce
    }

    /// Creates a keyed AEAD instance.
    pub fn init(&self, key: &Key) -> AeadKey {
        let unbound = UnboundKey::new(self.algorithm(), key.as_bytes()).expect("valid key size");
        AeadKey {
            cipher: *self,
            key: LessSafeKey::new(unbound),
        }
    }

    /// One-shot encryption, returning ciphertext with the tag appended.
    pub fn encrypt(&self, key: &Key, nonce: u64, ad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        self.init(key).seal(nonce, ad, plaintext)
    }

    /// One-shot decryption.
    pub fn decrypt(&self, key: &Key, nonce: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        self.init(key).open(nonce, ad, ciphertext)
    }
}

/// A cipher bound to a key.
pub struct AeadKey {
    cipher: Cipher,
    key: LessSafeKey,
}

impl AeadKey {
    /// Encrypts `plaintext` under counter `nonce`.
    pub fn seal(&self, nonce: u64, ad: &[u8], plaintext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(plaintext.len() + TAG_SIZE);
        out.extend_from_slice(plaintext);
        let n = Nonce::assume_unique_for_key(self.cipher.make_nonce(nonce));
        self.key
            .seal_in_place_append_tag(n, Aad::from(ad), &mut out)
            .expect("encryption failed");
        out
    }

    /// Decrypts and authenticates `ciphertext` under counter `nonce`.
    pub fn open(&self, nonce: u64, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if ciphertext.len() < TAG_SIZE {
            return Err(DecryptError);
        }
        let mut buffer = ciphertext.to_vec();
        let n = Nonce::assume_unique_for_key(self.cipher.make_nonce(nonce));
        let len = self
            .key
            .open_in_place(n, Aad::from(ad), &mut buffer)
            .map_err(|_| DecryptError)?
            .len();
        buffer.truncate(len);
        Ok(buffer)
    }
}

/// Decryption error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("decryption failed")]
pub struct DecryptError;
