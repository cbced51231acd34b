//! CipherState and SymmetricState for Noise Protocol.

use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::{AeadKey, Cipher};
use super::hash::{truncate_key, HashFn, SecretBytes};
use super::keypair::Key;

/// CipherState errors. All of them are fatal to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CipherError {
    #[error("nonce space exhausted")]
    NonceExhausted,
    #[error("nonce may only move forward")]
    NonceReuse,
    #[error("decryption failed")]
    Decryption,
}

/// Manages encryption for one direction of communication.
///
/// The nonce is owned here and only ever increases; it is never reset.
pub struct CipherState {
    key: Key,
    cipher: AeadKey,
    nonce: u64,
    nonce_limit: u64,
}

impl CipherState {
    /// Creates a new CipherState with the given key.
    pub fn new(cipher: Cipher, key: Key) -> Self {
        let aead = cipher.init(&key);
        Self {
            key,
            cipher: aead,
            nonce: 0,
            nonce_limit: cipher.nonce_ceiling(),
        }
    }

    /// Lowers the exhaustion ceiling. Counters at or above `limit` are refused.
    pub fn with_nonce_limit(mut self, limit: u64) -> Self {
        self.nonce_limit = limit.min(self.nonce_limit);
        self
    }

    fn next_nonce(&self) -> Result<u64, CipherError> {
        if self.nonce >= self.nonce_limit {
            return Err(CipherError::NonceExhausted);
        }
        Ok(self.nonce)
    }

    /// Encrypts plaintext with associated data and increments nonce.
    pub fn encrypt_with_ad(&mut self, ad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = self.next_nonce()?;
        let ciphertext = self.cipher.seal(nonce, ad, plaintext);
        self.nonce += 1;
        Ok(ciphertext)
    }

    /// Decrypts ciphertext with associated data and increments nonce.
    /// The nonce is left untouched when authentication fails.
    pub fn decrypt_with_ad(&mut self, ad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = self.next_nonce()?;
        let plaintext = self
            .cipher
            .open(nonce, ad, ciphertext)
            .map_err(|_| CipherError::Decryption)?;
        self.nonce += 1;
        Ok(plaintext)
    }

    /// Encrypts a transport message.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.encrypt_with_ad(&[], plaintext)
    }

    /// Decrypts a transport message.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.decrypt_with_ad(&[], ciphertext)
    }

    /// Returns current nonce value.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Advances the nonce to `n`. Moving it backwards is refused.
    pub fn set_nonce(&mut self, n: u64) -> Result<(), CipherError> {
        if n < self.nonce {
            return Err(CipherError::NonceReuse);
        }
        self.nonce = n;
        Ok(())
    }

    /// Returns the key.
    pub fn key(&self) -> &Key {
        &self.key
    }
}

/// Holds the evolving state during a Noise handshake.
pub struct SymmetricState {
    hash_fn: HashFn,
    cipher: Cipher,
    chaining_key: SecretBytes,
    hash: Vec<u8>,
    cs: Option<CipherState>,
}

impl SymmetricState {
    /// Creates a new SymmetricState from the full protocol name.
    pub fn new(protocol_name: &str, cipher: Cipher, hash_fn: HashFn) -> Self {
        let hash_len = hash_fn.hash_len();
        let hash = if protocol_name.len() <= hash_len {
            let mut h = protocol_name.as_bytes().to_vec();
            h.resize(hash_len, 0);
            h
        } else {
            hash_fn.hash(&[protocol_name.as_bytes()])
        };

        Self {
            hash_fn,
            cipher,
            chaining_key: Zeroizing::new(hash.clone()),
            hash,
            cs: None,
        }
    }

    /// Mixes input into the chaining key and rekeys the cipher.
    pub fn mix_key(&mut self, input: &[u8]) {
        let (ck, temp_k) = self.hash_fn.kdf2(&self.chaining_key, input);
        self.chaining_key = ck;
        self.cs = Some(CipherState::new(self.cipher, truncate_key(&temp_k)));
    }

    /// Mixes data into the hash.
    pub fn mix_hash(&mut self, data: &[u8]) {
        self.hash = self.hash_fn.hash(&[&self.hash, data]);
    }

    /// Mixes input into both chaining key and hash (for PSK).
    pub fn mix_key_and_hash(&mut self, input: &[u8]) {
        let (ck, temp_h, temp_k) = self.hash_fn.kdf3(&self.chaining_key, input);
        self.chaining_key = ck;
        self.mix_hash(&temp_h);
        self.cs = Some(CipherState::new(self.cipher, truncate_key(&temp_k)));
    }

    /// True once any key material has been mixed in.
    pub fn has_key(&self) -> bool {
        self.cs.is_some()
    }

    /// Encrypts plaintext (if keyed) and updates hash.
    pub fn encrypt_and_hash(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let ciphertext = match self.cs.as_mut() {
            Some(cs) => cs.encrypt_with_ad(&self.hash, plaintext)?,
            None => plaintext.to_vec(),
        };
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    /// Decrypts ciphertext (if keyed) and updates hash.
    pub fn decrypt_and_hash(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let plaintext = match self.cs.as_mut() {
            Some(cs) => cs.decrypt_with_ad(&self.hash, ciphertext)?,
            None => ciphertext.to_vec(),
        };
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    /// Splits into two CipherStates: (initiator→responder, responder→initiator).
    pub fn split(&self) -> (CipherState, CipherState) {
        let (k1, k2) = self.hash_fn.kdf2(&self.chaining_key, &[]);
        (
            CipherState::new(self.cipher, truncate_key(&k1)),
            CipherState::new(self.cipher, truncate_key(&k2)),
        )
    }

    /// Returns the current chaining key.
    pub fn chaining_key(&self) -> &[u8] {
        &self.chaining_key
    }

    /// Returns the current hash.
    pub fn hash(&self) -> &[u8] {
        &self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::keypair::KEY_SIZE;

    fn pair(cipher: Cipher) -> (CipherState, CipherState) {
        let key = Key::new([42u8; KEY_SIZE]);
        (CipherState::new(cipher, key.clone()), CipherState::new(cipher, key))
    }

    #[test]
    fn test_cipher_state_new() {
        let key = Key::new([42u8; KEY_SIZE]);
        let cs = CipherState::new(Cipher::AesGcm, key.clone());
        assert_eq!(cs.nonce(), 0);
        assert_eq!(cs.key(), &key);
    }

    #[test]
    fn test_cipher_state_encrypt_decrypt() {
        let (mut cs1, mut cs2) = pair(Cipher::ChaChaPoly);

        let plaintext = b"hello, world!";
        let ct = cs1.encrypt(plaintext).unwrap();
        assert_eq!(cs1.nonce(), 1);

        let pt = cs2.decrypt(&ct).unwrap();
        assert_eq!(cs2.nonce(), 1);
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn test_cipher_state_nonce_increment() {
        let (mut cs, _) = pair(Cipher::AesGcm);
        for i in 0..10 {
            assert_eq!(cs.nonce(), i);
            cs.encrypt(b"test").unwrap();
        }
    }

    #[test]
    fn test_cipher_state_failed_decrypt_keeps_nonce() {
        let (mut cs1, mut cs2) = pair(Cipher::AesGcm);
        let mut ct = cs1.encrypt(b"test").unwrap();
        ct[0] ^= 1;
        assert_eq!(cs2.decrypt(&ct), Err(CipherError::Decryption));
        assert_eq!(cs2.nonce(), 0);
    }

    #[test]
    fn test_cipher_state_set_nonce_forward_only() {
        let (mut cs, _) = pair(Cipher::AesGcm);
        cs.set_nonce(100).unwrap();
        assert_eq!(cs.nonce(), 100);
        assert_eq!(cs.set_nonce(99), Err(CipherError::NonceReuse));
        assert_eq!(cs.nonce(), 100);
    }

    #[test]
    fn test_cipher_state_wrong_nonce() {
        let (mut cs1, mut cs2) = pair(Cipher::ChaChaPoly);
        let ct = cs1.encrypt(b"test").unwrap();
        cs2.set_nonce(5).unwrap();
        assert!(cs2.decrypt(&ct).is_err());
    }

    #[test]
    fn test_cipher_state_exhaustion() {
        let (cs, _) = pair(Cipher::AesGcm);
        let mut cs = cs.with_nonce_limit(3);
        for _ in 0..3 {
            cs.encrypt(b"x").unwrap();
        }
        assert_eq!(cs.encrypt(b"x"), Err(CipherError::NonceExhausted));
        assert_eq!(cs.nonce(), 3);
    }

    #[test]
    fn test_cipher_state_reserved_nonce() {
        for cipher in Cipher::ALL {
            let (mut cs, _) = pair(*cipher);
            cs.set_nonce(cipher.nonce_ceiling() - 1).unwrap();
            cs.encrypt(b"last").unwrap();
            assert_eq!(cs.encrypt(b"overflow"), Err(CipherError::NonceExhausted));
            assert_eq!(cs.nonce(), u64::MAX);
        }
    }

    #[test]
    fn test_nonce_limit_never_raises_ceiling() {
        let (cs, _) = pair(Cipher::AesGcm);
        let mut cs = cs.with_nonce_limit(u64::MAX);
        cs.set_nonce(u64::MAX).unwrap();
        assert_eq!(cs.encrypt(b"reserved"), Err(CipherError::NonceExhausted));
    }

    #[test]
    fn test_symmetric_state_new() {
        // Short name is padded
        let ss1 = SymmetricState::new("Noise_NN", Cipher::AesGcm, HashFn::Sha256);
        assert_eq!(&ss1.hash()[..8], b"Noise_NN");
        assert!(ss1.hash()[8..].iter().all(|&b| b == 0));
        assert_eq!(ss1.chaining_key(), ss1.hash());

        // Long name is hashed
        let name = "Noise_XXpsk0+psk3_25519_ChaChaPoly_BLAKE2s";
        let ss2 = SymmetricState::new(name, Cipher::ChaChaPoly, HashFn::Blake2s);
        assert_eq!(ss2.hash(), HashFn::Blake2s.hash(&[name.as_bytes()]).as_slice());
        assert!(!ss2.has_key());
    }

    #[test]
    fn test_symmetric_state_mix_hash() {
        let mut ss = SymmetricState::new("Test", Cipher::AesGcm, HashFn::Sha512);
        let initial = ss.hash().to_vec();
        ss.mix_hash(b"data");
        assert_ne!(ss.hash(), initial.as_slice());
        assert_eq!(ss.hash().len(), 64);
    }

    #[test]
    fn test_symmetric_state_mix_key() {
        let mut ss = SymmetricState::new("Test", Cipher::AesGcm, HashFn::Sha256);
        let initial = ss.chaining_key().to_vec();
        ss.mix_key(b"input");
        assert_ne!(ss.chaining_key(), initial.as_slice());
        assert!(ss.has_key());
    }

    #[test]
    fn test_symmetric_state_mix_key_and_hash() {
        let mut ss = SymmetricState::new("Test", Cipher::AesGcm, HashFn::Blake2b);
        let initial_ck = ss.chaining_key().to_vec();
        let initial_h = ss.hash().to_vec();

        ss.mix_key_and_hash(b"input");

        assert_ne!(ss.chaining_key(), initial_ck.as_slice());
        assert_ne!(ss.hash(), initial_h.as_slice());
        assert!(ss.has_key());
    }

    #[test]
    fn test_symmetric_state_unkeyed_passthrough() {
        let mut ss = SymmetricState::new("Test", Cipher::AesGcm, HashFn::Sha256);
        let out = ss.encrypt_and_hash(b"plain").unwrap();
        assert_eq!(out, b"plain");
    }

    #[test]
    fn test_symmetric_state_encrypt_decrypt_and_hash() {
        let mut ss1 = SymmetricState::new("Test", Cipher::ChaChaPoly, HashFn::Sha256);
        let mut ss2 = SymmetricState::new("Test", Cipher::ChaChaPoly, HashFn::Sha256);

        ss1.mix_key(b"key");
        ss2.mix_key(b"key");

        let plaintext = b"secret message";
        let ct = ss1.encrypt_and_hash(plaintext).unwrap();
        assert_ne!(ct.as_slice(), plaintext);
        let pt = ss2.decrypt_and_hash(&ct).unwrap();

        assert_eq!(pt, plaintext);
        assert_eq!(ss1.hash(), ss2.hash());
    }

    #[test]
    fn test_symmetric_state_split() {
        let mut ss = SymmetricState::new("Test", Cipher::AesGcm, HashFn::Sha512);
        ss.mix_key(b"input");

        let (cs1, cs2) = ss.split();
        assert_ne!(cs1.key(), cs2.key());
    }
}
