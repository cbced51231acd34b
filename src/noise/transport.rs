//! Post-handshake transport cipher: one CipherState per direction.

use std::io;

use thiserror::Error;

use super::handshake::TransportKeys;
use super::message::{MAX_MESSAGE_SIZE, MAX_PLAINTEXT_SIZE};
use super::state::{CipherError, CipherState};

/// Transport errors. Every variant terminates the session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection reset by peer")]
    ConnectionReset,
    #[error("connection closed in the middle of a frame")]
    ShortRead,
    #[error("payload of {0} bytes exceeds the {max}-byte frame limit", max = MAX_MESSAGE_SIZE)]
    PayloadTooLarge(usize),
    #[error("nonce space exhausted")]
    NonceExhausted,
    #[error("decryption failed")]
    Decryption,
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<CipherError> for TransportError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::Decryption => TransportError::Decryption,
            CipherError::NonceExhausted | CipherError::NonceReuse => TransportError::NonceExhausted,
        }
    }
}

/// Encrypting half of the transport cipher.
pub struct SendCipher {
    cs: CipherState,
}

impl SendCipher {
    pub fn new(cs: CipherState) -> Self {
        Self { cs }
    }

    /// Encrypts one chunk into one frame payload.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(TransportError::PayloadTooLarge(plaintext.len()));
        }
        Ok(self.cs.encrypt(plaintext)?)
    }

    /// Messages sent so far.
    pub fn nonce(&self) -> u64 {
        self.cs.nonce()
    }

    /// Access to the underlying state (tests, diagnostics).
    pub fn cipher_state(&mut self) -> &mut CipherState {
        &mut self.cs
    }
}

/// Decrypting half of the transport cipher.
pub struct RecvCipher {
    cs: CipherState,
}

impl RecvCipher {
    pub fn new(cs: CipherState) -> Self {
        Self { cs }
    }

    /// Authenticates and decrypts one frame payload.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
        if ciphertext.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::PayloadTooLarge(ciphertext.len()));
        }
        Ok(self.cs.decrypt(ciphertext)?)
    }

    /// Messages received so far.
    pub fn nonce(&self) -> u64 {
        self.cs.nonce()
    }

    /// Access to the underlying state (tests, diagnostics).
    pub fn cipher_state(&mut self) -> &mut CipherState {
        &mut self.cs
    }
}

/// Bidirectional transport cipher built from the handshake output.
pub struct TransportCipher {
    send: SendCipher,
    recv: RecvCipher,
}

impl TransportCipher {
    /// Wraps a send and a receive CipherState.
    pub fn new(send: CipherState, recv: CipherState) -> Self {
        Self {
            send: SendCipher::new(send),
            recv: RecvCipher::new(recv),
        }
    }

    /// Encrypts an outgoing chunk.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.send.seal(plaintext)
    }

    /// Decrypts an incoming frame payload.
    pub fn open(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.recv.open(ciphertext)
    }

    /// Splits into independently owned directions.
    pub fn split(self) -> (SendCipher, RecvCipher) {
        (self.send, self.recv)
    }
}

impl From<TransportKeys> for TransportCipher {
    fn from(keys: TransportKeys) -> Self {
        let TransportKeys { send, recv, .. } = keys;
        Self::new(send, recv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::cipher::{Cipher, TAG_SIZE};
    use crate::noise::keypair::Key;

    fn mirrored() -> (TransportCipher, TransportCipher) {
        let k1 = Key::new([1u8; 32]);
        let k2 = Key::new([2u8; 32]);
        let a = TransportCipher::new(
            CipherState::new(Cipher::AesGcm, k1.clone()),
            CipherState::new(Cipher::AesGcm, k2.clone()),
        );
        let b = TransportCipher::new(CipherState::new(Cipher::AesGcm, k2), CipherState::new(Cipher::AesGcm, k1));
        (a, b)
    }

    #[test]
    fn test_round_trip_in_order() {
        let (mut a, mut b) = mirrored();
        let chunks: Vec<Vec<u8>> = vec![
            Vec::new(),
            b"x".to_vec(),
            vec![0x55; 1000],
            vec![0xaa; MAX_PLAINTEXT_SIZE],
        ];
        let sealed: Vec<Vec<u8>> = chunks.iter().map(|c| a.seal(c).unwrap()).collect();
        for (chunk, ct) in chunks.iter().zip(&sealed) {
            assert_eq!(ct.len(), chunk.len() + TAG_SIZE);
            assert!(ct.len() <= MAX_MESSAGE_SIZE);
            assert_eq!(&b.open(ct).unwrap(), chunk);
        }

        let reply = b.seal(b"reply").unwrap();
        assert_eq!(a.open(&reply).unwrap(), b"reply");
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let (mut a, _) = mirrored();
        assert!(matches!(
            a.seal(&vec![0u8; MAX_PLAINTEXT_SIZE + 1]),
            Err(TransportError::PayloadTooLarge(_))
        ));
    }

    #[test]
    fn test_replayed_frame_rejected() {
        let (mut a, mut b) = mirrored();
        let ct = a.seal(b"once").unwrap();
        b.open(&ct).unwrap();
        assert!(matches!(b.open(&ct), Err(TransportError::Decryption)));
    }

    #[test]
    fn test_reordered_frames_rejected() {
        let (mut a, mut b) = mirrored();
        let first = a.seal(b"first").unwrap();
        let second = a.seal(b"second").unwrap();
        assert!(matches!(b.open(&second), Err(TransportError::Decryption)));
        assert_eq!(b.open(&first).unwrap(), b"first");
    }

    #[test]
    fn test_nonce_reset_rejected() {
        let (a, _) = mirrored();
        let (mut send, _) = a.split();
        send.seal(b"one").unwrap();
        send.seal(b"two").unwrap();
        assert_eq!(send.nonce(), 2);
        assert_eq!(send.cipher_state().set_nonce(0), Err(CipherError::NonceReuse));
    }

    #[test]
    fn test_nonce_exhaustion() {
        let k = Key::new([3u8; 32]);
        let mut send = SendCipher::new(CipherState::new(Cipher::ChaChaPoly, k.clone()).with_nonce_limit(2));
        let mut recv = RecvCipher::new(CipherState::new(Cipher::ChaChaPoly, k).with_nonce_limit(2));

        for _ in 0..2 {
            let ct = send.seal(b"data").unwrap();
            recv.open(&ct).unwrap();
        }
        assert!(matches!(send.seal(b"data"), Err(TransportError::NonceExhausted)));
        assert!(matches!(recv.open(&[0u8; TAG_SIZE]), Err(TransportError::NonceExhausted)));
    }

    #[test]
    fn test_tampered_frame_rejected() {
        let (mut a, mut b) = mirrored();
        let mut ct = a.seal(b"payload").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x80;
        assert!(matches!(b.open(&ct), Err(TransportError::Decryption)));
    }
}
