//! Key and KeyPair types for Curve25519, plus the DH function registry entry.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of keys in bytes.
pub const KEY_SIZE: usize = 32;

/// A 32-byte cryptographic key. Wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Key(pub [u8; KEY_SIZE]);

impl Key {
    /// Creates a new key from bytes.
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Creates a key from a slice of exactly `KEY_SIZE` bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().ok()?;
        Some(Self(arr))
    }

    /// Returns true if the key is all zeros.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    /// Returns the key as a byte slice.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Creates a Key from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    /// Returns the key as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Returns first 8 hex characters.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Decodes a key from standard base64.
    pub fn from_base64(s: &str) -> Option<Self> {
        let bytes = BASE64.decode(s.trim()).ok()?;
        Self::from_slice(&bytes)
    }

    /// Encodes the key as standard base64.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl Default for Key {
    fn default() -> Self {
        Self([0u8; KEY_SIZE])
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}...)", self.short_hex())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl From<[u8; KEY_SIZE]> for Key {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A Curve25519 key pair.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyPair {
    /// Private key (secret).
    pub private: Key,
    /// Public key.
    pub public: Key,
}

impl KeyPair {
    /// Generates a new random key pair.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand_core::OsRng);
        let public = PublicKey::from(&secret);

        Self {
            private: Key(secret.to_bytes()),
            public: Key(public.to_bytes()),
        }
    }

    /// Creates a key pair from a private key.
    pub fn from_private(private: Key) -> Self {
        let secret = StaticSecret::from(private.0);
        let public = PublicKey::from(&secret);

        Self {
            private,
            public: Key(public.to_bytes()),
        }
    }

    /// Parses the key file layout: private key bytes followed by public key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyPairError> {
        if bytes.len() != 2 * KEY_SIZE {
            return Err(KeyPairError::InvalidLength(bytes.len()));
        }
        let private = Key::from_slice(&bytes[..KEY_SIZE]).ok_or(KeyPairError::InvalidLength(bytes.len()))?;
        let public = Key::from_slice(&bytes[KEY_SIZE..]).ok_or(KeyPairError::InvalidLength(bytes.len()))?;

        let kp = Self::from_private(private);
        if kp.public != public {
            return Err(KeyPairError::PublicMismatch);
        }
        Ok(kp)
    }

    /// Serializes to the key file layout (private ‖ public).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 * KEY_SIZE);
        out.extend_from_slice(self.private.as_bytes());
        out.extend_from_slice(self.public.as_bytes());
        out
    }

    /// Decodes a base64-encoded key file.
    pub fn from_base64(s: &str) -> Result<Self, KeyPairError> {
        let mut bytes = BASE64.decode(s.trim()).map_err(|_| KeyPairError::InvalidEncoding)?;
        let kp = Self::from_bytes(&bytes);
        bytes.zeroize();
        kp
    }

    /// Encodes the key pair in the key file layout as base64.
    pub fn to_base64(&self) -> String {
        let mut bytes = self.to_bytes();
        let encoded = BASE64.encode(&bytes);
        bytes.zeroize();
        encoded
    }

    /// Performs Diffie-Hellman key exchange.
    pub fn dh(&self, peer_public: &Key) -> Result<Key, DhError> {
        let secret = StaticSecret::from(self.private.0);
        let peer = PublicKey::from(peer_public.0);
        let shared = secret.diffie_hellman(&peer);

        let result = Key(shared.to_bytes());
        if result.is_zero() {
            return Err(DhError::LowOrderPoint);
        }
        Ok(result)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Diffie-Hellman functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dh {
    /// X25519.
    Curve25519,
}

impl Dh {
    /// All supported DH functions.
    pub const ALL: &'static [Dh] = &[Dh::Curve25519];

    /// Canonical protocol-name token.
    pub fn name(&self) -> &'static str {
        match self {
            Dh::Curve25519 => "25519",
        }
    }

    /// Length of a public key.
    pub fn pub_len(&self) -> usize {
        match self {
            Dh::Curve25519 => KEY_SIZE,
        }
    }

    /// Length of a private key.
    pub fn priv_len(&self) -> usize {
        match self {
            Dh::Curve25519 => KEY_SIZE,
        }
    }

    /// Generates a fresh key pair.
    pub fn generate(&self) -> KeyPair {
        match self {
            Dh::Curve25519 => KeyPair::generate(),
        }
    }

    /// Computes `dh(private, public)`.
    pub fn dh(&self, local: &KeyPair, remote: &Key) -> Result<Key, DhError> {
        match self {
            Dh::Curve25519 => local.dh(remote),
        }
    }
}

/// Error during DH operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DhError {
    /// The peer's public key is a low-order point.
    #[error("low-order point in DH")]
    LowOrderPoint,
}

/// Error decoding a stored key pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyPairError {
    #[error("key pair must be {expected} bytes, got {0}", expected = 2 * KEY_SIZE)]
    InvalidLength(usize),
    #[error("key pair is not valid base64")]
    InvalidEncoding,
    #[error("public key does not match private key")]
    PublicMismatch,
}
