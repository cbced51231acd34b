//! Key material loading: key files, remote static keys, and PSK derivation.

use std::fs;
use std::path::Path;

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::noise::{Key, KeyPair, KeyPairError, KEY_SIZE};

use super::ConfigError;

/// Loads a local key pair from a key file.
///
/// The file holds `private || public`, either raw (exactly 64 bytes) or base64.
pub fn load_keypair<P: AsRef<Path>>(path: P) -> Result<KeyPair, ConfigError> {
    let path = path.as_ref();
    let mut data = fs::read(path).map_err(|source| ConfigError::KeyFile {
        path: path.display().to_string(),
        source,
    })?;
    let kp = parse_keypair(&data);
    data.zeroize();
    Ok(kp?)
}

/// Parses key file contents.
pub fn parse_keypair(data: &[u8]) -> Result<KeyPair, KeyPairError> {
    if data.len() == 2 * KEY_SIZE {
        return KeyPair::from_bytes(data);
    }
    let text = std::str::from_utf8(data).map_err(|_| KeyPairError::InvalidEncoding)?;
    KeyPair::from_base64(text)
}

/// Decodes the peer's static public key (base64, 32 bytes).
pub fn decode_remote_static(s: &str) -> Result<Key, ConfigError> {
    Key::from_base64(s.trim()).ok_or(ConfigError::RemoteStatic)
}

/// Derives the 32-byte pre-shared key from a passphrase.
pub fn derive_psk(passphrase: &str) -> Key {
    let digest = Sha256::digest(passphrase.as_bytes());
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&digest);
    Key::new(key)
}
