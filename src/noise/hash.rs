//! Hash functions with the HMAC/HKDF construction used by the handshake.

use blake2::{Blake2b512, Blake2s256};
use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, Zeroizing};

use super::keypair::{Key, KEY_SIZE};

/// Largest HASHLEN of any supported hash.
pub const MAX_HASH_LEN: usize = 64;

/// Secret hash-sized output (chaining keys, HKDF outputs).
pub type SecretBytes = Zeroizing<Vec<u8>>;

/// Hash functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashFn {
    Sha256,
    Sha512,
    Blake2s,
    Blake2b,
}

impl HashFn {
    /// All supported hash functions.
    pub const ALL: &'static [HashFn] = &[HashFn::Sha256, HashFn::Sha512, HashFn::Blake2s, HashFn::Blake2b];

    /// Canonical protocol-name token.
    pub fn name(&self) -> &'static str {
        match self {
            HashFn::Sha256 => "SHA256",
            HashFn::Sha512 => "SHA512",
            HashFn::Blake2s => "BLAKE2s",
            HashFn::Blake2b => "BLAKE2b",
        }
    }

    /// Output length (HASHLEN).
    pub fn hash_len(&self) -> usize {
        match self {
            HashFn::Sha256 | HashFn::Blake2s => 32,
            HashFn::Sha512 | HashFn::Blake2b => 64,
        }
    }

    /// Internal block length (BLOCKLEN), used by HMAC.
    pub fn block_len(&self) -> usize {
        match self {
            HashFn::Sha256 | HashFn::Blake2s => 64,
            HashFn::Sha512 | HashFn::Blake2b => 128,
        }
    }

    /// Hashes the concatenation of `data`.
    pub fn hash(&self, data: &[&[u8]]) -> Vec<u8> {
        match self {
            HashFn::Sha256 => digest::<Sha256>(data),
            HashFn::Sha512 => digest::<Sha512>(data),
            HashFn::Blake2s => digest::<Blake2s256>(data),
            HashFn::Blake2b => digest::<Blake2b512>(data),
        }
    }

    /// HMAC(key, data) per RFC 2104.
    pub fn hmac(&self, key: &[u8], data: &[&[u8]]) -> SecretBytes {
        let block_len = self.block_len();
        let mut k = if key.len() > block_len {
            self.hash(&[key])
        } else {
            key.to_vec()
        };
        k.resize(block_len, 0);

        let mut ipad: Vec<u8> = k.iter().map(|b| b ^ 0x36).collect();
        let mut opad: Vec<u8> = k.iter().map(|b| b ^ 0x5c).collect();
        k.zeroize();

        // Inner hash
        let mut parts: Vec<&[u8]> = Vec::with_capacity(data.len() + 1);
        parts.push(&ipad);
        parts.extend_from_slice(data);
        let mut inner = self.hash(&parts);

        // Outer hash
        let out = self.hash(&[&opad, &inner]);

        inner.zeroize();
        ipad.zeroize();
        opad.zeroize();
        Zeroizing::new(out)
    }

    /// HKDF with this hash.
    /// Derives `num_outputs` values (2 or 3) from chaining key and input.
    pub fn hkdf(&self, chaining_key: &[u8], input: &[u8], num_outputs: usize) -> Vec<SecretBytes> {
        assert!((2..=3).contains(&num_outputs), "num_outputs must be 2 or 3");

        let secret = self.hmac(chaining_key, &[input]);

        let mut outputs = Vec::with_capacity(num_outputs);
        let out1 = self.hmac(&secret, &[&[0x01]]);
        let out2 = self.hmac(&secret, &[&out1, &[0x02]]);
        if num_outputs == 3 {
            let out3 = self.hmac(&secret, &[&out2, &[0x03]]);
            outputs.push(out1);
            outputs.push(out2);
            outputs.push(out3);
        } else {
            outputs.push(out1);
            outputs.push(out2);
        }
        outputs
    }

    /// Derives two outputs.
    pub fn kdf2(&self, chaining_key: &[u8], input: &[u8]) -> (SecretBytes, SecretBytes) {
        let mut keys = self.hkdf(chaining_key, input, 2).into_iter();
        match (keys.next(), keys.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => unreachable!("hkdf returns the requested number of outputs"),
        }
    }

    /// Derives three outputs.
    pub fn kdf3(&self, chaining_key: &[u8], input: &[u8]) -> (SecretBytes, SecretBytes, SecretBytes) {
        let mut keys = self.hkdf(chaining_key, input, 3).into_iter();
        match (keys.next(), keys.next(), keys.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => unreachable!("hkdf returns the requested number of outputs"),
        }
    }
}

/// Truncates a HASHLEN output to a cipher key.
pub fn truncate_key(output: &[u8]) -> Key {
    let mut key = [0u8; KEY_SIZE];
    key.copy_from_slice(&output[..KEY_SIZE]);
    Key::new(key)
}

fn digest<D: Digest>(data: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for d in data {
        hasher.update(d);
    }
    hasher.finalize().to_vec()
}
