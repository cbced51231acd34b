//! Catalog of supported primitives, keyed by protocol-name token.
//!
//! The registry is built once and never mutated. Every entry is a closed
//! enum variant, so resolving a name is a table lookup followed by
//! exhaustive matching in the primitive itself.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use super::cipher::Cipher;
use super::hash::HashFn;
use super::keypair::Dh;
use super::pattern::{HandshakePattern, Pattern};

/// Primitive family, used in error messages and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Pattern,
    Dh,
    Cipher,
    Hash,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern => write!(f, "handshake pattern"),
            Self::Dh => write!(f, "DH function"),
            Self::Cipher => write!(f, "cipher function"),
            Self::Hash => write!(f, "hash function"),
        }
    }
}

/// Immutable lookup tables for the four primitive families.
pub struct Registry {
    patterns: HashMap<&'static str, Pattern>,
    dhs: HashMap<&'static str, Dh>,
    ciphers: HashMap<&'static str, Cipher>,
    hashes: HashMap<&'static str, HashFn>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// Builds the registry of every supported primitive.
    pub fn new() -> Self {
        Self {
            patterns: Pattern::ALL.iter().map(|p| (p.name(), *p)).collect(),
            dhs: Dh::ALL.iter().map(|d| (d.name(), *d)).collect(),
            ciphers: Cipher::ALL.iter().map(|c| (c.name(), *c)).collect(),
            hashes: HashFn::ALL.iter().map(|h| (h.name(), *h)).collect(),
        }
    }

    /// Process-wide registry, built on first use.
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(Registry::new)
    }

    /// Looks up a handshake pattern, including PSK modifiers.
    pub fn pattern(&self, name: &str) -> Option<HandshakePattern> {
        let base_len = name.find("psk").unwrap_or(name.len());
        self.patterns.get(&name[..base_len])?;
        HandshakePattern::parse(name)
    }

    /// Looks up a DH function.
    pub fn dh(&self, name: &str) -> Option<Dh> {
        self.dhs.get(name).copied()
    }

    /// Looks up a cipher function.
    pub fn cipher(&self, name: &str) -> Option<Cipher> {
        self.ciphers.get(name).copied()
    }

    /// Looks up a hash function.
    pub fn hash(&self, name: &str) -> Option<HashFn> {
        self.hashes.get(name).copied()
    }

    /// Sorted names of one family, for usage listings.
    pub fn names(&self, kind: PrimitiveKind) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = match kind {
            PrimitiveKind::Pattern => self.patterns.keys().copied().collect(),
            PrimitiveKind::Dh => self.dhs.keys().copied().collect(),
            PrimitiveKind::Cipher => self.ciphers.keys().copied().collect(),
            PrimitiveKind::Hash => self.hashes.keys().copied().collect(),
        };
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
