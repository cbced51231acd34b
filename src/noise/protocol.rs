//! Protocol identifier resolution: `Noise_<Pattern>_<DH>_<Cipher>_<Hash>`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::cipher::Cipher;
use super::hash::HashFn;
use super::keypair::Dh;
use super::pattern::HandshakePattern;
use super::registry::{PrimitiveKind, Registry};

/// Literal first token of every protocol name.
pub const PROTOCOL_PREFIX: &str = "Noise";

/// Protocol name used when none is configured.
pub const DEFAULT_PROTOCOL: &str = "Noise_NN_25519_AESGCM_SHA256";

/// Errors resolving a protocol identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed protocol name {0:?} (expected Noise_PT_DH_CP_HS)")]
    MalformedIdentifier(String),
    #[error("unknown {kind}: {token:?}")]
    UnknownPrimitive { kind: PrimitiveKind, token: String },
}

/// A fully resolved protocol: every field names a supported primitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Protocol {
    pub pattern: HandshakePattern,
    pub dh: Dh,
    pub cipher: Cipher,
    pub hash: HashFn,
}

impl Protocol {
    /// Resolves a protocol name against the global registry.
    pub fn parse(name: &str) -> Result<Self, ProtocolError> {
        Self::resolve(name, Registry::global())
    }

    /// Resolves a protocol name against `registry`.
    pub fn resolve(name: &str, registry: &Registry) -> Result<Self, ProtocolError> {
        let tokens: Vec<&str> = name.split('_').collect();
        if tokens.len() != 5 || tokens[0] != PROTOCOL_PREFIX {
            return Err(ProtocolError::MalformedIdentifier(name.to_string()));
        }

        let unknown = |kind, token: &str| ProtocolError::UnknownPrimitive {
            kind,
            token: token.to_string(),
        };

        let pattern = registry
            .pattern(tokens[1])
            .ok_or_else(|| unknown(PrimitiveKind::Pattern, tokens[1]))?;
        let dh = registry.dh(tokens[2]).ok_or_else(|| unknown(PrimitiveKind::Dh, tokens[2]))?;
        let cipher = registry
            .cipher(tokens[3])
            .ok_or_else(|| unknown(PrimitiveKind::Cipher, tokens[3]))?;
        let hash = registry
            .hash(tokens[4])
            .ok_or_else(|| unknown(PrimitiveKind::Hash, tokens[4]))?;

        Ok(Self {
            pattern,
            dh,
            cipher,
            hash,
        })
    }

    /// Returns this protocol with `psk0` applied if no PSK modifier is present.
    pub fn with_default_psk(mut self) -> Self {
        if !self.pattern.has_psk() {
            if let Some(p) = self.pattern.clone().with_psk(0) {
                self.pattern = p;
            }
        }
        self
    }

    /// Canonical name, hashed into the handshake transcript.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            PROTOCOL_PREFIX,
            self.pattern,
            self.dh.name(),
            self.cipher.name(),
            self.hash.name()
        )
    }
}

impl FromStr for Protocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
