//! Noise Protocol Framework implementation.
//!
//! Covers the twelve interactive handshake patterns with optional PSK
//! modifiers, Curve25519, AES-GCM and ChaCha20-Poly1305, and the SHA-2 and
//! BLAKE2 hash families. Protocols are named the standard way, for example
//! `Noise_XXpsk3_25519_ChaChaPoly_BLAKE2s`.

mod keypair;
pub mod cipher;
pub mod hash;
pub mod pattern;
pub mod registry;
pub mod protocol;
mod state;
mod handshake;
pub mod message;
pub mod transport;

pub use keypair::{Dh, DhError, Key, KeyPair, KeyPairError, KEY_SIZE};
pub use cipher::{Cipher, DecryptError, TAG_SIZE};
pub use hash::HashFn;
pub use pattern::{HandshakePattern, Pattern, Token};
pub use registry::{PrimitiveKind, Registry};
pub use protocol::{Protocol, ProtocolError, DEFAULT_PROTOCOL};
pub use state::{CipherError, CipherState, SymmetricState};
pub use handshake::{Config, Error, HandshakeState, TransportKeys};
pub use message::{read_frame, write_frame, MAX_MESSAGE_SIZE, MAX_PLAINTEXT_SIZE};
pub use transport::{RecvCipher, SendCipher, TransportCipher, TransportError};
