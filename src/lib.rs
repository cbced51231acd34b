//! noisecat: an encrypted netcat built on the Noise Protocol Framework.
//!
//! This crate provides:
//! - `noise`: protocol name resolution, primitives, handshake state machine,
//!   framing and transport ciphers
//! - `session`: handshake driver over a byte stream and the bidirectional relay
//! - `conn`: client, single-shot server, persistent server and proxy modes
//! - `config`: flag/YAML configuration and key material loading
//!
//! # Example
//!
//! ```rust,ignore
//! use noisecat::noise::{Config, Protocol};
//! use noisecat::session::{Role, Session};
//!
//! let protocol = Protocol::parse("Noise_NN_25519_AESGCM_SHA256")?;
//! let session = Session::new(Role::Initiator, Config {
//!     protocol: Some(protocol),
//!     ..Default::default()
//! })?;
//! let mut channel = session.handshake(stream).await?;
//! channel.send(b"ping").await?;
//! ```

pub mod noise;
pub mod session;
pub mod conn;
pub mod config;
pub mod cli;
pub mod error;

pub use error::{Error, Result};
pub use noise::{HandshakeState, Key, KeyPair, Protocol, ProtocolError, Registry, TransportError};
pub use session::{relay, RelayStats, Role, SecureChannel, SecureReader, SecureWriter, Session, SessionState};
pub use conn::{dial, run, Endpoint, Listener};
pub use config::{Config, ConfigError, Settings};
