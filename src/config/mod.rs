//! Configuration for noisecat.
//!
//! A `Config` mirrors the command-line flags and can also be loaded from a
//! YAML file. `Config::resolve` validates it and turns it into `Settings`:
//! resolved protocol, loaded key material and the local endpoint. All of
//! this happens before any socket is opened.

mod keys;

pub use keys::{decode_remote_static, derive_psk, load_keypair, parse_keypair};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::conn::Endpoint;
use crate::noise::{self, HandshakeState, Key, KeyPair, KeyPairError, Protocol, ProtocolError, DEFAULT_PROTOCOL};

/// Default source port: any.
pub const DEFAULT_SRC_PORT: u16 = 0;

/// Address a listener binds to when no source host is given.
pub const DEFAULT_LISTEN_HOST: &str = "0.0.0.0";

/// Run configuration, mirroring the command-line flags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Listen for incoming connections instead of connecting.
    pub listen: bool,
    /// Keep accepting connections (requires listen and execute or proxy).
    pub daemon: bool,
    /// Debug-level logging.
    pub verbose: bool,
    /// Command to run for each session instead of using stdio.
    pub execute: Option<String>,
    /// `host:port` to forward decrypted traffic to (requires listen).
    pub proxy: Option<String>,
    /// Source address to bind.
    pub src_host: Option<String>,
    /// Source port to bind.
    pub src_port: u16,
    /// Remote host (client mode).
    pub dst_host: Option<String>,
    /// Remote port (client mode).
    pub dst_port: Option<u16>,
    /// Noise protocol name.
    pub protocol: String,
    /// Pre-shared key passphrase.
    pub psk: Option<String>,
    /// Peer's static public key, base64.
    pub rstatic: Option<String>,
    /// File holding the local key pair.
    pub lstatic: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: false,
            daemon: false,
            verbose: false,
            execute: None,
            proxy: None,
            src_host: None,
            src_port: DEFAULT_SRC_PORT,
            dst_host: None,
            dst_port: None,
            protocol: DEFAULT_PROTOCOL.to_string(),
            psk: None,
            rstatic: None,
            lstatic: None,
        }
    }
}

/// Configuration error type.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config: read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("config: parse yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("config: {0}")]
    Validation(String),
    #[error("config: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("config: key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config: local key pair: {0}")]
    KeyPair(#[from] KeyPairError),
    #[error("config: remote static key must be 32 bytes, base64 encoded")]
    RemoteStatic,
    #[error("config: {0}")]
    Handshake(#[from] noise::Error),
}

impl Config {
    /// Loads a YAML config file. The result is not validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = fs::read(path)?;
        Self::load_from_bytes(&data)
    }

    /// Parses a YAML config from raw bytes. The result is not validated.
    pub fn load_from_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_slice(data)?)
    }

    /// Checks flag combinations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

        if self.proxy.is_some() && !self.listen {
            return invalid("proxy requires listen");
        }
        if self.execute.is_some() && self.proxy.is_some() {
            return invalid("execute and proxy are mutually exclusive");
        }
        if self.daemon && !self.listen {
            return invalid("daemon requires listen");
        }
        if self.daemon && self.execute.is_none() && self.proxy.is_none() {
            return invalid("daemon requires execute or proxy");
        }
        if !self.listen {
            match (&self.dst_host, self.dst_port) {
                (Some(host), Some(_)) if !host.is_empty() => {}
                _ => return invalid("client mode requires a destination host and port"),
            }
        }
        Protocol::parse(&self.protocol)?;
        Ok(())
    }

    /// Validates the configuration and loads everything a run needs.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        self.validate()?;

        let psk = self.psk.as_deref().map(derive_psk);
        let mut protocol = Protocol::parse(&self.protocol)?;
        if psk.is_some() {
            protocol = protocol.with_default_psk();
        }

        let local_static = self.lstatic.as_ref().map(load_keypair).transpose()?;
        let remote_static = self.rstatic.as_deref().map(decode_remote_static).transpose()?;

        let endpoint = match (&self.execute, &self.proxy) {
            (Some(cmd), _) => Endpoint::Exec(cmd.clone()),
            (None, Some(addr)) => Endpoint::Proxy(addr.clone()),
            (None, None) => Endpoint::Stdio,
        };

        let bind_source = self.listen || self.src_host.is_some() || self.src_port != DEFAULT_SRC_PORT;
        let local_addr = bind_source.then(|| {
            let host = self.src_host.as_deref().unwrap_or(DEFAULT_LISTEN_HOST);
            join_host_port(host, self.src_port)
        });
        let remote_addr = match (&self.dst_host, self.dst_port) {
            (Some(host), Some(port)) if !self.listen => Some(join_host_port(host, port)),
            _ => None,
        };

        let settings = Settings {
            listen: self.listen,
            daemon: self.daemon,
            local_addr,
            remote_addr,
            protocol,
            local_static,
            remote_static,
            psk,
            endpoint,
        };

        // Surface missing key material now rather than on the first connection.
        HandshakeState::new(settings.handshake_config(!self.listen))?;

        Ok(settings)
    }
}

/// Formats `host:port`, bracketing IPv6 literals.
fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// A validated, fully loaded configuration.
#[derive(Debug)]
pub struct Settings {
    pub listen: bool,
    pub daemon: bool,
    /// Address to bind: the listen address, or the client's source address.
    pub local_addr: Option<String>,
    /// Address to dial in client mode.
    pub remote_addr: Option<String>,
    pub protocol: Protocol,
    pub local_static: Option<KeyPair>,
    /// Peer's static key. Used both as pre-knowledge and as the expected identity.
    pub remote_static: Option<Key>,
    pub psk: Option<Key>,
    pub endpoint: Endpoint,
}

impl Settings {
    /// Builds the handshake configuration for one session.
    pub fn handshake_config(&self, initiator: bool) -> noise::Config {
        noise::Config {
            protocol: Some(self.protocol.clone()),
            initiator,
            local_static: self.local_static.clone(),
            remote_static: self.remote_static.clone(),
            expected_remote_static: self.remote_static.clone(),
            prologue: Vec::new(),
            preshared_key: self.psk.clone(),
        }
    }
}
