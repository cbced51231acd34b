//! Command-line interface: flag parsing and help text.

use std::path::PathBuf;

use clap::{CommandFactory, FromArgMatches, Parser};

use crate::config::{Config, ConfigError};
use crate::noise::{PrimitiveKind, Registry, DEFAULT_PROTOCOL};

/// Crate version shown in the banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line flags.
#[derive(Parser, Debug, Default)]
#[command(name = "noisecat", version, about = "Encrypted netcat over the Noise Protocol Framework")]
pub struct Args {
    /// Executes the given command for each session
    #[arg(short = 'e', value_name = "command")]
    pub execute: Option<String>,

    /// address:port to forward connections to (-l required)
    #[arg(long, value_name = "address:port")]
    pub proxy: Option<String>,

    /// Listens for incoming connections
    #[arg(short = 'l')]
    pub listen: bool,

    /// More verbose output
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Accepts multiple connections (-l && (-e || --proxy) required)
    #[arg(short = 'k')]
    pub daemon: bool,

    /// Source port to use
    #[arg(short = 'p', value_name = "port")]
    pub src_port: Option<u16>,

    /// Source address to use
    #[arg(short = 's', value_name = "address")]
    pub src_host: Option<String>,

    /// Protocol name to use [default: Noise_NN_25519_AESGCM_SHA256]
    #[arg(long = "proto", value_name = "protocol name")]
    pub protocol: Option<String>,

    /// Pre-shared key passphrase to use
    #[arg(long, value_name = "pre-shared key")]
    pub psk: Option<String>,

    /// Static key of the remote peer (32 bytes, base64)
    #[arg(long, value_name = "static key")]
    pub rstatic: Option<String>,

    /// File containing the local key pair (use --keygen to generate)
    #[arg(long, value_name = "file")]
    pub lstatic: Option<PathBuf>,

    /// Generates a 25519 key pair and prints it to stdout
    #[arg(long)]
    pub keygen: bool,

    /// YAML file with default settings; flags override it
    #[arg(long, value_name = "file")]
    pub config: Option<PathBuf>,

    /// Remote address (client mode)
    pub host: Option<String>,

    /// Remote port (client mode)
    pub port: Option<u16>,
}

impl Args {
    /// Parses the process arguments, exiting with usage on error.
    pub fn from_env() -> Self {
        let matches = Self::command()
            .before_help(banner())
            .after_help(protocol_help())
            .get_matches();
        Self::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
    }

    /// Builds the run configuration: the `--config` file if given, with flags on top.
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        config.listen |= self.listen;
        config.daemon |= self.daemon;
        config.verbose |= self.verbose;

        overlay(&mut config.execute, self.execute);
        overlay(&mut config.proxy, self.proxy);
        overlay(&mut config.src_host, self.src_host);
        overlay(&mut config.dst_host, self.host);
        overlay(&mut config.dst_port, self.port);
        overlay(&mut config.psk, self.psk);
        overlay(&mut config.rstatic, self.rstatic);
        overlay(&mut config.lstatic, self.lstatic);
        if let Some(port) = self.src_port {
            config.src_port = port;
        }
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }

        Ok(config)
    }
}

fn overlay<T>(slot: &mut Option<T>, flag: Option<T>) {
    if flag.is_some() {
        *slot = flag;
    }
}

/// One-line banner with the version.
pub fn banner() -> String {
    format!("noisecat {VERSION} - the noise swiss army knife")
}

/// Describes the protocol name format and lists every registered primitive.
pub fn protocol_help() -> String {
    let registry = Registry::global();
    let mut out = String::new();
    out.push_str("Protocol name format: Noise_PT_DH_CP_HS\n\n");
    out.push_str("Where:\n  PT: Handshake pattern\n  DH: Diffie-Hellman function\n");
    out.push_str("  CP: Cipher function\n  HS: Hash function\n\n");
    out.push_str(&format!("  e.g. {DEFAULT_PROTOCOL}\n"));

    let sections = [
        ("handshake patterns", PrimitiveKind::Pattern),
        ("DH functions", PrimitiveKind::Dh),
        ("Cipher functions", PrimitiveKind::Cipher),
        ("Hash functions", PrimitiveKind::Hash),
    ];
    for (title, kind) in sections {
        out.push_str(&format!("\nAvailable {title}:\n"));
        for row in registry.names(kind).chunks(5) {
            out.push_str("  ");
            out.push_str(&row.join(", "));
            out.push('\n');
        }
    }
    out.push_str("\nPattern modifiers: psk0, psk1, psk2, psk3 (e.g. XXpsk3, NNpsk0+psk2)\n");
    out
}
