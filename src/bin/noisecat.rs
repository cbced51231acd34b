//! noisecat: netcat over the Noise Protocol Framework.
//!
//! Stdout carries session data, so logs go to stderr.

use noisecat::cli::Args;
use noisecat::conn;
use noisecat::noise::KeyPair;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

fn main() {
    let args = Args::from_env();

    if args.keygen {
        let kp = KeyPair::generate();
        println!("{}", kp.to_base64());
        eprintln!("public key: {}", kp.public.to_base64());
        return;
    }

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let level = if config.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    info!(protocol = %config.protocol, "noisecat {}", noisecat::cli::VERSION);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(conn::run(&config));
    // Blocking stdio work must not hold the process open once the session is over.
    runtime.shutdown_background();

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}
