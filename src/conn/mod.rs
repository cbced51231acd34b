//! Connection orchestration.
//!
//! - `dial`: client mode, one initiator session
//! - `Listener`: single-shot (`accept_one`) or persistent (`serve`) server
//! - `Endpoint`: where decrypted traffic goes (stdio, a command, or a TCP target)

mod dial;
mod endpoint;
mod listener;

pub use dial::{connect, dial, run_client};
pub use endpoint::{Endpoint, LocalStream, ThreadReader};
pub use listener::{handle_conn, Listener};

use tracing::info;

use crate::config::Config;
use crate::error::Result;

/// Runs the mode selected by `config` to completion.
///
/// Configuration and key material are resolved before any socket opens.
pub async fn run(config: &Config) -> Result<()> {
    let settings = config.resolve()?;

    if !settings.listen {
        run_client(&settings).await?;
        return Ok(());
    }

    let daemon = settings.daemon;
    let listener = Listener::bind(settings).await?;
    info!(addr = %listener.local_addr()?, daemon, "listening");

    if daemon {
        listener.serve().await;
    } else {
        listener.accept_one().await?;
    }
    Ok(())
}
