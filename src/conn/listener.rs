//! Server side: accept connections and run responder sessions.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::session::{relay, RelayStats, Role, Session};

/// First pause after a failed accept; doubled on each consecutive failure.
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Address bound when the settings carry none.
const FALLBACK_LISTEN_ADDR: &str = "0.0.0.0:0";

/// A listening socket plus the settings every accepted session uses.
pub struct Listener {
    listener: TcpListener,
    settings: Arc<Settings>,
    shutdown: Arc<Notify>,
}

impl Listener {
    /// Binds to the configured listen address.
    pub async fn bind(settings: Settings) -> Result<Self> {
        let addr = settings.local_addr.as_deref().unwrap_or(FALLBACK_LISTEN_ADDR);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, settings))
    }

    /// Wraps an already bound listener.
    pub fn from_listener(listener: TcpListener, settings: Settings) -> Self {
        Self {
            listener,
            settings: Arc::new(settings),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts exactly one connection, closes the listening socket, and
    /// serves that connection to completion.
    pub async fn accept_one(self) -> Result<RelayStats> {
        let (stream, peer) = self.listener.accept().await?;
        drop(self.listener);
        info!(%peer, "connection accepted");

        let stats = handle_conn(stream, peer, &self.settings).await?;
        info!(%peer, sent = stats.sent, received = stats.received, "connection closed");
        Ok(stats)
    }

    /// Accepts connections until `shutdown` is called.
    ///
    /// Each connection runs in its own task. A failing session is logged
    /// and affects neither the accept loop nor other sessions.
    pub async fn serve(&self) {
        let mut backoff: Option<Duration> = None;
        loop {
            if let Some(delay) = backoff {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.shutdown.notified() => return,
                }
            }

            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            backoff = None;
                            info!(%peer, "connection accepted");
                            let settings = Arc::clone(&self.settings);
                            tokio::spawn(async move {
                                match handle_conn(stream, peer, &settings).await {
                                    Ok(stats) => info!(
                                        %peer,
                                        sent = stats.sent,
                                        received = stats.received,
                                        "connection closed"
                                    ),
                                    Err(e) => warn!(%peer, error = %e, "connection failed"),
                                }
                            });
                        }
                        Err(e) => {
                            let delay = next_backoff(backoff);
                            warn!(error = %e, retry_in = ?delay, "accept failed");
                            backoff = Some(delay);
                        }
                    }
                }
                _ = self.shutdown.notified() => return,
            }
        }
    }

    /// Signals `serve` to stop accepting.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        Some(d) => (d * 2).min(ACCEPT_BACKOFF_MAX),
        None => ACCEPT_BACKOFF_MIN,
    }
}

/// Runs one responder session over an accepted connection.
pub async fn handle_conn(stream: TcpStream, peer: SocketAddr, settings: &Settings) -> Result<RelayStats> {
    stream.set_nodelay(true)?;
    let session = Session::new(Role::Responder, settings.handshake_config(false))?;
    let channel = session.handshake(stream).await?;
    info!(
        %peer,
        protocol = %settings.protocol,
        remote_static = %channel.remote_static().map(|k| k.to_base64()).unwrap_or_default(),
        "session established"
    );

    let local = settings.endpoint.open().await?;
    debug!(%peer, endpoint = %settings.endpoint, "local endpoint open");
    relay(channel, local).await
}
