//! Client side: connect to the remote peer and run the initiator session.

use std::io;
use std::net::SocketAddr;

use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::Result;
use crate::session::{relay, RelayStats, Role, SecureChannel, Session};

/// Opens a TCP connection to the configured destination.
///
/// If a source address is configured, the socket is bound to it first.
pub async fn connect(settings: &Settings) -> io::Result<TcpStream> {
    let remote = settings
        .remote_addr
        .as_deref()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no destination address"))?;

    let mut last_err = None;
    for addr in lookup_host(remote).await? {
        match connect_from(addr, settings.local_addr.as_deref()).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{remote}: no addresses"))))
}

async fn connect_from(addr: SocketAddr, local: Option<&str>) -> io::Result<TcpStream> {
    let Some(local) = local else {
        return TcpStream::connect(addr).await;
    };

    let local = lookup_host(local)
        .await?
        .find(|a| a.is_ipv4() == addr.is_ipv4())
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no source address of the same family"))?;
    let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.bind(local)?;
    socket.connect(addr).await
}

/// Connects and completes the handshake as initiator.
pub async fn dial(settings: &Settings) -> Result<SecureChannel<TcpStream>> {
    let session = Session::new(Role::Initiator, settings.handshake_config(true))?;
    let stream = connect(settings).await?;
    let peer = stream.peer_addr()?;
    debug!(%peer, "connected");

    let channel = session.handshake(stream).await?;
    info!(
        %peer,
        protocol = %settings.protocol,
        remote_static = %channel.remote_static().map(|k| k.to_base64()).unwrap_or_default(),
        "session established"
    );
    Ok(channel)
}

/// Client mode: dial, then relay against the local endpoint.
pub async fn run_client(settings: &Settings) -> Result<RelayStats> {
    let channel = dial(settings).await?;
    let local = settings.endpoint.open().await?;
    let stats = relay(channel, local).await?;
    info!(sent = stats.sent, received = stats.received, "connection closed");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::Error;
    use tokio::net::TcpListener;

    fn client_to(port: u16) -> Config {
        Config {
            dst_host: Some("127.0.0.1".into()),
            dst_port: Some(port),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let settings = client_to(port).resolve().unwrap();
        let err = dial(&settings).await.err().unwrap();
        assert!(matches!(err, Error::Io(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connect_with_source_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let settings = Config {
            src_host: Some("127.0.0.1".into()),
            ..client_to(port)
        }
        .resolve()
        .unwrap();
        let stream = connect(&settings).await.unwrap();
        let (_, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn test_server_hangs_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let settings = client_to(port).resolve().unwrap();
        let err = dial(&settings).await.err().unwrap();
        assert!(err.is_session_error(), "got {err:?}");
    }
}
