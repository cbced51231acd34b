//! End-to-end sessions over loopback TCP.

use std::net::SocketAddr;
use std::sync::Arc;

use noisecat::noise::{self, Protocol};
use noisecat::{Config, Error, KeyPair, Listener, Role, Session, Settings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const NN: &str = "Noise_NN_25519_AESGCM_SHA256";
const NK: &str = "Noise_NK_25519_AESGCM_SHA256";

/// Plain TCP server that answers every "ping" with "pong".
async fn pong_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { continue };
            tokio::spawn(async move {
                let mut buf = [0u8; 4];
                while stream.read_exact(&mut buf).await.is_ok() {
                    let reply: &[u8] = if &buf == b"ping" { b"pong" } else { b"????" };
                    if stream.write_all(reply).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    addr
}

fn server_config(proxy: SocketAddr) -> Config {
    Config {
        listen: true,
        src_host: Some("127.0.0.1".into()),
        proxy: Some(proxy.to_string()),
        ..Default::default()
    }
}

fn client_config(server: SocketAddr) -> Config {
    Config {
        dst_host: Some("127.0.0.1".into()),
        dst_port: Some(server.port()),
        ..Default::default()
    }
}

async fn start(settings: Settings) -> SocketAddr {
    let listener = Listener::bind(settings).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { listener.accept_one().await });
    addr
}

#[tokio::test]
async fn nn_ping_pong() {
    // Server side decrypts into a raw socket we read directly.
    let plain = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let settings = server_config(plain.local_addr().unwrap()).resolve().unwrap();
    assert_eq!(settings.protocol.name(), NN);
    assert!(settings.psk.is_none() && settings.local_static.is_none());
    let server = start(settings).await;

    let mut client = noisecat::dial(&client_config(server).resolve().unwrap()).await.unwrap();
    client.send(b"ping").await.unwrap();

    let (mut sink, _) = plain.accept().await.unwrap();
    let mut buf = [0u8; 4];
    sink.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    sink.write_all(b"pong").await.unwrap();
    assert_eq!(client.recv().await.unwrap(), Some(b"pong".to_vec()));
}

#[tokio::test]
async fn nk_without_pin_completes() {
    let server_kp = KeyPair::generate();
    let settings = Settings {
        protocol: Protocol::parse(NK).unwrap(),
        local_static: Some(server_kp.clone()),
        ..server_config(pong_server().await).resolve().unwrap()
    };
    let server = start(settings).await;

    // The initiator knows the responder key in advance but pins nothing.
    let stream = TcpStream::connect(server).await.unwrap();
    let session = Session::new(
        Role::Initiator,
        noise::Config {
            protocol: Some(Protocol::parse(NK).unwrap()),
            remote_static: Some(server_kp.public.clone()),
            ..Default::default()
        },
    )
    .unwrap();
    let mut channel = session.handshake(stream).await.unwrap();
    assert_eq!(channel.remote_static(), Some(&server_kp.public));

    channel.send(b"ping").await.unwrap();
    assert_eq!(channel.recv().await.unwrap(), Some(b"pong".to_vec()));
}

#[tokio::test]
async fn nk_with_wrong_pin_rejected() {
    // A pre-known key is checked against the pin before anything is sent.
    let server_kp = KeyPair::generate();
    let err = Session::new(
        Role::Initiator,
        noise::Config {
            protocol: Some(Protocol::parse(NK).unwrap()),
            remote_static: Some(server_kp.public.clone()),
            expected_remote_static: Some(KeyPair::generate().public.clone()),
            ..Default::default()
        },
    )
    .err()
    .unwrap();
    assert!(matches!(err, Error::Handshake(noise::Error::PeerKeyMismatch)), "got {err:?}");
}

#[tokio::test]
async fn xx_wrong_rstatic_rejected_via_config() {
    let dir = std::env::temp_dir().join(format!("noisecat_e2e_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let key_path = dir.join("server.key");
    let server_kp = KeyPair::generate();
    std::fs::write(&key_path, server_kp.to_base64()).unwrap();

    let xx = "Noise_XX_25519_ChaChaPoly_BLAKE2s";
    let server = start(
        Config {
            protocol: xx.into(),
            lstatic: Some(key_path.clone()),
            ..server_config(pong_server().await)
        }
        .resolve()
        .unwrap(),
    )
    .await;

    let client_key = dir.join("client.key");
    std::fs::write(&client_key, KeyPair::generate().to_base64()).unwrap();
    let client = Config {
        protocol: xx.into(),
        lstatic: Some(client_key),
        rstatic: Some(KeyPair::generate().public.to_base64()),
        ..client_config(server)
    }
    .resolve()
    .unwrap();
    let err = noisecat::dial(&client).await.err().unwrap();
    assert!(matches!(err, Error::Handshake(noise::Error::PeerKeyMismatch)), "got {err:?}");

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn psk_mismatch_fails_handshake() {
    let server = start(
        Config {
            psk: Some("correct horse".into()),
            ..server_config(pong_server().await)
        }
        .resolve()
        .unwrap(),
    )
    .await;

    let client = Config {
        psk: Some("battery staple".into()),
        ..client_config(server)
    }
    .resolve()
    .unwrap();
    // The responder fails to authenticate the first message and hangs up.
    let err = noisecat::dial(&client).await.err().unwrap();
    assert!(err.is_session_error(), "got {err:?}");
}

#[tokio::test]
async fn persistent_server_isolates_failures() {
    let settings = Config {
        daemon: true,
        ..server_config(pong_server().await)
    }
    .resolve()
    .unwrap();
    let listener = Arc::new(Listener::bind(settings).await.unwrap());
    let addr = listener.local_addr().unwrap();
    let serving = Arc::clone(&listener);
    let server = tokio::spawn(async move { serving.serve().await });

    let client = client_config(addr).resolve().unwrap();
    let (bad, good) = tokio::join!(
        async {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&[0, 5, 1, 2, 3, 4, 5]).await.unwrap();
            let mut rest = Vec::new();
            // The server drops the connection after the failed handshake.
            let _ = stream.read_to_end(&mut rest).await;
            rest
        },
        async {
            let mut channel = noisecat::dial(&client).await.unwrap();
            channel.send(b"ping").await.unwrap();
            channel.recv().await.unwrap()
        }
    );
    assert!(bad.is_empty());
    assert_eq!(good, Some(b"pong".to_vec()));

    // Still accepting after both.
    let mut again = noisecat::dial(&client).await.unwrap();
    again.send(b"ping").await.unwrap();
    assert_eq!(again.recv().await.unwrap(), Some(b"pong".to_vec()));

    listener.shutdown();
    server.await.unwrap();
}

#[tokio::test]
async fn proxy_mode_bridges_to_plain_tcp() {
    let target = pong_server().await;
    let settings = server_config(target).resolve().unwrap();
    assert_eq!(settings.endpoint, noisecat::Endpoint::Proxy(target.to_string()));
    let server = start(settings).await;

    let mut channel = noisecat::dial(&client_config(server).resolve().unwrap()).await.unwrap();
    for _ in 0..3 {
        channel.send(b"ping").await.unwrap();
        assert_eq!(channel.recv().await.unwrap(), Some(b"pong".to_vec()));
    }
}
