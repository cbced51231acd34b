//! Session manager: runs the handshake over a byte stream, then relays.
//!
//! A session moves `Handshaking → Transporting → Closed`. The handshake
//! yields a [`SecureChannel`], which [`relay`] bridges to a local stream
//! until either direction ends.

use std::fmt;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::debug;

use crate::error::Result;
use crate::noise::{
    self, read_frame, write_frame, HandshakeState, Key, Protocol, RecvCipher, SendCipher, TransportCipher,
    TransportError, MAX_PLAINTEXT_SIZE,
};

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake in progress.
    Handshaking,
    /// Handshake complete, relaying encrypted frames.
    Transporting,
    /// Terminal.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Handshaking => write!(f, "handshaking"),
            Self::Transporting => write!(f, "transporting"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// A session that has not finished its handshake yet.
pub struct Session {
    role: Role,
    state: SessionState,
    hs: HandshakeState,
}

impl Session {
    /// Creates a session. `config.initiator` is set from `role`.
    pub fn new(role: Role, mut config: noise::Config) -> Result<Self> {
        config.initiator = role == Role::Initiator;
        let hs = HandshakeState::new(config)?;
        Ok(Self {
            role,
            state: SessionState::Handshaking,
            hs,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn protocol(&self) -> &Protocol {
        self.hs.protocol()
    }

    /// Runs the handshake to completion over `stream`.
    ///
    /// Handshake payloads are empty. Any failure is fatal to the session.
    pub async fn handshake<S>(mut self, mut stream: S) -> Result<SecureChannel<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        debug!(role = %self.role, protocol = %self.hs.protocol(), state = %self.state, "handshake started");

        if let Err(e) = self.drive(&mut stream).await {
            self.state = SessionState::Closed;
            debug!(role = %self.role, state = %self.state, error = %e, "handshake failed");
            return Err(e);
        }

        let keys = self.hs.split()?;
        self.state = SessionState::Transporting;
        debug!(
            role = %self.role,
            state = %self.state,
            peer = %keys.remote_static.as_ref().map(|k| k.short_hex()).unwrap_or_default(),
            "handshake complete"
        );

        let remote_static = keys.remote_static.clone();
        let handshake_hash = keys.handshake_hash.clone();
        Ok(SecureChannel {
            stream,
            cipher: TransportCipher::from(keys),
            remote_static,
            handshake_hash,
            state: self.state,
        })
    }

    async fn drive<S>(&mut self, stream: &mut S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        while !self.hs.is_finished() {
            if self.hs.is_write_turn() {
                let msg = self.hs.write_message(&[])?;
                write_frame(stream, &msg).await?;
            } else {
                let msg = read_frame(stream).await?.ok_or(TransportError::ShortRead)?;
                self.hs.read_message(&msg)?;
            }
        }
        Ok(())
    }
}

/// An established session over stream `S`.
pub struct SecureChannel<S> {
    stream: S,
    cipher: TransportCipher,
    remote_static: Option<Key>,
    handshake_hash: Vec<u8>,
    state: SessionState,
}

impl<S> SecureChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Encrypts and sends `data`, one frame per `MAX_PLAINTEXT_SIZE` chunk.
    pub async fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        let result = self.send_frames(data).await;
        if result.is_err() {
            self.state = SessionState::Closed;
        }
        result
    }

    async fn send_frames(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        for chunk in data.chunks(MAX_PLAINTEXT_SIZE) {
            let ct = self.cipher.seal(chunk)?;
            write_frame(&mut self.stream, &ct).await?;
        }
        Ok(())
    }

    /// Receives and decrypts one frame. `Ok(None)` means the peer closed.
    pub async fn recv(&mut self) -> std::result::Result<Option<Vec<u8>>, TransportError> {
        let result = match read_frame(&mut self.stream).await {
            Ok(Some(ct)) => self.cipher.open(&ct).map(Some),
            other => other,
        };
        if !matches!(result, Ok(Some(_))) {
            self.state = SessionState::Closed;
        }
        result
    }

    /// Shuts down the write side of the stream.
    pub async fn close(&mut self) -> io::Result<()> {
        self.state = SessionState::Closed;
        self.stream.shutdown().await
    }

    /// Peer's static key, if the pattern transmitted or pre-shared one.
    pub fn remote_static(&self) -> Option<&Key> {
        self.remote_static.as_ref()
    }

    /// Final handshake hash, identical on both peers.
    pub fn handshake_hash(&self) -> &[u8] {
        &self.handshake_hash
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Splits into independently owned receive and send halves.
    pub fn into_split(self) -> (SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>) {
        let (r, w) = tokio::io::split(self.stream);
        let (send, recv) = self.cipher.split();
        (SecureReader { reader: r, cipher: recv }, SecureWriter { writer: w, cipher: send })
    }
}

/// Receiving half of a [`SecureChannel`].
pub struct SecureReader<R> {
    reader: R,
    cipher: RecvCipher,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    /// Receives and decrypts one frame. `Ok(None)` means the peer closed.
    pub async fn recv(&mut self) -> std::result::Result<Option<Vec<u8>>, TransportError> {
        match read_frame(&mut self.reader).await? {
            Some(ct) => Ok(Some(self.cipher.open(&ct)?)),
            None => Ok(None),
        }
    }
}

/// Sending half of a [`SecureChannel`].
pub struct SecureWriter<W> {
    writer: W,
    cipher: SendCipher,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    /// Encrypts and sends `data`, one frame per `MAX_PLAINTEXT_SIZE` chunk.
    pub async fn send(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        for chunk in data.chunks(MAX_PLAINTEXT_SIZE) {
            let ct = self.cipher.seal(chunk)?;
            write_frame(&mut self.writer, &ct).await?;
        }
        Ok(())
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Bytes moved by [`relay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Plaintext bytes read locally and sent to the peer.
    pub sent: u64,
    /// Plaintext bytes received from the peer and written locally.
    pub received: u64,
}

/// Bridges an established channel and a local stream until either side ends.
///
/// Local I/O failures end their direction like an end of stream; transport
/// failures from the peer are returned.
pub async fn relay<S, L>(channel: SecureChannel<S>, local: L) -> Result<RelayStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
    L: AsyncRead + AsyncWrite + Unpin,
{
    let (mut remote_rx, mut remote_tx) = channel.into_split();
    let (mut local_rx, mut local_tx) = tokio::io::split(local);
    let mut stats = RelayStats::default();

    let result = tokio::select! {
        r = pump_outbound(&mut local_rx, &mut remote_tx, &mut stats.sent) => {
            debug!("local side closed");
            r
        }
        r = pump_inbound(&mut remote_rx, &mut local_tx, &mut stats.received) => {
            debug!("remote side closed");
            r
        }
    };

    let _ = local_tx.shutdown().await;
    let _ = remote_tx.shutdown().await;

    debug!(
        state = %SessionState::Closed,
        sent = stats.sent,
        received = stats.received,
        "relay finished"
    );
    result.map(|()| stats)
}

async fn pump_outbound<R, W>(local: &mut R, remote: &mut SecureWriter<W>, sent: &mut u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; MAX_PLAINTEXT_SIZE];
    loop {
        let n = match local.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "local read failed");
                return Ok(());
            }
        };
        remote.send(&buf[..n]).await?;
        *sent += n as u64;
    }
}

async fn pump_inbound<R, W>(remote: &mut SecureReader<R>, local: &mut W, received: &mut u64) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(data) = remote.recv().await? {
        let written = async {
            local.write_all(&data).await?;
            local.flush().await
        };
        if let Err(e) = written.await {
            debug!(error = %e, "local write failed");
            return Ok(());
        }
        *received += data.len() as u64;
    }
    Ok(())
}
