//! Wire framing: every handshake and transport message is
//! `u16 big-endian length || payload`.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::cipher::TAG_SIZE;
use super::transport::TransportError;

/// Length prefix size.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Maximum payload of one frame.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Maximum plaintext carried by one transport frame.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_MESSAGE_SIZE - TAG_SIZE;

/// Encodes a frame into a new buffer.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = u16::try_from(payload.len()).map_err(|_| TransportError::PayloadTooLarge(payload.len()))?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await.map_err(TransportError::from_io)?;
    writer.flush().await.map_err(TransportError::from_io)?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` if the stream ends cleanly on a frame boundary;
/// an end of stream inside a frame is `ShortRead`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LENGTH_PREFIX_SIZE {
        let n = reader.read(&mut prefix[filled..]).await.map_err(TransportError::from_io)?;
        if n == 0 {
            return if filled == 0 { Ok(None) } else { Err(TransportError::ShortRead) };
        }
        filled += n;
    }

    let len = u16::from_be_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(TransportError::from_io)?;
    Ok(Some(payload))
}

impl TransportError {
    /// Classifies an I/O error from the connection.
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => TransportError::ShortRead,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe => {
                TransportError::ConnectionReset
            }
            _ => TransportError::Io(e),
        }
    }
}
