//! Local side of a session: stdio, a spawned command, or a plain TCP target.

use std::fmt;
use std::io::{self, Read};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::thread;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

const STDIN_CHUNK: usize = 16 * 1024;

/// Where decrypted traffic goes once a session is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Process stdin/stdout.
    Stdio,
    /// A command run through the platform shell, one per session.
    Exec(String),
    /// A plain TCP `host:port`, dialed once per session.
    Proxy(String),
}

impl Endpoint {
    /// Opens a fresh local stream for one session.
    pub async fn open(&self) -> io::Result<LocalStream> {
        match self {
            Endpoint::Stdio => Ok(LocalStream::new(ThreadReader::spawn(io::stdin())?, tokio::io::stdout())),
            Endpoint::Exec(cmd) => spawn_shell(cmd),
            Endpoint::Proxy(addr) => {
                let stream = TcpStream::connect(addr).await?;
                stream.set_nodelay(true)?;
                let (r, w) = stream.into_split();
                Ok(LocalStream::new(r, w))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Stdio => write!(f, "stdio"),
            Endpoint::Exec(cmd) => write!(f, "exec {cmd:?}"),
            Endpoint::Proxy(addr) => write!(f, "proxy {addr}"),
        }
    }
}

fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

fn spawn_shell(cmd: &str) -> io::Result<LocalStream> {
    let mut child = shell_command(cmd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child stdin unavailable"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "child stdout unavailable"))?;

    let mut stream = LocalStream::new(stdout, stdin);
    stream.child = Some(child);
    Ok(stream)
}

/// Async reader fed by a dedicated thread doing blocking reads.
///
/// The thread is detached: dropping the reader never waits for a pending
/// read, so the runtime can shut down while the source is still open.
pub struct ThreadReader {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    buf: Vec<u8>,
    closed: bool,
}

impl ThreadReader {
    /// Starts a thread that forwards everything read from `source`.
    pub fn spawn<R>(mut source: R) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(4);
        thread::Builder::new().name("noisecat-stdin".into()).spawn(move || loop {
            let mut chunk = vec![0u8; STDIN_CHUNK];
            let item = match source.read(&mut chunk) {
                Ok(0) => return,
                Ok(n) => {
                    chunk.truncate(n);
                    Ok(chunk)
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                return;
            }
        })?;
        Ok(Self {
            rx,
            buf: Vec::new(),
            closed: false,
        })
    }
}

impl AsyncRead for ThreadReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if !self.buf.is_empty() {
            let n = buf.remaining().min(self.buf.len());
            buf.put_slice(&self.buf[..n]);
            self.buf.drain(..n);
            return Poll::Ready(Ok(()));
        }
        if self.closed {
            return Poll::Ready(Ok(()));
        }

        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(data))) => {
                let n = buf.remaining().min(data.len());
                buf.put_slice(&data[..n]);
                self.buf.extend_from_slice(&data[n..]);
                Poll::Ready(Ok(()))
            }
            Poll::Ready(Some(Err(e))) => {
                self.closed = true;
                Poll::Ready(Err(e))
            }
            Poll::Ready(None) => {
                self.closed = true;
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A bidirectional byte stream assembled from separate read and write halves.
///
/// A spawned child is owned here and killed when the stream is dropped.
pub struct LocalStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    writer: Pin<Box<dyn AsyncWrite + Send>>,
    child: Option<Child>,
}

impl LocalStream {
    /// Joins a reader and a writer into one stream.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            writer: Box::pin(writer),
            child: None,
        }
    }

    /// Process id of the spawned command, if any.
    pub fn child_id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }
}

impl AsyncRead for LocalStream {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        self.reader.as_mut().poll_read(cx, buf)
    }
}

impl AsyncWrite for LocalStream {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.writer.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.writer.as_mut().poll_flush(cx)
    }

    // Child pipes only close on drop, so the writer is replaced once shut down.
    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.writer.as_mut().poll_shutdown(cx) {
            Poll::Ready(Ok(())) => {
                self.writer = Box::pin(tokio::io::sink());
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
