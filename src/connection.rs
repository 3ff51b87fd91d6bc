//! A channel to exactly one remote member.
//!
//! A [`Connection`] is created by the surrounding connection layer once a socket has been accepted
//! or dialed and the protocol version negotiated. It owns the writing half of the socket behind an
//! async mutex so that only one writer touches the socket at a time, a lease on the shared
//! [`BufferPool`], and the distribution manager's [`CancelCriterion`].
//!
//! Writing goes through a [`ScopedWriter`], which holds both a pooled buffer and the socket lock.
//! Dropping the writer, on success or on error, returns the buffer and releases the lock.

mod buffer_pool;
mod cancel;

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::BytesMut;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{Mutex, MutexGuard},
    time::{self, Instant},
};
use tracing::{debug, trace};

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use cancel::{CancelCriterion, CancelSignal};

use crate::{
    config::Config, error::ConnectionError, member::MemberId, wire::framing, wire::Version,
};

/// One established channel to one remote member.
pub struct Connection<W> {
    remote: MemberId,
    version: Version,
    writer: Mutex<W>,
    pool: Arc<BufferPool>,
    cancel: Arc<dyn CancelCriterion>,
    closed: AtomicBool,
    acquire_timeout: Duration,
    max_message_size: usize,
}

impl<W> Connection<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a connection to `remote` which writes frames encoded with `version` to `writer`.
    pub fn new(
        remote: MemberId,
        version: Version,
        writer: W,
        pool: Arc<BufferPool>,
        cancel: Arc<dyn CancelCriterion>,
        config: &Config,
    ) -> Self {
        Connection {
            remote,
            version,
            writer: Mutex::new(writer),
            pool,
            cancel,
            closed: AtomicBool::new(false),
            acquire_timeout: config.writer_acquire_timeout,
            max_message_size: config.max_message_size,
        }
    }

    /// The member on the other end.
    pub fn remote(&self) -> MemberId {
        self.remote
    }

    /// The negotiated protocol version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// The largest frame payload this connection writes.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Returns `true` if the distribution manager is shutting down.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.cancel_in_progress().is_some()
    }

    /// The reason cancellation is in progress, if it is.
    pub fn cancel_reason(&self) -> Option<String> {
        self.cancel.cancel_in_progress()
    }

    /// Returns `true` once the connection was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Takes the exclusive right to write to the socket, then a pooled buffer.
    ///
    /// Both waits share the configured acquire timeout. Writers queued behind a stalled write on
    /// this connection hold no pooled buffer while they wait.
    pub async fn acquire_writer(&self) -> Result<ScopedWriter<'_, W>, ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.remote));
        }
        let deadline = Instant::now() + self.acquire_timeout;
        let writer = time::timeout_at(deadline, self.writer.lock())
            .await
            .map_err(|_| ConnectionError::WriterBusy {
                member: self.remote,
                timeout: self.acquire_timeout,
            })?;
        if self.is_closed() {
            return Err(ConnectionError::Closed(self.remote));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        let buf = self.pool.acquire(remaining).await?;
        Ok(ScopedWriter {
            connection: self,
            buf,
            writer,
        })
    }

    /// Shuts the socket down. Later writes fail with [`ConnectionError::Closed`].
    pub async fn close(&self) -> Result<(), ConnectionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(remote = %self.remote, "closing connection");
        let mut writer = self.writer.lock().await;
        writer.shutdown().await.map_err(|err| self.classify(err))
    }

    fn classify(&self, err: io::Error) -> ConnectionError {
        match err.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof => ConnectionError::Unreachable {
                member: self.remote,
                source: err,
            },
            _ => ConnectionError::Io(err),
        }
    }
}

impl<W> fmt::Debug for Connection<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("version", &self.version)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Exclusive, scoped access to a connection's socket with a pooled buffer to encode into.
pub struct ScopedWriter<'a, W> {
    connection: &'a Connection<W>,
    buf: PooledBuffer,
    writer: MutexGuard<'a, W>,
}

impl<W> ScopedWriter<'_, W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// The version frames must be encoded with.
    pub fn version(&self) -> Version {
        self.connection.version
    }

    /// The buffer holding the next frame's payload.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Writes the buffer as one frame and flushes the socket.
    ///
    /// Failures which mean the peer cannot be reached are reported as
    /// [`ConnectionError::Unreachable`]; every other I/O failure as [`ConnectionError::Io`].
    pub async fn flush(mut self) -> Result<(), ConnectionError> {
        let len = self.buf.len();
        if len > self.connection.max_message_size {
            return Err(ConnectionError::MessageTooLarge {
                len,
                max: self.connection.max_message_size,
            });
        }
        let header = framing::frame_header(len);
        let result = async {
            self.writer.write_all(&header).await?;
            self.writer.write_all(&self.buf).await?;
            self.writer.flush().await
        }
        .await;
        match result {
            Ok(()) => {
                trace!(remote = %self.connection.remote, len, "frame written");
                Ok(())
            }
            Err(err) => Err(self.connection.classify(err)),
        }
    }
}

impl<W> fmt::Debug for ScopedWriter<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedWriter")
            .field("remote", &self.connection.remote)
            .field("buf", &self.buf)
            .finish()
    }
}
