use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use bytes::BytesMut;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::error::ConnectionError;

/// A fixed number of reusable write buffers shared by many connections.
///
/// Every buffer handed out is backed by a semaphore permit, so at most `size` buffers are in use
/// at once and callers wait (with a bound) for one to come back.
pub struct BufferPool {
    permits: Arc<Semaphore>,
    free: Mutex<Vec<BytesMut>>,
    buffer_capacity: usize,
    retain_limit: usize,
}

impl BufferPool {
    /// Creates a pool of `size` buffers of `buffer_capacity` bytes each.
    ///
    /// A returned buffer whose capacity grew past `retain_limit` is dropped and replaced lazily.
    pub fn new(size: usize, buffer_capacity: usize, retain_limit: usize) -> Self {
        BufferPool {
            permits: Arc::new(Semaphore::new(size)),
            free: Mutex::new(Vec::with_capacity(size)),
            buffer_capacity,
            retain_limit,
        }
    }

    /// Takes a buffer, waiting at most `timeout` for one to be returned.
    pub async fn acquire(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<PooledBuffer, ConnectionError> {
        let acquire = Arc::clone(&self.permits).acquire_owned();
        let permit = match tokio::time::timeout(timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(ConnectionError::PoolClosed),
            Err(_) => return Err(ConnectionError::PoolExhausted(timeout)),
        };
        let buf = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));
        Ok(PooledBuffer {
            buf,
            pool: Arc::clone(self),
            _permit: permit,
        })
    }

    /// Number of buffers which can be taken without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Closes the pool. Waiting and future acquisitions fail with
    /// [`ConnectionError::PoolClosed`]; buffers already handed out stay valid.
    pub fn close(&self) {
        self.permits.close();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.retain_limit || self.is_closed() {
            trace!(capacity = buf.capacity(), "dropping write buffer");
            return;
        }
        buf.clear();
        self.free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(buf);
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("available", &self.available())
            .field("buffer_capacity", &self.buffer_capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`], returned when dropped.
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<BufferPool>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    #[tokio::test]
    async fn buffers_are_returned_cleared() {
        let pool = Arc::new(BufferPool::new(1, 16, 1024));
        {
            let mut buf = pool.acquire(Duration::from_millis(10)).await.unwrap();
            buf.put_slice(b"stale");
            assert_eq!(pool.available(), 0);
        }
        assert_eq!(pool.available(), 1);
        let buf = pool.acquire(Duration::from_millis(10)).await.unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 16);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = Arc::new(BufferPool::new(1, 16, 1024));
        let _held = pool.acquire(Duration::from_millis(10)).await.unwrap();
        let err = pool.acquire(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, ConnectionError::PoolExhausted(_)));
    }

    #[tokio::test]
    async fn waiter_gets_buffer_once_returned() {
        let pool = Arc::new(BufferPool::new(1, 16, 1024));
        let held = pool.acquire(Duration::from_millis(10)).await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire(Duration::from_secs(5)).await.map(|_| ()) })
        };
        tokio::task::yield_now().await;
        drop(held);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closed_pool_refuses_buffers() {
        let pool = Arc::new(BufferPool::new(2, 16, 1024));
        pool.close();
        assert!(matches!(
            pool.acquire(Duration::from_millis(10)).await,
            Err(ConnectionError::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn oversized_buffers_are_not_recycled() {
        let pool = Arc::new(BufferPool::new(1, 8, 64));
        {
            let mut buf = pool.acquire(Duration::from_millis(10)).await.unwrap();
            buf.put_slice(&[0u8; 256]);
        }
        let buf = pool.acquire(Duration::from_millis(10)).await.unwrap();
        assert!(buf.capacity() < 256);
    }
}
