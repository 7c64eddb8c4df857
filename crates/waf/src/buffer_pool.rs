//! Buffer pooling for bulk body copies.
//!
//! Copying a body from a reader into a writer needs a scratch buffer. This
//! module keeps a thread-local pool of fixed-size buffers so the copy path does
//! not allocate per request. A buffer is owned by one copy operation and
//! returns to the pool as soon as the [`PooledBuffer`] guard is dropped.
//!
//! # Performance
//!
//! - Buffers up to [`MAX_POOLED_BUFFER_SIZE`]: reused, zero allocation
//! - Larger buffers: fresh allocation, dropped after use
//! - Thread-local: no contention between threads

use bytes::BytesMut;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Default copy buffer size (32 KB).
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;

/// Maximum number of buffers to keep in the pool per thread.
pub const MAX_POOL_SIZE: usize = 16;

/// Maximum buffer size to pool (larger buffers are dropped).
pub const MAX_POOLED_BUFFER_SIZE: usize = 256 * 1024;

thread_local! {
    static BUFFER_POOL: RefCell<BufferPool> = RefCell::new(BufferPool::new());
}

/// Thread-local buffer pool.
struct BufferPool {
    buffers: VecDeque<BytesMut>,
    allocated: usize,
    reused: usize,
    dropped: usize,
}

impl BufferPool {
    fn new() -> Self {
        Self {
            buffers: VecDeque::with_capacity(MAX_POOL_SIZE),
            allocated: 0,
            reused: 0,
            dropped: 0,
        }
    }

    fn get(&mut self, size: usize) -> BytesMut {
        if let Some(idx) = self.buffers.iter().position(|b| b.capacity() >= size) {
            if let Some(mut buf) = self.buffers.remove(idx) {
                buf.resize(size, 0);
                self.reused += 1;
                return buf;
            }
        }

        self.allocated += 1;
        let mut buf = BytesMut::with_capacity(size);
        buf.resize(size, 0);
        buf
    }

    fn put(&mut self, mut buf: BytesMut) {
        if buf.capacity() > MAX_POOLED_BUFFER_SIZE || self.buffers.len() >= MAX_POOL_SIZE {
            self.dropped += 1;
            return;
        }

        // Never hand one request's bytes to the next.
        buf.clear();
        self.buffers.push_back(buf);
    }
}

/// A fixed-size scratch buffer that returns to the pool on drop.
///
/// Derefs to a byte slice of exactly the requested length.
pub struct PooledBuffer {
    buffer: Option<BytesMut>,
}

impl PooledBuffer {
    /// Acquire a buffer of exactly `size` bytes.
    pub fn new(size: usize) -> Self {
        let buffer = BUFFER_POOL.with(|pool| pool.borrow_mut().get(size));
        Self {
            buffer: Some(buffer),
        }
    }

    /// Get the length of the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the capacity of the buffer.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.capacity())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buffer.take() {
            BUFFER_POOL.with(|pool| pool.borrow_mut().put(buf));
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.buffer.as_deref().unwrap_or(&[])
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.buffer.as_mut() {
            Some(buf) => &mut buf[..],
            None => &mut [],
        }
    }
}

/// Counters of the current thread's pool.
pub fn pool_stats() -> PoolStats {
    BUFFER_POOL.with(|pool| {
        let pool = pool.borrow();
        PoolStats {
            pooled: pool.buffers.len(),
            allocated: pool.allocated,
            reused: pool.reused,
            dropped: pool.dropped,
        }
    })
}

/// Copy buffer counters for the current thread.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Idle buffers
    pub pooled: usize,
    /// Buffers created because none idle was large enough
    pub allocated: usize,
    /// Buffers served from the idle list
    pub reused: usize,
    /// Buffers discarded on return (oversized or list full)
    pub dropped: usize,
}

/// Acquire a copy buffer of the given size.
#[inline]
pub fn acquire(size: usize) -> PooledBuffer {
    PooledBuffer::new(size)
}

/// Acquire a copy buffer of [`COPY_BUFFER_SIZE`] bytes.
#[inline]
pub fn acquire_default() -> PooledBuffer {
    PooledBuffer::new(COPY_BUFFER_SIZE)
}
