/// Process-wide pool of reusable relay buffers.
///
/// Buffers are checked out for the duration of one relay pump and returned
/// on completion. Contents of a returned buffer are never cleared — every
/// checkout must be treated as holding residue from a prior session, and
/// every pump writes into a buffer before it reads what was written; pool
/// contents are never exposed outside a pump.
use bytes::BytesMut;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

static POOL: Lazy<BufferPool> = Lazy::new(BufferPool::new);

pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
}

impl BufferPool {
    fn new() -> Self {
        BufferPool {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Check out a buffer of at least `size` bytes. Reuses a pooled buffer
    /// when one large enough is free; allocates a new one otherwise. A
    /// reused buffer's contents are left exactly as the last pump left
    /// them — checkout never clears or zero-fills them, matching this
    /// module's contract that callers write before they read.
    pub fn checkout(&self, size: usize) -> BytesMut {
        let mut free = self.free.lock();
        if let Some(pos) = free.iter().position(|b| b.capacity() >= size) {
            let mut buf = free.swap_remove(pos);
            // Safety: `size <= buf.capacity()`, and that capacity was
            // initialized by this pool's own `BytesMut::zeroed` call when
            // the buffer was first allocated, so extending the length
            // within it exposes old pool bytes, never uninitialized
            // memory.
            unsafe { buf.set_len(size) };
            buf
        } else {
            BytesMut::zeroed(size)
        }
    }

    /// Return a buffer to the pool for reuse by a later checkout.
    pub fn release(&self, buf: BytesMut) {
        self.free.lock().push(buf);
    }
}

/// Check out a buffer of at least `size` bytes from the process-wide pool.
pub fn checkout(size: usize) -> BytesMut {
    POOL.checkout(size)
}

/// Return a buffer to the process-wide pool.
pub fn release(buf: BytesMut) {
    POOL.release(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_returns_requested_size() {
        let buf = checkout(4096);
        assert_eq!(buf.len(), 4096);
        release(buf);
    }

    #[test]
    fn released_buffer_is_reused() {
        let pool = BufferPool::new();
        let mut first = pool.checkout(1024);
        first[0] = 0xAB;
        let ptr_before = first.as_ptr();
        pool.release(first);

        let second = pool.checkout(1024);
        // Not a hard guarantee in general (the allocator could change), but
        // with a single freed entry of the right size the pool must hand
        // the same allocation back rather than allocate a fresh one.
        assert_eq!(second.as_ptr(), ptr_before);
    }

    #[test]
    fn checkout_never_panics_on_repeated_use() {
        let pool = BufferPool::new();
        for _ in 0..8 {
            let buf = pool.checkout(2048);
            pool.release(buf);
        }
    }
}
