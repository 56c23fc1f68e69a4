//! Scratch buffers for the encode path.
//!
//! Rendering goes through a pooled scratch buffer so repeated marshalling
//! does not pay a growth-reallocation per call. Purely an allocation
//! optimization; dropping the pool would not change any output.

use parking_lot::Mutex;

/// Buffers above this capacity are dropped instead of pooled.
const MAX_POOLED: usize = 1 << 16;

const INITIAL_CAPACITY: usize = 0x200;

static POOL: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

/// Take a cleared scratch buffer from the pool.
pub(crate) fn acquire() -> Vec<u8> {
    match POOL.lock().pop() {
        Some(mut buf) => {
            buf.clear();
            buf
        }
        None => Vec::with_capacity(INITIAL_CAPACITY),
    }
}

/// Return a scratch buffer to the pool.
pub(crate) fn release(buf: Vec<u8>) {
    if buf.capacity() < MAX_POOLED {
        POOL.lock().push(buf);
    }
}
