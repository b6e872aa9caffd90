//! In-process backing for the shared region.

use std::ptr::NonNull;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::debug;

use crate::abi::REGION_SIZE;
use crate::object::SchedObject;

/// A region held in process memory.
///
/// Handles are cheap to clone and all point at the same memory, so one
/// handle can back a [`Session`](crate::Session) while another backs a
/// [`KernelPeer`](crate::KernelPeer) standing in for the kernel side.
#[derive(Clone)]
pub struct HeapObject {
    words: Arc<[AtomicU64]>,
    len: usize,
}

impl HeapObject {
    /// A zeroed region of exactly [`REGION_SIZE`] bytes.
    pub fn new() -> Self {
        Self::with_len(REGION_SIZE)
    }

    /// A zeroed region of `len` bytes. Storage is word-backed so the base is
    /// always 8-byte aligned.
    pub fn with_len(len: usize) -> Self {
        let words: Arc<[AtomicU64]> = (0..len.div_ceil(8)).map(|_| AtomicU64::new(0)).collect();
        debug!(bytes = len, "allocated heap region");
        Self { words, len }
    }

    /// Number of live handles to this region.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.words)
    }
}

impl Default for HeapObject {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl SchedObject for HeapObject {
    fn name(&self) -> &str {
        "heap"
    }

    fn region(&self) -> NonNull<u8> {
        NonNull::from(&self.words[..]).cast()
    }

    fn region_len(&self) -> usize {
        self.len
    }
}
