//! The kernel-side scheduler object as seen from user space.

use std::ptr::NonNull;

/// A constructed kernel-side scheduler object that exposes its shared region.
///
/// The session never looks past the region: how the object was loaded, and
/// what else it owns, is up to the implementation.
///
/// # Safety
///
/// Implementors guarantee that `region()` points to at least `region_len()`
/// bytes that stay mapped, readable and writable (through atomic accesses)
/// at the same address until the object is released or dropped.
pub unsafe trait SchedObject: Send + 'static {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Base address of the shared region.
    fn region(&self) -> NonNull<u8>;

    /// Length of the shared region in bytes.
    fn region_len(&self) -> usize;

    /// Release kernel-side resources. Called exactly once, by the owner.
    fn release(self: Box<Self>) {}
}
