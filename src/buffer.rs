//! Heap buffer with a caller-chosen power-of-two base alignment.

use crate::Error;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// A fixed-size heap allocation whose base address is aligned to a
/// power-of-two boundary.
///
/// The ring requires its base to be at least frame-aligned so that frame
/// offsets and frame addresses share the same alignment. Freed on drop.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

// SAFETY: AlignedBuffer is a plain owned allocation; whoever owns it may
// touch it from any thread. Access discipline is the ring's concern.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocates `size` bytes aligned to `alignment`.
    ///
    /// Fails with [`Error::Allocation`] if the OS cannot satisfy the request.
    pub fn new(size: usize, alignment: usize) -> Result<Self, Error> {
        assert!(alignment.is_power_of_two());
        assert!(size > 0, "cannot allocate an empty buffer");

        let layout = Layout::from_size_align(size, alignment).map_err(|_| Error::Allocation)?;
        // SAFETY: layout has non-zero size (checked above).
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(Self { ptr, layout }),
            None => Err(Error::Allocation),
        }
    }

    /// Base address of the allocation.
    #[inline]
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Length of the allocation in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/layout are exactly what alloc() returned in new().
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}
