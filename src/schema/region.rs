//! Bounds-checked, read-only view over a mapped byte region.

use std::marker::PhantomData;
use std::ptr::{self, NonNull};

/// Non-owning view of a foreign byte region.
///
/// The lifetime ties the view to the handle that owns the mapping, so a view
/// can never outlive the OS-level open/close pair. Every read is bounds
/// checked. The producer writes concurrently, so aligned scalar reads are
/// volatile and always go back to memory.
#[derive(Clone, Copy)]
pub struct Region<'a> {
    base: NonNull<u8>,
    len: usize,
    _borrow: PhantomData<&'a [u8]>,
}

impl std::fmt::Debug for Region<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region").field("base", &self.base).field("len", &self.len).finish()
    }
}

impl<'a> Region<'a> {
    /// Create a view over `len` bytes at `base`.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` bytes for the whole lifetime `'a`.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len, _borrow: PhantomData }
    }

    /// View over a byte slice.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        // SAFETY: a slice is valid for reads of its length for `'a`.
        unsafe { Self::from_raw_parts(NonNull::from(bytes).cast(), bytes.len()) }
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to `offset` if `offset..offset + len` is inside the region.
    fn span(&self, offset: usize, len: usize) -> Option<*const u8> {
        let end = offset.checked_add(len)?;
        if end > self.len {
            return None;
        }
        // SAFETY: `offset <= self.len`, so the result stays inside the allocation.
        Some(unsafe { self.base.as_ptr().add(offset) as *const u8 })
    }

    /// Read a little-endian `i32` at `offset`.
    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        let ptr = self.span(offset, 4)?.cast::<i32>();
        // SAFETY: `span` checked the 4 bytes are in bounds.
        let value = unsafe {
            if ptr.is_aligned() { ptr::read_volatile(ptr) } else { ptr::read_unaligned(ptr) }
        };
        Some(i32::from_le(value))
    }

    /// Read one byte at `offset`.
    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        let ptr = self.span(offset, 1)?;
        // SAFETY: `span` checked the byte is in bounds.
        Some(unsafe { ptr::read_volatile(ptr) })
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Returns false, leaving `dst` untouched, when the range is out of bounds.
    pub fn copy_to(&self, offset: usize, dst: &mut [u8]) -> bool {
        let Some(src) = self.span(offset, dst.len()) else {
            return false;
        };
        // SAFETY: `span` checked the source range; `dst` is a distinct
        // exclusive borrow so the ranges cannot overlap.
        unsafe { ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len()) };
        true
    }

    /// Owned copy of `len` bytes at `offset`.
    pub fn bytes(&self, offset: usize, len: usize) -> Option<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.copy_to(offset, &mut out).then_some(out)
    }

    /// Read a NUL-terminated string of at most `max_len` bytes at `offset`.
    ///
    /// The read stops at the first NUL or at the region end, whichever comes
    /// first. Invalid UTF-8 is replaced.
    pub fn c_string(&self, offset: usize, max_len: usize) -> Option<String> {
        if offset > self.len {
            return None;
        }
        let available = max_len.min(self.len - offset);
        let mut bytes = vec![0u8; available];
        if !self.copy_to(offset, &mut bytes) {
            return None;
        }
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        bytes.truncate(end);
        Some(String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
    }
}
