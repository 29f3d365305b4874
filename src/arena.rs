//! Executable memory arena.
//!
//! One anonymous private mapping per loaded object, readable, writable, and
//! executable for the lifetime of the handle. Sub-allocation is a bump
//! cursor: once advanced it never rewinds, and the region never grows —
//! growing would invalidate every address already handed out, so the caller
//! sizes the arena up front and maps once.

use std::io;
use std::ptr;

use crate::error::LoadError;

/// Round `v` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) fn align_up(v: usize, align: usize) -> usize {
    (v + align - 1) & !(align - 1)
}

#[derive(Debug)]
pub struct Arena {
    base: *mut u8,
    len: usize,
    used: usize,
}

impl Arena {
    /// Map a zero-initialized RWX region of at least `len` bytes, rounded up
    /// to the page size.
    pub fn map(len: usize) -> Result<Arena, LoadError> {
        let page = page_size();
        let len = len
            .max(1)
            .checked_add(page - 1)
            .ok_or_else(|| LoadError::Map(io::Error::from_raw_os_error(libc::ENOMEM)))?
            & !(page - 1);
        // SAFETY: anonymous mapping with no fixed address; the kernel picks
        // the placement and the length is page-rounded.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(LoadError::Map(io::Error::last_os_error()));
        }
        Ok(Arena {
            base: ptr as *mut u8,
            len,
            used: 0,
        })
    }

    /// Advance the cursor by `size` and return the address it was at.
    pub fn allocate(&mut self, size: usize) -> Result<usize, LoadError> {
        let next = self.used.checked_add(size).ok_or(LoadError::ArenaExhausted)?;
        if next > self.len {
            return Err(LoadError::ArenaExhausted);
        }
        let addr = self.base as usize + self.used;
        self.used = next;
        Ok(addr)
    }

    /// Round the cursor up to the next multiple of `align` (a power of two).
    pub fn align_to(&mut self, align: usize) {
        self.used = align_up(self.used, align);
    }

    pub fn base(&self) -> usize {
        self.base as usize
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Whether `addr` falls inside the mapped region.
    #[allow(dead_code)]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.base as usize && addr < self.base as usize + self.len
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: base/len describe exactly the region returned by mmap.
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len);
        }
    }
}

pub(crate) fn page_size() -> usize {
    // SAFETY: sysconf with a valid name has no preconditions.
    let sz = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if sz <= 0 { 4096 } else { sz as usize }
}
