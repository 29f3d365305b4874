//! Default host symbol resolver.
//!
//! Undefined references in a loaded object resolve against the enclosing
//! process's dynamic symbol table, exactly as `dlsym(RTLD_DEFAULT, name)`
//! sees it. The resolver is read-only; the loader never registers symbols.

use std::ffi::CString;

/// Look `name` up in the host process's global scope.
pub fn resolve(name: &str) -> Option<usize> {
    let cname = CString::new(name).ok()?;
    // SAFETY: RTLD_DEFAULT is a valid pseudo-handle and cname is a
    // NUL-terminated string that outlives the call.
    let addr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, cname.as_ptr()) };
    if addr.is_null() {
        None
    } else {
        Some(addr as usize)
    }
}
