//! objload — a runtime loader for ELF relocatable objects.
//!
//! Loads a single unlinked object file (the `.o` a C/C++ toolchain emits
//! before static linking) into executable memory, resolves its internal
//! cross-references and its references to symbols already present in the
//! host process, and hands out addresses of named functions and data:
//!
//! ```no_run
//! use objload::Object;
//!
//! let obj = Object::open("add1.o", 0)?;
//! let addr = obj.lookup("add1").expect("add1 is defined");
//! let add1: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(addr) };
//! assert_eq!(add1(41), 42);
//! # Ok::<(), objload::LoadError>(())
//! ```
//!
//! The loader accepts `ET_REL` objects matching the build target (x86-64 or
//! 32-bit x86, little-endian) and understands the relocation kinds those
//! targets emit for non-PIC code, synthesizing trampolines and GOT slots in
//! the arena when a PC-relative reference must reach a host address beyond
//! ±2 GiB. Shared objects, TLS, initializers, and inter-module dependencies
//! are out of scope.
//!
//! Loading is single-threaded by contract: nothing is shared between
//! handles, and the process-wide [`last_error`] text is a diagnostic
//! convenience, not a synchronization point.

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
compile_error!("unsupported architecture: objload targets x86_64 and x86");

pub(crate) mod arena;
pub mod elf;
pub(crate) mod host;
pub(crate) mod load;
pub(crate) mod object;
pub(crate) mod place;
pub(crate) mod reloc;
pub(crate) mod symbols;

mod error;

pub use error::{last_error, LoadError};

use std::ffi::c_void;
use std::path::Path;

use log::debug;

/// A loaded object: the executable arena plus the symbol index. Created by
/// [`Object::open`], released by [`Object::close`] or drop. Addresses handed
/// out by [`Object::lookup`] are valid only while the handle lives.
#[derive(Debug)]
pub struct Object {
    image: load::LoadedImage,
}

impl Object {
    /// Load the relocatable object at `path`. `flags` is reserved and
    /// currently ignored, matching the dlopen-style contract.
    ///
    /// Undefined symbols resolve against the host process's dynamic symbol
    /// table. On failure the error is returned and also recorded for
    /// [`last_error`]; nothing is left mapped.
    pub fn open(path: impl AsRef<Path>, flags: u32) -> Result<Object, LoadError> {
        Self::open_with_resolver(path, flags, host::resolve)
    }

    /// Like [`Object::open`], but undefined symbols resolve through the
    /// caller's `resolver` instead of `dlsym(RTLD_DEFAULT)`.
    pub fn open_with_resolver(
        path: impl AsRef<Path>,
        _flags: u32,
        resolver: impl Fn(&str) -> Option<usize>,
    ) -> Result<Object, LoadError> {
        match load::load_object(path.as_ref(), &resolver) {
            Ok(image) => Ok(Object { image }),
            Err(err) => {
                error::record(&err);
                Err(err)
            }
        }
    }

    /// Address of the named `FUNC` or `OBJECT` symbol, or `None` if the
    /// object defines no such name. The match is exact and case-sensitive.
    ///
    /// The caller may transmute a function symbol's address to the matching
    /// `extern "C"` signature and call it, or read/write through a data
    /// symbol's address, for as long as the handle is alive.
    pub fn lookup(&self, name: &str) -> Option<*const c_void> {
        self.image.symbols.lookup(name).map(|addr| addr as *const c_void)
    }

    /// Number of symbols published by this object.
    pub fn symbol_count(&self) -> usize {
        self.image.symbols.len()
    }

    /// Release the arena and the symbol index. Equivalent to dropping the
    /// handle; provided for call sites that want the release to be visible.
    pub fn close(self) {}
}

impl Drop for Object {
    fn drop(&mut self) {
        debug!(
            "objclose {:#x}-{:#x}",
            self.image.arena.base(),
            self.image.arena.base() + self.image.arena.len()
        );
    }
}
