//! Load failure taxonomy and the process-wide last-error buffer.
//!
//! Every failure aborts the current `open`; there is no partial success.
//! `LoadError` is the per-call channel; the last-error buffer retains the
//! rendered text of the most recent failure for dlerror-style diagnostics.

use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

/// All ways a load can fail.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The first four bytes are not the ELF magic.
    #[error("{0} is not ELF")]
    NotElf(String),

    /// Structurally valid ELF that this loader does not accept: wrong
    /// class, endianness, object type, or machine.
    #[error("unsupported object: {0}")]
    Unsupported(&'static str),

    /// A header, table, or payload runs past the end of the input buffer.
    #[error("truncated object: {0}")]
    Truncated(&'static str),

    #[error("object has no symbol table")]
    NoSymtab,

    #[error("mmap failed: {0}")]
    Map(io::Error),

    /// The bump cursor would pass the arena's capacity. The arena is sized
    /// up front, so this indicates a sizing-pass mismatch, not user error.
    #[error("arena capacity exceeded")]
    ArenaExhausted,

    #[error("failed to resolve {0}")]
    UnresolvedSymbol(String),

    #[error("unsupported relocation sym {0}")]
    UnsupportedSymbolType(u8),

    #[error("unknown reloc: {0}")]
    UnknownRelocation(u32),
}

static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

/// Record `err` as the most recent load failure, overwriting any prior text.
pub(crate) fn record(err: &LoadError) {
    let mut slot = LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner());
    *slot = Some(err.to_string());
}

/// The text of the most recent load failure, if any load has failed.
///
/// Process-wide: a failure on any thread overwrites the buffer. Intended
/// for human diagnostics; callers wanting structured errors should match on
/// the [`LoadError`] returned by `open` instead.
pub fn last_error() -> Option<String> {
    LAST_ERROR.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
