//! The load pipeline.
//!
//! One load runs straight through: read the file, parse it into owned
//! records, size the arena (placed sections plus the relocator's pass-1
//! trampoline budget), map the arena, place sections, build the symbol
//! index, then resolve and patch every relocation. Any failure unwinds
//! through `?`; the arena and index are owned values, so partially built
//! state is released on the way out.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;

use crate::arena::Arena;
use crate::error::LoadError;
use crate::object;
use crate::place;
use crate::reloc;
use crate::symbols::SymbolIndex;

#[derive(Debug)]
pub(crate) struct LoadedImage {
    pub arena: Arena,
    pub symbols: SymbolIndex,
}

pub(crate) fn load_object(
    path: &Path,
    resolver: &dyn Fn(&str) -> Option<usize>,
) -> Result<LoadedImage, LoadError> {
    let bin = read_file(path)?;
    let source_name = path.display().to_string();
    if bin.len() < 4 || bin[0..4] != crate::elf::ELF_MAGIC {
        return Err(LoadError::NotElf(source_name));
    }

    let mut obj = object::parse(&bin, &source_name)?;
    drop(bin); // payloads and names are owned now

    let budget = reloc::trampoline_budget(&obj)?;
    let total = place::image_size(&obj)?
        .checked_add(budget)
        .ok_or(LoadError::Unsupported("allocated sections exceed address space"))?;
    let mut arena = Arena::map(total)?;

    let addrs = place::place(&obj, &mut arena)?;
    let symbols = SymbolIndex::build(&mut obj.symbols, &addrs);
    reloc::apply(&obj, &addrs, &mut arena, resolver)?;

    debug!(
        "objopen {:#x}-{:#x} (+{:#x}) {}",
        arena.base(),
        arena.base() + arena.len(),
        arena.used(),
        obj.source_name
    );
    Ok(LoadedImage { arena, symbols })
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadError> {
    let mut file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut bin = Vec::new();
    file.read_to_end(&mut bin).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bin)
}
