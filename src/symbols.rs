//! Symbol index: name → absolute address for the loaded object.
//!
//! Building the index also rewrites each defined `FUNC`/`OBJECT` record's
//! `value` to its final arena address, so the relocator can consume those
//! records uniformly without consulting the placement map again.

use log::trace;

use crate::elf;
use crate::object::SymbolRec;

#[derive(Debug)]
pub struct SymbolIndex {
    entries: Vec<(String, usize)>,
}

impl SymbolIndex {
    /// Scan the symbol table after placement. Defined `FUNC` and `OBJECT`
    /// symbols get their absolute address computed, written back into the
    /// record, and (when named) published for lookup.
    pub fn build(symbols: &mut [SymbolRec], addrs: &[Option<usize>]) -> SymbolIndex {
        let mut entries = Vec::new();
        for sym in symbols.iter_mut() {
            let t = sym.sym_type();
            if t != elf::STT_FUNC && t != elf::STT_OBJECT {
                continue;
            }
            let base = match addrs.get(sym.shndx as usize).copied().flatten() {
                Some(base) => base,
                None => continue, // undefined, or defined outside the image
            };
            let addr = base + sym.value;
            sym.value = addr;
            trace!("symbol {} => {:#x}", sym.name, addr);
            if !sym.name.is_empty() {
                entries.push((sym.name.clone(), addr));
            }
        }
        SymbolIndex { entries }
    }

    /// Exact, case-sensitive name match; linear over the index.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, addr)| addr)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
