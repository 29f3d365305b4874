//! Parsing of a relocatable ELF object into owned records.
//!
//! The input buffer is untrusted: every table and payload range is checked
//! against the buffer length before it is read, so a malformed file produces
//! a [`LoadError`], never an out-of-bounds access. Parsing copies section
//! payloads and resolves symbol names eagerly, which lets the caller drop
//! the file buffer before placement.

use crate::elf::{self, RawShdr};
use crate::error::LoadError;

/// One symbol record. `value` starts section-relative; after the index is
/// built (see `symbols`), defined `FUNC`/`OBJECT` records hold their final
/// absolute address instead.
#[derive(Debug, Clone)]
pub struct SymbolRec {
    pub name: String,
    pub info: u8,
    pub shndx: u16,
    pub value: usize,
}

impl SymbolRec {
    pub fn sym_type(&self) -> u8 {
        self.info & 0xf
    }

    pub fn is_undefined(&self) -> bool {
        self.shndx == elf::SHN_UNDEF
    }
}

/// One relocation, already normalized: REL entries carry `addend == 0`.
pub type RelocEntry = elf::RawRel;

/// A parsed relocatable object, detached from the file buffer.
#[derive(Debug)]
pub struct ObjectFile {
    pub sections: Vec<RawShdr>,
    /// Payload per section; empty for `NOBITS` and zero-sized sections.
    pub section_data: Vec<Vec<u8>>,
    pub symbols: Vec<SymbolRec>,
    /// Relocations indexed by the section they patch.
    pub relocations: Vec<Vec<RelocEntry>>,
    pub source_name: String,
}

impl ObjectFile {
    pub fn is_alloc(&self, shndx: usize) -> bool {
        self.sections
            .get(shndx)
            .map(|s| s.flags & elf::SHF_ALLOC != 0)
            .unwrap_or(false)
    }
}

/// Parse `data` as a relocatable object for the host architecture.
pub fn parse(data: &[u8], source_name: &str) -> Result<ObjectFile, LoadError> {
    if data.len() < elf::EHDR_LEN {
        return Err(LoadError::Truncated("ELF header"));
    }
    if data[0..4] != elf::ELF_MAGIC {
        return Err(LoadError::NotElf(source_name.to_string()));
    }
    if data[4] != elf::CLASS {
        return Err(LoadError::Unsupported("wrong ELF class for this target"));
    }
    if data[5] != elf::ELFDATA2LSB {
        return Err(LoadError::Unsupported("not little-endian"));
    }
    if elf::read_u16(data, elf::E_TYPE) != elf::ET_REL {
        return Err(LoadError::Unsupported("not a relocatable object"));
    }
    if elf::read_u16(data, elf::E_MACHINE) != elf::EM_HOST {
        return Err(LoadError::Unsupported("wrong machine type for this target"));
    }

    let e_shoff = elf::read_word(data, elf::E_SHOFF);
    let e_shentsize = elf::read_u16(data, elf::E_SHENTSIZE) as usize;
    let e_shnum = elf::read_u16(data, elf::E_SHNUM) as usize;

    if e_shoff == 0 || e_shnum == 0 {
        return Err(LoadError::Truncated("no section headers"));
    }
    if e_shentsize < elf::SHDR_LEN {
        return Err(LoadError::Unsupported("section header entry too small"));
    }
    let table_len = e_shnum
        .checked_mul(e_shentsize)
        .and_then(|l| l.checked_add(e_shoff))
        .ok_or(LoadError::Truncated("section header table"))?;
    if table_len > data.len() {
        return Err(LoadError::Truncated("section header table"));
    }

    let mut sections = Vec::with_capacity(e_shnum);
    for i in 0..e_shnum {
        let shdr = elf::read_shdr(data, e_shoff + i * e_shentsize);
        if shdr.addralign > 1 && !shdr.addralign.is_power_of_two() {
            return Err(LoadError::Unsupported("section alignment not a power of two"));
        }
        sections.push(shdr);
    }

    // Copy out payloads so the file buffer can go away.
    let mut section_data = Vec::with_capacity(e_shnum);
    for sec in &sections {
        if sec.sh_type == elf::SHT_NOBITS || sec.size == 0 {
            section_data.push(Vec::new());
            continue;
        }
        let end = sec
            .offset
            .checked_add(sec.size)
            .ok_or(LoadError::Truncated("section data"))?;
        if end > data.len() {
            return Err(LoadError::Truncated("section data"));
        }
        section_data.push(data[sec.offset..end].to_vec());
    }

    let symbols = parse_symtab(&sections, &section_data)?;

    // Relocation tables, indexed by the section they patch. A table whose
    // target index is bogus is rejected here; bad r_offset / sym_idx values
    // surface later, at patch time, when the widths are known.
    let mut relocations = vec![Vec::new(); e_shnum];
    for (i, sec) in sections.iter().enumerate() {
        let has_addend = match sec.sh_type {
            elf::SHT_RELA => true,
            elf::SHT_REL => false,
            _ => continue,
        };
        let entry_len = if has_addend { elf::RELA_LEN } else { elf::REL_LEN };
        let target = sec.info as usize;
        if target >= e_shnum {
            return Err(LoadError::Truncated("relocation target section"));
        }
        let table = &section_data[i];
        let count = table.len() / entry_len;
        let entries: &mut Vec<RelocEntry> = &mut relocations[target];
        entries.reserve(count);
        for j in 0..count {
            entries.push(elf::read_rel(table, j * entry_len, has_addend));
        }
    }

    Ok(ObjectFile {
        sections,
        section_data,
        symbols,
        relocations,
        source_name: source_name.to_string(),
    })
}

/// Locate the first SYMTAB, resolve names through its linked string table.
fn parse_symtab(
    sections: &[RawShdr],
    section_data: &[Vec<u8>],
) -> Result<Vec<SymbolRec>, LoadError> {
    let (symtab_idx, symtab) = sections
        .iter()
        .enumerate()
        .find(|(_, s)| s.sh_type == elf::SHT_SYMTAB)
        .ok_or(LoadError::NoSymtab)?;

    let strtab_idx = symtab.link as usize;
    let strtab_ok = sections
        .get(strtab_idx)
        .map(|s| s.sh_type == elf::SHT_STRTAB)
        .unwrap_or(false);
    if !strtab_ok {
        return Err(LoadError::Truncated("symbol string table"));
    }
    let strtab = &section_data[strtab_idx];

    let sym_data = &section_data[symtab_idx];
    let count = sym_data.len() / elf::SYM_LEN;
    let mut symbols = Vec::with_capacity(count);
    for i in 0..count {
        let raw = elf::read_sym(sym_data, i * elf::SYM_LEN);
        symbols.push(SymbolRec {
            name: elf::read_cstr(strtab, raw.name_idx as usize),
            info: raw.info,
            shndx: raw.shndx,
            value: raw.value,
        });
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf;

    // A bare ELF header for the host target with no section headers.
    fn host_ehdr() -> Vec<u8> {
        let mut h = vec![0u8; elf::EHDR_LEN];
        h[0..4].copy_from_slice(&elf::ELF_MAGIC);
        h[4] = elf::CLASS;
        h[5] = elf::ELFDATA2LSB;
        h[6] = 1;
        h[elf::E_TYPE..elf::E_TYPE + 2].copy_from_slice(&elf::ET_REL.to_le_bytes());
        h[elf::E_MACHINE..elf::E_MACHINE + 2].copy_from_slice(&elf::EM_HOST.to_le_bytes());
        h
    }

    #[test]
    fn test_rejects_short_buffer() {
        let err = parse(&[0x7f, b'E'], "t.o").unwrap_err();
        assert!(matches!(err, LoadError::Truncated(_)));
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut h = host_ehdr();
        h[0] = 0;
        let err = parse(&h, "t.o").unwrap_err();
        assert!(matches!(err, LoadError::NotElf(_)));
    }

    #[test]
    fn test_rejects_wrong_class() {
        let mut h = host_ehdr();
        h[4] = if elf::CLASS == elf::ELFCLASS64 { elf::ELFCLASS32 } else { elf::ELFCLASS64 };
        let err = parse(&h, "t.o").unwrap_err();
        assert!(matches!(err, LoadError::Unsupported(_)));
    }

    #[test]
    fn test_rejects_executable_type() {
        let mut h = host_ehdr();
        h[elf::E_TYPE] = 2; // ET_EXEC
        let err = parse(&h, "t.o").unwrap_err();
        assert!(matches!(err, LoadError::Unsupported(_)));
    }

    #[test]
    fn test_rejects_missing_section_table() {
        let err = parse(&host_ehdr(), "t.o").unwrap_err();
        assert!(matches!(err, LoadError::Truncated("no section headers")));
    }

    #[test]
    fn test_rejects_section_table_past_eof() {
        let mut h = host_ehdr();
        let shoff = h.len();
        h[elf::E_SHOFF..elf::E_SHOFF + std::mem::size_of::<usize>()]
            .copy_from_slice(&shoff.to_le_bytes());
        h[elf::E_SHENTSIZE..elf::E_SHENTSIZE + 2]
            .copy_from_slice(&(elf::SHDR_LEN as u16).to_le_bytes());
        h[elf::E_SHNUM..elf::E_SHNUM + 2].copy_from_slice(&4u16.to_le_bytes());
        // Only one header's worth of bytes follows, not four.
        h.extend_from_slice(&vec![0u8; elf::SHDR_LEN]);
        let err = parse(&h, "t.o").unwrap_err();
        assert!(matches!(err, LoadError::Truncated("section header table")));
    }
}
