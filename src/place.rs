//! Section placement.
//!
//! Allocated sections are laid out in index order inside the arena, each
//! aligned to at least [`SECTION_ALIGN`] and to its own declared alignment
//! if that is larger. `image_size` runs the identical arithmetic against
//! offset zero so the arena can be mapped at its final size before anything
//! is placed; the arena base is page-aligned, so offset alignment and
//! address alignment agree.

use crate::arena::Arena;
use crate::elf;
use crate::object::ObjectFile;
use crate::error::LoadError;

/// Minimum alignment for every placed section.
pub const SECTION_ALIGN: usize = 16;

fn section_align(declared: usize) -> usize {
    declared.max(SECTION_ALIGN)
}

/// Total arena bytes the allocated sections will occupy, padding included.
/// Checked arithmetic: a hostile object can declare `NOBITS` sections of any
/// size, and the sum must not wrap.
pub fn image_size(obj: &ObjectFile) -> Result<usize, LoadError> {
    let mut off = 0usize;
    for sec in &obj.sections {
        if sec.flags & elf::SHF_ALLOC == 0 {
            continue;
        }
        let align = section_align(sec.addralign);
        off = off
            .checked_add(align - 1)
            .map(|v| v & !(align - 1))
            .and_then(|v| v.checked_add(sec.size))
            .ok_or(LoadError::Unsupported("allocated sections exceed address space"))?;
    }
    Ok(off)
}

/// Assign every allocated section a base address inside the arena and copy
/// its payload there. `NOBITS` sections rely on the mapping being
/// zero-initialized. Returns the placement map, indexed by section number.
pub fn place(obj: &ObjectFile, arena: &mut Arena) -> Result<Vec<Option<usize>>, LoadError> {
    let mut addrs = vec![None; obj.sections.len()];
    for (i, sec) in obj.sections.iter().enumerate() {
        if sec.flags & elf::SHF_ALLOC == 0 {
            continue;
        }
        arena.align_to(section_align(sec.addralign));
        let base = arena.allocate(sec.size)?;
        let data = &obj.section_data[i];
        if sec.sh_type != elf::SHT_NOBITS && !data.is_empty() {
            // SAFETY: base..base+size was just handed out by the arena and
            // the parser guarantees data.len() == sec.size.
            unsafe {
                std::ptr::copy_nonoverlapping(data.as_ptr(), base as *mut u8, data.len());
            }
        }
        addrs[i] = Some(base);
    }
    Ok(addrs)
}
