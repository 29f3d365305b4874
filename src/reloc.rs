//! Two-pass relocation engine.
//!
//! Pass 1 (`trampoline_budget`) classifies every relocation and sums the
//! arena bytes that pass 2 will claim for synthesized code: 14 per PLT
//! trampoline, 8 per GOT slot. It patches nothing and resolves no symbols,
//! but it does reject unknown relocation kinds — before any memory is
//! mapped. Pass 2 (`apply`) resolves each referent and patches the site.
//!
//! Patches are read-modify-write through unaligned pointers, so REL
//! implicit addends (stored at the patch site) and RELA explicit addends go
//! through the same arithmetic.
//!
//! Only relocation tables whose target section is allocated are processed;
//! tables against debug info and other non-resident sections are skipped.

use log::trace;

use crate::arena::Arena;
use crate::elf;
use crate::error::LoadError;
use crate::object::{ObjectFile, SymbolRec};

// ── x86-64 relocation kinds ──────────────────────────────────────────────────

#[cfg(target_arch = "x86_64")]
pub const R_X86_64_NONE: u32 = 0;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_64: u32 = 1;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_PC32: u32 = 2;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_PLT32: u32 = 4;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_GOTPCREL: u32 = 9;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_32: u32 = 10;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_32S: u32 = 11;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_GOTPCRELX: u32 = 41;
#[cfg(target_arch = "x86_64")]
pub const R_X86_64_REX_GOTPCRELX: u32 = 42;

// ── i386 relocation kinds ────────────────────────────────────────────────────

#[cfg(target_arch = "x86")]
pub const R_386_NONE: u32 = 0;
#[cfg(target_arch = "x86")]
pub const R_386_32: u32 = 1;
#[cfg(target_arch = "x86")]
pub const R_386_PC32: u32 = 2;
#[cfg(target_arch = "x86")]
pub const R_386_PLT32: u32 = 4;

/// `jmp *0(%rip)` plus the 8-byte absolute destination.
pub const TRAMPOLINE_LEN: usize = 14;
pub const GOT_SLOT_LEN: usize = 8;

/// What a relocation kind does to its patch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(target_arch = "x86", allow(dead_code))]
enum Patch {
    /// `R_*_NONE`: nothing.
    Skip,
    /// `*u32 += S + A`
    Abs32,
    /// `*u64 += S + A`
    Abs64,
    /// `*u32 += (S - P) + A`
    Pc32,
    /// PC-relative call through a synthesized far-jump trampoline.
    Plt32,
    /// PC-relative load through a synthesized 8-byte GOT slot holding `S`.
    GotSlot,
}

#[cfg(target_arch = "x86_64")]
fn classify(kind: u32) -> Option<Patch> {
    match kind {
        R_X86_64_NONE => Some(Patch::Skip),
        R_X86_64_64 => Some(Patch::Abs64),
        R_X86_64_32 | R_X86_64_32S => Some(Patch::Abs32),
        R_X86_64_PC32 => Some(Patch::Pc32),
        R_X86_64_PLT32 => Some(Patch::Plt32),
        R_X86_64_GOTPCREL | R_X86_64_GOTPCRELX | R_X86_64_REX_GOTPCRELX => Some(Patch::GotSlot),
        _ => None,
    }
}

#[cfg(target_arch = "x86")]
fn classify(kind: u32) -> Option<Patch> {
    match kind {
        R_386_NONE => Some(Patch::Skip),
        R_386_32 => Some(Patch::Abs32),
        // Every destination is reachable with a 32-bit displacement in a
        // 32-bit address space, so PLT32 needs no trampoline.
        R_386_PC32 | R_386_PLT32 => Some(Patch::Pc32),
        _ => None,
    }
}

fn patch_width(patch: Patch) -> usize {
    match patch {
        Patch::Skip => 0,
        Patch::Abs64 => 8,
        _ => 4,
    }
}

// ── Pass 1: sizing ───────────────────────────────────────────────────────────

/// Arena bytes pass 2 will allocate for trampolines and GOT slots.
pub fn trampoline_budget(obj: &ObjectFile) -> Result<usize, LoadError> {
    let mut budget = 0usize;
    for (target, entries) in obj.relocations.iter().enumerate() {
        if entries.is_empty() || !obj.is_alloc(target) {
            continue;
        }
        for r in entries {
            match classify(r.kind).ok_or(LoadError::UnknownRelocation(r.kind))? {
                Patch::Plt32 => budget += TRAMPOLINE_LEN,
                Patch::GotSlot => budget += GOT_SLOT_LEN,
                _ => {}
            }
        }
    }
    Ok(budget)
}

// ── Pass 2: resolve and patch ────────────────────────────────────────────────

/// Resolve every relocation and patch its site. `addrs` is the placement
/// map; trampolines and GOT slots are bump-allocated from the same arena the
/// sections were placed in, which keeps them within ±2 GiB of every patch
/// site.
pub fn apply(
    obj: &ObjectFile,
    addrs: &[Option<usize>],
    arena: &mut Arena,
    resolver: &dyn Fn(&str) -> Option<usize>,
) -> Result<(), LoadError> {
    for (target_idx, entries) in obj.relocations.iter().enumerate() {
        if entries.is_empty() || !obj.is_alloc(target_idx) {
            continue;
        }
        let base = match addrs.get(target_idx).copied().flatten() {
            Some(base) => base,
            None => continue,
        };
        let section_size = obj.sections[target_idx].size;

        for r in entries {
            let patch = classify(r.kind).ok_or(LoadError::UnknownRelocation(r.kind))?;
            let width = patch_width(patch);
            if width == 0 {
                continue;
            }
            let end = r
                .offset
                .checked_add(width)
                .ok_or(LoadError::Truncated("relocation patch site"))?;
            if end > section_size {
                return Err(LoadError::Truncated("relocation patch site"));
            }
            let site = base + r.offset;
            let sym = obj
                .symbols
                .get(r.sym_idx as usize)
                .ok_or(LoadError::Truncated("relocation symbol index"))?;
            let s = resolve_referent(sym, addrs, resolver)?;
            let a = r.addend as i64;
            trace!(
                "reloc kind={} sym={} site={:#x} S={:#x} A={}",
                r.kind, sym.name, site, s, a
            );

            match patch {
                Patch::Skip => {}
                // SAFETY (all arms): `site..site+width` lies inside the
                // placed target section, checked against the section size
                // above; trampolines and slots come fresh from the arena.
                Patch::Abs32 => unsafe {
                    patch32(site, (s as i64).wrapping_add(a));
                },
                Patch::Abs64 => unsafe {
                    patch64(site, (s as i64).wrapping_add(a));
                },
                Patch::Pc32 => unsafe {
                    patch32(site, pc_delta(s, site, a));
                },
                Patch::Plt32 => {
                    let tramp = emit_trampoline(arena, s)?;
                    unsafe {
                        patch32(site, pc_delta(tramp, site, a));
                    }
                }
                Patch::GotSlot => {
                    let slot = arena.allocate(GOT_SLOT_LEN)?;
                    unsafe {
                        (slot as *mut u64).write_unaligned(s as u64);
                        patch32(site, pc_delta(slot, site, a));
                    }
                }
            }
        }
    }
    Ok(())
}

/// `S` per the symbol-type table. Undefined references go to the host
/// resolver; anything but SECTION / FUNC / OBJECT / NOTYPE is rejected.
fn resolve_referent(
    sym: &SymbolRec,
    addrs: &[Option<usize>],
    resolver: &dyn Fn(&str) -> Option<usize>,
) -> Result<usize, LoadError> {
    match sym.sym_type() {
        elf::STT_SECTION => section_base(addrs, sym.shndx),
        elf::STT_FUNC | elf::STT_OBJECT => {
            if sym.is_undefined() {
                resolve_host(sym, resolver)
            } else {
                // Rewritten to the absolute address by the index build.
                Ok(sym.value)
            }
        }
        elf::STT_NOTYPE => {
            if sym.is_undefined() {
                resolve_host(sym, resolver)
            } else {
                section_base(addrs, sym.shndx)
            }
        }
        other => Err(LoadError::UnsupportedSymbolType(other)),
    }
}

fn section_base(addrs: &[Option<usize>], shndx: u16) -> Result<usize, LoadError> {
    addrs
        .get(shndx as usize)
        .copied()
        .flatten()
        .ok_or(LoadError::Truncated("relocation against unplaced section"))
}

fn resolve_host(
    sym: &SymbolRec,
    resolver: &dyn Fn(&str) -> Option<usize>,
) -> Result<usize, LoadError> {
    resolver(&sym.name).ok_or_else(|| LoadError::UnresolvedSymbol(sym.name.clone()))
}

#[inline]
fn pc_delta(s: usize, site: usize, addend: i64) -> i64 {
    (s as i64).wrapping_sub(site as i64).wrapping_add(addend)
}

/// `*u32 at site += delta` (two's-complement truncation).
unsafe fn patch32(site: usize, delta: i64) {
    let p = site as *mut u32;
    p.write_unaligned(p.read_unaligned().wrapping_add(delta as u32));
}

/// `*u64 at site += delta`.
unsafe fn patch64(site: usize, delta: i64) {
    let p = site as *mut u64;
    p.write_unaligned(p.read_unaligned().wrapping_add(delta as u64));
}

/// Synthesize a far-jump trampoline in the arena: a 6-byte indirect jump
/// through the 8-byte absolute destination stored right behind it.
fn emit_trampoline(arena: &mut Arena, dest: usize) -> Result<usize, LoadError> {
    let addr = arena.allocate(TRAMPOLINE_LEN)?;
    let p = addr as *mut u8;
    // SAFETY: the arena just handed out TRAMPOLINE_LEN writable bytes.
    unsafe {
        p.write(0xff);
        p.add(1).write(0x25);
        (p.add(2) as *mut u32).write_unaligned(0);
        (p.add(6) as *mut u64).write_unaligned(dest as u64);
    }
    Ok(addr)
}
