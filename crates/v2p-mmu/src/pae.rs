//! PAE paging.
//!
//! ```text
//! PDPTE -> PDE -> PTE -> 4KB page
//! PDPTE -> PDE -> 2MB page          (PDE.PS = 1)
//! ```

use crate::bits::{bit, field, mask};
use crate::memory::{read_u64, PhysicalMemory};
use crate::{PageFault, PageSize, TranslateError, Translation, TranslationConfig};

const PRESENT: u8 = 0;
const WRITABLE: u8 = 1;
const USER: u8 = 2;
const PDE_PAGE_SIZE: u8 = 7;
const PTE_PAT: u8 = 7;
const PDE_2MB_PAT: u8 = 12;
const EXECUTE_DISABLE: u8 = 63;

pub(crate) fn walk(
    mem: &mut impl PhysicalMemory,
    vaddr: u32,
    cfg: &TranslationConfig,
) -> Result<Translation, TranslateError> {
    let va = u64::from(vaddr);

    let pdpte_addr = pdpte_addr(va, cfg);
    let pdpte = read_u64(mem, pdpte_addr)?;
    tracing::trace!(level = "pdpte", addr = pdpte_addr, entry = pdpte);

    // PDPTEs are loaded into registers by the CPU; beyond P nothing in them is checked here.
    if !bit(pdpte, PRESENT) {
        return Err(PageFault::not_present(vaddr, pdpte).into());
    }

    // Bits 51:12 come from the PDPTE, bits 11:3 are linear address bits 29:21.
    let pde_addr = field(pdpte, 51, 12) | (field(va, 29, 21) >> 18);
    let pde = read_u64(mem, pde_addr)?;
    tracing::trace!(level = "pde", addr = pde_addr, entry = pde);

    if !bit(pde, PRESENT) {
        return Err(PageFault::not_present(vaddr, pde).into());
    }
    if pde & pde_reserved_mask(pde, cfg) != 0 {
        return Err(PageFault::reserved(vaddr, pde).into());
    }

    let pde_nx = cfg.nxe && bit(pde, EXECUTE_DISABLE);

    if bit(pde, PDE_PAGE_SIZE) {
        return Ok(Translation {
            paddr: field(pde, 51, 21) | field(va, 20, 0),
            page_size: PageSize::Size2M,
            user: bit(pde, USER),
            writable: bit(pde, WRITABLE),
            nx: pde_nx,
            leaf_entry: pde,
        });
    }

    // Bits 51:12 come from the PDE, bits 11:3 are linear address bits 20:12.
    let pte_addr = field(pde, 51, 12) | (field(va, 20, 12) >> 9);
    let pte = read_u64(mem, pte_addr)?;
    tracing::trace!(level = "pte", addr = pte_addr, entry = pte);

    if !bit(pte, PRESENT) {
        return Err(PageFault::not_present(vaddr, pte).into());
    }
    if pte & pte_reserved_mask(cfg) != 0 {
        return Err(PageFault::reserved(vaddr, pte).into());
    }

    Ok(Translation {
        paddr: field(pte, 51, 12) | field(va, 11, 0),
        page_size: PageSize::Size4K,
        user: bit(pde, USER) && bit(pte, USER),
        writable: bit(pde, WRITABLE) && bit(pte, WRITABLE),
        nx: pde_nx || (cfg.nxe && bit(pte, EXECUTE_DISABLE)),
        leaf_entry: pte,
    })
}

/// Physical address of the PDPTE selected by linear address bits 31:30.
///
/// By default the selector bits are used as the address as-is and CR3 is ignored. On real
/// hardware the PDPT lives at CR3 bits 31:5 and the selector indexes 8-byte entries;
/// `pdpt_uses_root` switches to that layout.
fn pdpte_addr(va: u64, cfg: &TranslationConfig) -> u64 {
    if cfg.pdpt_uses_root {
        field(u64::from(cfg.root_address), 31, 5) | (field(va, 31, 30) >> 27)
    } else {
        field(va, 31, 30)
    }
}

fn pde_reserved_mask(pde: u64, cfg: &TranslationConfig) -> u64 {
    let mut reserved = common_reserved_mask(cfg);
    if bit(pde, PDE_PAGE_SIZE) {
        reserved |= mask(20, 13);
        if !cfg.pat {
            reserved |= mask(PDE_2MB_PAT, PDE_2MB_PAT);
        }
    }
    reserved
}

fn pte_reserved_mask(cfg: &TranslationConfig) -> u64 {
    let mut reserved = common_reserved_mask(cfg);
    if !cfg.pat {
        reserved |= mask(PTE_PAT, PTE_PAT);
    }
    reserved
}

/// Bits 62:MAXPHYADDR, plus XD when EFER.NXE is clear.
fn common_reserved_mask(cfg: &TranslationConfig) -> u64 {
    let mut reserved = mask(62, cfg.max_phys_bits());
    if !cfg.nxe {
        reserved |= mask(EXECUTE_DISABLE, EXECUTE_DISABLE);
    }
    reserved
}
