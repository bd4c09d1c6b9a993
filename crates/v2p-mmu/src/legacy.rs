//! 32-bit paging.
//!
//! ```text
//! CR3 -> PDE -> PTE -> 4KB page
//! CR3 -> PDE -> 4MB page          (CR4.PSE = 1 and PDE.PS = 1)
//! ```

use crate::bits::{bit, field, mask};
use crate::memory::{read_u32, PhysicalMemory};
use crate::{PageFault, PageSize, TranslateError, Translation, TranslationConfig};

const PRESENT: u8 = 0;
const WRITABLE: u8 = 1;
const USER: u8 = 2;
const PDE_PAGE_SIZE: u8 = 7;
const PTE_PAT: u8 = 7;
const PDE_4MB_PAT: u8 = 12;

pub(crate) fn walk(
    mem: &mut impl PhysicalMemory,
    vaddr: u32,
    cfg: &TranslationConfig,
) -> Result<Translation, TranslateError> {
    let va = u64::from(vaddr);

    // Bits 31:12 come from CR3, bits 11:2 are linear address bits 31:22.
    let pde_addr = field(u64::from(cfg.root_address), 31, 12) | (field(va, 31, 22) >> 20);
    let pde = u64::from(read_u32(mem, pde_addr)?);
    tracing::trace!(level = "pde", addr = pde_addr, entry = pde);

    if !bit(pde, PRESENT) {
        return Err(PageFault::not_present(vaddr, pde).into());
    }
    if pde & pde_reserved_mask(pde, cfg) != 0 {
        return Err(PageFault::reserved(vaddr, pde).into());
    }

    if cfg.pse && bit(pde, PDE_PAGE_SIZE) {
        // PDE bits 20:13 supply physical bits 39:32 (PSE-36), bits 31:22 come straight across.
        let paddr = (field(pde, 20, 13) << 19) | field(pde, 31, 22) | field(va, 21, 0);
        return Ok(Translation {
            paddr,
            page_size: PageSize::Size4M,
            user: bit(pde, USER),
            writable: bit(pde, WRITABLE),
            nx: false,
            leaf_entry: pde,
        });
    }

    // Bits 31:12 come from the PDE, bits 11:2 are linear address bits 21:12.
    let pte_addr = field(pde, 31, 12) | (field(va, 21, 12) >> 10);
    let pte = u64::from(read_u32(mem, pte_addr)?);
    tracing::trace!(level = "pte", addr = pte_addr, entry = pte);

    if !bit(pte, PRESENT) {
        return Err(PageFault::not_present(vaddr, pte).into());
    }
    if !cfg.pat && bit(pte, PTE_PAT) {
        return Err(PageFault::reserved(vaddr, pte).into());
    }

    Ok(Translation {
        paddr: field(pte, 31, 12) | field(va, 11, 0),
        page_size: PageSize::Size4K,
        user: bit(pde, USER) && bit(pte, USER),
        writable: bit(pde, WRITABLE) && bit(pte, WRITABLE),
        nx: false,
        leaf_entry: pte,
    })
}

/// Reserved bits of a present PDE.
///
/// With CR4.PSE set the 21:13 range (or the PSE-36 remainder) is reserved in every PDE, and bit
/// 12 as well when the entry maps a 4MB page without PAT. `large_pde_reserved_only` limits the
/// range to 4MB entries, leaving bits 21:12 of a table pointer as address bits.
fn pde_reserved_mask(pde: u64, cfg: &TranslationConfig) -> u64 {
    if !cfg.pse {
        return 0;
    }
    let large = bit(pde, PDE_PAGE_SIZE);
    if cfg.large_pde_reserved_only && !large {
        return 0;
    }

    let mut reserved = if cfg.pse36 {
        // Bits 21:(M-19) with M = min(40, MAXPHYADDR). Below 32 bits of physical address
        // nothing above bit 31 is reachable, so the whole 21:13 range is reserved.
        let m = cfg.max_phys_bits().clamp(32, 40);
        mask(21, m - 19)
    } else {
        mask(21, 13)
    };
    if large && !cfg.pat {
        reserved |= mask(PDE_4MB_PAT, PDE_4MB_PAT);
    }
    reserved
}
