use crate::{AccessKind, PageFault, TranslationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageSize {
    Size4K,
    Size2M,
    Size4M,
}

impl PageSize {
    #[inline]
    pub const fn bytes(self) -> u64 {
        match self {
            PageSize::Size4K => 4 * 1024,
            PageSize::Size2M => 2 * 1024 * 1024,
            PageSize::Size4M => 4 * 1024 * 1024,
        }
    }
}

/// A completed walk: where the address landed and the effective permissions of the path that
/// led there (U/S and R/W are ANDed across levels, XD is ORed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub paddr: u64,
    pub page_size: PageSize,
    pub user: bool,
    pub writable: bool,
    pub nx: bool,
    /// Raw value of the leaf entry (PTE, or the PDE for a large page).
    pub leaf_entry: u64,
}

/// Applies the privilege policy to a successful walk.
///
/// Rejections report an empty fault detail: the detail bits only distinguish not-present from
/// reserved-bit faults.
pub(crate) fn check(
    walk: &Translation,
    vaddr: u32,
    cfg: &TranslationConfig,
) -> Result<(), PageFault> {
    if denied(walk, cfg) {
        tracing::debug!(
            vaddr,
            supervisor = cfg.supervisor,
            user_page = walk.user,
            access = ?cfg.access,
            "access rejected"
        );
        return Err(PageFault::not_present(vaddr, walk.leaf_entry));
    }
    Ok(())
}

fn denied(walk: &Translation, cfg: &TranslationConfig) -> bool {
    if cfg.access == AccessKind::Execute && walk.nx {
        return true;
    }

    if !cfg.supervisor {
        return !walk.user || (cfg.access == AccessKind::Write && !walk.writable);
    }

    match cfg.access {
        AccessKind::Execute => walk.user && cfg.smep,
        AccessKind::Read => smap_blocks(walk, cfg),
        AccessKind::Write => smap_blocks(walk, cfg) || (!walk.writable && cfg.wp),
    }
}

/// SMAP: supervisor data accesses to user pages fault unless RFLAGS.AC is set.
#[inline]
fn smap_blocks(walk: &Translation, cfg: &TranslationConfig) -> bool {
    walk.user && cfg.smap && !cfg.ac
}
