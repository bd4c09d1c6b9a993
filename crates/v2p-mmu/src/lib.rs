//! Software x86 page walker: virtual → physical translation against a raw memory image.
//!
//! Intended for tools that hold a snapshot of physical memory (forensics, VM introspection,
//! debuggers) and need to resolve guest virtual addresses without the guest's MMU. Supported
//! paging modes:
//! - 32-bit paging (4KB / 4MB pages, PSE-36)
//! - PAE paging (4KB / 2MB pages)
//!
//! Nothing is cached: every call walks the tables again through the caller's
//! [`PhysicalMemory`] and keeps no state once it returns.
//!
//! ```
//! use v2p_mmu::{translate, PagingMode, TranslationConfig};
//!
//! // Page directory at 0x1000 maps the first 4MB page (PDE[0] = P | PS).
//! let mut image = vec![0u8; 0x2000];
//! image[0x1000..0x1004].copy_from_slice(&0x81u32.to_le_bytes());
//!
//! let cfg = TranslationConfig::new(PagingMode::Legacy, 0x1000).with_pse(true);
//! let outcome = translate(0x0012_3456, &cfg, &mut image);
//! assert_eq!(outcome.status(), 0);
//! assert_eq!(outcome.physical_address, 0x0012_3456);
//! ```

mod access;
pub mod bits;
mod config;
mod error;
mod legacy;
mod memory;
mod pae;

pub use access::{PageSize, Translation};
pub use config::{
    AccessKind, ControlRegisters, PagingMode, TranslationConfig, MAX_PHYS_BITS, MIN_PHYS_BITS,
};
pub use error::{PageFault, PageFaultCode, TranslateError, TranslationOutcome};
pub use memory::{ImageReader, PhysicalMemory, ReadFn};

/// Translates `vaddr` under `config`, flattening the result into a [`TranslationOutcome`].
pub fn translate(
    vaddr: u32,
    config: &TranslationConfig,
    mem: &mut impl PhysicalMemory,
) -> TranslationOutcome {
    Translator::new(*config).translate(mem, vaddr).into()
}

/// Page walker bound to one paging configuration.
///
/// Holds no per-walk state, so a single translator can serve any number of calls (and threads,
/// given a reader per thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translator {
    config: TranslationConfig,
}

impl Translator {
    pub fn new(config: TranslationConfig) -> Self {
        Self { config }
    }

    #[inline]
    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// Translate a virtual address to a physical address.
    pub fn translate(
        &self,
        mem: &mut impl PhysicalMemory,
        vaddr: u32,
    ) -> Result<u64, TranslateError> {
        self.translate_detailed(mem, vaddr).map(|t| t.paddr)
    }

    /// Like [`Translator::translate`], but also reports the page size and the effective
    /// permissions of the mapping.
    pub fn translate_detailed(
        &self,
        mem: &mut impl PhysicalMemory,
        vaddr: u32,
    ) -> Result<Translation, TranslateError> {
        let cfg = &self.config;
        let walk_res = match cfg.mode {
            PagingMode::Legacy => legacy::walk(mem, vaddr, cfg),
            PagingMode::Pae => pae::walk(mem, vaddr, cfg),
            mode @ (PagingMode::Disabled | PagingMode::Long) => {
                return Err(TranslateError::InvalidMode(mode));
            }
        };

        let walk = walk_res.map_err(|err| {
            tracing::debug!(vaddr, mode = ?cfg.mode, "translation failed: {err}");
            err
        })?;
        access::check(&walk, vaddr, cfg)?;

        tracing::trace!(vaddr, paddr = walk.paddr, page_size = ?walk.page_size, "translated");
        Ok(walk)
    }
}


#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
