/// Paging mode selected by CR0.PG, CR4.PAE and EFER.LME.
///
/// Only [`PagingMode::Legacy`] and [`PagingMode::Pae`] are walked; the others are rejected by
/// the translator with [`crate::TranslateError::InvalidMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PagingMode {
    Disabled,
    /// 32-bit paging: PDE -> PTE, 4KB and 4MB pages.
    Legacy,
    /// PAE paging: PDPTE -> PDE -> PTE, 4KB and 2MB pages.
    Pae,
    /// 4-level long mode paging.
    Long,
}

impl PagingMode {
    /// Maps a translation level count (2 = legacy, 3 = PAE).
    pub fn from_levels(levels: u8) -> Option<Self> {
        match levels {
            2 => Some(PagingMode::Legacy),
            3 => Some(PagingMode::Pae),
            _ => None,
        }
    }

    pub fn levels(self) -> Option<u8> {
        match self {
            PagingMode::Legacy => Some(2),
            PagingMode::Pae => Some(3),
            PagingMode::Disabled | PagingMode::Long => None,
        }
    }
}

/// Type of memory access being translated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    #[default]
    Read,
    Write,
    Execute,
}

pub const MIN_PHYS_BITS: u8 = 4;
pub const MAX_PHYS_BITS: u8 = 52;

/// Everything a single translation depends on.
///
/// Feature flags mirror the control-register and CPUID bits that change how entries are
/// interpreted; nothing is read from the host CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationConfig {
    pub mode: PagingMode,
    /// CR3.
    pub root_address: u32,

    /// CR4.PSE: 4MB pages in legacy mode.
    pub pse: bool,
    /// CPUID PSE-36: 4MB pages may map above 4GB.
    pub pse36: bool,
    /// CPUID PAT.
    pub pat: bool,
    /// EFER.NXE.
    pub nxe: bool,
    /// CR4.SMAP.
    pub smap: bool,
    /// RFLAGS.AC; overrides SMAP for explicit supervisor accesses.
    pub ac: bool,
    /// CR4.SMEP. Only consulted for [`AccessKind::Execute`].
    pub smep: bool,
    /// CR0.WP. Only consulted for [`AccessKind::Write`].
    pub wp: bool,

    /// CPL < 3.
    pub supervisor: bool,
    pub access: AccessKind,

    /// Locate PAE PDPTEs relative to CR3 instead of at the raw selector address.
    pub pdpt_uses_root: bool,
    /// Apply the legacy PSE reserved range only to PDEs that map a 4MB page.
    pub large_pde_reserved_only: bool,

    max_phys_bits: u8,
}

impl TranslationConfig {
    /// Supervisor-mode read with no optional paging features and MAXPHYADDR = 52.
    pub fn new(mode: PagingMode, root_address: u32) -> Self {
        Self {
            mode,
            root_address,
            pse: false,
            pse36: false,
            pat: false,
            nxe: false,
            smap: false,
            ac: false,
            smep: false,
            wp: false,
            supervisor: true,
            access: AccessKind::Read,
            pdpt_uses_root: false,
            large_pde_reserved_only: false,
            max_phys_bits: MAX_PHYS_BITS,
        }
    }

    #[inline]
    pub fn max_phys_bits(&self) -> u8 {
        self.max_phys_bits
    }

    #[track_caller]
    pub fn set_max_phys_bits(&mut self, bits: u8) {
        assert!(
            (MIN_PHYS_BITS..=MAX_PHYS_BITS).contains(&bits),
            "max_phys_bits must be {MIN_PHYS_BITS}..={MAX_PHYS_BITS} (got {bits})"
        );
        self.max_phys_bits = bits;
    }

    #[track_caller]
    pub fn with_max_phys_bits(mut self, bits: u8) -> Self {
        self.set_max_phys_bits(bits);
        self
    }

    pub fn with_pse(mut self, enabled: bool) -> Self {
        self.pse = enabled;
        self
    }

    pub fn with_pse36(mut self, supported: bool) -> Self {
        self.pse36 = supported;
        self
    }

    pub fn with_pat(mut self, supported: bool) -> Self {
        self.pat = supported;
        self
    }

    pub fn with_nxe(mut self, enabled: bool) -> Self {
        self.nxe = enabled;
        self
    }

    /// Sets CR4.SMAP and RFLAGS.AC together.
    pub fn with_smap(mut self, enabled: bool, ac: bool) -> Self {
        self.smap = enabled;
        self.ac = ac;
        self
    }

    pub fn with_smep(mut self, enabled: bool) -> Self {
        self.smep = enabled;
        self
    }

    pub fn with_wp(mut self, enabled: bool) -> Self {
        self.wp = enabled;
        self
    }

    pub fn with_supervisor(mut self, supervisor: bool) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_access(mut self, access: AccessKind) -> Self {
        self.access = access;
        self
    }

    pub fn with_pdpt_uses_root(mut self, enabled: bool) -> Self {
        self.pdpt_uses_root = enabled;
        self
    }

    pub fn with_large_pde_reserved_only(mut self, enabled: bool) -> Self {
        self.large_pde_reserved_only = enabled;
        self
    }
}

const CR0_WP: u64 = 1 << 16;
const CR0_PG: u64 = 1 << 31;

const CR4_PSE: u64 = 1 << 4;
const CR4_PAE: u64 = 1 << 5;
const CR4_SMEP: u64 = 1 << 20;
const CR4_SMAP: u64 = 1 << 21;

const EFER_LME: u64 = 1 << 8;
const EFER_NXE: u64 = 1 << 11;

const RFLAGS_AC: u64 = 1 << 18;

/// Architectural register state captured alongside a memory image.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlRegisters {
    pub cr0: u64,
    /// Legacy and PAE paging only take a 32-bit root.
    pub cr3: u32,
    pub cr4: u64,
    pub efer: u64,
    pub rflags: u64,
    pub cpl: u8,
}

impl ControlRegisters {
    pub fn paging_mode(&self) -> PagingMode {
        if self.cr0 & CR0_PG == 0 {
            PagingMode::Disabled
        } else if self.cr4 & CR4_PAE == 0 {
            PagingMode::Legacy
        } else if self.efer & EFER_LME != 0 {
            PagingMode::Long
        } else {
            PagingMode::Pae
        }
    }

    /// Builds a config from the register bits. PAT and PSE-36 are CPUID capabilities and stay
    /// off; set them on the result when the captured CPU supports them.
    pub fn to_config(&self) -> TranslationConfig {
        let mut cfg = TranslationConfig::new(self.paging_mode(), self.cr3);
        cfg.pse = self.cr4 & CR4_PSE != 0;
        cfg.smep = self.cr4 & CR4_SMEP != 0;
        cfg.smap = self.cr4 & CR4_SMAP != 0;
        cfg.wp = self.cr0 & CR0_WP != 0;
        cfg.nxe = self.efer & EFER_NXE != 0;
        cfg.ac = self.rflags & RFLAGS_AC != 0;
        cfg.supervisor = self.cpl < 3;
        cfg
    }
}

impl From<ControlRegisters> for TranslationConfig {
    fn from(regs: ControlRegisters) -> Self {
        regs.to_config()
    }
}
