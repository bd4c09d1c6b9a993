use bitflags::bitflags;
use thiserror::Error;

use crate::PagingMode;

bitflags! {
    /// Page-fault detail bits, laid out like the x86 #PF error code.
    ///
    /// Only the reserved-bit flag is ever produced. A not-present fault and an access-policy
    /// rejection both carry the empty set.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct PageFaultCode: u32 {
        /// A paging-structure entry had a reserved bit set.
        const RESERVED_BIT = 1 << 3;
    }
}

impl PageFaultCode {
    /// The entry's present bit was clear.
    pub const NOT_PRESENT: Self = Self::empty();

    #[inline]
    pub fn is_reserved_bit_violation(self) -> bool {
        self.contains(Self::RESERVED_BIT)
    }
}

/// #PF details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFault {
    /// Faulting virtual address (what the CPU would load into CR2).
    pub addr: u32,
    pub code: PageFaultCode,
    /// Raw value of the entry that stopped the walk.
    pub entry: u64,
}

impl PageFault {
    #[inline]
    pub(crate) fn new(addr: u32, code: PageFaultCode, entry: u64) -> Self {
        Self { addr, code, entry }
    }

    #[inline]
    pub(crate) fn not_present(addr: u32, entry: u64) -> Self {
        Self::new(addr, PageFaultCode::NOT_PRESENT, entry)
    }

    #[inline]
    pub(crate) fn reserved(addr: u32, entry: u64) -> Self {
        Self::new(addr, PageFaultCode::RESERVED_BIT, entry)
    }
}

/// A translation failure. Every variant is terminal for the call that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("page fault at {:#010x} (detail={:#x}, entry={:#x})", .0.addr, .0.code.bits(), .0.entry)]
    PageFault(PageFault),

    #[error("failed to read {size} bytes of physical memory at {paddr:#x}")]
    ReadFault { paddr: u64, size: usize },

    #[error("unsupported paging mode {0:?}")]
    InvalidMode(PagingMode),
}

impl TranslateError {
    pub const PAGE_FAULT: i32 = -1;
    pub const READ_FAULT: i32 = -2;
    pub const INVALID_MODE: i32 = -3;

    /// Numeric status as exposed to non-Rust callers (`0` is reserved for success).
    pub fn code(&self) -> i32 {
        match self {
            TranslateError::PageFault(_) => Self::PAGE_FAULT,
            TranslateError::ReadFault { .. } => Self::READ_FAULT,
            TranslateError::InvalidMode(_) => Self::INVALID_MODE,
        }
    }

    /// Fault detail bits; empty for anything other than a page fault.
    pub fn fault_detail(&self) -> PageFaultCode {
        match self {
            TranslateError::PageFault(pf) => pf.code,
            _ => PageFaultCode::empty(),
        }
    }
}

impl From<PageFault> for TranslateError {
    fn from(pf: PageFault) -> Self {
        TranslateError::PageFault(pf)
    }
}

/// Result of one translation, flattened the way C-style callers consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslationOutcome {
    /// Only meaningful when `error` is `None`; zero otherwise.
    pub physical_address: u64,
    pub error: Option<TranslateError>,
    /// Only meaningful when `error` is a page fault.
    pub fault_detail: PageFaultCode,
}

impl TranslationOutcome {
    pub const SUCCESS: i32 = 0;

    #[inline]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// `0` on success, otherwise [`TranslateError::code`].
    pub fn status(&self) -> i32 {
        self.error.map_or(Self::SUCCESS, |err| err.code())
    }

    pub fn into_result(self) -> Result<u64, TranslateError> {
        match self.error {
            None => Ok(self.physical_address),
            Some(err) => Err(err),
        }
    }
}

impl From<Result<u64, TranslateError>> for TranslationOutcome {
    fn from(res: Result<u64, TranslateError>) -> Self {
        match res {
            Ok(paddr) => Self {
                physical_address: paddr,
                error: None,
                fault_detail: PageFaultCode::empty(),
            },
            Err(err) => Self {
                physical_address: 0,
                error: Some(err),
                fault_detail: err.fault_detail(),
            },
        }
    }
}
