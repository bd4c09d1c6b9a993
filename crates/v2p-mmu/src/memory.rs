use std::io::{self, Read, Seek, SeekFrom};

use crate::TranslateError;

/// Physical memory access used for page-table walking.
///
/// This is intentionally minimal: the walker only ever reads whole paging-structure entries
/// (4 bytes in legacy mode, 8 bytes in PAE mode).
pub trait PhysicalMemory {
    /// Reads `dst.len()` bytes starting at `paddr`.
    ///
    /// Returns the number of bytes read. `0` means the read failed (unmapped, past the end of
    /// the image, I/O error); the walk then stops with [`TranslateError::ReadFault`].
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize;
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for &mut T {
    #[inline]
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize {
        <T as PhysicalMemory>::read_physical(&mut **self, paddr, dst)
    }
}

impl<T: PhysicalMemory + ?Sized> PhysicalMemory for Box<T> {
    #[inline]
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize {
        <T as PhysicalMemory>::read_physical(&mut **self, paddr, dst)
    }
}

/// A flat image whose first byte is physical address 0.
///
/// Reads that do not fit entirely inside the image fail.
impl PhysicalMemory for &[u8] {
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize {
        let Ok(start) = usize::try_from(paddr) else {
            return 0;
        };
        let Some(src) = start
            .checked_add(dst.len())
            .and_then(|end| self.get(start..end))
        else {
            return 0;
        };
        dst.copy_from_slice(src);
        dst.len()
    }
}

impl PhysicalMemory for Vec<u8> {
    #[inline]
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize {
        self.as_slice().read_physical(paddr, dst)
    }
}

/// Adapts a closure `(paddr, dst) -> bytes_read` into a [`PhysicalMemory`].
pub struct ReadFn<F>(pub F);

impl<F> PhysicalMemory for ReadFn<F>
where
    F: FnMut(u64, &mut [u8]) -> usize,
{
    #[inline]
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize {
        (self.0)(paddr, dst)
    }
}

/// File-backed (or any seekable) raw memory image.
///
/// Short reads at the end of a truncated image count as failures.
#[derive(Debug)]
pub struct ImageReader<R> {
    inner: R,
}

impl<R: Read + Seek> ImageReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_exact_at(&mut self, paddr: u64, dst: &mut [u8]) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(paddr))?;
        self.inner.read_exact(dst)
    }
}

impl<R: Read + Seek> PhysicalMemory for ImageReader<R> {
    fn read_physical(&mut self, paddr: u64, dst: &mut [u8]) -> usize {
        match self.read_exact_at(paddr, dst) {
            Ok(()) => dst.len(),
            Err(err) => {
                tracing::trace!(paddr, len = dst.len(), "image read failed: {err}");
                0
            }
        }
    }
}

pub(crate) fn read_u32(mem: &mut impl PhysicalMemory, paddr: u64) -> Result<u32, TranslateError> {
    let mut buf = [0u8; 4];
    if mem.read_physical(paddr, &mut buf) == 0 {
        return Err(TranslateError::ReadFault {
            paddr,
            size: buf.len(),
        });
    }
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(mem: &mut impl PhysicalMemory, paddr: u64) -> Result<u64, TranslateError> {
    let mut buf = [0u8; 8];
    if mem.read_physical(paddr, &mut buf) == 0 {
        return Err(TranslateError::ReadFault {
            paddr,
            size: buf.len(),
        });
    }
    Ok(u64::from_le_bytes(buf))
}
