//! # Cache maintenance
//!
//! The remote processor might write the shared region through a path which is not coherent with
//! the host data cache. The reader therefore invalidates every byte range right before it
//! interprets it and flushes every byte range right after it wrote it. The operations are
//! injected through the [CacheMaintenance] trait so the reader itself stays platform-agnostic.
//!
//! Use [Coherent] on platforms where the shared memory is mapped uncached or is coherent anyway.
//! Cache controllers which only operate on whole lines can be wrapped in [LineAligned].

pub const CACHE_LINE_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("alignment error, addresses and lengths must be aligned to the cache line length")]
pub struct AlignmentError;

/// Cache maintenance capability required by the reader and writer.
///
/// `addr` is the absolute address of the first byte of the range, `len` its length in bytes.
/// The ranges passed are exact, implementations have to round them to cache line boundaries if
/// the hardware requires it.
pub trait CacheMaintenance {
    /// Called right before the bytes in the range are read.
    fn sync_before_read(&mut self, addr: usize, len: usize);

    /// Called right after the bytes in the range were written.
    fn sync_after_write(&mut self, addr: usize, len: usize);
}

impl<C: CacheMaintenance + ?Sized> CacheMaintenance for &mut C {
    #[inline]
    fn sync_before_read(&mut self, addr: usize, len: usize) {
        (**self).sync_before_read(addr, len)
    }

    #[inline]
    fn sync_after_write(&mut self, addr: usize, len: usize) {
        (**self).sync_after_write(addr, len)
    }
}

/// No-op implementation for coherent or uncached mappings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Coherent;

impl CacheMaintenance for Coherent {
    #[inline]
    fn sync_before_read(&mut self, _addr: usize, _len: usize) {}

    #[inline]
    fn sync_after_write(&mut self, _addr: usize, _len: usize) {}
}

/// Line-granular cache operations, as provided by most data cache controllers.
///
/// Both functions must reject ranges which are not aligned to the line size with
/// [AlignmentError].
pub trait LineCacheOps {
    fn invalidate_range(&mut self, addr: usize, len: usize) -> Result<(), AlignmentError>;

    /// Clean and then invalidate the range. This is commonly called flushing.
    fn clean_and_invalidate_range(&mut self, addr: usize, len: usize)
    -> Result<(), AlignmentError>;
}

/// Round a range outwards so it starts and ends on a `line` boundary.
///
/// `line` must be a power of two.
pub const fn align_range(addr: usize, len: usize, line: usize) -> (usize, usize) {
    let start = addr & !(line - 1);
    let end = (addr + len + line - 1) & !(line - 1);
    (start, end - start)
}

/// Check that a range starts and ends on a `line` boundary.
#[inline]
pub const fn check_alignment(addr: usize, len: usize, line: usize) -> Result<(), AlignmentError> {
    if !addr.is_multiple_of(line) || !len.is_multiple_of(line) {
        return Err(AlignmentError);
    }
    Ok(())
}

/// Adapter which implements the exact-range [CacheMaintenance] contract on top of
/// [LineCacheOps] by rounding every range to whole lines.
///
/// Rounding means that neighbouring bytes are invalidated as well. The shared region base should
/// therefore be aligned to the line size, which keeps the reader descriptor in lines of its own.
#[derive(Debug)]
pub struct LineAligned<C, const LINE: usize = CACHE_LINE_SIZE>(pub C);

impl<C, const LINE: usize> LineAligned<C, LINE> {
    #[inline]
    pub const fn new(ops: C) -> Self {
        Self(ops)
    }

    #[inline]
    pub fn release(self) -> C {
        self.0
    }
}

impl<C: LineCacheOps, const LINE: usize> CacheMaintenance for LineAligned<C, LINE> {
    fn sync_before_read(&mut self, addr: usize, len: usize) {
        if len == 0 {
            return;
        }
        let (addr, len) = align_range(addr, len, LINE);
        if let Err(e) = self.0.invalidate_range(addr, len) {
            log::error!("cache invalidate of {addr:#x}..+{len:#x} failed: {e}");
        }
    }

    fn sync_after_write(&mut self, addr: usize, len: usize) {
        if len == 0 {
            return;
        }
        let (addr, len) = align_range(addr, len, LINE);
        if let Err(e) = self.0.clean_and_invalidate_range(addr, len) {
            log::error!("cache flush of {addr:#x}..+{len:#x} failed: {e}");
        }
    }
}

/// L1 data cache maintenance for ARMv7-A cores.
#[cfg(target_arch = "arm")]
pub mod armv7 {
    use aarch32_cpu::{
        asm::dsb,
        cache::{clean_and_invalidate_data_cache_line_to_poc, invalidate_data_cache_line_to_poc},
    };

    use super::{AlignmentError, CACHE_LINE_SIZE, LineCacheOps, check_alignment};

    /// Data cache maintenance by MVA to the point of coherency.
    ///
    /// This only covers the inner cache. Systems with an outer cache controller in front of the
    /// shared memory need to maintain that one as well.
    #[derive(Debug, Default)]
    pub struct DataCache;

    impl LineCacheOps for DataCache {
        fn invalidate_range(&mut self, addr: usize, len: usize) -> Result<(), AlignmentError> {
            check_alignment(addr, len, CACHE_LINE_SIZE)?;
            let end_addr = addr.saturating_add(len) as u32;
            let mut current_addr = addr as u32;
            dsb();
            while current_addr < end_addr {
                invalidate_data_cache_line_to_poc(current_addr);
                current_addr = current_addr.saturating_add(CACHE_LINE_SIZE as u32);
            }
            dsb();
            Ok(())
        }

        fn clean_and_invalidate_range(
            &mut self,
            addr: usize,
            len: usize,
        ) -> Result<(), AlignmentError> {
            check_alignment(addr, len, CACHE_LINE_SIZE)?;
            let end_addr = addr.saturating_add(len) as u32;
            let mut current_addr = addr as u32;
            dsb();
            while current_addr < end_addr {
                clean_and_invalidate_data_cache_line_to_poc(current_addr);
                current_addr = current_addr.saturating_add(CACHE_LINE_SIZE as u32);
            }
            dsb();
            Ok(())
        }
    }
}
