//! Typed view over the memory region shared with the remote processor.
use crate::{
    Error,
    cache::CacheMaintenance,
    layout::{
        DESCRIPTOR_PAYLOAD_SIZE, Descriptor, HEADER_SIZE, READER_OFFSET, RING_OFFSET,
        WRITER_OFFSET,
    },
};

/// Borrowed view of a shared region.
///
/// The driver which maps the region owns the mapping. This structure only borrows it for as long
/// as a reader or writer is working on it. Every access goes through explicit byte copies with
/// the matching cache maintenance call, see [CacheMaintenance].
pub struct ShareRegion<'a> {
    bytes: &'a mut [u8],
}

impl core::fmt::Debug for ShareRegion<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShareRegion")
            .field("base", &self.bytes.as_ptr())
            .field("len", &self.bytes.len())
            .field("ring_size", &self.ring_size())
            .finish()
    }
}

impl<'a> ShareRegion<'a> {
    /// Create a view over a region. The region must be larger than the [HEADER_SIZE].
    pub fn new(bytes: &'a mut [u8]) -> Result<Self, Error> {
        if bytes.len() <= HEADER_SIZE {
            return Err(Error::RegionTooSmall { len: bytes.len() });
        }
        Ok(Self { bytes })
    }

    /// Create a view over a raw memory mapping.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for the lifetime `'a`, and the
    /// host must not access the mapping through any other path during that time. The remote
    /// processor is expected to only ever write the writer descriptor and the log ring.
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Result<Self, Error> {
        Self::new(unsafe { core::slice::from_raw_parts_mut(ptr, len) })
    }

    #[allow(clippy::len_without_is_empty)]
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Size of the log ring, computed from the region length.
    #[inline]
    pub fn ring_size(&self) -> usize {
        self.bytes.len() - HEADER_SIZE
    }

    #[inline]
    pub fn base_addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// Raw access to the whole region, for example to save an image of it.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    #[inline]
    pub fn read_reader_descriptor<C: CacheMaintenance>(&self, cache: &mut C) -> Descriptor {
        self.read_descriptor(READER_OFFSET, cache)
    }

    #[inline]
    pub fn read_writer_descriptor<C: CacheMaintenance>(&self, cache: &mut C) -> Descriptor {
        self.read_descriptor(WRITER_OFFSET, cache)
    }

    #[inline]
    pub fn write_reader_descriptor<C: CacheMaintenance>(
        &mut self,
        desc: &Descriptor,
        cache: &mut C,
    ) {
        self.write_descriptor(READER_OFFSET, desc, cache)
    }

    #[inline]
    pub(crate) fn write_writer_descriptor<C: CacheMaintenance>(
        &mut self,
        desc: &Descriptor,
        cache: &mut C,
    ) {
        self.write_descriptor(WRITER_OFFSET, desc, cache)
    }

    fn read_descriptor<C: CacheMaintenance>(&self, offset: usize, cache: &mut C) -> Descriptor {
        let area = &self.bytes[offset..offset + DESCRIPTOR_PAYLOAD_SIZE];
        cache.sync_before_read(area.as_ptr() as usize, area.len());
        Descriptor::from_bytes(area)
    }

    fn write_descriptor<C: CacheMaintenance>(
        &mut self,
        offset: usize,
        desc: &Descriptor,
        cache: &mut C,
    ) {
        let area = &mut self.bytes[offset..offset + DESCRIPTOR_PAYLOAD_SIZE];
        desc.write_to(area);
        cache.sync_after_write(area.as_ptr() as usize, area.len());
    }

    /// Ring offset of an absolute stream position.
    #[inline]
    pub fn ring_offset(&self, pos: u64) -> usize {
        (pos % self.ring_size() as u64) as usize
    }

    /// Copy `out.len()` bytes starting at the absolute stream position `pos` out of the ring.
    ///
    /// A range crossing the end of the ring is split into two copies. Returns the number of
    /// copied bytes, which is capped at the ring size.
    pub fn copy_from_ring<C: CacheMaintenance>(
        &self,
        pos: u64,
        out: &mut [u8],
        cache: &mut C,
    ) -> usize {
        let ring_size = self.ring_size();
        let len = core::cmp::min(out.len(), ring_size);
        let start = self.ring_offset(pos);
        let first = core::cmp::min(len, ring_size - start);
        let ring = &self.bytes[RING_OFFSET..];

        let chunk = &ring[start..start + first];
        cache.sync_before_read(chunk.as_ptr() as usize, chunk.len());
        out[..first].copy_from_slice(chunk);
        if first < len {
            let chunk = &ring[..len - first];
            cache.sync_before_read(chunk.as_ptr() as usize, chunk.len());
            out[first..len].copy_from_slice(chunk);
        }
        len
    }

    /// Copy `data` into the ring starting at the absolute stream position `pos`.
    ///
    /// Only the producer writes the ring. At most one ring size worth of bytes is written, the
    /// tail of `data` is used if it is longer.
    pub(crate) fn copy_to_ring<C: CacheMaintenance>(
        &mut self,
        pos: u64,
        data: &[u8],
        cache: &mut C,
    ) -> usize {
        let ring_size = self.ring_size();
        let (pos, data) = if data.len() > ring_size {
            let skip = data.len() - ring_size;
            (pos.wrapping_add(skip as u64), &data[skip..])
        } else {
            (pos, data)
        };
        let start = self.ring_offset(pos);
        let first = core::cmp::min(data.len(), ring_size - start);
        let ring = &mut self.bytes[RING_OFFSET..];

        let chunk = &mut ring[start..start + first];
        chunk.copy_from_slice(&data[..first]);
        cache.sync_after_write(chunk.as_ptr() as usize, chunk.len());
        if first < data.len() {
            let chunk = &mut ring[..data.len() - first];
            chunk.copy_from_slice(&data[first..]);
            cache.sync_after_write(chunk.as_ptr() as usize, chunk.len());
        }
        data.len()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::cache::{
        Coherent,
        tests::{CacheOp, RecordingCache},
    };

    #[test]
    fn test_too_small() {
        let mut buf = [0u8; HEADER_SIZE];
        assert_eq!(
            ShareRegion::new(&mut buf).unwrap_err(),
            Error::RegionTooSmall { len: HEADER_SIZE }
        );
        let mut buf = [0u8; HEADER_SIZE + 1];
        assert_eq!(ShareRegion::new(&mut buf).unwrap().ring_size(), 1);
    }

    #[test]
    fn test_descriptor_access_cache_ranges() {
        let mut buf = [0u8; HEADER_SIZE + 32];
        let mut cache = RecordingCache::new(buf.as_ptr());
        let mut region = ShareRegion::new(&mut buf).unwrap();
        let desc = region.read_writer_descriptor(&mut cache);
        assert!(!desc.is_initialized());
        region.write_reader_descriptor(&Descriptor::new_reader(), &mut cache);
        assert_eq!(
            cache.ops,
            [
                CacheOp::Invalidate {
                    offset: WRITER_OFFSET,
                    len: DESCRIPTOR_PAYLOAD_SIZE
                },
                CacheOp::Flush {
                    offset: READER_OFFSET,
                    len: DESCRIPTOR_PAYLOAD_SIZE
                },
            ]
        );
        assert_eq!(
            region.read_reader_descriptor(&mut Coherent),
            Descriptor::new_reader()
        );
    }

    #[test]
    fn test_wrapping_copy_is_split() {
        let mut buf = [0u8; HEADER_SIZE + 16];
        let mut cache = RecordingCache::new(buf.as_ptr());
        let mut region = ShareRegion::new(&mut buf).unwrap();
        assert_eq!(region.copy_to_ring(12, b"abcdefgh", &mut Coherent), 8);
        assert_eq!(&region.as_bytes()[RING_OFFSET..RING_OFFSET + 4], b"efgh");
        assert_eq!(&region.as_bytes()[RING_OFFSET + 12..], b"abcd");

        let mut out = [0u8; 8];
        assert_eq!(region.copy_from_ring(12, &mut out, &mut cache), 8);
        assert_eq!(&out, b"abcdefgh");
        assert_eq!(
            cache.ops,
            [
                CacheOp::Invalidate {
                    offset: RING_OFFSET + 12,
                    len: 4
                },
                CacheOp::Invalidate {
                    offset: RING_OFFSET,
                    len: 4
                },
            ]
        );
    }

    #[test]
    fn test_oversized_write_keeps_tail() {
        let mut buf = [0u8; HEADER_SIZE + 4];
        let mut region = ShareRegion::new(&mut buf).unwrap();
        assert_eq!(region.copy_to_ring(0, b"012345", &mut Coherent), 4);
        let mut out = [0u8; 4];
        assert_eq!(region.copy_from_ring(2, &mut out, &mut Coherent), 4);
        assert_eq!(&out, b"2345");
    }
}
