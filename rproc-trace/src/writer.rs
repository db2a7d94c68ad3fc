//! Producer side of the trace ring.
//!
//! This is what the remote firmware does when it logs. It is used to simulate a remote processor
//! on the host and by the test suites. The writer never blocks and never waits for the reader:
//! when the reader falls behind by more than the ring size, old data is overwritten and the
//! overrun counter of the writer descriptor is incremented.
use core::sync::atomic::{Ordering, fence};

use crate::{cache::CacheMaintenance, layout::Descriptor, region::ShareRegion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ring size {0} does not fit into the writer descriptor")]
pub struct RingTooLarge(pub usize);

pub struct TraceWriter<'a, C> {
    region: ShareRegion<'a>,
    cache: C,
    desc: Descriptor,
}

impl<'a, C: CacheMaintenance> TraceWriter<'a, C> {
    /// Initialize a fresh writer descriptor, discarding any previous writer state.
    pub fn new(mut region: ShareRegion<'a>, mut cache: C) -> Result<Self, RingTooLarge> {
        let ring_size = region.ring_size();
        let size = u32::try_from(ring_size).map_err(|_| RingTooLarge(ring_size))?;
        let desc = Descriptor::new_writer(size);
        region.write_writer_descriptor(&desc, &mut cache);
        Ok(Self {
            region,
            cache,
            desc,
        })
    }

    /// Continue with the writer state found in the region, or initialize it if there is none.
    pub fn attach(region: ShareRegion<'a>, mut cache: C) -> Result<Self, RingTooLarge> {
        let desc = region.read_writer_descriptor(&mut cache);
        if desc.size == 0 || desc.size as usize != region.ring_size() {
            return Self::new(region, cache);
        }
        Ok(Self {
            region,
            cache,
            desc,
        })
    }

    #[inline]
    pub fn descriptor(&self) -> Descriptor {
        self.desc
    }

    #[inline]
    pub fn pos(&self) -> u64 {
        self.desc.pos
    }

    #[inline]
    pub fn overruns(&self) -> u32 {
        self.desc.overrun
    }

    #[inline]
    pub fn release(self) -> (ShareRegion<'a>, C) {
        (self.region, self.cache)
    }

    /// Append bytes to the ring and publish the new position.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        self.region.copy_to_ring(self.desc.pos, data, &mut self.cache);
        self.desc.pos = self.desc.pos.wrapping_add(data.len() as u64);

        let reader = self.region.read_reader_descriptor(&mut self.cache);
        if self.desc.pos.wrapping_sub(reader.pos) > self.desc.size as u64
            && reader.pos <= self.desc.pos
        {
            self.desc.overrun = self.desc.overrun.wrapping_add(1);
        }
        // Ring bytes have to be visible before the position which covers them.
        fence(Ordering::Release);
        self.region.write_writer_descriptor(&self.desc, &mut self.cache);
        data.len()
    }

    /// Simulate a restart of the remote side: the stream position starts at zero again.
    pub fn restart(&mut self) {
        self.desc = Descriptor::new_writer(self.desc.size);
        self.region.write_writer_descriptor(&self.desc, &mut self.cache);
    }
}

impl<C: CacheMaintenance> core::fmt::Write for TraceWriter<'_, C> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::fmt::Write as _;

    use super::*;
    use crate::{
        cache::{
            Coherent,
            tests::{CacheOp, RecordingCache},
        },
        layout::{DESCRIPTOR_PAYLOAD_SIZE, HEADER_SIZE, READER_OFFSET, RING_OFFSET, WRITER_OFFSET},
    };
    use std::vec;

    #[test]
    fn test_init() {
        let mut buf = vec![0u8; HEADER_SIZE + 100];
        let writer = TraceWriter::new(ShareRegion::new(&mut buf).unwrap(), Coherent).unwrap();
        assert_eq!(writer.descriptor(), Descriptor::new_writer(100));
        drop(writer);
        let desc = ShareRegion::new(&mut buf)
            .unwrap()
            .read_writer_descriptor(&mut Coherent);
        assert_eq!(desc.size, 100);
        assert_eq!(desc.area_size, 64);
    }

    #[test]
    fn test_attach_continues() {
        let mut buf = vec![0u8; HEADER_SIZE + 32];
        let mut writer =
            TraceWriter::attach(ShareRegion::new(&mut buf).unwrap(), Coherent).unwrap();
        writer.write(b"abc");
        drop(writer);
        let mut writer =
            TraceWriter::attach(ShareRegion::new(&mut buf).unwrap(), Coherent).unwrap();
        assert_eq!(writer.pos(), 3);
        write!(writer, "{}", 42).unwrap();
        assert_eq!(writer.pos(), 5);
        assert_eq!(&buf[RING_OFFSET..RING_OFFSET + 5], b"abc42");
    }

    #[test]
    fn test_overrun_counter() {
        let mut buf = vec![0u8; HEADER_SIZE + 8];
        let mut writer =
            TraceWriter::new(ShareRegion::new(&mut buf).unwrap(), Coherent).unwrap();
        writer.write(b"12345678");
        assert_eq!(writer.overruns(), 0);
        writer.write(b"9");
        assert_eq!(writer.overruns(), 1);
        writer.write(b"0");
        assert_eq!(writer.overruns(), 2);
    }

    #[test]
    fn test_restart() {
        let mut buf = vec![0u8; HEADER_SIZE + 8];
        let mut writer =
            TraceWriter::new(ShareRegion::new(&mut buf).unwrap(), Coherent).unwrap();
        writer.write(b"1234");
        writer.restart();
        assert_eq!(writer.pos(), 0);
        assert_eq!(writer.overruns(), 0);
    }

    #[test]
    fn test_cache_contract() {
        let mut buf = vec![0u8; HEADER_SIZE + 8];
        let mut cache = RecordingCache::new(buf.as_ptr());
        let mut writer =
            TraceWriter::new(ShareRegion::new(&mut buf).unwrap(), &mut cache).unwrap();
        writer.write(b"ab");
        drop(writer);
        assert_eq!(
            cache.ops,
            [
                CacheOp::Flush {
                    offset: WRITER_OFFSET,
                    len: DESCRIPTOR_PAYLOAD_SIZE
                },
                CacheOp::Flush {
                    offset: RING_OFFSET,
                    len: 2
                },
                CacheOp::Invalidate {
                    offset: READER_OFFSET,
                    len: DESCRIPTOR_PAYLOAD_SIZE
                },
                CacheOp::Flush {
                    offset: WRITER_OFFSET,
                    len: DESCRIPTOR_PAYLOAD_SIZE
                },
            ]
        );
    }
}
