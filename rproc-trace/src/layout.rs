//! # Shared region layout
//!
//! The region shared with the remote processor starts with two fixed 64 byte descriptor areas
//! followed by the log ring:
//!
//! | Offset | Size                   | Content                                   |
//! |--------|------------------------|-------------------------------------------|
//! | 0x00   | [READER_AREA_SIZE]     | Reader descriptor, written by the host    |
//! | 0x40   | [WRITER_AREA_SIZE]     | Writer descriptor, written by the remote  |
//! | 0x80   | `region_len - 0x80`    | Log ring                                  |
//!
//! Both descriptors share the same shape. The payload fields are packed at the front of each
//! area, the remainder is reserved and kept at zero. All fields are little-endian, which is what
//! the remote firmware writes.
use static_assertions::const_assert;

/// Size of the reader descriptor area.
pub const READER_AREA_SIZE: usize = 64;
/// Size of the writer descriptor area.
pub const WRITER_AREA_SIZE: usize = 64;
/// Combined size of both descriptor areas. The log ring starts at this offset.
pub const HEADER_SIZE: usize = READER_AREA_SIZE + WRITER_AREA_SIZE;

pub const READER_OFFSET: usize = 0;
pub const WRITER_OFFSET: usize = READER_AREA_SIZE;
pub const RING_OFFSET: usize = HEADER_SIZE;

pub const POS_OFFSET: usize = 0x00;
pub const AREA_SIZE_OFFSET: usize = 0x08;
pub const SIZE_OFFSET: usize = 0x0C;
pub const OVERRUN_OFFSET: usize = 0x10;

/// Number of bytes actually used by the descriptor fields.
pub const DESCRIPTOR_PAYLOAD_SIZE: usize = 0x14;

const_assert!(DESCRIPTOR_PAYLOAD_SIZE <= READER_AREA_SIZE);
const_assert!(DESCRIPTOR_PAYLOAD_SIZE <= WRITER_AREA_SIZE);
const_assert!(READER_AREA_SIZE == WRITER_AREA_SIZE);

/// In-memory copy of a reader or writer descriptor.
///
/// This is a plain value. It is decoded from and encoded into the shared region explicitly, so
/// there is never a reference into memory the remote side might be modifying concurrently.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    /// Absolute position inside the logical byte stream. The ring offset is
    /// `pos % ring_size`.
    pub pos: u64,
    /// Size of the descriptor area. Zero means the descriptor was never initialized.
    pub area_size: u32,
    /// Ring capacity as claimed by the writer. Unused for the reader descriptor.
    pub size: u32,
    /// Overrun counter maintained by the writer. Diagnostic only.
    pub overrun: u32,
}

impl Descriptor {
    /// Descriptor written by the reader on first use.
    pub const fn new_reader() -> Self {
        Self {
            pos: 0,
            area_size: READER_AREA_SIZE as u32,
            size: 0,
            overrun: 0,
        }
    }

    /// Descriptor written by the producer when it sets up a ring of `ring_size` bytes.
    pub const fn new_writer(ring_size: u32) -> Self {
        Self {
            pos: 0,
            area_size: WRITER_AREA_SIZE as u32,
            size: ring_size,
            overrun: 0,
        }
    }

    #[inline]
    pub const fn is_initialized(&self) -> bool {
        self.area_size != 0
    }

    /// Decode a descriptor from the start of a descriptor area.
    ///
    /// # Panics
    ///
    /// Panics if `area` is shorter than [DESCRIPTOR_PAYLOAD_SIZE].
    pub fn from_bytes(area: &[u8]) -> Self {
        Self {
            pos: read_u64_le(area, POS_OFFSET),
            area_size: read_u32_le(area, AREA_SIZE_OFFSET),
            size: read_u32_le(area, SIZE_OFFSET),
            overrun: read_u32_le(area, OVERRUN_OFFSET),
        }
    }

    /// Encode the descriptor fields into the start of a descriptor area.
    ///
    /// The reserved tail of the area is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if `area` is shorter than [DESCRIPTOR_PAYLOAD_SIZE].
    pub fn write_to(&self, area: &mut [u8]) {
        area[POS_OFFSET..POS_OFFSET + 8].copy_from_slice(&self.pos.to_le_bytes());
        area[AREA_SIZE_OFFSET..AREA_SIZE_OFFSET + 4].copy_from_slice(&self.area_size.to_le_bytes());
        area[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&self.size.to_le_bytes());
        area[OVERRUN_OFFSET..OVERRUN_OFFSET + 4].copy_from_slice(&self.overrun.to_le_bytes());
    }
}

#[inline]
fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets() {
        assert_eq!(READER_OFFSET, 0);
        assert_eq!(WRITER_OFFSET, 64);
        assert_eq!(RING_OFFSET, 128);
    }

    #[test]
    fn test_field_placement() {
        let desc = Descriptor {
            pos: 0x0102_0304_0506_0708,
            area_size: 0x40,
            size: 0x1000,
            overrun: 3,
        };
        let mut area = [0xAA; READER_AREA_SIZE];
        desc.write_to(&mut area);
        assert_eq!(&area[0..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&area[8..12], &[0x40, 0, 0, 0]);
        assert_eq!(&area[12..16], &[0x00, 0x10, 0, 0]);
        assert_eq!(&area[16..20], &[3, 0, 0, 0]);
        // Reserved tail is not touched.
        assert!(area[DESCRIPTOR_PAYLOAD_SIZE..].iter().all(|b| *b == 0xAA));
        assert_eq!(Descriptor::from_bytes(&area), desc);
    }

    #[test]
    fn test_zeroed_area_is_uninitialized() {
        let desc = Descriptor::from_bytes(&[0; WRITER_AREA_SIZE]);
        assert!(!desc.is_initialized());
        assert_eq!(desc, Descriptor::default());
        assert!(Descriptor::new_reader().is_initialized());
        assert_eq!(Descriptor::new_writer(512).size, 512);
    }
}
