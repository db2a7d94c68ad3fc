//! Diagnostics for conditions detected while reading the ring.
//!
//! None of these are errors: the remote side is untrusted and may be in the middle of a restart.
//! They are returned in structured form and also rendered as text lines into the output stream,
//! which is what an operator reading the trace sees.
use core::fmt::Write as _;

/// Upper bound of anomalies a single read can detect.
pub const MAX_ANOMALIES: usize = 4;

/// Upper bound of a rendered anomaly line, newline included.
pub const MAX_RENDERED_LEN: usize = 80;

pub type Anomalies = heapless::Vec<Anomaly, MAX_ANOMALIES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// The reader descriptor was zero and has been initialized.
    ReaderInit,
    /// The writer descriptor does not declare a ring size yet.
    WriterNotInit,
    /// The ring size claimed by the writer does not match the size computed from the region.
    /// The reader keeps using its own ring size.
    SizeMismatch { ring_size: usize, writer_size: u32 },
    /// The reader position was ahead of the writer position and has been clamped.
    ReaderAhead { reader_pos: u64, writer_pos: u64 },
    /// Unread data was overwritten by the writer. `lost` bytes were skipped.
    Overrun { lost: u64 },
}

impl core::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Anomaly::ReaderInit => write!(f, "info: reader init"),
            Anomaly::WriterNotInit => write!(f, "err: writer not init"),
            Anomaly::SizeMismatch {
                ring_size,
                writer_size,
            } => write!(f, "err: ring size({ring_size}) != writer.size({writer_size})"),
            Anomaly::ReaderAhead {
                reader_pos,
                writer_pos,
            } => write!(f, "err: reader.pos({reader_pos}) > writer.pos({writer_pos})"),
            Anomaly::Overrun { lost } => write!(f, "warn: overrun, lost {lost} bytes"),
        }
    }
}

impl Anomaly {
    pub const fn level(&self) -> log::Level {
        match self {
            Anomaly::ReaderInit => log::Level::Info,
            Anomaly::SizeMismatch { .. } | Anomaly::Overrun { .. } => log::Level::Warn,
            Anomaly::WriterNotInit | Anomaly::ReaderAhead { .. } => log::Level::Error,
        }
    }

    pub fn log(&self) {
        log::log!(target: crate::LOG_TARGET, self.level(), "{self}");
    }

    /// Render the anomaly as a newline terminated line at the start of `buf`.
    ///
    /// Nothing is rendered if the complete line does not fit. Returns the number of bytes
    /// written, newline included.
    pub fn render(&self, buf: &mut [u8]) -> Option<usize> {
        let mut writer = SliceWriter::new(buf);
        writeln!(writer, "{self}").ok()?;
        Some(writer.written())
    }
}

/// [core::fmt::Write] implementation over a byte slice which fails when the slice is full.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> SliceWriter<'a> {
    #[inline]
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, written: 0 }
    }

    #[inline]
    pub fn written(&self) -> usize {
        self.written
    }
}

impl core::fmt::Write for SliceWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let end = self.written + s.len();
        if end > self.buf.len() {
            return Err(core::fmt::Error);
        }
        self.buf[self.written..end].copy_from_slice(s.as_bytes());
        self.written = end;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(anomaly: Anomaly, buf: &mut [u8]) -> &[u8] {
        let len = anomaly.render(buf).unwrap();
        &buf[..len]
    }

    #[test]
    fn test_render_texts() {
        let mut buf = [0u8; 64];
        assert_eq!(rendered(Anomaly::ReaderInit, &mut buf), b"info: reader init\n");
        assert_eq!(rendered(Anomaly::WriterNotInit, &mut buf), b"err: writer not init\n");
        assert_eq!(
            rendered(
                Anomaly::ReaderAhead {
                    reader_pos: 30,
                    writer_pos: 20,
                },
                &mut buf
            ),
            b"err: reader.pos(30) > writer.pos(20)\n"
        );
        assert_eq!(
            rendered(Anomaly::Overrun { lost: 4 }, &mut buf),
            b"warn: overrun, lost 4 bytes\n"
        );
        assert_eq!(
            rendered(
                Anomaly::SizeMismatch {
                    ring_size: 16,
                    writer_size: 32,
                },
                &mut buf
            ),
            b"err: ring size(16) != writer.size(32)\n"
        );
    }

    #[test]
    fn test_render_only_complete_lines() {
        let mut buf = [0u8; 18];
        assert_eq!(Anomaly::ReaderInit.render(&mut buf), Some(18));
        assert_eq!(Anomaly::ReaderInit.render(&mut buf[..17]), None);
        assert_eq!(Anomaly::ReaderInit.render(&mut []), None);
    }

    #[test]
    fn test_longest_line_fits() {
        let mut buf = [0u8; MAX_RENDERED_LEN];
        let anomaly = Anomaly::ReaderAhead {
            reader_pos: u64::MAX,
            writer_pos: u64::MAX - 1,
        };
        assert!(anomaly.render(&mut buf).is_some());
        let anomaly = Anomaly::SizeMismatch {
            ring_size: usize::MAX,
            writer_size: u32::MAX,
        };
        assert!(anomaly.render(&mut buf).is_some());
    }

    #[test]
    fn test_levels() {
        assert_eq!(Anomaly::ReaderInit.level(), log::Level::Info);
        assert_eq!(Anomaly::Overrun { lost: 1 }.level(), log::Level::Warn);
        assert_eq!(Anomaly::WriterNotInit.level(), log::Level::Error);
    }
}
