//! # Ring buffer reader
//!
//! Drains the log ring of a [ShareRegion] into caller buffers, byte sinks or line sinks.
//!
//! Only one reader per region is supported, the reader position is persisted inside the region
//! without any locking. The writer runs on a different processor and is never trusted: every
//! inconsistency it causes is reported as an [Anomaly] and worked around. A read is a
//! best-effort snapshot. Bytes the writer appends while a read is in progress are picked up by
//! the next read.
use embedded_io::Error as _;

use crate::{
    Error,
    cache::CacheMaintenance,
    diag::{Anomalies, Anomaly, MAX_RENDERED_LEN},
    dump::{LineBuffer, LineSink, MAX_LINE_LEN},
    layout::Descriptor,
    region::ShareRegion,
};

/// Chunk size used by [RingBufferReader::read_loop]. Also the upper bound for
/// [ReaderConfig::chunk_size].
pub const DEFAULT_CHUNK_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Chunk size used by [RingBufferReader::read_loop]. Clamped to `1..=DEFAULT_CHUNK_SIZE`.
    pub chunk_size: usize,
    /// Forward detected anomalies to the `log` facade in addition to rendering them.
    pub log_anomalies: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_anomalies: true,
        }
    }
}

/// Result of a single [RingBufferReader::read] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadReport {
    /// Total bytes written to the output buffer, diagnostic text included.
    pub written: usize,
    /// Ring payload bytes contained in [Self::written].
    pub payload: usize,
    /// Bytes which were readable but did not fit into the output buffer.
    pub remaining: u64,
    pub anomalies: Anomalies,
}

impl ReadReport {
    /// Number of diagnostic text bytes which precede the payload.
    #[inline]
    pub fn diagnostic_len(&self) -> usize {
        self.written - self.payload
    }

    /// No payload was produced and nothing is left to read right now.
    #[inline]
    pub fn is_drained(&self) -> bool {
        self.payload == 0 && self.remaining == 0
    }
}

pub struct RingBufferReader<'a, C> {
    region: ShareRegion<'a>,
    cache: C,
    config: ReaderConfig,
}

impl<'a, C: CacheMaintenance> RingBufferReader<'a, C> {
    #[inline]
    pub fn new(region: ShareRegion<'a>, cache: C) -> Self {
        Self::new_with_config(region, cache, ReaderConfig::default())
    }

    #[inline]
    pub fn new_with_config(region: ShareRegion<'a>, cache: C, config: ReaderConfig) -> Self {
        Self {
            region,
            cache,
            config,
        }
    }

    #[inline]
    pub fn region(&self) -> &ShareRegion<'a> {
        &self.region
    }

    #[inline]
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    #[inline]
    pub fn release(self) -> (ShareRegion<'a>, C) {
        (self.region, self.cache)
    }

    /// Current reader descriptor snapshot.
    #[inline]
    pub fn reader_descriptor(&mut self) -> Descriptor {
        self.region.read_reader_descriptor(&mut self.cache)
    }

    /// Current writer descriptor snapshot.
    #[inline]
    pub fn writer_descriptor(&mut self) -> Descriptor {
        self.region.read_writer_descriptor(&mut self.cache)
    }

    /// Number of unread bytes according to the current descriptors. This does not account for
    /// data lost to an overrun.
    pub fn readable(&mut self) -> u64 {
        let writer = self.writer_descriptor();
        let reader = self.reader_descriptor();
        if reader.pos > writer.pos {
            return 0;
        }
        writer.pos.wrapping_sub(reader.pos)
    }

    fn note(&self, report: &mut ReadReport, anomaly: Anomaly) {
        if self.config.log_anomalies {
            anomaly.log();
        }
        // There are less possible anomalies per read than slots.
        let _ = report.anomalies.push(anomaly);
    }

    /// Drain newly written bytes into `out`.
    ///
    /// Diagnostic lines for detected anomalies are written first, the ring payload follows. A
    /// diagnostic line is only written if it fits completely and still leaves room for at least
    /// one payload byte, otherwise it is only part of [ReadReport::anomalies]. The reader
    /// position is persisted into the region before returning. An empty `out` is a no-op which
    /// does not touch the region at all.
    #[inline]
    pub fn read(&mut self, out: &mut [u8]) -> ReadReport {
        self.read_with(out, ReadMode::SINGLE)
    }

    fn read_with(&mut self, out: &mut [u8], mode: ReadMode) -> ReadReport {
        let mut report = ReadReport::default();
        if out.is_empty() {
            return report;
        }
        let writer = self.region.read_writer_descriptor(&mut self.cache);
        let mut reader = self.region.read_reader_descriptor(&mut self.cache);

        if !reader.is_initialized() {
            reader = Descriptor::new_reader();
            self.note(&mut report, Anomaly::ReaderInit);
        }
        if writer.size == 0 {
            self.note(&mut report, Anomaly::WriterNotInit);
            Self::render_anomalies(&mut report, out, mode, 0);
            self.region.write_reader_descriptor(&reader, &mut self.cache);
            return report;
        }
        let ring_size = self.region.ring_size();
        if mode.report_size_mismatch && ring_size as u64 != writer.size as u64 {
            self.note(
                &mut report,
                Anomaly::SizeMismatch {
                    ring_size,
                    writer_size: writer.size,
                },
            );
        }
        if reader.pos > writer.pos {
            self.note(
                &mut report,
                Anomaly::ReaderAhead {
                    reader_pos: reader.pos,
                    writer_pos: writer.pos,
                },
            );
            reader.pos = writer.pos;
        }

        let mut readable = writer.pos.wrapping_sub(reader.pos);
        // Never trust a writer size exceeding what is actually mapped.
        let capacity = core::cmp::min(writer.size as u64, ring_size as u64);
        if readable > capacity {
            let lost = readable - capacity;
            self.note(&mut report, Anomaly::Overrun { lost });
            reader.pos = reader.pos.wrapping_add(lost);
            readable = capacity;
        }
        Self::render_anomalies(&mut report, out, mode, usize::from(readable > 0));

        let space = out.len() - report.written;
        let len = core::cmp::min(readable, space as u64) as usize;
        if len > 0 {
            let copied = self.region.copy_from_ring(
                reader.pos,
                &mut out[report.written..report.written + len],
                &mut self.cache,
            );
            reader.pos = reader.pos.wrapping_add(copied as u64);
            report.payload = copied;
            report.written += copied;
            readable -= copied as u64;
        }
        report.remaining = readable;

        self.region.write_reader_descriptor(&reader, &mut self.cache);
        report
    }

    /// Render the anomalies of `report` into `out`, keeping `reserve` bytes free for payload.
    fn render_anomalies(report: &mut ReadReport, out: &mut [u8], mode: ReadMode, reserve: usize) {
        if !mode.render {
            return;
        }
        let end = out.len().saturating_sub(reserve);
        for anomaly in report.anomalies.iter() {
            if let Some(len) = anomaly.render(&mut out[report.written..end]) {
                report.written += len;
            }
        }
    }

    /// Fill `buf` with as much data as is currently available.
    ///
    /// Returns the number of bytes produced, which might be less than the buffer length or zero.
    /// A size mismatch is only reported once per call.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if buf.is_empty() {
            return Err(Error::EmptyBuffer);
        }
        let mut mode = ReadMode::SINGLE;
        let mut produced = 0;
        while produced < buf.len() {
            let report = self.read_with(&mut buf[produced..], mode);
            mode.report_size_mismatch = false;
            produced += report.written;
            if report.is_drained() {
                break;
            }
        }
        Ok(produced)
    }

    /// Read up to `total_len` bytes in chunks and pass them to `sink`.
    ///
    /// Stops early when no more data is available. This never blocks on the ring, only the sink
    /// might block. A size mismatch is only reported once per call.
    pub fn read_loop<W: embedded_io::Write>(
        &mut self,
        sink: &mut W,
        total_len: usize,
    ) -> Result<usize, Error> {
        if total_len == 0 {
            return Err(Error::EmptyBuffer);
        }
        let mut chunk = [0u8; DEFAULT_CHUNK_SIZE];
        let chunk_size = self.config.chunk_size.clamp(1, DEFAULT_CHUNK_SIZE);
        let mut mode = ReadMode::SINGLE;
        let mut produced = 0;
        while produced < total_len {
            let len = core::cmp::min(chunk_size, total_len - produced);
            let report = self.read_with(&mut chunk[..len], mode);
            mode.report_size_mismatch = false;
            if report.written > 0 {
                sink.write_all(&chunk[..report.written])
                    .map_err(|e| Error::Sink(e.kind()))?;
                produced += report.written;
            }
            if report.is_drained() {
                break;
            }
        }
        Ok(produced)
    }

    /// Drain everything which is currently available line by line into `sink`.
    ///
    /// Diagnostics are emitted as lines of their own and never split a payload line. Returns the
    /// number of payload bytes drained. Never stops before the ring is drained.
    pub fn dump_lines<S: LineSink + ?Sized>(&mut self, sink: &mut S) -> usize {
        let mut chunk = [0u8; MAX_LINE_LEN];
        let mut text = [0u8; MAX_RENDERED_LEN];
        let mut lines = LineBuffer::<MAX_LINE_LEN>::new();
        let mut mode = ReadMode {
            render: false,
            report_size_mismatch: true,
        };
        let mut drained = 0;
        loop {
            let report = self.read_with(&mut chunk, mode);
            mode.report_size_mismatch = false;
            for anomaly in report.anomalies.iter() {
                if let Some(len) = anomaly.render(&mut text) {
                    // Without the newline.
                    sink.emit_line(&text[..len - 1]);
                }
            }
            lines.push(&chunk[..report.payload], sink);
            drained += report.payload;
            if report.is_drained() {
                break;
            }
        }
        lines.flush(sink);
        drained
    }
}

#[derive(Debug, Clone, Copy)]
struct ReadMode {
    /// Render anomalies as text into the output.
    render: bool,
    /// A size mismatch persists until the remote side restarts. Loops only report it once.
    report_size_mismatch: bool,
}

impl ReadMode {
    const SINGLE: Self = Self {
        render: true,
        report_size_mismatch: true,
    };
}

/// Read up to `buf.len()` bytes from the region into `buf`.
pub fn trace_read<C: CacheMaintenance>(
    region: &mut [u8],
    cache: C,
    buf: &mut [u8],
) -> Result<usize, Error> {
    RingBufferReader::new(ShareRegion::new(region)?, cache).read_into(buf)
}

/// Read up to `count` bytes from the region into an arbitrary byte sink.
pub fn trace_read_to_sink<C: CacheMaintenance, W: embedded_io::Write>(
    region: &mut [u8],
    cache: C,
    sink: &mut W,
    count: usize,
) -> Result<usize, Error> {
    RingBufferReader::new(ShareRegion::new(region)?, cache).read_loop(sink, count)
}

/// Drain everything currently available line by line into `sink`.
///
/// Only fails if the region itself is unusable.
pub fn trace_dump<C: CacheMaintenance, S: LineSink + ?Sized>(
    region: &mut [u8],
    cache: C,
    sink: &mut S,
) -> Result<usize, Error> {
    Ok(RingBufferReader::new(ShareRegion::new(region)?, cache).dump_lines(sink))
}
