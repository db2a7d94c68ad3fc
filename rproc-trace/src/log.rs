//! # Line sinks for trace dumps
//!
//! - [LogLineSink] forwards every dumped line to the [log] facade.
//! - [rb::RingBufferLineSink] stores lines in a ring buffer so they can be drained later, for
//!   example by an asynchronous task which owns a slow UART.

use crate::dump::LineSink;

/// Displays bytes as text, replacing invalid UTF-8 sequences with U+FFFD.
pub struct Lossy<'a>(pub &'a [u8]);

impl core::fmt::Display for Lossy<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_str("\u{FFFD}")?;
            }
        }
        Ok(())
    }
}

/// Forwards dumped lines to the [log] facade.
#[derive(Debug, Clone, Copy)]
pub struct LogLineSink {
    target: &'static str,
    level: log::Level,
}

impl Default for LogLineSink {
    fn default() -> Self {
        Self::new(log::Level::Info)
    }
}

impl LogLineSink {
    pub const DEFAULT_TARGET: &'static str = crate::LOG_TARGET;

    #[inline]
    pub const fn new(level: log::Level) -> Self {
        Self::new_with_target(Self::DEFAULT_TARGET, level)
    }

    #[inline]
    pub const fn new_with_target(target: &'static str, level: log::Level) -> Self {
        Self { target, level }
    }

    #[inline]
    pub const fn target(&self) -> &'static str {
        self.target
    }
}

impl LineSink for LogLineSink {
    fn emit_line(&mut self, line: &[u8]) {
        log::log!(target: self.target, self.level, "{}", Lossy(line));
    }
}

/// Line sink which stores lines in a ring buffer and queues their lengths.
pub mod rb {
    use core::{
        cell::RefCell,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
    use ringbuf::{
        StaticRb,
        traits::{Consumer, Observer, Producer},
    };

    use crate::dump::LineSink;

    /// Maximum number of queued lines.
    pub const LINE_QUEUE_DEPTH: usize = 32;

    pub type LineQueue = Channel<CriticalSectionRawMutex, usize, LINE_QUEUE_DEPTH>;

    /// Ring buffer backed line sink.
    ///
    /// The sink does not require allocation. Line data is stored in a ring buffer of `N` bytes and
    /// the line lengths are sent through a [LineQueue]. A line is dropped as a whole if either of
    /// them is full. The structure can be placed inside a `static`.
    pub struct RingBufferLineSink<const N: usize> {
        line_queue: LineQueue,
        ring_buf: critical_section::Mutex<RefCell<Option<StaticRb<u8, N>>>>,
        dropped: AtomicUsize,
    }

    unsafe impl<const N: usize> Send for RingBufferLineSink<N> {}
    unsafe impl<const N: usize> Sync for RingBufferLineSink<N> {}

    impl<const N: usize> Default for RingBufferLineSink<N> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<const N: usize> RingBufferLineSink<N> {
        pub const fn new() -> Self {
            Self {
                line_queue: Channel::new(),
                ring_buf: critical_section::Mutex::new(RefCell::new(None)),
                dropped: AtomicUsize::new(0),
            }
        }

        #[inline]
        pub fn line_queue(&self) -> &LineQueue {
            &self.line_queue
        }

        /// Number of lines dropped because the sink was full.
        #[inline]
        pub fn dropped(&self) -> usize {
            self.dropped.load(Ordering::Relaxed)
        }

        /// Store a line. Returns `false` if the line was dropped.
        pub fn push_line(&self, line: &[u8]) -> bool {
            let stored = critical_section::with(|cs| {
                let mut rb_ref = self.ring_buf.borrow(cs).borrow_mut();
                let rb = rb_ref.get_or_insert_with(StaticRb::<u8, N>::default);
                if rb.vacant_len() < line.len() {
                    return false;
                }
                if self.line_queue.try_send(line.len()).is_err() {
                    return false;
                }
                rb.push_slice(line);
                true
            });
            if !stored {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            stored
        }

        /// Read a line of `line_len` bytes, as received from the [LineQueue], into `buf`.
        ///
        /// If `buf` is too small, the line is truncated and the rest of it is discarded. Returns
        /// the number of bytes copied.
        pub fn read_line(&self, line_len: usize, buf: &mut [u8]) -> usize {
            let read_len = core::cmp::min(line_len, buf.len());
            critical_section::with(|cs| {
                let mut rb_ref = self.ring_buf.borrow(cs).borrow_mut();
                let Some(rb) = rb_ref.as_mut() else {
                    return 0;
                };
                let read = rb.pop_slice(&mut buf[..read_len]);
                rb.skip(line_len - read_len);
                read
            })
        }

        /// Read the next queued line if there is one.
        pub fn try_read_next_line(&self, buf: &mut [u8]) -> Option<usize> {
            let line_len = self.line_queue.try_receive().ok()?;
            Some(self.read_line(line_len, buf))
        }

        /// Wait for the next line and read it.
        pub async fn read_next_line(&self, buf: &mut [u8]) -> usize {
            let line_len = self.line_queue.receive().await;
            self.read_line(line_len, buf)
        }
    }

    impl<const N: usize> LineSink for RingBufferLineSink<N> {
        #[inline]
        fn emit_line(&mut self, line: &[u8]) {
            self.push_line(line);
        }
    }

    impl<const N: usize> LineSink for &RingBufferLineSink<N> {
        #[inline]
        fn emit_line(&mut self, line: &[u8]) {
            self.push_line(line);
        }
    }

}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::ToString;

    #[test]
    fn test_lossy_display() {
        assert_eq!(Lossy(b"plain").to_string(), "plain");
        assert_eq!(Lossy(b"a\xFFb").to_string(), "a\u{FFFD}b");
        assert_eq!(Lossy(b"").to_string(), "");
    }

    #[test]
    fn test_default_target_matches_anomalies() {
        assert_eq!(LogLineSink::default().target(), crate::LOG_TARGET);
        assert_eq!(LogLineSink::new(log::Level::Debug).target(), "rproc_trace");
    }

    #[test]
    fn test_log_sink_does_not_panic_without_logger() {
        let mut sink = LogLineSink::new_with_target("test", log::Level::Warn);
        sink.emit_line(b"line \xC3");
        LogLineSink::default().emit_line(b"");
    }
}
