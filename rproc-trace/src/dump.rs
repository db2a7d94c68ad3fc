//! Line splitting for trace dumps.
//!
//! Bytes drained from the ring are accumulated in a [LineBuffer]. Every newline terminated line
//! is emitted to a [LineSink] without the newline. A line longer than the buffer is emitted in
//! pieces rather than dropped, and whatever is left when the stream is drained is flushed as a
//! final unterminated line.

/// Maximum length of a dumped line. Longer lines are split.
pub const MAX_LINE_LEN: usize = 256;

/// Consumer of dumped trace lines.
pub trait LineSink {
    /// Called once per line. The line does not contain the terminating newline.
    fn emit_line(&mut self, line: &[u8]);
}

impl<S: LineSink + ?Sized> LineSink for &mut S {
    #[inline]
    fn emit_line(&mut self, line: &[u8]) {
        (**self).emit_line(line)
    }
}

/// Collects every line into its own vector.
#[cfg(feature = "alloc")]
impl LineSink for alloc::vec::Vec<alloc::vec::Vec<u8>> {
    fn emit_line(&mut self, line: &[u8]) {
        self.push(line.to_vec());
    }
}

/// Adapter to use a closure as a [LineSink].
pub struct FnLineSink<F>(pub F);

impl<F: FnMut(&[u8])> LineSink for FnLineSink<F> {
    #[inline]
    fn emit_line(&mut self, line: &[u8]) {
        (self.0)(line)
    }
}

/// Fixed-size line accumulation buffer.
#[derive(Debug)]
pub struct LineBuffer<const N: usize = MAX_LINE_LEN> {
    buf: [u8; N],
    len: usize,
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        assert!(N > 0, "line buffer capacity must not be zero");
        Self {
            buf: [0; N],
            len: 0,
        }
    }

    /// Number of buffered bytes not yet emitted.
    #[inline]
    pub const fn pending(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append bytes, emitting every line which is completed on the way.
    pub fn push<S: LineSink + ?Sized>(&mut self, mut data: &[u8], sink: &mut S) {
        while !data.is_empty() {
            let len = core::cmp::min(data.len(), N - self.len);
            self.buf[self.len..self.len + len].copy_from_slice(&data[..len]);
            self.len += len;
            data = &data[len..];
            self.emit_lines(sink);
        }
    }

    /// Emit the buffered unterminated remainder, if there is any.
    pub fn flush<S: LineSink + ?Sized>(&mut self, sink: &mut S) {
        if self.len > 0 {
            sink.emit_line(&self.buf[..self.len]);
            self.len = 0;
        }
    }

    fn emit_lines<S: LineSink + ?Sized>(&mut self, sink: &mut S) {
        let mut start = 0;
        while let Some(idx) = self.buf[start..self.len].iter().position(|b| *b == b'\n') {
            sink.emit_line(&self.buf[start..start + idx]);
            start += idx + 1;
        }
        if start > 0 {
            self.buf.copy_within(start..self.len, 0);
            self.len -= start;
        }
        // Full without a newline: emit what we have instead of losing it.
        if self.len == N {
            self.flush(sink);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::{string::String, vec::Vec};

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl LineSink for Lines {
        fn emit_line(&mut self, line: &[u8]) {
            self.0.push(String::from_utf8(line.to_vec()).unwrap());
        }
    }

    #[test]
    fn test_lines_across_chunks() {
        let data = b"abc\ndef\nghi";
        for split in 1..data.len() {
            let mut lines = Lines::default();
            let mut buf = LineBuffer::<16>::new();
            for chunk in data.chunks(split) {
                buf.push(chunk, &mut lines);
            }
            assert_eq!(lines.0, ["abc", "def"]);
            assert_eq!(buf.pending(), 3);
            buf.flush(&mut lines);
            assert_eq!(lines.0, ["abc", "def", "ghi"]);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut lines = Lines::default();
        let mut buf = LineBuffer::<8>::new();
        buf.push(b"\n\nx\n", &mut lines);
        buf.flush(&mut lines);
        assert_eq!(lines.0, ["", "", "x"]);
    }

    #[test]
    fn test_overlong_line_is_split() {
        let mut lines = Lines::default();
        let mut buf = LineBuffer::<4>::new();
        buf.push(b"0123456789\nab", &mut lines);
        assert_eq!(lines.0, ["0123", "4567", "89"]);
        buf.flush(&mut lines);
        assert_eq!(lines.0, ["0123", "4567", "89", "ab"]);
    }

    #[test]
    fn test_fn_sink() {
        let mut count = 0;
        let mut sink = FnLineSink(|_line: &[u8]| count += 1);
        let mut buf = LineBuffer::<8>::new();
        buf.push(b"a\nb\nc", &mut sink);
        buf.flush(&mut sink);
        assert_eq!(count, 3);
    }
}
