//! # Remote processor trace reader
//!
//! Remote processors like the auxiliary cores of many SoCs log into a ring buffer which lives in
//! memory shared with the host. This crate implements the host side of that protocol: it drains
//! the ring, keeps track of the read position inside the shared region and splits the drained
//! text into lines for a logging backend.
//!
//! The layout of the shared region is described in the [layout] module. The remote side is never
//! trusted. Uninitialized descriptors, positions going backwards and overwritten data are
//! reported as [diag::Anomaly] values and as text inside the trace, but never as errors.
//!
//! The [writer] module implements the producer side, which is useful to simulate a remote
//! processor on the host.
#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod cache;
pub mod diag;
pub mod dump;
pub mod layout;
pub mod log;
pub mod reader;
pub mod region;
pub mod writer;

pub use cache::{CacheMaintenance, Coherent};
pub use dump::LineSink;
pub use reader::{
    ReadReport, ReaderConfig, RingBufferReader, trace_dump, trace_read, trace_read_to_sink,
};
pub use region::ShareRegion;

/// Log target of everything this crate logs, dumped trace lines included.
pub const LOG_TARGET: &str = "rproc_trace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("shared region of {len} bytes is not larger than the {} byte header", layout::HEADER_SIZE)]
    RegionTooSmall { len: usize },
    #[error("destination buffer or requested byte count is empty")]
    EmptyBuffer,
    #[error("byte sink error: {0:?}")]
    Sink(embedded_io::ErrorKind),
}
