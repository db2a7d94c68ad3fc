//! Small host tool to dump the trace ring of a captured shared region image.
//!
//! The image is a binary copy of the complete shared region, for example extracted from a crash
//! dump or read through `/dev/mem`.
use std::{io::Write as _, path::Path};

use clap::Parser as _;
use log::info;
use rproc_trace::{
    Coherent, ReaderConfig, RingBufferReader, ShareRegion, layout::HEADER_SIZE, log::LogLineSink,
};
use simple_logger::SimpleLogger;

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Dump the trace line by line through the logger.
    Dump,
    /// Write the raw trace bytes to stdout.
    Raw,
}

#[derive(clap::Parser, Debug)]
#[command(version, about)]
pub struct Cli {
    /// Path to the shared region image.
    #[arg(short, long)]
    path: String,
    #[arg(short, long, value_enum, default_value_t = Mode::Dump)]
    mode: Mode,
    /// Maximum number of bytes to read in raw mode.
    #[arg(
        short,
        long,
        default_value_t = 4096,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    count: usize,
    /// Log level used for the dumped trace lines.
    #[arg(short, long, default_value_t = log::Level::Info)]
    level: log::Level,
    /// Store the updated reader position in the image after reading.
    #[arg(short, long)]
    write_back: bool,
}

fn main() {
    SimpleLogger::new().init().unwrap();
    let cli = Cli::parse();
    let image_path = Path::new(&cli.path);
    if !image_path.exists() {
        eprintln!("File not found: {}", image_path.display());
        std::process::exit(1);
    }
    let mut image = std::fs::read(image_path).expect("failed to read region image");
    if image.len() <= HEADER_SIZE {
        eprintln!(
            "Region image of {} bytes is too small, the header alone is {} bytes",
            image.len(),
            HEADER_SIZE
        );
        std::process::exit(1);
    }

    let region = ShareRegion::new(&mut image).expect("invalid region image");
    let mut reader = RingBufferReader::new_with_config(
        region,
        Coherent,
        ReaderConfig {
            log_anomalies: false,
            ..Default::default()
        },
    );
    let reader_desc = reader.reader_descriptor();
    let writer_desc = reader.writer_descriptor();
    info!(
        "ring size {}, reader pos {}, writer pos {}, writer size {}, overruns {}",
        reader.region().ring_size(),
        reader_desc.pos,
        writer_desc.pos,
        writer_desc.size,
        writer_desc.overrun
    );

    match cli.mode {
        Mode::Dump => {
            let drained = reader.dump_lines(&mut LogLineSink::new(cli.level));
            info!("drained {drained} bytes");
        }
        Mode::Raw => {
            let mut raw = Vec::new();
            let read = reader
                .read_loop(&mut raw, cli.count)
                .expect("reading the trace failed");
            std::io::stdout()
                .write_all(&raw[..read])
                .expect("writing to stdout failed");
        }
    }

    drop(reader);
    if cli.write_back {
        std::fs::write(image_path, &image).expect("failed to write back region image");
        info!("updated reader position written to {}", image_path.display());
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    #[test]
    fn test_zero_count_is_rejected() {
        let args = ["rproc-trace-dump", "--path", "region.bin", "--mode", "raw"];
        let err = Cli::try_parse_from(args.iter().copied().chain(["--count", "0"])).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let cli = Cli::try_parse_from(args.iter().copied().chain(["--count", "1"])).unwrap();
        assert_eq!(cli.count, 1);
        assert_eq!(Cli::try_parse_from(args).unwrap().count, 4096);
    }
}
