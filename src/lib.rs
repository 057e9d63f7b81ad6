//! Ingest-and-record core of a multi-radio TDD channel sounder.
//!
//! Captures IQ samples from a pool of software-defined radios, time-aligns
//! them per a declarative slot schedule, and persists them to a columnar
//! on-disk trace via a pool of recorder workers.

pub mod affinity;
pub mod config;
pub mod dispatch;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod packet;
pub mod radio;
pub mod receiver;
pub mod recorder;
pub mod ring;
pub mod schedule;
pub mod trace_sink;
pub mod waveform;

/// Initializes the `tracing` subscriber the way this codebase's recording
/// binaries do: no target module paths, level from `RUST_LOG` or `level`.
pub fn init_logging(level: tracing::Level) {
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();
}
