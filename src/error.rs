//! Per-concern error types for the sounder core.
//!
//! One `thiserror` enum per concern rather than a single flat error type,
//! matching how recorder/format errors are split in this codebase.

use thiserror::Error;

/// Errors raised while validating or deriving PHY/topology configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("channel mask must be one of \"A\", \"B\", \"AB\", got {0:?}")]
    InvalidChannelMask(String),

    #[error("tx gain {gain} on channel {channel} exceeds cap {cap}")]
    GainOverCap {
        channel: String,
        gain: f64,
        cap: f64,
    },

    #[error(
        "samps_per_symbol ({samps_per_symbol}) must be >= beacon_size ({beacon_size}) + prefix ({prefix}) + postfix ({postfix})"
    )]
    SampsPerSymbolTooSmall {
        samps_per_symbol: usize,
        beacon_size: usize,
        prefix: usize,
        postfix: usize,
    },

    #[error("reciprocal calibration mode and client population are mutually exclusive")]
    ReciprocalWithClients,

    #[error("missing uplink data file: {0}")]
    MissingUplinkFile(String),

    #[error("io error loading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while deriving a slot schedule from a frame string.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("cell {0} frame length {1} does not match the shared frame length {2}")]
    FrameLengthMismatch(usize, usize, usize),

    #[error("unknown slot role {0:?} in frame string")]
    UnknownRole(char),

    #[error("reciprocal calibration requires at least 2 sdrs, got {0}")]
    TooFewSdrs(usize),

    #[error("reciprocal calibration reference index {0} out of range for {1} sdrs")]
    RefOutOfRange(usize, usize),
}

/// Errors raised while composing beacon/pilot/uplink waveforms.
#[derive(Debug, Error)]
pub enum WaveformError {
    #[error("unsupported pilot sequence for fft_size {0}")]
    UnsupportedPilotSequence(usize),

    #[error("short read of uplink data file {path}: expected {expected} samples, got {got}")]
    ShortRead {
        path: String,
        expected: usize,
        got: usize,
    },

    #[error("missing uplink data file {0}")]
    MissingFile(String),

    #[error("io error reading uplink data: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while constructing or tearing down the receive/record pipeline.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to construct receiver pool: {0}")]
    ReceiverConstruction(String),

    #[error("failed to pin thread to core {0}")]
    CorePinFailed(usize),

    #[error("dispatch enqueue to recorder {0} failed, recorder pool is saturated or misconfigured")]
    DispatchEnqueueFailed(usize),
}

/// Errors surfaced by a recorder worker or the trace sink it writes to.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("trace sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("recorder for antenna shard {0} is not recording")]
    NotRecording(usize),

    #[error("recorder for antenna shard {0} is already recording")]
    AlreadyRecording(usize),

    #[error("trace sink format error: {0}")]
    Format(String),
}

/// Top-level error returned by the lifecycle controller.
#[derive(Debug, Error)]
pub enum SounderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Waveform(#[from] WaveformError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}
