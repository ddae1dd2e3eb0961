use thiserror::Error;

/// Why an inbound frame was dropped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown opcode 0x{0:02X}")]
    UnknownOpcode(u8),
    #[error("frame too short for opcode 0x{opcode:02X}: {len} < {min} bytes")]
    TooShort { opcode: u8, len: usize, min: usize },
    #[error("result payload truncated: {len} bytes, header announces {expected}")]
    Truncated { expected: usize, len: usize },
}

#[derive(Debug, Error, Clone)]
pub enum TempoError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] FrameError),
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(&'static str),
    #[error("allocation failed for {0}")]
    Allocation(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("timer error: {0}")]
    Timer(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing actuator")]
    MissingActuator,
    #[error("missing one-shot timer")]
    MissingTimer,
    #[error("missing response sink")]
    MissingSink,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
