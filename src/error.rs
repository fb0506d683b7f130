//! Error taxonomy for the simulation.
//!
//! Every kind is terminal for the process; the binary is the only place that
//! turns a `SimError` into a diagnostic and an exit status.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Stage of the acquire/dispatch/release protocol that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteropOp {
    Share,
    Acquire,
    Dispatch,
    Release,
    Finish,
    Sample,
}

impl fmt::Display for InteropOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InteropOp::Share => "share",
            InteropOp::Acquire => "acquire",
            InteropOp::Dispatch => "dispatch",
            InteropOp::Release => "release",
            InteropOp::Finish => "finish",
            InteropOp::Sample => "sample",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to decode boundary mask {path}: {source}")]
    MaskDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("no compute device with {capability}")]
    DeviceNotFound { capability: String },

    #[error("no compute platform matches preferred vendors [{}]", preferred.join(", "))]
    PlatformNotFound { preferred: Vec<String> },

    #[error("kernel program {path} failed to build\nLog:\n{log}")]
    Build { path: PathBuf, log: String },

    #[error("interop {op} failed: {reason}")]
    Interop { op: InteropOp, reason: String },

    #[error("display surface error: {0}")]
    Surface(String),
}

impl SimError {
    pub fn interop(op: InteropOp, reason: impl fmt::Display) -> Self {
        SimError::Interop {
            op,
            reason: reason.to_string(),
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Configuration(_)
            | SimError::MaskDecode { .. }
            | SimError::DeviceNotFound { .. } => 2,
            SimError::Build { .. } => 3,
            SimError::Interop { .. } => 4,
            SimError::Surface(_) => 5,
            SimError::PlatformNotFound { .. } => 252,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
