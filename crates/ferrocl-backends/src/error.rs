//! Error types for backend operations

use std::fmt;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors raised while a backend accepts or executes a job
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Memory access out of bounds
    #[error("memory access out of bounds: offset {offset} + len {len} > size {size}")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    /// Kernel argument missing or of the wrong shape
    #[error("invalid kernel argument {index}: {reason}")]
    InvalidKernelArg { index: usize, reason: String },

    /// Kernel body reported a failure
    #[error("kernel execution failed: {0}")]
    KernelFailed(String),

    /// Native host function returned an error code
    #[error("native kernel returned error code {0}")]
    NativeKernelFailed(i32),

    /// Backend no longer accepts work
    #[error("device unavailable: {0}")]
    Unavailable(String),

    /// Worker pool could not be created
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// Operation not supported by this backend
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl BackendError {
    pub fn out_of_bounds(offset: usize, len: usize, size: usize) -> Self {
        Self::OutOfBounds { offset, len, size }
    }

    pub fn invalid_arg(index: usize, reason: impl fmt::Display) -> Self {
        Self::InvalidKernelArg {
            index,
            reason: reason.to_string(),
        }
    }

    pub fn kernel_failed(msg: impl Into<String>) -> Self {
        Self::KernelFailed(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Stable negative status code recorded on a failed event.
    pub fn code(&self) -> i32 {
        match self {
            Self::OutOfBounds { .. } => -30,
            Self::InvalidKernelArg { .. } => -52,
            Self::KernelFailed(_) | Self::WorkerPool(_) => -5,
            Self::NativeKernelFailed(code) => *code,
            Self::Unavailable(_) => -2,
            Self::Unsupported(_) => -59,
        }
    }
}
