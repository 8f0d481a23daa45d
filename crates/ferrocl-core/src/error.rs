//! Error types for ferrocl-core operations

use ferrocl_backends::BackendError;

/// Result type for ferrocl-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the runtime API.
///
/// Validation failures are returned synchronously and leave no event
/// behind. Execution failures are recorded on the event and surface here
/// only through blocking calls and waits.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid command queue")]
    InvalidCommandQueue,

    #[error("invalid memory object: {0}")]
    InvalidMemObject(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid event wait list")]
    InvalidEventWaitList,

    /// A wait-list member ended in error, so this command never ran.
    #[error("an event in the wait list failed")]
    UpstreamDependencyFailed,

    #[error("backend execution failed with code {0}")]
    BackendExecutionFailed(i32),

    /// A user event was completed with an application error code.
    #[error("event failed with application code {0}")]
    EventFailed(i32),

    #[error("out of resources")]
    OutOfResources,

    #[error("objects belong to different contexts")]
    InvalidContext,

    #[error("device is not part of the context")]
    InvalidDevice,

    #[error("unsupported queue properties: {0}")]
    InvalidQueueProperties(String),

    #[error("invalid buffer size: {0}")]
    InvalidBufferSize(String),

    #[error("invalid image size: {0}")]
    InvalidImageSize(String),

    #[error("unsupported image format: {0}")]
    InvalidImageFormat(String),

    #[error("image formats do not match")]
    ImageFormatMismatch,

    #[error("source and destination regions overlap")]
    MemCopyOverlap,

    #[error("sub-buffer offset {offset} is not aligned to {align} bytes")]
    MisalignedSubBufferOffset { offset: usize, align: usize },

    #[error("profiling information not available")]
    ProfilingInfoNotAvailable,

    #[error("kernel arguments not set: {0:?}")]
    InvalidKernelArgs(Vec<usize>),

    #[error("kernel argument index {0} out of range")]
    InvalidArgIndex(usize),

    #[error("invalid work dimension {0}")]
    InvalidWorkDimension(u32),

    #[error("invalid global work size: {0}")]
    InvalidGlobalWorkSize(String),

    #[error("invalid work-group size: {0}")]
    InvalidWorkGroupSize(String),

    #[error("invalid work-item size: {0}")]
    InvalidWorkItemSize(String),

    #[error("kernel could not be built for this launch: {0}")]
    InvalidProgramExecutable(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl Error {
    pub(crate) fn invalid_value(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub(crate) fn invalid_mem(msg: impl Into<String>) -> Self {
        Self::InvalidMemObject(msg.into())
    }

    /// Stable negative status code for interop and logs.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidCommandQueue => -36,
            Self::InvalidMemObject(_) => -38,
            Self::InvalidValue(_) => -30,
            Self::InvalidOperation(_) => -59,
            Self::InvalidEventWaitList => -57,
            Self::UpstreamDependencyFailed => -14,
            Self::BackendExecutionFailed(code) | Self::EventFailed(code) => *code,
            Self::OutOfResources => -5,
            Self::InvalidContext => -34,
            Self::InvalidDevice => -33,
            Self::InvalidQueueProperties(_) => -35,
            Self::InvalidBufferSize(_) => -61,
            Self::InvalidImageSize(_) => -40,
            Self::InvalidImageFormat(_) => -39,
            Self::ImageFormatMismatch => -9,
            Self::MemCopyOverlap => -8,
            Self::MisalignedSubBufferOffset { .. } => -13,
            Self::ProfilingInfoNotAvailable => -7,
            Self::InvalidKernelArgs(_) => -52,
            Self::InvalidArgIndex(_) => -49,
            Self::InvalidWorkDimension(_) => -53,
            Self::InvalidGlobalWorkSize(_) => -63,
            Self::InvalidWorkGroupSize(_) => -54,
            Self::InvalidWorkItemSize(_) => -55,
            Self::InvalidProgramExecutable(_) => -45,
            Self::Backend(err) => err.code(),
        }
    }
}
