use thiserror::Error;

/// Coarse classification of a [`HalError`], stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    InvalidArgument,
    OutOfRange,
    NotFound,
    ResourceExhausted,
    FailedPrecondition,
    Unavailable,
    Incompatible,
    Internal,
}

#[derive(Debug, Error)]
pub enum HalError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of range: {0}")]
    OutOfRange(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("incompatible: {0}")]
    Incompatible(String),
    #[error("internal: {0}")]
    Internal(String),
    #[error("{call} failed with {name} ({code}): {message}")]
    Driver {
        call: &'static str,
        code: i32,
        name: String,
        message: String,
    },
}

pub type HalResult<T> = Result<T, HalError>;

impl HalError {
    pub fn code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::OutOfRange(_) => StatusCode::OutOfRange,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::ResourceExhausted(_) => StatusCode::ResourceExhausted,
            Self::FailedPrecondition(_) => StatusCode::FailedPrecondition,
            Self::Unavailable(_) => StatusCode::Unavailable,
            Self::Incompatible(_) => StatusCode::Incompatible,
            Self::Internal(_) => StatusCode::Internal,
            Self::Driver { .. } => StatusCode::Internal,
        }
    }

    /// Prefixes the message with `context`; driver errors keep their call
    /// name and code and gain the context in the message.
    pub fn annotate(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::InvalidArgument(m) => Self::InvalidArgument(format!("{context}: {m}")),
            Self::OutOfRange(m) => Self::OutOfRange(format!("{context}: {m}")),
            Self::NotFound(m) => Self::NotFound(format!("{context}: {m}")),
            Self::ResourceExhausted(m) => Self::ResourceExhausted(format!("{context}: {m}")),
            Self::FailedPrecondition(m) => Self::FailedPrecondition(format!("{context}: {m}")),
            Self::Unavailable(m) => Self::Unavailable(format!("{context}: {m}")),
            Self::Incompatible(m) => Self::Incompatible(format!("{context}: {m}")),
            Self::Internal(m) => Self::Internal(format!("{context}: {m}")),
            Self::Driver {
                call,
                code,
                name,
                message,
            } => Self::Driver {
                call,
                code,
                name,
                message: format!("{context}: {message}"),
            },
        }
    }
}

impl From<std::collections::TryReserveError> for HalError {
    fn from(err: std::collections::TryReserveError) -> Self {
        HalError::ResourceExhausted(format!("host allocation failed: {err}"))
    }
}

/// `Vec::with_capacity` that reports allocation failure instead of aborting.
pub(crate) fn try_with_capacity<T>(capacity: usize) -> HalResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(capacity)?;
    Ok(v)
}
