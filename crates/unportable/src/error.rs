use std::fmt;

use unportable_contracts::{EXIT_ASSERT_FAILED, EXIT_UNKNOWN_ERROR};

/// Why an operation did not produce a result.
///
/// The host only sees the exit code, so the split matters more than the
/// message: a precondition failure tells the caller its request was wrong,
/// anything else is reported as an unknown error.
#[derive(Debug)]
pub enum OpError {
    Precondition(String),
    Internal(anyhow::Error),
}

impl OpError {
    pub fn precondition(message: impl Into<String>) -> Self {
        OpError::Precondition(message.into())
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            OpError::Precondition(_) => EXIT_ASSERT_FAILED,
            OpError::Internal(_) => EXIT_UNKNOWN_ERROR,
        }
    }
}

impl fmt::Display for OpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpError::Precondition(message) => write!(f, "precondition failed: {message}"),
            OpError::Internal(err) => write!(f, "{err:#}"),
        }
    }
}

impl std::error::Error for OpError {}

impl From<anyhow::Error> for OpError {
    fn from(err: anyhow::Error) -> Self {
        OpError::Internal(err)
    }
}

impl From<std::io::Error> for OpError {
    fn from(err: std::io::Error) -> Self {
        OpError::Internal(err.into())
    }
}

pub type OpResult<T> = Result<T, OpError>;

/// Fails with a precondition error unless `cond` holds.
pub fn ensure(cond: bool, message: impl FnOnce() -> String) -> OpResult<()> {
    if cond {
        Ok(())
    } else {
        Err(OpError::Precondition(message()))
    }
}
