use thiserror::Error;

/// Errors from the shared state-tree helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommonError {
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

pub type CommonResult<T> = Result<T, CommonError>;
