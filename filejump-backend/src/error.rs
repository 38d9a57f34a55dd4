use filejump_core::FileJumpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("directory not found")]
    DirNotFound,
    #[error("is a directory not a file")]
    IsDir,
    #[error("{0:?} is not a file")]
    NotAFile(String),
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
    #[error("directory not empty")]
    DirectoryNotEmpty,
    #[error("can't purge root directory")]
    CantPurgeRoot,
    #[error("upload size mismatch: declared {expected} bytes, read {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("{0} is not supported by this remote")]
    Unsupported(&'static str),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Api(#[from] FileJumpError),
}

pub type Result<T, E = BackendError> = std::result::Result<T, E>;

impl BackendError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::ObjectNotFound | BackendError::DirNotFound)
    }
}
