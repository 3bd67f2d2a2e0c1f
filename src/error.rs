use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = ImagerError> = std::result::Result<T, E>;

/// Coarse classification of an [`ImagerError`].
///
/// An imager remembers the kind of the first error it reported and refuses
/// further work until it is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    FileIo,
    MemoryNotAllocated,
    FunctionNotAvailable,
    Protocol,
    Fft,
}

#[derive(Error, Debug)]
pub enum ImagerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("file I/O error on {path}: {message}")]
    FileIo { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),

    #[error(transparent)]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),

    #[error("buffer too small for {what}: need {needed} elements, have {available}")]
    MemoryNotAllocated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("function not available: {0}")]
    FunctionNotAvailable(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("FFT failure: {0}")]
    Fft(String),

    #[error("imager is unusable after an earlier {0:?} error; reset it first")]
    AlreadyFailed(ErrorKind),
}

impl ImagerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImagerError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ImagerError::FileIo { .. }
            | ImagerError::Io(_)
            | ImagerError::ReadNpy(_)
            | ImagerError::WriteNpy(_) => ErrorKind::FileIo,
            ImagerError::MemoryNotAllocated { .. } => ErrorKind::MemoryNotAllocated,
            ImagerError::FunctionNotAvailable(_) => ErrorKind::FunctionNotAvailable,
            ImagerError::Protocol(_) => ErrorKind::Protocol,
            ImagerError::Fft(_) => ErrorKind::Fft,
            ImagerError::AlreadyFailed(kind) => *kind,
        }
    }

    pub(crate) fn file_io(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ImagerError::FileIo {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
