// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the grootfs engine.

use std::io;

use libc::c_int;

/// Engine error type. Backing syscall failures keep their errno; problems
/// with the fake-record store itself (wrong size, unexpected xattr errors)
/// surface as an I/O error to the caller.
#[derive(thiserror::Error, Debug)]
pub enum FsError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("fake record store: {0}")]
    Record(String),
}

pub type FsResult<T> = Result<T, FsError>;

/// Map an engine error onto the errno the kernel expects back.
pub fn errno_from_fs_error(err: &FsError) -> c_int {
    match err {
        FsError::Io(io) => io.raw_os_error().unwrap_or(libc::EIO),
        FsError::Record(_) => libc::EIO,
    }
}

impl FsError {
    pub(crate) fn last_os_error() -> FsError {
        FsError::Io(io::Error::last_os_error())
    }

    pub(crate) fn from_errno(errno: c_int) -> FsError {
        FsError::Io(io::Error::from_raw_os_error(errno))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_keeps_os_errors() {
        let err = FsError::from_errno(libc::ENOENT);
        assert_eq!(errno_from_fs_error(&err), libc::ENOENT);
    }

    #[test]
    fn record_errors_become_eio() {
        let err = FsError::Record("wrong xattr size".into());
        assert_eq!(errno_from_fs_error(&err), libc::EIO);
    }
}
