//! Structural failures while reading a package.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use thiserror::Error;

/// Reading a package failed before a verdict could be produced.
///
/// Digest and signature mismatches are not errors; they are reported
/// as a [`crate::Verdict`].
#[derive(Debug, Error)]
pub enum PackageError {
    /// The stream ended before a complete lead; this is not a package.
    #[error("not a package: {0}")]
    NotFound(String),
    /// Bytes are present but do not form a valid package.
    #[error("{0}")]
    Malformed(String),
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl PackageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PackageError::NotFound(_))
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        PackageError::Malformed(msg.into())
    }
}

impl From<binread::Error> for PackageError {
    fn from(e: binread::Error) -> Self {
        match e {
            binread::Error::Io(e) => PackageError::Io(e),
            e => PackageError::Malformed(format!("{:?}", e)),
        }
    }
}
