#![warn(clippy::pedantic)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

//! A library for reading, inspecting, extracting from, and rewriting
//! Bethesda Softworks Archive (BSA) files.
//!
//! Three on-disk layouts are supported: the Morrowind layout
//! ([`tes3`]), the Oblivion/Fallout 3/Fallout NV/Skyrim layout
//! ([`tes4`]), and the Skyrim Special Edition variant of the latter
//! (read-only).
//!
//! ```no_run
//! use bsalib::{flags, Bsa, SaveOptions};
//!
//! fn example() -> bsalib::Result<()> {
//!     let bsa = Bsa::open("Morrowind.bsa")?;
//!     for asset in bsa.assets_matching(r"meshes\\.+\.nif")? {
//!         println!("{} ({} bytes)", asset.path(), asset.size());
//!     }
//!     bsa.extract_asset("meshes/base_anim.nif", "/tmp/base_anim.nif", true)?;
//!     let options = SaveOptions::from_flags(flags::VERSION_TES3 | flags::COMPRESS_LEVEL_0)?;
//!     bsa.save("rebuilt.bsa", options)?;
//!     Ok(())
//! }
//! ```

mod archive;
mod compression;
mod guess;
mod handle;
mod io;
mod path;
mod strings;
pub mod tes3;
pub mod tes4;

#[cfg(test)]
mod testutil;

pub use archive::Asset;
pub use compression::Compression;
pub use handle::{flags, last_error_message, Bsa, SaveOptions, SaveVersion};

use bstr::BString;
use std::{collections::TryReserveError, io as stdio, num::TryFromIntError, path::PathBuf};

/// The layout generation of an opened archive.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Format {
    Tes3,
    Tes4(tes4::Version),
}

/// Stable numeric codes for each [`Error`] kind, in the order the original
/// C interface assigned them.
pub mod codes {
    pub const OK: u32 = 0;
    pub const INVALID_ARGS: u32 = 1;
    pub const NO_MEM: u32 = 2;
    pub const FILESYSTEM_ERROR: u32 = 3;
    pub const BAD_STRING: u32 = 4;
    pub const ZLIB_ERROR: u32 = 5;
    pub const PARSE_FAIL: u32 = 6;
    pub const FILE_NOT_FOUND: u32 = 7;
}

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("memory allocation failed")]
    NoMemory,

    #[error(transparent)]
    Filesystem(#[from] stdio::Error),

    #[error("\"{0}\" cannot be represented in Windows-1252")]
    BadString(BString),

    #[error("zlib error: {0}")]
    Zlib(String),

    #[error("failed to parse \"{path}\": {reason}")]
    ParseFail { path: PathBuf, reason: String },

    #[error("no asset at \"{0}\" exists in the archive")]
    FileNotFound(String),
}

impl Error {
    /// The numeric code the C interface reports for this error.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidArgs(_) => codes::INVALID_ARGS,
            Error::NoMemory => codes::NO_MEM,
            Error::Filesystem(_) => codes::FILESYSTEM_ERROR,
            Error::BadString(_) => codes::BAD_STRING,
            Error::Zlib(_) => codes::ZLIB_ERROR,
            Error::ParseFail { .. } => codes::PARSE_FAIL,
            Error::FileNotFound(_) => codes::FILE_NOT_FOUND,
        }
    }

    /// Classifies an I/O failure raised while decoding archive structures:
    /// end-of-file there means a truncated record, i.e. a malformed archive
    /// rather than a filesystem fault.
    pub(crate) fn parse_or_io(err: stdio::Error, path: &std::path::Path) -> Self {
        if err.kind() == stdio::ErrorKind::UnexpectedEof {
            Self::parse(path, "unexpected end of file inside a record")
        } else {
            Error::Filesystem(err)
        }
    }

    pub(crate) fn parse(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Error::ParseFail {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Error::NoMemory
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Error::InvalidArgs("a size or offset does not fit its 32-bit record field".into())
    }
}

pub type Result<T> = core::result::Result<T, Error>;

pub const VERSION_MAJOR: u32 = 2;
pub const VERSION_MINOR: u32 = 0;
pub const VERSION_PATCH: u32 = 0;

#[must_use]
pub fn library_version() -> (u32, u32, u32) {
    (VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}

/// Whether a caller built against the given library version can use this one:
/// same major version, and a minor version no newer than ours.
#[must_use]
pub fn is_compatible(major: u32, minor: u32, _patch: u32) -> bool {
    major == VERSION_MAJOR && minor <= VERSION_MINOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(Error::InvalidArgs(String::new()).code(), 1);
        assert_eq!(Error::NoMemory.code(), 2);
        assert_eq!(
            Error::Filesystem(stdio::Error::from(stdio::ErrorKind::NotFound)).code(),
            3
        );
        assert_eq!(Error::BadString(BString::from("x")).code(), 4);
        assert_eq!(Error::Zlib(String::new()).code(), 5);
        assert_eq!(
            Error::ParseFail {
                path: PathBuf::new(),
                reason: String::new(),
            }
            .code(),
            6
        );
        assert_eq!(Error::FileNotFound(String::new()).code(), 7);
    }

    #[test]
    fn truncation_is_a_parse_failure() {
        let eof = stdio::Error::from(stdio::ErrorKind::UnexpectedEof);
        let err = Error::parse_or_io(eof, std::path::Path::new("test.bsa"));
        assert!(matches!(err, Error::ParseFail { .. }));

        let denied = stdio::Error::from(stdio::ErrorKind::PermissionDenied);
        let err = Error::parse_or_io(denied, std::path::Path::new("test.bsa"));
        assert!(matches!(err, Error::Filesystem(_)));
    }

    #[test]
    fn version_compatibility() {
        let (major, minor, patch) = library_version();
        assert!(is_compatible(major, minor, patch));
        assert!(!is_compatible(major + 1, 0, 0));
        assert!(!is_compatible(major, minor + 1, 0));
    }
}
