#![doc(alias = "oblivion")]
#![doc(alias = "skyrim")]
#![doc(alias = "fallout")]

//! TES IV: Oblivion through Skyrim: Special Edition.
//!
//! This generation introduced folders and per-file zlib compression. Files
//! and folders are tracked separately: folder records in ascending
//! folder-hash order, each pointing at a block of file records in ascending
//! file-hash order, with one global run of file names trailing the blocks.
//! Skyrim: Special Edition widened the folder record to 24 bytes; this
//! library reads that variant and writes the classic ones.

pub mod hashing;
mod reader;
mod writer;

pub use hashing::{hash_directory, hash_file};
pub(crate) use reader::{read, read_payload};
pub(crate) use writer::save;

/// An on-disk version word of the `BSA\0` family.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Version {
    /// Oblivion.
    Tes4 = 0x67,
    /// Skyrim, also Fallout 3 and Fallout: New Vegas.
    Tes5 = 0x68,
    /// Skyrim: Special Edition.
    Sse = 0x69,
}

impl Version {
    pub const FO3: Version = Version::Tes5;
    pub const FNV: Version = Version::Tes5;

    #[must_use]
    pub(crate) fn from_wire(value: u32) -> Option<Self> {
        match value {
            0x67 => Some(Version::Tes4),
            0x68 => Some(Version::Tes5),
            0x69 => Some(Version::Sse),
            _ => None,
        }
    }

    #[must_use]
    pub(crate) fn wire(self) -> u32 {
        self as u32
    }

    /// Folder records grew an extra dword pair in the SSE revision.
    pub(crate) fn folder_record_size(self) -> u64 {
        match self {
            Version::Tes4 | Version::Tes5 => constants::FOLDER_RECORD_SIZE_X86,
            Version::Sse => constants::FOLDER_RECORD_SIZE_X64,
        }
    }
}

bitflags::bitflags! {
    /// The header's archive-flags word. Only `COMPRESSED` changes this
    /// library's behaviour; everything else rides along verbatim, unknown
    /// bits included.
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ArchiveFlags: u32 {
        const DIRECTORY_STRINGS = 1 << 0;
        const FILE_STRINGS = 1 << 1;
        const COMPRESSED = 1 << 2;
        const RETAIN_DIRECTORY_NAMES = 1 << 3;
        const RETAIN_FILE_NAMES = 1 << 4;
        const RETAIN_FILE_NAME_OFFSETS = 1 << 5;
        const XBOX_ARCHIVE = 1 << 6;
        const RETAIN_STRINGS_DURING_STARTUP = 1 << 7;
        const EMBEDDED_FILE_NAMES = 1 << 8;
        const XBOX_COMPRESSED = 1 << 9;

        const _ = !0;
    }
}

impl ArchiveFlags {
    #[must_use]
    pub fn compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }
}

pub(crate) mod constants {
    pub const HEADER_SIZE: u64 = 0x24;
    pub const FOLDER_RECORD_OFFSET: u32 = 36;
    pub const FOLDER_RECORD_SIZE_X86: u64 = 0x10;
    pub const FOLDER_RECORD_SIZE_X64: u64 = 0x18;
    pub const FILE_RECORD_SIZE: u64 = 0x10;

    /// High bit on a file record's size field: this file's compression state
    /// is the opposite of the archive-wide `COMPRESSED` flag.
    pub const FILE_INVERT_COMPRESSED: u32 = 0x4000_0000;
}

/// Whether a file record describes a compressed payload, given the archive
/// flag and the record's own invert bit.
#[must_use]
pub(crate) fn stored_compressed(flags: ArchiveFlags, size: u32) -> bool {
    flags.compressed() != (size & constants::FILE_INVERT_COMPRESSED != 0)
}

/// The byte count actually occupied by a payload, with the invert bit
/// masked off.
#[must_use]
pub(crate) fn stored_size(size: u32) -> u32 {
    size & !constants::FILE_INVERT_COMPRESSED
}
