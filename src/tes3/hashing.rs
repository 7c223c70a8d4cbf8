use crate::path;
use bstr::{BStr, BString};
use std::cmp::Ordering;

/// A Morrowind path hash: an xor fold over the first half of the path and an
/// xor/rotate fold over the second half.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hash {
    pub lo: u32,
    pub hi: u32,
}

impl Hash {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The hash as the engine stores it: a little-endian u64 whose low dword
    /// is the first-half fold.
    #[must_use]
    pub fn value(&self) -> u64 {
        (u64::from(self.hi) << 32) | u64::from(self.lo)
    }

    #[must_use]
    pub fn from_value(value: u64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self {
            lo: value as u32,
            hi: (value >> 32) as u32,
        }
    }

    /// The engine's hash-table order compares the first-half dword before
    /// the second-half dword, which is not ascending-u64 order on
    /// [`value`](Self::value).
    fn sort_key(&self) -> u64 {
        (u64::from(self.lo) << 32) | u64::from(self.hi)
    }
}

impl PartialEq for Hash {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Hash {}

impl PartialOrd for Hash {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Hash {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

#[must_use]
pub fn hash_file(path: &BStr) -> Hash {
    let mut path = BString::new(path.to_vec());
    hash_file_in_place(&mut path)
}

pub fn hash_file_in_place(path: &mut BString) -> Hash {
    path::normalize_in_place(path);
    let midpoint = path.len() / 2;
    let mut h = Hash::new();
    let mut offset: u32 = 0;

    for &b in &path[..midpoint] {
        h.lo ^= u32::from(b) << (offset & 0x1F);
        offset += 8;
    }

    offset = 0;
    for &b in &path[midpoint..] {
        let rot = u32::from(b) << (offset & 0x1F);
        h.hi = u32::rotate_right(h.hi ^ rot, rot & 0x1F);
        offset += 8;
    }

    h
}
