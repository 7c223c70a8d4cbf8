use crate::{Error, Result};
use regex::Regex;
use std::{
    collections::BTreeMap,
    fs,
    io::Write as _,
    path::{Path, PathBuf},
};

/// A single file stored inside an archive.
#[derive(Clone, Debug)]
pub struct Asset {
    pub(crate) path: String,
    pub(crate) hash: u64,
    pub(crate) size: u32,
    pub(crate) offset: u64,
}

impl Asset {
    /// The normalized path: lowercase, backslash-separated, unique within
    /// its archive.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The format-specific 64-bit path hash as stored on disk.
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The raw on-disk size field. For tes4/SSE archives bit `0x40000000`
    /// inverts the archive-wide compression flag for this file; mask it off
    /// to get the stored byte count.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Absolute byte offset of the payload within the archive file.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// The in-memory asset catalog, keyed by normalized path.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    assets: BTreeMap<String, Asset>,
}

impl Catalog {
    /// Inserting a duplicate path hands back the rejected asset; readers
    /// treat that as a malformed archive.
    pub fn insert(&mut self, asset: Asset) -> Option<Asset> {
        if self.assets.contains_key(&asset.path) {
            return Some(asset);
        }
        self.assets.insert(asset.path.clone(), asset);
        None
    }

    pub fn get(&self, normalized_path: &str) -> Option<&Asset> {
        self.assets.get(normalized_path)
    }

    pub fn contains(&self, normalized_path: &str) -> bool {
        self.assets.contains_key(normalized_path)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Iterates assets in path order.
    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.values()
    }

    /// All assets whose full path matches `pattern`, compiled
    /// case-insensitive and anchored to the whole path. An empty or
    /// malformed pattern is `InvalidArgs`.
    pub fn matching(&self, pattern: &str) -> Result<Vec<&Asset>> {
        let regex = build_matcher(pattern)?;
        Ok(self.iter().filter(|asset| regex.is_match(&asset.path)).collect())
    }
}

pub(crate) fn build_matcher(pattern: &str) -> Result<Regex> {
    if pattern.is_empty() {
        return Err(Error::InvalidArgs(
            "an empty pattern can never match an asset path".into(),
        ));
    }
    Regex::new(&format!("(?i)^(?:{pattern})$"))
        .map_err(|err| Error::InvalidArgs(err.to_string()))
}

/// Maps an asset path onto a destination directory, converting the
/// archive's backslash separators into native path components.
pub(crate) fn destination_path(dest_dir: &Path, asset_path: &str) -> PathBuf {
    let mut out = dest_dir.to_owned();
    for component in asset_path.split('\\') {
        out.push(component);
    }
    out
}

/// Writes an extracted payload, creating parent directories on the way.
/// An existing destination is an error unless `overwrite` is set.
pub(crate) fn write_extracted(dest: &Path, bytes: &[u8], overwrite: bool) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if !overwrite && dest.exists() {
        return Err(Error::Filesystem(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("the file \"{}\" already exists", dest.display()),
        )));
    }

    let mut out = fs::File::create(dest)?;
    out.write_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(path: &str) -> Asset {
        Asset {
            path: path.to_owned(),
            hash: 0,
            size: 0,
            offset: 0,
        }
    }

    fn sample() -> Catalog {
        let mut catalog = Catalog::default();
        for path in [
            "meshes\\base_anim.nif",
            "meshes\\m\\probe.nif",
            "textures\\tx_menubook.dds",
        ] {
            assert!(catalog.insert(asset(path)).is_none());
        }
        catalog
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut catalog = sample();
        assert!(catalog.insert(asset("meshes\\m\\probe.nif")).is_some());
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn match_everything() -> anyhow::Result<()> {
        let catalog = sample();
        assert_eq!(catalog.matching(".+")?.len(), 3);
        Ok(())
    }

    #[test]
    fn matching_is_case_insensitive_and_anchored() -> anyhow::Result<()> {
        let catalog = sample();
        let hits = catalog.matching(r"MESHES\\.+\.NIF")?;
        assert_eq!(hits.len(), 2);
        // a prefix alone is not a match
        assert!(catalog.matching("meshes")?.is_empty());
        Ok(())
    }

    #[test]
    fn empty_and_malformed_patterns_are_invalid() {
        let catalog = sample();
        assert!(matches!(catalog.matching(""), Err(Error::InvalidArgs(_))));
        assert!(matches!(catalog.matching("("), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn destination_paths_use_native_components() {
        let dest = destination_path(Path::new("out"), "meshes\\m\\probe.nif");
        let expected: PathBuf = ["out", "meshes", "m", "probe.nif"].iter().collect();
        assert_eq!(dest, expected);
    }

    #[test]
    fn overwrite_false_refuses_existing_targets() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let target = dir.path().join("file.bin");
        write_extracted(&target, b"first", false)?;
        let err = write_extracted(&target, b"second", false).unwrap_err();
        assert!(matches!(err, Error::Filesystem(_)));
        write_extracted(&target, b"second", true)?;
        assert_eq!(fs::read(&target)?, b"second");
        Ok(())
    }
}
