use crate::{
    archive::{self, Asset, Catalog},
    compression::Compression,
    guess, tes3, tes4, Error, Format, Result,
};
use std::{
    cell::RefCell,
    fs,
    io::{BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};
use tracing::debug;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// The message of the last error returned by a handle operation on this
/// thread, in the manner of the original C interface's error slot. The slot
/// is thread-local: failures on other threads are not visible here.
#[must_use]
pub fn last_error_message() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

fn remember<T>(result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.to_string()));
    }
    result
}

/// The save-flags bitfield accepted by [`SaveOptions::from_flags`]. Exactly
/// one version flag and exactly one compression flag must be set.
pub mod flags {
    pub const VERSION_TES3: u32 = 0x1;
    pub const VERSION_TES4: u32 = 0x2;
    pub const VERSION_TES5: u32 = 0x4;

    pub const COMPRESS_LEVEL_0: u32 = 0x10;
    pub const COMPRESS_LEVEL_1: u32 = 0x20;
    pub const COMPRESS_LEVEL_2: u32 = 0x40;
    pub const COMPRESS_LEVEL_3: u32 = 0x80;
    pub const COMPRESS_LEVEL_4: u32 = 0x100;
    pub const COMPRESS_LEVEL_5: u32 = 0x200;
    pub const COMPRESS_LEVEL_6: u32 = 0x400;
    pub const COMPRESS_LEVEL_7: u32 = 0x800;
    pub const COMPRESS_LEVEL_8: u32 = 0x1000;
    pub const COMPRESS_LEVEL_9: u32 = 0x2000;
    pub const COMPRESS_NOCHANGE: u32 = 0x4000;

    pub(super) const VERSION_MASK: u32 = 0x7;
    pub(super) const COMPRESSION_MASK: u32 = 0x7FF0;
}

/// The on-disk layout a save should produce.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SaveVersion {
    Tes3,
    Tes4,
    Tes5,
}

/// A validated (version, compression) pair for [`Bsa::save`].
#[derive(Clone, Copy, Debug)]
pub struct SaveOptions {
    version: SaveVersion,
    compression: Compression,
}

impl SaveOptions {
    /// Morrowind archives are never compressed, so `Tes3` demands an
    /// explicit level 0; levels above 9 do not exist.
    pub fn new(version: SaveVersion, compression: Compression) -> Result<Self> {
        match (version, compression) {
            (SaveVersion::Tes3, compression) if !compression.is_store() => Err(Error::InvalidArgs(
                "Morrowind archives cannot be compressed".into(),
            )),
            (_, Compression::Level(level)) if level > 9 => Err(Error::InvalidArgs(format!(
                "compression level {level} is out of range"
            ))),
            _ => Ok(Self {
                version,
                compression,
            }),
        }
    }

    /// Decodes and validates the C interface's flag word.
    pub fn from_flags(bits: u32) -> Result<Self> {
        if bits & !(flags::VERSION_MASK | flags::COMPRESSION_MASK) != 0 {
            return Err(Error::InvalidArgs(format!(
                "unknown save flags: 0x{bits:X}"
            )));
        }

        let version_bits = bits & flags::VERSION_MASK;
        let version = match version_bits {
            flags::VERSION_TES3 => SaveVersion::Tes3,
            flags::VERSION_TES4 => SaveVersion::Tes4,
            flags::VERSION_TES5 => SaveVersion::Tes5,
            _ => {
                return Err(Error::InvalidArgs(
                    "exactly one version flag must be set".into(),
                ))
            }
        };

        let compression_bits = bits & flags::COMPRESSION_MASK;
        if !compression_bits.is_power_of_two() {
            return Err(Error::InvalidArgs(
                "exactly one compression flag must be set".into(),
            ));
        }
        let compression = if compression_bits == flags::COMPRESS_NOCHANGE {
            Compression::NoChange
        } else {
            Compression::Level(compression_bits.trailing_zeros() - 4)
        };

        Self::new(version, compression)
    }

    #[must_use]
    pub fn version(&self) -> SaveVersion {
        self.version
    }

    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }
}

/// An opened archive.
///
/// The handle keeps the catalog in memory and re-opens the backing file for
/// each extract or save, so it holds no file descriptor between calls.
/// Dropping the handle releases everything it owns. A handle is not meant
/// for concurrent use; distinct handles are independent.
#[derive(Debug)]
pub struct Bsa {
    format: Format,
    source_path: PathBuf,
    archive_flags: tes4::ArchiveFlags,
    file_flags: u32,
    catalog: Catalog,
}

impl Bsa {
    /// Opens an archive, probing the leading magic to pick the layout.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        remember(Self::open_inner(path.as_ref()))
    }

    fn open_inner(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mut reader = BufReader::new(file);

        let Some(format) = guess::guess_format(&mut reader) else {
            return Err(Error::parse(
                path,
                "leading bytes match no supported archive layout",
            ));
        };

        match format {
            Format::Tes3 => {
                let catalog = tes3::read(&mut reader, path)?;
                Ok(Self {
                    format,
                    source_path: path.to_owned(),
                    archive_flags: tes4::ArchiveFlags::empty(),
                    file_flags: 0,
                    catalog,
                })
            }
            Format::Tes4(_) => {
                let contents = tes4::read(&mut reader, path)?;
                Ok(Self {
                    format: Format::Tes4(contents.version),
                    source_path: path.to_owned(),
                    archive_flags: contents.archive_flags,
                    file_flags: contents.file_flags,
                    catalog: contents.catalog,
                })
            }
        }
    }

    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[must_use]
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// The archive-flags header word, preserved verbatim; zero for tes3.
    #[must_use]
    pub fn archive_flags(&self) -> u32 {
        self.archive_flags.bits()
    }

    /// The file-flags header word, preserved verbatim; zero for tes3.
    #[must_use]
    pub fn file_flags(&self) -> u32 {
        self.file_flags
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Iterates every asset in path order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.catalog.iter()
    }

    /// Whether an asset exists at the given path. The query is normalized,
    /// so `MESHES/foo.NIF` and `meshes\foo.nif` address the same asset.
    #[must_use]
    pub fn contains_asset(&self, asset_path: &str) -> bool {
        self.catalog.contains(&crate::path::normalize(asset_path))
    }

    /// Looks up one asset by path.
    pub fn asset(&self, asset_path: &str) -> Result<&Asset> {
        remember(self.asset_inner(asset_path))
    }

    fn asset_inner(&self, asset_path: &str) -> Result<&Asset> {
        let normalized = crate::path::normalize(asset_path);
        self.catalog
            .get(&normalized)
            .ok_or(Error::FileNotFound(normalized))
    }

    /// All assets whose path matches the pattern, compiled case-insensitive
    /// and anchored to the whole path.
    pub fn assets_matching(&self, pattern: &str) -> Result<Vec<&Asset>> {
        remember(self.catalog.matching(pattern))
    }

    /// Extracts one asset to exactly `dest`, creating parent directories.
    /// With `overwrite` unset an existing destination is an error.
    pub fn extract_asset(
        &self,
        asset_path: &str,
        dest: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<()> {
        remember(self.extract_asset_inner(asset_path, dest.as_ref(), overwrite))
    }

    fn extract_asset_inner(&self, asset_path: &str, dest: &Path, overwrite: bool) -> Result<()> {
        let asset = self.asset_inner(asset_path)?;
        let mut source = BufReader::new(fs::File::open(&self.source_path)?);
        let payload = self.read_payload(&mut source, asset)?;
        archive::write_extracted(dest, &payload, overwrite)?;
        debug!(path = asset.path(), dest = %dest.display(), "extracted asset");
        Ok(())
    }

    /// Extracts every asset matching the pattern under `dest_dir`,
    /// preserving the archive's directory structure, and returns the paths
    /// extracted. The source file is opened once. On error, files already
    /// extracted stay on disk.
    pub fn extract_assets(
        &self,
        pattern: &str,
        dest_dir: impl AsRef<Path>,
        overwrite: bool,
    ) -> Result<Vec<String>> {
        remember(self.extract_assets_inner(pattern, dest_dir.as_ref(), overwrite))
    }

    fn extract_assets_inner(
        &self,
        pattern: &str,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<Vec<String>> {
        let matches = self.catalog.matching(pattern)?;
        if matches.is_empty() {
            return Ok(Vec::new());
        }

        let mut source = BufReader::new(fs::File::open(&self.source_path)?);
        let mut extracted = Vec::with_capacity(matches.len());
        for asset in matches {
            let payload = self.read_payload(&mut source, asset)?;
            let dest = archive::destination_path(dest_dir, asset.path());
            archive::write_extracted(&dest, &payload, overwrite)?;
            extracted.push(asset.path().to_owned());
        }

        debug!(
            count = extracted.len(),
            dest = %dest_dir.display(),
            "extracted matching assets"
        );
        Ok(extracted)
    }

    /// Extracts one asset into memory, handing the buffer to the caller.
    pub fn extract_to_buffer(&self, asset_path: &str) -> Result<Vec<u8>> {
        remember(self.extract_to_buffer_inner(asset_path))
    }

    fn extract_to_buffer_inner(&self, asset_path: &str) -> Result<Vec<u8>> {
        let asset = self.asset_inner(asset_path)?;
        let mut source = BufReader::new(fs::File::open(&self.source_path)?);
        self.read_payload(&mut source, asset)
    }

    /// The CRC-32 (ISO-HDLC) of an asset's uncompressed payload.
    pub fn checksum(&self, asset_path: &str) -> Result<u32> {
        remember(self.checksum_inner(asset_path))
    }

    fn checksum_inner(&self, asset_path: &str) -> Result<u32> {
        let payload = self.extract_to_buffer_inner(asset_path)?;
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        Ok(hasher.finalize())
    }

    /// Rewrites the archive at `path` and returns the path actually written.
    ///
    /// Saving onto the archive's own path writes `<path>.new` instead and
    /// leaves the swap to the caller; no rename is performed. The handle's
    /// catalog is untouched either way: later extracts still read the
    /// original source file until the archive is re-opened.
    pub fn save(&self, path: impl AsRef<Path>, options: SaveOptions) -> Result<PathBuf> {
        remember(self.save_inner(path.as_ref(), options))
    }

    fn save_inner(&self, path: &Path, options: SaveOptions) -> Result<PathBuf> {
        let out_path = if path == self.source_path {
            let mut staged = path.as_os_str().to_owned();
            staged.push(".new");
            PathBuf::from(staged)
        } else {
            path.to_owned()
        };

        let version = match (self.format, options.version) {
            (Format::Tes3, SaveVersion::Tes3) => None,
            (Format::Tes4(_), SaveVersion::Tes4) => Some(tes4::Version::Tes4),
            (Format::Tes4(_), SaveVersion::Tes5) => Some(tes4::Version::Tes5),
            (Format::Tes3, _) => {
                return Err(Error::InvalidArgs(
                    "a Morrowind archive can only be saved in the tes3 layout".into(),
                ))
            }
            (Format::Tes4(_), SaveVersion::Tes3) => {
                return Err(Error::InvalidArgs(
                    "a tes4-family archive cannot be saved in the tes3 layout".into(),
                ))
            }
        };

        let mut source = BufReader::new(fs::File::open(&self.source_path)?);
        let mut out = BufWriter::new(fs::File::create(&out_path)?);

        match version {
            None => tes3::save(&self.catalog, &mut source, &mut out)?,
            Some(version) => tes4::save(
                &self.catalog,
                &mut source,
                &mut out,
                version,
                self.archive_flags,
                self.file_flags,
                options.compression(),
            )?,
        }

        out.flush()?;
        debug!(
            source = %self.source_path.display(),
            dest = %out_path.display(),
            "saved archive"
        );
        Ok(out_path)
    }

    fn read_payload<R>(&self, source: &mut R, asset: &Asset) -> Result<Vec<u8>>
    where
        R: std::io::Read + std::io::Seek,
    {
        match self.format {
            Format::Tes3 => tes3::read_payload(source, asset),
            Format::Tes4(_) => tes4::read_payload(source, asset, self.archive_flags),
        }
    }
}
