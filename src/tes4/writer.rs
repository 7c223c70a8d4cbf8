use crate::{
    archive::{Asset, Catalog},
    compression::{self, Compression},
    io::{Sink, Source},
    path as vpath, strings,
    tes4::{constants, hashing, stored_compressed, stored_size, ArchiveFlags, Version},
    Error, Result,
};
use std::{
    collections::BTreeMap,
    io::{Read, Seek, SeekFrom, Write},
};
use tracing::debug;

const BSA_MAGIC: u32 = u32::from_le_bytes(*b"BSA\0");

/// How one payload travels from the source archive into the output.
enum Transfer {
    /// Stored state already matches the target: copy the stored bytes,
    /// size prefix included when present.
    Copy,
    /// Stored compressed, wanted raw: inflate while streaming.
    Inflate { uncompressed_len: u32 },
    /// Stored raw, wanted compressed: deflated up front because the record
    /// offsets need the packed size before any payload is written.
    Deflate { packed: Vec<u8> },
}

struct FilePlan<'a> {
    asset: &'a Asset,
    name: Vec<u8>,
    transfer: Transfer,
    size_field: u32,
}

struct FolderPlan<'a> {
    name: Vec<u8>,
    files: Vec<FilePlan<'a>>,
}

/// Rewrites an archive in one of the classic layouts (0x67/0x68). Folders go
/// out in ascending folder-hash order, each folder's files in ascending
/// file-hash order, and payloads stream from the source in that same visit
/// order. Payloads whose stored state already matches the requested
/// compression are copied verbatim; the rest are re-encoded on the way
/// through.
pub(crate) fn save<R, W>(
    catalog: &Catalog,
    source: &mut R,
    out: &mut W,
    version: Version,
    source_flags: ArchiveFlags,
    file_flags: u32,
    compression: Compression,
) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    debug_assert!(version != Version::Sse);

    let out_flags = match compression {
        Compression::NoChange => source_flags,
        Compression::Level(0) => source_flags.difference(ArchiveFlags::COMPRESSED),
        Compression::Level(_) => source_flags.union(ArchiveFlags::COMPRESSED),
    };

    let folders = plan_folders(catalog, source, source_flags, out_flags, compression)?;

    let folder_count = u32::try_from(folders.len())?;
    let file_count = u32::try_from(folders.values().map(|f| f.files.len()).sum::<usize>())?;
    let total_folder_name_len =
        u32::try_from(folders.values().map(|f| f.name.len() as u64 + 1).sum::<u64>())?;
    let total_file_name_len = u32::try_from(
        folders
            .values()
            .flat_map(|f| &f.files)
            .map(|f| f.name.len() as u64 + 1)
            .sum::<u64>(),
    )?;

    let record_block_start = constants::HEADER_SIZE
        + constants::FOLDER_RECORD_SIZE_X86 * u64::from(folder_count)
        + u64::from(total_file_name_len);
    let start_of_payload = constants::HEADER_SIZE
        + constants::FOLDER_RECORD_SIZE_X86 * u64::from(folder_count)
        + u64::from(total_folder_name_len)
        + u64::from(folder_count)
        + u64::from(total_file_name_len)
        + constants::FILE_RECORD_SIZE * u64::from(file_count);

    debug!(
        version = ?version,
        folders = folder_count,
        files = file_count,
        compressed = out_flags.compressed(),
        "writing tes4 archive"
    );

    let mut sink = Sink::new(out);
    sink.write(&(
        BSA_MAGIC,
        version.wire(),
        constants::FOLDER_RECORD_OFFSET,
        out_flags.bits(),
        folder_count,
        file_count,
        total_folder_name_len,
        total_file_name_len,
        file_flags,
    ))?;

    // Folder records, with the offset measured from the start of the file
    // plus the total file-name length, as the engines expect.
    let mut block_pos: u64 = 0;
    for (&hash, folder) in &folders {
        sink.write(&(
            hash,
            u32::try_from(folder.files.len())?,
            u32::try_from(record_block_start + block_pos)?,
        ))?;
        block_pos += 1
            + folder.name.len() as u64
            + 1
            + constants::FILE_RECORD_SIZE * folder.files.len() as u64;
    }

    // File record blocks.
    let mut data_offset = start_of_payload;
    for folder in folders.values() {
        sink.write_protocol::<strings::BZString>(&folder.name.as_slice().into())?;
        for file in &folder.files {
            sink.write(&(file.asset.hash(), file.size_field, u32::try_from(data_offset)?))?;
            data_offset += u64::from(stored_size(file.size_field));
        }
    }

    // File name block, same visit order as the records.
    for folder in folders.values() {
        for file in &folder.files {
            sink.write_protocol::<strings::ZString>(&file.name.as_slice().into())?;
        }
    }

    // Payloads.
    for folder in folders.values() {
        for file in &folder.files {
            write_payload(source, &mut sink, file, source_flags)?;
        }
    }

    Ok(())
}

fn plan_folders<'a, R>(
    catalog: &'a Catalog,
    source: &mut R,
    source_flags: ArchiveFlags,
    out_flags: ArchiveFlags,
    compression: Compression,
) -> Result<BTreeMap<u64, FolderPlan<'a>>>
where
    R: Read + Seek,
{
    let mut folders: BTreeMap<u64, FolderPlan<'a>> = BTreeMap::new();

    for asset in catalog.iter() {
        let encoded = strings::from_utf8(asset.path())?;
        let (folder, name) = vpath::split_folder(encoded.as_slice().into());

        let src_compressed = stored_compressed(source_flags, asset.size());
        let target_compressed = match compression {
            Compression::NoChange => src_compressed,
            Compression::Level(0) => false,
            Compression::Level(_) => true,
        };

        let (transfer, out_stored_len) = if src_compressed == target_compressed {
            (Transfer::Copy, u64::from(stored_size(asset.size())))
        } else if src_compressed {
            let uncompressed_len = read_size_prefix(source, asset)?;
            (
                Transfer::Inflate { uncompressed_len },
                u64::from(uncompressed_len),
            )
        } else {
            let Compression::Level(level) = compression else {
                unreachable!("state changes only happen at an explicit level");
            };
            let raw = read_stored(source, asset)?;
            let packed = compression::deflate(&raw, level)?;
            let len = packed.len() as u64 + 4;
            (Transfer::Deflate { packed }, len)
        };

        let mut size_field = u32::try_from(out_stored_len)?;
        if (size_field & !constants::FILE_INVERT_COMPRESSED) != size_field {
            return Err(Error::InvalidArgs(
                "a payload is too large for a tes4 size field".into(),
            ));
        }
        if target_compressed != out_flags.compressed() {
            size_field |= constants::FILE_INVERT_COMPRESSED;
        }

        folders
            .entry(hashing::hash_directory(folder))
            .or_insert_with(|| FolderPlan {
                name: folder.to_vec(),
                files: Vec::new(),
            })
            .files
            .push(FilePlan {
                asset,
                name: name.to_vec(),
                transfer,
                size_field,
            });
    }

    for folder in folders.values_mut() {
        folder.files.sort_unstable_by_key(|file| file.asset.hash());
    }
    Ok(folders)
}

fn read_size_prefix<R>(source: &mut R, asset: &Asset) -> Result<u32>
where
    R: Read + Seek,
{
    source.seek(SeekFrom::Start(asset.offset()))?;
    Source::new(source).read().map_err(Error::Filesystem)
}

fn read_stored<R>(source: &mut R, asset: &Asset) -> Result<Vec<u8>>
where
    R: Read + Seek,
{
    source.seek(SeekFrom::Start(asset.offset()))?;
    Source::new(source).read_vec(stored_size(asset.size()) as usize)
}

fn write_payload<R, W>(
    source: &mut R,
    sink: &mut Sink<'_, W>,
    file: &FilePlan<'_>,
    source_flags: ArchiveFlags,
) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    match &file.transfer {
        Transfer::Copy => {
            source.seek(SeekFrom::Start(file.asset.offset()))?;
            let mut remaining = u64::from(stored_size(file.asset.size()));
            let mut buffer = [0u8; 8192];
            while remaining > 0 {
                #[allow(clippy::cast_possible_truncation)]
                let chunk = remaining.min(buffer.len() as u64) as usize;
                source.read_exact(&mut buffer[..chunk])?;
                sink.write_bytes(&buffer[..chunk])?;
                remaining -= chunk as u64;
            }
        }
        Transfer::Inflate { uncompressed_len } => {
            let raw = super::read_payload(source, file.asset, source_flags)?;
            debug_assert_eq!(raw.len(), *uncompressed_len as usize);
            sink.write_bytes(&raw)?;
        }
        Transfer::Deflate { packed } => {
            let raw_len = stored_size(file.asset.size());
            sink.write(&raw_len)?;
            sink.write_bytes(packed)?;
        }
    }
    Ok(())
}
