use crate::{
    archive::{Asset, Catalog},
    compression,
    io::Source,
    path as vpath, strings,
    tes4::{constants, hashing, stored_compressed, stored_size, ArchiveFlags, Version},
    Error, Result,
};
use bstr::BString;
use std::{
    io::{Read, Seek, SeekFrom},
    path::Path,
};
use tracing::debug;

const BSA_MAGIC: u32 = u32::from_le_bytes(*b"BSA\0");

#[derive(Debug)]
pub(crate) struct Contents {
    pub version: Version,
    pub archive_flags: ArchiveFlags,
    pub file_flags: u32,
    pub catalog: Catalog,
}

struct Header {
    version: Version,
    archive_flags: ArchiveFlags,
    folder_count: u32,
    file_count: u32,
    total_folder_name_len: u32,
    total_file_name_len: u32,
    file_flags: u32,
}

pub(crate) fn read<R>(stream: &mut R, archive_path: &Path) -> Result<Contents>
where
    R: Read + Seek,
{
    let file_len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;

    let mut source = Source::new(stream);
    let header = read_header(&mut source, archive_path)?;

    let names_start = constants::HEADER_SIZE
        + header.version.folder_record_size() * u64::from(header.folder_count)
        + u64::from(header.folder_count)
        + u64::from(header.total_folder_name_len)
        + constants::FILE_RECORD_SIZE * u64::from(header.file_count);

    let mut catalog = Catalog::default();
    let mut name_cursor: u64 = 0;
    for _ in 0..header.folder_count {
        read_folder(
            &mut source,
            &header,
            names_start,
            &mut name_cursor,
            &mut catalog,
            file_len,
            archive_path,
        )?;
    }

    if catalog.len() != header.file_count as usize {
        return Err(Error::parse(
            archive_path,
            format!(
                "folder records describe {} files but the header promises {}",
                catalog.len(),
                header.file_count
            ),
        ));
    }

    debug!(
        path = %archive_path.display(),
        version = ?header.version,
        folders = header.folder_count,
        files = catalog.len(),
        compressed = header.archive_flags.compressed(),
        "opened tes4 archive"
    );
    Ok(Contents {
        version: header.version,
        archive_flags: header.archive_flags,
        file_flags: header.file_flags,
        catalog,
    })
}

fn read_header<R>(source: &mut Source<'_, R>, archive_path: &Path) -> Result<Header>
where
    R: Read + Seek,
{
    let (
        magic,
        version,
        folder_record_offset,
        archive_flags,
        folder_count,
        file_count,
        total_folder_name_len,
        total_file_name_len,
        file_flags,
    ): (u32, u32, u32, u32, u32, u32, u32, u32, u32) = source
        .read()
        .map_err(|err| Error::parse_or_io(err, archive_path))?;

    if magic != BSA_MAGIC {
        return Err(Error::parse(
            archive_path,
            format!("invalid magic in file header: 0x{magic:08X}"),
        ));
    }
    let Some(version) = Version::from_wire(version) else {
        return Err(Error::parse(
            archive_path,
            format!("unrecognized version in file header: 0x{version:02X}"),
        ));
    };
    if folder_record_offset != constants::FOLDER_RECORD_OFFSET {
        return Err(Error::parse(
            archive_path,
            format!("folder records start at {folder_record_offset}, not 36"),
        ));
    }

    Ok(Header {
        version,
        archive_flags: ArchiveFlags::from_bits_retain(archive_flags),
        folder_count,
        file_count,
        total_folder_name_len,
        total_file_name_len,
        file_flags,
    })
}

#[allow(clippy::too_many_arguments)]
fn read_folder<R>(
    source: &mut Source<'_, R>,
    header: &Header,
    names_start: u64,
    name_cursor: &mut u64,
    catalog: &mut Catalog,
    file_len: u64,
    archive_path: &Path,
) -> Result<()>
where
    R: Read + Seek,
{
    let (_folder_hash, file_count): (u64, u32) = source
        .read()
        .map_err(|err| Error::parse_or_io(err, archive_path))?;
    let block_offset = match header.version {
        Version::Tes4 | Version::Tes5 => {
            let offset: u32 = source
                .read()
                .map_err(|err| Error::parse_or_io(err, archive_path))?;
            u64::from(offset)
        }
        Version::Sse => {
            let (_unk, offset): (u32, u64) = source
                .read()
                .map_err(|err| Error::parse_or_io(err, archive_path))?;
            offset
        }
    };

    // The stored offset counts the file-name block for some reason; strip it
    // to land on the folder's record block.
    let block_start = block_offset
        .checked_sub(u64::from(header.total_file_name_len))
        .ok_or_else(|| Error::parse(archive_path, "folder record offset underflows its baseline"))?;

    source
        .save_restore_position(|source| -> Result<()> {
            source
                .seek_absolute(block_start)
                .map_err(|err| Error::parse_or_io(err, archive_path))?;
            let folder_name = source
                .read_protocol::<strings::BZString>()
                .map_err(|err| Error::parse_or_io(err, archive_path))?;
            let folder_utf8 = strings::to_utf8(&folder_name)?;

            for _ in 0..file_count {
                read_file_entry(
                    source,
                    &folder_utf8,
                    names_start,
                    name_cursor,
                    catalog,
                    file_len,
                    archive_path,
                )?;
            }
            Ok(())
        })
        .map_err(|err| Error::parse_or_io(err, archive_path))?
}

#[allow(clippy::too_many_arguments)]
fn read_file_entry<R>(
    source: &mut Source<'_, R>,
    folder_utf8: &str,
    names_start: u64,
    name_cursor: &mut u64,
    catalog: &mut Catalog,
    file_len: u64,
    archive_path: &Path,
) -> Result<()>
where
    R: Read + Seek,
{
    let (stored_hash, size, data_offset): (u64, u32, u32) = source
        .read()
        .map_err(|err| Error::parse_or_io(err, archive_path))?;

    let file_name: BString = source
        .save_restore_position(|source| -> std::io::Result<BString> {
            source.seek_absolute(names_start + *name_cursor)?;
            source.read_protocol::<strings::ZString>()
        })
        .map_err(|err| Error::parse_or_io(err, archive_path))?
        .map_err(|err| Error::parse_or_io(err, archive_path))?;
    *name_cursor += file_name.len() as u64 + 1;

    // Engines find files by hash; a record whose hash is not the hash of its
    // own name is unreachable, so the archive is junk.
    let computed = hashing::hash_file(file_name.as_ref());
    if computed != stored_hash {
        return Err(Error::parse(
            archive_path,
            format!(
                "stored hash {stored_hash:016X} of \"{file_name}\" disagrees with computed {computed:016X}"
            ),
        ));
    }

    if u64::from(data_offset) + u64::from(stored_size(size)) > file_len {
        return Err(Error::parse(
            archive_path,
            format!("payload of \"{file_name}\" runs past the end of the file"),
        ));
    }

    let name_utf8 = strings::to_utf8(&file_name)?;
    let path = if folder_utf8.is_empty() {
        vpath::normalize(&name_utf8)
    } else {
        vpath::normalize(&format!("{folder_utf8}\\{name_utf8}"))
    };

    let asset = Asset {
        path,
        hash: stored_hash,
        size,
        offset: u64::from(data_offset),
    };
    if catalog.insert(asset).is_some() {
        return Err(Error::parse(archive_path, "duplicate asset path"));
    }
    Ok(())
}

/// Reads one payload back out of the archive, inflating it when its stored
/// state says so. Compressed payloads carry their uncompressed size in a
/// leading dword.
pub(crate) fn read_payload<R>(stream: &mut R, asset: &Asset, flags: ArchiveFlags) -> Result<Vec<u8>>
where
    R: Read + Seek,
{
    stream.seek(SeekFrom::Start(asset.offset()))?;
    let mut source = Source::new(stream);
    let stored = stored_size(asset.size()) as usize;

    if stored_compressed(flags, asset.size()) {
        if stored < 4 {
            return Err(Error::Zlib(
                "compressed payload is shorter than its size prefix".into(),
            ));
        }
        let uncompressed_size: u32 = source.read().map_err(Error::Filesystem)?;
        let packed = source.read_vec(stored - 4)?;
        compression::inflate(&packed, uncompressed_size as usize)
    } else {
        source.read_vec(stored)
    }
}
