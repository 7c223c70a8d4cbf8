use crate::{
    archive::{Asset, Catalog},
    io::Source,
    path as vpath, strings,
    tes3::{constants, hashing, HEADER_MAGIC},
    Error, Result,
};
use std::{
    io::{Read, Seek, SeekFrom},
    path::Path,
};
use tracing::{debug, warn};

struct Offsets {
    name_offsets: u64,
    names: u64,
    hashes: u64,
    file_data: u64,
}

struct Header {
    hash_offset: u32,
    file_count: u32,
}

impl Header {
    fn compute_offsets(&self) -> Offsets {
        let file_count = u64::from(self.file_count);
        let name_offsets = constants::HEADER_SIZE + constants::FILE_ENTRY_SIZE * file_count;
        let names = name_offsets + constants::NAME_OFFSET_SIZE * file_count;
        let hashes = constants::HEADER_SIZE + u64::from(self.hash_offset);
        let file_data = hashes + constants::HASH_SIZE * file_count;
        Offsets {
            name_offsets,
            names,
            hashes,
            file_data,
        }
    }
}

pub(crate) fn read<R>(stream: &mut R, archive_path: &Path) -> Result<Catalog>
where
    R: Read + Seek,
{
    let file_len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;

    let mut source = Source::new(stream);
    let header = read_header(&mut source, archive_path)?;
    let offsets = header.compute_offsets();
    let mut catalog = Catalog::default();

    for idx in 0..u64::from(header.file_count) {
        let asset = read_file(&mut source, idx, &offsets, archive_path)?;
        if u64::from(asset.size()) + asset.offset() > file_len {
            return Err(Error::parse(
                archive_path,
                format!("payload of \"{}\" runs past the end of the file", asset.path()),
            ));
        }
        if catalog.insert(asset).is_some() {
            return Err(Error::parse(archive_path, "duplicate asset path"));
        }
    }

    debug!(
        path = %archive_path.display(),
        files = catalog.len(),
        "opened tes3 archive"
    );
    Ok(catalog)
}

fn read_header<R>(source: &mut Source<'_, R>, archive_path: &Path) -> Result<Header>
where
    R: Read + Seek,
{
    let (magic, hash_offset, file_count): (u32, u32, u32) = source
        .read()
        .map_err(|err| Error::parse_or_io(err, archive_path))?;
    if magic != HEADER_MAGIC {
        return Err(Error::parse(
            archive_path,
            format!("invalid magic in file header: 0x{magic:08X}"),
        ));
    }
    Ok(Header {
        hash_offset,
        file_count,
    })
}

fn read_file<R>(
    source: &mut Source<'_, R>,
    idx: u64,
    offsets: &Offsets,
    archive_path: &Path,
) -> Result<Asset>
where
    R: Read + Seek,
{
    let stored_hash = source
        .save_restore_position(|source| -> std::io::Result<u64> {
            source.seek_absolute(offsets.hashes + constants::HASH_SIZE * idx)?;
            source.read()
        })
        .map_err(|err| Error::parse_or_io(err, archive_path))?
        .map_err(|err| Error::parse_or_io(err, archive_path))?;

    let mut raw_name = source
        .save_restore_position(|source| -> std::io::Result<bstr::BString> {
            source.seek_absolute(offsets.name_offsets + constants::NAME_OFFSET_SIZE * idx)?;
            let offset: u32 = source.read()?;
            source.seek_absolute(offsets.names + u64::from(offset))?;
            source.read_protocol::<strings::ZString>()
        })
        .map_err(|err| Error::parse_or_io(err, archive_path))?
        .map_err(|err| Error::parse_or_io(err, archive_path))?;

    let (size, offset): (u32, u32) = source
        .read()
        .map_err(|err| Error::parse_or_io(err, archive_path))?;

    // The engine checks its own hash function against the stored table and
    // carries on regardless; a mismatch is worth surfacing but not fatal.
    let computed = hashing::hash_file_in_place(&mut raw_name);
    if computed.value() != stored_hash {
        warn!(
            name = %raw_name,
            stored = %format_args!("{stored_hash:016X}"),
            computed = %format_args!("{:016X}", computed.value()),
            "stored hash disagrees with the hash of the stored name"
        );
    }

    let path = vpath::normalize(&strings::to_utf8(&raw_name)?);
    Ok(Asset {
        path,
        hash: stored_hash,
        size,
        offset: offsets.file_data + u64::from(offset),
    })
}

/// Payloads are never compressed in this layout: a straight seek and read.
pub(crate) fn read_payload<R>(stream: &mut R, asset: &Asset) -> Result<Vec<u8>>
where
    R: Read + Seek,
{
    stream.seek(SeekFrom::Start(asset.offset()))?;
    let mut source = Source::new(stream);
    source.read_vec(asset.size() as usize)
}
