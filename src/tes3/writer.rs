use crate::{
    archive::{Asset, Catalog},
    io::Sink,
    strings,
    tes3::{constants, hashing::Hash, HEADER_MAGIC},
    Result,
};
use std::io::{Read, Seek, SeekFrom, Write};
use tracing::debug;

/// One catalog entry with everything the record blocks need, in Windows-1252.
struct Entry<'a> {
    asset: &'a Asset,
    name: Vec<u8>,
    new_offset: u32,
}

/// Rewrites a Morrowind archive. Data offsets are assigned by accumulating
/// sizes in path order; the record blocks go out in ascending hash order and
/// the payloads stream from the source file in path order. The output is
/// structurally valid but not guaranteed byte-identical to the source:
/// shipped archives exist whose stored offsets encode a payload arrangement
/// not derivable from their names.
pub(crate) fn save<R, W>(catalog: &Catalog, source: &mut R, out: &mut W) -> Result<()>
where
    R: Read + Seek,
    W: Write,
{
    // Path order is the catalog's native order.
    let mut entries = Vec::with_capacity(catalog.len());
    let mut data_offset: u32 = 0;
    for asset in catalog.iter() {
        entries.push(Entry {
            asset,
            name: strings::from_utf8(asset.path())?,
            new_offset: data_offset,
        });
        data_offset = data_offset
            .checked_add(asset.size())
            .ok_or_else(|| crate::Error::InvalidArgs("payload section exceeds 4 GiB".into()))?;
    }

    let mut by_hash: Vec<usize> = (0..entries.len()).collect();
    by_hash.sort_by_key(|&i| Hash::from_value(entries[i].asset.hash()));

    let names_len: u64 = entries.iter().map(|e| e.name.len() as u64 + 1).sum();
    let file_count = u32::try_from(entries.len())?;
    let hash_offset = u32::try_from(
        (constants::FILE_ENTRY_SIZE + constants::NAME_OFFSET_SIZE) * u64::from(file_count)
            + names_len,
    )?;

    debug!(files = file_count, hash_offset, "writing tes3 archive");

    let mut sink = Sink::new(out);
    sink.write(&(HEADER_MAGIC, hash_offset, file_count))?;

    for &i in &by_hash {
        sink.write(&(entries[i].asset.size(), entries[i].new_offset))?;
    }

    let mut name_offset: u32 = 0;
    for &i in &by_hash {
        sink.write(&name_offset)?;
        name_offset += u32::try_from(entries[i].name.len() + 1)?;
    }

    for &i in &by_hash {
        sink.write_bytes(&entries[i].name)?;
        sink.write_bytes(b"\0")?;
    }

    for &i in &by_hash {
        sink.write(&entries[i].asset.hash())?;
    }

    // Payloads in path order, re-read from where the source archive kept them.
    for entry in &entries {
        source.seek(SeekFrom::Start(entry.asset.offset()))?;
        let mut remaining = u64::from(entry.asset.size());
        let mut buffer = [0u8; 8192];
        while remaining > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let chunk = remaining.min(buffer.len() as u64) as usize;
            source.read_exact(&mut buffer[..chunk])?;
            sink.write_bytes(&buffer[..chunk])?;
            remaining -= chunk as u64;
        }
    }

    Ok(())
}
