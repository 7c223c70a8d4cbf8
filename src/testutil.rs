//! Byte-exact fixture archives for the reader, writer, and handle tests.
//! Everything here is assembled by hand against the on-disk layouts, so the
//! codecs are tested against the format, not against themselves.

use crate::{
    compression,
    io::Sink,
    tes3::hashing::{hash_file as tes3_hash, Hash},
    tes4::{self, constants, hashing},
};

pub const TES3_FILES: [(&str, &[u8]); 3] = [
    ("meshes\\base_anim.nif", b"base anim payload"),
    ("meshes\\m\\probe.nif", b"probe payload"),
    ("textures\\tx_menubook.dds", b"menubook texture"),
];

pub const TES3_PROBE_PAYLOAD: &[u8] = b"probe payload";
pub const TES3_PROBE_CRC32: u32 = 0x5B0D_8008;

/// A Morrowind archive: records and names in ascending hash order, payloads
/// packed in path order.
pub fn tes3_fixture() -> Vec<u8> {
    struct Entry {
        name: &'static str,
        payload: &'static [u8],
        hash: Hash,
        offset: u32,
    }

    // TES3_FILES is listed in path order; offsets accumulate that way.
    let mut offset = 0u32;
    let entries: Vec<Entry> = TES3_FILES
        .iter()
        .map(|&(name, payload)| {
            let entry = Entry {
                name,
                payload,
                hash: tes3_hash(name.as_bytes().into()),
                offset,
            };
            offset += payload.len() as u32;
            entry
        })
        .collect();

    let mut by_hash: Vec<usize> = (0..entries.len()).collect();
    by_hash.sort_by_key(|&i| entries[i].hash);

    let names_len: u32 = entries.iter().map(|e| e.name.len() as u32 + 1).sum();
    let hash_offset = 12 * entries.len() as u32 + names_len;

    let mut bytes = Vec::new();
    let mut sink = Sink::new(&mut bytes);
    sink.write(&(0x100u32, hash_offset, entries.len() as u32))
        .unwrap();

    for &i in &by_hash {
        sink.write(&(entries[i].payload.len() as u32, entries[i].offset))
            .unwrap();
    }

    let mut name_offset = 0u32;
    for &i in &by_hash {
        sink.write(&name_offset).unwrap();
        name_offset += entries[i].name.len() as u32 + 1;
    }

    for &i in &by_hash {
        sink.write_bytes(entries[i].name.as_bytes()).unwrap();
        sink.write_bytes(b"\0").unwrap();
    }

    for &i in &by_hash {
        sink.write(&entries[i].hash.value()).unwrap();
    }

    for entry in &entries {
        sink.write_bytes(entry.payload).unwrap();
    }

    bytes
}

pub const TES4_FILES: [(&str, &[u8]); 3] = [
    ("meshes\\clutter\\apple01.nif", b"apple mesh data"),
    ("readme.txt", b"root readme"),
    (
        "textures\\map.dds",
        b"map texture payload map texture payload map texture payload",
    ),
];

pub const TES4_FILE_FLAGS: u32 = 0x3;

struct FileSpec {
    folder: &'static str,
    name: &'static str,
    payload: &'static [u8],
}

const SPECS: [FileSpec; 3] = [
    FileSpec {
        folder: "meshes\\clutter",
        name: "apple01.nif",
        payload: TES4_FILES[0].1,
    },
    FileSpec {
        folder: "",
        name: "readme.txt",
        payload: TES4_FILES[1].1,
    },
    FileSpec {
        folder: "textures",
        name: "map.dds",
        payload: TES4_FILES[2].1,
    },
];

/// Index into [`SPECS`] of the file the "inverted" fixtures flip.
const INVERTED_SPEC: usize = 2;

pub struct Tes4Fixture {
    bytes: Vec<u8>,
}

impl Tes4Fixture {
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

pub fn tes4_fixture(version: tes4::Version, compressed: bool) -> Tes4Fixture {
    build_tes4(version, compressed, false, false)
}

/// One file stores the opposite of the archive-wide compression state, with
/// the invert bit set on its size field.
pub fn tes4_fixture_inverted(version: tes4::Version, compressed: bool) -> Tes4Fixture {
    build_tes4(version, compressed, true, false)
}

/// One stored file hash disagrees with the hash of its name.
pub fn tes4_fixture_broken_hash(version: tes4::Version) -> Tes4Fixture {
    build_tes4(version, false, false, true)
}

fn build_tes4(
    version: tes4::Version,
    global_compressed: bool,
    invert_one: bool,
    break_hash: bool,
) -> Tes4Fixture {
    // Group the specs into folders and order everything by hash, the way the
    // layout demands.
    let mut folders: Vec<(u64, &'static str, Vec<usize>)> = Vec::new();
    for (idx, spec) in SPECS.iter().enumerate() {
        let hash = hashing::hash_directory(spec.folder.as_bytes().into());
        match folders.iter_mut().find(|(h, ..)| *h == hash) {
            Some((_, _, files)) => files.push(idx),
            None => folders.push((hash, spec.folder, vec![idx])),
        }
    }
    folders.sort_by_key(|&(hash, ..)| hash);
    for (_, _, files) in &mut folders {
        files.sort_by_key(|&idx| hashing::hash_file(SPECS[idx].name.as_bytes().into()));
    }

    // Stored payload images and size fields.
    let mut stored: Vec<Vec<u8>> = Vec::new();
    let mut size_fields: Vec<u32> = Vec::new();
    for (idx, spec) in SPECS.iter().enumerate() {
        let inverted = invert_one && idx == INVERTED_SPEC;
        let file_compressed = global_compressed != inverted;
        let image = if file_compressed {
            let packed = compression::deflate(spec.payload, 6).unwrap();
            let mut image = (spec.payload.len() as u32).to_le_bytes().to_vec();
            image.extend_from_slice(&packed);
            image
        } else {
            spec.payload.to_vec()
        };
        let mut size_field = image.len() as u32;
        if inverted {
            size_field |= constants::FILE_INVERT_COMPRESSED;
        }
        stored.push(image);
        size_fields.push(size_field);
    }

    let folder_count = folders.len() as u32;
    let file_count = SPECS.len() as u32;
    let folder_record_size = version.folder_record_size() as u32;
    let total_folder_name_len: u32 = folders.iter().map(|(_, name, _)| name.len() as u32 + 1).sum();
    let total_file_name_len: u32 = SPECS.iter().map(|s| s.name.len() as u32 + 1).sum();

    let record_block_start = 36 + folder_record_size * folder_count + total_file_name_len;
    let start_of_payload = 36
        + folder_record_size * folder_count
        + total_folder_name_len
        + folder_count
        + total_file_name_len
        + 16 * file_count;

    let mut archive_flags = 0x3u32; // directory + file strings
    if global_compressed {
        archive_flags |= 0x4;
    }

    let mut bytes = Vec::new();
    let mut sink = Sink::new(&mut bytes);
    sink.write(&(
        u32::from_le_bytes(*b"BSA\0"),
        version.wire(),
        36u32,
        archive_flags,
        folder_count,
        file_count,
        total_folder_name_len,
        total_file_name_len,
        TES4_FILE_FLAGS,
    ))
    .unwrap();

    let mut block_pos = 0u32;
    for (hash, name, files) in &folders {
        let offset = record_block_start + block_pos;
        match version {
            tes4::Version::Tes4 | tes4::Version::Tes5 => {
                sink.write(&(*hash, files.len() as u32, offset)).unwrap();
            }
            tes4::Version::Sse => {
                sink.write(&(*hash, files.len() as u32, 0u32, u64::from(offset)))
                    .unwrap();
            }
        }
        block_pos += 1 + name.len() as u32 + 1 + 16 * files.len() as u32;
    }

    let mut data_offset = start_of_payload;
    for (_, name, files) in &folders {
        sink.write(&(name.len() as u8 + 1)).unwrap();
        sink.write_bytes(name.as_bytes()).unwrap();
        sink.write_bytes(b"\0").unwrap();
        for &idx in files {
            let mut hash = hashing::hash_file(SPECS[idx].name.as_bytes().into());
            if break_hash && idx == 0 {
                hash = hash.wrapping_add(1);
            }
            sink.write(&(hash, size_fields[idx], data_offset)).unwrap();
            data_offset += stored[idx].len() as u32;
        }
    }

    for (_, _, files) in &folders {
        for &idx in files {
            sink.write_bytes(SPECS[idx].name.as_bytes()).unwrap();
            sink.write_bytes(b"\0").unwrap();
        }
    }

    for (_, _, files) in &folders {
        for &idx in files {
            sink.write_bytes(&stored[idx]).unwrap();
        }
    }

    Tes4Fixture { bytes }
}
