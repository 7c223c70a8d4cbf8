use crate::path;
use bstr::{BStr, BString, ByteSlice};

/// The `0x1003F` multiply-accumulate the engines fold strings with.
fn mini_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &b in bytes {
        hash = hash.wrapping_mul(0x1003F).wrapping_add(u32::from(b));
    }
    hash
}

fn hash_parts(stem: &BStr, extension: &BStr) -> u64 {
    let mut h1: u64 = 0;
    let mut h2: u32 = 0;
    let mut h3: u32 = 0;
    let len = stem.len();

    if len > 0 {
        h1 = u64::from(stem[len - 1]) | ((len as u64) << 16) | (u64::from(stem[0]) << 24);
        if len > 2 {
            h1 += u64::from(stem[len - 2]) << 8;
            if len > 3 {
                // Only the interior takes part; the edges are already in h1.
                h2 = mini_hash(&stem[1..len - 2]);
            }
        }
    }

    if !extension.is_empty() {
        h1 = h1.wrapping_add(match extension.as_bytes() {
            b".kf" => 0x80,
            b".nif" => 0x8000,
            b".dds" => 0x8080,
            b".wav" => 0x8000_0000,
            _ => 0,
        });
        h3 = mini_hash(extension);
    }

    h2 = h2.wrapping_add(h3);
    (u64::from(h2) << 32).wrapping_add(h1)
}

/// Hashes a file path. Only the final path segment takes part: the engines
/// address a file by its name hash within a separately hashed folder.
#[must_use]
pub fn hash_file(file_path: &BStr) -> u64 {
    let mut name = BString::new(file_path.to_vec());
    path::normalize_in_place(&mut name);
    if let Some(pos) = name.iter().rposition(|&b| b == b'\\') {
        name.drain(..=pos);
    }
    let (stem, extension) = path::split_extension(name.as_ref());
    hash_parts(stem, extension)
}

/// Hashes a folder path. The whole string takes part and nothing is treated
/// as an extension.
#[must_use]
pub fn hash_directory(folder_path: &BStr) -> u64 {
    let mut folder = BString::new(folder_path.to_vec());
    path::normalize_in_place(&mut folder);
    hash_parts(folder.as_ref(), BStr::new(b""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice as _;

    #[test]
    fn validate_file_hashes() {
        let h = |path: &[u8]| hash_file(path.as_bstr());
        assert_eq!(h(b"darkbrotherhood__0007469a_1.fuz"), 0x011F11B0641B5F31);
        assert_eq!(h(b"elder_council_amulet_n.dds"), 0xDC531E2F6516DFEE);
        assert_eq!(
            h(b"testtoddquest_testtoddhappy_00027fa2_1.mp3"),
            0xDE0301EE74265F31
        );
        assert_eq!(h(b"Mar\xEDa_F.fuz"), 0x690E07826D075F66);
    }

    #[test]
    fn validate_directory_hashes() {
        let h = |path: &[u8]| hash_directory(path.as_bstr());
        assert_eq!(
            h(b"textures/armor/amuletsandrings/elder council"),
            0x04BC422C742C696C
        );
        assert_eq!(
            h(b"sound/voice/skyrim.esm/maleuniquedbguardian"),
            0x594085AC732B616E
        );
        assert_eq!(h(b"textures/architecture/windhelm"), 0xC1D97EBE741E6C6D);
    }

    #[test]
    fn parent_directories_are_not_included_in_file_hashes() {
        assert_eq!(
            hash_file(b"users/john/test.txt".as_bstr()),
            hash_file(b"test.txt".as_bstr())
        );
    }

    #[test]
    fn empty_path_hashes_to_zero() {
        assert_eq!(hash_file(b"".as_bstr()), 0);
        assert_eq!(hash_directory(b"".as_bstr()), 0);
    }

    #[test]
    fn hashing_is_case_insensitive() {
        assert_eq!(
            hash_file(b"Apple01.NIF".as_bstr()),
            hash_file(b"apple01.nif".as_bstr())
        );
        assert_eq!(
            hash_directory(b"Meshes/Clutter".as_bstr()),
            hash_directory(b"meshes\\clutter".as_bstr())
        );
    }
}
