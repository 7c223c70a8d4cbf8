use bstr::{BStr, BString};

fn map_byte(b: u8) -> u8 {
    match b {
        b'/' => b'\\',
        b'A'..=b'Z' => b + (b'a' - b'A'),
        _ => b,
    }
}

/// Normalizes an asset path the way the engines address them: ASCII letters
/// lowercased, forward slashes to backslashes, a single leading separator
/// stripped. Trailing separators are left alone and the empty string is the
/// archive root.
#[must_use]
pub fn normalize(input: &str) -> String {
    let mut out: String = input
        .chars()
        .map(|c| match c {
            '/' => '\\',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    if out.starts_with('\\') {
        out.remove(0);
    }
    out
}

/// The byte-level counterpart of [`normalize`], for on-disk Windows-1252
/// names on their way into a hash function.
pub fn normalize_in_place(path: &mut BString) {
    for b in path.iter_mut() {
        *b = map_byte(*b);
    }

    if path.first() == Some(&b'\\') {
        path.remove(0);
    }
}

/// Splits a normalized path into its folder (empty when the asset lives at
/// the archive root) and file name.
#[must_use]
pub fn split_folder(path: &BStr) -> (&BStr, &BStr) {
    match path.iter().rposition(|&b| b == b'\\') {
        Some(pos) => (path[..pos].into(), path[pos + 1..].into()),
        None => (path[..0].into(), path),
    }
}

/// Splits a file name at its last dot. The extension keeps its leading dot;
/// a name with no dot has an empty extension.
#[must_use]
pub fn split_extension(name: &BStr) -> (&BStr, &BStr) {
    match name.iter().rposition(|&b| b == b'.') {
        Some(pos) => (name[..pos].into(), name[pos..].into()),
        None => (name, name[..0].into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::ByteSlice as _;

    #[test]
    fn normalization_rules() {
        assert_eq!(normalize("MESHES/foo.NIF"), "meshes\\foo.nif");
        assert_eq!(normalize("\\textures\\tx_a.dds"), "textures\\tx_a.dds");
        assert_eq!(normalize("/Meshes/M/Probe.nif"), "meshes\\m\\probe.nif");
        assert_eq!(normalize(""), "");
        // no trailing-separator cleanup
        assert_eq!(normalize("meshes\\"), "meshes\\");
    }

    #[test]
    fn normalization_leaves_high_bytes_alone() {
        let mut raw = BString::from(&b"Mar\xEDa/F.FUZ"[..]);
        normalize_in_place(&mut raw);
        assert_eq!(raw, BString::from(&b"mar\xEDa\\f.fuz"[..]));
    }

    #[test]
    fn folder_splitting() {
        let (folder, name) = split_folder(b"meshes\\m\\probe.nif".as_bstr());
        assert_eq!(folder, "meshes\\m");
        assert_eq!(name, "probe.nif");

        let (folder, name) = split_folder(b"readme.txt".as_bstr());
        assert_eq!(folder, "");
        assert_eq!(name, "readme.txt");
    }

    #[test]
    fn extension_splitting() {
        let (stem, ext) = split_extension(b"probe.nif".as_bstr());
        assert_eq!(stem, "probe");
        assert_eq!(ext, ".nif");

        let (stem, ext) = split_extension(b"archive.tar.gz".as_bstr());
        assert_eq!(stem, "archive.tar");
        assert_eq!(ext, ".gz");

        let (stem, ext) = split_extension(b"makefile".as_bstr());
        assert_eq!(stem, "makefile");
        assert_eq!(ext, "");
    }
}
