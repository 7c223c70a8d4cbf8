use crate::{Error, Result};
use flate2::write::{ZlibDecoder, ZlibEncoder};
use std::io::Write;

/// What `save` should do to payload compression state.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Compression {
    /// Keep every payload exactly as stored in the source archive.
    #[default]
    NoChange,
    /// Store every payload at this zlib level; 0 stores raw bytes.
    Level(u32),
}

impl Compression {
    #[must_use]
    pub(crate) fn is_store(self) -> bool {
        self == Compression::Level(0)
    }
}

/// Compresses a whole payload into a zlib stream.
pub fn deflate(bytes: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder
        .write_all(bytes)
        .and_then(|()| encoder.finish())
        .map_err(|err| Error::Zlib(err.to_string()))
}

/// Decompresses a whole zlib stream. The caller knows the expected payload
/// size from the record that described the stream; producing anything else
/// is corruption.
pub fn inflate(bytes: &[u8], uncompressed_size: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(uncompressed_size)?;

    let mut decoder = ZlibDecoder::new(out);
    decoder
        .write_all(bytes)
        .and_then(|()| decoder.finish())
        .map_err(|err| Error::Zlib(err.to_string()))
        .and_then(|out| {
            if out.len() == uncompressed_size {
                Ok(out)
            } else {
                Err(Error::Zlib(format!(
                    "payload decompressed to {} bytes where the record promised {}",
                    out.len(),
                    uncompressed_size
                )))
            }
        })
}
