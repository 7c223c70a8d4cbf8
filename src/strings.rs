use crate::{io::BinaryStreamable, Error, Result};
use bstr::BString;
use encoding_rs::WINDOWS_1252;
use std::io::{self, Read, Write};

/// Decodes Windows-1252 bytes into UTF-8.
///
/// Every byte has a defined mapping (the undefined code points decode to the
/// matching C1 controls, which encode straight back), so the round trip
/// `from_utf8(to_utf8(bytes)) == bytes` holds for all inputs.
pub fn to_utf8(bytes: &[u8]) -> Result<String> {
    let (decoded, _, had_errors) = WINDOWS_1252.decode(bytes);
    if had_errors {
        return Err(Error::BadString(BString::from(bytes)));
    }
    Ok(decoded.into_owned())
}

/// Encodes a UTF-8 string into Windows-1252 bytes. A code point with no
/// Windows-1252 representation is a [`BadString`](Error::BadString) error,
/// never a silent substitution.
pub fn from_utf8(text: &str) -> Result<Vec<u8>> {
    let (encoded, _, had_errors) = WINDOWS_1252.encode(text);
    if had_errors {
        return Err(Error::BadString(BString::from(text)));
    }
    Ok(encoded.into_owned())
}

/// A zero-terminated string record.
pub struct ZString;

impl BinaryStreamable for ZString {
    type Item = BString;

    fn from_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
        let mut result = Vec::<u8>::new();
        loop {
            let byte = u8::from_stream(stream)?;
            match byte {
                0 => break,
                byte => result.push(byte),
            };
        }

        Ok(BString::new(result))
    }

    fn to_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
        stream.write_all(item.as_slice())?;
        stream.write_all(b"\0")?;
        Ok(())
    }
}

/// A string record prefixed with its length-including-terminator byte.
pub struct BZString;

impl BinaryStreamable for BZString {
    type Item = BString;

    fn from_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
        let len = u8::from_stream(stream)?;
        if len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "string length prefix leaves no room for the terminator",
            ));
        }

        let mut result = vec![0u8; usize::from(len) - 1];
        stream.read_exact(&mut result)?;
        match u8::from_stream(stream)? {
            b'\0' => Ok(BString::new(result)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "string is missing its null terminator",
            )),
        }
    }

    fn to_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
        let len: u8 = (item.len() + 1).try_into().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "string is too long for its length prefix",
            )
        })?;
        u8::to_stream(stream, &len)?;
        stream.write_all(item.as_slice())?;
        stream.write_all(b"\0")?;
        Ok(())
    }
}
