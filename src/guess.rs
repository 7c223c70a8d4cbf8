use crate::{tes3, tes4, Format};
use std::io::Read;

const BSA: u32 = u32::from_le_bytes(*b"BSA\0");

/// Probes the leading magic/version words of a stream. `None` means the
/// bytes belong to no layout this library reads.
pub(crate) fn guess_format<In>(source: &mut In) -> Option<Format>
where
    In: ?Sized + Read,
{
    let mut buf = [0u8; 4];
    source.read_exact(&mut buf).ok()?;
    match u32::from_le_bytes(buf) {
        tes3::HEADER_MAGIC => Some(Format::Tes3),
        BSA => {
            source.read_exact(&mut buf).ok()?;
            tes4::Version::from_wire(u32::from_le_bytes(buf)).map(Format::Tes4)
        }
        _ => None,
    }
}
