use std::{
    io::{self, Read, Seek, SeekFrom, Write},
    mem,
};

/// A type with a fixed little-endian wire shape. Every integer field in every
/// BSA layout is little-endian, so no endian selector is threaded through.
pub trait BinaryStreamable {
    type Item;

    fn from_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item>;
    fn to_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()>;
}

macro_rules! make_binary_streamable {
    ($t:ty) => {
        impl BinaryStreamable for $t {
            type Item = $t;

            fn from_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                let mut bytes = [0u8; mem::size_of::<Self::Item>()];
                stream.read_exact(&mut bytes)?;
                Ok(Self::from_le_bytes(bytes))
            }

            fn to_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
                stream.write_all(&item.to_le_bytes())
            }
        }
    };
}

make_binary_streamable!(u8);
make_binary_streamable!(u16);
make_binary_streamable!(u32);
make_binary_streamable!(u64);

macro_rules! make_binary_streamable_tuple {
    ($($idx:tt $t:ident),+) => {
        impl<$($t,)+> BinaryStreamable for ($($t,)+)
        where
            $($t: BinaryStreamable,)+
        {
            type Item = ($($t::Item,)+);

            fn from_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                Ok(($(
                    $t::from_stream(stream)?,
                )+))
            }

            fn to_stream<W: Write>(stream: &mut W, item: &Self::Item) -> io::Result<()> {
                $(
                    $t::to_stream(stream, &item.$idx)?;
                )+
                Ok(())
            }
        }
    };
}

make_binary_streamable_tuple!(0 T0, 1 T1);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6, 7 T7);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6, 7 T7, 8 T8);
make_binary_streamable_tuple!(0 T0, 1 T1, 2 T2, 3 T3, 4 T4, 5 T5, 6 T6, 7 T7, 8 T8, 9 T9);

pub struct Source<'a, R>
where
    R: Read + Seek,
{
    stream: &'a mut R,
}

impl<'a, R> Source<'a, R>
where
    R: Read + Seek,
{
    pub fn new(stream: &'a mut R) -> Self {
        Self { stream }
    }

    pub fn read<T>(&mut self) -> io::Result<T>
    where
        T: BinaryStreamable<Item = T>,
    {
        T::from_stream(&mut self.stream)
    }

    pub fn read_protocol<T>(&mut self) -> io::Result<T::Item>
    where
        T: BinaryStreamable,
    {
        T::from_stream(&mut self.stream)
    }

    pub fn read_bytes(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(bytes)
    }

    /// Reads `len` bytes into a fresh buffer, reporting allocation failure
    /// instead of aborting. `len` comes from an untrusted record field.
    pub fn read_vec(&mut self, len: usize) -> crate::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len)?;
        buffer.resize(len, 0);
        self.stream.read_exact(&mut buffer).map_err(crate::Error::Filesystem)?;
        Ok(buffer)
    }

    pub fn save_restore_position<F, T>(&mut self, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let position = self.stream.stream_position()?;
        let result = f(self);
        self.stream.seek(SeekFrom::Start(position))?;
        Ok(result)
    }

    pub fn seek_absolute(&mut self, pos: u64) -> io::Result<()> {
        self.stream.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    pub fn stream_position(&mut self) -> io::Result<u64> {
        self.stream.stream_position()
    }
}

pub struct Sink<'a, W>
where
    W: Write,
{
    stream: &'a mut W,
}

impl<'a, W> Sink<'a, W>
where
    W: Write,
{
    pub fn new(stream: &'a mut W) -> Self {
        Self { stream }
    }

    pub fn write<T>(&mut self, item: &T) -> io::Result<()>
    where
        T: BinaryStreamable<Item = T>,
    {
        T::to_stream(&mut self.stream, item)
    }

    pub fn write_protocol<T>(&mut self, item: &T::Item) -> io::Result<()>
    where
        T: BinaryStreamable,
    {
        T::to_stream(&mut self.stream, item)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn integers_and_tuples_round_trip() -> anyhow::Result<()> {
        let mut buffer = Vec::new();
        {
            let mut sink = Sink::new(&mut buffer);
            sink.write(&0xAABBu16)?;
            sink.write(&(0xDEAD_BEEFu32, 0x0123_4567_89AB_CDEFu64))?;
        }
        assert_eq!(buffer.len(), 2 + 4 + 8);
        assert_eq!(&buffer[..2], &[0xBB, 0xAA]);

        let mut cursor = Cursor::new(&buffer[..]);
        let mut source = Source::new(&mut cursor);
        let first: u16 = source.read()?;
        let (second, third): (u32, u64) = source.read()?;
        assert_eq!(first, 0xAABB);
        assert_eq!(second, 0xDEAD_BEEF);
        assert_eq!(third, 0x0123_4567_89AB_CDEF);
        Ok(())
    }

    #[test]
    fn save_restore_returns_to_the_saved_position() -> anyhow::Result<()> {
        let bytes = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut cursor = Cursor::new(&bytes[..]);
        let mut source = Source::new(&mut cursor);
        let _: u16 = source.read()?;
        let elsewhere: io::Result<u32> = source.save_restore_position(|source| {
            source.seek_absolute(4)?;
            source.read::<u32>()
        })?;
        assert_eq!(elsewhere?, u32::from_le_bytes([5, 6, 7, 8]));
        assert_eq!(source.stream_position()?, 2);
        Ok(())
    }

    #[test]
    fn read_vec_stops_at_truncation() {
        let bytes = [1u8, 2];
        let mut cursor = Cursor::new(&bytes[..]);
        let mut source = Source::new(&mut cursor);
        assert!(source.read_vec(8).is_err());
    }
}
