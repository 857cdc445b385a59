use crate::error::BinaryError;
use crate::io::{BinaryReader, BinaryWriter};

/// Trait for types that can be read from a `BinaryReader`.
pub trait Readable: Sized {
    /// Reads an instance of `Self` from the reader.
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError>;
}

/// Trait for types that can be written to a `BinaryWriter`.
pub trait Writable {
    /// Writes this instance to the writer.
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError>;
}

macro_rules! impl_primitive_readable {
    ($($ty:ty => $method:ident),*) => {
        $(
            impl Readable for $ty {
                #[inline]
                fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
                    reader.$method()
                }
            }
        )*
    };
}

macro_rules! impl_primitive_writable {
    ($($ty:ty => $method:ident),*) => {
        $(
            impl Writable for $ty {
                #[inline]
                fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
                    writer.$method(*self)
                }
            }
        )*
    };
}

impl_primitive_readable! {
    u8 => read_u8, i8 => read_i8,
    u16 => read_u16, i16 => read_i16,
    u32 => read_u32, i32 => read_i32,
    u64 => read_u64, i64 => read_i64,
    bool => read_bool
}

impl_primitive_writable! {
    u8 => write_u8, i8 => write_i8,
    u16 => write_u16, i16 => write_i16,
    u32 => write_u32, i32 => write_i32,
    u64 => write_u64, i64 => write_i64,
    bool => write_bool
}

// Vec<T> (u32 little-endian length prefix)
impl<T: Readable> Readable for Vec<T> {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let len = reader.read_u32()? as usize;
        let mut vec = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            vec.push(T::read(reader)?);
        }
        Ok(vec)
    }
}

impl<T: Writable> Writable for Vec<T> {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u32(self.len() as u32)?;
        for item in self {
            item.write(writer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_round_trip() {
        let values: Vec<u32> = vec![1, 2, 3, 0xffff_ffff];
        let mut writer = BinaryWriter::new();
        values.write(&mut writer).unwrap();

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(Vec::<u32>::read(&mut reader).unwrap(), values);
    }

    #[test]
    fn vec_truncated_fails() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(5).unwrap();
        writer.write_u32(1).unwrap();

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(Vec::<u32>::read(&mut reader), Err(BinaryError::UnexpectedEof));
    }
}
