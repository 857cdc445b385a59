use crate::error::BinaryError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over an immutable byte buffer. Every read checks the remaining
/// length and fails with [`BinaryError::UnexpectedEof`] instead of panicking.
#[derive(Debug, Clone)]
pub struct BinaryReader {
    buffer: Bytes,
}

/// Growable output buffer for encoding. Writes are infallible but return
/// `Result` so that `Writable` implementations compose with `?`.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

macro_rules! impl_reads {
    ($($name:ident => $ty:ty, $get:ident, $size:expr),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self) -> Result<$ty, BinaryError> {
                self.ensure($size)?;
                Ok(self.buffer.$get())
            }
        )*
    };
}

macro_rules! impl_writes {
    ($($name:ident => $ty:ty, $put:ident),* $(,)?) => {
        $(
            #[inline]
            pub fn $name(&mut self, value: $ty) -> Result<(), BinaryError> {
                self.buffer.$put(value);
                Ok(())
            }
        )*
    };
}

impl BinaryReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    #[inline]
    fn ensure(&self, n: usize) -> Result<(), BinaryError> {
        if self.buffer.remaining() < n {
            return Err(BinaryError::UnexpectedEof);
        }
        Ok(())
    }

    impl_reads! {
        read_u8 => u8, get_u8, 1,
        read_i8 => i8, get_i8, 1,
        read_u16 => u16, get_u16_le, 2,
        read_i16 => i16, get_i16_le, 2,
        read_u32 => u32, get_u32_le, 4,
        read_i32 => i32, get_i32_le, 4,
        read_u64 => u64, get_u64_le, 8,
        read_i64 => i64, get_i64_le, 8,
    }

    pub fn read_bool(&mut self) -> Result<bool, BinaryError> {
        Ok(self.read_u8()? != 0)
    }

    /// Splits off the next `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<Bytes, BinaryError> {
        self.ensure(n)?;
        Ok(self.buffer.split_to(n))
    }

    /// Copies the next `n` bytes into `dst`, growing it as needed.
    pub fn read_into(&mut self, n: usize, dst: &mut Vec<u8>) -> Result<(), BinaryError> {
        self.ensure(n)?;
        dst.extend_from_slice(&self.buffer[..n]);
        self.buffer.advance(n);
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), BinaryError> {
        self.ensure(n)?;
        self.buffer.advance(n);
        Ok(())
    }
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: BytesMut::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    impl_writes! {
        write_u8 => u8, put_u8,
        write_i8 => i8, put_i8,
        write_u16 => u16, put_u16_le,
        write_i16 => i16, put_i16_le,
        write_u32 => u32, put_u32_le,
        write_i32 => i32, put_i32_le,
        write_u64 => u64, put_u64_le,
        write_i64 => i64, put_i64_le,
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), BinaryError> {
        self.write_u8(value as u8)
    }

    pub fn write_bytes(&mut self, p: &[u8]) -> Result<(), BinaryError> {
        self.buffer.put_slice(p);
        Ok(())
    }

    /// Appends `n` zero bytes.
    pub fn write_padding(&mut self, n: usize) -> Result<(), BinaryError> {
        self.buffer.put_bytes(0, n);
        Ok(())
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}
