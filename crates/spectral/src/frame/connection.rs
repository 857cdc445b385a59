use crate::protocol::ConnectionID;
use spectral_binary::{BinaryError, BinaryReader, BinaryWriter, Readable, Writable};

pub const RESPONSE_SUCCESS: u8 = 0;
pub const RESPONSE_FAILED: u8 = 1;

pub const CLOSE_APPLICATION: u8 = 0;
pub const CLOSE_GRACEFUL: u8 = 1;
pub const CLOSE_TIMEOUT: u8 = 2;
pub const CLOSE_INTERNAL: u8 = 3;

/// Sent by a dialing client; the body is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionRequest;

impl Readable for ConnectionRequest {
    fn read(_reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self)
    }
}

impl Writable for ConnectionRequest {
    fn write(&self, _writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        Ok(())
    }
}

/// `connectionID u64 | code u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionResponse {
    pub connection_id: ConnectionID,
    pub response: u8,
}

impl Readable for ConnectionResponse {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self { connection_id: reader.read_u64()?, response: reader.read_u8()? })
    }
}

impl Writable for ConnectionResponse {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.connection_id)?;
        writer.write_u8(self.response)
    }
}

/// `code u8 | msgLen u32 | msg[msgLen]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionClose {
    pub code: u8,
    pub message: String,
}

impl Readable for ConnectionClose {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let code = reader.read_u8()?;
        let length = reader.read_u32()? as usize;
        let message = String::from_utf8_lossy(&reader.read_bytes(length)?).into_owned();
        Ok(Self { code, message })
    }
}

impl Writable for ConnectionClose {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u8(self.code)?;
        writer.write_u32(self.message.len() as u32)?;
        writer.write_bytes(self.message.as_bytes())
    }
}
