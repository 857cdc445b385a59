use crate::frame::pool;
use crate::protocol::StreamID;
use spectral_binary::{BinaryError, BinaryReader, BinaryWriter, Readable, Writable};

pub use crate::frame::connection::{RESPONSE_FAILED, RESPONSE_SUCCESS};

/// `streamID u64`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub stream_id: StreamID,
}

impl Readable for StreamRequest {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self { stream_id: reader.read_u64()? })
    }
}

impl Writable for StreamRequest {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.stream_id)
    }
}

/// `streamID u64 | code u8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamResponse {
    pub stream_id: StreamID,
    pub response: u8,
}

impl Readable for StreamResponse {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self { stream_id: reader.read_u64()?, response: reader.read_u8()? })
    }
}

impl Writable for StreamResponse {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.stream_id)?;
        writer.write_u8(self.response)
    }
}

/// `streamID u64 | sequenceID u32 | payloadLen u32 | payload[payloadLen]`
///
/// The payload buffer is pooled; decoded frames must go back through
/// [`pool::recycle`] once dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamData {
    pub stream_id: StreamID,
    pub sequence_id: u32,
    pub payload: Vec<u8>,
}

impl Readable for StreamData {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let stream_id = reader.read_u64()?;
        let sequence_id = reader.read_u32()?;
        let length = reader.read_u32()? as usize;
        let mut payload = pool::take_payload();
        reader.read_into(length, &mut payload)?;
        Ok(Self { stream_id, sequence_id, payload })
    }
}

impl Writable for StreamData {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.stream_id)?;
        writer.write_u32(self.sequence_id)?;
        writer.write_u32(self.payload.len() as u32)?;
        writer.write_bytes(&self.payload)
    }
}

/// `streamID u64`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClose {
    pub stream_id: StreamID,
}

impl Readable for StreamClose {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self { stream_id: reader.read_u64()? })
    }
}

impl Writable for StreamClose {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_round_trip() {
        let fr = StreamData { stream_id: 3, sequence_id: 11, payload: b"hello".to_vec() };
        let mut writer = BinaryWriter::new();
        fr.write(&mut writer).unwrap();
        assert_eq!(writer.len(), 8 + 4 + 4 + 5);

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(StreamData::read(&mut reader).unwrap(), fr);
    }

    #[test]
    fn data_truncated_payload_fails() {
        let mut writer = BinaryWriter::new();
        writer.write_u64(3).unwrap();
        writer.write_u32(0).unwrap();
        writer.write_u32(100).unwrap();
        writer.write_bytes(b"partial").unwrap();

        let mut reader = BinaryReader::new(writer.freeze());
        assert!(StreamData::read(&mut reader).is_err());
    }

    #[test]
    fn request_response_round_trip() {
        let request = StreamRequest { stream_id: 42 };
        let mut writer = BinaryWriter::new();
        request.write(&mut writer).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(StreamRequest::read(&mut reader).unwrap(), request);

        let response = StreamResponse { stream_id: 42, response: RESPONSE_FAILED };
        let mut writer = BinaryWriter::new();
        response.write(&mut writer).unwrap();
        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(StreamResponse::read(&mut reader).unwrap(), response);
    }
}
