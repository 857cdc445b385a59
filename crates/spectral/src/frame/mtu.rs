use spectral_binary::{BinaryError, BinaryReader, BinaryWriter, Readable, Writable};

/// MTU probe. The body is padded with zeroes to exactly `mtu` bytes so the
/// datagram itself exercises the candidate path MTU; only the leading u64
/// carries information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuRequest {
    pub mtu: u64,
}

impl Readable for MtuRequest {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let mtu = reader.read_u64()?;
        if mtu < 8 {
            return Err(BinaryError::InvalidData(format!("mtu probe too small: {}", mtu)));
        }
        reader.skip(mtu as usize - 8)?;
        Ok(Self { mtu })
    }
}

impl Writable for MtuRequest {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.mtu)?;
        writer.write_padding(self.mtu as usize - 8)
    }
}

/// `mtu u64` — echoes a successfully received probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtuResponse {
    pub mtu: u64,
}

impl Readable for MtuResponse {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self { mtu: reader.read_u64()? })
    }
}

impl Writable for MtuResponse {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u64(self.mtu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_padded_to_mtu() {
        let fr = MtuRequest { mtu: 1220 };
        let mut writer = BinaryWriter::new();
        fr.write(&mut writer).unwrap();
        assert_eq!(writer.len(), 1220);

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(MtuRequest::read(&mut reader).unwrap(), fr);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn request_truncated_padding_fails() {
        let mut writer = BinaryWriter::new();
        writer.write_u64(1220).unwrap();
        writer.write_padding(100).unwrap();

        let mut reader = BinaryReader::new(writer.freeze());
        assert!(MtuRequest::read(&mut reader).is_err());
    }

    #[test]
    fn response_round_trip() {
        let fr = MtuResponse { mtu: 1240 };
        let mut writer = BinaryWriter::new();
        fr.write(&mut writer).unwrap();
        assert_eq!(writer.len(), 8);

        let mut reader = BinaryReader::new(writer.freeze());
        assert_eq!(MtuResponse::read(&mut reader).unwrap(), fr);
    }
}
