use crate::frame::pool;
use spectral_binary::{BinaryError, BinaryReader, BinaryWriter, Readable, Writable};

/// Inclusive range of acknowledged packet sequence IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRange {
    pub lo: u32,
    pub hi: u32,
}

impl AckRange {
    pub fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lo <= id && id <= self.hi
    }
}

impl Readable for AckRange {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        Ok(Self { lo: reader.read_u32()?, hi: reader.read_u32()? })
    }
}

impl Writable for AckRange {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_u32(self.lo)?;
        writer.write_u32(self.hi)
    }
}

/// `delay i64 (µs) | max u32 | n u32 | {lo u32, hi u32}×n`
///
/// `delay` is the time the acknowledged maximum spent queued at the receiver,
/// in microseconds. `max` is the largest sequence ID covered by this frame;
/// the sender derives its RTT sample from that element alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Acknowledgement {
    pub delay: i64,
    pub max: u32,
    pub ranges: Vec<AckRange>,
}

impl Readable for Acknowledgement {
    fn read(reader: &mut BinaryReader) -> Result<Self, BinaryError> {
        let delay = reader.read_i64()?;
        let max = reader.read_u32()?;
        let count = reader.read_u32()?;
        let mut ranges = pool::take_ranges();
        for _ in 0..count {
            ranges.push(AckRange::read(reader)?);
        }
        Ok(Self { delay, max, ranges })
    }
}

impl Writable for Acknowledgement {
    fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        writer.write_i64(self.delay)?;
        writer.write_u32(self.max)?;
        self.ranges.write(writer)
    }
}
