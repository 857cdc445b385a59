//! Packet-level encode and decode.
//!
//! `magic(4) | connectionID u64 | packetSequenceID u32 | frameCount u32`
//! followed by `frameCount` frames, each `frameID u32 | body`.

use crate::error::Error;
use crate::frame::Frame;
use crate::protocol::{ConnectionID, MAGIC, PACKET_HEADER_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use spectral_binary::{BinaryReader, BinaryWriter};

/// Encodes a single frame as `frameID | body`, ready for the send queue.
pub fn pack_single(fr: &Frame) -> Result<Bytes, Error> {
    let mut writer = BinaryWriter::new();
    writer.write_u32(fr.id())?;
    fr.write(&mut writer)?;
    Ok(writer.freeze())
}

/// Wraps an already-encoded frame body in a packet header.
pub fn pack(connection_id: ConnectionID, sequence_id: u32, count: u32, body: &[u8]) -> Bytes {
    let mut pk = BytesMut::with_capacity(PACKET_HEADER_SIZE + body.len());
    pk.put_slice(&MAGIC);
    pk.put_u64_le(connection_id);
    pk.put_u32_le(sequence_id);
    pk.put_u32_le(count);
    pk.put_slice(body);
    pk.freeze()
}

/// Decodes a datagram into its connection ID, packet sequence ID and frames.
///
/// Fails with [`Error::InvalidHeader`] on a bad magic, a runt datagram, or a
/// frame count that does not match the decoded frames; [`Error::UnknownFrame`]
/// and [`Error::ShortBuffer`] propagate from frame decoding.
pub fn unpack(p: &[u8]) -> Result<(ConnectionID, u32, Vec<Frame>), Error> {
    if p.len() < PACKET_HEADER_SIZE || p[0..4] != MAGIC {
        return Err(Error::InvalidHeader);
    }

    let mut reader = BinaryReader::new(Bytes::copy_from_slice(p));
    reader.skip(4)?;
    let connection_id = reader.read_u64()?;
    let sequence_id = reader.read_u32()?;
    let count = reader.read_u32()?;

    let mut frames = Vec::with_capacity(count as usize);
    while reader.remaining() > 0 {
        let id = reader.read_u32()?;
        frames.push(Frame::read(id, &mut reader)?);
    }

    if frames.len() != count as usize {
        for fr in frames {
            crate::frame::pool::recycle(fr);
        }
        return Err(Error::InvalidHeader);
    }
    Ok((connection_id, sequence_id, frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{
        AckRange, Acknowledgement, ConnectionClose, ConnectionRequest, ConnectionResponse,
        MtuRequest, MtuResponse, StreamClose, StreamData, StreamRequest, StreamResponse,
    };

    fn round_trip(fr: Frame) {
        let body = pack_single(&fr).unwrap();
        let pk = pack(9, 5, 1, &body);
        let (connection_id, sequence_id, frames) = unpack(&pk).unwrap();
        assert_eq!(connection_id, 9);
        assert_eq!(sequence_id, 5);
        assert_eq!(frames, vec![fr]);
    }

    #[test]
    fn every_frame_kind_round_trips() {
        round_trip(Frame::Acknowledgement(Acknowledgement {
            delay: 9000,
            max: 8,
            ranges: vec![AckRange::new(1, 3), AckRange::new(5, 8)],
        }));
        round_trip(Frame::ConnectionRequest(ConnectionRequest));
        round_trip(Frame::ConnectionResponse(ConnectionResponse {
            connection_id: 1,
            response: crate::frame::connection::RESPONSE_SUCCESS,
        }));
        round_trip(Frame::ConnectionClose(ConnectionClose {
            code: crate::frame::connection::CLOSE_GRACEFUL,
            message: "bye".to_string(),
        }));
        round_trip(Frame::StreamRequest(StreamRequest { stream_id: 2 }));
        round_trip(Frame::StreamResponse(StreamResponse {
            stream_id: 2,
            response: crate::frame::connection::RESPONSE_SUCCESS,
        }));
        round_trip(Frame::StreamData(StreamData {
            stream_id: 2,
            sequence_id: 0,
            payload: vec![1, 2, 3],
        }));
        round_trip(Frame::StreamClose(StreamClose { stream_id: 2 }));
        round_trip(Frame::MtuRequest(MtuRequest { mtu: 1220 }));
        round_trip(Frame::MtuResponse(MtuResponse { mtu: 1220 }));
    }

    #[test]
    fn multiple_frames_in_one_packet() {
        let first = Frame::StreamData(StreamData { stream_id: 1, sequence_id: 0, payload: b"a".to_vec() });
        let second = Frame::StreamData(StreamData { stream_id: 1, sequence_id: 1, payload: b"b".to_vec() });
        let mut body = pack_single(&first).unwrap().to_vec();
        body.extend_from_slice(&pack_single(&second).unwrap());

        let (_, _, frames) = unpack(&pack(0, 1, 2, &body)).unwrap();
        assert_eq!(frames, vec![first, second]);
    }

    #[test]
    fn bad_magic_rejected() {
        let body = pack_single(&Frame::ConnectionRequest(ConnectionRequest)).unwrap();
        let mut pk = pack(0, 1, 1, &body).to_vec();
        pk[0] ^= 0xff;
        assert_eq!(unpack(&pk), Err(Error::InvalidHeader));
    }

    #[test]
    fn runt_datagram_rejected() {
        assert_eq!(unpack(&MAGIC), Err(Error::InvalidHeader));
    }

    #[test]
    fn unknown_frame_rejected() {
        let mut writer = BinaryWriter::new();
        writer.write_u32(77).unwrap();
        let pk = pack(0, 1, 1, &writer.freeze());
        assert_eq!(unpack(&pk), Err(Error::UnknownFrame(77)));
    }

    #[test]
    fn frame_count_mismatch_rejected() {
        let body = pack_single(&Frame::StreamClose(StreamClose { stream_id: 1 })).unwrap();
        let pk = pack(0, 1, 2, &body);
        assert_eq!(unpack(&pk), Err(Error::InvalidHeader));
    }

    #[test]
    fn truncated_frame_body_rejected() {
        let body = pack_single(&Frame::StreamData(StreamData {
            stream_id: 1,
            sequence_id: 0,
            payload: vec![0; 64],
        }))
        .unwrap();
        let pk = pack(0, 1, 1, &body);
        assert_eq!(unpack(&pk[..pk.len() - 10]), Err(Error::ShortBuffer));
    }
}
