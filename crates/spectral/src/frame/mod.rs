//! Frame definitions and the packet codec.
//!
//! Every frame is a tagged variant with a fixed little-endian layout; the
//! frame ID integer on the wire selects the variant during decoding.

pub(crate) mod ack;
pub(crate) mod connection;
pub(crate) mod mtu;
pub(crate) mod stream;

pub(crate) mod pack;
pub(crate) mod pool;

pub use ack::{AckRange, Acknowledgement};
pub use connection::{ConnectionClose, ConnectionRequest, ConnectionResponse};
pub use mtu::{MtuRequest, MtuResponse};
pub use stream::{StreamClose, StreamData, StreamRequest, StreamResponse};

use crate::error::Error;
use spectral_binary::{BinaryError, BinaryReader, BinaryWriter, Readable, Writable};

pub const ID_ACKNOWLEDGEMENT: u32 = 0;
pub const ID_CONNECTION_REQUEST: u32 = 1;
pub const ID_CONNECTION_RESPONSE: u32 = 2;
pub const ID_CONNECTION_CLOSE: u32 = 3;
pub const ID_STREAM_REQUEST: u32 = 4;
pub const ID_STREAM_RESPONSE: u32 = 5;
pub const ID_STREAM_DATA: u32 = 6;
pub const ID_STREAM_CLOSE: u32 = 7;
pub const ID_MTU_REQUEST: u32 = 8;
pub const ID_MTU_RESPONSE: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Acknowledgement(Acknowledgement),
    ConnectionRequest(ConnectionRequest),
    ConnectionResponse(ConnectionResponse),
    ConnectionClose(ConnectionClose),
    StreamRequest(StreamRequest),
    StreamResponse(StreamResponse),
    StreamData(StreamData),
    StreamClose(StreamClose),
    MtuRequest(MtuRequest),
    MtuResponse(MtuResponse),
}

impl Frame {
    pub fn id(&self) -> u32 {
        match self {
            Frame::Acknowledgement(_) => ID_ACKNOWLEDGEMENT,
            Frame::ConnectionRequest(_) => ID_CONNECTION_REQUEST,
            Frame::ConnectionResponse(_) => ID_CONNECTION_RESPONSE,
            Frame::ConnectionClose(_) => ID_CONNECTION_CLOSE,
            Frame::StreamRequest(_) => ID_STREAM_REQUEST,
            Frame::StreamResponse(_) => ID_STREAM_RESPONSE,
            Frame::StreamData(_) => ID_STREAM_DATA,
            Frame::StreamClose(_) => ID_STREAM_CLOSE,
            Frame::MtuRequest(_) => ID_MTU_REQUEST,
            Frame::MtuResponse(_) => ID_MTU_RESPONSE,
        }
    }

    /// Decodes the body for `id`. Unrecognised IDs fail with
    /// [`Error::UnknownFrame`]; truncated bodies with [`Error::ShortBuffer`].
    pub fn read(id: u32, reader: &mut BinaryReader) -> Result<Frame, Error> {
        let fr = match id {
            ID_ACKNOWLEDGEMENT => Frame::Acknowledgement(Acknowledgement::read(reader)?),
            ID_CONNECTION_REQUEST => Frame::ConnectionRequest(ConnectionRequest::read(reader)?),
            ID_CONNECTION_RESPONSE => Frame::ConnectionResponse(ConnectionResponse::read(reader)?),
            ID_CONNECTION_CLOSE => Frame::ConnectionClose(ConnectionClose::read(reader)?),
            ID_STREAM_REQUEST => Frame::StreamRequest(StreamRequest::read(reader)?),
            ID_STREAM_RESPONSE => Frame::StreamResponse(StreamResponse::read(reader)?),
            ID_STREAM_DATA => Frame::StreamData(StreamData::read(reader)?),
            ID_STREAM_CLOSE => Frame::StreamClose(StreamClose::read(reader)?),
            ID_MTU_REQUEST => Frame::MtuRequest(MtuRequest::read(reader)?),
            ID_MTU_RESPONSE => Frame::MtuResponse(MtuResponse::read(reader)?),
            _ => return Err(Error::UnknownFrame(id)),
        };
        Ok(fr)
    }

    pub fn write(&self, writer: &mut BinaryWriter) -> Result<(), BinaryError> {
        match self {
            Frame::Acknowledgement(fr) => fr.write(writer),
            Frame::ConnectionRequest(fr) => fr.write(writer),
            Frame::ConnectionResponse(fr) => fr.write(writer),
            Frame::ConnectionClose(fr) => fr.write(writer),
            Frame::StreamRequest(fr) => fr.write(writer),
            Frame::StreamResponse(fr) => fr.write(writer),
            Frame::StreamData(fr) => fr.write(writer),
            Frame::StreamClose(fr) => fr.write(writer),
            Frame::MtuRequest(fr) => fr.write(writer),
            Frame::MtuResponse(fr) => fr.write(writer),
        }
    }
}
