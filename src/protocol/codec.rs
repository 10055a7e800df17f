use super::frame::{
    encap::{EipFrame, EncapHeader, ENCAP_HEADER_LEN},
    WireDecode, WireEncode,
};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Codec framing EIP encapsulation packets on a TCP stream.
///
/// Frames are delimited by the `length` field of the 24-byte header, which
/// counts only the command-specific data following the header.
#[derive(Debug, Default, Clone)]
pub struct Codec;

impl Decoder for Codec {
    type Item = EipFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < ENCAP_HEADER_LEN {
            return Ok(None);
        }
        let length = u16::from_le_bytes([src[2], src[3]]) as usize;
        let total = ENCAP_HEADER_LEN + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let frame = src.split_to(total).freeze();
        let (_rest, header) = EncapHeader::parse(&frame, &frame, &())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("encap: {e:?}")))?;
        let payload = frame.slice(ENCAP_HEADER_LEN..);
        Ok(Some(EipFrame { header, payload }))
    }
}

impl Encoder<EipFrame> for Codec {
    type Error = io::Error;

    fn encode(&mut self, item: EipFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(ENCAP_HEADER_LEN + item.payload.len());
        item.header
            .encode_to(dst, &())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("encap: {e:?}")))?;
        dst.put_slice(&item.payload);
        Ok(())
    }
}
