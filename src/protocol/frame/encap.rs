use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{Buf, BufMut, Bytes};

/// EIP encapsulation command codes.
pub mod command {
    pub const NOP: u16 = 0x0017;
    pub const LIST_IDENTITY: u16 = 0x0063;
    pub const REGISTER_SESSION: u16 = 0x0065;
    pub const UNREGISTER_SESSION: u16 = 0x0066;
    pub const SEND_RR_DATA: u16 = 0x006F;
    pub const SEND_UNIT_DATA: u16 = 0x0070;
}

/// Size of the fixed encapsulation header.
pub const ENCAP_HEADER_LEN: usize = 24;

/// EIP protocol version sent in RegisterSession.
pub const PROTOCOL_VERSION: u16 = 1;

/// EIP encapsulation header: 24 bytes, little-endian.
///
/// `sender_context` is an opaque 8-byte field echoed verbatim by the device;
/// the session layer uses it to pair replies with in-flight requests.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct EncapHeader {
    pub command: u16,
    /// Length of the command-specific data following the header
    pub length: u16,
    /// Session handle issued by RegisterSession (0 before registration)
    pub session: u32,
    pub status: u32,
    pub sender_context: u64,
    pub options: u32,
}

impl EncapHeader {
    pub fn new(command: u16, session: u32, sender_context: u64, length: usize) -> Self {
        Self {
            command,
            length: length as u16,
            session,
            status: 0,
            sender_context,
            options: 0,
        }
    }
}

impl WireEncode for EncapHeader {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        ENCAP_HEADER_LEN
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u16_le(self.command);
        dst.put_u16_le(self.length);
        dst.put_u32_le(self.session);
        dst.put_u32_le(self.status);
        dst.put_u64_le(self.sender_context);
        dst.put_u32_le(self.options);
        Ok(())
    }
}

impl WireDecode for EncapHeader {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        _parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < ENCAP_HEADER_LEN {
            return Err(Error::InsufficientData {
                needed: ENCAP_HEADER_LEN,
                available: input.len(),
            });
        }
        let mut buf = &input[..ENCAP_HEADER_LEN];
        let header = EncapHeader {
            command: buf.get_u16_le(),
            length: buf.get_u16_le(),
            session: buf.get_u32_le(),
            status: buf.get_u32_le(),
            sender_context: buf.get_u64_le(),
            options: buf.get_u32_le(),
        };
        Ok((&input[ENCAP_HEADER_LEN..], header))
    }
}

/// A fully framed encapsulation packet: header plus command-specific data.
#[derive(Debug, Clone)]
pub struct EipFrame {
    pub header: EncapHeader,
    pub payload: Bytes,
}

impl EipFrame {
    pub fn new(command: u16, session: u32, sender_context: u64, payload: Bytes) -> Self {
        Self {
            header: EncapHeader::new(command, session, sender_context, payload.len()),
            payload,
        }
    }
}

/// Build the RegisterSession request body `{protocol_version, options}`.
pub fn register_session_body() -> Bytes {
    let mut buf = bytes::BytesMut::with_capacity(4);
    buf.put_u16_le(PROTOCOL_VERSION);
    buf.put_u16_le(0);
    buf.freeze()
}
