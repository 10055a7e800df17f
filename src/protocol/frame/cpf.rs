use super::{
    super::error::{Error, Result},
    WireDecode, WireEncode,
};
use bytes::{Buf, BufMut, Bytes};

/// CPF item type identifiers.
pub mod item_type {
    /// Null address item (unconnected messaging)
    pub const NULL_ADDRESS: u16 = 0x0000;
    /// ListIdentity response item
    pub const IDENTITY: u16 = 0x000C;
    /// Unconnected data item carrying a CIP message
    pub const UNCONNECTED_DATA: u16 = 0x00B2;
}

/// One Common Packet Format item: `{type_id, length, data}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpfItem {
    pub type_id: u16,
    pub data: Bytes,
}

/// Common Packet Format: an item count followed by the items. Every
/// unconnected request carries a null address item and an unconnected data
/// item; responses must carry at least those two, with item[1] holding the
/// CIP reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommonPacket {
    pub items: Vec<CpfItem>,
}

impl CommonPacket {
    /// CPF shape for a direct or routed unconnected request: null address +
    /// unconnected data.
    pub fn unconnected(cip_request: Bytes) -> Self {
        Self {
            items: vec![
                CpfItem { type_id: item_type::NULL_ADDRESS, data: Bytes::new() },
                CpfItem { type_id: item_type::UNCONNECTED_DATA, data: cip_request },
            ],
        }
    }

    /// The CIP payload of a response packet (item[1] data).
    pub fn cip_payload(&self) -> Result<&Bytes> {
        if self.items.len() < 2 {
            return Err(Error::ErrUnexpectedReply { context: "response CPF has fewer than 2 items" });
        }
        Ok(&self.items[1].data)
    }
}

impl WireEncode for CommonPacket {
    type Error = Error;
    type Context = ();

    fn encoded_len(&self, _ctx: &Self::Context) -> usize {
        2 + self.items.iter().map(|i| 4 + i.data.len()).sum::<usize>()
    }

    fn encode_to<B: BufMut>(&self, dst: &mut B, _ctx: &Self::Context) -> Result<()> {
        dst.put_u16_le(self.items.len() as u16);
        for item in &self.items {
            dst.put_u16_le(item.type_id);
            dst.put_u16_le(item.data.len() as u16);
            dst.put_slice(&item.data);
        }
        Ok(())
    }
}

impl WireDecode for CommonPacket {
    type Error = Error;
    type Context = ();

    fn parse<'a>(
        input: &'a [u8],
        parent: &Bytes,
        _ctx: &Self::Context,
    ) -> Result<(&'a [u8], Self)> {
        if input.len() < 2 {
            return Err(Error::InsufficientData { needed: 2, available: input.len() });
        }
        let mut buf = input;
        let count = buf.get_u16_le() as usize;
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.len() < 4 {
                return Err(Error::InsufficientData { needed: 4, available: buf.len() });
            }
            let type_id = buf.get_u16_le();
            let length = buf.get_u16_le() as usize;
            if buf.len() < length {
                return Err(Error::InsufficientData { needed: length, available: buf.len() });
            }
            let data = if length == 0 {
                Bytes::new()
            } else {
                parent.slice_ref(&buf[..length])
            };
            buf.advance(length);
            items.push(CpfItem { type_id, data });
        }
        Ok((buf, CommonPacket { items }))
    }
}
