use super::{
    super::error::{Error, Result},
    cpf::{item_type, CommonPacket},
};
use bytes::Buf;
use std::net::Ipv4Addr;

/// Device identity reported by ListIdentity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub protocol_version: u16,
    /// Address the device reports for itself (from the big-endian
    /// sockaddr_in block of the identity item)
    pub socket_addr: (Ipv4Addr, u16),
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub revision_major: u8,
    pub revision_minor: u8,
    pub status: u16,
    pub serial_number: u32,
    pub product_name: String,
    pub state: u8,
}

// version(2) + sockaddr(16) + vendor(2) + type(2) + code(2) + rev(2) +
// status(2) + serial(4) + name len(1)
const IDENTITY_FIXED_LEN: usize = 33;

/// Parse every identity item out of a ListIdentity response CPF.
pub fn parse_list_identity(cpf: &CommonPacket) -> Result<Vec<Identity>> {
    let mut identities = Vec::new();
    for item in &cpf.items {
        if item.type_id == item_type::IDENTITY {
            identities.push(parse_identity_item(&item.data)?);
        }
    }
    if identities.is_empty() {
        return Err(Error::ErrUnexpectedReply { context: "no identity item in ListIdentity reply" });
    }
    Ok(identities)
}

fn parse_identity_item(data: &[u8]) -> Result<Identity> {
    if data.len() < IDENTITY_FIXED_LEN {
        return Err(Error::InsufficientData { needed: IDENTITY_FIXED_LEN, available: data.len() });
    }
    let mut buf = data;

    let protocol_version = buf.get_u16_le();

    // sockaddr_in is big-endian on the wire: family, port, addr, 8 bytes zero
    let _family = buf.get_u16();
    let port = buf.get_u16();
    let addr = Ipv4Addr::from(buf.get_u32());
    buf.advance(8);

    let vendor_id = buf.get_u16_le();
    let device_type = buf.get_u16_le();
    let product_code = buf.get_u16_le();
    let revision_major = buf.get_u8();
    let revision_minor = buf.get_u8();
    let status = buf.get_u16_le();
    let serial_number = buf.get_u32_le();

    let name_len = buf.get_u8() as usize;
    if buf.len() < name_len + 1 {
        return Err(Error::InsufficientData { needed: name_len + 1, available: buf.len() });
    }
    let product_name = String::from_utf8_lossy(&buf[..name_len]).into_owned();
    buf.advance(name_len);
    let state = buf.get_u8();

    Ok(Identity {
        protocol_version,
        socket_addr: (addr, port),
        vendor_id,
        device_type,
        product_code,
        revision_major,
        revision_minor,
        status,
        serial_number,
        product_name,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::super::cpf::CpfItem;
    use super::*;
    use bytes::{BufMut, Bytes, BytesMut};

    fn identity_item_bytes() -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1); // protocol version
        buf.put_u16(0x0002); // AF_INET, big-endian
        buf.put_u16(44818);
        buf.put_slice(&Ipv4Addr::new(192, 168, 1, 10).octets());
        buf.put_slice(&[0u8; 8]);
        buf.put_u16_le(0x0001); // vendor: Rockwell
        buf.put_u16_le(12); // device type
        buf.put_u16_le(96); // product code
        buf.put_u8(21); // revision
        buf.put_u8(3);
        buf.put_u16_le(0x0030);
        buf.put_u32_le(0x00C0FFEE);
        let name = b"1747-L552/C";
        buf.put_u8(name.len() as u8);
        buf.put_slice(name);
        buf.put_u8(0x03); // state
        buf.freeze()
    }

    #[test]
    fn parses_identity_item() {
        let cpf = CommonPacket {
            items: vec![CpfItem { type_id: item_type::IDENTITY, data: identity_item_bytes() }],
        };
        let ids = parse_list_identity(&cpf).unwrap();
        assert_eq!(ids.len(), 1);
        let id = &ids[0];
        assert_eq!(id.protocol_version, 1);
        assert_eq!(id.socket_addr, (Ipv4Addr::new(192, 168, 1, 10), 44818));
        assert_eq!(id.vendor_id, 0x0001);
        assert_eq!(id.product_name, "1747-L552/C");
        assert_eq!((id.revision_major, id.revision_minor), (21, 3));
        assert_eq!(id.serial_number, 0x00C0FFEE);
        assert_eq!(id.state, 0x03);
    }

    #[test]
    fn missing_identity_item_is_an_error() {
        let cpf = CommonPacket::unconnected(Bytes::new());
        assert!(parse_list_identity(&cpf).is_err());
    }
}
