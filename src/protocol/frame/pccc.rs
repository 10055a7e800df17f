use super::{
    super::{
        addr::DataTableAddress,
        error::{Error, Result},
    },
    cip::{self, service},
    epath::EPath,
};
use bytes::{BufMut, Bytes, BytesMut};

/// PCCC command codes. The reply echoes the command with bit 0x40 set.
pub mod command {
    /// Typed read/write/read-section commands carry an FNC byte
    pub const TYPED: u8 = 0x0F;
    pub const TYPED_REPLY: u8 = 0x4F;
    /// Diagnostic Status has no FNC byte; the reply data carries the
    /// processor catalog string
    pub const DIAGNOSTIC_STATUS: u8 = 0x06;
    pub const DIAGNOSTIC_REPLY: u8 = 0x46;
}

/// Function codes for CMD 0x0F.
pub mod function {
    /// Protected Typed Logical Read with 3 address fields
    pub const PROTECTED_TYPED_LOGICAL_READ: u8 = 0xA2;
    /// Protected Typed Logical Write with 3 address fields
    pub const PROTECTED_TYPED_LOGICAL_WRITE: u8 = 0xAA;
    /// Read a section of a data file (file directory discovery)
    pub const READ_SECTION: u8 = 0xA1;
}

/// CIP class of the PCCC object.
pub const PCCC_OBJECT_CLASS: u16 = 0x67;

/// Requester id is a fixed 7 bytes: length + vendor id (u16 LE) + serial
/// number (u32 LE). It prefixes the PCCC bytes in both directions.
pub const REQUESTER_ID_LEN: u8 = 7;

/// Append an address-field integer using PCCC compact encoding: a single
/// byte below 255, else 0xFF followed by the full 16-bit LE value.
pub fn put_compact_value<B: BufMut>(buf: &mut B, value: u16) {
    if value < 255 {
        buf.put_u8(value as u8);
    } else {
        buf.put_u8(0xFF);
        buf.put_u16_le(value);
    }
}

/// Decode one compact-encoded value, returning it with the remaining input.
pub fn get_compact_value(input: &[u8]) -> Result<(u16, &[u8])> {
    match input.first() {
        None => Err(Error::InsufficientData { needed: 1, available: 0 }),
        Some(0xFF) => {
            if input.len() < 3 {
                return Err(Error::InsufficientData { needed: 3, available: input.len() });
            }
            Ok((u16::from_le_bytes([input[1], input[2]]), &input[3..]))
        }
        Some(&b) => Ok((u16::from(b), &input[1..])),
    }
}

/// Common PCCC command header `[cmd][sts=0][tns LE]` plus the FNC byte for
/// typed commands.
fn put_header(buf: &mut BytesMut, cmd: u8, tns: u16, fnc: Option<u8>) {
    buf.put_u8(cmd);
    buf.put_u8(0x00); // STS is zero in requests
    buf.put_u16_le(tns);
    if let Some(fnc) = fnc {
        buf.put_u8(fnc);
    }
}

/// Build a Protected Typed Logical Read (CMD 0x0F, FNC 0xA2) with an
/// explicit byte count. Bulk reads span multiple contiguous elements by
/// passing `count * element_size` here.
pub fn build_typed_read(addr: &DataTableAddress, byte_count: usize, tns: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    put_header(&mut buf, command::TYPED, tns, Some(function::PROTECTED_TYPED_LOGICAL_READ));
    put_compact_value(&mut buf, byte_count as u16);
    put_compact_value(&mut buf, addr.file_number);
    buf.put_u8(addr.file_type);
    put_compact_value(&mut buf, addr.element);
    put_compact_value(&mut buf, addr.sub_element);
    buf.freeze()
}

/// Build a Protected Typed Logical Write (CMD 0x0F, FNC 0xAA).
pub fn build_typed_write(addr: &DataTableAddress, data: &[u8], tns: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + data.len());
    put_header(&mut buf, command::TYPED, tns, Some(function::PROTECTED_TYPED_LOGICAL_WRITE));
    put_compact_value(&mut buf, data.len() as u16);
    put_compact_value(&mut buf, addr.file_number);
    buf.put_u8(addr.file_type);
    put_compact_value(&mut buf, addr.element);
    put_compact_value(&mut buf, addr.sub_element);
    buf.put_slice(data);
    buf.freeze()
}

/// Build a Read Section command (CMD 0x0F, FNC 0xA1) against a data file at
/// a byte offset. Used to walk the file directory in system file 0.
pub fn build_read_section(
    file_number: u16,
    file_type: u8,
    offset: u16,
    size: u16,
    tns: u16,
) -> Bytes {
    let mut buf = BytesMut::with_capacity(16);
    put_header(&mut buf, command::TYPED, tns, Some(function::READ_SECTION));
    put_compact_value(&mut buf, size);
    put_compact_value(&mut buf, file_number);
    buf.put_u8(file_type);
    put_compact_value(&mut buf, offset);
    put_compact_value(&mut buf, 0); // sub-element
    buf.freeze()
}

/// Build a Diagnostic Status command (CMD 0x06). No FNC byte.
pub fn build_diagnostic_status(tns: u16) -> Bytes {
    let mut buf = BytesMut::with_capacity(4);
    put_header(&mut buf, command::DIAGNOSTIC_STATUS, tns, None);
    buf.freeze()
}

/// Wrap a PCCC command in a CIP Execute PCCC request:
/// `[0x4B][path to class 0x67 instance 1][requester id][pccc bytes]`.
pub fn wrap_execute_pccc(pccc: &[u8], vendor_id: u16, serial_number: u32) -> Bytes {
    let mut body = BytesMut::with_capacity(7 + pccc.len());
    body.put_u8(REQUESTER_ID_LEN);
    body.put_u16_le(vendor_id);
    body.put_u32_le(serial_number);
    body.put_slice(pccc);

    let path = EPath::new().class(PCCC_OBJECT_CLASS).instance(1);
    cip::build_request(service::EXECUTE_PCCC, &path, &body)
}

/// Parse the CIP reply to an Execute PCCC request and strip the echoed
/// requester id, returning the raw PCCC reply bytes.
pub fn parse_execute_pccc_reply(cip_reply: &[u8]) -> Result<&[u8]> {
    let payload = cip::parse_reply(cip_reply, service::EXECUTE_PCCC)?;
    if payload.is_empty() {
        return Err(Error::ErrUnexpectedReply { context: "Execute PCCC reply has no payload" });
    }
    let id_len = payload[0] as usize;
    if payload.len() < id_len {
        return Err(Error::InsufficientData { needed: id_len, available: payload.len() });
    }
    Ok(&payload[id_len..])
}

/// Validate a PCCC reply header against the expected reply command and map
/// a non-zero STS (with optional EXT_STS after the TNS) to `Error`.
/// Returns the data bytes after the 4-byte header.
fn parse_reply(data: &[u8], expected_cmd: u8) -> Result<&[u8]> {
    if data.len() < 4 {
        return Err(Error::InsufficientData { needed: 4, available: data.len() });
    }
    let cmd = data[0];
    let sts = data[1];

    if cmd != expected_cmd {
        return Err(Error::ErrUnexpectedReply { context: "PCCC reply command mismatch" });
    }
    if sts != 0 {
        let ext = if sts & 0xF0 == 0xF0 && data.len() >= 5 { data[4] } else { 0 };
        return Err(Error::PcccStatus { sts, ext });
    }
    Ok(&data[4..])
}

/// Parse the reply to a typed read: header check, then the element bytes.
pub fn parse_typed_read_reply(data: &[u8]) -> Result<&[u8]> {
    parse_reply(data, command::TYPED_REPLY)
}

/// Parse the reply to a typed write. Success carries no payload.
pub fn parse_typed_write_reply(data: &[u8]) -> Result<()> {
    parse_reply(data, command::TYPED_REPLY).map(|_| ())
}

/// Parse the reply to Diagnostic Status, returning the status data block
/// (which embeds the catalog string).
pub fn parse_diagnostic_reply(data: &[u8]) -> Result<&[u8]> {
    parse_reply(data, command::DIAGNOSTIC_REPLY)
}
