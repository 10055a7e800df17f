#![allow(dead_code)]

use ab_pccc::protocol::{
    codec::Codec,
    frame::{
        cpf::{item_type, CommonPacket, CpfItem},
        encap::{command, register_session_body, EipFrame},
        pccc::get_compact_value,
        WireEncode,
    },
    types::{element_size, file_type},
};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex, Once},
};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::Level;

/// Global one-time tracing initialization guard for integration tests.
static INIT_TRACING: Once = Once::new();

/// Initialize a structured `tracing` subscriber for test runs: DEBUG level,
/// no targets or timestamps, so reconnects and timeouts stay readable.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Handler mapping one raw PCCC command to its raw PCCC reply bytes.
pub type PcccHandler = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// In-process PLC speaking just enough EIP + CIP + PCCC for the client:
/// RegisterSession/UnRegister, NOP, ListIdentity, and SendRRData carrying
/// Execute-PCCC directly or wrapped in Unconnected_Send.
pub struct MockPlc {
    pub addr: SocketAddr,
    pub product_name: String,
}

const MOCK_SESSION_HANDLE: u32 = 0x3300_0001;

impl MockPlc {
    pub async fn spawn(handler: PcccHandler) -> MockPlc {
        Self::spawn_named(handler, "1747-L552/C Mock").await
    }

    pub async fn spawn_named(handler: PcccHandler, product_name: &str) -> MockPlc {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let product = product_name.to_string();

        let accept_product = product.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    return;
                };
                let handler = Arc::clone(&handler);
                let product = accept_product.clone();
                tokio::spawn(async move {
                    serve_connection(stream, handler, product).await;
                });
            }
        });

        MockPlc { addr, product_name: product }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

async fn serve_connection(stream: TcpStream, handler: PcccHandler, product_name: String) {
    let mut framed = Framed::new(stream, Codec);

    while let Some(Ok(frame)) = framed.next().await {
        let reply = match frame.header.command {
            command::REGISTER_SESSION => Some(EipFrame::new(
                command::REGISTER_SESSION,
                MOCK_SESSION_HANDLE,
                frame.header.sender_context,
                register_session_body(),
            )),
            command::UNREGISTER_SESSION => return,
            command::NOP => None,
            command::LIST_IDENTITY => Some(EipFrame::new(
                command::LIST_IDENTITY,
                frame.header.session,
                frame.header.sender_context,
                identity_cpf(&product_name),
            )),
            command::SEND_RR_DATA => {
                Some(send_rr_data_reply(&frame, handler.as_ref()))
            }
            _ => None,
        };
        if let Some(reply) = reply {
            if framed.send(reply).await.is_err() {
                return;
            }
        }
    }
}

fn send_rr_data_reply(frame: &EipFrame, handler: &(dyn Fn(&[u8]) -> Vec<u8> + Send + Sync)) -> EipFrame {
    // Body: interface handle (4) + timeout (2) + CPF
    let body = &frame.payload[6..];
    let cpf = parse_cpf(body);
    let cip_request = &cpf.items[1].data;

    let cip_reply = handle_cip(cip_request, handler);

    let reply_cpf = CommonPacket::unconnected(Bytes::from(cip_reply));
    let mut reply_body = BytesMut::new();
    reply_body.put_u32_le(0);
    reply_body.put_u16_le(0);
    reply_cpf.encode_to(&mut reply_body, &()).unwrap();

    EipFrame::new(
        command::SEND_RR_DATA,
        frame.header.session,
        frame.header.sender_context,
        reply_body.freeze(),
    )
}

fn parse_cpf(body: &[u8]) -> CommonPacket {
    let mut items = Vec::new();
    let count = u16::from_le_bytes([body[0], body[1]]) as usize;
    let mut rest = &body[2..];
    for _ in 0..count {
        let type_id = u16::from_le_bytes([rest[0], rest[1]]);
        let len = u16::from_le_bytes([rest[2], rest[3]]) as usize;
        items.push(CpfItem { type_id, data: Bytes::copy_from_slice(&rest[4..4 + len]) });
        rest = &rest[4 + len..];
    }
    CommonPacket { items }
}

fn handle_cip(cip: &[u8], handler: &(dyn Fn(&[u8]) -> Vec<u8> + Send + Sync)) -> Vec<u8> {
    let service = cip[0];
    let path_words = cip[1] as usize;
    let after_path = 2 + path_words * 2;

    match service {
        // Execute PCCC: requester id, then the PCCC command
        0x4B => {
            let id_len = cip[after_path] as usize;
            let requester_id = &cip[after_path..after_path + id_len];
            let pccc_cmd = &cip[after_path + id_len..];

            let pccc_reply = handler(pccc_cmd);

            let mut reply = vec![0xCB, 0x00, 0x00, 0x00];
            reply.extend_from_slice(requester_id);
            reply.extend_from_slice(&pccc_reply);
            reply
        }
        // Unconnected_Send: unwrap the embedded request, wrap the reply in
        // a UCMM (0xD2) envelope like a routing gateway does
        0x52 => {
            let len =
                u16::from_le_bytes([cip[after_path + 2], cip[after_path + 3]]) as usize;
            let embedded = &cip[after_path + 4..after_path + 4 + len];
            let inner_reply = handle_cip(embedded, handler);

            let mut reply = vec![0xD2, 0x00, 0x00, 0x00];
            reply.extend_from_slice(&inner_reply);
            reply
        }
        other => vec![other | 0x80, 0x00, 0x08, 0x00],
    }
}

/// ListIdentity response body: a CPF with one identity item.
fn identity_cpf(product_name: &str) -> Bytes {
    let mut item = BytesMut::new();
    item.put_u16_le(1); // protocol version
    item.put_u16(0x0002); // sockaddr: AF_INET, big-endian block
    item.put_u16(44818);
    item.put_slice(&Ipv4Addr::LOCALHOST.octets());
    item.put_slice(&[0u8; 8]);
    item.put_u16_le(0x0001); // vendor: Rockwell
    item.put_u16_le(14); // device type: PLC
    item.put_u16_le(96); // product code
    item.put_u8(21);
    item.put_u8(3);
    item.put_u16_le(0x0030); // status
    item.put_u32_le(0x00C0FFEE); // serial
    item.put_u8(product_name.len() as u8);
    item.put_slice(product_name.as_bytes());
    item.put_u8(0x03); // state

    let cpf = CommonPacket {
        items: vec![CpfItem { type_id: item_type::IDENTITY, data: item.freeze() }],
    };
    let mut body = BytesMut::new();
    cpf.encode_to(&mut body, &()).unwrap();
    body.freeze()
}

/// One logged PCCC command as seen by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcccLogEntry {
    pub cmd: u8,
    pub fnc: Option<u8>,
    pub byte_count: u16,
}

/// A tiny data-table simulator with real PCCC command semantics: protected
/// typed logical read/write, read section against system file 0, and
/// diagnostic status reporting a catalog string.
pub struct DataTableSim {
    files: Mutex<HashMap<(u16, u8), Vec<u8>>>,
    log: Mutex<Vec<PcccLogEntry>>,
    catalog: String,
    /// Fail typed reads whose byte count exceeds this (simulates bulk-read
    /// limits); `None` accepts everything.
    pub fail_reads_over: Option<u16>,
}

impl DataTableSim {
    pub fn new(catalog: &str) -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            catalog: catalog.to_string(),
            fail_reads_over: None,
        })
    }

    pub fn new_failing_bulk(catalog: &str, fail_over: u16) -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            catalog: catalog.to_string(),
            fail_reads_over: Some(fail_over),
        })
    }

    /// Store a file as a word array (little-endian).
    pub fn set_words(&self, file_number: u16, ft: u8, words: &[i16]) {
        let mut bytes = Vec::with_capacity(words.len() * 2);
        for w in words {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        self.files.lock().unwrap().insert((file_number, ft), bytes);
    }

    /// Store a file as raw bytes.
    pub fn set_bytes(&self, file_number: u16, ft: u8, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert((file_number, ft), bytes);
    }

    /// Read back a file image (for asserting writes).
    pub fn file_bytes(&self, file_number: u16, ft: u8) -> Vec<u8> {
        self.files.lock().unwrap().get(&(file_number, ft)).cloned().unwrap_or_default()
    }

    pub fn log(&self) -> Vec<PcccLogEntry> {
        self.log.lock().unwrap().clone()
    }

    pub fn handler(self: &Arc<Self>) -> PcccHandler {
        let sim = Arc::clone(self);
        Arc::new(move |pccc: &[u8]| sim.handle(pccc))
    }

    fn handle(&self, pccc: &[u8]) -> Vec<u8> {
        let cmd = pccc[0];
        let tns = [pccc[2], pccc[3]];

        match cmd {
            // Diagnostic Status: no FNC; catalog lives at data bytes 12..22
            0x06 => {
                self.log.lock().unwrap().push(PcccLogEntry { cmd, fnc: None, byte_count: 0 });
                let mut reply = vec![0x46, 0x00, tns[0], tns[1]];
                let mut data = vec![0u8; 30];
                let cat = self.catalog.as_bytes();
                data[12..12 + cat.len().min(10)].copy_from_slice(&cat[..cat.len().min(10)]);
                reply.extend_from_slice(&data);
                reply
            }
            0x0F => {
                let fnc = pccc[4];
                let rest = &pccc[5..];
                let (byte_count, rest) = get_compact_value(rest).unwrap();
                let (file_number, rest) = get_compact_value(rest).unwrap();
                let ft = rest[0];
                let (element, rest) = get_compact_value(&rest[1..]).unwrap();
                let (sub_element, data) = get_compact_value(rest).unwrap();

                self.log.lock().unwrap().push(PcccLogEntry {
                    cmd,
                    fnc: Some(fnc),
                    byte_count,
                });

                match fnc {
                    0xA2 => self.typed_read(tns, byte_count, file_number, ft, element, sub_element),
                    // Read section addresses by byte offset in the element field
                    0xA1 => self.read_section(tns, byte_count, file_number, ft, element),
                    0xAA => {
                        self.typed_write(tns, file_number, ft, element, sub_element, data)
                    }
                    _ => vec![0x4F, 0x10, tns[0], tns[1]],
                }
            }
            _ => vec![cmd | 0x40, 0x10, pccc[2], pccc[3]],
        }
    }

    fn typed_read(
        &self,
        tns: [u8; 2],
        byte_count: u16,
        file_number: u16,
        ft: u8,
        element: u16,
        sub_element: u16,
    ) -> Vec<u8> {
        if let Some(limit) = self.fail_reads_over {
            if byte_count > limit {
                return vec![0x4F, 0x50, tns[0], tns[1]];
            }
        }
        let files = self.files.lock().unwrap();
        let Some(file) = files.get(&(file_number, ft)) else {
            // File number does not exist
            return vec![0x4F, 0xF0, tns[0], tns[1], 0x0C];
        };
        let offset =
            element as usize * element_size(ft) + sub_element as usize * 2;
        let end = offset + byte_count as usize;
        if end > file.len() {
            // Element out of range
            return vec![0x4F, 0xF0, tns[0], tns[1], 0x10];
        }
        let mut reply = vec![0x4F, 0x00, tns[0], tns[1]];
        reply.extend_from_slice(&file[offset..end]);
        reply
    }

    fn read_section(
        &self,
        tns: [u8; 2],
        size: u16,
        file_number: u16,
        ft: u8,
        offset: u16,
    ) -> Vec<u8> {
        let files = self.files.lock().unwrap();
        let Some(file) = files.get(&(file_number, ft)) else {
            return vec![0x4F, 0xF0, tns[0], tns[1], 0x0C];
        };
        let start = offset as usize;
        let end = start + size as usize;
        if end > file.len() {
            return vec![0x4F, 0xF0, tns[0], tns[1], 0x10];
        }
        let mut reply = vec![0x4F, 0x00, tns[0], tns[1]];
        reply.extend_from_slice(&file[start..end]);
        reply
    }

    fn typed_write(
        &self,
        tns: [u8; 2],
        file_number: u16,
        ft: u8,
        element: u16,
        sub_element: u16,
        data: &[u8],
    ) -> Vec<u8> {
        let mut files = self.files.lock().unwrap();
        let Some(file) = files.get_mut(&(file_number, ft)) else {
            return vec![0x4F, 0xF0, tns[0], tns[1], 0x0C];
        };
        let offset =
            element as usize * element_size(ft) + sub_element as usize * 2;
        let end = offset + data.len();
        if end > file.len() {
            return vec![0x4F, 0xF0, tns[0], tns[1], 0x10];
        }
        file[offset..end].copy_from_slice(data);
        vec![0x4F, 0x00, tns[0], tns[1]]
    }
}

/// Directory image builder for the SLC (1747) Sys0 layout: rows of 10 bytes
/// starting at byte 79 with the file type at row offset 1.
pub fn sys0_image_1747(rows: &[(u8, u16)]) -> Vec<u8> {
    const START: usize = 79;
    const ROW: usize = 10;
    let total = START + rows.len() * ROW;

    let mut image = vec![0u8; total];
    image[..2].copy_from_slice(&(total as u16).to_le_bytes());
    for (i, (ft, _count)) in rows.iter().enumerate() {
        let base = START + i * ROW;
        image[base + 1] = *ft;
        // Element counts are not addressable inside a 10-byte 1747 row
        // (size offset 35); entries report zero, matching the hardware walk
    }
    image
}

/// Sim pre-loaded with the data files used across the read/write tests.
pub fn standard_sim() -> Arc<DataTableSim> {
    let sim = DataTableSim::new("1747-L552");
    // N7: integers 0..=9
    sim.set_words(7, file_type::INTEGER, &[42, -42, 7, 1000, 0, 5, 6, 7, 8, 9]);
    // F8: floats
    let mut f8 = Vec::new();
    for v in [3.14f32, -1.0, 0.5] {
        f8.extend_from_slice(&v.to_le_bytes());
    }
    sim.set_bytes(8, file_type::FLOAT, f8);
    // B3: bit file, element 0 = 0b0000_0000_0010_0000 (bit 5 set)
    sim.set_words(3, file_type::BINARY, &[0x0020, 0x0000]);
    // T4: one timer, EN+DN set, PRE=500, ACC=123
    let ctl: i16 = ((1u16 << 15) | (1 << 13)) as i16;
    sim.set_words(4, file_type::TIMER, &[ctl, 500, 123]);
    // L9: longs
    let mut l9 = Vec::new();
    for v in [100_000i32, -5i32] {
        l9.extend_from_slice(&v.to_le_bytes());
    }
    sim.set_bytes(9, file_type::LONG, l9);
    sim
}
