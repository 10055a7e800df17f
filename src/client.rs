use crate::protocol::{
    addr::{parse_data_table_address, DataTableAddress},
    discovery::{
        catalog_prefix, extract_catalog, lookup_sys0_layout, parse_file_directory,
        FileDirectoryEntry, CATALOG_RANGE, DIRECTORY_READ_CHUNK,
    },
    error::{Error, Result},
    frame::{
        cip,
        identity::Identity,
        pccc,
        RoutePath,
    },
    planner::{plan_bulk_reads, BulkRead},
    session::{self, Session, SessionConfig},
    types::{self, file_type, PlcKind},
    value::{decode_value, encode_value, PcccValue},
};
use bytes::Bytes;
use std::{
    result::Result as StdResult,
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default EIP TCP port.
pub const DEFAULT_PORT: u16 = 44818;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Socket deadline for each request round-trip
    pub timeout: Duration,
    /// Transport connect timeout
    pub connect_timeout: Duration,
    /// Optional CIP route for messaging through a gateway (e.g. a
    /// ControlLogix chassis with a 1756-DHRIO module). Direct messaging
    /// when absent.
    pub route_path: Option<RoutePath>,
    /// Processor family; gates discovery, does not alter framing
    pub plc_kind: PlcKind,
    /// Vendor id embedded in the PCCC requester id
    pub vendor_id: u16,
    /// Serial number embedded in the PCCC requester id
    pub serial_number: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            connect_timeout: Duration::from_millis(10_000),
            route_path: None,
            plc_kind: PlcKind::default(),
            vendor_id: 0x0001,
            serial_number: 0x12345678,
        }
    }
}

/// Decoded result for one requested tag. Per-tag failures live in `value`;
/// they never abort the surrounding `read`.
#[derive(Debug)]
pub struct TagReadResult {
    /// Address as requested (e.g. "N7:0")
    pub name: String,
    /// PCCC file type code, when the address parsed
    pub file_type: Option<u8>,
    /// Raw element bytes from the PLC (little-endian), when the read succeeded
    pub raw: Option<Bytes>,
    /// Decoded value or the per-tag error
    pub value: Result<PcccValue>,
}

/// High-level client for SLC 500, MicroLogix and PLC-5 processors speaking
/// PCCC over CIP Execute-PCCC inside an EtherNet/IP session.
///
/// One client owns one session; requests are strictly one-in-flight. The
/// client is cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Client {
    session: Arc<Session>,
    config: ClientConfig,
    /// PCCC transaction counter, truncated to 16 bits, monotonic per client
    tns: AtomicU16,
    /// Critical section for read-modify-write bit writes
    rmw_lock: Mutex<()>,
}

impl Client {
    /// Connect to a processor and register an EIP session.
    ///
    /// `address` is `host` or `host:port`; the port defaults to 44818.
    pub async fn connect(address: &str, config: ClientConfig) -> Result<Self> {
        if address.is_empty() {
            return Err(Error::InvalidConfiguration("empty address"));
        }
        let endpoint = if address.contains(':') {
            address.to_string()
        } else {
            format!("{address}:{DEFAULT_PORT}")
        };
        let socket_addr = tokio::net::lookup_host(&endpoint)
            .await?
            .next()
            .ok_or(Error::InvalidConfiguration("address resolved to nothing"))?;

        debug!("connecting to {socket_addr} ({})", config.plc_kind);

        let (session, ev) = session::create(SessionConfig {
            socket_addr,
            connect_timeout: config.connect_timeout,
            request_timeout: config.timeout,
            ..SessionConfig::default()
        });
        ev.spawn();

        if !session.wait_for_active().await {
            return Err(Error::ErrConnectTimeout);
        }

        Ok(Self { session, config, tns: AtomicU16::new(0), rmw_lock: Mutex::new(()) })
    }

    /// Unregister and drop the session. Safe to call more than once.
    pub async fn close(&self) {
        self.session.shutdown().await;
    }

    /// Whether the EIP session is registered and serving requests.
    pub fn is_connected(&self) -> bool {
        self.session.is_active()
    }

    /// Description of the messaging mode, e.g. `"Unconnected (direct, SLC 500)"`.
    pub fn connection_mode(&self) -> String {
        if self.config.route_path.is_some() {
            format!("Unconnected (routed, {})", self.config.plc_kind)
        } else {
            format!("Unconnected (direct, {})", self.config.plc_kind)
        }
    }

    /// Underlying session for lifecycle subscriptions.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Emit one EIP NOP to hold the TCP session open through network
    /// middleboxes. The crate never schedules this itself; call it every
    /// 30-60 s while idle.
    pub async fn keepalive(&self) -> Result<()> {
        self.session.keepalive().await
    }

    /// Query the device identity over the TCP session.
    pub async fn get_identity(&self) -> Result<Identity> {
        let mut identities = self.session.list_identity().await?;
        if identities.is_empty() {
            return Err(Error::ErrUnexpectedReply { context: "no identity response" });
        }
        Ok(identities.remove(0))
    }

    /// Next transaction number, wrapping at 16 bits.
    fn next_tns(&self) -> u16 {
        self.tns.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Send one PCCC command wrapped in CIP Execute-PCCC (routed through
    /// the Connection Manager when a route path is configured) and return
    /// the raw PCCC reply bytes.
    async fn execute_pccc(&self, pccc_cmd: Bytes) -> Result<Bytes> {
        let cip_request =
            pccc::wrap_execute_pccc(&pccc_cmd, self.config.vendor_id, self.config.serial_number);
        let request = match &self.config.route_path {
            Some(route) => cip::build_unconnected_send(&cip_request, route),
            None => cip_request,
        };

        let cip_reply = self.session.send_rr_data(request).await?;
        let pccc_reply = pccc::parse_execute_pccc_reply(&cip_reply)?;
        Ok(cip_reply.slice_ref(pccc_reply))
    }

    /// Read one address, returning the raw element bytes.
    pub async fn read_address(&self, addr: &DataTableAddress) -> Result<Bytes> {
        self.read_address_span(addr, addr.read_size()).await
    }

    /// Read `byte_count` bytes starting at an address. Bulk reads span
    /// multiple contiguous elements in one round-trip.
    pub async fn read_address_span(
        &self,
        addr: &DataTableAddress,
        byte_count: usize,
    ) -> Result<Bytes> {
        debug!(
            "read {}: file={} type=0x{:02X} elem={} sub={} bytes={}",
            addr.raw, addr.file_number, addr.file_type, addr.element, addr.sub_element, byte_count
        );
        let cmd = pccc::build_typed_read(addr, byte_count, self.next_tns());
        let reply = self.execute_pccc(cmd).await?;
        let data = pccc::parse_typed_read_reply(&reply)?;
        Ok(reply.slice_ref(data))
    }

    /// Write raw bytes to one address.
    pub async fn write_address(&self, addr: &DataTableAddress, data: &[u8]) -> Result<()> {
        debug!(
            "write {}: file={} type=0x{:02X} elem={} sub={} bytes={}",
            addr.raw, addr.file_number, addr.file_type, addr.element, addr.sub_element, data.len()
        );
        let cmd = pccc::build_typed_write(addr, data, self.next_tns());
        let reply = self.execute_pccc(cmd).await?;
        pccc::parse_typed_write_reply(&reply)
    }

    /// Issue Diagnostic Status and return the processor catalog string
    /// (e.g. "1747-L552").
    pub async fn processor_catalog(&self) -> Result<String> {
        let cmd = pccc::build_diagnostic_status(self.next_tns());
        let reply = self.execute_pccc(cmd).await?;
        let data = pccc::parse_diagnostic_reply(&reply)?;
        if data.len() < CATALOG_RANGE.end {
            return Err(Error::InsufficientData {
                needed: CATALOG_RANGE.end,
                available: data.len(),
            });
        }
        let catalog = extract_catalog(&data[CATALOG_RANGE]);
        debug!("processor catalog: {catalog:?}");
        Ok(catalog)
    }

    /// Read a chunk of a data file via FNC 0xA1 (Read Section).
    async fn read_section(
        &self,
        file_number: u16,
        ft: u8,
        offset: u16,
        size: u16,
    ) -> Result<Bytes> {
        let cmd = pccc::build_read_section(file_number, ft, offset, size, self.next_tns());
        let reply = self.execute_pccc(cmd).await?;
        let data = pccc::parse_typed_read_reply(&reply)?;
        Ok(reply.slice_ref(data))
    }

    /// Discover all data files by walking the file directory in system file
    /// 0. Supported on SLC 500 and MicroLogix; PLC-5 stores no readable
    /// directory.
    pub async fn discover_data_files(&self) -> Result<Vec<FileDirectoryEntry>> {
        if !self.config.plc_kind.supports_discovery() {
            return Err(Error::UnsupportedFeature { feature: "file directory discovery on PLC-5" });
        }

        let catalog = self.processor_catalog().await?;
        let layout = lookup_sys0_layout(catalog_prefix(&catalog))?;
        debug!("directory layout for {catalog:?}: {layout:?}");

        // The first word of system file 0 carries the raw directory total
        // size; MicroLogix 1100+ offset it by a family constant.
        let size_data = self.read_section(0, file_type::STATUS, 0, 2).await?;
        if size_data.len() < 2 {
            return Err(Error::InsufficientData { needed: 2, available: size_data.len() });
        }
        let raw_size = u16::from_le_bytes([size_data[0], size_data[1]]);
        let total_size = raw_size.saturating_sub(layout.size_const) as usize;
        if total_size <= layout.directory_start {
            return Err(Error::ErrUnexpectedReply { context: "file directory size too small" });
        }

        let dir_size = total_size - layout.directory_start;
        let mut dir_data = Vec::with_capacity(dir_size);
        let mut offset = 0usize;
        while offset < dir_size {
            let chunk = (dir_size - offset).min(DIRECTORY_READ_CHUNK as usize) as u16;
            let data = self
                .read_section(
                    0,
                    file_type::STATUS,
                    (layout.directory_start + offset) as u16,
                    chunk,
                )
                .await?;
            dir_data.extend_from_slice(&data);
            offset += chunk as usize;
        }

        let entries = parse_file_directory(&dir_data, &layout);
        debug!("discovered {} data files", entries.len());
        Ok(entries)
    }

    /// Read one or more data table addresses, returning decoded values in
    /// input order, one result per request.
    ///
    /// Contiguous whole-element requests in the same data file are served
    /// by bulk typed reads; a failed bulk read falls back to individual
    /// reads so one bad span never poisons the rest.
    pub async fn read(&self, names: &[&str]) -> Result<Vec<TagReadResult>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let parsed: Vec<StdResult<DataTableAddress, Error>> =
            names.iter().map(|n| parse_data_table_address(n)).collect();

        let mut results: Vec<Option<TagReadResult>> = Vec::with_capacity(names.len());
        for (name, p) in names.iter().zip(&parsed) {
            match p {
                // Filled in below
                Ok(_) => results.push(None),
                Err(e) => {
                    let err = match e {
                        Error::ErrInvalidAddress(msg) => Error::ErrInvalidAddress(msg.clone()),
                        other => Error::ErrInvalidAddress(other.to_string()),
                    };
                    results.push(Some(TagReadResult {
                        name: name.to_string(),
                        file_type: None,
                        raw: None,
                        value: Err(err),
                    }));
                }
            }
        }

        let parsed_refs: Vec<Option<&DataTableAddress>> =
            parsed.iter().map(|p| p.as_ref().ok()).collect();

        for bulk in plan_bulk_reads(&parsed_refs) {
            match self.read_bulk(&bulk, &parsed_refs).await {
                Ok(mut decoded) => {
                    for (idx, result) in bulk.indices.iter().zip(decoded.drain(..)) {
                        results[*idx] = Some(result);
                    }
                }
                Err(e) => {
                    // Leave the chunk unhandled; the single-read path below
                    // picks the indices up with per-tag errors if need be
                    warn!(
                        "bulk read of {} x{} failed, degrading to single reads: {e}",
                        bulk.start_element,
                        bulk.count()
                    );
                }
            }
        }

        for (i, slot) in results.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            let addr = parsed_refs[i].expect("unhandled slots always carry a parsed address");
            *slot = Some(match self.read_address(addr).await {
                Ok(raw) => TagReadResult {
                    name: names[i].to_string(),
                    file_type: Some(addr.file_type),
                    value: Ok(decode_value(addr, &raw)),
                    raw: Some(raw),
                },
                Err(e) => TagReadResult {
                    name: names[i].to_string(),
                    file_type: Some(addr.file_type),
                    raw: None,
                    value: Err(e),
                },
            });
        }

        Ok(results
            .into_iter()
            .map(|r| r.expect("every request resolves to a value or an error"))
            .collect())
    }

    /// Issue one bulk typed read and slice it into per-request results.
    async fn read_bulk(
        &self,
        bulk: &BulkRead,
        parsed: &[Option<&DataTableAddress>],
    ) -> Result<Vec<TagReadResult>> {
        let start = parsed[bulk.indices[0]]
            .ok_or(Error::ErrUnexpectedReply { context: "bulk read of unparsed address" })?;
        let raw = self.read_address_span(start, bulk.byte_count()).await?;

        let elem_size = bulk.element_size();
        let mut out = Vec::with_capacity(bulk.indices.len());
        for (j, &idx) in bulk.indices.iter().enumerate() {
            let offset = j * elem_size;
            let addr = parsed[idx]
                .ok_or(Error::ErrUnexpectedReply { context: "bulk read of unparsed address" })?;
            if offset + elem_size > raw.len() {
                // Truncated response: fail the tail positions individually
                out.push(TagReadResult {
                    name: addr.raw.clone(),
                    file_type: Some(addr.file_type),
                    raw: None,
                    value: Err(Error::InsufficientData {
                        needed: offset + elem_size,
                        available: raw.len(),
                    }),
                });
                continue;
            }
            let elem = raw.slice(offset..offset + elem_size);
            out.push(TagReadResult {
                name: addr.raw.clone(),
                file_type: Some(addr.file_type),
                value: Ok(decode_value(addr, &elem)),
                raw: Some(elem),
            });
        }
        Ok(out)
    }

    /// Write a value to a data table address. Bit addresses go through a
    /// read-modify-write of the containing word.
    pub async fn write(&self, name: &str, value: impl Into<PcccValue>) -> Result<()> {
        let addr = parse_data_table_address(name)?;
        let value = value.into();

        if addr.bit.is_some() {
            return self.write_bit(&addr, value.as_bit()?).await;
        }

        let data = encode_value(&addr, &value)?;
        self.write_address(&addr, &data).await
    }

    /// Set or clear one bit via read-modify-write of its containing word.
    ///
    /// The RMW pair is serialized against other bit writes on this client,
    /// but it cannot be atomic with respect to the PLC itself: a PLC-side
    /// write to another bit of the same word between the read and the write
    /// is lost. Frequently-written bits belong in dedicated command words,
    /// not shared bit files.
    async fn write_bit(&self, addr: &DataTableAddress, bit_value: bool) -> Result<()> {
        let bit = addr.bit.expect("write_bit requires a bit address");

        // Whole-word form of the same address, sub-element preserved
        let word_addr = DataTableAddress { bit: None, ..addr.clone() };

        let _guard = self.rmw_lock.lock().await;

        let current = self.read_address(&word_addr).await?;
        if current.len() < 2 {
            return Err(Error::InsufficientData { needed: 2, available: current.len() });
        }

        let mut word = u16::from_le_bytes([current[0], current[1]]);
        if bit_value {
            word |= 1u16 << bit;
        } else {
            word &= !(1u16 << bit);
        }

        self.write_address(&word_addr, &word.to_le_bytes()).await
    }

    /// Discovered data files rendered as tag descriptors: the reconstructed
    /// name (`N7`, `F8`, ...), the type code and name, and the element count
    /// as the single dimension.
    pub async fn all_tags(&self) -> Result<Vec<TagInfo>> {
        let entries = self.discover_data_files().await?;
        Ok(entries
            .into_iter()
            .map(|e| TagInfo {
                name: e.name(),
                type_code: u16::from(e.file_type),
                type_name: types::type_name(e.file_type),
                dimensions: vec![u32::from(e.element_count)],
                writable: true,
            })
            .collect())
    }
}

/// Tag descriptor produced by discovery for the unified driver surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub type_code: u16,
    pub type_name: &'static str,
    pub dimensions: Vec<u32>,
    pub writable: bool,
}
