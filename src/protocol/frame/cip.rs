use super::{
    super::error::{Error, Result},
    epath::EPath,
};
use bytes::{BufMut, Bytes, BytesMut};

/// CIP service codes used by this stack.
pub mod service {
    /// Execute PCCC, sent to the PCCC object (class 0x67, instance 1)
    pub const EXECUTE_PCCC: u8 = 0x4B;
    /// Unconnected_Send, sent to the Connection Manager (class 0x06, instance 1)
    pub const UNCONNECTED_SEND: u8 = 0x52;
    /// Bit set on every reply service code
    pub const REPLY_FLAG: u8 = 0x80;
    /// Unconnected_Send reply wrapping an embedded reply
    pub const UNCONNECTED_SEND_REPLY: u8 = 0xD2;
}

/// Connection Manager class for routed messaging.
pub const CONNECTION_MANAGER_CLASS: u16 = 0x06;

// Unconnected_Send pacing: priority/time tick and timeout ticks
const PRIORITY_TIME_TICK: u8 = 0x0A;
const TIMEOUT_TICKS: u8 = 0x05;

/// Build a CIP message-router request:
/// `[service][path_word_len][path][service_data]`.
pub fn build_request(service_code: u8, path: &EPath, service_data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(2 + path.len() + service_data.len());
    buf.put_u8(service_code);
    buf.put_u8(path.word_len());
    buf.put_slice(path.as_bytes());
    buf.put_slice(service_data);
    buf.freeze()
}

/// Wrap an embedded CIP request in Unconnected_Send for routing through the
/// Connection Manager:
/// `{priority_tick, timeout_ticks, embedded_len, embedded, pad?, route_words,
/// reserved, route_path}`.
pub fn build_unconnected_send(embedded: &[u8], route_path: &RoutePath) -> Bytes {
    let route = route_path.as_bytes();
    let mut body = BytesMut::with_capacity(4 + embedded.len() + 1 + 2 + route.len());
    body.put_u8(PRIORITY_TIME_TICK);
    body.put_u8(TIMEOUT_TICKS);
    body.put_u16_le(embedded.len() as u16);
    body.put_slice(embedded);
    if embedded.len() % 2 != 0 {
        body.put_u8(0x00); // pad embedded request to a word boundary
    }
    body.put_u8((route.len() / 2) as u8);
    body.put_u8(0x00); // reserved
    body.put_slice(route);

    let cm_path = EPath::new().class(CONNECTION_MANAGER_CLASS).instance(1);
    build_request(service::UNCONNECTED_SEND, &cm_path, &body)
}

/// Parse a CIP reply, validating the reply service against the request
/// service and mapping a non-zero general status to `Error::CipStatus`.
/// Returns the service payload after the status words.
///
/// A 0xD2 Unconnected_Send reply wrapping the real embedded reply is
/// unwrapped transparently (recursively, in case of nested routing).
pub fn parse_reply(data: &[u8], request_service: u8) -> Result<&[u8]> {
    if data.len() < 4 {
        return Err(Error::InsufficientData { needed: 4, available: data.len() });
    }

    let reply_service = data[0];
    let status = data[2];
    let addl_status_words = data[3] as usize;
    let payload_start = 4 + addl_status_words * 2;

    if reply_service == service::UNCONNECTED_SEND_REPLY
        && request_service != service::UNCONNECTED_SEND
    {
        if status != 0 {
            let extended = extended_status(data, addl_status_words);
            return Err(Error::CipStatus { status, extended });
        }
        if payload_start >= data.len() {
            return Err(Error::ErrUnexpectedReply { context: "UCMM reply has no embedded data" });
        }
        return parse_reply(&data[payload_start..], request_service);
    }

    if reply_service != request_service | service::REPLY_FLAG {
        return Err(Error::ErrUnexpectedReply { context: "reply service does not match request" });
    }

    if status != 0 {
        let extended = extended_status(data, addl_status_words);
        return Err(Error::CipStatus { status, extended });
    }

    if payload_start > data.len() {
        return Err(Error::InsufficientData { needed: payload_start, available: data.len() });
    }
    Ok(&data[payload_start..])
}

#[inline]
fn extended_status(data: &[u8], addl_status_words: usize) -> Option<u16> {
    if addl_status_words >= 1 && data.len() >= 6 {
        Some(u16::from_le_bytes([data[4], data[5]]))
    } else {
        None
    }
}

/// A CIP route path: port/address pairs describing a multi-hop route,
/// immutable after configuration.
///
/// The textual form is the Rockwell comma-separated notation, e.g. `"1,0"`
/// (backplane, slot 0) or `"1,1,2,192.168.100.1"` where an IP address hop is
/// carried as an extended link address segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePath {
    bytes: Bytes,
}

impl RoutePath {
    /// Wrap an already-encoded route path byte sequence. The length must be
    /// even (the wrapper reports it in 16-bit words).
    pub fn from_bytes(bytes: Bytes) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Err(Error::InvalidConfiguration("route path must be a non-empty even-length byte sequence"));
        }
        Ok(Self { bytes })
    }

    /// Parse the textual comma-separated form into port/address segments.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(',').map(str::trim).collect();
        if parts.is_empty() || parts.len() % 2 != 0 {
            return Err(Error::InvalidConfiguration("route path needs port,address pairs"));
        }

        let mut buf = BytesMut::new();
        for pair in parts.chunks(2) {
            let port: u8 = pair[0]
                .parse()
                .map_err(|_| Error::InvalidConfiguration("route path port is not a number"))?;
            if port > 0x0E {
                return Err(Error::InvalidConfiguration("route path port out of range"));
            }
            match pair[1].parse::<u8>() {
                Ok(addr) => {
                    buf.put_u8(port);
                    buf.put_u8(addr);
                }
                // Not a plain link address: carry it as an extended (symbolic)
                // link segment, e.g. an IP address hop
                Err(_) => {
                    let link = pair[1].as_bytes();
                    if link.is_empty() || link.len() > u8::MAX as usize {
                        return Err(Error::InvalidConfiguration("route path link address invalid"));
                    }
                    buf.put_u8(0x10 | port);
                    buf.put_u8(link.len() as u8);
                    buf.put_slice(link);
                    if link.len() % 2 != 0 {
                        buf.put_u8(0x00);
                    }
                }
            }
        }
        Ok(Self { bytes: buf.freeze() })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_request_layout() {
        let path = EPath::new().class(0x67).instance(1);
        let req = build_request(service::EXECUTE_PCCC, &path, &[0xDE, 0xAD]);
        assert_eq!(req.as_ref(), &[0x4B, 0x02, 0x20, 0x67, 0x24, 0x01, 0xDE, 0xAD]);
    }

    #[test]
    fn unconnected_send_pads_odd_embedded() {
        let route = RoutePath::parse("1,0").unwrap();
        let req = build_unconnected_send(&[0x01, 0x02, 0x03], &route);
        // service + CM path
        assert_eq!(&req[..6], &[0x52, 0x02, 0x20, 0x06, 0x24, 0x01]);
        // priority/timeout ticks + embedded length
        assert_eq!(&req[6..10], &[0x0A, 0x05, 0x03, 0x00]);
        // embedded + pad
        assert_eq!(&req[10..14], &[0x01, 0x02, 0x03, 0x00]);
        // route words + reserved + route path
        assert_eq!(&req[14..], &[0x01, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn unconnected_send_even_embedded_not_padded() {
        let route = RoutePath::parse("1,0").unwrap();
        let req = build_unconnected_send(&[0x01, 0x02], &route);
        assert_eq!(&req[10..], &[0x01, 0x02, 0x01, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn route_path_with_ip_hop() {
        let route = RoutePath::parse("1,1,2,192.168.100.1").unwrap();
        let bytes = route.as_bytes();
        assert_eq!(&bytes[..2], &[0x01, 0x01]);
        assert_eq!(bytes[2], 0x12); // extended link segment on port 2
        assert_eq!(bytes[3] as usize, "192.168.100.1".len());
        assert_eq!(&bytes[4..17], b"192.168.100.1");
        assert_eq!(bytes[17], 0x00); // pad to even
        assert_eq!(bytes.len() % 2, 0);
    }

    #[test]
    fn route_path_rejects_odd_parts() {
        assert!(RoutePath::parse("1").is_err());
        assert!(RoutePath::parse("1,0,2").is_err());
        assert!(RoutePath::parse("").is_err());
    }

    #[test]
    fn parse_reply_success_and_status() {
        // 0xCB reply, zero status, payload follows
        let ok = [0xCB, 0x00, 0x00, 0x00, 0x07, 0x08];
        assert_eq!(parse_reply(&ok, service::EXECUTE_PCCC).unwrap(), &[0x07, 0x08]);

        // Non-zero status with one extended word
        let bad = [0xCB, 0x00, 0x08, 0x01, 0x34, 0x12];
        match parse_reply(&bad, service::EXECUTE_PCCC) {
            Err(Error::CipStatus { status: 0x08, extended: Some(0x1234) }) => {}
            other => panic!("unexpected: {other:?}"),
        }

        // Wrong reply service
        let wrong = [0xCC, 0x00, 0x00, 0x00];
        assert!(parse_reply(&wrong, service::EXECUTE_PCCC).is_err());
    }

    #[test]
    fn parse_reply_unwraps_ucmm() {
        // UCMM wrapper (0xD2, success) containing a 0xCB reply
        let wrapped = [0xD2, 0x00, 0x00, 0x00, 0xCB, 0x00, 0x00, 0x00, 0x2A, 0x00];
        assert_eq!(
            parse_reply(&wrapped, service::EXECUTE_PCCC).unwrap(),
            &[0x2A, 0x00]
        );

        // Failed UCMM wrapper surfaces the routing status
        let failed = [0xD2, 0x00, 0x01, 0x00];
        assert!(matches!(
            parse_reply(&failed, service::EXECUTE_PCCC),
            Err(Error::CipStatus { status: 0x01, .. })
        ));
    }
}
