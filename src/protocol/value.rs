use super::{
    addr::DataTableAddress,
    error::{Error, Result},
    types::{control, counter, file_type, timer},
};
use bytes::{BufMut, Bytes, BytesMut};

/// Maximum payload of an SLC string element (2-byte length + 82 chars).
pub const MAX_STRING_LEN: usize = 82;

/// Typed value decoded from (or encoded into) PCCC element bytes.
///
/// Compound Timer/Counter/Control elements decode to struct variants with
/// their fixed per-type field schema; control bits are booleans, PRE/ACC and
/// LEN/POS are signed words.
#[derive(Debug, Clone, PartialEq)]
pub enum PcccValue {
    /// Single bit extracted from the addressed word
    Bit(bool),
    /// 16-bit signed integer (Integer, Output, Input, Status, Binary, ASCII,
    /// or a specific Timer/Counter/Control sub-element)
    Int(i16),
    /// 32-bit signed integer (Long)
    Long(i32),
    /// IEEE 754 32-bit float (Float)
    Real(f32),
    /// SLC string (length-prefixed, at most 82 chars)
    Str(String),
    /// Full Timer element
    Timer { en: bool, tt: bool, dn: bool, pre: i16, acc: i16 },
    /// Full Counter element
    Counter { cu: bool, cd: bool, dn: bool, ov: bool, un: bool, pre: i16, acc: i16 },
    /// Full Control element
    Control {
        en: bool,
        eu: bool,
        dn: bool,
        em: bool,
        er: bool,
        ul: bool,
        r#in: bool,
        fd: bool,
        len: i16,
        pos: i16,
    },
    /// Raw bytes for types without a richer decoding (Message, PID, short buffers)
    Raw(Bytes),
}

impl From<i16> for PcccValue {
    fn from(v: i16) -> Self {
        PcccValue::Int(v)
    }
}

impl From<i32> for PcccValue {
    fn from(v: i32) -> Self {
        PcccValue::Long(v)
    }
}

impl From<f32> for PcccValue {
    fn from(v: f32) -> Self {
        PcccValue::Real(v)
    }
}

impl From<bool> for PcccValue {
    fn from(v: bool) -> Self {
        PcccValue::Bit(v)
    }
}

impl From<&str> for PcccValue {
    fn from(v: &str) -> Self {
        PcccValue::Str(v.to_string())
    }
}

impl From<String> for PcccValue {
    fn from(v: String) -> Self {
        PcccValue::Str(v)
    }
}

impl PcccValue {
    fn kind(&self) -> &'static str {
        match self {
            PcccValue::Bit(_) => "BIT",
            PcccValue::Int(_) => "INT",
            PcccValue::Long(_) => "LONG",
            PcccValue::Real(_) => "REAL",
            PcccValue::Str(_) => "STRING",
            PcccValue::Timer { .. } => "TIMER",
            PcccValue::Counter { .. } => "COUNTER",
            PcccValue::Control { .. } => "CONTROL",
            PcccValue::Raw(_) => "RAW",
        }
    }

    /// Broad numeric coercion to i16 for word-sized targets.
    fn as_i16(&self) -> Result<i16> {
        match self {
            PcccValue::Int(v) => Ok(*v),
            PcccValue::Long(v) => Ok(*v as i16),
            PcccValue::Real(v) => Ok(*v as i16),
            PcccValue::Bit(v) => Ok(i16::from(*v)),
            other => Err(Error::ValueConversion { from: other.kind(), to: "INT" }),
        }
    }

    fn as_i32(&self) -> Result<i32> {
        match self {
            PcccValue::Long(v) => Ok(*v),
            PcccValue::Int(v) => Ok(i32::from(*v)),
            PcccValue::Real(v) => Ok(*v as i32),
            PcccValue::Bit(v) => Ok(i32::from(*v)),
            other => Err(Error::ValueConversion { from: other.kind(), to: "LONG" }),
        }
    }

    fn as_f32(&self) -> Result<f32> {
        match self {
            PcccValue::Real(v) => Ok(*v),
            PcccValue::Int(v) => Ok(f32::from(*v)),
            PcccValue::Long(v) => Ok(*v as f32),
            other => Err(Error::ValueConversion { from: other.kind(), to: "REAL" }),
        }
    }

    /// Truthiness used for bit writes.
    pub(crate) fn as_bit(&self) -> Result<bool> {
        match self {
            PcccValue::Bit(v) => Ok(*v),
            PcccValue::Int(v) => Ok(*v != 0),
            PcccValue::Long(v) => Ok(*v != 0),
            PcccValue::Real(v) => Ok(*v != 0.0),
            other => Err(Error::ValueConversion { from: other.kind(), to: "BIT" }),
        }
    }
}

#[inline]
fn word_at(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Decode raw element bytes into a typed value based on the address.
///
/// Mirrors the wire layout exactly: everything is little-endian; short
/// buffers fall back to `Raw`.
pub fn decode_value(addr: &DataTableAddress, data: &[u8]) -> PcccValue {
    if data.is_empty() {
        return PcccValue::Raw(Bytes::new());
    }

    // Bit addresses extract the bit from the word at offset 0
    if let Some(bit) = addr.bit {
        if data.len() >= 2 {
            let word = u16::from_le_bytes([data[0], data[1]]);
            return PcccValue::Bit((word >> bit) & 1 != 0);
        }
        return PcccValue::Raw(Bytes::copy_from_slice(data));
    }

    match addr.file_type {
        file_type::INTEGER
        | file_type::OUTPUT
        | file_type::INPUT
        | file_type::STATUS
        | file_type::BINARY
        | file_type::ASCII => {
            if data.len() < 2 {
                return PcccValue::Raw(Bytes::copy_from_slice(data));
            }
            PcccValue::Int(word_at(data, 0))
        }

        file_type::FLOAT => {
            if data.len() < 4 {
                return PcccValue::Raw(Bytes::copy_from_slice(data));
            }
            PcccValue::Real(f32::from_le_bytes([data[0], data[1], data[2], data[3]]))
        }

        file_type::LONG => {
            if data.len() < 4 {
                return PcccValue::Raw(Bytes::copy_from_slice(data));
            }
            PcccValue::Long(i32::from_le_bytes([data[0], data[1], data[2], data[3]]))
        }

        file_type::TIMER | file_type::COUNTER | file_type::CONTROL => {
            if addr.sub_element > 0 && data.len() >= 2 {
                // Specific sub-element is a plain word
                return PcccValue::Int(word_at(data, 0));
            }
            decode_complex_element(addr.file_type, data)
        }

        file_type::STRING => {
            if data.len() < 2 {
                return PcccValue::Raw(Bytes::copy_from_slice(data));
            }
            let mut len = u16::from_le_bytes([data[0], data[1]]) as usize;
            len = len.min(data.len() - 2).min(MAX_STRING_LEN);
            PcccValue::Str(String::from_utf8_lossy(&data[2..2 + len]).into_owned())
        }

        _ => PcccValue::Raw(Bytes::copy_from_slice(data)),
    }
}

/// Decode a full Timer, Counter or Control element. The control word is at
/// offset 0; missing trailing words decode as zero.
fn decode_complex_element(ft: u8, data: &[u8]) -> PcccValue {
    if data.len() < 2 {
        return PcccValue::Raw(Bytes::copy_from_slice(data));
    }
    let ctl = u16::from_le_bytes([data[0], data[1]]);
    let bit = |pos: u8| (ctl >> pos) & 1 != 0;
    let w1 = if data.len() >= 4 { word_at(data, 2) } else { 0 };
    let w2 = if data.len() >= 6 { word_at(data, 4) } else { 0 };

    match ft {
        file_type::TIMER => PcccValue::Timer {
            en: bit(timer::BIT_EN),
            tt: bit(timer::BIT_TT),
            dn: bit(timer::BIT_DN),
            pre: w1,
            acc: w2,
        },
        file_type::COUNTER => PcccValue::Counter {
            cu: bit(counter::BIT_CU),
            cd: bit(counter::BIT_CD),
            dn: bit(counter::BIT_DN),
            ov: bit(counter::BIT_OV),
            un: bit(counter::BIT_UN),
            pre: w1,
            acc: w2,
        },
        file_type::CONTROL => PcccValue::Control {
            en: bit(control::BIT_EN),
            eu: bit(control::BIT_EU),
            dn: bit(control::BIT_DN),
            em: bit(control::BIT_EM),
            er: bit(control::BIT_ER),
            ul: bit(control::BIT_UL),
            r#in: bit(control::BIT_IN),
            fd: bit(control::BIT_FD),
            len: w1,
            pos: w2,
        },
        _ => PcccValue::Raw(Bytes::copy_from_slice(data)),
    }
}

/// Encode a typed value into the wire bytes for the given address.
///
/// Numeric coercions are broad (any numeric variant casts through the target
/// type, booleans encode as 0/1). Full-element writes to Timer/Counter/
/// Control are rejected: writing a compound type requires a named
/// sub-element like `.PRE` or `.ACC`.
pub fn encode_value(addr: &DataTableAddress, value: &PcccValue) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(addr.read_size());
    match addr.file_type {
        file_type::INTEGER
        | file_type::OUTPUT
        | file_type::INPUT
        | file_type::STATUS
        | file_type::BINARY
        | file_type::ASCII => buf.put_i16_le(value.as_i16()?),

        file_type::FLOAT => buf.put_f32_le(value.as_f32()?),

        file_type::LONG => buf.put_i32_le(value.as_i32()?),

        file_type::TIMER | file_type::COUNTER | file_type::CONTROL => {
            if addr.sub_element == 0 {
                return Err(Error::UnsupportedFeature {
                    feature:
                        "full Timer/Counter/Control element write; specify a sub-element (.PRE, .ACC, ...)",
                });
            }
            buf.put_i16_le(value.as_i16()?);
        }

        file_type::STRING => {
            let s = match value {
                PcccValue::Str(s) => s.as_str(),
                other => {
                    return Err(Error::ValueConversion { from: other.kind(), to: "STRING" })
                }
            };
            let bytes = s.as_bytes();
            let len = bytes.len().min(MAX_STRING_LEN);
            buf.put_u16_le(len as u16);
            buf.put_slice(&bytes[..len]);
        }

        _ => {
            return Err(Error::UnsupportedFeature { feature: "write to this file type" });
        }
    }
    Ok(buf.freeze())
}
