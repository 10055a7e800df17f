use std::result::Result as StdResult;
use thiserror::Error as ThisError;

/// Unified PCCC/EIP result type
pub type Result<T> = StdResult<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timeout")]
    ErrConnectTimeout,

    #[error("request timeout")]
    ErrRequestTimeout,

    #[error("invalid frame")]
    ErrInvalidFrame,

    #[error("unexpected reply: {context}")]
    ErrUnexpectedReply { context: &'static str },

    #[error("invalid address: {0}")]
    ErrInvalidAddress(String),

    #[error("can not use closed connection")]
    ErrUseClosedConnection,

    #[error("session is not active")]
    ErrNotActive,

    #[error("invalid configuration for: {0}")]
    InvalidConfiguration(&'static str),

    /// Input does not have enough bytes to complete the operation
    #[error("insufficient data: needed {needed} bytes, available {available} bytes")]
    InsufficientData { needed: usize, available: usize },

    /// Feature is recognized but deliberately not supported by this implementation
    #[error("unsupported feature: {feature}")]
    UnsupportedFeature { feature: &'static str },

    /// Encapsulation header carried a non-zero status word
    #[error("EIP encapsulation error: status=0x{0:08X}")]
    EncapStatus(u32),

    /// CIP service reply carried a non-zero general status
    #[error("{}", format_cip_status(*.status, *.extended))]
    CipStatus { status: u8, extended: Option<u16> },

    /// PCCC reply carried a non-zero STS, optionally with an extended status byte
    #[error("{}", format_pccc_status(*.sts, *.ext))]
    PcccStatus { sts: u8, ext: u8 },

    /// Device reported a catalog string whose family prefix has no known directory layout
    #[error("unknown processor catalog prefix {0:?}")]
    UnknownProcessorFamily(String),

    /// Value cannot be coerced to the wire type required by the target address
    #[error("cannot convert {from} to {to}")]
    ValueConversion {
        from: &'static str,
        to: &'static str,
    },
}

impl Error {
    /// Whether this error means the underlying session is gone and the caller
    /// should reconnect. Per-tag PCCC/CIP status errors are not connection loss.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::ErrConnectTimeout
                | Error::ErrRequestTimeout
                | Error::ErrUseClosedConnection
                | Error::ErrNotActive
        )
    }

    /// The STS category when this is a PCCC status error.
    pub fn pccc_category(&self) -> Option<PcccStatusCategory> {
        match self {
            Error::PcccStatus { sts, .. } => PcccStatusCategory::try_from(*sts).ok(),
            _ => None,
        }
    }
}

/// PCCC STS categories live in the high nibble of the status byte.
/// 0xF0 flags an extended status byte following the TNS.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcccStatusCategory {
    Success = 0x00,
    IllegalCommand = 0x10,
    HostProblem = 0x20,
    RemoteProblem = 0x30,
    HardwareFault = 0x40,
    AddressProblem = 0x50,
    FunctionNotAllowed = 0x60,
    TargetProblem = 0x70,
    TypesMismatch = 0x80,
    DataFieldError = 0x90,
    AccessDenied = 0xA0,
    NoFunctionError = 0xB0,
    DataConversionError = 0xC0,
    ScannerSuspended = 0xD0,
    NotCompatible = 0xE0,
    ExtendedStatus = 0xF0,
}

impl TryFrom<u8> for PcccStatusCategory {
    type Error = ();

    fn try_from(value: u8) -> StdResult<Self, ()> {
        match value & 0xF0 {
            0x00 => Ok(Self::Success),
            0x10 => Ok(Self::IllegalCommand),
            0x20 => Ok(Self::HostProblem),
            0x30 => Ok(Self::RemoteProblem),
            0x40 => Ok(Self::HardwareFault),
            0x50 => Ok(Self::AddressProblem),
            0x60 => Ok(Self::FunctionNotAllowed),
            0x70 => Ok(Self::TargetProblem),
            0x80 => Ok(Self::TypesMismatch),
            0x90 => Ok(Self::DataFieldError),
            0xA0 => Ok(Self::AccessDenied),
            0xB0 => Ok(Self::NoFunctionError),
            0xC0 => Ok(Self::DataConversionError),
            0xD0 => Ok(Self::ScannerSuspended),
            0xE0 => Ok(Self::NotCompatible),
            0xF0 => Ok(Self::ExtendedStatus),
            _ => Err(()),
        }
    }
}

/// Human-readable category for a PCCC STS byte (keyed on its high nibble).
pub fn pccc_status_name(sts: u8) -> &'static str {
    match sts & 0xF0 {
        0x00 => "Success",
        0x10 => "Illegal Command or Format",
        0x20 => "Host has a Problem",
        0x30 => "Remote Node has a Problem",
        0x40 => "Hardware Fault",
        0x50 => "Address Problem",
        0x60 => "Function Not Allowed",
        0x70 => "Target Node Problem",
        0x80 => "Command Parameter Types Mismatch",
        0x90 => "Data Field Error",
        0xA0 => "Access Denied",
        0xB0 => "No Function Error",
        0xC0 => "Data Conversion Error",
        0xD0 => "Scanner Suspended Error",
        0xE0 => "Not Compatible",
        0xF0 => "Extended Status",
        _ => "Unknown Status",
    }
}

/// Human-readable name for a PCCC EXT_STS byte (present when STS has the
/// 0xF0 extended flag).
pub fn pccc_ext_status_name(ext: u8) -> &'static str {
    match ext {
        0x01 => "Not Allowed",
        0x02 => "Privilege Violation",
        0x03 => "Not Executed",
        0x04 => "Bad IOS Address",
        0x05 => "Parameter Out of Range",
        0x06 => "Address Field Too Short",
        0x07 => "Address Does Not Exist",
        0x08 => "Data Field Too Short",
        0x09 => "Insufficient Data Field",
        0x0C => "File Number Does Not Exist",
        0x0F => "Wrong File Type",
        0x10 => "Element Out of Range",
        0x11 => "Sub-Element Out of Range",
        0x12 => "File Access Denied",
        0x13 => "Access Denied",
        _ => "Unknown Extended Status",
    }
}

fn format_pccc_status(sts: u8, ext: u8) -> String {
    if sts & 0xF0 == 0xF0 && ext != 0 {
        format!(
            "PCCC error: {} (STS=0x{:02X}), extended: {} (EXT_STS=0x{:02X})",
            pccc_status_name(sts),
            sts,
            pccc_ext_status_name(ext),
            ext
        )
    } else {
        format!("PCCC error: {} (STS=0x{:02X})", pccc_status_name(sts), sts)
    }
}

fn format_cip_status(status: u8, extended: Option<u16>) -> String {
    match extended {
        Some(ext) => format!(
            "CIP error: {} (status=0x{:02X}, extended=0x{:04X})",
            cip_status_name(status),
            status,
            ext
        ),
        None => format!(
            "CIP error: {} (status=0x{:02X})",
            cip_status_name(status),
            status
        ),
    }
}

/// Human-readable name for a CIP general status code.
pub fn cip_status_name(status: u8) -> &'static str {
    match status {
        0x00 => "Success",
        0x01 => "Connection Failure",
        0x02 => "Resource Unavailable",
        0x03 => "Invalid Parameter Value",
        0x04 => "Path Segment Error",
        0x05 => "Path Destination Unknown",
        0x06 => "Partial Transfer",
        0x08 => "Service Not Supported",
        0x09 => "Invalid Attribute Value",
        0x0B => "Already In Requested Mode",
        0x0C => "Object State Conflict",
        0x0E => "Attribute Not Settable",
        0x0F => "Privilege Violation",
        0x10 => "Device State Conflict",
        0x11 => "Reply Data Too Large",
        0x13 => "Not Enough Data",
        0x14 => "Attribute Not Supported",
        0x15 => "Too Much Data",
        0x16 => "Object Does Not Exist",
        0x1E => "Embedded Service Error",
        0x26 => "Invalid Parameter",
        _ => "Unknown General Status",
    }
}
