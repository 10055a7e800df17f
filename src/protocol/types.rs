use serde_repr::{Deserialize_repr, Serialize_repr};

/// PCCC file type codes identifying the data file type in SLC 500 / PLC-5 /
/// MicroLogix data tables. The high bit (0x80) marks a "typed" file on the
/// wire. Kept as raw `u8` constants: directory rows carry arbitrary bytes
/// and must pass through unmapped.
pub mod file_type {
    pub const OUTPUT: u8 = 0x82; // O
    pub const INPUT: u8 = 0x83; // I
    pub const STATUS: u8 = 0x84; // S
    pub const BINARY: u8 = 0x85; // B
    pub const TIMER: u8 = 0x86; // T
    pub const COUNTER: u8 = 0x87; // C
    pub const CONTROL: u8 = 0x88; // R
    pub const INTEGER: u8 = 0x89; // N
    pub const FLOAT: u8 = 0x8A; // F
    pub const STRING: u8 = 0x8D; // ST
    pub const ASCII: u8 = 0x8E; // A
    pub const LONG: u8 = 0x91; // L
    pub const MESSAGE: u8 = 0x92; // MG (MicroLogix)
    pub const PID: u8 = 0x93; // PD

    /// Marks a deleted or unused slot in the file directory.
    pub const PLACEHOLDER: u8 = 0x81;
}

/// Sub-elements of Timer/Counter/Control elements are all 16-bit words.
pub const SUB_ELEMENT_SIZE: usize = 2;

/// Timer sub-element indices within an element (control word, PRE, ACC).
pub mod timer {
    pub const CONTROL: u16 = 0;
    pub const PRE: u16 = 1;
    pub const ACC: u16 = 2;

    // Control word bit positions
    pub const BIT_EN: u8 = 15;
    pub const BIT_TT: u8 = 14;
    pub const BIT_DN: u8 = 13;
}

/// Counter sub-element indices within an element (control word, PRE, ACC).
pub mod counter {
    pub const CONTROL: u16 = 0;
    pub const PRE: u16 = 1;
    pub const ACC: u16 = 2;

    pub const BIT_CU: u8 = 15;
    pub const BIT_CD: u8 = 14;
    pub const BIT_DN: u8 = 13;
    pub const BIT_OV: u8 = 12;
    pub const BIT_UN: u8 = 11;
}

/// Control sub-element indices within an element (control word, LEN, POS).
pub mod control {
    pub const WORD: u16 = 0;
    pub const LEN: u16 = 1;
    pub const POS: u16 = 2;

    pub const BIT_EN: u8 = 15;
    pub const BIT_EU: u8 = 14;
    pub const BIT_DN: u8 = 13;
    pub const BIT_EM: u8 = 12;
    pub const BIT_ER: u8 = 11;
    pub const BIT_UL: u8 = 10;
    pub const BIT_IN: u8 = 9;
    pub const BIT_FD: u8 = 8;
}

/// Size in bytes of one element of the given file type.
pub fn element_size(file_type: u8) -> usize {
    match file_type {
        file_type::OUTPUT
        | file_type::INPUT
        | file_type::STATUS
        | file_type::BINARY
        | file_type::INTEGER
        | file_type::ASCII => 2,
        // 3 x 16-bit words: control word + PRE/ACC (or LEN/POS)
        file_type::TIMER | file_type::COUNTER | file_type::CONTROL => 6,
        file_type::FLOAT | file_type::LONG => 4,
        // 2-byte length + 82 chars
        file_type::STRING => 84,
        file_type::MESSAGE => 50,
        file_type::PID => 46,
        // Default to one 16-bit word
        _ => 2,
    }
}

/// Whether the file type has named sub-elements (Timer, Counter, Control).
pub fn is_complex_type(file_type: u8) -> bool {
    matches!(
        file_type,
        file_type::TIMER | file_type::COUNTER | file_type::CONTROL
    )
}

/// Human-readable name for a file type code.
pub fn type_name(file_type: u8) -> &'static str {
    match file_type {
        file_type::OUTPUT => "Output",
        file_type::INPUT => "Input",
        file_type::STATUS => "Status",
        file_type::BINARY => "Binary",
        file_type::TIMER => "Timer",
        file_type::COUNTER => "Counter",
        file_type::CONTROL => "Control",
        file_type::INTEGER => "Integer",
        file_type::FLOAT => "Float",
        file_type::STRING => "String",
        file_type::ASCII => "ASCII",
        file_type::LONG => "Long",
        file_type::MESSAGE => "Message",
        file_type::PID => "PID",
        _ => "Unknown",
    }
}

/// Address prefix letters for a file type code, e.g. 0x89 → "N", 0x8D → "ST".
/// Empty for unknown codes.
pub fn type_prefix(file_type: u8) -> &'static str {
    match file_type {
        file_type::OUTPUT => "O",
        file_type::INPUT => "I",
        file_type::STATUS => "S",
        file_type::BINARY => "B",
        file_type::TIMER => "T",
        file_type::COUNTER => "C",
        file_type::CONTROL => "R",
        file_type::INTEGER => "N",
        file_type::FLOAT => "F",
        file_type::STRING => "ST",
        file_type::ASCII => "A",
        file_type::LONG => "L",
        file_type::MESSAGE => "MG",
        file_type::PID => "PD",
        _ => "",
    }
}

/// Processor family tag. All three families speak the same SLC protected
/// typed logical commands over Execute-PCCC; the kind is kept for identity
/// and discovery gating (PLC-5 has no readable file directory), not framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum PlcKind {
    Slc500 = 0,
    Plc5 = 1,
    MicroLogix = 2,
}

impl PlcKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlcKind::Slc500 => "SLC 500",
            PlcKind::Plc5 => "PLC-5",
            PlcKind::MicroLogix => "MicroLogix",
        }
    }

    /// File directory discovery works on SLC 500 and MicroLogix only.
    pub fn supports_discovery(&self) -> bool {
        !matches!(self, PlcKind::Plc5)
    }
}

impl Default for PlcKind {
    fn default() -> Self {
        PlcKind::Slc500
    }
}

impl std::fmt::Display for PlcKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
