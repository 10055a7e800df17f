use super::{
    error::{Error, Result},
    types::{self, control, counter, file_type, timer, SUB_ELEMENT_SIZE},
};
use serde::{Deserialize, Serialize};

/// Strongly typed SLC/MicroLogix data table address with pre-parsed fields.
///
/// Address grammar: `Prefix[FileNumber] ':' Element [('/' Bit) | ('.' Sub)]`
///
/// Examples:
///
/// - `N7:0` integer file 7, element 0
/// - `F8:5` float file 8, element 5
/// - `B3:0/5` binary file 3, element 0, bit 5
/// - `T4:0.ACC` timer file 4, element 0, accumulated value (sub-element 2)
/// - `T4:0.DN` timer file 4, element 0, done bit (control word bit 13)
/// - `S:1/5` status file (default file 2), element 1, bit 5
/// - `ST9:0` string file 9, element 0
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTableAddress {
    /// PCCC file type code (e.g. 0x89 for Integer)
    pub file_type: u8,
    /// Data file number
    pub file_number: u16,
    /// Element number within the file
    pub element: u16,
    /// Sub-element number (0 for simple access; PRE=1, ACC=2 for Timer/Counter)
    pub sub_element: u16,
    /// Bit position within the addressed word, `None` for whole-word access
    pub bit: Option<u8>,
    /// Original type prefix (e.g. "N", "T", "ST")
    pub type_letter: String,
    /// Original address string
    pub raw: String,
}

impl DataTableAddress {
    /// Number of bytes to request from the PLC for this address.
    pub fn read_size(&self) -> usize {
        if self.bit.is_some() {
            // Bit access reads the containing word
            return SUB_ELEMENT_SIZE;
        }
        if types::is_complex_type(self.file_type) {
            if self.sub_element > 0 {
                // Specific sub-element is one 16-bit word
                return SUB_ELEMENT_SIZE;
            }
            // Full complex element reads all sub-elements
            return types::element_size(self.file_type);
        }
        types::element_size(self.file_type)
    }

    /// Whether this address can participate in a multi-element bulk read
    /// (whole-element access only).
    pub fn is_bulkable(&self) -> bool {
        self.sub_element == 0 && self.bit.is_none()
    }
}

impl std::fmt::Display for DataTableAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<&str> for DataTableAddress {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        parse_data_table_address(value)
    }
}

/// Parse a textual SLC/PLC-5/MicroLogix data table address.
pub fn parse_data_table_address(input: &str) -> Result<DataTableAddress> {
    if input.is_empty() {
        return Err(Error::ErrInvalidAddress("empty address".into()));
    }

    let (file_spec, remainder) = input
        .split_once(':')
        .ok_or_else(|| invalid(input, "missing colon separator"))?;

    let (type_letter, file_num) = parse_file_spec(input, file_spec)?;
    let (ft, default_file_num) = lookup_file_type(input, &type_letter)?;

    let file_number = match file_num {
        Some(n) => n,
        None => default_file_num
            .ok_or_else(|| invalid(input, "file number required for this type"))?,
    };

    if remainder.is_empty() {
        return Err(invalid(input, "missing element number"));
    }

    let mut addr = DataTableAddress {
        file_type: ft,
        file_number,
        element: 0,
        sub_element: 0,
        bit: None,
        type_letter,
        raw: input.to_string(),
    };
    parse_element_and_modifiers(input, remainder, &mut addr)?;
    Ok(addr)
}

#[inline]
fn invalid(addr: &str, reason: &str) -> Error {
    Error::ErrInvalidAddress(format!("{addr:?}: {reason}"))
}

/// Extract the type letters and optional file number from the file specifier,
/// e.g. "N7" → ("N", Some(7)), "ST9" → ("ST", Some(9)), "O" → ("O", None).
fn parse_file_spec(input: &str, spec: &str) -> Result<(String, Option<u16>)> {
    if spec.is_empty() {
        return Err(invalid(input, "empty file specifier"));
    }
    if !spec.is_ascii() {
        return Err(invalid(input, "unknown file type prefix"));
    }

    // Two-letter prefixes first (ST, MG, PD) so "ST9" is not read as "S"+"T9"
    if spec.len() >= 2 {
        let prefix = spec[..2].to_ascii_uppercase();
        if matches!(prefix.as_str(), "ST" | "MG" | "PD") {
            return Ok((prefix, parse_file_number(input, &spec[2..])?));
        }
    }

    let prefix = spec[..1].to_ascii_uppercase();
    if !matches!(
        prefix.as_str(),
        "O" | "I" | "S" | "B" | "T" | "C" | "R" | "N" | "F" | "A" | "L"
    ) {
        return Err(invalid(input, "unknown file type prefix"));
    }
    Ok((prefix, parse_file_number(input, &spec[1..])?))
}

#[inline]
fn parse_file_number(input: &str, digits: &str) -> Result<Option<u16>> {
    if digits.is_empty() {
        return Ok(None);
    }
    digits
        .parse::<u16>()
        .map(Some)
        .map_err(|_| invalid(input, "invalid file number"))
}

/// Map a type prefix to its PCCC file type code and optional default file
/// number (`O` → 0, `I` → 1, `S` → 2; everything else requires an explicit
/// file number).
fn lookup_file_type(input: &str, type_letter: &str) -> Result<(u8, Option<u16>)> {
    match type_letter {
        "O" => Ok((file_type::OUTPUT, Some(0))),
        "I" => Ok((file_type::INPUT, Some(1))),
        "S" => Ok((file_type::STATUS, Some(2))),
        "B" => Ok((file_type::BINARY, None)),
        "T" => Ok((file_type::TIMER, None)),
        "C" => Ok((file_type::COUNTER, None)),
        "R" => Ok((file_type::CONTROL, None)),
        "N" => Ok((file_type::INTEGER, None)),
        "F" => Ok((file_type::FLOAT, None)),
        "A" => Ok((file_type::ASCII, None)),
        "L" => Ok((file_type::LONG, None)),
        "ST" => Ok((file_type::STRING, None)),
        "MG" => Ok((file_type::MESSAGE, None)),
        "PD" => Ok((file_type::PID, None)),
        _ => Err(invalid(input, "unsupported file type")),
    }
}

/// Parse `Element[/Bit]` or `Element[.Sub]` after the colon.
fn parse_element_and_modifiers(
    input: &str,
    remainder: &str,
    addr: &mut DataTableAddress,
) -> Result<()> {
    if let Some((elem_s, bit_s)) = remainder.split_once('/') {
        addr.element = parse_element(input, elem_s)?;
        let bit = bit_s
            .parse::<u8>()
            .map_err(|_| invalid(input, "invalid bit number"))?;
        addr.bit = Some(check_bit(input, bit)?);
        return Ok(());
    }

    if let Some((elem_s, sub_s)) = remainder.split_once('.') {
        addr.element = parse_element(input, elem_s)?;
        return parse_sub_element(input, sub_s, addr);
    }

    addr.element = parse_element(input, remainder)?;
    Ok(())
}

#[inline]
fn parse_element(input: &str, digits: &str) -> Result<u16> {
    digits
        .parse::<u16>()
        .map_err(|_| invalid(input, "invalid element number"))
}

#[inline]
fn check_bit(input: &str, bit: u8) -> Result<u8> {
    if bit <= 15 {
        Ok(bit)
    } else {
        Err(invalid(input, "bit number out of range (0-15)"))
    }
}

/// Resolve a named sub-element (PRE, ACC, DN, ...) to a sub-element index and
/// optional bit position within the control word. Numeric sub-elements are
/// accepted for every file type.
fn parse_sub_element(input: &str, name: &str, addr: &mut DataTableAddress) -> Result<()> {
    let name = name.to_ascii_uppercase();

    let resolved = match addr.file_type {
        file_type::TIMER => match name.as_str() {
            "PRE" => Some((timer::PRE, None)),
            "ACC" => Some((timer::ACC, None)),
            "EN" => Some((timer::CONTROL, Some(timer::BIT_EN))),
            "TT" => Some((timer::CONTROL, Some(timer::BIT_TT))),
            "DN" => Some((timer::CONTROL, Some(timer::BIT_DN))),
            _ => None,
        },
        file_type::COUNTER => match name.as_str() {
            "PRE" => Some((counter::PRE, None)),
            "ACC" => Some((counter::ACC, None)),
            "CU" => Some((counter::CONTROL, Some(counter::BIT_CU))),
            "CD" => Some((counter::CONTROL, Some(counter::BIT_CD))),
            "DN" => Some((counter::CONTROL, Some(counter::BIT_DN))),
            "OV" => Some((counter::CONTROL, Some(counter::BIT_OV))),
            "UN" => Some((counter::CONTROL, Some(counter::BIT_UN))),
            _ => None,
        },
        file_type::CONTROL => match name.as_str() {
            "LEN" => Some((control::LEN, None)),
            "POS" => Some((control::POS, None)),
            "EN" => Some((control::WORD, Some(control::BIT_EN))),
            "EU" => Some((control::WORD, Some(control::BIT_EU))),
            "DN" => Some((control::WORD, Some(control::BIT_DN))),
            "EM" => Some((control::WORD, Some(control::BIT_EM))),
            "ER" => Some((control::WORD, Some(control::BIT_ER))),
            "UL" => Some((control::WORD, Some(control::BIT_UL))),
            "IN" => Some((control::WORD, Some(control::BIT_IN))),
            "FD" => Some((control::WORD, Some(control::BIT_FD))),
            _ => None,
        },
        _ => None,
    };

    if let Some((sub, bit)) = resolved {
        addr.sub_element = sub;
        addr.bit = bit;
        return Ok(());
    }

    match name.parse::<u16>() {
        Ok(sub) => {
            addr.sub_element = sub;
            Ok(())
        }
        Err(_) => Err(invalid(
            input,
            match addr.file_type {
                file_type::TIMER => "unknown timer sub-element (use PRE, ACC, EN, TT, DN)",
                file_type::COUNTER => {
                    "unknown counter sub-element (use PRE, ACC, CU, CD, DN, OV, UN)"
                }
                file_type::CONTROL => {
                    "unknown control sub-element (use LEN, POS, EN, EU, DN, EM, ER, UL, IN, FD)"
                }
                _ => "unknown sub-element for this file type",
            },
        )),
    }
}
