use super::{
    error::{Error, Result},
    types,
};

/// Binary layout of the file directory (system file 0) for one processor
/// family. Families store the directory with different row shapes and
/// offsets; the catalog prefix selects the layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sys0Layout {
    /// Offset within a row of the file type byte
    pub file_type_offset: usize,
    /// Offset within a row of the element count
    pub size_element_offset: usize,
    /// Byte offset where directory entries begin
    pub directory_start: usize,
    /// Size of each directory row in bytes
    pub row_size: usize,
    /// Constant subtracted from the raw directory size (MicroLogix 1100+)
    pub size_const: u16,
}

/// One data file discovered from the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDirectoryEntry {
    /// Data file number (e.g. 7 for N7), gaps preserved
    pub file_number: u16,
    /// PCCC file type code
    pub file_type: u8,
    /// Address prefix derived from the file type (e.g. "N")
    pub type_prefix: &'static str,
    /// Number of elements in the file
    pub element_count: u16,
}

impl FileDirectoryEntry {
    /// Reconstructed file address name, e.g. "N7" or "FILE12" when the type
    /// has no prefix letter.
    pub fn name(&self) -> String {
        if self.type_prefix.is_empty() {
            format!("FILE{}", self.file_number)
        } else {
            format!("{}{}", self.type_prefix, self.file_number)
        }
    }
}

/// Directory reads are chunked to stay inside small-frame limits.
pub const DIRECTORY_READ_CHUNK: u16 = 80;

/// The catalog string lives at bytes 12..22 of the diagnostic status data.
pub const CATALOG_RANGE: std::ops::Range<usize> = 12..22;

/// Look up the directory layout for a catalog family prefix.
///
/// Recognized families: 1747 (SLC 5/03-5/05), 1761 (MicroLogix 1000),
/// 1762/1763/1764 (MicroLogix 1100/1200/1500), 1766 (MicroLogix 1400).
pub fn lookup_sys0_layout(prefix: &str) -> Result<Sys0Layout> {
    match prefix {
        "1747" => Ok(Sys0Layout {
            file_type_offset: 0x01,
            size_element_offset: 0x23,
            directory_start: 79,
            row_size: 10,
            size_const: 0,
        }),
        "1761" => Ok(Sys0Layout {
            file_type_offset: 0x00,
            size_element_offset: 0x23,
            directory_start: 93,
            row_size: 8,
            size_const: 0,
        }),
        "1762" | "1763" | "1764" => Ok(Sys0Layout {
            file_type_offset: 0x02,
            size_element_offset: 0x28,
            directory_start: 233,
            row_size: 10,
            size_const: 19968,
        }),
        "1766" => Ok(Sys0Layout {
            file_type_offset: 0x03,
            size_element_offset: 0x2B,
            directory_start: 233,
            row_size: 10,
            size_const: 19968,
        }),
        other => Err(Error::UnknownProcessorFamily(other.to_string())),
    }
}

/// Extract a catalog string from its fixed-width field: cut at the first
/// NUL, then trim trailing spaces.
pub fn extract_catalog(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end_matches(' ').to_string()
}

/// First four characters of the catalog identify the family (e.g. "1747").
pub fn catalog_prefix(catalog: &str) -> &str {
    if catalog.len() < 4 {
        catalog
    } else {
        &catalog[..4]
    }
}

/// Walk raw directory rows and emit an entry per live data file.
///
/// Placeholder (0x81) and zero file types mark deleted/empty slots: they are
/// skipped but still advance the file number, so reconstructed addresses
/// (`N7`, `F8`, ...) line up with the PLC-side programming.
pub fn parse_file_directory(data: &[u8], layout: &Sys0Layout) -> Vec<FileDirectoryEntry> {
    let mut entries = Vec::new();
    let mut file_number: u16 = 0;

    let mut offset = 0;
    while offset + layout.row_size <= data.len() {
        let row = &data[offset..offset + layout.row_size];
        offset += layout.row_size;

        let ft = match row.get(layout.file_type_offset) {
            Some(&ft) => ft,
            None => {
                file_number += 1;
                continue;
            }
        };

        if ft == types::file_type::PLACEHOLDER || ft == 0x00 {
            file_number += 1;
            continue;
        }

        let element_count = read_element_count(row, layout);

        entries.push(FileDirectoryEntry {
            file_number,
            file_type: ft,
            type_prefix: types::type_prefix(ft),
            element_count,
        });
        file_number += 1;
    }
    entries
}

/// Element count is a 16-bit LE value when the row is wide enough to hold
/// one at the configured offset, else a single byte; rows too short for
/// either read as zero.
fn read_element_count(row: &[u8], layout: &Sys0Layout) -> u16 {
    let off = layout.size_element_offset;
    if row.len() >= off + 2 {
        u16::from_le_bytes([row[off], row[off + 1]])
    } else if row.len() > off {
        u16::from(row[off])
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::file_type;
    use super::*;

    #[test]
    fn family_layouts_pinned() {
        let slc = lookup_sys0_layout("1747").unwrap();
        assert_eq!(
            slc,
            Sys0Layout {
                file_type_offset: 1,
                size_element_offset: 35,
                directory_start: 79,
                row_size: 10,
                size_const: 0,
            }
        );

        let ml1000 = lookup_sys0_layout("1761").unwrap();
        assert_eq!(ml1000.row_size, 8);
        assert_eq!(ml1000.directory_start, 93);

        for prefix in ["1762", "1763", "1764"] {
            let l = lookup_sys0_layout(prefix).unwrap();
            assert_eq!(l.size_const, 19968);
            assert_eq!(l.directory_start, 233);
        }

        let ml1400 = lookup_sys0_layout("1766").unwrap();
        assert_eq!(ml1400.file_type_offset, 3);
        assert_eq!(ml1400.size_element_offset, 43);

        assert!(matches!(
            lookup_sys0_layout("9999"),
            Err(Error::UnknownProcessorFamily(_))
        ));
        assert!(lookup_sys0_layout("").is_err());
    }

    #[test]
    fn catalog_extraction() {
        assert_eq!(extract_catalog(b"1747-L552\x00"), "1747-L552");
        assert_eq!(extract_catalog(b"1747-L552 \x00"), "1747-L552");
        assert_eq!(extract_catalog(&[0, 0, 0, 0]), "");
        assert_eq!(extract_catalog(b"1762-L32BW"), "1762-L32BW");
    }

    #[test]
    fn catalog_prefixes() {
        assert_eq!(catalog_prefix("1747-L552"), "1747");
        assert_eq!(catalog_prefix("1766-L32BWAA"), "1766");
        assert_eq!(catalog_prefix("ABC"), "ABC");
        assert_eq!(catalog_prefix(""), "");
    }

    // Compact layout for walking tests: type at 0, 16-bit count at 2..4
    const TEST_LAYOUT: Sys0Layout = Sys0Layout {
        file_type_offset: 0,
        size_element_offset: 2,
        directory_start: 0,
        row_size: 4,
        size_const: 0,
    };

    fn row(ft: u8, count: u16) -> [u8; 4] {
        let c = count.to_le_bytes();
        [ft, 0x00, c[0], c[1]]
    }

    #[test]
    fn directory_walk_skips_placeholders_but_advances_numbering() {
        let mut data = Vec::new();
        data.extend_from_slice(&row(file_type::INTEGER, 50));
        data.extend_from_slice(&row(file_type::PLACEHOLDER, 0));
        data.extend_from_slice(&row(file_type::FLOAT, 10));
        data.extend_from_slice(&row(0x00, 0));
        data.extend_from_slice(&row(file_type::TIMER, 5));

        let entries = parse_file_directory(&data, &TEST_LAYOUT);
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].file_number, 0);
        assert_eq!(entries[0].file_type, file_type::INTEGER);
        assert_eq!(entries[0].type_prefix, "N");
        assert_eq!(entries[0].element_count, 50);
        assert_eq!(entries[0].name(), "N0");

        // File 1 was a placeholder: float lands on file 2
        assert_eq!(entries[1].file_number, 2);
        assert_eq!(entries[1].type_prefix, "F");
        assert_eq!(entries[1].element_count, 10);

        // File 3 was empty: timer lands on file 4
        assert_eq!(entries[2].file_number, 4);
        assert_eq!(entries[2].type_prefix, "T");
        assert_eq!(entries[2].element_count, 5);
    }

    #[test]
    fn directory_walk_empty_and_all_placeholders() {
        assert!(parse_file_directory(&[], &TEST_LAYOUT).is_empty());

        let mut data = Vec::new();
        data.extend_from_slice(&row(file_type::PLACEHOLDER, 0));
        data.extend_from_slice(&row(0x00, 0));
        assert!(parse_file_directory(&data, &TEST_LAYOUT).is_empty());
    }

    #[test]
    fn narrow_rows_use_one_byte_count() {
        // Row of 3 bytes with count offset 2: only one byte available
        let layout = Sys0Layout {
            file_type_offset: 0,
            size_element_offset: 2,
            directory_start: 0,
            row_size: 3,
            size_const: 0,
        };
        let data = [file_type::INTEGER, 0x00, 0x2A];
        let entries = parse_file_directory(&data, &layout);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].element_count, 42);
    }

    #[test]
    fn unknown_type_has_fallback_name() {
        let data = row(0x7B, 1);
        let entries = parse_file_directory(&data, &TEST_LAYOUT);
        assert_eq!(entries[0].type_prefix, "");
        assert_eq!(entries[0].name(), "FILE0");
    }

    #[test]
    fn trailing_partial_row_ignored() {
        let mut data = Vec::new();
        data.extend_from_slice(&row(file_type::INTEGER, 1));
        data.extend_from_slice(&[file_type::FLOAT, 0x00]); // short row
        let entries = parse_file_directory(&data, &TEST_LAYOUT);
        assert_eq!(entries.len(), 1);
    }
}
