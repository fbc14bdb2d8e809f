//! Extraction of payload bytes from fixed-column textual hex dumps.
//!
//! Every dump line looks like
//!
//! ```text
//! 00000000:  7B 22 66 69 6C 65 4E 61   6D 65 22 3A 22 61 2E 63  {"fileName":"a.c
//! ```
//!
//! An 11 character address prefix, a first group of eight cells, two spaces of separation, a
//! second group of eight cells and a free-form ASCII gutter. Only the two cell groups are read.

use std::cmp;

use log::trace;

use crate::err::DecodeError;
use crate::field_value::FieldMap;

/// Lines shorter than this are right-padded with spaces before slicing.
pub const MIN_LINE_WIDTH: usize = 82;
/// Character offset of the first cell of each group.
pub const GROUP_OFFSETS: [usize; 2] = [11, 37];
pub const CELLS_PER_GROUP: usize = 8;
pub const CELL_STRIDE: usize = 3;
pub const CELL_WIDTH: usize = 2;

const BYTES_PER_LINE: usize = CELLS_PER_GROUP * GROUP_OFFSETS.len();

/// Decode the bytes of a dump block.
///
/// Empty cells are skipped. Unless `include_control_bytes` is set, bytes below `0x20` are
/// dropped, since dumps use them as padding around the logical payload.
pub fn decode(dump: &str, include_control_bytes: bool) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(dump.len() / 4);

    for (line_no, line) in dump.lines().enumerate() {
        let mut chars: Vec<char> = line.chars().collect();
        if chars.len() < MIN_LINE_WIDTH {
            chars.resize(MIN_LINE_WIDTH, ' ');
        }

        for group_offset in GROUP_OFFSETS {
            for cell_index in 0..CELLS_PER_GROUP {
                let column = group_offset + cell_index * CELL_STRIDE;
                let raw: String = chars[column..column + CELL_WIDTH].iter().collect();
                let cell = raw.trim();

                if cell.is_empty() {
                    continue;
                }

                let byte = parse_cell(cell).ok_or_else(|| DecodeError::InvalidHexCell {
                    line: line_no + 1,
                    column,
                    cell: cell.to_string(),
                })?;

                if byte < 0x20 && !include_control_bytes {
                    continue;
                }

                out.push(byte);
            }
        }
    }

    trace!("Decoded {} payload bytes from dump", out.len());
    Ok(out)
}

/// `u8::from_str_radix` tolerates a leading `+`, dump cells must be pure hex digits.
fn parse_cell(cell: &str) -> Option<u8> {
    if !cell.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(cell, 16).ok()
}

/// Decode a dump block as UTF-8 text, control bytes excluded.
pub fn decode_text(dump: &str) -> Result<String, DecodeError> {
    Ok(String::from_utf8(decode(dump, false)?)?)
}

/// Decode a dump block holding a JSON object payload.
///
/// Anything before the first `{` is noise. An empty payload yields an empty map.
pub fn decode_json_fields(dump: &str) -> Result<FieldMap, DecodeError> {
    decode_json_fields_with(dump, false)
}

pub fn decode_json_fields_with(
    dump: &str,
    include_control_bytes: bool,
) -> Result<FieldMap, DecodeError> {
    let text = String::from_utf8(decode(dump, include_control_bytes)?)?;
    if text.is_empty() {
        return Ok(FieldMap::new());
    }

    FieldMap::from_json_str(trim_to_document(&text, '{')?)
}

/// Strip everything before the first `<` of an XML payload.
pub fn trim_to_xml(text: &str) -> Result<&str, DecodeError> {
    trim_to_document(text, '<')
}

fn trim_to_document(text: &str, start: char) -> Result<&str, DecodeError> {
    text.find(start)
        .map(|idx| &text[idx..])
        .ok_or(DecodeError::MissingPayloadStart { expected: start })
}

/// Render bytes in the column layout understood by [`decode`].
pub fn format_hexdump(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() / BYTES_PER_LINE + 1) * MIN_LINE_WIDTH);
    let mut address = 0;

    while address < data.len() {
        let end = cmp::min(address + BYTES_PER_LINE, data.len());
        format_line(&mut out, &data[address..end], address);
        address += BYTES_PER_LINE;
    }

    out
}

fn format_line(out: &mut String, line: &[u8], address: usize) {
    let start = out.len();

    out.push_str(&format!("{:08X}:  ", address));

    for (group, chunk) in line.chunks(CELLS_PER_GROUP).enumerate() {
        if group > 0 {
            out.push_str("  ");
        }
        for byte in chunk {
            out.push_str(&format!("{:02X} ", byte));
        }
        // align a short group so the gutter stays in place
        for _ in chunk.len()..CELLS_PER_GROUP {
            out.push_str("   ");
        }
    }
    if line.len() <= CELLS_PER_GROUP {
        out.push_str("  ");
        for _ in 0..CELLS_PER_GROUP {
            out.push_str("   ");
        }
    }

    out.push(' ');
    for &c in line {
        // replace all control chars with dots
        if (c as char).is_ascii_graphic() || c == b' ' {
            out.push(c as char);
        } else {
            out.push('.');
        }
    }

    while out.len() - start < MIN_LINE_WIDTH {
        out.push(' ');
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_formatted_cells_land_on_fixed_columns() {
        let dump = format_hexdump(&(0x41..0x51).collect::<Vec<u8>>());
        let line = dump.lines().next().unwrap();

        assert_eq!(line.len(), MIN_LINE_WIDTH);
        assert_eq!(&line[11..13], "41");
        assert_eq!(&line[14..16], "42");
        assert_eq!(&line[32..34], "48");
        assert_eq!(&line[37..39], "49");
        assert_eq!(&line[58..60], "50");
    }

    #[test]
    fn test_round_trips_printable_bytes() {
        let payload: Vec<u8> = (0x20..=0x7e).chain([0x80, 0xc3, 0xa9, 0xff]).collect();
        let dump = format_hexdump(&payload);

        assert_eq!(decode(&dump, false).unwrap(), payload);
    }

    #[test]
    fn test_control_bytes_are_filtered_unless_requested() {
        let payload = [0x00, b'a', 0x1f, b'b', 0x0a, b'c'];
        let dump = format_hexdump(&payload);

        assert_eq!(decode(&dump, false).unwrap(), b"abc".to_vec());
        assert_eq!(decode(&dump, true).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_short_and_ragged_lines_are_padded() {
        // second group missing entirely, first group cut after three cells
        let dump = "00000000:  61 62 63\n\n00000010:  64";

        assert_eq!(decode(dump, false).unwrap(), b"abcd".to_vec());
    }

    #[test]
    fn test_non_hex_cell_is_a_fault() {
        let dump = "00000000:  61 zz 63";

        match decode(dump, false) {
            Err(DecodeError::InvalidHexCell { line, column, cell }) => {
                assert_eq!(line, 1);
                assert_eq!(column, 14);
                assert_eq!(cell, "zz");
            }
            other => panic!("expected an invalid cell error, got {:?}", other),
        }

        assert!(decode("00000000:  +1", false).is_err());
    }

    #[test]
    fn test_json_fields_skip_leading_noise() {
        let mut payload = b"\x05\x00!?".to_vec();
        payload.extend_from_slice(br#"{"fileName":"a.csv","conta":7}"#);

        let fields = decode_json_fields(&format_hexdump(&payload)).unwrap();

        assert_eq!(fields.require_str("fileName").unwrap(), "a.csv");
        assert_eq!(fields.require_i64("conta").unwrap(), 7);
    }

    #[test]
    fn test_empty_payload_yields_empty_fields() {
        assert!(decode_json_fields("").unwrap().is_empty());
        // only control bytes
        assert!(decode_json_fields(&format_hexdump(&[0, 1, 2])).unwrap().is_empty());
    }

    #[test]
    fn test_payload_without_document_start_is_a_fault() {
        assert!(matches!(
            decode_json_fields(&format_hexdump(b"no json here")),
            Err(DecodeError::MissingPayloadStart { expected: '{' })
        ));
        assert_eq!(trim_to_xml("\u{feff}..<a/>").unwrap(), "<a/>");
    }

    #[test]
    fn test_text_decode_rejects_invalid_utf8() {
        let dump = format_hexdump(&[0xc3, 0x28]);
        assert!(matches!(
            decode_text(&dump),
            Err(DecodeError::InvalidUtf8 { .. })
        ));
    }
}
