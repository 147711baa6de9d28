//! Legacy Excel 97-2003 (.xls) writer.
//!
//! Produces a compound file whose `Workbook` stream holds a BIFF8 globals substream
//! followed by a single worksheet substream. Text goes through the shared string table.
#![cfg_attr(not(feature = "biff8"), allow(dead_code, unused_imports))]

use crate::archive::cells;
use crate::archive::check_bounds;
use crate::archive::check_text;
use crate::archive::SerializeError;
use crate::archive::SheetSerializer;
use crate::helpers::biff8::write_short_xl_unicode_string;
use crate::helpers::biff8::Biff8Writer;
use crate::table::Table;
use crate::table::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

// BIFF8 record type identifiers
const EOF: u16 = 0x000A;        // End of a substream
const FONT: u16 = 0x0031;       // Font description
const WINDOW1: u16 = 0x003D;    // Workbook window
const CODEPAGE: u16 = 0x0042;   // Character encoding, 1200 for UTF-16
const BOUNDSHEET: u16 = 0x0085; // Worksheet name and stream position
const XF: u16 = 0x00E0;         // Extended format
const LABELSST: u16 = 0x00FD;   // Text cell referencing the shared string table
const DIMENSIONS: u16 = 0x0200; // Used range of a worksheet
const NUMBER: u16 = 0x0203;     // Numeric cell
const BOOLERR: u16 = 0x0205;    // Boolean cell
const WINDOW2: u16 = 0x023E;    // Worksheet window
const STYLE: u16 = 0x0293;      // Cell style
const BOF: u16 = 0x0809;        // Start of a substream

/// BOF substream types
const GLOBALS: u16 = 0x0005;
const WORKSHEET: u16 = 0x0010;

/// Rows per sheet, header included
pub(crate) const MAX_ROWS: usize = 65_536;
pub(crate) const MAX_COLUMNS: usize = 256;

/// Style XFs written before the single cell XF
const STYLE_XF_COUNT: u16 = 15;
/// XF every cell refers to
const CELL_XF: u16 = STYLE_XF_COUNT;

/// Streams shorter than this land in the mini stream, which some readers reject
const MIN_STREAM_SIZE: usize = 4096;

/// Writes tables as BIFF8 workbooks. Only available with the `biff8` feature.
#[derive(Copy, Clone, Debug, Default)]
pub struct Biff8Serializer;

impl SheetSerializer for Biff8Serializer {
    fn name(&self) -> &'static str {
        "biff8"
    }

    fn extension(&self) -> &'static str {
        "xls"
    }

    #[cfg(feature = "biff8")]
    fn serialize(
        &self,
        sheet_name: &str,
        table: &Table,
        path: &Path,
    ) -> Result<(), SerializeError> {
        let stream = encode_workbook(sheet_name, table)?;
        write_compound_file(path, &stream)
    }

    #[cfg(not(feature = "biff8"))]
    fn serialize(&self, _: &str, _: &Table, _: &Path) -> Result<(), SerializeError> {
        Err(SerializeError::Unavailable("biff8"))
    }
}

/// Encodes the `Workbook` stream for a single sheet holding `table`.
pub(crate) fn encode_workbook(sheet_name: &str, table: &Table) -> Result<Vec<u8>, SerializeError> {
    check_bounds(table, MAX_ROWS, MAX_COLUMNS)?;

    // Shared strings, in first-use order
    let mut total = 0usize;
    let mut strings = Vec::<String>::new();
    let mut string_indexes = HashMap::<String, u32>::new();
    let mut records = Vec::<(u16, Vec<u8>)>::new();
    for (row, col, value) in cells(table) {
        let mut data = Vec::with_capacity(14);
        data.extend_from_slice(&(row as u16).to_le_bytes());
        data.extend_from_slice(&(col as u16).to_le_bytes());
        data.extend_from_slice(&CELL_XF.to_le_bytes());
        match value {
            Value::Text(text) => {
                check_text(row, col, &text)?;
                total += 1;
                let next = strings.len() as u32;
                let index = *string_indexes.entry(text).or_insert_with_key(|text| {
                    strings.push(text.to_owned());
                    next
                });
                data.extend_from_slice(&index.to_le_bytes());
                records.push((LABELSST, data));
            }
            Value::Number(number) => {
                data.extend_from_slice(&number.to_le_bytes());
                records.push((NUMBER, data));
            }
            Value::Bool(flag) => {
                data.extend_from_slice(&[flag as u8, 0]);
                records.push((BOOLERR, data));
            }
            Value::Empty => (),
        }
    }

    let mut writer = Biff8Writer::new();
    write_globals(&mut writer, sheet_name, total, &strings)?;
    writer.write_record(BOF, &bof(WORKSHEET))?;
    writer.write_record(DIMENSIONS, &dimensions(table.len() + 1, table.schema().width()))?;
    writer.write_record(WINDOW2, &window2())?;
    for (kind, data) in records {
        writer.write_record(kind, &data)?;
    }
    writer.write_record(EOF, &[])?;

    let mut stream = writer.into_inner();
    if stream.len() < MIN_STREAM_SIZE {
        stream.resize(MIN_STREAM_SIZE, 0);
    }
    Ok(stream)
}

/// Globals substream; the worksheet BOF follows it directly.
fn write_globals(
    writer: &mut Biff8Writer,
    sheet_name: &str,
    total: usize,
    strings: &[String],
) -> Result<(), SerializeError> {
    writer.write_record(BOF, &bof(GLOBALS))?;
    writer.write_record(CODEPAGE, &1200u16.to_le_bytes())?;
    writer.write_record(WINDOW1, &window1())?;
    // Readers skip font index 4; indexes 0 to 3 must exist
    for _ in 0..4 {
        writer.write_record(FONT, &font("Arial"))?;
    }
    for _ in 0..STYLE_XF_COUNT {
        writer.write_record(XF, &xf(true))?;
    }
    writer.write_record(XF, &xf(false))?;
    // Built-in "Normal" style on XF 0
    writer.write_record(STYLE, &[0x00, 0x80, 0x00, 0xFF])?;

    let bound_sheet = writer.position();
    let mut data = vec![0u8; 6];
    write_short_xl_unicode_string(&mut data, sheet_name);
    writer.write_record(BOUNDSHEET, &data)?;

    writer.write_shared_strings(total, strings)?;
    writer.write_record(EOF, &[])?;

    let sheet_position = writer.position() as u32;
    writer.patch_u32(bound_sheet + 4, sheet_position);
    Ok(())
}

fn bof(kind: u16) -> Vec<u8> {
    let mut data = Vec::with_capacity(16);
    data.extend_from_slice(&0x0600u16.to_le_bytes()); // BIFF8
    data.extend_from_slice(&kind.to_le_bytes());
    data.extend_from_slice(&0x0DBBu16.to_le_bytes()); // build identifier
    data.extend_from_slice(&0x07CCu16.to_le_bytes()); // build year
    data.extend_from_slice(&0u32.to_le_bytes()); // file history
    data.extend_from_slice(&6u32.to_le_bytes()); // lowest BIFF version
    data
}

fn window1() -> Vec<u8> {
    let mut data = vec![0u8; 18];
    data[4..6].copy_from_slice(&0x3000u16.to_le_bytes()); // width
    data[6..8].copy_from_slice(&0x1E00u16.to_le_bytes()); // height
    data[8..10].copy_from_slice(&0x0038u16.to_le_bytes());
    data[14..16].copy_from_slice(&1u16.to_le_bytes()); // selected tabs
    data[16..18].copy_from_slice(&0x0258u16.to_le_bytes()); // tab ratio
    data
}

fn font(name: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(16 + name.len());
    data.extend_from_slice(&200u16.to_le_bytes()); // 10pt in twips
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&0x7FFFu16.to_le_bytes()); // automatic color
    data.extend_from_slice(&400u16.to_le_bytes()); // normal weight
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&[0, 0, 0, 0]);
    write_short_xl_unicode_string(&mut data, name);
    data
}

/// Extended format: general number format, font 0, bottom aligned, default fill colors.
fn xf(is_style: bool) -> Vec<u8> {
    let mut data = vec![0u8; 20];
    let kind: u16 = if is_style { 0xFFF5 } else { 0x0001 };
    data[4..6].copy_from_slice(&kind.to_le_bytes());
    data[6] = 0x20;
    data[18..20].copy_from_slice(&0x20C0u16.to_le_bytes());
    data
}

/// Used range, end row and end column exclusive.
fn dimensions(rows: usize, columns: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(14);
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&(rows as u32).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data.extend_from_slice(&(columns as u16).to_le_bytes());
    data.extend_from_slice(&0u16.to_le_bytes());
    data
}

fn window2() -> Vec<u8> {
    let mut data = vec![0u8; 18];
    data[0..2].copy_from_slice(&0x06B6u16.to_le_bytes());
    data[6..8].copy_from_slice(&0x0040u16.to_le_bytes()); // gridline color
    data
}

/// Stores `stream` as the `Workbook` stream of a new compound file at `path`.
fn write_compound_file(path: &Path, stream: &[u8]) -> Result<(), SerializeError> {
    let file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    // Version 3 with 512-byte sectors, the layout Excel 97-2003 writes
    let mut cfb = cfb::CompoundFile::create_with_version(cfb::Version::V3, file)?;
    let mut workbook = cfb.create_stream("Workbook")?;
    workbook.write_all(stream)?;
    workbook.flush()?;
    drop(workbook);
    cfb.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadOptions;
    use crate::spreadsheet::Workbook;
    use crate::table::tests::quantity_table;
    use pretty_assertions::assert_eq;

    fn read_back(table: &Table) -> Vec<Vec<Value>> {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("Sheet1.xls");
        let stream = encode_workbook("Sheet1", table).unwrap();
        write_compound_file(&path, &stream).unwrap();
        let mut workbook = Workbook::open(&path).unwrap();
        assert_eq!(workbook.sheet_names(), vec!["Sheet1"]);
        workbook.read_sheet(&ReadOptions::default()).unwrap().rows().unwrap()
    }

    #[test]
    fn header_and_values_survive() {
        let table = Table::from_records(
            vec!["名称", "数量", "备注", "加急"],
            "数量",
            vec![
                vec![Value::from("螺丝"), Value::from(3.0), Value::from("M4 × 20"), Value::from(true)],
                vec![Value::Empty, Value::from(1.0), Value::Empty, Value::Empty],
                vec![Value::from("螺丝"), Value::from(590.5), Value::from("Qté"), Value::from(false)],
            ],
        )
        .unwrap();
        assert_eq!(
            read_back(&table),
            vec![
                vec![Value::from("名称"), Value::from("数量"), Value::from("备注"), Value::from("加急")],
                vec![Value::from("螺丝"), Value::from(3.0), Value::from("M4 × 20"), Value::from(true)],
                vec![Value::Empty, Value::from(1.0), Value::Empty, Value::Empty],
                vec![Value::from("螺丝"), Value::from(590.5), Value::from("Qté"), Value::from(false)],
            ]
        );
    }

    #[test]
    fn container_is_version_3() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("Sheet1.xls");
        let stream = encode_workbook("Sheet1", &quantity_table(&[3.0])).unwrap();
        write_compound_file(&path, &stream).unwrap();

        let content = std::fs::read(&path).unwrap();
        // Major version at offset 26, sector shift at offset 30
        assert_eq!(&content[26..28], &[0x03, 0x00]);
        assert_eq!(&content[30..32], &[0x09, 0x00]);
        assert_eq!(content.len() % 512, 0);

        let compound = cfb::CompoundFile::open(std::io::Cursor::new(content)).unwrap();
        assert_eq!(compound.version(), cfb::Version::V3);
        assert!(compound.is_stream("/Workbook"));
    }

    #[test]
    fn header_only_table() {
        let table = quantity_table(&[]);
        assert_eq!(read_back(&table), vec![vec![Value::from("名称"), Value::from("数量")]]);
    }

    #[test]
    fn shared_strings_are_deduplicated() {
        let table = Table::from_records(
            vec!["名称", "数量"],
            "数量",
            vec![vec![Value::from("名称"), Value::from(1.0)]; 3],
        )
        .unwrap();
        let stream = encode_workbook("Sheet1", &table).unwrap();
        let needle: Vec<u8> = "名称".encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect();
        let occurrences = stream
            .windows(needle.len())
            .filter(|window| *window == needle.as_slice())
            .count();
        assert_eq!(occurrences, 1);
    }

    #[test]
    fn row_limit() {
        let table = quantity_table(&vec![1.0; MAX_ROWS]);
        assert!(matches!(
            encode_workbook("Sheet1", &table),
            Err(SerializeError::RowLimitError { rows: 65_537, limit: MAX_ROWS })
        ));
    }

    #[test]
    fn column_limit() {
        let columns: Vec<String> = (0..=MAX_COLUMNS).map(|index| format!("c{index}")).collect();
        let table = Table::from_records(columns, "c0", Vec::new()).unwrap();
        assert!(matches!(
            encode_workbook("Sheet1", &table),
            Err(SerializeError::ColumnLimitError { columns: 257, limit: MAX_COLUMNS })
        ));
    }

    #[test]
    fn long_text_is_rejected() {
        let table = Table::from_records(
            vec!["名称", "数量"],
            "数量",
            vec![vec![Value::from("x".repeat(40_000)), Value::from(1.0)]],
        )
        .unwrap();
        assert!(matches!(
            encode_workbook("Sheet1", &table),
            Err(SerializeError::TextLengthError { .. })
        ));
    }
}
