use crate::error::ResultOptionChain;
use crate::error::SplitterError;
use crate::helpers::biff8::Biff8Reader;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use crate::config::ReadOptions;
use cfb::CompoundFile;
use either::Either;
use std::collections::HashMap;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use thiserror::Error;

// BIFF8 record type identifiers for Excel file parsing
const FORMULA: u16 = 6;        // Formula record containing calculation expressions
const EOF: u16 = 10;           // End of file record marking the end of a substream
const DATE1904: u16 = 34;      // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;     // File password protection record
const BOUND_SHEET8: u16 = 133; // Worksheet definition and position
const MUL_RK: u16 = 189;       // Multiple RK number records for efficiency
const XF: u16 = 224;           // Extended format record for cell styling
const SST: u16 = 252;          // Shared string table containing repeated text
const LABEL_SST: u16 = 253;    // Label referencing shared string table
const NUMBER: u16 = 515;       // Numeric cell value
const LABEL: u16 = 516;        // Text label cell value
const BOOL_ERR: u16 = 517;     // Boolean or error cell value
const STRING: u16 = 519;       // String value for formula results
const ARRAY: u16 = 545;        // Array formula attached to a FORMULA record
const TABLE: u16 = 566;        // Data table attached to a FORMULA record
const RK: u16 = 638;           // RK number format for compressed numeric storage
const FORMAT: u16 = 1054;      // Custom number format definition
const SHR_FMLA: u16 = 1212;    // Shared formula attached to a FORMULA record
const BOF: u16 = 2057;         // Beginning of file record for substreams

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    /// Invalid formula value or structure encountered
    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Main structure for reading and parsing XLS (Excel 97-2003) files
pub(crate) struct XlsSpreadsheet {
    /// Original file name for error reporting and identification
    pub(crate) name: String,
    /// BIFF8 reader for parsing Excel binary format records
    reader: Biff8Reader,
    /// Shared string table containing repeated text values
    shared_strings: Vec<String>,
    /// Number format mappings for cell type detection
    number_formats: Vec<CellType>,
    /// List of worksheets with their names and stream positions
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Opens a compound file and parses the globals substream of its workbook stream
    ///
    /// # Arguments
    /// * `file_name` - Name used in error messages
    /// * `bytes` - Content of the compound file
    pub(crate) fn from_bytes(
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<XlsSpreadsheet, SplitterError> {
        let mut cfb = CompoundFile::open(Cursor::new(bytes))?;
        if cfb.is_stream("EncryptedPackage") {
            Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?
        }
        let mut reader = read_stream(&mut cfb, "Workbook")
            .ok_none_else(|| read_stream(&mut cfb, "Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => {
                Err(SpreadsheetError::SpreadsheetPasswordProtectedError(file_name.to_owned()))?
            }
            DATE1904 if reader.read_u16()? == 1 => is_1904 = true,
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(
                    id.to_string(),
                    CellType::parse_custom_number_format(format.as_ref(), is_1904),
                );
            }
            XF => {
                reader.skip(2)?;
                let id = reader.read_u16()?;
                format_indexes.push(id.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(1)?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                // Chart, macro and VBA sheets carry no cell table
                if sheet_type == 0 {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(file_name.to_owned()))?
        }

        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);

        Ok(XlsSpreadsheet {
            name: file_name.to_owned(),
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn number_format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    /// Returns the original file name for identification
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// XLS files are typically small enough to keep every shared string in memory
    fn load_shared_strings(&mut self) -> Result<Vec<String>, SplitterError> {
        Ok(self.shared_strings.to_owned())
    }

    /// Reads the first worksheet accepted by the options
    ///
    /// Parses BIFF8 records to extract cell data, handling various record types
    /// including numbers, strings, formulas, and boolean/error values.
    fn read_sheet(&mut self, options: &ReadOptions) -> Result<Sheet, SplitterError> {
        let (sheet_name, pointer) = self.sheets
            .iter()
            .find(|(sheet_name, _)| options.accept(sheet_name))
            .cloned()
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned()))?;

        self.reader.goto(pointer);
        self.reader.next()?;
        let mut sheet = Sheet::new(&self.name, &sheet_name, options.skip_empty_rows);
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.get_u16_back(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let kind = self.number_format(index);
                        let value = self.reader.read_rk_number()?;
                        sheet.push(Cell {
                            row,
                            col,
                            kind,
                            value,
                        });
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let kind = match either {
                        Either::Left(kind) => kind,
                        Either::Right(index) => self.number_format(index),
                    };
                    if kind != CellType::Error {
                        if !value.is_empty() {
                            sheet.push(Cell {
                                row,
                                col,
                                kind,
                                value,
                            });
                        }
                    } else if !options.error_as_null {
                        let reference = index_to_reference(row, col);
                        Err(SpreadsheetError::CellValueError(
                            sheet.file_name.to_owned(),
                            sheet.name.to_owned(),
                            reference,
                            value.to_owned(),
                        ))?
                    }
                }
                _ => (),
            }
        }

        let shared_strings = self.load_shared_strings()?;
        sheet.finish(shared_strings);
        Ok(sheet)
    }
}

/// Reads a whole stream of the compound file, `None` when it does not exist
fn read_stream<F: Read + Seek>(
    cfb: &mut CompoundFile<F>,
    name: &str,
) -> Result<Option<Vec<u8>>, SplitterError> {
    if !cfb.is_stream(name) {
        return Ok(None);
    }
    let mut stream = cfb.open_stream(name)?;
    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer)?;
    Ok(Some(buffer))
}

/// Loads the shared string table from BIFF8 SST record
///
/// # Arguments
/// * `reader` - BIFF8 reader positioned at SST record
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SplitterError> {
    let mut shared_strings: Vec<String> = Vec::new();
    reader.skip(4)?;
    let count = reader.read_usize()?;
    for _ in 0..count {
        let string = reader.read_xl_unicode_rich_extended_string()?;
        shared_strings.push(string);
    }
    Ok(shared_strings)
}

/// Reads a BOOL_ERR record containing boolean or error cell values
///
/// BOOL_ERR records store either boolean values (TRUE/FALSE) or error codes
/// with a flag indicating the value type.
fn read_bool_or_error_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), SplitterError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

/// Reads a NUMBER record containing numeric cell values
fn read_number_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), SplitterError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

/// Reads an RK record containing compressed numeric values
fn read_rk_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), SplitterError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value))
}

/// Reads a LABEL_SST record referencing shared string table
fn read_label_sst_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), SplitterError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

/// Reads a LABEL record containing inline string values
fn read_label_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), SplitterError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Reads a FORMULA record containing calculation expressions
///
/// Only the cached result is used. A string result lives in the STRING record
/// that follows, possibly after the shared or array formula the cell belongs to.
fn read_formula_cell(
    reader: &mut Biff8Reader,
) -> Result<(Either<CellType, usize>, String), SplitterError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        while let Some(kind) = reader.next()? {
            match kind {
                STRING => {
                    let value = reader.read_xl_unicode_string()?;
                    return Ok((Either::Left(CellType::InlineString), value));
                }
                SHR_FMLA | ARRAY | TABLE => continue,
                _ => break,
            }
        }
        Err(XlsError::FormulaValueError(formula))?
    } else if flag == 1 {
        let value = if (formula & 0xFF0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        let value = to_error_value(code).to_owned();
        Ok((Either::Left(CellType::Error), value))
    } else if flag == 3 {
        Ok((Either::Left(CellType::InlineString), "".to_owned()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::helpers::biff8::write_short_xl_unicode_string;
    use crate::helpers::biff8::tests::write_xl_unicode_string;
    use crate::helpers::biff8::Biff8Writer;
    use crate::table::Value;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    /// Wraps `content` into a compound file holding a single stream
    pub(crate) fn compound_file(stream_name: &str, content: &[u8]) -> Vec<u8> {
        let mut cfb = CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        let mut stream = cfb.create_stream(stream_name).unwrap();
        stream.write_all(content).unwrap();
        stream.flush().unwrap();
        drop(stream);
        cfb.flush().unwrap();
        cfb.into_inner().into_inner()
    }

    fn bof(writer: &mut Biff8Writer, kind: u16) {
        let mut data = vec![0u8; 16];
        data[0..2].copy_from_slice(&0x0600u16.to_le_bytes());
        data[2..4].copy_from_slice(&kind.to_le_bytes());
        writer.write_record(BOF, &data).unwrap();
    }

    fn xf(writer: &mut Biff8Writer, format: u16) {
        let mut data = vec![0u8; 20];
        data[2..4].copy_from_slice(&format.to_le_bytes());
        writer.write_record(XF, &data).unwrap();
    }

    fn cell_header(row: u16, col: u16, xf: u16) -> Vec<u8> {
        [row.to_le_bytes(), col.to_le_bytes(), xf.to_le_bytes()].concat()
    }

    fn rk_integer(value: i32) -> [u8; 4] {
        (((value as u32) << 2) | 0x02).to_le_bytes()
    }

    /// Globals plus one worksheet exercising every cell record the reader knows
    fn workbook_stream(globals_extra: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut writer = Biff8Writer::new();
        bof(&mut writer, 0x0005);
        for (kind, data) in globals_extra {
            writer.write_record(*kind, data).unwrap();
        }
        let mut format = 164u16.to_le_bytes().to_vec();
        write_xl_unicode_string(&mut format, "yyyy-mm-dd");
        writer.write_record(FORMAT, &format).unwrap();
        xf(&mut writer, 0);
        xf(&mut writer, 164);
        xf(&mut writer, 14);
        let strings = vec!["名称".to_owned(), "数量".to_owned(), "螺丝".to_owned()];
        writer.write_shared_strings(3, &strings).unwrap();

        let mut chart = vec![0u8; 4];
        chart.extend_from_slice(&[0, 2]);
        write_short_xl_unicode_string(&mut chart, "图表");
        writer.write_record(BOUND_SHEET8, &chart).unwrap();

        let bound_sheet = writer.position();
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0, 0]);
        write_short_xl_unicode_string(&mut data, "订单");
        writer.write_record(BOUND_SHEET8, &data).unwrap();
        writer.write_record(EOF, &[]).unwrap();

        let sheet = writer.position();
        writer.patch_u32(bound_sheet + 4, sheet as u32);
        bof(&mut writer, 0x0010);
        writer.write_record(LABEL_SST, &[cell_header(0, 0, 0), 0u32.to_le_bytes().to_vec()].concat()).unwrap();
        writer.write_record(LABEL_SST, &[cell_header(0, 1, 0), 1u32.to_le_bytes().to_vec()].concat()).unwrap();
        writer.write_record(LABEL_SST, &[cell_header(1, 0, 0), 2u32.to_le_bytes().to_vec()].concat()).unwrap();
        writer.write_record(NUMBER, &[cell_header(1, 1, 0), 5f64.to_le_bytes().to_vec()].concat()).unwrap();

        let mut mul_rk = [2u16.to_le_bytes(), 0u16.to_le_bytes()].concat();
        mul_rk.extend_from_slice(&0u16.to_le_bytes());
        mul_rk.extend_from_slice(&rk_integer(1));
        mul_rk.extend_from_slice(&0u16.to_le_bytes());
        mul_rk.extend_from_slice(&rk_integer(590));
        mul_rk.extend_from_slice(&1u16.to_le_bytes());
        writer.write_record(MUL_RK, &mul_rk).unwrap();

        let mut label = cell_header(3, 0, 0);
        write_xl_unicode_string(&mut label, "垫片");
        writer.write_record(LABEL, &label).unwrap();
        writer.write_record(RK, &[cell_header(3, 1, 1), rk_integer(45000).to_vec()].concat()).unwrap();

        let mut string_formula = cell_header(4, 0, 0);
        string_formula.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0xFF, 0xFF]);
        string_formula.extend_from_slice(&[0u8; 6]);
        writer.write_record(FORMULA, &string_formula).unwrap();
        writer.write_record(SHR_FMLA, &[0u8; 10]).unwrap();
        let mut string = Vec::new();
        write_xl_unicode_string(&mut string, "公式");
        writer.write_record(STRING, &string).unwrap();
        let mut number_formula = cell_header(4, 1, 0);
        number_formula.extend_from_slice(&2f64.to_le_bytes());
        number_formula.extend_from_slice(&[0u8; 6]);
        writer.write_record(FORMULA, &number_formula).unwrap();

        writer.write_record(BOOL_ERR, &[cell_header(5, 0, 0), vec![1, 0]].concat()).unwrap();
        writer.write_record(BOOL_ERR, &[cell_header(5, 1, 0), vec![0x2A, 1]].concat()).unwrap();
        writer.write_record(EOF, &[]).unwrap();
        writer.into_inner()
    }

    fn spreadsheet() -> XlsSpreadsheet {
        let bytes = compound_file("Workbook", &workbook_stream(&[]));
        XlsSpreadsheet::from_bytes("orders.xls", bytes).unwrap()
    }

    #[test]
    fn globals() {
        let spreadsheet = spreadsheet();
        assert_eq!(spreadsheet.sheet_names(), vec!["订单"]);
        assert_eq!(spreadsheet.shared_strings, vec!["名称", "数量", "螺丝"]);
        assert_eq!(
            spreadsheet.number_formats,
            vec![CellType::Number, CellType::NumberDate1900, CellType::NumberDate1900]
        );
    }

    #[test]
    fn read_every_cell_record() {
        let mut spreadsheet = spreadsheet();
        let sheet = spreadsheet.read_sheet(&ReadOptions::default()).unwrap();
        assert_eq!(sheet.name(), "订单");
        assert_eq!(
            sheet.rows().unwrap(),
            vec![
                vec![Value::from("名称"), Value::from("数量")],
                vec![Value::from("螺丝"), Value::from(5.0)],
                vec![Value::from(1.0), Value::from(590.0)],
                vec![Value::from("垫片"), Value::from("2023-03-15")],
                vec![Value::from("公式"), Value::from(2.0)],
                vec![Value::from(true), Value::Empty],
            ]
        );
    }

    #[test]
    fn error_cells_fail_unless_nulled() {
        let mut spreadsheet = spreadsheet();
        let options = ReadOptions {
            error_as_null: false,
            ..ReadOptions::default()
        };
        let error = spreadsheet.read_sheet(&options).unwrap_err();
        assert_eq!(error.to_string(), "Invalid cell value at 'orders.xls'!'订单'!B6: #N/A");
    }

    #[test]
    fn book_stream_fallback() {
        let bytes = compound_file("Book", &workbook_stream(&[]));
        let spreadsheet = XlsSpreadsheet::from_bytes("old.xls", bytes).unwrap();
        assert_eq!(spreadsheet.sheet_names(), vec!["订单"]);
    }

    #[test]
    fn file_pass_means_password_protected() {
        let bytes = compound_file("Workbook", &workbook_stream(&[(FILE_PASS, vec![0u8; 6])]));
        assert!(matches!(
            XlsSpreadsheet::from_bytes("secret.xls", bytes),
            Err(SplitterError::SpreadsheetError(SpreadsheetError::SpreadsheetPasswordProtectedError(_)))
        ));
    }

    #[test]
    fn missing_workbook_stream() {
        let bytes = compound_file("Other", b"nothing");
        assert!(matches!(
            XlsSpreadsheet::from_bytes("empty.xls", bytes),
            Err(SplitterError::SpreadsheetError(SpreadsheetError::SpreadsheetEmptyError(_)))
        ));
    }
}
