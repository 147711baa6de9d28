//! Office Open XML (.xlsx) writer, used when the BIFF8 writer is unavailable.
use crate::archive::cells;
use crate::archive::check_bounds;
use crate::archive::check_text;
use crate::archive::SerializeError;
use crate::archive::SheetSerializer;
use crate::table::Table;
use crate::table::Value;
use rust_xlsxwriter::Workbook;
use std::path::Path;

pub(crate) const MAX_ROWS: usize = 1_048_576;
pub(crate) const MAX_COLUMNS: usize = 16_384;

/// Writes tables with `rust_xlsxwriter`.
#[derive(Copy, Clone, Debug, Default)]
pub struct XlsxSerializer;

impl SheetSerializer for XlsxSerializer {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn extension(&self) -> &'static str {
        "xlsx"
    }

    fn serialize(
        &self,
        sheet_name: &str,
        table: &Table,
        path: &Path,
    ) -> Result<(), SerializeError> {
        check_bounds(table, MAX_ROWS, MAX_COLUMNS)?;

        let mut workbook = Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(sheet_name)?;
        // Bounds were checked above, so the casts cannot truncate
        for (row, col, value) in cells(table) {
            let (row_num, col_num) = (row as u32, col as u16);
            match value {
                Value::Text(text) => {
                    check_text(row, col, &text)?;
                    worksheet.write_string(row_num, col_num, text)?;
                }
                Value::Number(number) => {
                    worksheet.write_number(row_num, col_num, number)?;
                }
                Value::Bool(flag) => {
                    worksheet.write_boolean(row_num, col_num, flag)?;
                }
                Value::Empty => (),
            }
        }
        workbook.save(path)?;
        Ok(())
    }
}
