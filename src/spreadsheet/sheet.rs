use crate::error::SplitterError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Table;
use crate::table::Value;
use std::collections::HashSet;

/// A worksheet read from a workbook: its non-empty cells plus the bounds they cover.
#[derive(Debug)]
pub struct Sheet {
    /// Source file name
    pub(crate) file_name: String,
    /// Sheet name
    pub(crate) name: String,
    /// Non-empty cells
    pub(crate) cells: Vec<Cell>,
    /// Shared string table the `SharedString` cells point into
    pub(crate) shared_strings: Vec<String>,
    /// Whether to drop rows where every column is empty
    skip_empty_rows: bool,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    /// Creates an empty sheet.
    pub(super) fn new(file_name: &str, name: &str, skip_empty_rows: bool) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            shared_strings: Vec::new(),
            skip_empty_rows,
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Returns true if the sheet contains no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Adds a cell to the sheet, updating the data range.
    pub(super) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        self.cells.push(cell);
    }

    /// Updates the actual data range boundaries based on cell positions.
    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Puts cells in row-major order once reading is done.
    pub(super) fn finish(&mut self, shared_strings: Vec<String>) {
        self.cells.sort_by_key(|cell| (cell.row, cell.col));
        self.shared_strings = shared_strings;
    }

    /// Values of every row in the data range, one value per column of the range.
    /// Fully empty rows are dropped when the sheet was read with `skip_empty_rows`.
    pub fn rows(&self) -> Result<Vec<Vec<Value>>, SplitterError> {
        let bounds = self.row_lower_bound
            .zip(self.row_upper_bound)
            .zip(self.col_lower_bound.zip(self.col_upper_bound));
        let Some(((row_lower, row_upper), (col_lower, col_upper))) = bounds else {
            return Ok(Vec::new());
        };

        let width = col_upper - col_lower + 1;
        let mut cells = self.cells.iter().peekable();
        let mut rows = Vec::<Vec<Value>>::new();
        for row in row_lower..=row_upper {
            let mut record = vec![Value::Empty; width];
            while let Some(cell) = cells.next_if(|cell| cell.row == row) {
                let value = cell.to_value(&self.shared_strings).map_err(|message| {
                    SpreadsheetError::CellValueError(
                        self.file_name.to_owned(),
                        self.name.to_owned(),
                        cell.reference(),
                        message,
                    )
                })?;
                record[cell.col - col_lower] = value;
            }
            if !self.skip_empty_rows || !record.iter().all(Value::is_empty) {
                rows.push(record);
            }
        }
        Ok(rows)
    }

    /// Builds a table whose header is the first non-empty row.
    ///
    /// Empty header cells are named `Unnamed: <index>` and repeated names get `.1`, `.2`
    /// suffixes. Fails when the sheet has no data or lacks `quantity_column`.
    pub fn to_table(&self, quantity_column: &str) -> Result<Table, SplitterError> {
        let mut rows = self.rows()?
            .into_iter()
            .skip_while(|row| row.iter().all(Value::is_empty));
        let header = rows.next()
            .ok_or_else(|| {
                SpreadsheetError::EmptySheetError(self.file_name.to_owned(), self.name.to_owned())
            })?;
        let table = Table::from_records(header_names(&header), quantity_column, rows.collect())?;
        Ok(table)
    }
}

/// Turns header values into unique column names.
pub(crate) fn header_names(header: &[Value]) -> Vec<String> {
    let mut seen = HashSet::<String>::new();
    header
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let base = match value {
                Value::Empty => format!("Unnamed: {index}"),
                value => value.to_string(),
            };
            let mut name = base.to_owned();
            let mut suffix = 0usize;
            while seen.contains(&name) {
                suffix += 1;
                name = format!("{base}.{suffix}");
            }
            seen.insert(name.to_owned());
            name
        })
        .collect()
}
