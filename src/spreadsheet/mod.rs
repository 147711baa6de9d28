//! # Spreadsheet Reading Module
//!
//! Reads the first worksheet of an uploaded Excel workbook (.xlsx or .xls) into a
//! [`Sheet`] of typed cells. The container format is detected from the leading
//! bytes of the file, so misnamed uploads are still read correctly.
mod cell;
mod excel;
mod reference;
pub(crate) mod sheet;
pub(crate) mod xls;
mod xlsx;

pub(crate) use reference::index_to_reference;
pub use sheet::Sheet;

use crate::config::ReadOptions;
use crate::error::ResultMessage;
use crate::error::SplitterError;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use xls::XlsSpreadsheet;
use xlsx::XlsxSpreadsheet;

/// Leading bytes of a ZIP package (.xlsx)
const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
/// Leading bytes of a compound file (.xls, encrypted .xlsx)
const CFB_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Errors raised while reading a workbook
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    /// A part the package must contain is missing
    #[error("Missing file '{0}' in spreadsheet")]
    FileError(String),

    #[error("Cannot detect spreadsheet format of '{0}'")]
    SpreadsheetFormatError(String),

    #[error("Spreadsheet '{0}' is password protected")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Spreadsheet '{0}' has no worksheet")]
    SpreadsheetEmptyError(String),

    #[error("No matching worksheet in '{0}'")]
    SheetNotFoundError(String),

    #[error("Sheet '{1}' of '{0}' has no data")]
    EmptySheetError(String, String),

    /// File name, sheet name, cell reference and message
    #[error("Invalid cell value at '{0}'!'{1}'!{2}: {3}")]
    CellValueError(String, String, String, String),
}

/// Common interface of the format specific workbook readers
pub(crate) trait Spreadsheet {
    /// File name of the workbook
    fn name(&self) -> String;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Loads the shared string table referenced by `SharedString` cells
    fn load_shared_strings(&mut self) -> Result<Vec<String>, SplitterError>;

    /// Reads the first worksheet accepted by `options`
    fn read_sheet(&mut self, options: &ReadOptions) -> Result<Sheet, SplitterError>;
}

/// An opened workbook of either supported format.
pub struct Workbook {
    spreadsheet: Box<dyn Spreadsheet>,
}

impl Workbook {
    /// Opens the workbook stored at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Workbook, SplitterError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(SplitterError::from)
            .with_prefix(&format!("Read '{}' failed", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Workbook::from_bytes(&name, bytes)
    }

    /// Opens a workbook held in memory, `name` being the uploaded file name.
    ///
    /// A compound file holding an `EncryptedPackage` stream is a password protected
    /// .xlsx and is rejected.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<Workbook, SplitterError> {
        let spreadsheet: Box<dyn Spreadsheet> = if bytes.starts_with(ZIP_SIGNATURE) {
            Box::new(XlsxSpreadsheet::from_bytes(name, bytes)?)
        } else if bytes.starts_with(CFB_SIGNATURE) {
            Box::new(XlsSpreadsheet::from_bytes(name, bytes)?)
        } else {
            Err(SpreadsheetError::SpreadsheetFormatError(name.to_owned()))?
        };
        debug!(name, sheets = ?spreadsheet.sheet_names(), "opened workbook");
        Ok(Workbook { spreadsheet })
    }

    pub fn name(&self) -> String {
        self.spreadsheet.name()
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.spreadsheet.sheet_names()
    }

    /// Reads the first worksheet, or the first one whose name matches `options.sheet_name`.
    pub fn read_sheet(&mut self, options: &ReadOptions) -> Result<Sheet, SplitterError> {
        let sheet = self.spreadsheet.read_sheet(options)?;
        debug!(
            name = self.spreadsheet.name(),
            sheet = sheet.name(),
            cells = sheet.cells.len(),
            "read worksheet"
        );
        Ok(sheet)
    }
}
