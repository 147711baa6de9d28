//! # Archive Module
//!
//! Serializes every group into its own spreadsheet file and bundles the files into one
//! ZIP archive with entries `Sheet1.xls`, `Sheet2.xls`, and so on.
//!
//! Serialization goes through the [`SheetSerializer`] strategy. The legacy BIFF8 writer is
//! tried first; when it reports [`SerializeError::Unavailable`] the OOXML writer takes over
//! and its output is still published under the `.xls` entry name. Any other serializer
//! failure aborts the whole build.
mod biff8;
mod xlsx;

pub use biff8::Biff8Serializer;
pub use xlsx::XlsxSerializer;

use crate::error::SplitterError;
use crate::helpers::biff8::Biff8Error;
use crate::spreadsheet::index_to_reference;
use crate::table::Table;
use crate::table::Value;
use std::io::Cursor;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

/// Name of the single worksheet inside every generated file
pub const SHEET_NAME: &str = "Sheet1";

/// Longest text a cell may hold, in UTF-16 units
pub(crate) const MAX_TEXT_LENGTH: usize = 32_767;

/// Errors raised while writing one group to a spreadsheet file
#[derive(Error, Debug)]
pub enum SerializeError {
    /// The serializer cannot run in this build; the only error that triggers the fallback
    #[error("{0} writer is unavailable")]
    Unavailable(&'static str),

    #[error("{rows} rows exceed the {limit} rows a sheet can hold")]
    RowLimitError { rows: usize, limit: usize },

    #[error("{columns} columns exceed the {limit} columns a sheet can hold")]
    ColumnLimitError { columns: usize, limit: usize },

    #[error("Text of {length} characters at {reference} exceeds the cell limit of {limit}")]
    TextLengthError { reference: String, length: usize, limit: usize },

    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Biff8Error(#[from] Biff8Error),

    #[error("{0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),
}

/// Writes one table, header row first, as a single-sheet spreadsheet file.
pub trait SheetSerializer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Extension of the files this serializer produces natively
    fn extension(&self) -> &'static str;

    fn serialize(&self, sheet_name: &str, table: &Table, path: &Path) -> Result<(), SerializeError>;
}

/// Entry name of the `index`-th (1-based) group inside the archive.
pub fn sheet_file_name(index: usize) -> String {
    format!("Sheet{index}.xls")
}

/// Bundles serialized groups into a ZIP archive.
pub struct ArchiveBuilder {
    primary: Box<dyn SheetSerializer>,
    fallback: Box<dyn SheetSerializer>,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        ArchiveBuilder::new()
    }
}

impl ArchiveBuilder {
    /// BIFF8 first, OOXML as fallback.
    pub fn new() -> ArchiveBuilder {
        ArchiveBuilder::with_serializers(Box::new(Biff8Serializer), Box::new(XlsxSerializer))
    }

    pub fn with_serializers(
        primary: Box<dyn SheetSerializer>,
        fallback: Box<dyn SheetSerializer>,
    ) -> ArchiveBuilder {
        ArchiveBuilder { primary, fallback }
    }

    /// Serializes every group and returns the bytes of the ZIP archive.
    ///
    /// Files are staged in a temporary directory that is removed when the build returns.
    /// An empty group list yields a valid empty archive.
    pub fn build(&self, groups: &[Table]) -> Result<Vec<u8>, SplitterError> {
        let directory = tempfile::tempdir()?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (offset, table) in groups.iter().enumerate() {
            let index = offset + 1;
            let content = self.serialize(index, table, directory.path())?;
            let file_name = sheet_file_name(index);
            debug!(index, rows = table.len(), bytes = content.len(), "serialized group");
            zip.start_file(file_name.as_str(), options)?;
            zip.write_all(&content)?;
        }
        let archive = zip.finish()?.into_inner();
        info!(groups = groups.len(), bytes = archive.len(), "built archive");
        Ok(archive)
    }

    /// Writes group `index` into `directory` and reads the file back.
    fn serialize(
        &self,
        index: usize,
        table: &Table,
        directory: &Path,
    ) -> Result<Vec<u8>, SplitterError> {
        let path = directory.join(format!("Sheet{index}.{}", self.primary.extension()));
        let path = match self.primary.serialize(SHEET_NAME, table, &path) {
            Ok(()) => path,
            Err(SerializeError::Unavailable(reason)) => {
                warn!(
                    index,
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    reason,
                    "primary serializer unavailable, using fallback"
                );
                let path = directory.join(format!("Sheet{index}.{}", self.fallback.extension()));
                self.fallback
                    .serialize(SHEET_NAME, table, &path)
                    .map_err(|source| SplitterError::SerializationError { index, source })?;
                path
            }
            Err(source) => Err(SplitterError::SerializationError { index, source })?,
        };
        Ok(std::fs::read(path)?)
    }
}

/// Fails when the header row plus the data rows or the columns do not fit a sheet.
pub(crate) fn check_bounds(
    table: &Table,
    max_rows: usize,
    max_columns: usize,
) -> Result<(), SerializeError> {
    let rows = table.len() + 1;
    if rows > max_rows {
        return Err(SerializeError::RowLimitError { rows, limit: max_rows });
    }
    let columns = table.schema().width();
    if columns > max_columns {
        return Err(SerializeError::ColumnLimitError { columns, limit: max_columns });
    }
    Ok(())
}

/// Fails when `text`, written at (`row`, `col`), is longer than a cell may hold.
pub(crate) fn check_text(row: usize, col: usize, text: &str) -> Result<(), SerializeError> {
    let length = text.encode_utf16().count();
    if length > MAX_TEXT_LENGTH {
        return Err(SerializeError::TextLengthError {
            reference: index_to_reference(row, col),
            length,
            limit: MAX_TEXT_LENGTH,
        });
    }
    Ok(())
}

/// Yields every cell to write as (row, col, value): the header names on row 0, then the
/// data rows. Empty cells and numbers that are not finite are left out.
pub(crate) fn cells(table: &Table) -> impl Iterator<Item = (usize, usize, Value)> + '_ {
    let header = table
        .schema()
        .columns()
        .iter()
        .enumerate()
        .map(|(col, name)| (0, col, Value::Text(name.to_owned())));
    let body = table.rows().iter().enumerate().flat_map(|(offset, row)| {
        row.values()
            .iter()
            .enumerate()
            .map(move |(col, value)| (offset + 1, col, value.to_owned()))
    });
    header.chain(body).filter(|(_, _, value)| match value {
        Value::Empty => false,
        Value::Number(number) => number.is_finite(),
        _ => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReadOptions;
    use crate::spreadsheet::Workbook;
    use crate::table::tests::quantity_table;
    use pretty_assertions::assert_eq;
    use std::io::Read;
    use zip::ZipArchive;

    struct MissingSerializer;

    impl SheetSerializer for MissingSerializer {
        fn name(&self) -> &'static str {
            "missing"
        }

        fn extension(&self) -> &'static str {
            "xls"
        }

        fn serialize(&self, _: &str, _: &Table, _: &Path) -> Result<(), SerializeError> {
            Err(SerializeError::Unavailable("not compiled in"))
        }
    }

    struct CrampedSerializer;

    impl SheetSerializer for CrampedSerializer {
        fn name(&self) -> &'static str {
            "cramped"
        }

        fn extension(&self) -> &'static str {
            "xls"
        }

        fn serialize(&self, _: &str, table: &Table, path: &Path) -> Result<(), SerializeError> {
            check_bounds(table, 2, 256)?;
            Ok(std::fs::write(path, b"")?)
        }
    }

    fn entries(archive: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut zip = ZipArchive::new(Cursor::new(archive)).unwrap();
        (0..zip.len())
            .map(|index| {
                let mut file = zip.by_index(index).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_owned(), content)
            })
            .collect()
    }

    fn quantities(name: &str, content: Vec<u8>) -> Vec<Option<f64>> {
        let mut workbook = Workbook::from_bytes(name, content).unwrap();
        let sheet = workbook.read_sheet(&ReadOptions::default()).unwrap();
        assert_eq!(sheet.name(), SHEET_NAME);
        sheet.to_table("数量").unwrap().quantities().collect()
    }

    #[test]
    fn empty_archive() {
        let archive = ArchiveBuilder::new().build(&[]).unwrap();
        assert!(entries(&archive).is_empty());
    }

    #[test]
    fn entries_are_named_by_position() {
        let groups = vec![
            quantity_table(&[1.0, 5.0]),
            quantity_table(&[590.0]),
            quantity_table(&[2.0]),
        ];
        let archive = ArchiveBuilder::new().build(&groups).unwrap();
        let entries = entries(&archive);
        let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Sheet1.xls", "Sheet2.xls", "Sheet3.xls"]);

        let (name, content) = entries[0].to_owned();
        // Compound file version 3, as written by Excel 97-2003
        assert_eq!(&content[26..28], &[0x03, 0x00]);
        assert_eq!(quantities(&name, content), vec![Some(1.0), Some(5.0)]);
    }

    #[test]
    fn unavailable_primary_falls_back() {
        let builder =
            ArchiveBuilder::with_serializers(Box::new(MissingSerializer), Box::new(XlsxSerializer));
        let archive = builder.build(&[quantity_table(&[3.0, 4.0])]).unwrap();
        let entries = entries(&archive);
        assert_eq!(entries.len(), 1);

        let (name, content) = entries[0].to_owned();
        assert_eq!(name, "Sheet1.xls");
        assert!(content.starts_with(b"PK\x03\x04"));
        assert_eq!(quantities(&name, content), vec![Some(3.0), Some(4.0)]);
    }

    #[test]
    fn data_errors_do_not_fall_back() {
        let builder =
            ArchiveBuilder::with_serializers(Box::new(CrampedSerializer), Box::new(XlsxSerializer));
        let groups = vec![quantity_table(&[1.0]), quantity_table(&[1.0, 2.0])];
        let error = builder.build(&groups).unwrap_err();
        assert!(matches!(
            error,
            SplitterError::SerializationError {
                index: 2,
                source: SerializeError::RowLimitError { rows: 3, limit: 2 }
            }
        ));
        assert_eq!(
            error.to_string(),
            "Serialize group 2 failed: 3 rows exceed the 2 rows a sheet can hold"
        );
    }

    #[test]
    fn text_limit() {
        assert!(check_text(0, 0, &"数".repeat(MAX_TEXT_LENGTH)).is_ok());
        let error = check_text(1, 2, &"x".repeat(MAX_TEXT_LENGTH + 1)).unwrap_err();
        assert_eq!(
            error.to_string(),
            "Text of 32768 characters at C2 exceeds the cell limit of 32767"
        );
    }

    #[test]
    fn cells_skip_empty_and_non_finite_values() {
        let table = Table::from_records(
            vec!["名称", "数量"],
            "数量",
            vec![
                vec![Value::from("螺丝"), Value::from(f64::NAN)],
                vec![Value::Empty, Value::from(true)],
            ],
        )
        .unwrap();
        let cells: Vec<_> = cells(&table).collect();
        assert_eq!(
            cells,
            vec![
                (0, 0, Value::from("名称")),
                (0, 1, Value::from("数量")),
                (1, 0, Value::from("螺丝")),
                (2, 1, Value::from(true)),
            ]
        );
    }
}
