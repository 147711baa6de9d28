//! # Sheet Splitter
//!
//! Splits an order sheet into several smaller sheets whose quantity totals stay under a
//! limit, and packages them as one ZIP archive of legacy Excel files.
//!
//! ## Pipeline
//!
//! - **Read**: [`Workbook`] opens an uploaded `.xlsx` or `.xls` file (the format is detected
//!   from its content) and [`Sheet::to_table`] turns the first worksheet into a [`Table`].
//! - **Merge**: [`merge`] collapses each run of consecutive quantity-one rows into one row.
//! - **Partition**: [`partition`] cuts the merged rows into contiguous groups whose quantity
//!   sum does not exceed the limit.
//! - **Archive**: [`ArchiveBuilder`] writes every group as `Sheet<k>.xls` into a ZIP archive.
//!
//! [`split`] runs merge, partition and archive in one call and returns a [`SplitResult`]
//! with per-group summaries.
mod archive;
mod config;
mod error;
mod helpers;
mod merge;
mod partition;
mod spreadsheet;
mod table;

pub use archive::sheet_file_name;
pub use archive::ArchiveBuilder;
pub use archive::Biff8Serializer;
pub use archive::SerializeError;
pub use archive::SheetSerializer;
pub use archive::XlsxSerializer;
pub use archive::SHEET_NAME;
pub use config::ConfigError;
pub use config::ReadOptions;
pub use config::SplitOptions;
pub use config::DEFAULT_LIMIT;
pub use config::DEFAULT_QUANTITY_COLUMN;
pub use error::SplitterError;
pub use helpers::biff8::Biff8Error;
pub use helpers::xml::XmlError;
pub use merge::merge;
pub use partition::partition;
pub use spreadsheet::xls::XlsError;
pub use spreadsheet::Sheet;
pub use spreadsheet::SpreadsheetError;
pub use spreadsheet::Workbook;
pub use table::Row;
pub use table::Schema;
pub use table::SchemaError;
pub use table::Table;
pub use table::TableStats;
pub use table::Value;

use tracing::debug;

/// Display metadata of one output group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupSummary {
    /// Entry name inside the archive, `Sheet<k>.xls`
    pub name: String,
    pub rows: usize,
    pub quantity_sum: f64,
    /// True only for a group holding a single row whose quantity is above the limit
    pub over_limit: bool,
}

/// Everything one split request produces.
#[derive(Debug)]
pub struct SplitResult {
    /// Statistics of the table before merging
    pub input: TableStats,
    pub merged: Table,
    pub groups: Vec<Table>,
    pub summaries: Vec<GroupSummary>,
    /// ZIP archive bytes
    pub archive: Vec<u8>,
    pub limit: f64,
}

impl SplitResult {
    /// Statistics of the merged table
    pub fn merged_stats(&self) -> TableStats {
        self.merged.stats()
    }
}

/// Merges, partitions and archives `table` with the default serializers.
pub fn split(table: &Table, options: &SplitOptions) -> Result<SplitResult, SplitterError> {
    split_with(table, options, &ArchiveBuilder::new())
}

/// Same as [`split`] with a caller supplied archive builder.
pub fn split_with(
    table: &Table,
    options: &SplitOptions,
    builder: &ArchiveBuilder,
) -> Result<SplitResult, SplitterError> {
    options.validate()?;
    let input = table.stats();
    let merged = merge(table);
    let groups = partition(&merged, options.limit);
    let summaries = summarize(&groups, options.limit);
    let archive = builder.build(&groups)?;
    debug!(
        rows = input.rows,
        merged = merged.len(),
        groups = groups.len(),
        "split finished"
    );
    Ok(SplitResult {
        input,
        merged,
        groups,
        summaries,
        archive,
        limit: options.limit,
    })
}

/// Reads the selected worksheet of `workbook` and splits it.
pub fn split_workbook(
    workbook: &mut Workbook,
    read_options: &ReadOptions,
    options: &SplitOptions,
) -> Result<SplitResult, SplitterError> {
    options.validate()?;
    let sheet = workbook.read_sheet(read_options)?;
    let table = sheet.to_table(&options.quantity_column)?;
    split(&table, options)
}

/// Summaries of `groups`, named by their archive entry.
pub fn summarize(groups: &[Table], limit: f64) -> Vec<GroupSummary> {
    groups
        .iter()
        .enumerate()
        .map(|(offset, group)| {
            let quantity_sum = group.quantity_sum();
            GroupSummary {
                name: sheet_file_name(offset + 1),
                rows: group.len(),
                quantity_sum,
                over_limit: quantity_sum > limit,
            }
        })
        .collect()
}

/// Download name of the archive built from `upload_name`: `分割后的表格_<stem>.zip`,
/// where the stem is everything before the first dot.
pub fn archive_file_name(upload_name: &str) -> String {
    let stem = upload_name.split('.').next().unwrap_or_default();
    format!("分割后的表格_{stem}.zip")
}
