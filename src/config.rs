//! Options for splitting and for reading the uploaded workbook.
use glob::Pattern;
use thiserror::Error;

/// Quantity ceiling of one output sheet unless configured otherwise.
pub const DEFAULT_LIMIT: f64 = 590.0;

/// Header of the quantity column unless configured otherwise.
pub const DEFAULT_QUANTITY_COLUMN: &str = "数量";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Limit must be a positive number, got {0}")]
    InvalidLimitError(f64),

    #[error("Quantity column name must not be empty")]
    EmptyQuantityColumnError,

    #[error("Invalid sheet name pattern: {0}")]
    SheetPatternError(#[from] glob::PatternError),
}

/// Parameters of one split request.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitOptions {
    /// Maximum quantity sum per output sheet.
    pub limit: f64,
    /// Header of the column holding each row's quantity.
    pub quantity_column: String,
}

impl Default for SplitOptions {
    fn default() -> Self {
        SplitOptions {
            limit: DEFAULT_LIMIT,
            quantity_column: DEFAULT_QUANTITY_COLUMN.to_owned(),
        }
    }
}

impl SplitOptions {
    pub fn new(limit: f64, quantity_column: impl Into<String>) -> SplitOptions {
        SplitOptions {
            limit,
            quantity_column: quantity_column.into(),
        }
    }

    /// Rejects a non-positive or non-finite limit and a blank quantity column name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.limit.is_finite() || self.limit <= 0.0 {
            Err(ConfigError::InvalidLimitError(self.limit))?
        }
        if self.quantity_column.trim().is_empty() {
            Err(ConfigError::EmptyQuantityColumnError)?
        }
        Ok(())
    }
}

/// Which sheet to read from a workbook, and how to treat its cells.
#[derive(Clone, Debug)]
pub struct ReadOptions {
    /// Sheet name pattern; the first sheet is read when absent.
    pub sheet_name: Option<Pattern>,

    /// Skip rows where all columns are empty.
    pub skip_empty_rows: bool,

    /// Read error cells (`#N/A`, `#DIV/0!`, ...) as blanks instead of failing.
    pub error_as_null: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            sheet_name: None,
            skip_empty_rows: true,
            error_as_null: true,
        }
    }
}

impl ReadOptions {
    /// Selects sheets by a glob pattern such as `订单*`.
    pub fn with_sheet_pattern(mut self, pattern: &str) -> Result<ReadOptions, ConfigError> {
        self.sheet_name = Some(Pattern::new(pattern)?);
        Ok(self)
    }

    /// Checks if a sheet name matches the pattern.
    /// Returns true if no pattern is specified.
    pub(crate) fn accept(&self, sheet_name: &str) -> bool {
        self.sheet_name
            .as_ref()
            .map(|pattern| pattern.matches(sheet_name))
            .unwrap_or(true)
    }
}
