//! # Table Model
//!
//! Fixed-schema rows shared by every pipeline stage. The schema (column names plus the position
//! of the quantity column) is decided once per request from the input header; rows are plain
//! positional value lists checked against it when the table is built.
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while building a table from a header and records.
#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    /// The designated quantity column is not part of the header
    #[error("Missing quantity column '{0}'")]
    MissingQuantityColumnError(String),

    /// A record does not have one value per column
    #[error("Row {row} has {actual} values, expected {expected}")]
    RowWidthError {
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// A single scalar cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Returns true for a blank cell.
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Interprets the value as a number.
    ///
    /// Text is parsed after trimming, booleans count as 1/0, blanks have no number.
    /// NaN and infinities, stored or spelled out as text, have no number either.
    pub fn as_number(&self) -> Option<f64> {
        let number = match self {
            Value::Empty => None,
            Value::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Value::Number(value) => Some(*value),
            Value::Text(value) => value.trim().parse::<f64>().ok(),
        };
        number.filter(|number| number.is_finite())
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Bool(value) => write!(f, "{}", if *value { "TRUE" } else { "FALSE" }),
            Value::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Value::Number(value) => write!(f, "{}", value),
            Value::Text(value) => f.write_str(value),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Column layout shared by all rows of a table.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    columns: Vec<String>,
    quantity_index: usize,
}

impl Schema {
    /// Builds a schema, locating `quantity_column` among `columns`.
    pub fn new<I, S>(columns: I, quantity_column: &str) -> Result<Schema, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let quantity_index = columns
            .iter()
            .position(|column| column == quantity_column)
            .ok_or_else(|| SchemaError::MissingQuantityColumnError(quantity_column.to_owned()))?;
        Ok(Schema {
            columns,
            quantity_index,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn quantity_index(&self) -> usize {
        self.quantity_index
    }

    pub fn quantity_column(&self) -> &str {
        &self.columns[self.quantity_index]
    }

    /// Reads the quantity of a row laid out by this schema.
    pub fn quantity_of(&self, row: &Row) -> Option<f64> {
        row.get(self.quantity_index).and_then(Value::as_number)
    }

    /// Returns true when the row's quantity is exactly one.
    pub fn is_single(&self, row: &Row) -> bool {
        self.quantity_of(row) == Some(1.0)
    }
}

/// One record: a value per schema column, in column order.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Row {
        Row { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Same width, every value blank except `keep`, which is set to `value`.
    pub(crate) fn blanked(&self, keep: usize, value: Value) -> Row {
        let mut values = vec![Value::Empty; self.values.len()];
        values[keep] = value;
        Row { values }
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Ordered rows sharing one schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    schema: Arc<Schema>,
    rows: Vec<Row>,
}

impl Table {
    /// Builds a table, rejecting any row whose width differs from the schema's.
    pub fn new(schema: Arc<Schema>, rows: Vec<Row>) -> Result<Table, SchemaError> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != schema.width() {
                Err(SchemaError::RowWidthError {
                    row: index + 1,
                    expected: schema.width(),
                    actual: row.len(),
                })?
            }
        }
        Ok(Table { schema, rows })
    }

    /// Builds a table straight from a header and raw records.
    pub fn from_records<I, S>(
        columns: I,
        quantity_column: &str,
        records: Vec<Vec<Value>>,
    ) -> Result<Table, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schema = Arc::new(Schema::new(columns, quantity_column)?);
        Table::new(schema, records.into_iter().map(Row::new).collect())
    }

    /// An empty table sharing `schema`.
    pub(crate) fn empty(schema: Arc<Schema>) -> Table {
        Table {
            schema,
            rows: Vec::new(),
        }
    }

    /// Appends a row already laid out by this table's schema.
    pub(crate) fn push(&mut self, row: Row) {
        debug_assert_eq!(row.len(), self.schema.width());
        self.rows.push(row);
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Quantity of every row, in order.
    pub fn quantities(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.rows.iter().map(|row| self.schema.quantity_of(row))
    }

    /// Sum of all quantities; rows without a number contribute nothing.
    pub fn quantity_sum(&self) -> f64 {
        self.quantities().flatten().sum()
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            rows: self.len(),
            quantity_sum: self.quantity_sum(),
            ones: self.rows.iter().filter(|row| self.schema.is_single(row)).count(),
        }
    }
}

/// Row count, total quantity and number of quantity-one rows of a table.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TableStats {
    pub rows: usize,
    pub quantity_sum: f64,
    pub ones: usize,
}
