use crate::spreadsheet::reference::index_to_reference;
use crate::table::Value;
use chrono::NaiveDate;
use chrono::TimeDelta;

const MILLISECONDS_PER_DAY: i64 = 86_400_000;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values (true/false)
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        let (date_time, date, time) = if is_1904 {
            (Self::NumberDateTime1904, Self::NumberDate1904, Self::NumberTime1904)
        } else {
            (Self::NumberDateTime1900, Self::NumberDate1900, Self::NumberTime1900)
        };
        match id {
            "22" => Some(date_time),
            "14" | "15" | "16" | "17" => Some(date),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(time),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Analyzes format codes for date/time patterns.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_date = false;
        let mut is_time = false;
        let mut is_color = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_literal => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_color => is_literal = true,

                ']' if is_color => is_color = false,
                '[' if !is_literal => is_color = true,
                _ if is_literal || is_color => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// Converts Excel error codes to human-readable error strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Represents a single cell in a spreadsheet with position, type, and value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    /// Cell data type
    pub(crate) kind: CellType,
    /// Cell value as string
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Converts cell value to double-precision floating point.
    pub(crate) fn to_double(&self) -> Result<f64, String> {
        self.value
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("parse '{}' to double failed", self.value))
    }

    /// Converts the raw cell into a table value.
    /// Date and time formatted numbers become ISO text; shared strings are looked up.
    pub(crate) fn to_value(&self, shared_strings: &[String]) -> Result<Value, String> {
        let value = match self.kind {
            CellType::Empty => Value::Empty,
            CellType::Boolean => {
                Value::Bool(self.value == "1" || self.value.eq_ignore_ascii_case("true"))
            }
            CellType::Number => Value::Number(self.to_double()?),
            CellType::NumberDateTime1900 => {
                Value::Text(to_datetime_string(self.to_double()?, false)?)
            }
            CellType::NumberDateTime1904 => {
                Value::Text(to_datetime_string(self.to_double()?, true)?)
            }
            CellType::NumberDate1900 => Value::Text(to_date_string(self.to_double()?, false)?),
            CellType::NumberDate1904 => Value::Text(to_date_string(self.to_double()?, true)?),
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                Value::Text(to_time_string(self.to_double()?))
            }
            CellType::IsoDateTime => Value::Text(self.value.replace('T', " ")),
            CellType::InlineString => Value::Text(self.value.to_owned()),
            CellType::SharedString => {
                let index = self.value.parse::<usize>()
                    .map_err(|_| format!("parse '{}' to shared string index failed", self.value))?;
                shared_strings.get(index)
                    .map(|string| Value::Text(string.to_owned()))
                    .ok_or_else(|| format!("shared string {} not found", index))?
            }
            CellType::Error => Err(self.value.to_owned())?,
        };
        Ok(value)
    }
}

/// Splits an Excel serial number into whole days and milliseconds within the day.
fn split_serial(serial: f64) -> (i64, i64) {
    let milliseconds = (serial * MILLISECONDS_PER_DAY as f64).round() as i64;
    (milliseconds.div_euclid(MILLISECONDS_PER_DAY), milliseconds.rem_euclid(MILLISECONDS_PER_DAY))
}

/// Converts whole Excel days to an ISO date string.
/// Handles Lotus 1-2-3 leap year bug for 1900 epoch.
fn to_date(days: i64, is_1904: bool) -> Result<String, String> {
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .zip(TimeDelta::try_days(days + offset))
        .and_then(|(epoch, duration)| epoch.checked_add_signed(duration))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| format!("parse '{}' to date failed", days))
}

/// Formats milliseconds as `HH:MM:SS`, with a fraction only when present.
fn to_clock(milliseconds: i64) -> String {
    let mut hours = milliseconds;
    let milliseconds = hours % 1_000; hours /= 1_000;
    let seconds = hours % 60; hours /= 60;
    let minutes = hours % 60; hours /= 60;
    if milliseconds > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

/// Converts Excel numeric date to ISO date string.
pub(crate) fn to_date_string(serial: f64, is_1904: bool) -> Result<String, String> {
    to_date(serial.trunc() as i64, is_1904)
}

/// Converts Excel numeric time to ISO time string.
/// Elapsed-time formats count hours past 24, so whole days are kept.
pub(crate) fn to_time_string(serial: f64) -> String {
    to_clock((serial.abs() * MILLISECONDS_PER_DAY as f64).round() as i64)
}

/// Converts Excel numeric datetime to ISO datetime string.
pub(crate) fn to_datetime_string(serial: f64, is_1904: bool) -> Result<String, String> {
    let (days, milliseconds) = split_serial(serial);
    Ok(format!("{} {}", to_date(days, is_1904)?, to_clock(milliseconds)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell {
            row: 1,
            col: 2,
            kind,
            value: value.to_owned(),
        }
    }

    #[test]
    fn custom_number_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy/m/d h:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("[h]:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("0.00\"days\"", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]#,##0_);(#,##0)", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("General", false), CellType::Number);
    }

    #[test]
    fn builtin_number_formats() {
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("22", true), Some(CellType::NumberDateTime1904));
        assert_eq!(CellType::parse_builtin_number_format_id("0", false), None);
    }

    #[test]
    fn serial_dates() {
        assert_eq!(to_date_string(1.0, false).unwrap(), "1900-01-01");
        assert_eq!(to_date_string(61.0, false).unwrap(), "1900-03-01");
        assert_eq!(to_date_string(45000.0, false).unwrap(), "2023-03-15");
        assert_eq!(to_date_string(0.0, true).unwrap(), "1904-01-01");
        assert_eq!(to_datetime_string(45000.5, false).unwrap(), "2023-03-15 12:00:00");
        assert_eq!(to_datetime_string(45000.999999999, false).unwrap(), "2023-03-16 00:00:00");
        assert_eq!(to_time_string(0.75), "18:00:00");
        assert_eq!(to_time_string(1.5), "36:00:00");
        assert!(to_date_string(1e12, false).is_err());
    }

    #[test]
    fn cell_values() {
        let shared_strings = vec!["名称".to_owned()];
        assert_eq!(cell(CellType::Number, "590").to_value(&shared_strings), Ok(Value::Number(590.0)));
        assert_eq!(cell(CellType::Boolean, "1").to_value(&shared_strings), Ok(Value::Bool(true)));
        assert_eq!(cell(CellType::SharedString, "0").to_value(&shared_strings), Ok(Value::from("名称")));
        assert_eq!(cell(CellType::NumberDate1900, "45000").to_value(&shared_strings), Ok(Value::from("2023-03-15")));
        assert_eq!(cell(CellType::IsoDateTime, "2023-03-15T08:30:00").to_value(&shared_strings), Ok(Value::from("2023-03-15 08:30:00")));
        assert!(cell(CellType::SharedString, "3").to_value(&shared_strings).is_err());
        assert!(cell(CellType::Number, "abc").to_value(&shared_strings).is_err());
        assert_eq!(cell(CellType::Error, "#N/A").to_value(&shared_strings), Err("#N/A".to_owned()));
        assert_eq!(cell(CellType::Error, "#N/A").reference(), "C2");
    }
}
