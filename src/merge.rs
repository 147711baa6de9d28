//! Collapses runs of consecutive quantity-one rows.
use crate::table::Table;
use crate::table::Value;
use tracing::debug;

/// Collapses every run of two or more consecutive quantity-one rows into a single row.
///
/// The collapsed row keeps quantity 1 and blanks every other column. An isolated
/// quantity-one row, and every row with any other quantity, is copied unchanged.
/// Row order is preserved.
pub fn merge(table: &Table) -> Table {
    let schema = table.schema();
    let rows = table.rows();
    let mut merged = Table::empty(schema.clone());
    let mut runs = 0usize;
    let mut index = 0usize;
    while index < rows.len() {
        if schema.is_single(&rows[index]) {
            let mut end = index + 1;
            while end < rows.len() && schema.is_single(&rows[end]) {
                end += 1;
            }
            if end - index > 1 {
                merged.push(rows[index].blanked(schema.quantity_index(), Value::Number(1.0)));
                runs += 1;
            } else {
                merged.push(rows[index].clone());
            }
            index = end;
        } else {
            merged.push(rows[index].clone());
            index += 1;
        }
    }
    debug!(
        input = rows.len(),
        output = merged.len(),
        runs,
        "merged consecutive quantity-one rows"
    );
    merged
}
