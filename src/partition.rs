//! Greedy partitioning of a table into groups bounded by a quantity sum.
use crate::table::Table;
use tracing::debug;

/// Splits `table` into contiguous groups whose quantity sum does not exceed `limit`.
///
/// Single pass, no backtracking: a group is closed as soon as the next row would push its
/// sum over the limit. A row whose own quantity is above the limit is never split; it
/// lands alone in a group that exceeds the limit. Rows without a numeric quantity count
/// as zero. `limit` must be positive, which callers check through
/// [`SplitOptions::validate`](crate::config::SplitOptions::validate).
pub fn partition(table: &Table, limit: f64) -> Vec<Table> {
    let schema = table.schema();
    let mut groups = Vec::<Table>::new();
    let mut current = Table::empty(schema.clone());
    let mut sum = 0f64;
    for row in table.rows() {
        let quantity = schema.quantity_of(row).unwrap_or(0.0);
        if sum + quantity > limit && !current.is_empty() {
            groups.push(std::mem::replace(&mut current, Table::empty(schema.clone())));
            sum = 0.0;
        }
        current.push(row.clone());
        sum += quantity;
    }
    if !current.is_empty() {
        groups.push(current);
    }
    debug!(rows = table.len(), groups = groups.len(), limit, "partitioned table");
    groups
}
