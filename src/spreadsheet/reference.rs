//! A1-style cell references.

/// Largest sheet an xlsx file can describe
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

/// Converts a 0-based column index to its letters (0 → `A`, 26 → `AA`).
pub(crate) fn index_to_column(col: usize) -> String {
    let mut col = col + 1;
    let mut letters = Vec::<u8>::new();
    while col > 0 {
        col -= 1;
        letters.push(b'A' + (col % 26) as u8);
        col /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Converts 0-based row and column indexes to an Excel-style reference such as `B3`.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_column(col), row + 1)
}

/// Parses an Excel-style reference (`B3`, `$AA$10`) into 0-based (row, column) indexes.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.trim();
    let split = reference
        .char_indices()
        .find(|(_, character)| character.is_ascii_digit())
        .map(|(index, _)| index)?;
    let (letters, digits) = reference.split_at(split);
    let letters = letters.replace('$', "");
    if letters.is_empty() {
        return None;
    }

    let mut col = 0usize;
    for letter in letters.chars() {
        if !letter.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(letter.to_ascii_uppercase() as usize - 'A' as usize + 1)
            .filter(|col| *col <= MAX_COLUMNS)?;
    }
    let row = digits.parse::<usize>().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }
    Some((row - 1, col - 1))
}
