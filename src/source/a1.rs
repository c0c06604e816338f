//! Spreadsheet column letters (A1 notation).
//!
//! Columns use bijective base-26: 0 is `A`, 25 is `Z`, 26 is `AA`, 701 is `ZZ`.

/// Convert a zero-based column index to its letter form.
pub fn column_index_to_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();

    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - rem - 1) / 26;
    }

    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Convert a column letter back to its zero-based index.
///
/// Returns `None` for an empty string or anything outside `A`-`Z` (lowercase is accepted).
pub fn letter_to_column_index(letter: &str) -> Option<usize> {
    if letter.is_empty() {
        return None;
    }

    let mut n: usize = 0;
    for ch in letter.chars() {
        let ch = ch.to_ascii_uppercase();
        if !ch.is_ascii_uppercase() {
            return None;
        }
        n = n.checked_mul(26)?.checked_add((ch as u8 - b'A') as usize + 1)?;
    }

    Some(n - 1)
}

/// Range covering a whole data row, e.g. `Sheet1!A2:D2` for row 0 of a four-column sheet.
pub fn row_range(worksheet: &str, row: usize, columns: usize) -> String {
    let sheet_row = row + 2; // header plus one-based rows
    let last = column_index_to_letter(columns.max(1) - 1);
    format!("{}!A{}:{}{}", quote_sheet_name(worksheet), sheet_row, last, sheet_row)
}

/// Quote a worksheet title for use in a range when it needs it.
pub fn quote_sheet_name(worksheet: &str) -> String {
    if worksheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        worksheet.to_string()
    } else {
        format!("'{}'", worksheet.replace('\'', "''"))
    }
}
