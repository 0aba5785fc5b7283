//! Column-letter arithmetic and A1 parsing shared by the reference types.
//!
//! Columns are 0-based throughout the engine: `A` is 0, `Z` is 25, `AA` is 26
//! and `ZZ` is 701. Rows are 0-based as well; the 1-based row numbers of the
//! A1 notation are converted at the parse/format boundary and nowhere else.

use core::fmt;

/// Errors returned when parsing A1-style cell text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum A1ParseError {
    Empty,
    InvalidColumn(String),
    InvalidRow(String),
    ZeroRow,
    UnterminatedSheetQuote(String),
    MissingCell(String),
}

impl fmt::Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            A1ParseError::Empty => write!(f, "empty cell reference"),
            A1ParseError::InvalidColumn(s) => write!(f, "invalid column letters in '{s}'"),
            A1ParseError::InvalidRow(s) => write!(f, "invalid row number in '{s}'"),
            A1ParseError::ZeroRow => write!(f, "row numbers are 1-based (>= 1)"),
            A1ParseError::UnterminatedSheetQuote(s) => {
                write!(f, "unterminated quoted sheet name in '{s}'")
            }
            A1ParseError::MissingCell(s) => write!(f, "no cell part after sheet name in '{s}'"),
        }
    }
}

impl std::error::Error for A1ParseError {}

/// Render a 0-based column index as letters (`0` -> `A`, `26` -> `AA`).
pub fn column_to_letters(mut col: u32) -> String {
    let mut buf = Vec::new();
    loop {
        let rem = (col % 26) as u8;
        buf.push(b'A' + rem);
        col /= 26;
        if col == 0 {
            break;
        }
        col -= 1;
    }
    buf.reverse();
    String::from_utf8(buf).expect("only ASCII A-Z")
}

/// Parse column letters into a 0-based index. Accepts upper-case only.
pub fn letters_to_column_index(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for (idx, ch) in s.bytes().enumerate() {
        if !ch.is_ascii_uppercase() {
            return None;
        }
        let val = (ch - b'A') as u32;
        col = col.checked_mul(26)?;
        col = col.checked_add(val)?;
        if idx != s.len() - 1 {
            col = col.checked_add(1)?;
        }
    }
    Some(col)
}

/// Parse the cell part of an A1 reference (no sheet prefix) into 0-based
/// `(row, col)`. `$` anchors are accepted and discarded; the engine tracks
/// cell movement explicitly, so anchor flags carry no meaning here.
pub fn parse_a1(text: &str) -> Result<(u32, u32), A1ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(A1ParseError::Empty);
    }
    let bytes = trimmed.as_bytes();
    let mut i = 0;
    if bytes[i] == b'$' {
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    let col_txt: String = trimmed[col_start..i].to_ascii_uppercase();
    let col = letters_to_column_index(&col_txt)
        .ok_or_else(|| A1ParseError::InvalidColumn(trimmed.to_string()))?;
    if i < bytes.len() && bytes[i] == b'$' {
        i += 1;
    }
    let row_txt = &trimmed[i..];
    if row_txt.is_empty() || !row_txt.bytes().all(|b| b.is_ascii_digit()) {
        return Err(A1ParseError::InvalidRow(trimmed.to_string()));
    }
    let row_1: u32 = row_txt
        .parse()
        .map_err(|_| A1ParseError::InvalidRow(trimmed.to_string()))?;
    if row_1 == 0 {
        return Err(A1ParseError::ZeroRow);
    }
    Ok((row_1 - 1, col))
}

/// Split `Sheet1!A1` / `'My Sheet'!A1` into an optional sheet name and the
/// cell part. Text without `!` has no sheet component.
pub fn split_sheet_prefix(text: &str) -> Result<(Option<String>, &str), A1ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(A1ParseError::Empty);
    }
    if let Some(rest) = trimmed.strip_prefix('\'') {
        let Some(close) = rest.find('\'') else {
            return Err(A1ParseError::UnterminatedSheetQuote(trimmed.to_string()));
        };
        let name = rest[..close].to_string();
        let after = &rest[close + 1..];
        let Some(cell) = after.strip_prefix('!') else {
            return Err(A1ParseError::MissingCell(trimmed.to_string()));
        };
        if cell.is_empty() {
            return Err(A1ParseError::MissingCell(trimmed.to_string()));
        }
        return Ok((Some(name), cell));
    }
    match trimmed.find('!') {
        Some(pos) => {
            let cell = &trimmed[pos + 1..];
            if cell.is_empty() {
                return Err(A1ParseError::MissingCell(trimmed.to_string()));
            }
            Ok((Some(trimmed[..pos].to_string()), cell))
        }
        None => Ok((None, trimmed)),
    }
}

/// True when a sheet name must be single-quoted inside an A1 reference.
pub fn sheet_name_needs_quoting(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let mut chars = name.chars();
    let first = chars.next().expect("non-empty");
    if !(first.is_ascii_alphabetic() || first == '_') {
        return true;
    }
    !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letter_roundtrip() {
        for (idx, txt) in [(0, "A"), (25, "Z"), (26, "AA"), (701, "ZZ"), (702, "AAA")] {
            assert_eq!(column_to_letters(idx), txt);
            assert_eq!(letters_to_column_index(txt), Some(idx));
        }
        assert_eq!(letters_to_column_index("a"), None);
        assert_eq!(letters_to_column_index(""), None);
    }

    #[test]
    fn a1_parsing() {
        assert_eq!(parse_a1("A1"), Ok((0, 0)));
        assert_eq!(parse_a1("$B$2"), Ok((1, 1)));
        assert_eq!(parse_a1("aa10"), Ok((9, 26)));
        assert_eq!(parse_a1("A0"), Err(A1ParseError::ZeroRow));
        assert!(matches!(parse_a1("1A"), Err(A1ParseError::InvalidColumn(_))));
        assert!(matches!(parse_a1("A"), Err(A1ParseError::InvalidRow(_))));
    }

    #[test]
    fn sheet_prefix_splitting() {
        assert_eq!(split_sheet_prefix("C3").unwrap(), (None, "C3"));
        assert_eq!(
            split_sheet_prefix("Sheet2!C3").unwrap(),
            (Some("Sheet2".to_string()), "C3")
        );
        assert_eq!(
            split_sheet_prefix("'My Sheet'!D4").unwrap(),
            (Some("My Sheet".to_string()), "D4")
        );
        assert!(matches!(
            split_sheet_prefix("'Oops!A1"),
            Err(A1ParseError::UnterminatedSheetQuote(_))
        ));
        assert!(matches!(
            split_sheet_prefix("Sheet1!"),
            Err(A1ParseError::MissingCell(_))
        ));
    }

    #[test]
    fn quoting_rules() {
        assert!(!sheet_name_needs_quoting("Sheet1"));
        assert!(!sheet_name_needs_quoting("_data.raw"));
        assert!(sheet_name_needs_quoting("My Sheet"));
        assert!(sheet_name_needs_quoting("1st"));
        assert!(sheet_name_needs_quoting(""));
    }
}
