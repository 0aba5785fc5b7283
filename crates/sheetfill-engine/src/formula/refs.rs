//! Byte-level scanner extracting cell and range references from formula
//! text.
//!
//! The scanner finds `A1`, `$B$2`, `A1:C3`, `Sheet2!B4` and
//! `'My Sheet'!B4:D9` shaped tokens with their byte spans, so the rewrite
//! pass can splice replacements back into the original text. Everything it
//! does not recognise is left alone: function names, defined names,
//! whole-column spans like `A:A`, string literals and error literals all
//! pass through unscanned.

use sheetfill_common::letters_to_column_index;

/// Bytes that may continue an identifier (function or defined name, or an
/// unquoted sheet name).
const fn build_word_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0usize;
    while i < 256 {
        let b = i as u8;
        table[i] = b.is_ascii_alphanumeric() || b == b'_' || b == b'.';
        i += 1;
    }
    table
}

static WORD_BYTE_TABLE: [bool; 256] = build_word_table();

#[inline(always)]
fn is_word_byte(b: u8) -> bool {
    WORD_BYTE_TABLE[b as usize]
}

/// One reference found in formula text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RefToken {
    /// Byte offset of the first character, including any sheet qualifier.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
    /// Explicit sheet qualifier, unquoted and unescaped.
    pub sheet: Option<String>,
    /// First corner as 0-based `(row, col)`.
    pub first: (u32, u32),
    /// Second corner for `A1:B2` style ranges.
    pub last: Option<(u32, u32)>,
}

impl RefToken {
    pub fn is_range(&self) -> bool {
        self.last.is_some()
    }

    /// The original text of this token.
    pub fn text<'a>(&self, formula: &'a str) -> &'a str {
        &formula[self.start..self.end]
    }
}

/// Scan formula text (without a leading `=`) for cell and range references,
/// in left-to-right order.
pub fn scan_refs(formula: &str) -> Vec<RefToken> {
    let bytes = formula.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' {
            i = skip_string_literal(bytes, i);
        } else if b == b'\'' {
            match scan_quoted_sheet(formula, i) {
                Some((sheet, after)) if after < bytes.len() && bytes[after] == b'!' => {
                    match scan_reference(formula, after + 1, i, Some(sheet)) {
                        Some(token) => {
                            i = token.end;
                            tokens.push(token);
                        }
                        None => i = after + 1,
                    }
                }
                Some((_, after)) => i = after,
                // unterminated quote, nothing more to find
                None => i = bytes.len(),
            }
        } else if b == b'$' && !prev_blocks_ref(bytes, i) {
            match scan_reference(formula, i, i, None) {
                Some(token) => {
                    i = token.end;
                    tokens.push(token);
                }
                None => i += 1,
            }
        } else if (b.is_ascii_alphabetic() || b == b'_') && !prev_blocks_ref(bytes, i) {
            let mut j = i + 1;
            while j < bytes.len() && is_word_byte(bytes[j]) {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'!' {
                let sheet = formula[i..j].to_string();
                match scan_reference(formula, j + 1, i, Some(sheet)) {
                    Some(token) => {
                        i = token.end;
                        tokens.push(token);
                    }
                    None => i = j + 1,
                }
            } else {
                match scan_reference(formula, i, i, None) {
                    Some(token) => {
                        i = token.end;
                        tokens.push(token);
                    }
                    None => i = j,
                }
            }
        } else {
            i += 1;
        }
    }
    tokens
}

/// True when the byte before `pos` rules out a reference starting there:
/// mid-word positions, a second `$`, a sheet separator whose qualifier
/// already failed to parse, and `#` error literals.
#[inline]
fn prev_blocks_ref(bytes: &[u8], pos: usize) -> bool {
    if pos == 0 {
        return false;
    }
    let prev = bytes[pos - 1];
    is_word_byte(prev) || prev == b'$' || prev == b'!' || prev == b'#'
}

/// True when a token may end at `pos` without sitting inside a longer word
/// or naming a function.
#[inline]
fn boundary_ok(bytes: &[u8], pos: usize) -> bool {
    pos >= bytes.len() || (!is_word_byte(bytes[pos]) && bytes[pos] != b'(')
}

/// Skip a double-quoted string literal starting at `start`, honouring the
/// `""` escape. Returns the position after the closing quote.
fn skip_string_literal(bytes: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'"' {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Read a single-quoted sheet name starting at the opening quote, honouring
/// the `''` escape. Returns the unescaped name and the position after the
/// closing quote.
fn scan_quoted_sheet(formula: &str, start: usize) -> Option<(String, usize)> {
    let bytes = formula.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                i += 2;
                continue;
            }
            let name = formula[start + 1..i].replace("''", "'");
            return Some((name, i + 1));
        }
        i += 1;
    }
    None
}

/// Parse a cell part, optionally followed by `:` and a second cell part,
/// beginning at `cell_start`. `token_start` is where the full token (with
/// any qualifier already consumed by the caller) began.
fn scan_reference(
    formula: &str,
    cell_start: usize,
    token_start: usize,
    sheet: Option<String>,
) -> Option<RefToken> {
    let bytes = formula.as_bytes();
    let (first, first_end) = scan_corner(bytes, formula, cell_start)?;
    if first_end < bytes.len() && bytes[first_end] == b':' {
        if let Some((last, last_end)) = scan_corner(bytes, formula, first_end + 1) {
            if boundary_ok(bytes, last_end) {
                return Some(RefToken {
                    start: token_start,
                    end: last_end,
                    sheet,
                    first,
                    last: Some(last),
                });
            }
        }
    }
    if boundary_ok(bytes, first_end) {
        return Some(RefToken {
            start: token_start,
            end: first_end,
            sheet,
            first,
            last: None,
        });
    }
    None
}

/// Parse one `$?letters$?digits` corner. Returns the 0-based `(row, col)`
/// and the position after the digits.
fn scan_corner(bytes: &[u8], formula: &str, start: usize) -> Option<((u32, u32), usize)> {
    let mut i = start;
    if i < bytes.len() && bytes[i] == b'$' {
        i += 1;
    }
    let col_start = i;
    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
        i += 1;
    }
    if i == col_start || i - col_start > 3 {
        return None;
    }
    let letters = formula[col_start..i].to_ascii_uppercase();
    let col = letters_to_column_index(&letters)?;
    if i < bytes.len() && bytes[i] == b'$' {
        i += 1;
    }
    let digit_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == digit_start {
        return None;
    }
    let row_1: u32 = formula[digit_start..i].parse().ok()?;
    if row_1 == 0 {
        return None;
    }
    Some(((row_1 - 1, col), i))
}
