//! Sheet-scoped cell references and the rectangles built from them.

use core::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::coord::{
    A1ParseError, column_to_letters, parse_a1, sheet_name_needs_quoting, split_sheet_prefix,
};

fn write_sheet_prefix(f: &mut fmt::Formatter<'_>, sheet: &str) -> fmt::Result {
    if sheet_name_needs_quoting(sheet) {
        write!(f, "'{sheet}'!")
    } else {
        write!(f, "{sheet}!")
    }
}

/// A single cell position: sheet name plus 0-based row and column.
///
/// Ordering is structural (sheet, then row, then column), which is exactly
/// the order template bindings are replayed in.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CellRef {
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(sheet: impl Into<String>, row: u32, col: u32) -> Self {
        CellRef {
            sheet: sheet.into(),
            row,
            col,
        }
    }

    /// Same position on a different sheet.
    pub fn with_sheet(&self, sheet: impl Into<String>) -> Self {
        CellRef::new(sheet, self.row, self.col)
    }

    /// Position shifted by a cell offset within the same sheet.
    pub fn offset(&self, drow: u32, dcol: u32) -> Self {
        CellRef::new(self.sheet.clone(), self.row + drow, self.col + dcol)
    }

    /// The cell part without the sheet qualifier, e.g. `B3`.
    pub fn cell_name(&self) -> String {
        format!("{}{}", column_to_letters(self.col), self.row + 1)
    }

    /// Parse a reference that may carry a sheet prefix; cells without one are
    /// placed on `default_sheet`.
    pub fn parse_with_default(text: &str, default_sheet: &str) -> Result<Self, A1ParseError> {
        let (sheet, cell) = split_sheet_prefix(text)?;
        let (row, col) = parse_a1(cell)?;
        Ok(CellRef {
            sheet: sheet.unwrap_or_else(|| default_sheet.to_string()),
            row,
            col,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, &self.sheet)?;
        write!(f, "{}", self.cell_name())
    }
}

impl FromStr for CellRef {
    type Err = A1ParseError;

    /// Parse `A1`, `$B$2`, `Sheet2!C3` or `'My Sheet'!D4`. A bare cell lands
    /// on an empty sheet name; use [`CellRef::parse_with_default`] when a
    /// context sheet is known.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CellRef::parse_with_default(s, "")
    }
}

/// Rectangle extent in cells. Both dimensions may be zero.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const ZERO: Size = Size {
        width: 0,
        height: 0,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Size { width, height }
    }

    pub const fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub const fn cell_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.width, self.height)
    }
}

/// A rectangle of cells anchored at its top-left corner.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AreaRef {
    pub first_cell: CellRef,
    pub size: Size,
}

impl AreaRef {
    pub fn new(first_cell: CellRef, size: Size) -> Self {
        AreaRef { first_cell, size }
    }

    /// Build from inclusive corners on the same sheet. The corners must be
    /// ordered (top-left, bottom-right).
    pub fn from_corners(first: CellRef, last: &CellRef) -> Option<Self> {
        if first.sheet != last.sheet || last.row < first.row || last.col < first.col {
            return None;
        }
        let size = Size::new(last.col - first.col + 1, last.row - first.row + 1);
        Some(AreaRef::new(first, size))
    }

    /// Bottom-right corner. Collapses onto the anchor for empty rectangles.
    pub fn last_cell(&self) -> CellRef {
        CellRef::new(
            self.first_cell.sheet.clone(),
            self.first_cell.row + self.size.height.saturating_sub(1),
            self.first_cell.col + self.size.width.saturating_sub(1),
        )
    }

    pub fn cell_count(&self) -> u64 {
        self.size.cell_count()
    }

    /// Parse a rectangle that may carry a sheet prefix; bare rectangles
    /// land on `default_sheet`.
    pub fn parse_with_default(text: &str, default_sheet: &str) -> Result<Self, A1ParseError> {
        let area: AreaRef = text.parse()?;
        if area.first_cell.sheet.is_empty() {
            let first = area.first_cell.with_sheet(default_sheet);
            return Ok(AreaRef::new(first, area.size));
        }
        Ok(area)
    }

    /// Whether a cell lies inside this rectangle (sheet included).
    pub fn contains(&self, cell: &CellRef) -> bool {
        cell.sheet == self.first_cell.sheet
            && cell.row >= self.first_cell.row
            && cell.row < self.first_cell.row + self.size.height
            && cell.col >= self.first_cell.col
            && cell.col < self.first_cell.col + self.size.width
    }

    /// Whether `other` lies fully inside this rectangle.
    pub fn contains_area(&self, other: &AreaRef) -> bool {
        if other.size.is_zero() {
            return self.contains(&other.first_cell);
        }
        self.contains(&other.first_cell) && self.contains(&other.last_cell())
    }
}

impl fmt::Display for AreaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, &self.first_cell.sheet)?;
        write!(
            f,
            "{}:{}",
            self.first_cell.cell_name(),
            self.last_cell().cell_name()
        )
    }
}

impl FromStr for AreaRef {
    type Err = A1ParseError;

    /// Parse `Sheet1!A1:B5` or a bare `A1:B5`. A single cell (`Sheet1!A1`)
    /// is accepted as a 1x1 rectangle. The second corner never carries its
    /// own sheet prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sheet, cells) = split_sheet_prefix(s)?;
        let sheet = sheet.unwrap_or_default();
        let (first_txt, last_txt) = match cells.split_once(':') {
            Some((a, b)) => (a, b),
            None => (cells, cells),
        };
        let (fr, fc) = parse_a1(first_txt)?;
        let (lr, lc) = parse_a1(last_txt)?;
        let first = CellRef::new(sheet.clone(), fr, fc);
        let last = CellRef::new(sheet, lr, lc);
        AreaRef::from_corners(first, &last).ok_or_else(|| A1ParseError::InvalidRow(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cellref_parse_and_display() {
        let c: CellRef = "Sheet2!C3".parse().unwrap();
        assert_eq!(c, CellRef::new("Sheet2", 2, 2));
        assert_eq!(c.to_string(), "Sheet2!C3");

        let q: CellRef = "'My Sheet'!D4".parse().unwrap();
        assert_eq!(q.sheet, "My Sheet");
        assert_eq!(q.to_string(), "'My Sheet'!D4");

        let anchored: CellRef = "$B$2".parse().unwrap();
        assert_eq!((anchored.row, anchored.col), (1, 1));
    }

    #[test]
    fn cellref_ordering_is_row_major() {
        let mut cells = vec![
            CellRef::new("S", 1, 0),
            CellRef::new("S", 0, 2),
            CellRef::new("S", 0, 1),
        ];
        cells.sort();
        assert_eq!(
            cells,
            vec![
                CellRef::new("S", 0, 1),
                CellRef::new("S", 0, 2),
                CellRef::new("S", 1, 0),
            ]
        );
    }

    #[test]
    fn arearef_corners_and_containment() {
        let area: AreaRef = "Sheet1!B2:D5".parse().unwrap();
        assert_eq!(area.first_cell, CellRef::new("Sheet1", 1, 1));
        assert_eq!(area.size, Size::new(3, 4));
        assert_eq!(area.last_cell(), CellRef::new("Sheet1", 4, 3));
        assert!(area.contains(&CellRef::new("Sheet1", 1, 1)));
        assert!(area.contains(&CellRef::new("Sheet1", 4, 3)));
        assert!(!area.contains(&CellRef::new("Sheet1", 5, 3)));
        assert!(!area.contains(&CellRef::new("Other", 1, 1)));
        assert_eq!(area.to_string(), "Sheet1!B2:D5");
    }

    #[test]
    fn arearef_single_cell() {
        let area: AreaRef = "Sheet1!A1".parse().unwrap();
        assert_eq!(area.size, Size::new(1, 1));
        assert_eq!(area.cell_count(), 1);
    }

    #[test]
    fn arearef_rejects_inverted_corners() {
        assert!("Sheet1!C3:A1".parse::<AreaRef>().is_err());
    }

    #[test]
    fn arearef_default_sheet() {
        let bare = AreaRef::parse_with_default("B2:C3", "Data").unwrap();
        assert_eq!(bare.first_cell.sheet, "Data");
        let qualified = AreaRef::parse_with_default("Other!B2:C3", "Data").unwrap();
        assert_eq!(qualified.first_cell.sheet, "Other");
    }

    #[test]
    fn area_containment_strictness() {
        let outer: AreaRef = "S!A1:C4".parse().unwrap();
        let inner: AreaRef = "S!B2:C3".parse().unwrap();
        assert!(outer.contains_area(&inner));
        assert!(!inner.contains_area(&outer));
        assert!(outer.contains_area(&outer));
    }
}
