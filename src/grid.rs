//! Typed worksheet grid.
//!
//! The resolver and builder only ever see this abstraction; the calamine
//! reader in `workbook` is one way of filling it.

use chrono::NaiveDateTime;

/// A single worksheet cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Non-blank text content.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) if !s.trim().is_empty() => Some(s.trim()),
            _ => None,
        }
    }

    /// Numeric value. Text is parsed whole first, then by its leading
    /// numeric prefix (`"0.35 bottom"` → 0.35). Anything else is NaN.
    pub fn to_f64(&self) -> f64 {
        match self {
            Cell::Number(v) => *v,
            Cell::Text(s) => parse_leading_f64(s),
            _ => f64::NAN,
        }
    }

    /// Text rendering used for text columns (IDs, comments, metadata).
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                Some(format!("{}", *v as i64))
            }
            Cell::Number(v) => Some(v.to_string()),
            Cell::Date(d) => Some(d.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Cell::Empty
        } else {
            Cell::Number(v)
        }
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Empty, Cell::from)
    }
}

/// Leading number of `s`, with trailing text ignored. A comma is a decimal
/// point unless the number also holds a `.`, in which case commas group
/// thousands.
fn parse_leading_f64(s: &str) -> f64 {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return v;
    }
    let chars: Vec<char> = s.chars().collect();
    let digit_at = |k: usize| chars.get(k).is_some_and(char::is_ascii_digit);

    let mut number = String::new();
    let mut i = 0;
    if let Some(sign) = chars.first().copied().filter(|c| matches!(c, '-' | '+')) {
        number.push(sign);
        i = 1;
    }
    let grouped = chars[i..]
        .iter()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | ','))
        .any(|c| *c == '.');

    let mut seen_digit = false;
    let mut seen_point = false;
    while let Some(&c) = chars.get(i) {
        match c {
            '0'..='9' => {
                number.push(c);
                seen_digit = true;
            }
            ',' if grouped && seen_digit && !seen_point && digit_at(i + 1) => {}
            ',' if !grouped && !seen_point && digit_at(i + 1) => {
                number.push('.');
                seen_point = true;
            }
            '.' if !seen_point => {
                number.push('.');
                seen_point = true;
            }
            _ => break,
        }
        i += 1;
    }
    if !seen_digit {
        return f64::NAN;
    }

    if matches!(chars.get(i), Some('e' | 'E')) {
        let mut exponent = String::from("e");
        let mut j = i + 1;
        if let Some(sign) = chars.get(j).copied().filter(|c| matches!(c, '-' | '+')) {
            exponent.push(sign);
            j += 1;
        }
        let mut digits = false;
        while let Some(&c) = chars.get(j).filter(|c| c.is_ascii_digit()) {
            exponent.push(c);
            digits = true;
            j += 1;
        }
        if digits {
            number.push_str(&exponent);
        }
    }
    number.parse::<f64>().unwrap_or(f64::NAN)
}

/// Read access to a 2-D, zero-based worksheet.
pub trait Grid {
    /// Cell at `(row, column)`; out of range reads as [`Cell::Empty`].
    fn cell(&self, row: usize, column: usize) -> &Cell;
    /// Number of rows (one past the last used row).
    fn max_row(&self) -> usize;
    /// Number of columns (one past the last used column).
    fn max_column(&self) -> usize;

    /// Cells of `column` from `start` to the last row.
    fn column_from(&self, column: usize, start: usize) -> Vec<Cell> {
        (start..self.max_row())
            .map(|row| self.cell(row, column).clone())
            .collect()
    }
}

static EMPTY: Cell = Cell::Empty;

/// Dense in-memory worksheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetGrid {
    name: String,
    rows: Vec<Vec<Cell>>,
    width: usize,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self {
            name: name.into(),
            rows,
            width,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a cell, growing the grid as needed.
    pub fn set(&mut self, row: usize, column: usize, cell: impl Into<Cell>) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let line = &mut self.rows[row];
        if line.len() <= column {
            line.resize(column + 1, Cell::Empty);
        }
        line[column] = cell.into();
        self.width = self.width.max(column + 1);
    }
}

impl Grid for SheetGrid {
    fn cell(&self, row: usize, column: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&EMPTY)
    }

    fn max_row(&self) -> usize {
        self.rows.len()
    }

    fn max_column(&self) -> usize {
        self.width
    }
}
