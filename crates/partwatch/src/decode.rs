//! Workbook decoding.
//!
//! The pipeline only needs "sheet name → grid of cells" in workbook order.
//! [`CalamineDecoder`] provides that for every format calamine detects.

use crate::error::DecodeError;
use crate::types::{Cell, SheetGrid};
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;

/// Sheets in workbook order.
pub type Workbook = Vec<(String, SheetGrid)>;

pub trait WorkbookDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Workbook, DecodeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CalamineDecoder;

impl WorkbookDecoder for CalamineDecoder {
    fn decode(&self, path: &Path) -> Result<Workbook, DecodeError> {
        let mut workbook =
            open_workbook_auto(path).map_err(|e| DecodeError::new(path, e.to_string()))?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| DecodeError::new(path, format!("sheet '{}': {}", name, e)))?;
            sheets.push((name, range_to_grid(&range)));
        }
        Ok(sheets)
    }
}

/// Convert a used range into a grid anchored at A1.
///
/// calamine trims leading empty rows/columns from the used range; they are
/// restored so that row 0 is always the sheet's first physical row.
fn range_to_grid(range: &Range<Data>) -> SheetGrid {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };

    let mut grid: SheetGrid = (0..start_row).map(|_| Vec::new()).collect();
    for row in range.rows() {
        let mut cells: Vec<Cell> = (0..start_col).map(|_| Cell::Empty).collect();
        cells.extend(row.iter().map(data_to_cell));
        grid.push(cells);
    }
    grid
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        other => Cell::Text(other.to_string()),
    }
}
