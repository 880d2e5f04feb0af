// Table Store Port
// The spreadsheet-like store that acts as source of truth

use crate::error::Result;
use async_trait::async_trait;

/// One row of cell values, left to right
pub type Row = Vec<String>;

/// Rectangular cell range (0-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: usize,
    pub first_column: usize,
    /// `None` extends the range to the last row of the sheet
    pub rows: Option<usize>,
    pub columns: usize,
}

impl CellRange {
    /// Every row from `first_row` down, over `columns` columns
    pub fn rows_from(first_row: usize, columns: usize) -> Self {
        Self {
            first_row,
            first_column: 0,
            rows: None,
            columns,
        }
    }
}

/// Table store interface
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Read all rows from `first_row` to the last non-empty row
    async fn read_rows(&self, sheet: &str, first_row: usize) -> Result<Vec<Row>>;

    /// Overwrite cells of `row` starting at `column`
    async fn write_row(&self, sheet: &str, row: usize, column: usize, values: Row) -> Result<()>;

    async fn clear_range(&self, sheet: &str, range: CellRange) -> Result<()>;

    /// Replace every cell of `range` equal to `find` with `replace`; returns the count
    async fn find_replace(
        &self,
        sheet: &str,
        range: CellRange,
        find: &str,
        replace: &str,
    ) -> Result<usize>;
}

pub mod mocks {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard};

    /// In-memory sheets keyed by name
    #[derive(Default)]
    pub struct InMemoryTableStore {
        sheets: Mutex<BTreeMap<String, Vec<Row>>>,
    }

    impl InMemoryTableStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Row>>> {
            self.sheets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Replace a whole sheet (header rows included)
        pub fn set_rows(&self, sheet: &str, rows: Vec<Row>) {
            self.lock().insert(sheet.to_string(), rows);
        }

        pub fn rows(&self, sheet: &str) -> Vec<Row> {
            self.lock().get(sheet).cloned().unwrap_or_default()
        }

        pub fn cell(&self, sheet: &str, row: usize, column: usize) -> String {
            self.lock()
                .get(sheet)
                .and_then(|rows| rows.get(row))
                .and_then(|cells| cells.get(column))
                .cloned()
                .unwrap_or_default()
        }
    }

    fn is_blank(row: &Row) -> bool {
        row.iter().all(|cell| cell.trim().is_empty())
    }

    #[async_trait]
    impl TableStore for InMemoryTableStore {
        async fn read_rows(&self, sheet: &str, first_row: usize) -> Result<Vec<Row>> {
            let sheets = self.lock();
            let mut rows: Vec<Row> = sheets
                .get(sheet)
                .map(|rows| rows.iter().skip(first_row).cloned().collect())
                .unwrap_or_default();
            while rows.last().is_some_and(is_blank) {
                rows.pop();
            }
            Ok(rows)
        }

        async fn write_row(
            &self,
            sheet: &str,
            row: usize,
            column: usize,
            values: Row,
        ) -> Result<()> {
            let mut sheets = self.lock();
            let rows = sheets.entry(sheet.to_string()).or_default();
            if rows.len() <= row {
                rows.resize(row + 1, Row::new());
            }
            let cells = &mut rows[row];
            if cells.len() < column + values.len() {
                cells.resize(column + values.len(), String::new());
            }
            for (offset, value) in values.into_iter().enumerate() {
                cells[column + offset] = value;
            }
            Ok(())
        }

        async fn clear_range(&self, sheet: &str, range: CellRange) -> Result<()> {
            let mut sheets = self.lock();
            let Some(rows) = sheets.get_mut(sheet) else {
                return Ok(());
            };
            let last_row = range
                .rows
                .map_or(rows.len(), |count| (range.first_row + count).min(rows.len()));
            for cells in rows.iter_mut().take(last_row).skip(range.first_row) {
                let end = (range.first_column + range.columns).min(cells.len());
                for cell in cells.iter_mut().take(end).skip(range.first_column) {
                    cell.clear();
                }
            }
            Ok(())
        }

        async fn find_replace(
            &self,
            sheet: &str,
            range: CellRange,
            find: &str,
            replace: &str,
        ) -> Result<usize> {
            let mut sheets = self.lock();
            let Some(rows) = sheets.get_mut(sheet) else {
                return Ok(0);
            };
            let last_row = range
                .rows
                .map_or(rows.len(), |count| (range.first_row + count).min(rows.len()));
            let mut replaced = 0;
            for cells in rows.iter_mut().take(last_row).skip(range.first_row) {
                let end = (range.first_column + range.columns).min(cells.len());
                for cell in cells.iter_mut().take(end).skip(range.first_column) {
                    if cell == find {
                        *cell = replace.to_string();
                        replaced += 1;
                    }
                }
            }
            Ok(replaced)
        }
    }

}
