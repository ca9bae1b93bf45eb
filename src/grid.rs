use crate::axis::Axis;
use crate::error::Result;
use crate::table::{Cell, Table, COL_WELL, COL_WELL_COL, COL_WELL_ROW};
use itertools::Itertools;

/// Full cross-product of a row axis and a column axis. Canonical well order
/// is row-major: top-to-bottom, then left-to-right within a row.
#[derive(Clone, Debug, PartialEq)]
pub struct WellGrid {
    rows: Axis,
    cols: Axis,
}

/// Derived unique key for one well: row label immediately followed by the
/// column label, case-sensitive, no padding applied. "A1" and "A01" are
/// distinct keys.
pub fn well_key(row: &str, col: &str) -> String {
    format!("{row}{col}")
}

pub fn build_grid<R: AsRef<str>, C: AsRef<str>>(
    row_labels: &[R],
    col_labels: &[C],
) -> Result<WellGrid> {
    Ok(WellGrid {
        rows: Axis::new("row", row_labels)?,
        cols: Axis::new("col", col_labels)?,
    })
}

impl WellGrid {
    #[inline(always)]
    pub fn rows(&self) -> &Axis {
        &self.rows
    }

    #[inline(always)]
    pub fn cols(&self) -> &Axis {
        &self.cols
    }

    #[inline(always)]
    pub fn n_wells(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    /// All (row, col) label pairs in canonical order.
    pub fn well_pairs(&self) -> impl Iterator<Item = (&String, &String)> {
        self.rows
            .labels()
            .iter()
            .cartesian_product(self.cols.labels().iter())
    }

    /// The grid as a table with `well`, `well_row`, `well_col` columns in
    /// canonical order. This is the seed every layout is built from.
    pub fn to_table(&self) -> Table {
        let mut wells = Vec::with_capacity(self.n_wells());
        let mut rows = Vec::with_capacity(self.n_wells());
        let mut cols = Vec::with_capacity(self.n_wells());
        for (row, col) in self.well_pairs() {
            wells.push(Cell::text(well_key(row, col)));
            rows.push(Cell::text(row.clone()));
            cols.push(Cell::text(col.clone()));
        }
        let mut table = Table::new();
        // Infallible: fresh table, equal-length columns.
        let _ = table.add_column(COL_WELL, wells);
        let _ = table.add_column(COL_WELL_ROW, rows);
        let _ = table.add_column(COL_WELL_COL, cols);
        table
    }
}
