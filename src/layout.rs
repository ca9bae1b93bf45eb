use crate::error::{Advisory, Result};
use crate::grid::WellGrid;
use crate::key_table::KeyTable;
use crate::table::{Cell, Table, COL_PREP_TYPE, COL_SAMPLE_ID, COL_TARGET_ID};
use std::collections::HashMap;

/// A fully labeled plate: one row per well, in the grid's canonical order,
/// together with any non-fatal diagnostics raised while building it.
#[derive(Clone, Debug)]
pub struct LayoutResult {
    pub table: Table,
    pub advisories: Vec<Advisory>,
}

/// Columns downstream normalization needs. Their absence is advisory, not
/// fatal, because a caller may add them in a later step.
pub const SEMANTIC_COLUMNS: [&str; 3] = [COL_SAMPLE_ID, COL_TARGET_ID, COL_PREP_TYPE];

/// Merges a grid with an optional row key and an optional column key into
/// one per-well table. Each well inherits its row's row-key attributes and
/// its column's col-key attributes; key labels are re-typed against the
/// grid's axis order before joining, and the result keeps the grid's
/// canonical (row, col) order.
pub fn label_plate(
    grid: &WellGrid,
    row_key: Option<&KeyTable>,
    col_key: Option<&KeyTable>,
) -> Result<LayoutResult> {
    let mut table = grid.to_table();
    let mut advisories = vec![];
    let n_cols = grid.cols().len();

    // Per grid row i (row-major), the axis position on each side.
    let row_pos = |i: usize| i / n_cols;
    let col_pos = |i: usize| i % n_cols;

    let sides: [(Option<&KeyTable>, &crate::axis::Axis, &dyn Fn(usize) -> usize); 2] = [
        (row_key, grid.rows(), &row_pos),
        (col_key, grid.cols(), &col_pos),
    ];

    for (key, axis, position_of) in sides {
        let Some(key) = key else { continue };
        let (positions, advisory) = axis.retype(key.labels())?;
        if let Some(advisory) = advisory {
            advisories.push(advisory);
        }
        // Axis position -> key entry. Keys may cover only part of the axis;
        // uncovered wells stay Missing.
        let lookup: HashMap<usize, usize> =
            positions.iter().enumerate().map(|(j, &p)| (p, j)).collect();
        for (name, values) in key.attributes() {
            let broadcast: Vec<Cell> = (0..grid.n_wells())
                .map(|i| match lookup.get(&position_of(i)) {
                    Some(&j) => values[j].clone(),
                    None => Cell::Missing,
                })
                .collect();
            if table.set_column(name, broadcast)? {
                advisories.push(Advisory::ColumnCollision(name.clone()));
            }
        }
    }

    for name in SEMANTIC_COLUMNS {
        if !table.has_column(name) {
            advisories.push(Advisory::MissingSemanticColumn(name.to_string()));
        }
    }

    Ok(LayoutResult { table, advisories })
}
