use crate::error::{PlateCqError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// Conventional column names shared across the whole pipeline.
pub const COL_WELL: &str = "well";
pub const COL_WELL_ROW: &str = "well_row";
pub const COL_WELL_COL: &str = "well_col";
pub const COL_SAMPLE_ID: &str = "sample_id";
pub const COL_TARGET_ID: &str = "target_id";
pub const COL_PREP_TYPE: &str = "prep_type";
pub const COL_CQ: &str = "cq";
pub const COL_DELTA_CQ: &str = "delta_cq";
pub const COL_REL_ABUND: &str = "rel_abund";
pub const COL_DELTADELTA_CQ: &str = "deltadelta_cq";
pub const COL_FOLD_CHANGE: &str = "fold_change";
pub const COL_DILUTION: &str = "dilution";
pub const COL_BIOL_REP: &str = "biol_rep";
pub const COL_TECH_REP: &str = "tech_rep";
pub const COL_CYCLE: &str = "cycle";
pub const COL_TEMPERATURE: &str = "temperature";
pub const COL_FLUOR_RAW: &str = "fluor_raw";
pub const COL_PROGRAM_NO: &str = "program_no";
pub const COL_DRDT: &str = "dRdT";

/// One value in a table. Missingness is data, never a sentinel number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Non-finite values collapse to `Missing` so they can never be
    /// mistaken for a real measurement.
    pub fn num(value: f64) -> Self {
        if value.is_finite() {
            Cell::Number(value)
        } else {
            Cell::Missing
        }
    }

    pub fn text<S: Into<String>>(value: S) -> Self {
        Cell::Text(value.into())
    }

    pub fn from_opt(value: Option<f64>) -> Self {
        match value {
            Some(v) => Cell::num(v),
            None => Cell::Missing,
        }
    }

    #[inline(always)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// String form used as a grouping / join key. `Missing` has no key.
    pub fn label(&self) -> Option<String> {
        match self {
            Cell::Text(s) => Some(s.clone()),
            Cell::Number(v) => Some(format!("{v}")),
            Cell::Missing => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Text(s) => write!(f, "{s}"),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Missing => write!(f, "NA"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    name: String,
    cells: Vec<Cell>,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
}

/// Column-oriented in-memory table. All transformation stages produce a new
/// `Table`; upstream tables are never mutated in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<(String, Vec<Cell>)>) -> Result<Self> {
        let mut table = Self::new();
        for (name, cells) in columns {
            table.add_column(&name, cells)?;
        }
        Ok(table)
    }

    #[inline(always)]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    #[inline(always)]
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Typed accessor for a runtime-supplied column name.
    pub fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| PlateCqError::MissingColumn(name.to_string()))
    }

    /// Numeric view of a column; text cells and `Missing` become `None`.
    pub fn numeric(&self, name: &str) -> Result<Vec<Option<f64>>> {
        Ok(self
            .require_column(name)?
            .cells
            .iter()
            .map(Cell::as_f64)
            .collect())
    }

    /// String-key view of a column; `Missing` becomes `None`.
    pub fn labels(&self, name: &str) -> Result<Vec<Option<String>>> {
        Ok(self
            .require_column(name)?
            .cells
            .iter()
            .map(Cell::label)
            .collect())
    }

    pub fn cell(&self, row: usize, name: &str) -> Option<&Cell> {
        self.column(name).and_then(|c| c.cells.get(row))
    }

    /// Appends a new column. Fails on a duplicate name; use `set_column`
    /// when overwrite semantics are wanted.
    pub fn add_column(&mut self, name: &str, cells: Vec<Cell>) -> Result<()> {
        if self.has_column(name) {
            return Err(PlateCqError::String(format!(
                "column '{name}' already exists"
            )));
        }
        if self.columns.is_empty() {
            self.n_rows = cells.len();
        } else if cells.len() != self.n_rows {
            return Err(PlateCqError::ShapeMismatch(format!(
                "column '{name}' has {} cells, table has {} rows",
                cells.len(),
                self.n_rows
            )));
        }
        self.columns.push(Column {
            name: name.to_string(),
            cells,
        });
        Ok(())
    }

    /// Adds or replaces a column; returns true when an existing column of
    /// the same name was overwritten (last write wins).
    pub fn set_column(&mut self, name: &str, cells: Vec<Cell>) -> Result<bool> {
        if !self.columns.is_empty() && cells.len() != self.n_rows {
            return Err(PlateCqError::ShapeMismatch(format!(
                "column '{name}' has {} cells, table has {} rows",
                cells.len(),
                self.n_rows
            )));
        }
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == name) {
            existing.cells = cells;
            return Ok(true);
        }
        if self.columns.is_empty() {
            self.n_rows = cells.len();
        }
        self.columns.push(Column {
            name: name.to_string(),
            cells,
        });
        Ok(false)
    }

    /// New table containing, for each entry of `indices`, the corresponding
    /// source row, or an all-`Missing` row for `None`. Column set unchanged.
    pub fn take(&self, indices: &[Option<usize>]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                cells: indices
                    .iter()
                    .map(|idx| match idx {
                        Some(i) => c.cells[*i].clone(),
                        None => Cell::Missing,
                    })
                    .collect(),
            })
            .collect();
        Table {
            columns,
            n_rows: indices.len(),
        }
    }

    /// Row indices partitioned by the value of `name`, partitions in
    /// first-appearance order. Rows with a `Missing` key form their own
    /// partition under `None`.
    pub fn partition_by(&self, name: &str) -> Result<Vec<(Option<String>, Vec<usize>)>> {
        let keys = self.labels(name)?;
        let mut order: Vec<Option<String>> = vec![];
        let mut groups: HashMap<Option<String>, Vec<usize>> = HashMap::new();
        for (i, key) in keys.into_iter().enumerate() {
            let entry = groups.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                vec![]
            });
            entry.push(i);
        }
        Ok(order
            .into_iter()
            .map(|key| {
                let idx = groups.remove(&key).unwrap_or_default();
                (key, idx)
            })
            .collect())
    }

    /// Checks that `value_col`, where present, carries exactly one value per
    /// well. The visualization layer relies on this invariant.
    pub fn assert_unique_per_well(&self, value_col: &str) -> Result<()> {
        let wells = self.labels(COL_WELL)?;
        let values = self.require_column(value_col)?.cells();
        let mut seen: HashMap<String, &Cell> = HashMap::new();
        for (well, value) in wells.iter().zip(values.iter()) {
            let Some(well) = well else { continue };
            match seen.get(well.as_str()) {
                Some(first) if *first != value => {
                    return Err(PlateCqError::ShapeMismatch(format!(
                        "well '{well}' carries more than one value in column '{value_col}'"
                    )));
                }
                Some(_) => {}
                None => {
                    seen.insert(well.clone(), value);
                }
            }
        }
        Ok(())
    }

    /// One JSON object per row, columns in table order.
    pub fn to_json_records(&self) -> serde_json::Value {
        let records: Vec<serde_json::Value> = (0..self.n_rows)
            .map(|i| {
                let mut obj = serde_json::Map::new();
                for c in &self.columns {
                    let v = match &c.cells[i] {
                        Cell::Number(n) => serde_json::json!(n),
                        Cell::Text(s) => serde_json::json!(s),
                        Cell::Missing => serde_json::Value::Null,
                    };
                    obj.insert(c.name.clone(), v);
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(records)
    }
}
