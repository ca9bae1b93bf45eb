use crate::error::Result;
use crate::table::{Cell, Table, COL_WELL, COL_WELL_COL, COL_WELL_ROW};
use std::collections::HashMap;
use svg::node::element::{Rectangle, Text};
use svg::Document;

const CELL_SIZE: f32 = 42.0;
const CELL_GAP: f32 = 4.0;
const MARGIN_LEFT: f32 = 60.0;
const MARGIN_TOP: f32 = 60.0;
const MARGIN_RIGHT: f32 = 20.0;
const MARGIN_BOTTOM: f32 = 20.0;

/// Explicit rendering configuration. Passed to every render call; there is
/// no process-wide theme state.
#[derive(Clone, Debug)]
pub struct PlateTheme {
    pub background: String,
    pub missing_fill: String,
    pub label_fill: String,
    /// Gradient endpoints for numeric value columns, low to high.
    pub low_color: (u8, u8, u8),
    pub high_color: (u8, u8, u8),
    /// Fills cycled through for categorical value columns.
    pub palette: Vec<String>,
    pub font_size: u32,
}

impl Default for PlateTheme {
    fn default() -> Self {
        Self {
            background: "#f9fafb".to_string(),
            missing_fill: "#d1d5db".to_string(),
            label_fill: "#374151".to_string(),
            low_color: (49, 130, 189),
            high_color: (222, 45, 38),
            palette: vec![
                "#66c2a5".to_string(),
                "#fc8d62".to_string(),
                "#8da0cb".to_string(),
                "#e78ac3".to_string(),
                "#a6d854".to_string(),
                "#ffd92f".to_string(),
            ],
            font_size: 12,
        }
    }
}

fn lerp_channel(low: u8, high: u8, f: f32) -> u8 {
    (low as f32 + (high as f32 - low as f32) * f.clamp(0.0, 1.0)).round() as u8
}

fn gradient_fill(theme: &PlateTheme, f: f32) -> String {
    format!(
        "#{:02x}{:02x}{:02x}",
        lerp_channel(theme.low_color.0, theme.high_color.0, f),
        lerp_channel(theme.low_color.1, theme.high_color.1, f),
        lerp_channel(theme.low_color.2, theme.high_color.2, f)
    )
}

/// Renders a plate map of `value_col` over the wells of a layout or joined
/// table. Numeric columns get a low-to-high gradient, categorical columns a
/// cycling palette, missing values the theme's missing fill. The table must
/// carry one value per well; curve tables must be summarized first.
pub fn render_plate_svg(table: &Table, value_col: &str, theme: &PlateTheme) -> Result<Document> {
    table.require_column(value_col)?;
    table.assert_unique_per_well(value_col)?;
    let wells = table.labels(COL_WELL)?;
    let rows = table.labels(COL_WELL_ROW)?;
    let cols = table.labels(COL_WELL_COL)?;
    let values = table.require_column(value_col)?.cells();

    // Axis orders are first-appearance orders; a layout built by
    // label_plate arrives in canonical order already.
    let mut row_order: Vec<String> = vec![];
    let mut col_order: Vec<String> = vec![];
    let mut well_value: HashMap<String, &Cell> = HashMap::new();
    for i in 0..table.n_rows() {
        let (Some(well), Some(row), Some(col)) = (&wells[i], &rows[i], &cols[i]) else {
            continue;
        };
        if !row_order.contains(row) {
            row_order.push(row.clone());
        }
        if !col_order.contains(col) {
            col_order.push(col.clone());
        }
        well_value.entry(well.clone()).or_insert(&values[i]);
    }

    let numeric: Vec<f64> = well_value.values().filter_map(|c| c.as_f64()).collect();
    let is_numeric = !numeric.is_empty()
        && well_value.values().all(|c| c.is_missing() || c.as_f64().is_some());
    let (low, high) = numeric
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let mut category_order: Vec<String> = vec![];

    let width = MARGIN_LEFT + col_order.len() as f32 * (CELL_SIZE + CELL_GAP) + MARGIN_RIGHT;
    let height = MARGIN_TOP + row_order.len() as f32 * (CELL_SIZE + CELL_GAP) + MARGIN_BOTTOM;
    let mut doc = Document::new()
        .set("viewBox", (0, 0, width, height))
        .set("width", width)
        .set("height", height)
        .add(
            Rectangle::new()
                .set("x", 0)
                .set("y", 0)
                .set("width", width)
                .set("height", height)
                .set("fill", theme.background.clone()),
        );

    for (ci, col) in col_order.iter().enumerate() {
        let x = MARGIN_LEFT + ci as f32 * (CELL_SIZE + CELL_GAP) + CELL_SIZE / 2.0;
        doc = doc.add(
            Text::new(col.clone())
                .set("x", x)
                .set("y", MARGIN_TOP - 10.0)
                .set("text-anchor", "middle")
                .set("font-family", "monospace")
                .set("font-size", theme.font_size)
                .set("fill", theme.label_fill.clone()),
        );
    }
    for (ri, row) in row_order.iter().enumerate() {
        let y = MARGIN_TOP + ri as f32 * (CELL_SIZE + CELL_GAP) + CELL_SIZE / 2.0 + 4.0;
        doc = doc.add(
            Text::new(row.clone())
                .set("x", MARGIN_LEFT - 12.0)
                .set("y", y)
                .set("text-anchor", "end")
                .set("font-family", "monospace")
                .set("font-size", theme.font_size)
                .set("fill", theme.label_fill.clone()),
        );
    }

    for (ri, row) in row_order.iter().enumerate() {
        for (ci, col) in col_order.iter().enumerate() {
            let key = crate::grid::well_key(row, col);
            let fill = match well_value.get(&key) {
                None | Some(Cell::Missing) => theme.missing_fill.clone(),
                Some(cell) => {
                    if is_numeric {
                        let v = cell.as_f64().unwrap_or(low);
                        let f = if high > low {
                            ((v - low) / (high - low)) as f32
                        } else {
                            0.5
                        };
                        gradient_fill(theme, f)
                    } else {
                        let label = cell.to_string();
                        let idx = match category_order.iter().position(|c| c == &label) {
                            Some(idx) => idx,
                            None => {
                                category_order.push(label);
                                category_order.len() - 1
                            }
                        };
                        theme.palette[idx % theme.palette.len()].clone()
                    }
                }
            };
            let x = MARGIN_LEFT + ci as f32 * (CELL_SIZE + CELL_GAP);
            let y = MARGIN_TOP + ri as f32 * (CELL_SIZE + CELL_GAP);
            doc = doc.add(
                Rectangle::new()
                    .set("x", x)
                    .set("y", y)
                    .set("width", CELL_SIZE)
                    .set("height", CELL_SIZE)
                    .set("rx", 6)
                    .set("ry", 6)
                    .set("fill", fill),
            );
        }
    }

    Ok(doc)
}
