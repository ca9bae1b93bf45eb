use crate::error::{Advisory, PlateCqError, Result};
use crate::table::{Table, COL_WELL};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// How measurement rows are anchored to the layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep only wells present on both sides.
    Inner,
    /// Keep every measurement row; layout attributes of unmatched wells
    /// become missing.
    LeftOnMeasurements,
    /// Keep every layout well; measurement values of unmatched wells
    /// become missing.
    LeftOnLayout,
}

#[derive(Clone, Debug)]
pub struct JoinResult {
    pub table: Table,
    pub advisories: Vec<Advisory>,
}

lazy_static! {
    static ref WELL_KEY_RE: Regex = Regex::new(r"^([A-Za-z]+)([0-9]+)$").unwrap();
}

/// Letters plus numeric column value, used only to diagnose zero-padding
/// mismatches ("A1" vs "A01"). Keys join on the exact string; this is never
/// used as the join key itself.
fn normalized_key(key: &str) -> Option<(String, u64)> {
    let caps = WELL_KEY_RE.captures(key)?;
    let letters = caps.get(1)?.as_str().to_string();
    let number: u64 = caps.get(2)?.as_str().parse().ok()?;
    Some((letters, number))
}

fn key_set(wells: &[Option<String>]) -> HashSet<&str> {
    wells.iter().flatten().map(String::as_str).collect()
}

/// Joins an externally parsed measurement table (Cq summaries or curve
/// traces) onto a plate layout by well key. Exact, case-sensitive match; a
/// join that cannot overlap at all is a structural error, not an all-NA
/// result.
pub fn attach_measurements(
    layout: &Table,
    measurements: &Table,
    kind: JoinKind,
) -> Result<JoinResult> {
    if !layout.has_column(COL_WELL) {
        return Err(PlateCqError::JoinKey(
            "layout table has no 'well' column".to_string(),
        ));
    }
    if !measurements.has_column(COL_WELL) {
        return Err(PlateCqError::JoinKey(
            "measurement table has no 'well' column".to_string(),
        ));
    }
    let layout_wells = layout.labels(COL_WELL)?;
    let meas_wells = measurements.labels(COL_WELL)?;

    let layout_keys = key_set(&layout_wells);
    let meas_keys = key_set(&meas_wells);
    if layout_keys.is_disjoint(&meas_keys) {
        // Distinguish a key-format mismatch (same wells, different
        // spelling) from genuinely unrelated tables.
        let layout_norm: HashMap<(String, u64), &str> = layout_keys
            .iter()
            .filter_map(|k| normalized_key(k).map(|n| (n, *k)))
            .collect();
        for meas_key in &meas_keys {
            if let Some(norm) = normalized_key(meas_key) {
                if let Some(layout_key) = layout_norm.get(&norm) {
                    return Err(PlateCqError::JoinKey(format!(
                        "well key format mismatch: layout has '{layout_key}', measurements have '{meas_key}' (keys are matched exactly; zero-padding differs)"
                    )));
                }
            }
        }
        return Err(PlateCqError::JoinKey(
            "layout and measurement tables share no well keys; the join would be empty or all-NA"
                .to_string(),
        ));
    }

    let mut meas_index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, well) in meas_wells.iter().enumerate() {
        if let Some(well) = well {
            meas_index.entry(well.as_str()).or_default().push(j);
        }
    }
    let mut layout_index: HashMap<&str, usize> = HashMap::new();
    for (i, well) in layout_wells.iter().enumerate() {
        if let Some(well) = well {
            layout_index.entry(well.as_str()).or_insert(i);
        }
    }

    let mut lay_idx: Vec<Option<usize>> = vec![];
    let mut meas_idx: Vec<Option<usize>> = vec![];
    match kind {
        JoinKind::Inner => {
            for (i, well) in layout_wells.iter().enumerate() {
                let Some(well) = well else { continue };
                if let Some(matches) = meas_index.get(well.as_str()) {
                    for &j in matches {
                        lay_idx.push(Some(i));
                        meas_idx.push(Some(j));
                    }
                }
            }
        }
        JoinKind::LeftOnLayout => {
            for (i, well) in layout_wells.iter().enumerate() {
                match well.as_ref().and_then(|w| meas_index.get(w.as_str())) {
                    Some(matches) => {
                        for &j in matches {
                            lay_idx.push(Some(i));
                            meas_idx.push(Some(j));
                        }
                    }
                    None => {
                        lay_idx.push(Some(i));
                        meas_idx.push(None);
                    }
                }
            }
        }
        JoinKind::LeftOnMeasurements => {
            for (j, well) in meas_wells.iter().enumerate() {
                lay_idx.push(
                    well.as_ref()
                        .and_then(|w| layout_index.get(w.as_str()))
                        .copied(),
                );
                meas_idx.push(Some(j));
            }
        }
    }

    let mut out = layout.take(&lay_idx);
    let meas_taken = measurements.take(&meas_idx);
    let mut advisories = vec![];

    // Anchoring on measurements keeps the measurement table's own well keys
    // for unmatched rows.
    if kind == JoinKind::LeftOnMeasurements {
        let wells = meas_taken.require_column(COL_WELL)?.cells().to_vec();
        out.set_column(COL_WELL, wells)?;
    }

    let names: Vec<String> = meas_taken
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    for name in names {
        if name == COL_WELL {
            continue;
        }
        let cells = meas_taken.require_column(&name)?.cells().to_vec();
        if out.set_column(&name, cells)? {
            advisories.push(Advisory::ColumnCollision(name));
        }
    }

    Ok(JoinResult {
        table: out,
        advisories,
    })
}
