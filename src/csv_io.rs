use crate::table::{
    Cell, Table, COL_CQ, COL_CYCLE, COL_FLUOR_RAW, COL_PROGRAM_NO, COL_TEMPERATURE, COL_WELL,
};
use anyhow::{anyhow, Result};
use std::path::Path;

/// Instrument program tag for amplification runs.
pub const PROGRAM_AMPLIFICATION: f64 = 2.0;
/// Instrument program tags for melt runs.
pub const PROGRAM_MELT: [f64; 2] = [3.0, 4.0];

/// What a measurement table contains, judged from its columns and its
/// `program_no` tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeasurementKind {
    /// One summary row per well with a `cq` column.
    Cq,
    /// One row per well per cycle (program 2).
    Amplification,
    /// One row per well per temperature point (program 3/4).
    Melt,
}

/// Reads a CSV export into a table. Empty fields and "NA" become missing;
/// any field that parses as a number becomes numeric, everything else is
/// text.
pub fn read_table_csv<P: AsRef<Path>>(path: P) -> Result<Table> {
    let mut reader = csv::Reader::from_path(path.as_ref())
        .map_err(|e| anyhow!("Could not open '{}': {e}", path.as_ref().display()))?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut columns: Vec<Vec<Cell>> = vec![vec![]; headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            let field = field.trim();
            let cell = if field.is_empty() || field == "NA" {
                Cell::Missing
            } else if let Ok(value) = field.parse::<f64>() {
                Cell::num(value)
            } else {
                Cell::text(field)
            };
            columns[i].push(cell);
        }
    }
    let mut table = Table::new();
    for (name, cells) in headers.into_iter().zip(columns) {
        table
            .add_column(&name, cells)
            .map_err(|e| anyhow!("{e}"))?;
    }
    Ok(table)
}

/// Writes a table as CSV. Missing cells are written as "NA".
pub fn write_table_csv<P: AsRef<Path>>(table: &Table, path: P) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())
        .map_err(|e| anyhow!("Could not create '{}': {e}", path.as_ref().display()))?;
    writer.write_record(table.column_names())?;
    let names: Vec<String> = table
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    for i in 0..table.n_rows() {
        let record: Vec<String> = names
            .iter()
            .map(|name| match table.cell(i, name) {
                Some(cell) => cell.to_string(),
                None => "NA".to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Judges what kind of measurement data a table holds. Mixed program tags
/// must be split with `filter_program` first.
pub fn classify_measurements(table: &Table) -> Result<MeasurementKind> {
    if !table.has_column(COL_WELL) {
        return Err(anyhow!("measurement table has no '{COL_WELL}' column"));
    }
    if table.has_column(COL_CQ) {
        return Ok(MeasurementKind::Cq);
    }
    if table.has_column(COL_PROGRAM_NO) {
        let programs: std::collections::HashSet<u64> = table
            .numeric(COL_PROGRAM_NO)
            .map_err(|e| anyhow!("{e}"))?
            .into_iter()
            .flatten()
            .map(f64::to_bits)
            .collect();
        if programs.len() > 1 {
            return Err(anyhow!(
                "measurement table mixes several program_no values; split with filter_program first"
            ));
        }
        if let Some(bits) = programs.into_iter().next() {
            let program = f64::from_bits(bits);
            if program == PROGRAM_AMPLIFICATION {
                return Ok(MeasurementKind::Amplification);
            }
            if PROGRAM_MELT.contains(&program) {
                return Ok(MeasurementKind::Melt);
            }
            return Err(anyhow!("unknown program_no {program}"));
        }
    }
    if table.has_column(COL_CYCLE) && table.has_column(COL_FLUOR_RAW) {
        return Ok(MeasurementKind::Amplification);
    }
    if table.has_column(COL_TEMPERATURE) && table.has_column(COL_FLUOR_RAW) {
        return Ok(MeasurementKind::Melt);
    }
    Err(anyhow!(
        "measurement table has neither a '{COL_CQ}' column nor curve columns"
    ))
}

/// Rows of one instrument program (2 = amplification, 3/4 = melt).
pub fn filter_program(table: &Table, program_no: f64) -> Result<Table> {
    let programs = table.numeric(COL_PROGRAM_NO).map_err(|e| anyhow!("{e}"))?;
    let indices: Vec<Option<usize>> = programs
        .iter()
        .enumerate()
        .filter(|(_, p)| **p == Some(program_no))
        .map(|(i, _)| Some(i))
        .collect();
    Ok(table.take(&indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cq_table() -> Table {
        Table::from_columns(vec![
            (
                COL_WELL.to_string(),
                vec![Cell::text("A1"), Cell::text("A2")],
            ),
            (COL_CQ.to_string(), vec![Cell::num(20.5), Cell::Missing]),
        ])
        .unwrap()
    }

    #[test]
    fn test_csv_round_trip_preserves_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cq.csv");
        write_table_csv(&cq_table(), &path).unwrap();
        let back = read_table_csv(&path).unwrap();
        assert_eq!(back.n_rows(), 2);
        assert_eq!(back.numeric(COL_CQ).unwrap(), vec![Some(20.5), None]);
        assert_eq!(back.cell(0, COL_WELL), Some(&Cell::text("A1")));
    }

    #[test]
    fn test_classify_cq_and_curves() {
        assert_eq!(
            classify_measurements(&cq_table()).unwrap(),
            MeasurementKind::Cq
        );
        let melt = Table::from_columns(vec![
            (COL_WELL.to_string(), vec![Cell::text("A1")]),
            (COL_PROGRAM_NO.to_string(), vec![Cell::num(3.0)]),
            (COL_TEMPERATURE.to_string(), vec![Cell::num(60.0)]),
            (COL_FLUOR_RAW.to_string(), vec![Cell::num(1.0)]),
        ])
        .unwrap();
        assert_eq!(
            classify_measurements(&melt).unwrap(),
            MeasurementKind::Melt
        );
    }

    #[test]
    fn test_mixed_programs_rejected() {
        let mixed = Table::from_columns(vec![
            (
                COL_WELL.to_string(),
                vec![Cell::text("A1"), Cell::text("A1")],
            ),
            (
                COL_PROGRAM_NO.to_string(),
                vec![Cell::num(2.0), Cell::num(3.0)],
            ),
            (
                COL_FLUOR_RAW.to_string(),
                vec![Cell::num(1.0), Cell::num(2.0)],
            ),
        ])
        .unwrap();
        assert!(classify_measurements(&mixed).is_err());
        let melt_only = filter_program(&mixed, 3.0).unwrap();
        assert_eq!(melt_only.n_rows(), 1);
        assert_eq!(
            classify_measurements(&melt_only).unwrap(),
            MeasurementKind::Melt
        );
    }
}
