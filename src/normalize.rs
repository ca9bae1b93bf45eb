use crate::error::Result;
use crate::table::{
    Cell, Table, COL_CQ, COL_DELTADELTA_CQ, COL_DELTA_CQ, COL_FOLD_CHANGE, COL_REL_ABUND,
    COL_SAMPLE_ID, COL_TARGET_ID,
};
use std::collections::HashSet;

/// Aggregation applied to the reference rows of a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Median,
    Mean,
}

impl Aggregate {
    /// `None` on an empty slice; an undefined reference aggregate is
    /// missingness, never zero.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregate::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregate::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 1 {
                    Some(sorted[mid])
                } else {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                }
            }
        }
    }
}

/// Shared partition-aggregate-subtract pass: within each `group_col`
/// partition, the aggregate of `value_col` over rows whose `ref_col` label
/// is in the reference set is subtracted from every row's value.
fn reference_normalize<S: AsRef<str>>(
    table: &Table,
    value_col: &str,
    ref_col: &str,
    reference_ids: &[S],
    group_col: &str,
    agg: Aggregate,
) -> Result<Vec<Option<f64>>> {
    let values = table.numeric(value_col)?;
    let ref_labels = table.labels(ref_col)?;
    let partitions = table.partition_by(group_col)?;
    let reference: HashSet<&str> = reference_ids.iter().map(AsRef::as_ref).collect();

    let mut delta: Vec<Option<f64>> = vec![None; table.n_rows()];
    for (_, rows) in partitions {
        let ref_values: Vec<f64> = rows
            .iter()
            .filter(|&&i| {
                ref_labels[i]
                    .as_deref()
                    .is_some_and(|label| reference.contains(label))
            })
            .filter_map(|&i| values[i])
            .collect();
        // No reference rows in this partition: the whole partition stays
        // missing rather than erroring, a partial experiment is legitimate.
        let ref_value = agg.apply(&ref_values);
        for &i in &rows {
            delta[i] = match (values[i], ref_value) {
                (Some(v), Some(r)) => Some(v - r),
                _ => None,
            };
        }
    }
    Ok(delta)
}

fn power_of_two_negated(delta: &[Option<f64>]) -> Vec<Cell> {
    delta
        .iter()
        .map(|d| Cell::from_opt(d.map(|d| (-d).exp2())))
        .collect()
}

/// Within-sample normalization against reference targets (housekeeping
/// genes). Adds `delta_cq` and `rel_abund = 2^(-delta_cq)`; every row of
/// the input is kept, in order.
pub fn delta_cq<S: AsRef<str>>(
    table: &Table,
    reference_targets: &[S],
    group_col: &str,
    agg: Aggregate,
) -> Result<Table> {
    let delta = reference_normalize(table, COL_CQ, COL_TARGET_ID, reference_targets, group_col, agg)?;
    let mut out = table.clone();
    out.set_column(COL_DELTA_CQ, delta.iter().map(|d| Cell::from_opt(*d)).collect())?;
    out.set_column(COL_REL_ABUND, power_of_two_negated(&delta))?;
    Ok(out)
}

/// Within-target normalization of `delta_cq` against reference samples.
/// Adds `deltadelta_cq` and `fold_change = 2^(-deltadelta_cq)`. Composable
/// with `delta_cq`: it can be re-run with different reference samples
/// without recomputing the first pass.
pub fn deltadelta_cq<S: AsRef<str>>(
    table: &Table,
    reference_samples: &[S],
    group_col: &str,
    agg: Aggregate,
) -> Result<Table> {
    let delta = reference_normalize(
        table,
        COL_DELTA_CQ,
        COL_SAMPLE_ID,
        reference_samples,
        group_col,
        agg,
    )?;
    let mut out = table.clone();
    out.set_column(
        COL_DELTADELTA_CQ,
        delta.iter().map(|d| Cell::from_opt(*d)).collect(),
    )?;
    out.set_column(COL_FOLD_CHANGE, power_of_two_negated(&delta))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells_text(values: &[&str]) -> Vec<Cell> {
        values.iter().map(|v| Cell::text(*v)).collect()
    }

    fn cells_num(values: &[f64]) -> Vec<Cell> {
        values.iter().map(|v| Cell::num(*v)).collect()
    }

    fn two_by_two() -> Table {
        // 2 samples x 2 targets, T1 is the reference target.
        Table::from_columns(vec![
            (
                COL_SAMPLE_ID.to_string(),
                cells_text(&["s1", "s1", "s2", "s2"]),
            ),
            (
                COL_TARGET_ID.to_string(),
                cells_text(&["T1", "T2", "T1", "T2"]),
            ),
            (COL_CQ.to_string(), cells_num(&[20.0, 25.0, 22.0, 24.0])),
        ])
        .unwrap()
    }

    #[test]
    fn test_median_and_mean() {
        assert_eq!(Aggregate::Median.apply(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(Aggregate::Median.apply(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(Aggregate::Mean.apply(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(Aggregate::Median.apply(&[]), None);
    }

    #[test]
    fn test_concrete_two_sample_scenario() {
        let out = delta_cq(&two_by_two(), &["T1"], COL_SAMPLE_ID, Aggregate::Median).unwrap();
        assert_eq!(
            out.numeric(COL_DELTA_CQ).unwrap(),
            vec![Some(0.0), Some(5.0), Some(0.0), Some(2.0)]
        );
        let rel = out.numeric(COL_REL_ABUND).unwrap();
        assert_eq!(rel[0], Some(1.0));
        assert_eq!(rel[1], Some(0.03125));
    }

    #[test]
    fn test_sole_reference_row_zero_identity() {
        let out = delta_cq(&two_by_two(), &["T1"], COL_SAMPLE_ID, Aggregate::Median).unwrap();
        // T1 rows normalize against themselves.
        assert_eq!(out.numeric(COL_DELTA_CQ).unwrap()[0], Some(0.0));
        assert_eq!(out.numeric(COL_REL_ABUND).unwrap()[0], Some(1.0));
    }

    #[test]
    fn test_missing_reference_partition_propagates_na() {
        let table = Table::from_columns(vec![
            (
                COL_SAMPLE_ID.to_string(),
                cells_text(&["s1", "s1", "s2"]),
            ),
            (
                COL_TARGET_ID.to_string(),
                cells_text(&["T1", "T2", "T2"]),
            ),
            (COL_CQ.to_string(), cells_num(&[20.0, 25.0, 24.0])),
        ])
        .unwrap();
        let out = delta_cq(&table, &["T1"], COL_SAMPLE_ID, Aggregate::Median).unwrap();
        let delta = out.numeric(COL_DELTA_CQ).unwrap();
        // s2 has no reference row: NA for the whole partition, not zero.
        assert_eq!(delta[2], None);
        assert_eq!(delta[0], Some(0.0));
        assert_eq!(out.n_rows(), 3);
    }

    #[test]
    fn test_missing_cq_propagates() {
        let table = Table::from_columns(vec![
            (COL_SAMPLE_ID.to_string(), cells_text(&["s1", "s1"])),
            (COL_TARGET_ID.to_string(), cells_text(&["T1", "T2"])),
            (
                COL_CQ.to_string(),
                vec![Cell::num(20.0), Cell::Missing],
            ),
        ])
        .unwrap();
        let out = delta_cq(&table, &["T1"], COL_SAMPLE_ID, Aggregate::Median).unwrap();
        let delta = out.numeric(COL_DELTA_CQ).unwrap();
        assert_eq!(delta, vec![Some(0.0), None]);
        assert_eq!(out.numeric(COL_REL_ABUND).unwrap()[1], None);
    }

    #[test]
    fn test_deltadelta_reference_mean_is_zero() {
        // One target, reference sample with two replicates whose delta_cq
        // differ; with mean aggregation the reference replicates' deltadelta
        // values average to zero without each being zero.
        let table = Table::from_columns(vec![
            (
                COL_SAMPLE_ID.to_string(),
                cells_text(&["ref", "ref", "trt"]),
            ),
            (
                COL_TARGET_ID.to_string(),
                cells_text(&["T2", "T2", "T2"]),
            ),
            (COL_DELTA_CQ.to_string(), cells_num(&[1.0, 3.0, 5.0])),
        ])
        .unwrap();
        let out = deltadelta_cq(&table, &["ref"], COL_TARGET_ID, Aggregate::Mean).unwrap();
        let dd = out.numeric(COL_DELTADELTA_CQ).unwrap();
        assert_eq!(dd[0], Some(-1.0));
        assert_eq!(dd[1], Some(1.0));
        assert_eq!(dd[2], Some(3.0));
        let ref_mean = (dd[0].unwrap() + dd[1].unwrap()) / 2.0;
        assert!(ref_mean.abs() < 1e-12);
        assert_eq!(out.numeric(COL_FOLD_CHANGE).unwrap()[2], Some(0.125));
    }

    #[test]
    fn test_round_trip_rel_abund() {
        let out = delta_cq(&two_by_two(), &["T1"], COL_SAMPLE_ID, Aggregate::Median).unwrap();
        let delta = out.numeric(COL_DELTA_CQ).unwrap();
        let rel = out.numeric(COL_REL_ABUND).unwrap();
        for (d, r) in delta.iter().zip(rel.iter()) {
            let (d, r) = (d.unwrap(), r.unwrap());
            assert!((-r.log2() - d).abs() < 1e-12);
        }
    }

    #[test]
    fn test_swappable_aggregate() {
        // Two reference targets with different cq: median and mean differ
        // once a third reference value breaks symmetry.
        let table = Table::from_columns(vec![
            (
                COL_SAMPLE_ID.to_string(),
                cells_text(&["s1", "s1", "s1", "s1"]),
            ),
            (
                COL_TARGET_ID.to_string(),
                cells_text(&["R1", "R2", "R3", "T"]),
            ),
            (COL_CQ.to_string(), cells_num(&[10.0, 11.0, 18.0, 20.0])),
        ])
        .unwrap();
        let refs = ["R1", "R2", "R3"];
        let med = delta_cq(&table, &refs, COL_SAMPLE_ID, Aggregate::Median).unwrap();
        let mean = delta_cq(&table, &refs, COL_SAMPLE_ID, Aggregate::Mean).unwrap();
        assert_eq!(med.numeric(COL_DELTA_CQ).unwrap()[3], Some(9.0));
        assert_eq!(mean.numeric(COL_DELTA_CQ).unwrap()[3], Some(7.0));
    }
}
