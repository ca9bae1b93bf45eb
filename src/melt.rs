use crate::error::{PlateCqError, Result};
use crate::table::{Cell, Table, COL_DRDT, COL_FLUOR_RAW, COL_TEMPERATURE, COL_WELL};

/// How the per-well derivative of fluorescence vs temperature is computed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrdtMethod {
    /// Natural cubic smoothing spline (Reinsch), derivative evaluated at
    /// each observed temperature. `lambda` is the roughness penalty;
    /// larger values smooth harder, 0 interpolates.
    Spline { lambda: f64 },
    /// First-order finite difference between series-adjacent observations;
    /// the first point of each well's series has no derivative.
    Diff,
}

impl Default for DrdtMethod {
    fn default() -> Self {
        DrdtMethod::Spline { lambda: 0.05 }
    }
}

/// Adds a `dRdT` column to a melt table. Rows are processed independently
/// per well and output row i corresponds to input row i; callers must not
/// mix wells from different plates into one call, there is no
/// plate-identity grouping here.
pub fn calculate_drdt(table: &Table, method: DrdtMethod) -> Result<Table> {
    let temperature = table.numeric(COL_TEMPERATURE)?;
    let fluor = table.numeric(COL_FLUOR_RAW)?;
    let partitions = table.partition_by(COL_WELL)?;

    let mut drdt: Vec<Option<f64>> = vec![None; table.n_rows()];
    for (well, rows) in partitions {
        // Rows with no well identity get no derivative.
        let Some(well) = well else { continue };
        match method {
            DrdtMethod::Diff => {
                for pair in rows.windows(2) {
                    let (prev, here) = (pair[0], pair[1]);
                    if let (Some(t0), Some(t1), Some(f0), Some(f1)) = (
                        temperature[prev],
                        temperature[here],
                        fluor[prev],
                        fluor[here],
                    ) {
                        if t1 != t0 {
                            drdt[here] = Some((f1 - f0) / (t1 - t0));
                        }
                    }
                }
            }
            DrdtMethod::Spline { lambda } => {
                let mut points: Vec<(f64, f64, usize)> = rows
                    .iter()
                    .filter_map(|&i| match (temperature[i], fluor[i]) {
                        (Some(t), Some(f)) => Some((t, f, i)),
                        _ => None,
                    })
                    .collect();
                if points.len() < 4 {
                    continue;
                }
                points.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("finite temperatures"));
                if points.windows(2).any(|w| w[0].0 == w[1].0) {
                    return Err(PlateCqError::ShapeMismatch(format!(
                        "well '{well}' has duplicate temperature observations"
                    )));
                }
                let x: Vec<f64> = points.iter().map(|p| p.0).collect();
                let y: Vec<f64> = points.iter().map(|p| p.1).collect();
                let derivative = smoothing_spline_derivative(&x, &y, lambda);
                for (d, p) in derivative.into_iter().zip(points.iter()) {
                    drdt[p.2] = Some(d);
                }
            }
        }
    }

    let mut out = table.clone();
    out.set_column(COL_DRDT, drdt.iter().map(|d| Cell::from_opt(*d)).collect())?;
    Ok(out)
}

/// Natural cubic smoothing spline over strictly increasing knots, returning
/// the first derivative at every knot. Minimizes
/// sum (y_i - g(x_i))^2 + lambda * integral g''(x)^2 dx
/// via the Reinsch formulation: solve (R + lambda QtQ) gamma = Qt y for the
/// interior second derivatives, with fitted values g = y - lambda Q gamma.
fn smoothing_spline_derivative(x: &[f64], y: &[f64], lambda: f64) -> Vec<f64> {
    let n = x.len();
    let m = n - 2;
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();

    // Column j of Q touches rows j, j+1, j+2.
    let q0: Vec<f64> = (0..m).map(|j| 1.0 / h[j]).collect();
    let q1: Vec<f64> = (0..m).map(|j| -1.0 / h[j] - 1.0 / h[j + 1]).collect();
    let q2: Vec<f64> = (0..m).map(|j| 1.0 / h[j + 1]).collect();

    // Dense m x m system R + lambda * QtQ; melt series are short enough
    // that a banded solver is not worth its complexity.
    let mut a = vec![vec![0.0; m]; m];
    for j in 0..m {
        a[j][j] = (h[j] + h[j + 1]) / 3.0 + lambda * (q0[j].powi(2) + q1[j].powi(2) + q2[j].powi(2));
        if j + 1 < m {
            let off = h[j + 1] / 6.0 + lambda * (q1[j] * q0[j + 1] + q2[j] * q1[j + 1]);
            a[j][j + 1] = off;
            a[j + 1][j] = off;
        }
        if j + 2 < m {
            let off = lambda * q2[j] * q0[j + 2];
            a[j][j + 2] = off;
            a[j + 2][j] = off;
        }
    }
    let rhs: Vec<f64> = (0..m)
        .map(|j| q0[j] * y[j] + q1[j] * y[j + 1] + q2[j] * y[j + 2])
        .collect();
    let gamma = solve_dense(a, rhs);

    let mut g = y.to_vec();
    for j in 0..m {
        g[j] -= lambda * q0[j] * gamma[j];
        g[j + 1] -= lambda * q1[j] * gamma[j];
        g[j + 2] -= lambda * q2[j] * gamma[j];
    }
    // Natural boundary: zero second derivative at both ends.
    let mut m2 = vec![0.0; n];
    m2[1..(n - 1)].copy_from_slice(&gamma);

    (0..n)
        .map(|k| {
            if k < n - 1 {
                (g[k + 1] - g[k]) / h[k] - h[k] * (2.0 * m2[k] + m2[k + 1]) / 6.0
            } else {
                (g[k] - g[k - 1]) / h[k - 1] + h[k - 1] * (2.0 * m2[k] + m2[k - 1]) / 6.0
            }
        })
        .collect()
}

/// Gaussian elimination with partial pivoting. The system here is symmetric
/// positive definite, so a zero pivot cannot occur for valid input.
fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().partial_cmp(&a[j][col].abs()).expect("finite"))
            .unwrap_or(col);
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);
        let pivot = a[col][col];
        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn melt_table(wells: &[&str], temps: &[f64], fluor: &[Cell]) -> Table {
        Table::from_columns(vec![
            (
                COL_WELL.to_string(),
                wells.iter().map(|w| Cell::text(*w)).collect(),
            ),
            (
                COL_TEMPERATURE.to_string(),
                temps.iter().map(|t| Cell::num(*t)).collect(),
            ),
            (COL_FLUOR_RAW.to_string(), fluor.to_vec()),
        ])
        .unwrap()
    }

    #[test]
    fn test_diff_boundary_property() {
        let table = melt_table(
            &["A1", "A1", "A1", "A1"],
            &[60.0, 61.0, 62.0, 64.0],
            &[
                Cell::num(10.0),
                Cell::num(8.0),
                Cell::num(5.0),
                Cell::num(1.0),
            ],
        );
        let out = calculate_drdt(&table, DrdtMethod::Diff).unwrap();
        assert_eq!(out.n_rows(), 4);
        let d = out.numeric(COL_DRDT).unwrap();
        assert_eq!(d[0], None);
        assert_eq!(d[1], Some(-2.0));
        assert_eq!(d[2], Some(-3.0));
        assert_eq!(d[3], Some(-2.0));
    }

    #[test]
    fn test_diff_restarts_per_well() {
        let table = melt_table(
            &["A1", "A1", "B1", "B1"],
            &[60.0, 61.0, 60.0, 61.0],
            &[
                Cell::num(1.0),
                Cell::num(2.0),
                Cell::num(5.0),
                Cell::num(3.0),
            ],
        );
        let out = calculate_drdt(&table, DrdtMethod::Diff).unwrap();
        let d = out.numeric(COL_DRDT).unwrap();
        assert_eq!(d, vec![None, Some(1.0), None, Some(-2.0)]);
    }

    #[test]
    fn test_diff_propagates_missing_fluor() {
        let table = melt_table(
            &["A1", "A1", "A1"],
            &[60.0, 61.0, 62.0],
            &[Cell::num(1.0), Cell::Missing, Cell::num(3.0)],
        );
        let out = calculate_drdt(&table, DrdtMethod::Diff).unwrap();
        let d = out.numeric(COL_DRDT).unwrap();
        assert_eq!(d, vec![None, None, None]);
    }

    #[test]
    fn test_spline_recovers_linear_slope_exactly() {
        // A smoothing spline of linear data is the line itself, whatever
        // the penalty: the roughness term is already zero at zero residual.
        let temps: Vec<f64> = (0..10).map(|i| 60.0 + 0.5 * i as f64).collect();
        let fluor: Vec<Cell> = temps.iter().map(|t| Cell::num(3.0 - 2.0 * t)).collect();
        let wells: Vec<&str> = vec!["A1"; 10];
        let table = melt_table(&wells, &temps, &fluor);
        let out = calculate_drdt(&table, DrdtMethod::Spline { lambda: 0.5 }).unwrap();
        for d in out.numeric(COL_DRDT).unwrap() {
            assert!((d.unwrap() + 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spline_row_order_preserved_with_unsorted_input() {
        // Temperatures arrive out of order; derivatives are evaluated at
        // each observed temperature and land back on the original rows.
        let table = melt_table(
            &["A1", "A1", "A1", "A1", "A1"],
            &[62.0, 60.0, 64.0, 61.0, 63.0],
            &[
                Cell::num(2.0 * 62.0),
                Cell::num(2.0 * 60.0),
                Cell::num(2.0 * 64.0),
                Cell::num(2.0 * 61.0),
                Cell::num(2.0 * 63.0),
            ],
        );
        let out = calculate_drdt(&table, DrdtMethod::Spline { lambda: 0.1 }).unwrap();
        let d = out.numeric(COL_DRDT).unwrap();
        assert_eq!(d.len(), 5);
        for v in d {
            assert!((v.unwrap() - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spline_locates_melt_peak_region() {
        // Sigmoid-like melt: fluorescence drops fastest near 80 degrees.
        let temps: Vec<f64> = (0..41).map(|i| 70.0 + 0.5 * i as f64).collect();
        let sigmoid = |t: f64| 1.0 / (1.0 + ((t - 80.0) / 1.5).exp());
        let fluor: Vec<Cell> = temps.iter().map(|t| Cell::num(sigmoid(*t))).collect();
        let wells: Vec<&str> = vec!["A1"; 41];
        let table = melt_table(&wells, &temps, &fluor);
        let out = calculate_drdt(&table, DrdtMethod::Spline { lambda: 0.01 }).unwrap();
        let d = out.numeric(COL_DRDT).unwrap();
        let (min_idx, _) = d
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .unwrap();
        let peak_temp = temps[min_idx];
        assert!(
            (peak_temp - 80.0).abs() <= 1.0,
            "steepest descent at {peak_temp}"
        );
    }

    #[test]
    fn test_spline_short_series_stays_missing() {
        let table = melt_table(
            &["A1", "A1", "A1"],
            &[60.0, 61.0, 62.0],
            &[Cell::num(1.0), Cell::num(2.0), Cell::num(3.0)],
        );
        let out = calculate_drdt(&table, DrdtMethod::Spline { lambda: 0.1 }).unwrap();
        assert_eq!(out.numeric(COL_DRDT).unwrap(), vec![None, None, None]);
    }

    #[test]
    fn test_duplicate_temperature_rejected_for_spline() {
        let table = melt_table(
            &["A1", "A1", "A1", "A1"],
            &[60.0, 60.0, 61.0, 62.0],
            &[
                Cell::num(1.0),
                Cell::num(1.5),
                Cell::num(2.0),
                Cell::num(3.0),
            ],
        );
        assert!(calculate_drdt(&table, DrdtMethod::Spline { lambda: 0.1 }).is_err());
    }
}
