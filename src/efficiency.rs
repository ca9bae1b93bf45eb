use crate::error::{PlateCqError, Result};
use crate::table::{Cell, Table, COL_BIOL_REP, COL_CQ, COL_DILUTION, COL_TARGET_ID};
use serde::Serialize;
use std::collections::HashSet;

/// Coefficients, standard errors and fit quality from a linear model.
#[derive(Clone, Debug)]
pub struct RegressionFit {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub r_squared: f64,
}

/// Ordinary-least-squares service. The estimator only needs coefficient
/// estimates, their standard errors and R²; any implementation satisfying
/// that contract is substitutable.
pub trait RegressionBackend {
    /// `design` holds one predictor column per entry (first is the
    /// intercept), all the same length as `y`. `None` when the fit is
    /// rank-deficient or has no residual degrees of freedom.
    fn fit(&self, y: &[f64], design: &[Vec<f64>]) -> Option<RegressionFit>;
}

/// Default backend: normal equations solved by Gaussian elimination with
/// partial pivoting. Design matrices here are tiny (intercept, log2
/// dilution, a handful of replicate dummies).
#[derive(Clone, Copy, Debug, Default)]
pub struct OlsBackend;

fn invert(mut m: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let p = m.len();
    let mut inv: Vec<Vec<f64>> = (0..p)
        .map(|i| (0..p).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    for col in 0..p {
        let pivot_row = (col..p)
            .max_by(|&a, &b| m[a][col].abs().partial_cmp(&m[b][col].abs()).expect("finite"))?;
        if m[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot_row);
        inv.swap(col, pivot_row);
        let pivot = m[col][col];
        for j in 0..p {
            m[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for i in 0..p {
            if i == col {
                continue;
            }
            let factor = m[i][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..p {
                m[i][j] -= factor * m[col][j];
                inv[i][j] -= factor * inv[col][j];
            }
        }
    }
    Some(inv)
}

impl RegressionBackend for OlsBackend {
    fn fit(&self, y: &[f64], design: &[Vec<f64>]) -> Option<RegressionFit> {
        let n = y.len();
        let p = design.len();
        if p == 0 || n <= p {
            return None;
        }
        let xtx: Vec<Vec<f64>> = (0..p)
            .map(|i| {
                (0..p)
                    .map(|j| (0..n).map(|k| design[i][k] * design[j][k]).sum())
                    .collect()
            })
            .collect();
        let xty: Vec<f64> = (0..p)
            .map(|i| (0..n).map(|k| design[i][k] * y[k]).sum())
            .collect();
        let inv = invert(xtx)?;
        let coefficients: Vec<f64> = (0..p)
            .map(|i| (0..p).map(|j| inv[i][j] * xty[j]).sum())
            .collect();

        let fitted = |k: usize| -> f64 { (0..p).map(|i| coefficients[i] * design[i][k]).sum() };
        let rss: f64 = (0..n).map(|k| (y[k] - fitted(k)).powi(2)).sum();
        let mean = y.iter().sum::<f64>() / n as f64;
        let tss: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };

        let sigma2 = rss / (n - p) as f64;
        let std_errors: Vec<f64> = (0..p).map(|i| (sigma2 * inv[i][i]).max(0.0).sqrt()).collect();
        Some(RegressionFit {
            coefficients,
            std_errors,
            r_squared,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EfficiencyOptions {
    /// Adds per-replicate intercept offsets (`biol_rep` dummies) so
    /// systematic replicate shifts are absorbed before the slope is read.
    pub replicate_term: bool,
}

/// One summary row per fitted dilution series. All fields are optional:
/// an under-determined series reports missing values, never an error.
#[derive(Clone, Debug, Serialize)]
pub struct EfficiencySummary {
    pub target_id: Option<String>,
    pub efficiency: Option<f64>,
    pub efficiency_sd: Option<f64>,
    pub r_squared: Option<f64>,
}

impl EfficiencySummary {
    fn empty(target_id: Option<String>) -> Self {
        Self {
            target_id,
            efficiency: None,
            efficiency_sd: None,
            r_squared: None,
        }
    }
}

/// Fits `cq ~ log2(dilution) [+ biol_rep]` over a single target's dilution
/// series and reports amplification efficiency as fractional doubling per
/// cycle: `efficiency = 2^(-slope) - 1`, so a perfect two-fold series
/// (slope -1) scores 1.0. The standard error follows by the delta method,
/// `(efficiency + 1) * ln(2) * slope_sd`.
///
/// All rows must belong to one target; use `estimate_efficiency_by_target`
/// to group. Series with fewer than three distinct dilutions, all-missing
/// cq, or no residual degrees of freedom yield a missing summary.
pub fn estimate_efficiency(
    table: &Table,
    options: EfficiencyOptions,
    backend: &dyn RegressionBackend,
) -> Result<EfficiencySummary> {
    let target_id = single_target(table)?;
    let cq = table.numeric(COL_CQ)?;
    let dilution = table.numeric(COL_DILUTION)?;
    let replicates = if options.replicate_term {
        Some(table.labels(COL_BIOL_REP)?)
    } else {
        None
    };

    // Usable observations: finite cq, positive dilution, and a replicate
    // label when the replicate term is requested.
    let mut y = vec![];
    let mut x = vec![];
    let mut reps: Vec<String> = vec![];
    for i in 0..table.n_rows() {
        let (Some(cq), Some(dil)) = (cq[i], dilution[i]) else {
            continue;
        };
        if dil <= 0.0 {
            continue;
        }
        if let Some(labels) = &replicates {
            let Some(rep) = labels[i].clone() else { continue };
            reps.push(rep);
        }
        y.push(cq);
        x.push(dil.log2());
    }

    let distinct_dilutions: HashSet<u64> = x.iter().map(|v| v.to_bits()).collect();
    if distinct_dilutions.len() < 3 {
        return Ok(EfficiencySummary::empty(target_id));
    }

    let mut design: Vec<Vec<f64>> = vec![vec![1.0; y.len()], x];
    if replicates.is_some() {
        let mut levels: Vec<&str> = vec![];
        for rep in &reps {
            if !levels.contains(&rep.as_str()) {
                levels.push(rep);
            }
        }
        // First level is the baseline.
        for level in levels.iter().skip(1) {
            design.push(
                reps.iter()
                    .map(|r| if r == level { 1.0 } else { 0.0 })
                    .collect(),
            );
        }
    }

    let Some(fit) = backend.fit(&y, &design) else {
        return Ok(EfficiencySummary::empty(target_id));
    };
    let slope = fit.coefficients[1];
    let slope_sd = fit.std_errors[1];
    let efficiency = (-slope).exp2() - 1.0;
    let efficiency_sd = (efficiency + 1.0).abs() * std::f64::consts::LN_2 * slope_sd;
    Ok(EfficiencySummary {
        target_id,
        efficiency: Some(efficiency),
        efficiency_sd: Some(efficiency_sd),
        r_squared: fit.r_squared.is_finite().then_some(fit.r_squared),
    })
}

/// The single target label of a pre-filtered table, or an error when rows
/// from several targets are mixed.
fn single_target(table: &Table) -> Result<Option<String>> {
    if !table.has_column(COL_TARGET_ID) {
        return Ok(None);
    }
    let labels = table.labels(COL_TARGET_ID)?;
    let distinct: HashSet<&str> = labels.iter().flatten().map(String::as_str).collect();
    if distinct.len() > 1 {
        return Err(PlateCqError::ShapeMismatch(format!(
            "efficiency estimation expects a single target, found {}",
            distinct.len()
        )));
    }
    Ok(distinct.into_iter().next().map(str::to_string))
}

/// Groups by `target_id` and fits one dilution series per target,
/// returning one summary row per target in first-appearance order.
pub fn estimate_efficiency_by_target(
    table: &Table,
    options: EfficiencyOptions,
    backend: &dyn RegressionBackend,
) -> Result<Vec<EfficiencySummary>> {
    let partitions = table.partition_by(COL_TARGET_ID)?;
    let mut summaries = vec![];
    for (target, rows) in partitions {
        let indices: Vec<Option<usize>> = rows.into_iter().map(Some).collect();
        let subset = table.take(&indices);
        let mut summary = estimate_efficiency(&subset, options, backend)?;
        summary.target_id = target;
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Summaries as a table (for CSV export or plate-level reporting).
pub fn efficiency_table(summaries: &[EfficiencySummary]) -> Table {
    let mut table = Table::new();
    let text = |v: &Option<String>| match v {
        Some(s) => Cell::text(s.clone()),
        None => Cell::Missing,
    };
    // Infallible: fresh table, equal-length columns.
    let _ = table.add_column(COL_TARGET_ID, summaries.iter().map(|s| text(&s.target_id)).collect());
    let _ = table.add_column(
        "efficiency",
        summaries.iter().map(|s| Cell::from_opt(s.efficiency)).collect(),
    );
    let _ = table.add_column(
        "efficiency_sd",
        summaries.iter().map(|s| Cell::from_opt(s.efficiency_sd)).collect(),
    );
    let _ = table.add_column(
        "r_squared",
        summaries.iter().map(|s| Cell::from_opt(s.r_squared)).collect(),
    );
    table
}
