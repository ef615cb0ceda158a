//! Comparison of the memory strategies after a benchmark run.
//!
//! Besides timing and iteration counts, every strategy is checked against the
//! others and, for moderate sizes, against a direct LU solve in double precision of
//! the system the kernel actually iterates on.
use crate::jacobi::{CompResult, LinearSystem, MemoryStrategy, deviation};
use approx::relative_eq;
use nalgebra::{DMatrix, DVector};
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// LU reference is skipped above this many rows
pub const REFERENCE_SOLVE_MAX_ROWS: usize = 2048;
/// relative tolerance used for cross-strategy agreement
pub const AGREEMENT_TOLERANCE: f32 = 1e-4;

#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct StrategyRow {
    #[tabled(rename = "Strategy")]
    pub strategy: String,
    #[tabled(rename = "Elapsed (ms)")]
    pub elapsed: String,
    #[tabled(rename = "Iterations")]
    pub iterations: usize,
    #[tabled(rename = "Accuracy")]
    pub accuracy: String,
    #[tabled(rename = "Deviation")]
    pub deviation: String,
    #[tabled(rename = "Max rel. error vs LU")]
    pub reference_error: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

pub fn report_rows(
    system: &LinearSystem,
    results: &[(MemoryStrategy, CompResult)],
) -> Vec<StrategyRow> {
    let reference = reference_solution(system);
    results
        .iter()
        .map(|(strategy, result)| StrategyRow {
            strategy: strategy.label().to_string(),
            elapsed: format!("{:.3}", result.elapsed),
            iterations: result.iter,
            accuracy: format!("{:e}", result.accuracy),
            deviation: format!("{:e}", deviation(&system.a, &system.b, &result.x)),
            reference_error: match &reference {
                Some(r) => format!("{:e}", max_relative_error(&result.x, r)),
                None => "-".to_string(),
            },
            status: match &result.error {
                None => "ok".to_string(),
                Some(e) => e.to_string(),
            },
        })
        .collect()
}

pub fn results_table(rows: &[StrategyRow]) -> String {
    let mut table = Table::new(rows);
    table.with(Style::modern_rounded());
    table.to_string()
}

/// Same iteration count and iterates equal within [`AGREEMENT_TOLERANCE`].
/// Runs that ended with a device error take no part in the comparison.
pub fn strategies_agree(results: &[CompResult]) -> bool {
    let complete: Vec<&CompResult> = results.iter().filter(|r| r.is_complete()).collect();
    let Some((first, rest)) = complete.split_first() else {
        return true;
    };
    rest.iter().all(|other| {
        other.iter == first.iter
            && other.x.len() == first.x.len()
            && other.x.iter().zip(&first.x).all(|(a, b)| {
                relative_eq!(*a, *b, epsilon = f32::EPSILON, max_relative = AGREEMENT_TOLERANCE)
            })
    })
}

/// Direct solution of the system the kernel iterates on, whose (i, j) entry is
/// `a[j * n + i]`. `None` for large or singular systems.
pub fn reference_solution(system: &LinearSystem) -> Option<DVector<f64>> {
    let n = system.rows();
    if n == 0 || n > REFERENCE_SOLVE_MAX_ROWS || system.a.len() != n * n {
        return None;
    }
    let a: Vec<f64> = system.a.iter().map(|&v| v as f64).collect();
    let matrix = DMatrix::from_column_slice(n, n, &a);
    let rhs = DVector::from_iterator(n, system.b.iter().map(|&v| v as f64));
    matrix.lu().solve(&rhs)
}

/// max_i |x_i - r_i| / max(|r_i|, 1)
pub fn max_relative_error(x: &[f32], reference: &DVector<f64>) -> f64 {
    x.iter()
        .zip(reference.iter())
        .map(|(&xi, &ri)| (xi as f64 - ri).abs() / ri.abs().max(1.0))
        .fold(0.0, f64::max)
}
