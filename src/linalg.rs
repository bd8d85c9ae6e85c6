use ndarray::{Array1, Array2};
use ndarray_linalg::{Eigh, UPLO};

use crate::error::{ReviewError, Result};

pub fn to_array2(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let n = rows.len();
    let m = rows.first().map(|row| row.len()).unwrap_or(0);
    let mut data = Vec::with_capacity(n * m);
    for row in rows {
        if row.len() != m {
            return Err(ReviewError::InvalidArgument(
                "matrix is not rectangular".to_string(),
            ));
        }
        data.extend_from_slice(row);
    }
    Array2::from_shape_vec((n, m), data).map_err(|e| ReviewError::InvalidArgument(e.to_string()))
}

pub fn ensure_square(matrix: &Array2<f64>, name: &str) -> Result<()> {
    let (r, c) = matrix.dim();
    if r == 0 || r != c {
        return Err(ReviewError::InvalidArgument(format!(
            "{name} must be a non-empty square matrix, got {r}x{c}"
        )));
    }
    Ok(())
}

pub fn inverse_from_eigh(eigvals: &Array1<f64>, eigvecs: &Array2<f64>) -> Array2<f64> {
    let inv_diag = Array2::from_diag(&eigvals.mapv(|v| 1.0 / v));
    eigvecs.dot(&inv_diag).dot(&eigvecs.t())
}

/// Inverse of a symmetric positive-definite matrix.
///
/// Fails when the smallest eigenvalue is not clearly positive relative to the
/// largest.
pub fn inverse_spd(matrix: &Array2<f64>, name: &str) -> Result<Array2<f64>> {
    ensure_square(matrix, name)?;
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(ReviewError::Degenerate(format!("{name} has non-finite entries")));
    }
    let (eigvals, eigvecs) = matrix
        .eigh(UPLO::Lower)
        .map_err(|e| ReviewError::Degenerate(format!("{name}: {e}")))?;
    let max = eigvals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = eigvals.iter().cloned().fold(f64::INFINITY, f64::min);
    if !(max > 0.0) || min <= max * 1e-10 {
        return Err(ReviewError::Degenerate(format!(
            "{name} is not positive definite (eigenvalues {min:.3e} .. {max:.3e})"
        )));
    }
    Ok(inverse_from_eigh(&eigvals, &eigvecs))
}

/// `xᵀ A x`.
pub fn quad_form(x: &Array1<f64>, a: &Array2<f64>) -> f64 {
    x.dot(&a.dot(x))
}
