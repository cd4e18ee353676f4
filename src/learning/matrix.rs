//! Flat row-major small-matrix linear algebra for ridge regression, ported
//! in spirit from the native crate's `matrix` module in the same source
//! repository this engine's teacher package lives in (cited for numerical
//! grounding only — that crate is not the teacher and nothing here is
//! copied verbatim from it).

pub const EPSILON: f64 = 1e-10;
pub const MIN_LAMBDA: f64 = 1e-3;
pub const MIN_RANK1_DIAG: f64 = 1e-6;

/// Cholesky-decomposes `a` (flat row-major d x d, assumed SPD after adding
/// `lambda * EPSILON` to the diagonal for numerical safety) into lower
/// triangular `L` such that `L L^T = a`. Falls back to `sqrt(lambda)` on the
/// diagonal if a pivot ever goes non-positive, which produces a valid
/// (if approximate) triangular factor rather than propagating NaN.
pub fn cholesky_decompose(a: &[f64], d: usize, lambda: f64) -> Vec<f64> {
    let safe_lambda = lambda.max(MIN_LAMBDA);
    let mut l = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..=i {
            let mut sum = a[i * d + j];
            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }
            if i == j {
                let diag = sum + safe_lambda * EPSILON;
                l[i * d + j] = if diag > 0.0 { diag.sqrt() } else { safe_lambda.sqrt() };
            } else {
                let denom = l[j * d + j];
                l[i * d + j] = if denom.abs() > EPSILON { sum / denom } else { 0.0 };
            }
        }
    }
    l
}

/// Rank-1 update of a Cholesky factor for `A' = A + x x^T`, via Givens
/// rotations. Returns `false` if the update would be numerically unstable
/// (signalling the caller should fall back to a full `cholesky_decompose`).
pub fn cholesky_rank1_update(l: &mut [f64], x: &[f64], d: usize, min_diag: f64) -> bool {
    let mut work = x.to_vec();
    for k in 0..d {
        let l_kk = l[k * d + k];
        let r = (l_kk * l_kk + work[k] * work[k]).sqrt();
        if r < min_diag || !r.is_finite() {
            return false;
        }
        let c = r / l_kk.max(EPSILON);
        let s = work[k] / l_kk.max(EPSILON);
        l[k * d + k] = r;
        for i in (k + 1)..d {
            let new_lik = (l[i * d + k] + s * work[i]) / c;
            // Deflate with the *updated* factor entry, not the stale one:
            // the standard rank-1 Cholesky update (LINPACK `chud`) computes
            // `work[i]` from `new_lik`, not from `l[i*d+k]` before it is
            // overwritten.
            work[i] = c * work[i] - s * new_lik;
            l[i * d + k] = new_lik;
            if !l[i * d + k].is_finite() {
                return false;
            }
        }
    }
    for i in 0..d {
        if l[i * d + i] < min_diag || !l[i * d + i].is_finite() {
            return false;
        }
    }
    true
}

fn solve_triangular_lower(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let mut y = vec![0.0; d];
    for i in 0..d {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * d + k] * y[k];
        }
        y[i] = sum / l[i * d + i].max(EPSILON);
    }
    y
}

fn solve_triangular_upper_transpose(l: &[f64], y: &[f64], d: usize) -> Vec<f64> {
    let mut x = vec![0.0; d];
    for i in (0..d).rev() {
        let mut sum = y[i];
        for k in (i + 1)..d {
            sum -= l[k * d + i] * x[k];
        }
        x[i] = sum / l[i * d + i].max(EPSILON);
    }
    x
}

/// Solves `A x = b` given `A`'s Cholesky factor `L`, via forward and back
/// substitution. Never materialises `A^-1`.
pub fn solve_cholesky(l: &[f64], b: &[f64], d: usize) -> Vec<f64> {
    let y = solve_triangular_lower(l, b, d);
    solve_triangular_upper_transpose(l, &y, d)
}

/// Computes `x^T A^-1 x = ||L^-1 x||^2` via forward substitution, which is
/// exactly the UCB confidence-term formula.
pub fn compute_quadratic_form(l: &[f64], x: &[f64], d: usize) -> f64 {
    let z = solve_triangular_lower(l, x, d);
    z.iter().map(|v| v * v).sum()
}

pub fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn mat_vec_mul(a: &[f64], x: &[f64], d: usize) -> Vec<f64> {
    (0..d).map(|i| dot_product(&a[i * d..(i + 1) * d], x)).collect()
}

/// In-place `A += x x^T`.
pub fn rank1_update_matrix(a: &mut [f64], x: &[f64], d: usize) {
    for i in 0..d {
        for j in 0..d {
            a[i * d + j] += x[i] * x[j];
        }
    }
}

pub fn vec_add_scaled(b: &mut [f64], x: &[f64], scale: f64) {
    for (bi, xi) in b.iter_mut().zip(x.iter()) {
        *bi += scale * xi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_cholesky_is_identity() {
        let d = 3;
        let a = {
            let mut m = vec![0.0; d * d];
            for i in 0..d {
                m[i * d + i] = 1.0;
            }
            m
        };
        let l = cholesky_decompose(&a, d, 1.0);
        for i in 0..d {
            assert!((l[i * d + i] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn solve_reconstructs_known_vector() {
        let d = 2;
        let a = vec![2.0, 0.0, 0.0, 2.0];
        let l = cholesky_decompose(&a, d, 1.0);
        let b = vec![4.0, 6.0];
        let x = solve_cholesky(&l, &b, d);
        assert!((x[0] - 2.0).abs() < 1e-6);
        assert!((x[1] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn quadratic_form_matches_known_value() {
        let d = 2;
        let a = vec![1.0, 0.0, 0.0, 1.0];
        let l = cholesky_decompose(&a, d, 1.0);
        let x = vec![3.0, 4.0];
        let q = compute_quadratic_form(&l, &x, d);
        assert!((q - 25.0).abs() < 1e-6);
    }

    #[test]
    fn rank1_update_matches_full_recompute() {
        let d = 2;
        let lambda = 0.5;
        let mut a = vec![lambda, 0.0, 0.0, lambda];
        let mut l = cholesky_decompose(&a, d, lambda);
        let x = vec![1.0, 2.0];
        let ok = cholesky_rank1_update(&mut l, &x, d, MIN_RANK1_DIAG);
        assert!(ok);
        rank1_update_matrix(&mut a, &x, d);
        let l_full = cholesky_decompose(&a, d, lambda);
        for i in 0..d {
            assert!((l[i * d + i] - l_full[i * d + i]).abs() < 1e-3);
        }
    }
}
