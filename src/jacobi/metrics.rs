//! Convergence and accuracy metrics over `f32` vectors.
//! Lengths are not validated: callers pass vectors of matching size.

/// Euclidean length of `x`.
pub fn vector_length(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for v in x {
        s += v * v;
    }
    s.sqrt()
}

/// `||x1 - x0||`
pub fn norm_abs(x0: &[f32], x1: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for i in 0..x0.len() {
        let d = x0[i] - x1[i];
        s += d * d;
    }
    s.sqrt()
}

/// Relative change between two successive iterates: `||x_next - x_prev|| / ||x_prev||`.
/// An all-zero `x_prev` gives `inf` (or NaN when `x_next` is zero too).
pub fn relative_norm(x_prev: &[f32], x_next: &[f32]) -> f32 {
    norm_abs(x_prev, x_next) / vector_length(x_prev)
}

/// `||Ax - b||` with `A` traversed the same way as the Jacobi kernel, i.e.
/// `(Ax)_i = Σ_j a[j * n + i] * x[j]`.
pub fn deviation_abs(a: &[f32], b: &[f32], x: &[f32]) -> f32 {
    let n = x.len();
    let mut norm = 0.0f32;
    for i in 0..n {
        let mut s = 0.0f32;
        for j in 0..n {
            s += a[j * n + i] * x[j];
        }
        s -= b[i];
        norm += s * s;
    }
    norm.sqrt()
}

/// Relative residual `||Ax - b|| / ||b||`, reported after a run; it does not steer the loop.
pub fn deviation(a: &[f32], b: &[f32], x: &[f32]) -> f32 {
    deviation_abs(a, b, x) / vector_length(b)
}
