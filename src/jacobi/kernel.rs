//! The Jacobi update every memory strategy launches on the device.

/// New value of component `i` computed from the previous iterate.
///
/// `a` is read as `a[j * n + i]`: for a row-major matrix this walks column `i`,
/// so the update is the textbook Jacobi step only for symmetric matrices. The
/// traversal is kept as is; the generated systems converge either way because
/// their dominant diagonal also dominates the columns.
#[inline]
pub fn jacobi_row(i: usize, n: usize, a: &[f32], b: &[f32], x_prev: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for j in 0..n {
        if i != j {
            s += a[j * n + i] * x_prev[j];
        }
    }
    (b[i] - s) / a[i * n + i]
}

/// Order of the read set handed to the kernel by every strategy.
pub(crate) const READ_A: usize = 0;
pub(crate) const READ_B: usize = 1;
pub(crate) const READ_X_PREV: usize = 2;

/// Kernel body in the shape expected by `Queue::parallel_for`.
pub(crate) fn jacobi_kernel(n: usize) -> impl Fn(usize, &[&[f32]]) -> f32 + Send + Sync {
    move |i, reads| jacobi_row(i, n, reads[READ_A], reads[READ_B], reads[READ_X_PREV])
}
