//! Random strictly diagonally dominant systems for the Jacobi benchmark.
use crate::jacobi::LinearSystem;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Off-diagonal entries in [1, 3), diagonal entries in [5n, 5n + 2), b in [1, 3).
/// Every row is strictly dominated by its diagonal whatever the draw.
pub fn generate_with<R: Rng>(n: usize, rng: &mut R) -> LinearSystem {
    let mut a = vec![0.0f32; n * n];
    let diagonal_low = 5.0 * n as f32;
    for i in 0..n {
        for j in 0..n {
            a[i * n + j] = if i == j {
                rng.random_range(diagonal_low..diagonal_low + 2.0)
            } else {
                rng.random_range(1.0f32..3.0)
            };
        }
    }
    let b = (0..n).map(|_| rng.random_range(1.0f32..3.0)).collect();
    LinearSystem::new(a, b)
}

pub fn generate_equation_system(n: usize) -> LinearSystem {
    generate_with(n, &mut rand::rng())
}

/// Same draw for the same `(n, seed)`; used by tests and benchmarks.
pub fn generate_equation_system_seeded(n: usize, seed: u64) -> LinearSystem {
    generate_with(n, &mut StdRng::seed_from_u64(seed))
}
