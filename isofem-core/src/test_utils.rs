//! Shared helpers for unit tests.

use crate::sparse::{CsrMatrix, TripletMatrix};
use rand::{distributions::Uniform, rngs::StdRng, Rng, SeedableRng};

pub fn init_logger() {
    let _ = env_logger::Builder::from_env("ISOFEM_LOG")
        .is_test(true)
        .try_init();
}

/// Random symmetric positive definite matrix in full CSR storage, built as
/// `B Bᵀ + n I`, with a random right-hand side.
pub fn random_spd(n: usize, seed: u64) -> (CsrMatrix, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let range = Uniform::new(-1.0, 1.0);
    let b: Vec<f64> = (0..n * n).map(|_| rng.sample(range)).collect();

    let mut triplet = TripletMatrix::with_capacity(n, n, n * n);
    for i in 0..n {
        for j in 0..n {
            let mut value: f64 = (0..n).map(|k| b[i * n + k] * b[j * n + k]).sum();
            if i == j {
                value += n as f64;
            }
            triplet.add(i, j, value);
        }
    }
    let rhs = (0..n).map(|_| rng.sample(range)).collect();
    (triplet.to_csr().unwrap(), rhs)
}

/// Tridiagonal `[-1, 4, -1]` matrix, the pattern of a chain of 1D elements.
pub fn banded(n: usize, diagonal: f64) -> CsrMatrix {
    let mut triplet = TripletMatrix::new(n, n);
    for i in 0..n {
        triplet.add(i, i, diagonal);
    }
    for i in 0..n.saturating_sub(1) {
        triplet.add_symmetric(i, i + 1, -1.0);
    }
    triplet.to_csr().unwrap()
}
