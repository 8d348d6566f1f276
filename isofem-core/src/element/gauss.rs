//! Gauss quadrature rules for numerical integration.
//!
//! Standard Gauss-Legendre rules on [-1, 1] and their tensor products over the
//! reference line, square and cube used by the Lagrange element family.
//!
//! # Usage
//!
//! ```
//! use isofem_core::element::gauss::{gauss_1d, gauss_tensor};
//!
//! // 2-point 1D rule
//! for (xi, w) in gauss_1d(2) {
//!     // integrate at point xi with weight w
//! }
//!
//! // 2x2x2 rule on the reference cube
//! for gp in gauss_tensor(3, 2) {
//!     // gp.coords gives (ξ, η, ζ), gp.weight the product of axis weights
//! }
//! ```

/// Largest number of points per axis with a tabulated rule.
pub const MAX_TABULATED_POINTS: usize = 4;

/// Gauss-Legendre abscissae and weights on [-1, 1], ascending, indexed by
/// point count minus one.
const GAUSS_LEGENDRE: [&[(f64, f64)]; MAX_TABULATED_POINTS] = [
    &[(0.0, 2.0)],
    &[(-0.577_350_269_189_625_8, 1.0), (0.577_350_269_189_625_8, 1.0)],
    &[
        (-0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
        (0.0, 0.888_888_888_888_888_9),
        (0.774_596_669_241_483_4, 0.555_555_555_555_555_6),
    ],
    &[
        (-0.861_136_311_594_052_6, 0.347_854_845_137_453_9),
        (-0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
        (0.339_981_043_584_856_3, 0.652_145_154_862_546_1),
        (0.861_136_311_594_052_6, 0.347_854_845_137_453_9),
    ],
];

/// One integration point of a tensor-product rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussPoint {
    /// Natural coordinates (ξ, η, ζ); axes beyond the rule's dimension are 0.
    pub coords: [f64; 3],
    /// Product of the per-axis weights.
    pub weight: f64,
}

/// `(abscissa, weight)` pairs of the `n`-point rule on [-1, 1].
///
/// # Panics
///
/// Panics if `n` is not in 1..=4.
pub fn gauss_1d(n: usize) -> &'static [(f64, f64)] {
    if n == 0 || n > MAX_TABULATED_POINTS {
        panic!("gauss_1d: n must be 1, 2, 3, or 4, got {}", n);
    }
    GAUSS_LEGENDRE[n - 1]
}

/// Split a flat point index into per-axis indices.
///
/// Mixed-radix decomposition with base `n` per axis; axis 0 varies fastest.
pub fn point_indices(point: usize, dim: usize, n: usize) -> [usize; 3] {
    let mut indices = [0; 3];
    let mut rest = point;
    for index in indices.iter_mut().take(dim) {
        *index = rest % n;
        rest /= n;
    }
    indices
}

/// Tensor-product Gauss points on the reference `[-1, 1]^dim` domain.
///
/// Point `p` has axis indices [`point_indices`]`(p, dim, n)`; its weight is the
/// product of the 1D weights. Returns `n^dim` points.
///
/// # Panics
///
/// Panics if `dim` is not 1, 2 or 3, or `n` is not in 1..=4.
pub fn gauss_tensor(dim: usize, n: usize) -> Vec<GaussPoint> {
    if !(1..=3).contains(&dim) {
        panic!("gauss_tensor: dim must be 1, 2, or 3, got {}", dim);
    }

    let rule_1d = gauss_1d(n);
    let count = n.pow(dim as u32);
    (0..count)
        .map(|p| {
            let ii = point_indices(p, dim, n);
            let mut coords = [0.0; 3];
            let mut weight = 1.0;
            for d in 0..dim {
                let (x, w) = rule_1d[ii[d]];
                coords[d] = x;
                weight *= w;
            }
            GaussPoint { coords, weight }
        })
        .collect()
}
