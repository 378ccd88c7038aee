//! Clebsch-Gordan coefficient cache.
//!
//! Coefficients couple two real-spherical-harmonic angular orders `(l1, l2)`
//! into an output order λ. They are computed once per cache from the Racah
//! sum in the complex basis, transformed to the real basis, and stored for
//! every valid `(l1, l2, λ)` triple up to the configured maximum angular
//! order, either densely (full `(2l1+1, 2l2+1, 2λ+1)` arrays) or sparsely
//! (only the effectively non-zero `(m1, m2, μ)` entries).
//!
//! The cache is immutable after construction and can be shared read-only
//! across concurrent correlation runs.

use std::collections::BTreeMap;

use equicorr_core::{DenseArray, Scalar};
use num_complex::Complex64;

use crate::error::{CgError, Result};

/// Magnitude below which a coefficient is treated as an exact zero when
/// building the sparse representation. True selection-rule zeros come out
/// of the basis change at the 1e-17 level; genuine coefficients are many
/// orders of magnitude larger.
pub const CG_SPARSE_CUTOFF: f64 = 1e-12;

/// Storage layout of a coefficient cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgRepresentation {
    /// Full `(2l1+1, 2l2+1, 2λ+1)` arrays, for vectorized contraction.
    Dense,
    /// Lists of non-zero `(m1, m2, μ, value)` entries, bounding memory for
    /// large angular cutoffs.
    Sparse,
}

/// One non-zero coefficient in the sparse representation.
///
/// Indices are array offsets, i.e. `m1` stands for the quantum number
/// `m1 - l1`.
#[derive(Debug, Clone)]
pub struct SparseEntry<T> {
    pub m1: usize,
    pub m2: usize,
    pub mu: usize,
    pub value: T,
}

#[derive(Debug, Clone)]
enum CgData<T: Scalar> {
    Dense(DenseArray<T>),
    Sparse(Vec<SparseEntry<T>>),
}

/// Immutable cache of real-basis coupling coefficients for all valid
/// `(l1, l2, λ)` triples with `l1, l2, λ ≤ max_angular`.
#[derive(Debug, Clone)]
pub struct CgCoefficients<T: Scalar> {
    max_angular: usize,
    representation: CgRepresentation,
    triples: BTreeMap<(usize, usize, usize), CgData<T>>,
}

impl CgCoefficients<f64> {
    /// Compute the cache for the given maximum angular order.
    ///
    /// This is a pure function of its arguments; the result carries no
    /// state beyond the stored coefficient values.
    pub fn new(max_angular: usize, representation: CgRepresentation) -> CgCoefficients<f64> {
        let fact = factorials(4 * max_angular + 2);
        let r2c: Vec<Vec<Complex64>> = (0..=max_angular).map(real_to_complex).collect();

        let mut triples = BTreeMap::new();
        for l1 in 0..=max_angular {
            for l2 in 0..=max_angular {
                let lambda_min = l1.abs_diff(l2);
                let lambda_max = (l1 + l2).min(max_angular);
                for lambda in lambda_min..=lambda_max {
                    let dense = real_coupling_array(l1, l2, lambda, &r2c, &fact);
                    let data = match representation {
                        CgRepresentation::Dense => CgData::Dense(dense),
                        CgRepresentation::Sparse => CgData::Sparse(sparsify(&dense)),
                    };
                    triples.insert((l1, l2, lambda), data);
                }
            }
        }

        CgCoefficients {
            max_angular,
            representation,
            triples,
        }
    }
}

impl<T: Scalar> CgCoefficients<T> {
    /// The maximum angular order this cache was built for.
    pub fn max_angular(&self) -> usize {
        self.max_angular
    }

    /// The storage layout of this cache.
    pub fn representation(&self) -> CgRepresentation {
        self.representation
    }

    /// Whether the `(l1, l2, λ)` triple is stored.
    pub fn contains(&self, l1: usize, l2: usize, lambda: usize) -> bool {
        self.triples.contains_key(&(l1, l2, lambda))
    }

    /// The dense coefficient array for `(l1, l2, λ)`.
    pub fn dense(&self, l1: usize, l2: usize, lambda: usize) -> Result<&DenseArray<T>> {
        match self.triples.get(&(l1, l2, lambda)) {
            Some(CgData::Dense(array)) => Ok(array),
            Some(CgData::Sparse(_)) => Err(CgError::Configuration(format!(
                "coefficients for (l1={l1}, l2={l2}, lambda={lambda}) were built sparse",
            ))),
            None => Err(self.missing(l1, l2, lambda)),
        }
    }

    /// The sparse coefficient entries for `(l1, l2, λ)`.
    pub fn sparse(&self, l1: usize, l2: usize, lambda: usize) -> Result<&[SparseEntry<T>]> {
        match self.triples.get(&(l1, l2, lambda)) {
            Some(CgData::Sparse(entries)) => Ok(entries),
            Some(CgData::Dense(_)) => Err(CgError::Configuration(format!(
                "coefficients for (l1={l1}, l2={l2}, lambda={lambda}) were built dense",
            ))),
            None => Err(self.missing(l1, l2, lambda)),
        }
    }

    fn missing(&self, l1: usize, l2: usize, lambda: usize) -> CgError {
        CgError::Configuration(format!(
            "no coefficients for (l1={l1}, l2={l2}, lambda={lambda}) in a cache built \
             with max_angular={}",
            self.max_angular,
        ))
    }

    /// Convert the stored values to another precision.
    ///
    /// Values are converted, never recoupled; this is cheap compared to
    /// rebuilding the cache.
    pub fn cast<U: Scalar>(&self) -> CgCoefficients<U> {
        let triples = self
            .triples
            .iter()
            .map(|(&key, data)| {
                let converted = match data {
                    CgData::Dense(array) => CgData::Dense(DenseArray::from_vec_with_shape(
                        array.as_slice().iter().map(|&v| U::from_f64(v.to_f64())).collect(),
                        &array.dims(),
                    )),
                    CgData::Sparse(entries) => CgData::Sparse(
                        entries
                            .iter()
                            .map(|e| SparseEntry {
                                m1: e.m1,
                                m2: e.m2,
                                mu: e.mu,
                                value: U::from_f64(e.value.to_f64()),
                            })
                            .collect(),
                    ),
                };
                (key, converted)
            })
            .collect();

        CgCoefficients {
            max_angular: self.max_angular,
            representation: self.representation,
            triples,
        }
    }
}

fn sparsify(dense: &DenseArray<f64>) -> Vec<SparseEntry<f64>> {
    let dims = dense.dims();
    let (d2, d3) = (dims[1], dims[2]);
    let mut entries = Vec::new();
    for (i, &value) in dense.as_slice().iter().enumerate() {
        if value.abs() > CG_SPARSE_CUTOFF {
            entries.push(SparseEntry {
                m1: i / (d2 * d3),
                m2: (i / d3) % d2,
                mu: i % d3,
                value,
            });
        }
    }
    entries
}

/// Factorials `0! ..= (n-1)!` as f64.
fn factorials(n: usize) -> Vec<f64> {
    let mut fact = Vec::with_capacity(n);
    let mut value = 1.0;
    fact.push(value);
    for k in 1..n {
        value *= k as f64;
        fact.push(value);
    }
    fact
}

/// Clebsch-Gordan coefficient `⟨l1 m1, l2 m2 | l3 m3⟩` in the complex
/// basis (Condon-Shortley phase), from the Racah sum.
fn clebsch_gordan(l1: i64, m1: i64, l2: i64, m2: i64, l3: i64, m3: i64, fact: &[f64]) -> f64 {
    if m3 != m1 + m2 {
        return 0.0;
    }
    if l3 < (l1 - l2).abs() || l3 > l1 + l2 {
        return 0.0;
    }
    if m1.abs() > l1 || m2.abs() > l2 || m3.abs() > l3 {
        return 0.0;
    }

    let f = |n: i64| fact[n as usize];

    let prefactor = ((2 * l3 + 1) as f64 * f(l1 + l2 - l3) * f(l1 - l2 + l3) * f(-l1 + l2 + l3)
        / f(l1 + l2 + l3 + 1))
    .sqrt()
        * (f(l3 + m3) * f(l3 - m3) * f(l1 - m1) * f(l1 + m1) * f(l2 - m2) * f(l2 + m2)).sqrt();

    let k_min = 0.max(l2 - l3 - m1).max(l1 - l3 + m2);
    let k_max = (l1 + l2 - l3).min(l1 - m1).min(l2 + m2);

    let mut sum = 0.0;
    for k in k_min..=k_max {
        let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
        let denominator = f(k)
            * f(l1 + l2 - l3 - k)
            * f(l1 - m1 - k)
            * f(l2 + m2 - k)
            * f(l3 - l2 + m1 + k)
            * f(l3 - l1 - m2 + k);
        sum += sign / denominator;
    }

    prefactor * sum
}

/// The unitary change of basis `U` with `S = U Y`, mapping complex
/// spherical harmonics `Y_{l,m}` to real ones `S_{l,m}`, as a row-major
/// `(2l+1) × (2l+1)` matrix indexed by `m + l`.
fn real_to_complex(l: usize) -> Vec<Complex64> {
    let l = l as i64;
    let d = (2 * l + 1) as usize;
    let mut u = vec![Complex64::new(0.0, 0.0); d * d];
    let sqrt_2_inv = std::f64::consts::FRAC_1_SQRT_2;

    let at = |m_row: i64, m_col: i64| ((l + m_row) as usize) * d + (l + m_col) as usize;

    for m in -l..=l {
        let sign = if m.rem_euclid(2) == 0 { 1.0 } else { -1.0 };
        match m.cmp(&0) {
            std::cmp::Ordering::Greater => {
                // S_m = (Y_{-m} + (-1)^m Y_m) / sqrt(2)
                u[at(m, -m)] = Complex64::new(sqrt_2_inv, 0.0);
                u[at(m, m)] = Complex64::new(sign * sqrt_2_inv, 0.0);
            }
            std::cmp::Ordering::Equal => {
                u[at(0, 0)] = Complex64::new(1.0, 0.0);
            }
            std::cmp::Ordering::Less => {
                // S_m = i (Y_m - (-1)^m Y_{-m}) / sqrt(2)
                u[at(m, m)] = Complex64::new(0.0, sqrt_2_inv);
                u[at(m, -m)] = Complex64::new(0.0, -sign * sqrt_2_inv);
            }
        }
    }

    u
}

/// Coupling coefficients for `(l1, l2) → λ` in the real basis, as a dense
/// `(2l1+1, 2l2+1, 2λ+1)` array.
///
/// The complex-basis array is transformed one axis at a time through the
/// real↔complex change of basis; the coupled result is purely real for
/// even `l1 + l2 + λ` and purely imaginary otherwise, and the non-zero
/// part is stored.
fn real_coupling_array(
    l1: usize,
    l2: usize,
    lambda: usize,
    r2c: &[Vec<Complex64>],
    fact: &[f64],
) -> DenseArray<f64> {
    let d1 = 2 * l1 + 1;
    let d2 = 2 * l2 + 1;
    let d3 = 2 * lambda + 1;

    // Complex-basis coefficients (real-valued in this phase convention).
    let mut complex_cg = vec![Complex64::new(0.0, 0.0); d1 * d2 * d3];
    for m1 in 0..d1 {
        for m2 in 0..d2 {
            for mu in 0..d3 {
                let value = clebsch_gordan(
                    l1 as i64,
                    m1 as i64 - l1 as i64,
                    l2 as i64,
                    m2 as i64 - l2 as i64,
                    lambda as i64,
                    mu as i64 - lambda as i64,
                    fact,
                );
                complex_cg[(m1 * d2 + m2) * d3 + mu] = Complex64::new(value, 0.0);
            }
        }
    }

    let u1 = &r2c[l1];
    let u2 = &r2c[l2];
    let u3 = &r2c[lambda];

    // T1[M1, m2, mu] = sum_m1 U1[M1, m1] C[m1, m2, mu]
    let mut t1 = vec![Complex64::new(0.0, 0.0); d1 * d2 * d3];
    for big_m1 in 0..d1 {
        for m1 in 0..d1 {
            let u = u1[big_m1 * d1 + m1];
            if u == Complex64::new(0.0, 0.0) {
                continue;
            }
            for rest in 0..d2 * d3 {
                t1[big_m1 * d2 * d3 + rest] += u * complex_cg[m1 * d2 * d3 + rest];
            }
        }
    }

    // T2[M1, M2, mu] = sum_m2 U2[M2, m2] T1[M1, m2, mu]
    let mut t2 = vec![Complex64::new(0.0, 0.0); d1 * d2 * d3];
    for big_m1 in 0..d1 {
        for big_m2 in 0..d2 {
            for m2 in 0..d2 {
                let u = u2[big_m2 * d2 + m2];
                if u == Complex64::new(0.0, 0.0) {
                    continue;
                }
                for mu in 0..d3 {
                    t2[(big_m1 * d2 + big_m2) * d3 + mu] += u * t1[(big_m1 * d2 + m2) * d3 + mu];
                }
            }
        }
    }

    // T3[M1, M2, Mu] = sum_mu conj(U3[Mu, mu]) T2[M1, M2, mu]
    let mut t3 = vec![Complex64::new(0.0, 0.0); d1 * d2 * d3];
    for pair in 0..d1 * d2 {
        for big_mu in 0..d3 {
            let mut acc = Complex64::new(0.0, 0.0);
            for mu in 0..d3 {
                acc += u3[big_mu * d3 + mu].conj() * t2[pair * d3 + mu];
            }
            t3[pair * d3 + big_mu] = acc;
        }
    }

    let even = (l1 + l2 + lambda) % 2 == 0;
    let values: Vec<f64> = t3.iter().map(|z| if even { z.re } else { z.im }).collect();
    DenseArray::from_vec_with_shape(values, &[d1, d2, d3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn test_triangle_condition_bounds_stored_triples() {
        let cg = CgCoefficients::new(2, CgRepresentation::Dense);
        assert!(cg.contains(1, 1, 0));
        assert!(cg.contains(1, 1, 1));
        assert!(cg.contains(1, 1, 2));
        assert!(!cg.contains(1, 1, 3));
        assert!(!cg.contains(0, 1, 0));
        // lambda capped at max_angular even where the triangle allows more
        assert!(!cg.contains(2, 2, 3));
    }

    #[test]
    fn test_invariant_coupling_is_diagonal() {
        // coupling (l, l) -> 0 is (-1)^l δ_{m1 m2} / sqrt(2l+1)
        let cg = CgCoefficients::new(2, CgRepresentation::Dense);
        for l in 0..=2usize {
            let array = cg.dense(l, l, 0).unwrap();
            let d = 2 * l + 1;
            let expected = if l % 2 == 0 { 1.0 } else { -1.0 } / (d as f64).sqrt();
            for m1 in 0..d {
                for m2 in 0..d {
                    let value = array.as_slice()[m1 * d + m2];
                    if m1 == m2 {
                        assert_relative_eq!(value, expected, max_relative = 1e-10);
                    } else {
                        assert_abs_diff_eq!(value, 0.0, epsilon = 1e-14);
                    }
                }
            }
        }
    }

    #[test]
    fn test_orthogonality_relations() {
        // both §-invariants: orthonormal columns per lambda, and the
        // resolution of identity over all lambda for fixed (l1, l2)
        let cg = CgCoefficients::new(5, CgRepresentation::Dense);
        for &(l1, l2) in &[(1usize, 2usize), (2, 3), (0, 5)] {
            let d1 = 2 * l1 + 1;
            let d2 = 2 * l2 + 1;
            let rows = d1 * d2;

            let mut identity = vec![0.0; rows * rows];
            for lambda in l1.abs_diff(l2)..=(l1 + l2) {
                let array = cg.dense(l1, l2, lambda).unwrap();
                let mat = array.as_slice();
                let cols = 2 * lambda + 1;

                // columns are orthonormal
                for mu in 0..cols {
                    for nu in 0..cols {
                        let mut dot = 0.0;
                        for row in 0..rows {
                            dot += mat[row * cols + mu] * mat[row * cols + nu];
                        }
                        let expected = if mu == nu { 1.0 } else { 0.0 };
                        assert_relative_eq!(dot, expected, epsilon = 1e-8, max_relative = 1e-5);
                    }
                }

                // accumulate the outer products for the identity check
                for row in 0..rows {
                    for col in 0..rows {
                        let mut dot = 0.0;
                        for mu in 0..cols {
                            dot += mat[row * cols + mu] * mat[col * cols + mu];
                        }
                        identity[row * rows + col] += dot;
                    }
                }
            }

            for row in 0..rows {
                for col in 0..rows {
                    let expected = if row == col { 1.0 } else { 0.0 };
                    assert_relative_eq!(
                        identity[row * rows + col],
                        expected,
                        epsilon = 1e-8,
                        max_relative = 1e-5
                    );
                }
            }
        }
    }

    #[test]
    fn test_sparse_matches_dense() {
        let dense = CgCoefficients::new(3, CgRepresentation::Dense);
        let sparse = CgCoefficients::new(3, CgRepresentation::Sparse);

        for (&(l1, l2, lambda), _) in dense.triples.iter() {
            let array = dense.dense(l1, l2, lambda).unwrap();
            let dims = array.dims();
            let mut rebuilt = vec![0.0; array.len()];
            for entry in sparse.sparse(l1, l2, lambda).unwrap() {
                rebuilt[(entry.m1 * dims[1] + entry.m2) * dims[2] + entry.mu] = entry.value;
            }
            for (a, b) in array.as_slice().iter().zip(&rebuilt) {
                assert_abs_diff_eq!(*a, *b, epsilon = CG_SPARSE_CUTOFF);
            }
        }
    }

    #[test]
    fn test_representation_accessors_disagree() {
        let dense = CgCoefficients::new(1, CgRepresentation::Dense);
        assert!(dense.sparse(1, 1, 1).is_err());

        let sparse = CgCoefficients::new(1, CgRepresentation::Sparse);
        assert!(sparse.dense(1, 1, 1).is_err());
    }

    #[test]
    fn test_cast_to_f32() {
        let cg = CgCoefficients::new(2, CgRepresentation::Dense);
        let cast = cg.cast::<f32>();
        let original = cg.dense(1, 1, 2).unwrap().as_slice().to_vec();
        let converted = cast.dense(1, 1, 2).unwrap().as_slice().to_vec();
        for (a, b) in original.iter().zip(&converted) {
            assert_abs_diff_eq!(*a as f32, *b, epsilon = 1e-7);
        }
    }
}
