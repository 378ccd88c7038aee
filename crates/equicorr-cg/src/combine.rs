//! Per-pair CG tensor products.
//!
//! A combiner takes two blocks with identical sample sets and couples them
//! into one output block per requested angular order λ:
//!
//! ```text
//! out[s, μ, (p1, p2)] = Σ_{m1, m2} C^{λμ}_{l1 m1, l2 m2} · A[s, m1, p1] · B[s, m2, p2]
//! ```
//!
//! Three strategies implement the same [`Combine`] interface: a dense one
//! (batched GEMM against the full coefficient matrix), a sparse one
//! (accumulation over the stored non-zero coefficients), and a
//! metadata-only one (exact output structure, no numeric work). The two
//! numeric strategies produce identical results up to floating-point
//! noise, and all three agree exactly on metadata and on the error
//! conditions they raise.

use equicorr_core::{Block, DenseArray, Labels, LabelsBuilder, Scalar};

use crate::coefficients::CgCoefficients;
use crate::error::{CgError, Result};

/// Strategy interface for the per-pair CG tensor product.
///
/// `new_order` is the correlation order of the output blocks; it only
/// affects the naming of the second factor's property dimensions.
pub trait Combine<T: Scalar> {
    fn combine(
        &self,
        first: &Block<T>,
        second: &Block<T>,
        o3_lambdas: &[usize],
        coefficients: &CgCoefficients<T>,
        new_order: usize,
    ) -> Result<Vec<Block<T>>>;
}

/// Dense contraction: materialize the sample-wise outer product and
/// contract it against the flattened coefficient matrix in one GEMM per λ.
pub struct DenseCombiner;

/// Sparse accumulation over the non-zero `(m1, m2, μ)` coefficient
/// entries.
pub struct SparseCombiner;

/// Metadata-only: output blocks have the exact structure of a numeric
/// combination, with zero-filled values.
pub struct MetadataCombiner;

impl<T: Scalar> Combine<T> for DenseCombiner {
    fn combine(
        &self,
        first: &Block<T>,
        second: &Block<T>,
        o3_lambdas: &[usize],
        coefficients: &CgCoefficients<T>,
        new_order: usize,
    ) -> Result<Vec<Block<T>>> {
        let shapes = PairShapes::validate(first, second)?;
        let a = first.values().as_slice();
        let b = second.values().as_slice();

        let PairShapes {
            n_samples,
            d1,
            d2,
            p1,
            p2,
        } = shapes;
        let (l1, l2) = ((d1 - 1) / 2, (d2 - 1) / 2);
        let n_properties = p1 * p2;
        let n_coupled = d1 * d2;

        // outer[s, p, m] with p = (p1, p2) and m = (m1, m2), so that each
        // target λ is a single (S·P × M) @ (M × 2λ+1) product
        let mut outer = vec![T::zero(); n_samples * n_properties * n_coupled];
        for s in 0..n_samples {
            for m1 in 0..d1 {
                for i1 in 0..p1 {
                    let a_value = a[(s * d1 + m1) * p1 + i1];
                    if a_value == T::zero() {
                        continue;
                    }
                    for m2 in 0..d2 {
                        let b_row = &b[(s * d2 + m2) * p2..(s * d2 + m2 + 1) * p2];
                        for (i2, &b_value) in b_row.iter().enumerate() {
                            let p = i1 * p2 + i2;
                            let m = m1 * d2 + m2;
                            outer[(s * n_properties + p) * n_coupled + m] = a_value * b_value;
                        }
                    }
                }
            }
        }

        let mut blocks = Vec::with_capacity(o3_lambdas.len());
        for &lambda in o3_lambdas {
            let cg = coefficients.dense(l1, l2, lambda)?;
            let d3 = 2 * lambda + 1;
            let flat = gemm(&outer, cg.as_slice(), n_samples * n_properties, n_coupled, d3);

            // rearrange (s, p, μ) to the block layout (s, μ, p)
            let mut values = vec![T::zero(); n_samples * d3 * n_properties];
            for s in 0..n_samples {
                for p in 0..n_properties {
                    for mu in 0..d3 {
                        values[(s * d3 + mu) * n_properties + p] =
                            flat[(s * n_properties + p) * d3 + mu];
                    }
                }
            }

            blocks.push(output_block(first, second, lambda, new_order, values)?);
        }

        Ok(blocks)
    }
}

impl<T: Scalar> Combine<T> for SparseCombiner {
    fn combine(
        &self,
        first: &Block<T>,
        second: &Block<T>,
        o3_lambdas: &[usize],
        coefficients: &CgCoefficients<T>,
        new_order: usize,
    ) -> Result<Vec<Block<T>>> {
        let shapes = PairShapes::validate(first, second)?;
        let a = first.values().as_slice();
        let b = second.values().as_slice();

        let PairShapes {
            n_samples,
            d1,
            d2,
            p1,
            p2,
        } = shapes;
        let (l1, l2) = ((d1 - 1) / 2, (d2 - 1) / 2);
        let n_properties = p1 * p2;

        let mut blocks = Vec::with_capacity(o3_lambdas.len());
        for &lambda in o3_lambdas {
            let d3 = 2 * lambda + 1;
            let mut values = vec![T::zero(); n_samples * d3 * n_properties];

            for entry in coefficients.sparse(l1, l2, lambda)? {
                for s in 0..n_samples {
                    let a_row = &a[(s * d1 + entry.m1) * p1..(s * d1 + entry.m1 + 1) * p1];
                    let b_row = &b[(s * d2 + entry.m2) * p2..(s * d2 + entry.m2 + 1) * p2];
                    let out_base = (s * d3 + entry.mu) * n_properties;
                    for (i1, &a_value) in a_row.iter().enumerate() {
                        let scaled = entry.value * a_value;
                        let out = &mut values[out_base + i1 * p2..out_base + (i1 + 1) * p2];
                        for (o, &b_value) in out.iter_mut().zip(b_row) {
                            *o += scaled * b_value;
                        }
                    }
                }
            }

            blocks.push(output_block(first, second, lambda, new_order, values)?);
        }

        Ok(blocks)
    }
}

impl<T: Scalar> Combine<T> for MetadataCombiner {
    fn combine(
        &self,
        first: &Block<T>,
        second: &Block<T>,
        o3_lambdas: &[usize],
        _coefficients: &CgCoefficients<T>,
        new_order: usize,
    ) -> Result<Vec<Block<T>>> {
        let shapes = PairShapes::validate(first, second)?;
        let n_properties = shapes.p1 * shapes.p2;

        let mut blocks = Vec::with_capacity(o3_lambdas.len());
        for &lambda in o3_lambdas {
            let d3 = 2 * lambda + 1;
            let values = vec![T::zero(); shapes.n_samples * d3 * n_properties];
            blocks.push(output_block(first, second, lambda, new_order, values)?);
        }

        Ok(blocks)
    }
}

/// Validated dimensions of a block pair.
struct PairShapes {
    n_samples: usize,
    d1: usize,
    d2: usize,
    p1: usize,
    p2: usize,
}

impl PairShapes {
    /// Check the combination preconditions, identically for every
    /// strategy: no gradients, a single `o3_mu`-style component axis on
    /// both blocks, and identical sample sets.
    fn validate<T: Scalar>(first: &Block<T>, second: &Block<T>) -> Result<PairShapes> {
        if first.has_gradients() || second.has_gradients() {
            return Err(CgError::Unsupported(
                "Clebsch-Gordan combination of gradients is not implemented; remove \
                 gradients from the input density"
                    .into(),
            ));
        }

        for block in [first, second] {
            if block.components().len() != 1 {
                return Err(CgError::Schema(format!(
                    "blocks to combine must have a single component axis, got {}",
                    block.components().len(),
                )));
            }
            if block.components()[0].count() % 2 != 1 {
                return Err(CgError::Schema(format!(
                    "component axis length {} is not 2λ+1 for any λ",
                    block.components()[0].count(),
                )));
            }
        }

        if first.samples() != second.samples() {
            return Err(CgError::Shape(
                "blocks to combine must have identical sample sets (same entries, \
                 same order)"
                    .into(),
            ));
        }

        Ok(PairShapes {
            n_samples: first.samples().count(),
            d1: first.components()[0].count(),
            d2: second.components()[0].count(),
            p1: first.properties().count(),
            p2: second.properties().count(),
        })
    }
}

/// Assemble the output block for one λ from flat `[s, μ, p]` values.
fn output_block<T: Scalar>(
    first: &Block<T>,
    second: &Block<T>,
    lambda: usize,
    new_order: usize,
    values: Vec<T>,
) -> Result<Block<T>> {
    let properties = output_properties(first, second, new_order)?;
    let components = vec![Labels::component_range("o3_mu", lambda as i32)];
    let dims = [
        first.samples().count(),
        2 * lambda + 1,
        properties.count(),
    ];

    Ok(Block::new(
        DenseArray::from_vec_with_shape(values, &dims),
        first.samples().clone(),
        components,
        properties,
    )?)
}

/// Cross product of the two property sets, first-factor major.
///
/// The second factor is always the order-1 density, whose property names
/// carry a `_1` suffix from key standardization; that suffix is rewritten
/// to the new correlation order so names stay unique at every order.
fn output_properties<T: Scalar>(
    first: &Block<T>,
    second: &Block<T>,
    new_order: usize,
) -> Result<Labels> {
    let mut names: Vec<String> = first.properties().names().iter().map(|s| s.to_string()).collect();
    for name in second.properties().names() {
        let base = name.strip_suffix("_1").unwrap_or(name);
        names.push(format!("{base}_{new_order}"));
    }

    let mut properties = LabelsBuilder::new(&names);
    for entry_1 in first.properties().iter() {
        for entry_2 in second.properties().iter() {
            let mut row = entry_1.to_vec();
            row.extend_from_slice(entry_2);
            properties.add(&row);
        }
    }
    Ok(properties.finish()?)
}

/// Row-major GEMM `C[m, n] = A[m, k] @ B[k, n]` through faer.
fn gemm<T: Scalar>(a: &[T], b: &[T], m: usize, k: usize, n: usize) -> Vec<T> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);

    let a_mat = unsafe { faer::MatRef::from_raw_parts(a.as_ptr(), m, k, k as isize, 1) };
    let b_mat = unsafe { faer::MatRef::from_raw_parts(b.as_ptr(), k, n, n as isize, 1) };

    let mut c = vec![T::zero(); m * n];
    let mut c_mat =
        unsafe { faer::MatMut::from_raw_parts_mut(c.as_mut_ptr(), m, n, n as isize, 1) };

    faer::linalg::matmul::matmul(
        &mut c_mat,
        faer::Accum::Replace,
        a_mat,
        b_mat,
        T::one(),
        faer::Par::Seq,
    );

    c
}
