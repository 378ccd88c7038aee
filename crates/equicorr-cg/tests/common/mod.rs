//! Shared helpers for the correlation integration tests: seeded random
//! densities, O(3) transformations of keyed tensors, and metadata/value
//! comparison.

// not every test binary uses every helper
#![allow(dead_code)]

use std::collections::HashMap;

use rand::Rng;

use equicorr_cg::{CgCoefficients, CgRepresentation};
use equicorr_core::{Block, BlockMap, DenseArray, Labels, LabelsBuilder};

/// Build a random correlation-order-1 density with the single-center key
/// schema: one block per `(o3_lambda, center_type)` with σ = +1, shared
/// samples per center type, and `n_properties` radial-like channels.
pub fn random_density<R: Rng>(
    rng: &mut R,
    max_l: usize,
    n_properties: usize,
    center_types: &[i32],
    atoms_per_center: usize,
) -> BlockMap<f64> {
    let mut keys = LabelsBuilder::new(&["o3_lambda", "o3_sigma", "center_type"]);
    let mut blocks = Vec::new();

    for (c, &center) in center_types.iter().enumerate() {
        let mut samples = LabelsBuilder::new(&["system", "atom"]);
        for a in 0..atoms_per_center {
            samples.add(&[0, (c * atoms_per_center + a) as i32]);
        }
        let samples = samples.finish().unwrap();

        for l in 0..=max_l {
            keys.add(&[l as i32, 1, center]);

            let d = 2 * l + 1;
            let values: Vec<f64> = (0..atoms_per_center * d * n_properties)
                .map(|_| rng.random::<f64>() - 0.5)
                .collect();

            blocks.push(
                Block::new(
                    DenseArray::from_vec_with_shape(values, &[atoms_per_center, d, n_properties]),
                    samples.clone(),
                    vec![Labels::component_range("o3_mu", l as i32)],
                    Labels::new(&["n"], (0..n_properties as i32).collect()).unwrap(),
                )
                .unwrap(),
            );
        }
    }

    BlockMap::new(keys.finish().unwrap(), blocks).unwrap()
}

/// A random proper rotation from the Rodrigues formula.
pub fn random_rotation<R: Rng>(rng: &mut R) -> [[f64; 3]; 3] {
    let mut axis = [
        rng.random::<f64>() - 0.5,
        rng.random::<f64>() - 0.5,
        rng.random::<f64>() - 0.5,
    ];
    let norm = axis.iter().map(|x| x * x).sum::<f64>().sqrt();
    for x in &mut axis {
        *x /= norm;
    }
    let theta = rng.random::<f64>() * std::f64::consts::PI;
    let (sin, cos) = theta.sin_cos();

    let mut rotation = [[0.0; 3]; 3];
    let cross = [
        [0.0, -axis[2], axis[1]],
        [axis[2], 0.0, -axis[0]],
        [-axis[1], axis[0], 0.0],
    ];
    for i in 0..3 {
        for j in 0..3 {
            let identity = if i == j { 1.0 } else { 0.0 };
            rotation[i][j] =
                cos * identity + sin * cross[i][j] + (1.0 - cos) * axis[i] * axis[j];
        }
    }
    rotation
}

/// Real Wigner matrices `D^λ` for one rotation, for every λ up to `max_l`.
///
/// `D^1` is the rotation matrix conjugated into the real-harmonic
/// component order `(y, z, x)`; higher orders are lifted recursively
/// through the coupling coefficients, `D^λ = Cᵀ (D^1 ⊗ D^{λ-1}) C`.
pub struct WignerD {
    matrices: Vec<Vec<f64>>,
}

impl WignerD {
    pub fn new(rotation: &[[f64; 3]; 3], max_l: usize) -> WignerD {
        let mut matrices = vec![vec![1.0]];
        if max_l == 0 {
            return WignerD { matrices };
        }

        let perm = [1usize, 2, 0]; // (x, y, z) -> (y, z, x)
        let mut d1 = vec![0.0; 9];
        for i in 0..3 {
            for j in 0..3 {
                d1[i * 3 + j] = rotation[perm[i]][perm[j]];
            }
        }
        matrices.push(d1.clone());

        let cg = CgCoefficients::new(max_l, CgRepresentation::Dense);
        for l in 2..=max_l {
            let coupling = cg.dense(1, l - 1, l).unwrap();
            let c = coupling.as_slice(); // (3, 2l-1, 2l+1) row-major
            let d_prev = &matrices[l - 1];
            let (d2, d3) = (2 * l - 1, 2 * l + 1);

            // T[m1, m2, Nu] = sum_{n1, n2} D1[m1, n1] Dprev[m2, n2] C[n1, n2, Nu]
            let mut t = vec![0.0; 3 * d2 * d3];
            for m1 in 0..3 {
                for m2 in 0..d2 {
                    for n1 in 0..3 {
                        for n2 in 0..d2 {
                            let factor = d1[m1 * 3 + n1] * d_prev[m2 * d2 + n2];
                            if factor == 0.0 {
                                continue;
                            }
                            for nu in 0..d3 {
                                t[(m1 * d2 + m2) * d3 + nu] += factor * c[(n1 * d2 + n2) * d3 + nu];
                            }
                        }
                    }
                }
            }

            // D[Mu, Nu] = sum_{m1, m2} C[m1, m2, Mu] T[m1, m2, Nu]
            let mut d = vec![0.0; d3 * d3];
            for m1 in 0..3 {
                for m2 in 0..d2 {
                    for mu in 0..d3 {
                        let coupling_value = c[(m1 * d2 + m2) * d3 + mu];
                        if coupling_value == 0.0 {
                            continue;
                        }
                        for nu in 0..d3 {
                            d[mu * d3 + nu] += coupling_value * t[(m1 * d2 + m2) * d3 + nu];
                        }
                    }
                }
            }

            matrices.push(d);
        }

        WignerD { matrices }
    }

    pub fn matrix(&self, l: usize) -> &[f64] {
        &self.matrices[l]
    }
}

/// Apply a rotation to every block of a keyed tensor: each block with
/// angular order λ is transformed by `D^λ` on its component axis.
pub fn transform_so3(tensor: &BlockMap<f64>, wigner: &WignerD) -> BlockMap<f64> {
    transform(tensor, |lambda, _sigma| {
        wigner.matrix(lambda).to_vec()
    })
}

/// Apply a rotation combined with spatial inversion: on top of `D^λ`,
/// every block picks up its parity factor `σ · (-1)^λ`.
pub fn transform_o3(tensor: &BlockMap<f64>, wigner: &WignerD) -> BlockMap<f64> {
    transform(tensor, |lambda, sigma| {
        let parity = sigma as f64 * if lambda % 2 == 0 { 1.0 } else { -1.0 };
        wigner.matrix(lambda).iter().map(|&x| parity * x).collect()
    })
}

fn transform(
    tensor: &BlockMap<f64>,
    matrix_for: impl Fn(usize, i32) -> Vec<f64>,
) -> BlockMap<f64> {
    let lambda_idx = tensor.keys().index_of("o3_lambda").unwrap();
    let sigma_idx = tensor.keys().index_of("o3_sigma").unwrap();

    let blocks = tensor
        .iter()
        .map(|(key, block)| {
            let lambda = key[lambda_idx] as usize;
            let sigma = key[sigma_idx];
            let matrix = matrix_for(lambda, sigma);

            let dims = block.values().dims();
            let (n_samples, d, n_properties) = (dims[0], dims[1], dims[2]);
            assert_eq!(d, 2 * lambda + 1);

            let values = block.values().as_slice();
            let mut transformed = vec![0.0; values.len()];
            for s in 0..n_samples {
                for mu in 0..d {
                    for nu in 0..d {
                        let weight = matrix[mu * d + nu];
                        if weight == 0.0 {
                            continue;
                        }
                        let src = &values[(s * d + nu) * n_properties..][..n_properties];
                        let dst = &mut transformed[(s * d + mu) * n_properties..][..n_properties];
                        for (o, &v) in dst.iter_mut().zip(src) {
                            *o += weight * v;
                        }
                    }
                }
            }

            Block::new(
                DenseArray::from_vec_with_shape(transformed, &dims),
                block.samples().clone(),
                block.components().to_vec(),
                block.properties().clone(),
            )
            .unwrap()
        })
        .collect();

    BlockMap::new(tensor.keys().clone(), blocks).unwrap()
}

/// Summed squared norm of every block value, grouped by `(system, atom)`
/// sample.
pub fn norms_per_sample(tensor: &BlockMap<f64>) -> HashMap<Vec<i32>, f64> {
    let mut norms = HashMap::new();
    for (_, block) in tensor.iter() {
        let dims = block.values().dims();
        let per_sample: usize = dims[1..].iter().product();
        let values = block.values().as_slice();
        for (s, sample) in block.samples().iter().enumerate() {
            let sum: f64 = values[s * per_sample..(s + 1) * per_sample]
                .iter()
                .map(|v| v * v)
                .sum();
            *norms.entry(sample.to_vec()).or_insert(0.0) += sum;
        }
    }
    norms
}

/// Assert that two tensors have identical keys and block metadata.
pub fn assert_equal_metadata(a: &BlockMap<f64>, b: &BlockMap<f64>) {
    assert_eq!(a.keys(), b.keys(), "keys differ");
    for ((key, block_a), (_, block_b)) in a.iter().zip(b.iter()) {
        block_a
            .check_same_metadata(block_b)
            .unwrap_or_else(|e| panic!("block metadata differs for key {key:?}: {e}"));
    }
}

/// Assert that two tensors are equal in metadata and in values, within
/// `atol`.
pub fn assert_allclose(a: &BlockMap<f64>, b: &BlockMap<f64>, atol: f64) {
    assert_equal_metadata(a, b);
    for ((key, block_a), (_, block_b)) in a.iter().zip(b.iter()) {
        let xs = block_a.values().as_slice();
        let ys = block_b.values().as_slice();
        for (i, (x, y)) in xs.iter().zip(ys).enumerate() {
            assert!(
                (x - y).abs() <= atol,
                "values differ for key {key:?} at flat index {i}: {x} vs {y}",
            );
        }
    }
}
