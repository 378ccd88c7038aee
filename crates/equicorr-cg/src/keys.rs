//! Key algebra for iterative CG tensor products.
//!
//! Given the keys of the running correlation and the keys of the base
//! density, this module decides which key pairs combine, which output
//! angular orders each pair produces, and what the resulting key set looks
//! like, including the `l_i` / `k_i` bookkeeping fields that record the
//! coupling history of every block.

use equicorr_core::{Block, BlockMap, Labels, LabelsBuilder, Scalar};

use crate::error::{CgError, Result};

/// Key schema of a single-center density.
pub const KEYS_SINGLE_CENTER: [&str; 3] = ["o3_lambda", "o3_sigma", "center_type"];

/// Key schema of a two-center (pair) density.
pub const KEYS_TWO_CENTER: [&str; 4] = ["o3_lambda", "o3_sigma", "center_type", "neighbor_type"];

/// One planned combination: the block at `first` in the running tensor is
/// coupled with the block at `second` in the base density, producing one
/// output block per entry of `o3_lambdas`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    pub first: usize,
    pub second: usize,
    pub o3_lambdas: Vec<usize>,
}

/// Bring a correlation-order-1 density to the standardized metadata used
/// by the iteration loop.
///
/// - validates that the keys match one of the two recognized schemas;
/// - moves `neighbor_type` (when present) into block properties;
/// - prepends an `order_nu = 1` key field and appends `l_1 = o3_lambda`;
/// - suffixes all property names with `_1`.
pub fn standardize_keys<T: Scalar>(density: &BlockMap<T>) -> Result<BlockMap<T>> {
    let names = density.keys().names();
    let density = if names == KEYS_SINGLE_CENTER {
        density.clone()
    } else if names == KEYS_TWO_CENTER {
        density.keys_to_properties(&["neighbor_type"])?
    } else {
        return Err(CgError::Schema(format!(
            "input density must have key names {KEYS_SINGLE_CENTER:?} or {KEYS_TWO_CENTER:?}, \
             got {names:?}",
        )));
    };

    let mut keys = LabelsBuilder::new(&[
        "order_nu",
        "o3_lambda",
        "o3_sigma",
        "center_type",
        "l_1",
    ]);
    for key in density.keys().iter() {
        let (lambda, sigma, center) = (key[0], key[1], key[2]);
        keys.add(&[1, lambda, sigma, center, lambda]);
    }

    let blocks = density
        .blocks()
        .iter()
        .map(|block| {
            let properties = block
                .properties()
                .rename_all(|name| format!("{name}_1"))?;
            Block::new(
                block.values().clone(),
                block.samples().clone(),
                block.components().to_vec(),
                properties,
            )
        })
        .collect::<equicorr_core::Result<Vec<_>>>()?;

    Ok(BlockMap::new(keys.finish()?, blocks)?)
}

/// Number of `l_i` history fields in a standardized key set, i.e. the
/// correlation order of the tensor it belongs to.
fn correlation_order_of(keys: &Labels) -> usize {
    keys.names()
        .iter()
        .filter(|name| name.starts_with("l_"))
        .count()
}

/// Build the combination plan for one iteration.
///
/// `current` are the keys of the running correlation (order ν), `density`
/// the standardized base density keys (order 1). Returns the output key
/// set (order ν+1) and the planned combinations, in matching order: the
/// i-th output key corresponds to the i-th block produced by walking the
/// combinations and their `o3_lambdas` in order.
///
/// With `skip_redundant`, only combinations whose extended `l_1 … l_{ν+1}`
/// history is sorted non-decreasing are kept: one canonical
/// representative per multiset of coupled orders. This prunes numerically
/// redundant blocks but changes the result, since the pruned tensor is
/// not a reordering of the full one.
pub fn precompute_keys(
    current: &Labels,
    density: &Labels,
    selection: Option<&Labels>,
    skip_redundant: bool,
) -> Result<(Labels, Vec<Combination>)> {
    let nu = correlation_order_of(current);
    let new_order = nu + 1;

    let cur_lambda = current.index_of("o3_lambda")?;
    let cur_sigma = current.index_of("o3_sigma")?;
    let cur_center = current.index_of("center_type")?;
    let cur_l: Vec<usize> = (1..=nu)
        .map(|i| current.index_of(&format!("l_{i}")))
        .collect::<equicorr_core::Result<_>>()?;
    let cur_k: Vec<usize> = (2..nu)
        .map(|i| current.index_of(&format!("k_{i}")))
        .collect::<equicorr_core::Result<_>>()?;

    let den_lambda = density.index_of("o3_lambda")?;
    let den_sigma = density.index_of("o3_sigma")?;
    let den_center = density.index_of("center_type")?;

    let selection = selection.map(parse_selection).transpose()?;

    let mut names: Vec<String> = vec![
        "order_nu".into(),
        "o3_lambda".into(),
        "o3_sigma".into(),
        "center_type".into(),
    ];
    names.extend((1..=new_order).map(|i| format!("l_{i}")));
    names.extend((2..new_order).map(|i| format!("k_{i}")));

    let mut keys = LabelsBuilder::new(&names);
    let mut combinations = Vec::new();

    for (first, key_1) in current.iter().enumerate() {
        for (second, key_2) in density.iter().enumerate() {
            if key_1[cur_center] != key_2[den_center] {
                continue;
            }

            let l1 = key_1[cur_lambda] as usize;
            let l2 = key_2[den_lambda] as usize;
            let sigma_product = key_1[cur_sigma] * key_2[den_sigma];

            let mut l_history: Vec<i32> = cur_l.iter().map(|&i| key_1[i]).collect();
            l_history.push(l2 as i32);
            if skip_redundant && l_history.windows(2).any(|w| w[0] > w[1]) {
                continue;
            }

            let mut k_history: Vec<i32> = cur_k.iter().map(|&i| key_1[i]).collect();
            if nu >= 2 {
                k_history.push(l1 as i32);
            }

            let mut o3_lambdas = Vec::new();
            for lambda in l1.abs_diff(l2)..=(l1 + l2) {
                // coupling to a pseudotensor flips the parity
                let parity_sign = if (l1 + l2 + lambda) % 2 == 0 { 1 } else { -1 };
                let sigma = sigma_product * parity_sign;

                if let Some((lambdas_only, with_sigma)) = &selection {
                    let selected = if let Some(pairs) = with_sigma {
                        pairs.contains(&(lambda as i32, sigma))
                    } else {
                        lambdas_only.contains(&(lambda as i32))
                    };
                    if !selected {
                        continue;
                    }
                }

                let mut key = vec![
                    new_order as i32,
                    lambda as i32,
                    sigma,
                    key_1[cur_center],
                ];
                key.extend_from_slice(&l_history);
                key.extend_from_slice(&k_history);
                keys.add(&key);
                o3_lambdas.push(lambda);
            }

            if !o3_lambdas.is_empty() {
                combinations.push(Combination {
                    first,
                    second,
                    o3_lambdas,
                });
            }
        }
    }

    if keys.count() == 0 {
        return Err(CgError::Configuration(
            "this iteration produces no valid combinations; check the angular cutoff and \
             key selections"
                .into(),
        ));
    }

    Ok((keys.finish()?, combinations))
}

/// Split a selection into its λ set and, when present, its (λ, σ) pairs.
#[allow(clippy::type_complexity)]
fn parse_selection(selection: &Labels) -> Result<(Vec<i32>, Option<Vec<(i32, i32)>>)> {
    let names = selection.names();
    if names == ["o3_lambda"] {
        Ok((selection.column("o3_lambda")?, None))
    } else if names == ["o3_lambda", "o3_sigma"] {
        let pairs = selection.iter().map(|e| (e[0], e[1])).collect();
        Ok((Vec::new(), Some(pairs)))
    } else {
        Err(CgError::Configuration(format!(
            "key selections may only name o3_lambda and o3_sigma, got {names:?}",
        )))
    }
}

/// Largest `o3_lambda` value in a key set.
pub fn max_angular_of(keys: &Labels) -> Result<usize> {
    let column = keys.column("o3_lambda")?;
    Ok(column.into_iter().max().unwrap_or(0).max(0) as usize)
}

/// Validate the input tensor against the recognized schemas and reject
/// gradient-bearing input.
pub fn validate_density<T: Scalar>(density: &BlockMap<T>) -> Result<()> {
    let names = density.keys().names();
    if names != KEYS_SINGLE_CENTER && names != KEYS_TWO_CENTER {
        return Err(CgError::Schema(format!(
            "input density must have key names {KEYS_SINGLE_CENTER:?} or {KEYS_TWO_CENTER:?}, \
             got {names:?}",
        )));
    }

    let components = density.component_names()?;
    if components != ["o3_mu"] {
        return Err(CgError::Schema(format!(
            "input density must have a single component axis named \"o3_mu\", got {components:?}",
        )));
    }

    for (key, block) in density.iter() {
        let lambda = key[0];
        let expected = 2 * lambda + 1;
        let actual = block.components()[0].count() as i32;
        if actual != expected {
            return Err(CgError::Schema(format!(
                "block for o3_lambda={lambda} has {actual} o3_mu components, expected {expected}",
            )));
        }
    }

    if density.has_gradients() {
        return Err(CgError::Unsupported(
            "Clebsch-Gordan combination of gradients is not implemented; remove gradients \
             from the input density"
                .into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standardized_keys(entries: &[[i32; 2]]) -> Labels {
        // (o3_lambda, o3_sigma) entries for a single H center
        let mut keys = LabelsBuilder::new(&[
            "order_nu",
            "o3_lambda",
            "o3_sigma",
            "center_type",
            "l_1",
        ]);
        for &[lambda, sigma] in entries {
            keys.add(&[1, lambda, sigma, 1, lambda]);
        }
        keys.finish().unwrap()
    }

    #[test]
    fn test_plan_for_l0_l1_density() {
        // the §-example scenario: density with l=0 and l=1 blocks
        let density = standardized_keys(&[[0, 1], [1, 1]]);
        let (keys, combinations) = precompute_keys(&density, &density, None, false).unwrap();

        // pairs: (0,0)->λ0, (0,1)->λ1, (1,0)->λ1, (1,1)->λ{0,1,2}
        assert_eq!(combinations.len(), 4);
        assert_eq!(keys.count(), 6);

        assert_eq!(
            keys.names(),
            vec![
                "order_nu",
                "o3_lambda",
                "o3_sigma",
                "center_type",
                "l_1",
                "l_2"
            ]
        );

        // (l1=1, l2=1, λ=1) couples to a pseudotensor: σ = -1
        assert!(keys.contains(&[2, 0, 1, 1, 0, 0]));
        assert!(keys.contains(&[2, 1, 1, 1, 0, 1]));
        assert!(keys.contains(&[2, 1, 1, 1, 1, 0]));
        assert!(keys.contains(&[2, 0, 1, 1, 1, 1]));
        assert!(keys.contains(&[2, 1, -1, 1, 1, 1]));
        assert!(keys.contains(&[2, 2, 1, 1, 1, 1]));
    }

    #[test]
    fn test_center_types_do_not_mix() {
        let mut builder = LabelsBuilder::new(&[
            "order_nu",
            "o3_lambda",
            "o3_sigma",
            "center_type",
            "l_1",
        ]);
        builder.add(&[1, 0, 1, 1, 0]);
        builder.add(&[1, 0, 1, 8, 0]);
        let keys = builder.finish().unwrap();

        let (new_keys, combinations) = precompute_keys(&keys, &keys, None, false).unwrap();
        assert_eq!(combinations.len(), 2);
        assert_eq!(new_keys.count(), 2);
        let centers = new_keys.column("center_type").unwrap();
        assert_eq!(centers, vec![1, 8]);
    }

    #[test]
    fn test_skip_redundant_keeps_sorted_histories() {
        let density = standardized_keys(&[[0, 1], [1, 1], [2, 1]]);
        let (keys, _) = precompute_keys(&density, &density, None, true).unwrap();

        for key in keys.iter() {
            let (l_1, l_2) = (key[4], key[5]);
            assert!(l_1 <= l_2, "unsorted history ({l_1}, {l_2}) survived");
        }

        // the (2, 1) pair is pruned, the (1, 2) pair is kept
        assert!(keys.contains(&[2, 1, 1, 1, 1, 2]));
        assert!(!keys.contains(&[2, 1, 1, 1, 2, 1]));
    }

    #[test]
    fn test_lambda_selection() {
        let density = standardized_keys(&[[0, 1], [1, 1]]);
        let selection = Labels::new(&["o3_lambda"], vec![2]).unwrap();
        let (keys, combinations) =
            precompute_keys(&density, &density, Some(&selection), false).unwrap();

        assert_eq!(keys.count(), 1);
        assert!(keys.contains(&[2, 2, 1, 1, 1, 1]));
        assert_eq!(combinations.len(), 1);
        assert_eq!(combinations[0].o3_lambdas, vec![2]);
    }

    #[test]
    fn test_lambda_sigma_selection() {
        let density = standardized_keys(&[[1, 1]]);
        let selection = Labels::new(&["o3_lambda", "o3_sigma"], vec![1, -1]).unwrap();
        let (keys, _) = precompute_keys(&density, &density, Some(&selection), false).unwrap();

        assert_eq!(keys.count(), 1);
        assert!(keys.contains(&[2, 1, -1, 1, 1, 1]));
    }

    #[test]
    fn test_empty_selection_is_a_configuration_error() {
        let density = standardized_keys(&[[0, 1]]);
        let selection = Labels::new(&["o3_lambda"], vec![5]).unwrap();
        let result = precompute_keys(&density, &density, Some(&selection), false);
        assert!(matches!(result, Err(CgError::Configuration(_))));
    }

    #[test]
    fn test_second_iteration_records_k_history() {
        let density = standardized_keys(&[[1, 1]]);
        let (keys_2, _) = precompute_keys(&density, &density, None, false).unwrap();
        let (keys_3, _) = precompute_keys(&keys_2, &density, None, false).unwrap();

        assert_eq!(
            keys_3.names(),
            vec![
                "order_nu",
                "o3_lambda",
                "o3_sigma",
                "center_type",
                "l_1",
                "l_2",
                "l_3",
                "k_2"
            ]
        );
        // the intermediate coupled order of each order-2 parent is recorded
        for k in keys_3.column("k_2").unwrap() {
            assert!((0..=2).contains(&k));
        }
    }
}
