//! Iterative density correlations.
//!
//! [`DensityCorrelations`] takes iterative CG tensor products of a
//! correlation-order-1 density descriptor with itself, producing one
//! output tensor per selected iteration. Configuration is validated
//! eagerly at construction; the driver itself is immutable and can be
//! reused (and shared read-only across threads) for any number of inputs.

use equicorr_core::{BlockMap, Labels, Scalar};

use crate::coefficients::{CgCoefficients, CgRepresentation};
use crate::combine::{Combine, DenseCombiner, MetadataCombiner, SparseCombiner};
use crate::error::{CgError, Result};
use crate::keys;

/// Numeric backend for the per-pair combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CgBackend {
    /// Batched dense contraction against full coefficient arrays.
    Dense,
    /// Accumulation over sparse coefficient entries.
    Sparse,
    /// Pick automatically: sparse, unless a batched-dense device backend
    /// is active. With the CPU GEMM backend used here, this resolves to
    /// sparse.
    #[default]
    Auto,
}

/// Angular/parity key selection, per iteration.
#[derive(Debug, Clone)]
pub enum SelectedKeys {
    /// Apply one selection to the final iteration only.
    Final(Labels),
    /// One optional selection per iteration, in iteration order.
    PerIteration(Vec<Option<Labels>>),
}

/// A boolean flag applied per iteration.
#[derive(Debug, Clone)]
pub enum IterationFilter {
    /// The same value for every iteration.
    All(bool),
    /// One value per iteration, in iteration order.
    PerIteration(Vec<bool>),
}

/// Configuration for [`DensityCorrelations`].
///
/// All fields are validated by [`DensityCorrelations::new`]; invalid or
/// mutually inconsistent combinations are rejected there, never at
/// compute time.
#[derive(Debug, Clone)]
pub struct CorrelationOptions {
    /// Maximum angular order for which coupling coefficients are computed
    /// and stored. Must cover the largest order reached by any iteration.
    pub max_angular: usize,
    /// Correlation order of the final output; must be greater than 1.
    pub correlation_order: usize,
    /// Optional global ceiling on the angular orders produced at every
    /// iteration (inclusive).
    pub angular_cutoff: Option<usize>,
    /// Optional angular/parity selections; labels may only name
    /// `o3_lambda` and `o3_sigma`.
    pub selected_keys: Option<SelectedKeys>,
    /// Skip combinations that duplicate an already-produced coupling
    /// history. This changes the numeric result (fewer, non-duplicate
    /// terms), it is not a pure optimization.
    pub skip_redundant: IterationFilter,
    /// Which iterations contribute an output tensor; `None` selects the
    /// final iteration only.
    pub output_selection: Option<IterationFilter>,
    /// Numeric representation of the coefficient cache.
    pub backend: CgBackend,
}

impl Default for CorrelationOptions {
    fn default() -> CorrelationOptions {
        CorrelationOptions {
            max_angular: 0,
            correlation_order: 2,
            angular_cutoff: None,
            selected_keys: None,
            skip_redundant: IterationFilter::All(false),
            output_selection: None,
            backend: CgBackend::Auto,
        }
    }
}

/// Iterative CG tensor products of a density descriptor with itself.
#[derive(Debug, Clone)]
pub struct DensityCorrelations {
    max_angular: usize,
    correlation_order: usize,
    selected_keys: Vec<Option<Labels>>,
    skip_redundant: Vec<bool>,
    output_selection: Vec<bool>,
    backend: CgBackend,
    coefficients: CgCoefficients<f64>,
}

impl DensityCorrelations {
    /// Validate the options and build the coefficient cache.
    pub fn new(options: CorrelationOptions) -> Result<DensityCorrelations> {
        if options.correlation_order <= 1 {
            return Err(CgError::Configuration(format!(
                "correlation_order must be > 1, got {}",
                options.correlation_order,
            )));
        }
        let n_iterations = options.correlation_order - 1;

        let mut selected_keys: Vec<Option<Labels>> = vec![None; n_iterations];
        match options.selected_keys {
            None => {}
            Some(SelectedKeys::Final(labels)) => {
                selected_keys[n_iterations - 1] = Some(labels);
            }
            Some(SelectedKeys::PerIteration(list)) => {
                if list.len() != n_iterations {
                    return Err(CgError::Configuration(format!(
                        "selected_keys has {} entries for {} iterations",
                        list.len(),
                        n_iterations,
                    )));
                }
                selected_keys = list;
            }
        }

        for selection in selected_keys.iter().flatten() {
            validate_selection(selection, options.max_angular, options.angular_cutoff)?;
        }

        // iterations without an explicit selection fall back to the
        // angular cutoff, when one is set
        if let Some(cutoff) = options.angular_cutoff {
            let within_cutoff =
                Labels::new(&["o3_lambda"], (0..=cutoff as i32).collect()).expect("unique range");
            for slot in selected_keys.iter_mut() {
                if slot.is_none() {
                    *slot = Some(within_cutoff.clone());
                }
            }
        }

        let skip_redundant = resolve_filter(&options.skip_redundant, n_iterations)
            .map_err(|len| {
                CgError::Configuration(format!(
                    "skip_redundant has {len} entries for {n_iterations} iterations",
                ))
            })?;

        let output_selection = match &options.output_selection {
            None => {
                let mut flags = vec![false; n_iterations];
                flags[n_iterations - 1] = true;
                flags
            }
            Some(filter) => resolve_filter(filter, n_iterations).map_err(|len| {
                CgError::Configuration(format!(
                    "output_selection has {len} entries for {n_iterations} iterations",
                ))
            })?,
        };
        if output_selection.iter().all(|&flag| !flag) {
            return Err(CgError::Configuration(
                "output_selection must select at least one iteration".into(),
            ));
        }

        let backend = match options.backend {
            CgBackend::Auto => CgBackend::Sparse,
            other => other,
        };
        let representation = match backend {
            CgBackend::Dense => CgRepresentation::Dense,
            _ => CgRepresentation::Sparse,
        };

        let coefficients = CgCoefficients::new(options.max_angular, representation);
        log::debug!(
            "computed CG coefficients up to l={} ({:?} representation)",
            options.max_angular,
            representation,
        );

        Ok(DensityCorrelations {
            max_angular: options.max_angular,
            correlation_order: options.correlation_order,
            selected_keys,
            skip_redundant,
            output_selection,
            backend,
            coefficients,
        })
    }

    /// The maximum angular order of the coefficient cache.
    pub fn max_angular(&self) -> usize {
        self.max_angular
    }

    /// The correlation order of the final iteration.
    pub fn correlation_order(&self) -> usize {
        self.correlation_order
    }

    /// The resolved numeric backend (never [`CgBackend::Auto`]).
    pub fn backend(&self) -> CgBackend {
        self.backend
    }

    /// Compute the density correlations of `density` up to the configured
    /// correlation order.
    ///
    /// Returns one tensor per iteration selected for output, in iteration
    /// order; with the default output selection this is a single-element
    /// vector holding the final correlation order.
    pub fn compute<T: Scalar>(&self, density: &BlockMap<T>) -> Result<Vec<BlockMap<T>>> {
        self.correlate(density, false)
    }

    /// Walk the same iterations as [`DensityCorrelations::compute`]
    /// without any numeric work, returning tensors whose metadata exactly
    /// matches what `compute` would produce for the same input.
    pub fn compute_metadata<T: Scalar>(&self, density: &BlockMap<T>) -> Result<Vec<BlockMap<T>>> {
        self.correlate(density, true)
    }

    fn correlate<T: Scalar>(
        &self,
        density: &BlockMap<T>,
        metadata_only: bool,
    ) -> Result<Vec<BlockMap<T>>> {
        keys::validate_density(density)?;

        let input_max = keys::max_angular_of(density.keys())?;
        if input_max > self.max_angular {
            return Err(CgError::Configuration(format!(
                "the largest o3_lambda in the density is {input_max}, but this calculator \
                 was built with max_angular={}",
                self.max_angular,
            )));
        }

        let density = keys::standardize_keys(density)?;
        let coefficients = self.coefficients.cast::<T>();

        let combiner: &dyn Combine<T> = if metadata_only {
            &MetadataCombiner
        } else {
            match self.backend {
                CgBackend::Dense => &DenseCombiner,
                _ => &SparseCombiner,
            }
        };

        let n_iterations = self.correlation_order - 1;
        let mut current = density.clone();
        let mut outputs = Vec::new();

        for iteration in 0..n_iterations {
            let new_order = iteration + 2;

            let (new_keys, combinations) = keys::precompute_keys(
                current.keys(),
                density.keys(),
                self.selected_keys[iteration].as_ref(),
                self.skip_redundant[iteration],
            )?;

            let produced_max = keys::max_angular_of(&new_keys)?;
            if produced_max > self.max_angular {
                return Err(CgError::Configuration(format!(
                    "correlating this density requires max_angular={produced_max}, but this \
                     calculator was built with max_angular={}",
                    self.max_angular,
                )));
            }

            log::debug!(
                "iteration {}/{}: {} pair combinations -> {} keys",
                iteration + 1,
                n_iterations,
                combinations.len(),
                new_keys.count(),
            );

            let mut blocks = Vec::with_capacity(new_keys.count());
            for combination in &combinations {
                blocks.extend(combiner.combine(
                    current.block_by_id(combination.first),
                    density.block_by_id(combination.second),
                    &combination.o3_lambdas,
                    &coefficients,
                    new_order,
                )?);
            }

            current = BlockMap::new(new_keys, blocks)?;

            if self.output_selection[iteration] {
                let mut moved: Vec<String> = (1..=new_order).map(|i| format!("l_{i}")).collect();
                moved.extend((2..new_order).map(|i| format!("k_{i}")));
                let moved: Vec<&str> = moved.iter().map(String::as_str).collect();
                outputs.push(current.keys_to_properties(&moved)?);
            }
        }

        outputs
            .into_iter()
            .map(drop_degenerate_keys)
            .collect::<Result<Vec<_>>>()
    }
}

/// Drop bookkeeping key fields with a single unique value across all keys
/// of `tensor`. Physical fields are kept even when degenerate.
fn drop_degenerate_keys<T: Scalar>(tensor: BlockMap<T>) -> Result<BlockMap<T>> {
    const PHYSICAL: [&str; 3] = ["o3_lambda", "o3_sigma", "center_type"];

    let mut keys = tensor.keys().clone();
    for name in tensor.keys().names() {
        if PHYSICAL.contains(&name) {
            continue;
        }
        let mut values = keys.column(name)?;
        values.sort_unstable();
        values.dedup();
        if values.len() <= 1 && keys.size() > 1 {
            keys = keys.remove(name)?;
        }
    }

    Ok(BlockMap::new(keys, tensor.blocks().to_vec())?)
}

fn resolve_filter(
    filter: &IterationFilter,
    n_iterations: usize,
) -> std::result::Result<Vec<bool>, usize> {
    match filter {
        IterationFilter::All(flag) => Ok(vec![*flag; n_iterations]),
        IterationFilter::PerIteration(flags) => {
            if flags.len() != n_iterations {
                Err(flags.len())
            } else {
                Ok(flags.clone())
            }
        }
    }
}

fn validate_selection(
    selection: &Labels,
    max_angular: usize,
    angular_cutoff: Option<usize>,
) -> Result<()> {
    let names = selection.names();
    if names != ["o3_lambda"] && names != ["o3_lambda", "o3_sigma"] {
        return Err(CgError::Configuration(format!(
            "selected_keys may only name o3_lambda and o3_sigma, got {names:?}",
        )));
    }

    for lambda in selection.column("o3_lambda").map_err(CgError::from)? {
        if lambda < 0 {
            return Err(CgError::Configuration(format!(
                "selected o3_lambda={lambda} is negative",
            )));
        }
        if lambda as usize > max_angular {
            return Err(CgError::Configuration(format!(
                "selected o3_lambda={lambda} exceeds max_angular={max_angular}",
            )));
        }
        if let Some(cutoff) = angular_cutoff {
            if lambda as usize > cutoff {
                return Err(CgError::Configuration(format!(
                    "selected o3_lambda={lambda} exceeds angular_cutoff={cutoff}",
                )));
            }
        }
    }

    if names.len() == 2 {
        for sigma in selection.column("o3_sigma").map_err(CgError::from)? {
            if sigma != 1 && sigma != -1 {
                return Err(CgError::Configuration(format!(
                    "selected o3_sigma={sigma} is not a parity (must be ±1)",
                )));
            }
        }
    }

    Ok(())
}
