//! Facade crate re-exporting the `equicorr` public API.
//!
//! Most users only need [`DensityCorrelations`] plus the data model types
//! to build its input:
//!
//! ```ignore
//! use equicorr::{BlockMap, CorrelationOptions, DensityCorrelations};
//!
//! let calculator = DensityCorrelations::new(CorrelationOptions {
//!     max_angular: 4,
//!     correlation_order: 2,
//!     ..Default::default()
//! })?;
//! let correlations = calculator.compute(&density)?;
//! ```

pub use equicorr_core::{
    Block, BlockMap, CoreError, DenseArray, Gradient, Labels, LabelsBuilder, Scalar,
};

pub use equicorr_cg::{
    standardize_keys, CgBackend, CgCoefficients, CgError, CgRepresentation, Combination,
    CorrelationOptions, DensityCorrelations, IterationFilter, SelectedKeys,
};
