//! Iterative Clebsch-Gordan tensor products of density descriptors.
//!
//! The entry point is [`DensityCorrelations`]: configured once with
//! [`CorrelationOptions`], it combines a keyed block-sparse density
//! tensor (see `equicorr-core`) with itself up to the requested
//! correlation order, producing equivariant features for atomistic
//! machine learning.
//!
//! The pieces are usable on their own:
//!
//! - [`CgCoefficients`]: the coupling-coefficient cache, in dense or
//!   sparse representation
//! - [`keys`]: which key pairs combine, and the bookkeeping key schema
//! - [`combine`]: the per-pair tensor product, with dense, sparse and
//!   metadata-only strategies behind one interface
//!
//! Gradient-bearing input is rejected ([`CgError::Unsupported`]); all
//! errors abort the whole computation, the core never returns partial
//! results.

pub mod coefficients;
pub mod combine;
mod correlate;
mod error;
pub mod keys;

pub use coefficients::{CgCoefficients, CgRepresentation, SparseEntry, CG_SPARSE_CUTOFF};
pub use combine::{Combine, DenseCombiner, MetadataCombiner, SparseCombiner};
pub use correlate::{
    CgBackend, CorrelationOptions, DensityCorrelations, IterationFilter, SelectedKeys,
};
pub use error::{CgError, Result};
pub use keys::{standardize_keys, Combination};
