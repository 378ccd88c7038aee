//! Keyed block-sparse tensor data model.
//!
//! This crate provides the data structures shared by the correlation
//! machinery in `equicorr-cg`:
//!
//! - [`Labels`]: named integer-tuple sets used for keys, samples,
//!   components and properties
//! - [`DenseArray`]: owned row-major dense value storage
//! - [`Block`]: one dense value array plus its metadata axes
//! - [`BlockMap`]: an ordered map from keys to blocks
//!
//! A [`BlockMap`] stores exactly one block per key; keys that would hold
//! all-zero blocks are simply absent. Nothing in this crate knows about
//! angular momentum: keys are opaque integer tuples here.

mod block;
mod error;
mod labels;
mod scalar;
mod tensor_map;
mod values;

pub use block::{Block, Gradient};
pub use error::{CoreError, Result};
pub use labels::{Labels, LabelsBuilder};
pub use scalar::Scalar;
pub use tensor_map::BlockMap;
pub use values::DenseArray;
