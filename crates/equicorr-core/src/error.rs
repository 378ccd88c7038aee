//! Error types for the data model.

use thiserror::Error;

/// Error type for data-model construction and transformation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Labels must have at least one named dimension.
    #[error("labels must have at least one dimension")]
    EmptyNames,

    /// The same dimension name appears twice in one set of labels.
    #[error("duplicate label dimension {name:?}")]
    DuplicateName { name: String },

    /// The flat values buffer does not split evenly into entries.
    #[error("labels values length {len} is not a multiple of the {size} dimensions")]
    ValuesArity { len: usize, size: usize },

    /// The same entry appears twice in one set of labels.
    #[error("duplicate labels entry {entry:?}")]
    DuplicateEntry { entry: Vec<i32> },

    /// A dimension name was requested that these labels do not have.
    #[error("no dimension named {name:?} in labels {names:?}")]
    MissingDimension { name: String, names: Vec<String> },

    /// Array dimensions do not match the metadata axes.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Metadata of two blocks that must agree does not.
    #[error("metadata mismatch: {context}")]
    MetadataMismatch { context: String },

    /// Key count and block count differ.
    #[error("got {blocks} blocks for {keys} keys")]
    BlockCount { blocks: usize, keys: usize },
}

/// Result type for data-model operations.
pub type Result<T> = std::result::Result<T, CoreError>;
