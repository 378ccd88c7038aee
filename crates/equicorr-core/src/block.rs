//! Single block of a keyed tensor.

use std::collections::BTreeMap;

use crate::error::{CoreError, Result};
use crate::labels::Labels;
use crate::scalar::Scalar;
use crate::values::DenseArray;

/// Gradient data attached to a block.
///
/// The correlation core does not combine gradients; this type exists so
/// producers can attach them and the driver can detect and reject them
/// instead of silently dropping data.
#[derive(Debug, Clone)]
pub struct Gradient<T: Scalar> {
    /// Gradient values, with the same trailing axes as the block values.
    pub values: DenseArray<T>,
    /// Gradient sample identifiers.
    pub samples: Labels,
}

/// One block of values with its metadata axes.
///
/// Values are indexed `[samples, components..., properties]`; for the
/// correlation core there is always exactly one component axis (`o3_mu`,
/// length `2λ+1` for angular order λ).
#[derive(Debug, Clone)]
pub struct Block<T: Scalar> {
    values: DenseArray<T>,
    samples: Labels,
    components: Vec<Labels>,
    properties: Labels,
    gradients: BTreeMap<String, Gradient<T>>,
}

impl<T: Scalar> Block<T> {
    /// Create a new block, validating that the value dimensions match the
    /// metadata axes.
    pub fn new(
        values: DenseArray<T>,
        samples: Labels,
        components: Vec<Labels>,
        properties: Labels,
    ) -> Result<Block<T>> {
        let mut expected = vec![samples.count()];
        expected.extend(components.iter().map(|c| c.count()));
        expected.push(properties.count());

        let actual = values.dims();
        if actual != expected {
            return Err(CoreError::ShapeMismatch { expected, actual });
        }

        Ok(Block {
            values,
            samples,
            components,
            properties,
            gradients: BTreeMap::new(),
        })
    }

    /// The block values.
    pub fn values(&self) -> &DenseArray<T> {
        &self.values
    }

    /// The sample labels (first axis).
    pub fn samples(&self) -> &Labels {
        &self.samples
    }

    /// The component labels (middle axes).
    pub fn components(&self) -> &[Labels] {
        &self.components
    }

    /// The property labels (last axis).
    pub fn properties(&self) -> &Labels {
        &self.properties
    }

    /// Names of the component axes, in order.
    pub fn component_names(&self) -> Vec<String> {
        self.components
            .iter()
            .flat_map(|c| c.names().into_iter().map(String::from))
            .collect()
    }

    /// Attach gradient data under `parameter`.
    ///
    /// The gradient values must have the same component and property
    /// extents as the block values.
    pub fn add_gradient(&mut self, parameter: &str, gradient: Gradient<T>) -> Result<()> {
        let block_dims = self.values.dims();
        let grad_dims = gradient.values.dims();
        let trailing = &block_dims[1..];
        if grad_dims.len() <= trailing.len()
            || &grad_dims[grad_dims.len() - trailing.len()..] != trailing
        {
            return Err(CoreError::ShapeMismatch {
                expected: trailing.to_vec(),
                actual: grad_dims,
            });
        }
        self.gradients.insert(parameter.to_string(), gradient);
        Ok(())
    }

    /// The attached gradients, keyed by parameter name.
    pub fn gradients(&self) -> &BTreeMap<String, Gradient<T>> {
        &self.gradients
    }

    /// Whether any gradient data is attached.
    pub fn has_gradients(&self) -> bool {
        !self.gradients.is_empty()
    }

    /// Check that `self` and `other` have the same metadata (samples,
    /// components, properties), returning a descriptive error otherwise.
    pub fn check_same_metadata(&self, other: &Block<T>) -> Result<()> {
        if self.samples != other.samples {
            return Err(CoreError::MetadataMismatch {
                context: "sample labels differ".into(),
            });
        }
        if self.components != other.components {
            return Err(CoreError::MetadataMismatch {
                context: "component labels differ".into(),
            });
        }
        if self.properties != other.properties {
            return Err(CoreError::MetadataMismatch {
                context: "property labels differ".into(),
            });
        }
        Ok(())
    }
}
