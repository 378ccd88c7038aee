//! Ordered map from keys to blocks.

use std::collections::HashMap;

use crate::block::Block;
use crate::error::{CoreError, Result};
use crate::labels::{Labels, LabelsBuilder};
use crate::scalar::Scalar;
use crate::values::DenseArray;

/// A keyed block-sparse tensor: one [`Block`] per key entry, in key order.
///
/// Keys are unique; key order is preserved through every transformation
/// that does not explicitly reorder.
#[derive(Debug, Clone)]
pub struct BlockMap<T: Scalar> {
    keys: Labels,
    blocks: Vec<Block<T>>,
}

impl<T: Scalar> BlockMap<T> {
    /// Create a new keyed tensor with one block per key.
    pub fn new(keys: Labels, blocks: Vec<Block<T>>) -> Result<BlockMap<T>> {
        if keys.count() != blocks.len() {
            return Err(CoreError::BlockCount {
                blocks: blocks.len(),
                keys: keys.count(),
            });
        }
        Ok(BlockMap { keys, blocks })
    }

    /// The key labels.
    pub fn keys(&self) -> &Labels {
        &self.keys
    }

    /// All blocks, in key order.
    pub fn blocks(&self) -> &[Block<T>] {
        &self.blocks
    }

    /// The block at key position `id`.
    ///
    /// # Panics
    /// Panics if `id` is out of bounds.
    pub fn block_by_id(&self, id: usize) -> &Block<T> {
        &self.blocks[id]
    }

    /// The block for the given key entry, if present.
    pub fn block(&self, key: &[i32]) -> Option<&Block<T>> {
        self.keys.position(key).map(|id| &self.blocks[id])
    }

    /// Iterate over `(key, block)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[i32], &Block<T>)> {
        self.keys.iter().zip(self.blocks.iter())
    }

    /// Component axis names, which all blocks must share.
    pub fn component_names(&self) -> Result<Vec<String>> {
        let Some(first) = self.blocks.first() else {
            return Ok(Vec::new());
        };
        let names = first.component_names();
        for block in &self.blocks[1..] {
            if block.component_names() != names {
                return Err(CoreError::MetadataMismatch {
                    context: "blocks have inconsistent component names".into(),
                });
            }
        }
        Ok(names)
    }

    /// Whether any block carries gradient data.
    pub fn has_gradients(&self) -> bool {
        self.blocks.iter().any(|b| b.has_gradients())
    }

    /// Move the named key dimensions into block properties.
    ///
    /// The moved values become the leading property dimensions, constant
    /// over each originating block. Blocks whose keys coincide once the
    /// moved dimensions are removed are merged by concatenating their
    /// properties; merged blocks must agree on samples and components.
    pub fn keys_to_properties(&self, names: &[&str]) -> Result<BlockMap<T>> {
        let moved: Vec<usize> = names
            .iter()
            .map(|n| self.keys.index_of(n))
            .collect::<Result<_>>()?;
        let kept: Vec<usize> = (0..self.keys.size()).filter(|i| !moved.contains(i)).collect();

        let kept_names: Vec<&str> = {
            let all = self.keys.names();
            kept.iter().map(|&i| all[i]).collect()
        };

        // Group block ids by residual key, preserving first-occurrence order.
        let mut order: Vec<Vec<i32>> = Vec::new();
        let mut groups: HashMap<Vec<i32>, Vec<usize>> = HashMap::new();
        for (id, key) in self.keys.iter().enumerate() {
            let residual: Vec<i32> = kept.iter().map(|&i| key[i]).collect();
            match groups.get_mut(&residual) {
                Some(ids) => ids.push(id),
                None => {
                    groups.insert(residual.clone(), vec![id]);
                    order.push(residual);
                }
            }
        }

        let mut new_keys = LabelsBuilder::new(&kept_names);
        let mut new_blocks = Vec::with_capacity(order.len());
        for residual in &order {
            new_keys.add(residual);
            let ids = &groups[residual];
            new_blocks.push(self.merge_blocks(ids, &moved, names)?);
        }

        BlockMap::new(new_keys.finish()?, new_blocks)
    }

    /// Merge the blocks at `ids` into one, prepending the moved key values
    /// to each originating block's property entries.
    fn merge_blocks(&self, ids: &[usize], moved: &[usize], names: &[&str]) -> Result<Block<T>> {
        let first = &self.blocks[ids[0]];
        for &id in &ids[1..] {
            let other = &self.blocks[id];
            if first.samples() != other.samples() {
                return Err(CoreError::MetadataMismatch {
                    context: "cannot merge blocks with different samples".into(),
                });
            }
            if first.components() != other.components() {
                return Err(CoreError::MetadataMismatch {
                    context: "cannot merge blocks with different components".into(),
                });
            }
            if first.properties().names() != other.properties().names() {
                return Err(CoreError::MetadataMismatch {
                    context: "cannot merge blocks with different property names".into(),
                });
            }
        }

        let mut property_names: Vec<String> = names.iter().map(|s| s.to_string()).collect();
        property_names.extend(first.properties().names().into_iter().map(String::from));

        let mut properties = LabelsBuilder::new(&property_names);
        for &id in ids {
            let key = self.keys.entry(id);
            let moved_values: Vec<i32> = moved.iter().map(|&i| key[i]).collect();
            for entry in self.blocks[id].properties().iter() {
                let mut row = moved_values.clone();
                row.extend_from_slice(entry);
                properties.add(&row);
            }
        }
        let properties = properties.finish()?;

        let n_samples = first.samples().count();
        let n_components: usize = first.components().iter().map(|c| c.count()).product();
        let n_properties = properties.count();

        let mut values = vec![T::zero(); n_samples * n_components * n_properties];
        let mut offset = 0;
        for &id in ids {
            let block = &self.blocks[id];
            let data = block.values().as_slice();
            let block_properties = block.properties().count();
            for sc in 0..n_samples * n_components {
                let src = &data[sc * block_properties..(sc + 1) * block_properties];
                let dst_start = sc * n_properties + offset;
                values[dst_start..dst_start + block_properties].copy_from_slice(src);
            }
            offset += block_properties;
        }

        let mut dims = vec![n_samples];
        dims.extend(first.components().iter().map(|c| c.count()));
        dims.push(n_properties);

        Block::new(
            DenseArray::from_vec_with_shape(values, &dims),
            first.samples().clone(),
            first.components().to_vec(),
            properties,
        )
    }
}
