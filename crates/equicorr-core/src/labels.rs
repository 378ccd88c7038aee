//! Named integer-tuple sets.
//!
//! A [`Labels`] instance names the rows of one metadata axis: tensor keys,
//! sample identifiers, component indices or property identifiers. Entries
//! are unique and their order is significant (it is the storage order of
//! the axis they describe).

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, Result};

/// A set of named integer tuples.
///
/// Entries are stored row-major in a flat `i32` buffer; a hash index maps
/// each entry back to its position for O(1) lookup.
#[derive(Debug, Clone)]
pub struct Labels {
    names: Vec<String>,
    values: Vec<i32>,
    positions: HashMap<Vec<i32>, usize>,
}

impl Labels {
    /// Create new labels, validating name uniqueness, arity and entry
    /// uniqueness.
    pub fn new<S: AsRef<str>>(names: &[S], values: Vec<i32>) -> Result<Labels> {
        let names: Vec<String> = names.iter().map(|s| s.as_ref().to_string()).collect();
        if names.is_empty() {
            return Err(CoreError::EmptyNames);
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(CoreError::DuplicateName { name: name.clone() });
            }
        }

        if values.len() % names.len() != 0 {
            return Err(CoreError::ValuesArity {
                len: values.len(),
                size: names.len(),
            });
        }

        let size = names.len();
        let mut positions = HashMap::with_capacity(values.len() / size);
        for (i, entry) in values.chunks_exact(size).enumerate() {
            if positions.insert(entry.to_vec(), i).is_some() {
                return Err(CoreError::DuplicateEntry {
                    entry: entry.to_vec(),
                });
            }
        }

        Ok(Labels {
            names,
            values,
            positions,
        })
    }

    /// Labels with a single dimension counting `-extent..=extent`, used for
    /// the `o3_mu` component axis of a block with angular order `extent`.
    pub fn component_range(name: &str, extent: i32) -> Labels {
        let values: Vec<i32> = (-extent..=extent).collect();
        Labels::new(&[name], values).expect("range entries are unique")
    }

    /// The dimension names.
    pub fn names(&self) -> Vec<&str> {
        self.names.iter().map(|s| s.as_str()).collect()
    }

    /// Number of dimensions per entry.
    pub fn size(&self) -> usize {
        self.names.len()
    }

    /// Number of entries.
    pub fn count(&self) -> usize {
        if self.names.is_empty() {
            0
        } else {
            self.values.len() / self.names.len()
        }
    }

    /// Check if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Get the entry at position `i`.
    ///
    /// # Panics
    /// Panics if `i` is out of bounds.
    pub fn entry(&self, i: usize) -> &[i32] {
        let size = self.size();
        &self.values[i * size..(i + 1) * size]
    }

    /// Iterate over entries in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &[i32]> {
        self.values.chunks_exact(self.size())
    }

    /// Position of `entry`, if present.
    pub fn position(&self, entry: &[i32]) -> Option<usize> {
        self.positions.get(entry).copied()
    }

    /// Check whether `entry` is present.
    pub fn contains(&self, entry: &[i32]) -> bool {
        self.positions.contains_key(entry)
    }

    /// Index of the dimension called `name`.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| CoreError::MissingDimension {
                name: name.to_string(),
                names: self.names.clone(),
            })
    }

    /// All values of the dimension called `name`, in entry order.
    pub fn column(&self, name: &str) -> Result<Vec<i32>> {
        let idx = self.index_of(name)?;
        Ok(self.iter().map(|entry| entry[idx]).collect())
    }

    /// New labels with the dimension called `name` removed.
    ///
    /// Fails if the removal would make two entries collide, or if it would
    /// leave no dimensions at all.
    pub fn remove(&self, name: &str) -> Result<Labels> {
        let idx = self.index_of(name)?;
        let names: Vec<String> = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, n)| (i != idx).then(|| n.clone()))
            .collect();
        let values: Vec<i32> = self
            .iter()
            .flat_map(|entry| {
                entry
                    .iter()
                    .enumerate()
                    .filter_map(move |(i, &v)| (i != idx).then_some(v))
            })
            .collect();
        Labels::new(&names, values)
    }

    /// New labels with every dimension renamed through `f`.
    pub fn rename_all(&self, f: impl Fn(&str) -> String) -> Result<Labels> {
        let names: Vec<String> = self.names.iter().map(|n| f(n)).collect();
        Labels::new(&names, self.values.clone())
    }
}

impl PartialEq for Labels {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names && self.values == other.values
    }
}

impl Eq for Labels {}

/// Incremental builder for [`Labels`], used where entries are produced one
/// at a time (key algebra, property cross products).
#[derive(Debug, Clone)]
pub struct LabelsBuilder {
    names: Vec<String>,
    values: Vec<i32>,
}

impl LabelsBuilder {
    /// Start a builder for the given dimension names.
    pub fn new<S: AsRef<str>>(names: &[S]) -> LabelsBuilder {
        LabelsBuilder {
            names: names.iter().map(|s| s.as_ref().to_string()).collect(),
            values: Vec::new(),
        }
    }

    /// Append one entry.
    ///
    /// # Panics
    /// Panics if the entry arity does not match the names.
    pub fn add(&mut self, entry: &[i32]) {
        assert_eq!(
            entry.len(),
            self.names.len(),
            "entry has {} values for {} dimensions",
            entry.len(),
            self.names.len(),
        );
        self.values.extend_from_slice(entry);
    }

    /// Number of entries added so far.
    pub fn count(&self) -> usize {
        if self.names.is_empty() {
            0
        } else {
            self.values.len() / self.names.len()
        }
    }

    /// Validate and build the labels.
    pub fn finish(self) -> Result<Labels> {
        Labels::new(&self.names, self.values)
    }
}
