//! Labeled example pools.
//!
//! Datasets are stored on disk column-oriented, one array per field:
//!
//! ```json
//! {"text": ["short tweet", "long tweet"], "label": ["first", "second"]}
//! ```

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, TaskError};

/// One labeled example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Ground-truth label
    pub label: String,
    /// Task-specific text fields
    pub fields: BTreeMap<String, String>,
}

impl Example {
    /// Create an example with a label and no fields.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// A pool of labeled examples indexable by integer id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    examples: Vec<Example>,
}

impl Dataset {
    /// Create a dataset from examples.
    pub fn from_examples(examples: Vec<Example>) -> Self {
        Self { examples }
    }

    /// Build a dataset from a column-oriented JSON object.
    pub fn from_columns(value: &serde_json::Value, label_name: &str) -> Result<Self> {
        let columns = value.as_object().ok_or_else(|| {
            TaskError::InvalidDataset("expected a JSON object of columns".to_string())
        })?;

        let labels = columns
            .get(label_name)
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                TaskError::InvalidDataset(format!("missing label column '{}'", label_name))
            })?;

        let mut examples: Vec<Example> = labels
            .iter()
            .map(|label| Example::new(cell_to_string(label)))
            .collect();

        for (name, column) in columns {
            if name == label_name {
                continue;
            }
            let cells = column.as_array().ok_or_else(|| {
                TaskError::InvalidDataset(format!("column '{}' is not an array", name))
            })?;
            if cells.len() != examples.len() {
                return Err(TaskError::InvalidDataset(format!(
                    "column '{}' has {} rows, label column has {}",
                    name,
                    cells.len(),
                    examples.len()
                )));
            }
            for (example, cell) in examples.iter_mut().zip(cells) {
                example.fields.insert(name.clone(), cell_to_string(cell));
            }
        }

        Ok(Self { examples })
    }

    /// Load a column-oriented JSON file.
    pub fn load_json(path: &Path, label_name: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TaskError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;
        Self::from_columns(&value, label_name)
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Get an example.
    pub fn get(&self, index: usize) -> Option<&Example> {
        self.examples.get(index)
    }

    /// Get an example, failing on an out-of-range index.
    pub fn example(&self, index: usize) -> Result<&Example> {
        self.examples.get(index).ok_or(TaskError::IndexOutOfRange {
            index,
            len: self.examples.len(),
        })
    }

    /// Ground-truth label of an example.
    pub fn label(&self, index: usize) -> Result<&str> {
        self.example(index).map(|e| e.label.as_str())
    }

    /// Examples at the given indices, in order.
    pub fn select(&self, indices: &[usize]) -> Result<Vec<&Example>> {
        indices.iter().map(|&i| self.example(i)).collect()
    }

    /// Iterate over examples.
    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.examples.iter()
    }

    /// Shuffle with the given RNG and keep at most `n` examples.
    pub fn sample<R: Rng + ?Sized>(mut self, n: usize, rng: &mut R) -> Self {
        self.examples.shuffle(rng);
        self.examples.truncate(n);
        self
    }
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn columns() -> serde_json::Value {
        serde_json::json!({
            "text": ["a cat", "a dog", "a bird"],
            "length": [5, 5, 6],
            "label": ["pet", "pet", "wild"]
        })
    }

    #[test]
    fn test_from_columns() {
        let data = Dataset::from_columns(&columns(), "label").unwrap();

        assert_eq!(data.len(), 3);
        assert_eq!(data.label(2).unwrap(), "wild");
        assert_eq!(data.get(1).unwrap().field("text"), Some("a dog"));
        assert_eq!(data.get(0).unwrap().field("length"), Some("5"));
        assert!(data.get(0).unwrap().field("label").is_none());
    }

    #[test]
    fn test_missing_label_column() {
        let value = serde_json::json!({"text": ["x"]});
        let result = Dataset::from_columns(&value, "label");
        assert!(matches!(result, Err(TaskError::InvalidDataset(_))));
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let value = serde_json::json!({"text": ["x"], "label": ["a", "b"]});
        assert!(Dataset::from_columns(&value, "label").is_err());
    }

    #[test]
    fn test_out_of_range_label() {
        let data = Dataset::from_columns(&columns(), "label").unwrap();
        assert!(matches!(
            data.label(10),
            Err(TaskError::IndexOutOfRange { index: 10, len: 3 })
        ));
    }

    #[test]
    fn test_sample_is_deterministic() {
        let data = Dataset::from_columns(&columns(), "label").unwrap();

        let a = data.clone().sample(2, &mut StdRng::seed_from_u64(49));
        let b = data.sample(2, &mut StdRng::seed_from_u64(49));

        assert_eq!(a.len(), 2);
        assert_eq!(a, b);
    }
}
