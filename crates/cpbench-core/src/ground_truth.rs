//! Known-optimal objective values per instance.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Instance name to its known-optimal objective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroundTruth {
    optima: BTreeMap<String, i64>,
}

impl GroundTruth {
    /// Load the side file written by the offline optimum computation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        Self {
            optima: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, instance: &str) -> Option<i64> {
        self.optima.get(instance).copied()
    }

    /// The optimum of an instance; a missing entry is a fatal fault.
    pub fn expect_optimum(&self, instance: &str) -> Result<i64> {
        self.get(instance)
            .ok_or_else(|| HarnessError::MissingGroundTruth(instance.to_string()))
    }

    pub fn len(&self) -> usize {
        self.optima.len()
    }

    pub fn is_empty(&self) -> bool {
        self.optima.is_empty()
    }
}
