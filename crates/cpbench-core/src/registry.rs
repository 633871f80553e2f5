//! Model registry: which instances, verifier template and flags belong to a
//! model id.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};

/// Ground-truth file name inside a model's instance directory.
pub const GROUND_TRUTH_FILE: &str = "optimal_values.json";

/// Everything the harness needs to know about one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelSpec {
    pub id: String,

    /// Directory holding the benchmark instances.
    pub instances_dir: PathBuf,

    /// Verifier model template.
    pub template: PathBuf,

    /// Extension of instance and solution data files.
    pub data_extension: String,

    /// Flags prepended to the caller's flags for every run.
    #[serde(default)]
    pub default_flags: Vec<String>,

    /// Cargo example that builds the solver for this model.
    pub example: String,
}

impl ModelSpec {
    /// Standard layout: `<data>/<id>/*.dzn` and `<models>/<id>.mzn`.
    pub fn standard(id: &str, config: &HarnessConfig) -> Self {
        Self {
            id: id.to_string(),
            instances_dir: config.data_dir.join(id),
            template: config.models_dir.join(format!("{id}.mzn")),
            data_extension: "dzn".to_string(),
            default_flags: Vec::new(),
            example: id.to_string(),
        }
    }

    /// Data file of a named instance.
    pub fn instance_path(&self, instance: &str) -> PathBuf {
        self.instances_dir.join(format!("{instance}.{}", self.data_extension))
    }

    pub fn ground_truth_path(&self) -> PathBuf {
        self.instances_dir.join(GROUND_TRUTH_FILE)
    }

    /// Instance files of this model, sorted by name.
    pub fn list_instances(&self) -> Result<Vec<PathBuf>> {
        let mut instances = Vec::new();
        for entry in std::fs::read_dir(&self.instances_dir)? {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, &self.data_extension) {
                instances.push(path);
            }
        }
        instances.sort();
        Ok(instances)
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy() == extension)
        .unwrap_or(false)
}

/// Immutable lookup from model id to [`ModelSpec`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelRegistry {
    models: BTreeMap<String, ModelSpec>,
}

impl ModelRegistry {
    /// The models shipped with the course: travelling salesperson and
    /// resource-constrained project scheduling.
    pub fn builtin(config: &HarnessConfig) -> Self {
        Self::default()
            .with_model(ModelSpec::standard("tsp", config))
            .with_model(ModelSpec::standard("rcpsp", config))
    }

    /// Add or replace a model (builder pattern).
    pub fn with_model(mut self, spec: ModelSpec) -> Self {
        self.models.insert(spec.id.clone(), spec);
        self
    }

    pub fn get(&self, id: &str) -> Result<&ModelSpec> {
        self.models
            .get(id)
            .ok_or_else(|| HarnessError::UnknownModel(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }
}
