//! The persisted description of one experiment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::layout::RunLayout;

/// File name of the manifest inside an experiment directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Manifest of one evaluation session.
///
/// Written once, as the last step of experiment creation, and loaded read-only
/// by every later stage. Fields added after the first manifest version carry a
/// serde default so older manifests keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentManifest {
    /// Root directory of the experiment.
    pub directory: PathBuf,

    /// Directory holding one subdirectory per run.
    pub runs: PathBuf,

    /// Model id, a key of the model registry.
    pub model: String,

    /// Time budget per instance, in seconds.
    pub timeout: u64,

    /// Commit the solver was built from.
    pub commit_hash: String,

    /// Whether the working tree had uncommitted changes at creation time.
    pub has_dirty_files: bool,

    /// The solver executable copied into the experiment directory.
    pub executable: PathBuf,

    /// Flags passed to the solver for every run, in order.
    pub flags: Vec<String>,

    /// Whether runs log a proof scaffold.
    #[serde(default)]
    pub with_proofs: bool,
}

impl ExperimentManifest {
    /// Path of the manifest file for an experiment directory.
    pub fn path_in(directory: &Path) -> PathBuf {
        directory.join(MANIFEST_FILE)
    }

    /// Load the manifest of the experiment rooted at `directory`.
    pub fn load(directory: &Path) -> Result<Self> {
        Self::load_file(&Self::path_in(directory))
    }

    /// Load a manifest from an explicit file path.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HarnessError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| HarnessError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Parse a manifest from its JSON text.
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Write the manifest as pretty JSON into its experiment directory.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::path_in(&self.directory);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    /// Layout of the run directory for an instance.
    pub fn run(&self, instance: &str) -> RunLayout {
        RunLayout::new(self.runs.join(instance))
    }

    /// All run directories of this experiment, sorted by instance name.
    pub fn list_runs(&self) -> Result<Vec<RunLayout>> {
        let mut runs = Vec::new();
        for entry in std::fs::read_dir(&self.runs)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                runs.push(RunLayout::new(entry.path()));
            }
        }
        runs.sort_by(|a, b| a.instance().cmp(&b.instance()));
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(directory: &Path) -> ExperimentManifest {
        ExperimentManifest {
            directory: directory.to_path_buf(),
            runs: directory.join("runs"),
            model: "tsp".to_string(),
            timeout: 20,
            commit_hash: "0123abcd".to_string(),
            has_dirty_files: false,
            executable: directory.join("tsp"),
            flags: vec!["-G".to_string(), "element".to_string()],
            with_proofs: true,
        }
    }

    #[test]
    fn test_missing_with_proofs_defaults_false() {
        let json = r#"{
            "directory": "/exp",
            "runs": "/exp/runs",
            "model": "rcpsp",
            "timeout": 20,
            "commit_hash": "abc",
            "has_dirty_files": true,
            "executable": "/exp/rcpsp",
            "flags": []
        }"#;
        let manifest = ExperimentManifest::from_json(json).expect("parse");
        assert!(!manifest.with_proofs);
        assert_eq!(manifest.model, "rcpsp");
        assert!(manifest.has_dirty_files);
    }

    #[test]
    fn test_required_field_missing_is_rejected() {
        let json = r#"{ "directory": "/exp", "runs": "/exp/runs", "model": "tsp" }"#;
        assert!(ExperimentManifest::from_json(json).is_err());
    }

    #[test]
    fn test_wrongly_typed_timeout_is_rejected() {
        let json = r#"{
            "directory": "/exp", "runs": "/exp/runs", "model": "tsp",
            "timeout": "soon", "commit_hash": "abc", "has_dirty_files": false,
            "executable": "/exp/tsp", "flags": []
        }"#;
        assert!(ExperimentManifest::from_json(json).is_err());
    }

    #[test]
    fn test_save_then_load_preserves_flag_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample(dir.path());
        let path = manifest.save().unwrap();
        assert_eq!(path, dir.path().join(MANIFEST_FILE));

        let loaded = ExperimentManifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.flags, vec!["-G", "element"]);
    }

    #[test]
    fn test_load_missing_manifest_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = ExperimentManifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, HarnessError::ManifestInvalid { .. }));
    }

    #[test]
    fn test_list_runs_sorted_and_skips_files() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample(dir.path());
        std::fs::create_dir_all(manifest.runs.join("b-instance")).unwrap();
        std::fs::create_dir_all(manifest.runs.join("a-instance")).unwrap();
        std::fs::write(manifest.runs.join("stray.txt"), "x").unwrap();

        let names: Vec<String> = manifest
            .list_runs()
            .unwrap()
            .iter()
            .map(|r| r.instance())
            .collect();
        assert_eq!(names, vec!["a-instance", "b-instance"]);
    }
}
