// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Content fingerprints for pipeline instance ids
//!
//! Uses BLAKE3 so the same definition and parameters always map to the same
//! instance, which is what lets a plain re-run resume.

use blake3::Hasher;
use std::path::Path;

use crate::errors::{RankflowError, RankflowResult};
use crate::flow::FlowConfig;

/// Number of hex characters kept in an instance id
const ID_LEN: usize = 16;

/// Incremental fingerprint over definition content and run parameters
pub struct Fingerprint {
    hasher: Hasher,
}

impl Fingerprint {
    pub fn new() -> Self {
        Self {
            hasher: Hasher::new(),
        }
    }

    /// Hash a file's contents
    pub fn update_file(&mut self, path: &Path) -> RankflowResult<()> {
        let content = std::fs::read(path).map_err(|_| RankflowError::DefinitionNotFound {
            path: path.to_path_buf(),
        })?;
        self.hasher.update(&content);
        Ok(())
    }

    /// Hash run parameters in their insertion order
    pub fn update_config(&mut self, config: &FlowConfig) -> RankflowResult<()> {
        let json = serde_json::to_string(config)?;
        self.hasher.update(json.as_bytes());
        Ok(())
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish and return the shortened hex id
    pub fn finish(self) -> String {
        let hex = self.hasher.finalize().to_hex();
        hex.as_str()[..ID_LEN].to_string()
    }
}

impl Default for Fingerprint {
    fn default() -> Self {
        Self::new()
    }
}

/// Instance id for a definition file run with `params`
pub fn instance_id(definition: &Path, params: &FlowConfig) -> RankflowResult<String> {
    let mut fingerprint = Fingerprint::new();
    fingerprint.update_file(definition)?;
    fingerprint.update_config(params)?;
    Ok(fingerprint.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_consistent() {
        let mut first = Fingerprint::new();
        first.update(b"steps: []");
        let mut second = Fingerprint::new();
        second.update(b"steps: []");

        let id = first.finish();
        assert_eq!(id, second.finish());
        assert_eq!(id.len(), ID_LEN);
    }

    #[test]
    fn test_instance_id_depends_on_params() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("flow.yaml");
        std::fs::write(&path, "id: demo\n").unwrap();

        let mut params = FlowConfig::new();
        let plain = instance_id(&path, &params).unwrap();
        params.insert("sample", "s1");
        let with_sample = instance_id(&path, &params).unwrap();

        assert_eq!(plain, instance_id(&path, &FlowConfig::new()).unwrap());
        assert_ne!(plain, with_sample);
    }

    #[test]
    fn test_missing_definition() {
        let err = instance_id(Path::new("/nonexistent/flow.yaml"), &FlowConfig::new()).unwrap_err();
        assert!(matches!(err, RankflowError::DefinitionNotFound { .. }));
    }
}
