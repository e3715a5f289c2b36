//! Recovery bundle manifest (`manifest.json`)

use super::error::RecoveryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Metadata of one captured path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEntry {
    pub path: PathBuf,
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// A captured directory and the metadata of everything below it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedDirectory {
    #[serde(flatten)]
    pub root: CapturedEntry,
    /// Entries relative to `root.path`
    #[serde(default)]
    pub contents: Vec<CapturedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryManifest {
    pub recovery_id: String,
    pub name: String,
    /// Local wall-clock stamp used in the bundle id
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<CapturedEntry>,
    pub directories: Vec<CapturedDirectory>,
}

impl RecoveryManifest {
    pub fn new(recovery_id: &str, name: &str, timestamp: &str) -> Self {
        Self {
            recovery_id: recovery_id.to_string(),
            name: name.to_string(),
            timestamp: timestamp.to_string(),
            created_at: Utc::now(),
            files: Vec::new(),
            directories: Vec::new(),
        }
    }

    pub fn item_count(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    pub fn load(bundle: &Path) -> Result<Self, RecoveryError> {
        let path = bundle.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|e| RecoveryError::ManifestInvalid {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| RecoveryError::ManifestInvalid {
            path,
            reason: e.to_string(),
        })
    }

    /// Replace the manifest in `bundle` via temp file and rename
    pub fn save(&self, bundle: &Path) -> Result<(), RecoveryError> {
        let path = bundle.join(MANIFEST_FILE);
        let temp = bundle.join(format!("{}.partial", MANIFEST_FILE));
        let write_err = |e: String| RecoveryError::ManifestWrite {
            path: path.clone(),
            reason: e,
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        std::fs::write(&temp, json).map_err(|e| write_err(e.to_string()))?;
        std::fs::rename(&temp, &path).map_err(|e| write_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = RecoveryManifest::new("pre_20240101_120000", "pre", "20240101_120000");
        manifest.files.push(CapturedEntry {
            path: PathBuf::from("/etc/sudoers"),
            mode: Some(0o440),
            owner: Some("root".into()),
            group: Some("root".into()),
            uid: Some(0),
            gid: Some(0),
        });
        manifest.save(dir.path()).unwrap();

        let loaded = RecoveryManifest::load(dir.path()).unwrap();
        assert_eq!(loaded, manifest);
        assert!(!dir.path().join("manifest.json.partial").exists());
    }

    #[test]
    fn test_load_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "{not json").unwrap();
        assert!(matches!(
            RecoveryManifest::load(dir.path()),
            Err(RecoveryError::ManifestInvalid { .. })
        ));
    }
}
