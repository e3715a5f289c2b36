//! Atomic file replacement with mode and ownership

use crate::identity::IdentityResolver;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Mode and ownership applied to a written file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    pub mode: u32,
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl FileAttributes {
    pub fn new(mode: u32) -> Self {
        Self {
            mode,
            owner: None,
            group: None,
        }
    }

    pub fn owned_by(mut self, owner: &str, group: &str) -> Self {
        self.owner = Some(owner.to_string());
        self.group = Some(group.to_string());
        self
    }
}

impl Default for FileAttributes {
    fn default() -> Self {
        Self::new(0o644).owned_by("root", "root")
    }
}

/// Write `content` to a temp file beside `path`, apply attributes, then rename
/// over the target. Ownership problems are returned as warnings, not errors.
pub fn atomic_write(
    path: &Path,
    content: &[u8],
    attributes: &FileAttributes,
    identity: &dyn IdentityResolver,
) -> std::io::Result<Vec<String>> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let temp_path = dir.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4().simple()));

    let result = write_temp(&temp_path, content, attributes, identity)
        .and_then(|warnings| std::fs::rename(&temp_path, path).map(|_| warnings));

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn write_temp(
    temp_path: &Path,
    content: &[u8],
    attributes: &FileAttributes,
    identity: &dyn IdentityResolver,
) -> std::io::Result<Vec<String>> {
    let mut file = std::fs::File::create(temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    set_mode(temp_path, attributes.mode)?;

    let mut warnings = Vec::new();
    let uid = attributes.owner.as_deref().and_then(|o| identity.uid_for(o));
    let gid = attributes.group.as_deref().and_then(|g| identity.gid_for(g));
    if uid.is_some() || gid.is_some() {
        if let Err(e) = identity.set_owner(temp_path, uid, gid) {
            warnings.push(format!("Could not set ownership: {}", e));
        }
    }
    Ok(warnings)
}

#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::symlink_metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn mode_of(_path: &Path) -> Option<u32> {
    None
}

/// Copy an existing file to `<path>.stig-backup-<timestamp>`; missing files need no backup
pub fn backup_file(path: &Path) -> std::io::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let backup = PathBuf::from(format!(
        "{}.stig-backup-{}",
        path.display(),
        chrono::Local::now().format("%Y%m%d%H%M%S")
    ));
    std::fs::copy(path, &backup)?;
    Ok(Some(backup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NoopIdentityResolver;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("login.defs");
        std::fs::write(&target, "PASS_MAX_DAYS 99999\n").unwrap();

        let warnings = atomic_write(
            &target,
            b"PASS_MAX_DAYS 60\n",
            &FileAttributes::new(0o640),
            &NoopIdentityResolver,
        )
        .unwrap();

        assert!(warnings.is_empty());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "PASS_MAX_DAYS 60\n");
        #[cfg(unix)]
        assert_eq!(mode_of(&target), Some(0o640));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_backup_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(backup_file(&dir.path().join("absent")).unwrap().is_none());

        let target = dir.path().join("sshd_config");
        std::fs::write(&target, "PermitRootLogin yes\n").unwrap();
        let backup = backup_file(&target).unwrap().unwrap();
        assert!(backup.to_string_lossy().contains(".stig-backup-"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"PermitRootLogin yes\n");
    }
}
