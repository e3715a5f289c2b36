//! # Recovery Points
//!
//! A recovery point is a directory under the storage root that mirrors the
//! absolute paths of the captured files and directories, plus a
//! `manifest.json` listing exactly what was captured. Restores only touch
//! manifest paths. Bundles are never deleted implicitly; old ones go through
//! [`RecoveryPointManager::prune`].

pub mod error;
pub mod manifest;

pub use error::RecoveryError;
pub use manifest::{CapturedDirectory, CapturedEntry, RecoveryManifest, MANIFEST_FILE};

use crate::config::RecoverySettings;
use crate::files::{mode_of, set_mode};
use crate::identity::{default_resolver, IdentityResolver};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use stig_runtime::logging::codes::{recovery, success};
use stig_runtime::{log_debug, log_error, log_info, log_success, log_warning};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryPoint {
    pub id: String,
    pub path: PathBuf,
    pub manifest: RecoveryManifest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub id: String,
    pub restored: Vec<String>,
}

/// A bundle directory found under the storage root, with its manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecoveryPoint {
    pub path: PathBuf,
    pub manifest: RecoveryManifest,
}

impl StoredRecoveryPoint {
    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Restores go through the directory name, so it must agree with the manifest
    pub fn id_matches(&self) -> bool {
        self.dir_name() == self.manifest.recovery_id
    }
}

/// Ids name a direct child of the storage root and nothing else
pub fn validate_id(id: &str) -> Result<(), RecoveryError> {
    let reason = if id.is_empty() {
        Some("id is empty")
    } else if id == "." || id == ".." {
        Some("id names a relative directory")
    } else if id.contains(['/', '\\', '\0']) {
        Some("id contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RecoveryError::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

pub struct RecoveryPointManager {
    settings: RecoverySettings,
    identity: Arc<dyn IdentityResolver>,
}

impl RecoveryPointManager {
    pub fn new(settings: RecoverySettings) -> Self {
        Self {
            settings,
            identity: Arc::from(default_resolver()),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.settings.storage_root
    }

    pub fn bundle_path(&self, id: &str) -> Result<PathBuf, RecoveryError> {
        validate_id(id)?;
        Ok(self.settings.storage_root.join(id))
    }

    // ========================================================================
    // CREATE
    // ========================================================================

    /// Capture the configured files and directories into a new bundle
    ///
    /// Missing sources are skipped. Items that fail to copy are logged and left
    /// out of the manifest, which is rewritten after every captured item.
    pub fn create(&self, name: &str) -> Result<RecoveryPoint, RecoveryError> {
        let root = &self.settings.storage_root;
        std::fs::create_dir_all(root).map_err(|e| RecoveryError::StorageUnavailable {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let (id, bundle) = self.allocate_bundle(name, &timestamp)?;
        log_info!("Creating recovery point", "id" => id, "path" => bundle.display());

        let mut manifest = RecoveryManifest::new(&id, name, &timestamp);
        manifest.save(&bundle)?;

        for file in &self.settings.critical_files {
            if !file.exists() {
                log_debug!("Skipping absent file", "path" => file.display());
                continue;
            }
            match self.capture_file(file, &bundle) {
                Ok(entry) => {
                    manifest.files.push(entry);
                    manifest.save(&bundle)?;
                }
                Err(e) => log_error!(
                    recovery::CAPTURE_FAILED,
                    &format!("Could not capture {}: {}", file.display(), e),
                    "id" => id
                ),
            }
        }

        for dir in &self.settings.critical_directories {
            if !dir.is_dir() {
                log_debug!("Skipping absent directory", "path" => dir.display());
                continue;
            }
            match self.capture_directory(dir, &bundle) {
                Ok(captured) => {
                    manifest.directories.push(captured);
                    manifest.save(&bundle)?;
                }
                Err(e) => log_error!(
                    recovery::CAPTURE_FAILED,
                    &format!("Could not capture {}: {}", dir.display(), e),
                    "id" => id
                ),
            }
        }

        log_success!(
            success::RECOVERY_POINT_CREATED,
            &format!("Recovery point created: {}", id),
            "files" => manifest.files.len(),
            "directories" => manifest.directories.len()
        );

        Ok(RecoveryPoint {
            id,
            path: bundle,
            manifest,
        })
    }

    /// `<name>_<timestamp>`, suffixed when a bundle of that id already exists
    fn allocate_bundle(&self, name: &str, timestamp: &str) -> Result<(String, PathBuf), RecoveryError> {
        let base = format!("{}_{}", name, timestamp);
        let mut id = base.clone();
        let mut n = 1;

        loop {
            let bundle = self.bundle_path(&id)?;
            match std::fs::create_dir(&bundle) {
                Ok(()) => {
                    let _ = set_mode(&bundle, 0o700);
                    return Ok((id, bundle));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    n += 1;
                    id = format!("{}_{}", base, n);
                }
                Err(e) => {
                    return Err(RecoveryError::StorageUnavailable {
                        path: bundle,
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    fn describe(&self, path: &Path, recorded_as: PathBuf) -> CapturedEntry {
        let (uid, gid) = match self.identity.owner_of(path) {
            Some((u, g)) => (Some(u), Some(g)),
            None => (None, None),
        };
        CapturedEntry {
            path: recorded_as,
            mode: mode_of(path),
            owner: uid.and_then(|u| self.identity.user_name(u)),
            group: gid.and_then(|g| self.identity.group_name(g)),
            uid,
            gid,
        }
    }

    fn capture_file(&self, file: &Path, bundle: &Path) -> std::io::Result<CapturedEntry> {
        copy_path(file, &mirror_path(bundle, file))?;
        Ok(self.describe(file, file.to_path_buf()))
    }

    fn capture_directory(&self, dir: &Path, bundle: &Path) -> std::io::Result<CapturedDirectory> {
        copy_path(dir, &mirror_path(bundle, dir))?;

        let mut contents = Vec::new();
        for entry in walkdir::WalkDir::new(dir).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            contents.push(self.describe(entry.path(), relative.to_path_buf()));
        }

        Ok(CapturedDirectory {
            root: self.describe(dir, dir.to_path_buf()),
            contents,
        })
    }

    // ========================================================================
    // RESTORE
    // ========================================================================

    /// Put every manifest entry back. Every entry is attempted once; any failure
    /// yields [`RecoveryError::RestoreIncomplete`].
    pub fn restore(&self, id: &str) -> Result<RestoreSummary, RecoveryError> {
        let bundle = self.bundle_path(id)?;
        if !bundle.is_dir() {
            log_error!(recovery::NOT_FOUND, &format!("Recovery point not found: {}", id));
            return Err(RecoveryError::NotFound { id: id.to_string() });
        }

        let manifest = RecoveryManifest::load(&bundle)?;
        log_warning!(&format!("Restoring recovery point {}", id), "items" => manifest.item_count());

        let mut restored = Vec::new();
        let mut failed = Vec::new();

        for entry in &manifest.files {
            let target = entry.path.display().to_string();
            match self.restore_file(&bundle, entry) {
                Ok(()) => restored.push(target),
                Err(e) => failed.push((target, e.to_string())),
            }
        }

        for captured in &manifest.directories {
            let target = captured.root.path.display().to_string();
            match self.restore_directory(&bundle, captured) {
                Ok(()) => restored.push(target),
                Err(e) => failed.push((target, e.to_string())),
            }
        }

        if failed.is_empty() {
            log_success!(
                success::RECOVERY_POINT_RESTORED,
                &format!("Recovery point {} restored; restart sshd and auditd to pick up restored settings", id),
                "items" => restored.len()
            );
            Ok(RestoreSummary {
                id: id.to_string(),
                restored,
            })
        } else {
            for (path, reason) in &failed {
                log_error!(
                    recovery::RESTORE_FAILED,
                    &format!("Could not restore {}: {}", path, reason),
                    "id" => id
                );
            }
            Err(RecoveryError::RestoreIncomplete {
                id: id.to_string(),
                restored,
                failed,
            })
        }
    }

    fn restore_file(&self, bundle: &Path, entry: &CapturedEntry) -> std::io::Result<()> {
        let source = mirror_path(bundle, &entry.path);
        if !source.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("bundle copy {} is missing", source.display()),
            ));
        }

        let file_name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let staged = entry.path.with_file_name(format!(".{}.stig-restore", file_name));
        let result = copy_path(&source, &staged)
            .and_then(|_| self.apply_metadata(&staged, entry))
            .and_then(|_| std::fs::rename(&staged, &entry.path));
        if result.is_err() {
            let _ = std::fs::remove_file(&staged);
        }
        result
    }

    fn restore_directory(&self, bundle: &Path, captured: &CapturedDirectory) -> std::io::Result<()> {
        let target = &captured.root.path;
        let source = mirror_path(bundle, target);
        if !source.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("bundle copy {} is missing", source.display()),
            ));
        }

        if target.exists() {
            std::fs::remove_dir_all(target)?;
        }
        copy_path(&source, target)?;

        self.apply_metadata(target, &captured.root)?;
        for entry in &captured.contents {
            self.apply_metadata(&target.join(&entry.path), entry)?;
        }
        Ok(())
    }

    /// Mode, then ownership by recorded name with the recorded ids as fallback
    fn apply_metadata(&self, path: &Path, entry: &CapturedEntry) -> std::io::Result<()> {
        let is_symlink = std::fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_symlink {
            return Ok(());
        }

        if let Some(mode) = entry.mode {
            set_mode(path, mode)?;
        }

        let uid = entry
            .owner
            .as_deref()
            .and_then(|name| self.identity.uid_for(name))
            .or(entry.uid);
        let gid = entry
            .group
            .as_deref()
            .and_then(|name| self.identity.gid_for(name))
            .or(entry.gid);

        let current = self.identity.owner_of(path);
        if current.is_some() && current != uid.zip(gid) {
            self.identity.set_owner(path, uid, gid)?;
        }
        Ok(())
    }

    // ========================================================================
    // LISTING AND RETENTION
    // ========================================================================

    /// Every bundle directory with a readable manifest, oldest first
    fn scan(&self) -> Result<Vec<StoredRecoveryPoint>, RecoveryError> {
        let root = &self.settings.storage_root;
        if !root.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(root).map_err(|e| RecoveryError::StorageUnavailable {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        let mut points: Vec<StoredRecoveryPoint> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| match RecoveryManifest::load(&entry.path()) {
                Ok(manifest) => Some(StoredRecoveryPoint {
                    path: entry.path(),
                    manifest,
                }),
                Err(e) => {
                    log_debug!("Ignoring directory without a valid manifest", "reason" => e);
                    None
                }
            })
            .collect();

        points.sort_by(|a, b| {
            a.manifest
                .created_at
                .cmp(&b.manifest.created_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(points)
    }

    /// All restorable recovery points, oldest first
    ///
    /// Bundles whose directory name differs from their manifest id (copied or
    /// renamed by hand) are left out; they can still be pruned.
    pub fn list(&self) -> Result<Vec<RecoveryManifest>, RecoveryError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|point| {
                if !point.id_matches() {
                    log_warning!(
                        "Recovery point directory does not match its manifest id",
                        "path" => point.path.display(),
                        "manifest_id" => point.manifest.recovery_id
                    );
                }
                point.id_matches()
            })
            .map(|point| point.manifest)
            .collect())
    }

    pub fn latest(&self) -> Result<Option<RecoveryManifest>, RecoveryError> {
        Ok(self.list()?.pop())
    }

    pub fn load(&self, id: &str) -> Result<RecoveryManifest, RecoveryError> {
        let bundle = self.bundle_path(id)?;
        if !bundle.is_dir() {
            return Err(RecoveryError::NotFound { id: id.to_string() });
        }
        RecoveryManifest::load(&bundle)
    }

    /// Bundles created before `cutoff`
    pub fn expired_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<StoredRecoveryPoint>, RecoveryError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|point| point.manifest.created_at < cutoff)
            .collect())
    }

    /// Bundles older than the configured retention window
    pub fn expired(&self) -> Result<Vec<StoredRecoveryPoint>, RecoveryError> {
        self.expired_before(self.retention_cutoff())
    }

    fn retention_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - ChronoDuration::days(i64::from(self.settings.retention_days))
    }

    /// Delete bundles outside the retention window; returns the removed directory names
    pub fn prune(&self) -> Result<Vec<String>, RecoveryError> {
        self.prune_before(self.retention_cutoff())
    }

    /// Removes the scanned directories themselves. Every expired bundle is
    /// attempted; the first failure is reported after the others ran.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, RecoveryError> {
        let mut removed = Vec::new();
        let mut failure = None;

        for point in self.expired_before(cutoff)? {
            let name = point.dir_name();
            match std::fs::remove_dir_all(&point.path) {
                Ok(()) => {
                    log_info!("Pruned recovery point", "id" => name);
                    removed.push(name);
                }
                Err(e) => {
                    log_error!(recovery::PRUNE_FAILED, &format!("Cannot remove {}: {}", name, e));
                    if failure.is_none() {
                        failure = Some(RecoveryError::PruneFailed {
                            id: name,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        match failure {
            Some(error) => Err(error),
            None => Ok(removed),
        }
    }
}

// ============================================================================
// COPY HELPERS
// ============================================================================

/// Location of `original` inside `bundle`, mirroring its absolute path
pub fn mirror_path(bundle: &Path, original: &Path) -> PathBuf {
    original
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .fold(bundle.to_path_buf(), |acc, part| acc.join(part))
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if std::fs::symlink_metadata(dst).is_ok() {
        std::fs::remove_file(dst)?;
    }
    let target = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::copy(src, dst).map(|_| ())
}

/// Copy a file, symlink or directory tree; regular files keep their permission bits
fn copy_path(src: &Path, dst: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(src)?;
    if meta.file_type().is_symlink() {
        return copy_symlink(src, dst);
    }

    if meta.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in walkdir::WalkDir::new(src).min_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
            let out = dst.join(relative);

            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&out)?;
                if let Some(mode) = mode_of(entry.path()) {
                    set_mode(&out, mode)?;
                }
            } else if entry.file_type().is_symlink() {
                copy_symlink(entry.path(), &out)?;
            } else {
                if let Some(parent) = out.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &out)?;
            }
        }
        if let Some(mode) = mode_of(src) {
            set_mode(dst, mode)?;
        }
        return Ok(());
    }

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(src, dst).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NoopIdentityResolver;

    struct Fixture {
        _dir: tempfile::TempDir,
        etc: PathBuf,
        manager: RecoveryPointManager,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let etc = dir.path().join("etc");
        std::fs::create_dir_all(etc.join("sysctl.d")).unwrap();
        std::fs::write(etc.join("sudoers"), "root ALL=(ALL) ALL\n").unwrap();
        std::fs::write(etc.join("login.defs"), "PASS_MAX_DAYS 99999\n").unwrap();
        std::fs::write(etc.join("sysctl.d/10-net.conf"), "net.ipv4.ip_forward = 1\n").unwrap();
        set_mode(&etc.join("sudoers"), 0o440).unwrap();

        let settings = RecoverySettings {
            storage_root: dir.path().join("recovery"),
            critical_files: vec![etc.join("sudoers"), etc.join("login.defs"), etc.join("absent.conf")],
            critical_directories: vec![etc.join("sysctl.d"), etc.join("audit/rules.d")],
            retention_days: 30,
        };
        let manager = RecoveryPointManager::new(settings).with_identity(Arc::new(NoopIdentityResolver));
        Fixture { _dir: dir, etc, manager }
    }

    #[test]
    fn test_mirror_path() {
        assert_eq!(
            mirror_path(Path::new("/var/lib/rp/x"), Path::new("/etc/ssh/sshd_config")),
            PathBuf::from("/var/lib/rp/x/etc/ssh/sshd_config")
        );
    }

    #[test]
    fn test_create_records_only_captured_items() {
        let f = fixture();
        let point = f.manager.create("pre_remediation").unwrap();

        assert!(point.id.starts_with("pre_remediation_"));
        assert_eq!(point.manifest.files.len(), 2);
        assert_eq!(point.manifest.directories.len(), 1);
        assert_eq!(point.manifest.directories[0].contents.len(), 1);
        assert!(mirror_path(&point.path, &f.etc.join("sysctl.d/10-net.conf")).exists());
        assert_eq!(RecoveryManifest::load(&point.path).unwrap(), point.manifest);
    }

    #[test]
    fn test_round_trip_restores_bytes_and_permissions() {
        let f = fixture();
        let point = f.manager.create("pre").unwrap();

        std::fs::write(f.etc.join("sudoers"), "ALL ALL=(ALL) NOPASSWD: ALL\n").unwrap();
        set_mode(&f.etc.join("sudoers"), 0o666).unwrap();
        std::fs::write(f.etc.join("sysctl.d/10-net.conf"), "net.ipv4.ip_forward = 0\n").unwrap();
        std::fs::write(f.etc.join("sysctl.d/99-new.conf"), "kernel.kptr_restrict = 2\n").unwrap();
        std::fs::write(f.etc.join("untracked"), "left alone\n").unwrap();

        let summary = f.manager.restore(&point.id).unwrap();
        assert_eq!(summary.restored.len(), 3);

        assert_eq!(
            std::fs::read_to_string(f.etc.join("sudoers")).unwrap(),
            "root ALL=(ALL) ALL\n"
        );
        #[cfg(unix)]
        assert_eq!(mode_of(&f.etc.join("sudoers")), Some(0o440));
        assert_eq!(
            std::fs::read_to_string(f.etc.join("sysctl.d/10-net.conf")).unwrap(),
            "net.ipv4.ip_forward = 1\n"
        );
        assert!(!f.etc.join("sysctl.d/99-new.conf").exists());
        assert!(f.etc.join("untracked").exists());
    }

    #[test]
    fn test_partial_restore_is_critical() {
        let f = fixture();
        let point = f.manager.create("pre").unwrap();
        std::fs::remove_file(mirror_path(&point.path, &f.etc.join("login.defs"))).unwrap();

        let err = f.manager.restore(&point.id).unwrap_err();
        assert!(err.is_critical());
        match err {
            RecoveryError::RestoreIncomplete { restored, failed, .. } => {
                assert_eq!(failed.len(), 1);
                assert_eq!(restored.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_id() {
        let f = fixture();
        assert_matches::assert_matches!(
            f.manager.restore("nope_20200101_000000"),
            Err(RecoveryError::NotFound { .. })
        );
    }

    #[test]
    fn test_collision_safe_ids_and_listing() {
        let f = fixture();
        let a = f.manager.create("pre").unwrap();
        let b = f.manager.create("pre").unwrap();
        assert_ne!(a.id, b.id);

        let listed = f.manager.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(f.manager.latest().unwrap().unwrap().recovery_id, b.id);
    }

    #[test]
    fn test_prune_respects_cutoff() {
        let f = fixture();
        let old = f.manager.create("old").unwrap();
        let fresh = f.manager.create("fresh").unwrap();

        let mut manifest = old.manifest.clone();
        manifest.created_at = Utc::now() - ChronoDuration::days(45);
        manifest.save(&old.path).unwrap();

        assert_eq!(f.manager.expired().unwrap().len(), 1);
        let removed = f.manager.prune().unwrap();
        assert_eq!(removed, vec![old.id.clone()]);
        assert!(!old.path.exists());
        assert!(fresh.path.exists());
    }

    #[test]
    fn test_prune_removes_copied_bundles_by_directory() {
        let f = fixture();
        let old = f.manager.create("old").unwrap();

        let mut manifest = old.manifest.clone();
        manifest.created_at = Utc::now() - ChronoDuration::days(45);
        manifest.save(&old.path).unwrap();

        let copy = f.manager.storage_root().join("old_copy");
        copy_path(&old.path, &copy).unwrap();

        let listed = f.manager.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].recovery_id, old.id);

        let mut removed = f.manager.prune().unwrap();
        removed.sort();
        let mut expected = vec![old.id.clone(), "old_copy".to_string()];
        expected.sort();
        assert_eq!(removed, expected);
        assert!(!old.path.exists());
        assert!(!copy.exists());
    }

    #[test]
    fn test_ids_cannot_leave_storage_root() {
        let f = fixture();
        assert_matches::assert_matches!(f.manager.restore("../etc"), Err(RecoveryError::InvalidId { .. }));
        assert_matches::assert_matches!(f.manager.load("a/b"), Err(RecoveryError::InvalidId { .. }));
        assert_matches::assert_matches!(f.manager.create("../escape"), Err(RecoveryError::InvalidId { .. }));
        assert_matches::assert_matches!(validate_id(".."), Err(RecoveryError::InvalidId { .. }));
        assert!(validate_id("pre_stig_20240101_120000").is_ok());

        // A manifest id pointing outside the root never steers deletion
        let outside = f.manager.storage_root().parent().unwrap().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        let point = f.manager.create("tampered").unwrap();
        let mut manifest = point.manifest.clone();
        manifest.recovery_id = "../outside".to_string();
        manifest.created_at = Utc::now() - ChronoDuration::days(45);
        manifest.save(&point.path).unwrap();

        assert!(f.manager.list().unwrap().is_empty());
        assert_eq!(f.manager.prune().unwrap(), vec![point.id.clone()]);
        assert!(!point.path.exists());
        assert!(outside.exists());
    }
}
