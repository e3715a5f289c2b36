//! User and group resolution for file ownership
//!
//! Recovery points record owners by name and restore them by id, so bundles
//! survive uid renumbering. Platforms without a passwd database get the
//! degraded no-op resolver.

use std::path::{Path, PathBuf};

pub trait IdentityResolver: Send + Sync {
    fn uid_for(&self, user: &str) -> Option<u32>;
    fn gid_for(&self, group: &str) -> Option<u32>;
    fn user_name(&self, uid: u32) -> Option<String>;
    fn group_name(&self, gid: u32) -> Option<String>;

    /// Change ownership; `None` leaves that id unchanged
    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> std::io::Result<()>;

    /// Owner ids of an existing path, if the platform has them
    fn owner_of(&self, path: &Path) -> Option<(u32, u32)>;
}

/// Resolver backed by `/etc/passwd` and `/etc/group`
#[derive(Debug, Clone)]
pub struct SystemIdentityResolver {
    passwd_path: PathBuf,
    group_path: PathBuf,
}

impl SystemIdentityResolver {
    pub fn new() -> Self {
        Self::with_databases("/etc/passwd", "/etc/group")
    }

    pub fn with_databases(passwd: impl Into<PathBuf>, group: impl Into<PathBuf>) -> Self {
        Self {
            passwd_path: passwd.into(),
            group_path: group.into(),
        }
    }

    /// Yields (name, id) pairs from a colon-separated database, id in field 3
    fn entries(path: &Path) -> Vec<(String, u32)> {
        std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split(':');
                let name = fields.next()?;
                let id = fields.nth(1)?.parse().ok()?;
                Some((name.to_string(), id))
            })
            .collect()
    }
}

impl Default for SystemIdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityResolver for SystemIdentityResolver {
    fn uid_for(&self, user: &str) -> Option<u32> {
        Self::entries(&self.passwd_path)
            .into_iter()
            .find(|(name, _)| name == user)
            .map(|(_, id)| id)
    }

    fn gid_for(&self, group: &str) -> Option<u32> {
        Self::entries(&self.group_path)
            .into_iter()
            .find(|(name, _)| name == group)
            .map(|(_, id)| id)
    }

    fn user_name(&self, uid: u32) -> Option<String> {
        Self::entries(&self.passwd_path)
            .into_iter()
            .find(|(_, id)| *id == uid)
            .map(|(name, _)| name)
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        Self::entries(&self.group_path)
            .into_iter()
            .find(|(_, id)| *id == gid)
            .map(|(name, _)| name)
    }

    #[cfg(unix)]
    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> std::io::Result<()> {
        std::os::unix::fs::chown(path, uid, gid)
    }

    #[cfg(not(unix))]
    fn set_owner(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> std::io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn owner_of(&self, path: &Path) -> Option<(u32, u32)> {
        use std::os::unix::fs::MetadataExt;
        std::fs::symlink_metadata(path)
            .ok()
            .map(|m| (m.uid(), m.gid()))
    }

    #[cfg(not(unix))]
    fn owner_of(&self, _path: &Path) -> Option<(u32, u32)> {
        None
    }
}

/// Resolver for platforms without user/group ownership
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIdentityResolver;

impl IdentityResolver for NoopIdentityResolver {
    fn uid_for(&self, _user: &str) -> Option<u32> {
        None
    }

    fn gid_for(&self, _group: &str) -> Option<u32> {
        None
    }

    fn user_name(&self, _uid: u32) -> Option<String> {
        None
    }

    fn group_name(&self, _gid: u32) -> Option<String> {
        None
    }

    fn set_owner(&self, _path: &Path, _uid: Option<u32>, _gid: Option<u32>) -> std::io::Result<()> {
        Ok(())
    }

    fn owner_of(&self, _path: &Path) -> Option<(u32, u32)> {
        None
    }
}

/// Resolver appropriate for the current platform
pub fn default_resolver() -> Box<dyn IdentityResolver> {
    if cfg!(unix) {
        Box::new(SystemIdentityResolver::new())
    } else {
        Box::new(NoopIdentityResolver)
    }
}

/// Effective uid of this process, from `/proc/self/status`
pub fn current_euid() -> Option<u32> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    status
        .lines()
        .find(|line| line.starts_with("Uid:"))
        .and_then(|line| line.split_whitespace().nth(2))
        .and_then(|euid| euid.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, SystemIdentityResolver) {
        let dir = tempfile::tempdir().unwrap();
        let passwd = dir.path().join("passwd");
        let group = dir.path().join("group");
        std::fs::write(
            &passwd,
            "# comment\nroot:x:0:0:root:/root:/bin/bash\nsyslog:x:104:110::/home/syslog:/usr/sbin/nologin\n",
        )
        .unwrap();
        std::fs::write(&group, "root:x:0:\nadm:x:4:syslog\nshadow:x:42:\n").unwrap();
        let resolver = SystemIdentityResolver::with_databases(passwd, group);
        (dir, resolver)
    }

    #[test]
    fn test_name_lookups() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.uid_for("syslog"), Some(104));
        assert_eq!(resolver.gid_for("shadow"), Some(42));
        assert_eq!(resolver.user_name(0).as_deref(), Some("root"));
        assert_eq!(resolver.group_name(4).as_deref(), Some("adm"));
        assert_eq!(resolver.uid_for("nobody-here"), None);
    }

    #[test]
    fn test_noop_resolver() {
        let resolver = NoopIdentityResolver;
        assert_eq!(resolver.uid_for("root"), None);
        assert!(resolver.set_owner(Path::new("/nonexistent"), Some(0), None).is_ok());
    }
}
