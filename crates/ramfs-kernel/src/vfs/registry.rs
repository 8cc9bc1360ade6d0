//! The VFS registry: mount points and path routing.
//!
//! The registry stands in for the host kernel's name manager. A
//! filesystem registers its operation table under a mount path;
//! path-addressed operations are routed to the mount with the longest
//! matching prefix. Handle-addressed operations are not routed —
//! `open` hands back the owning filesystem alongside the handle, and
//! the caller talks to it directly from then on.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::traits::VfsOps;
use ramfs_types::{FileStat, Handle, OpenFlags, VfsError, VfsResult};

/// Routes path-addressed operations to mounted filesystems.
///
/// Mount points are matched by longest prefix: with `/ram` and
/// `/ram/cache` both mounted, `/ram/cache/x` routes to the latter.
#[derive(Default)]
pub struct VfsRegistry {
    /// Mounts keyed by normalized path. BTreeMap for ordered listing.
    mounts: RwLock<BTreeMap<String, Arc<dyn VfsOps>>>,
}

impl std::fmt::Debug for VfsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VfsRegistry").finish_non_exhaustive()
    }
}

impl VfsRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filesystem at `path`, replacing any previous mount
    /// there.
    pub async fn mount(&self, path: impl Into<String>, fs: Arc<dyn VfsOps>) {
        let path = Self::normalize(&path.into());
        tracing::debug!(mount = %path, "registering filesystem");
        self.mounts.write().await.insert(path, fs);
    }

    /// Deregister the filesystem at `path`. Returns `true` if a mount
    /// was removed.
    pub async fn unmount(&self, path: impl AsRef<str>) -> bool {
        let path = Self::normalize(path.as_ref());
        let removed = self.mounts.write().await.remove(&path).is_some();
        if removed {
            tracing::debug!(mount = %path, "deregistered filesystem");
        }
        removed
    }

    /// All current mount paths, in order.
    pub async fn list_mounts(&self) -> Vec<String> {
        self.mounts.read().await.keys().cloned().collect()
    }

    /// Find the mount responsible for `path`, returning the filesystem
    /// and the path relative to its root.
    pub async fn find(&self, path: &str) -> Option<(Arc<dyn VfsOps>, String)> {
        let normalized = Self::normalize(path);
        let mounts = self.mounts.read().await;

        let mut best: Option<(&String, &Arc<dyn VfsOps>)> = None;
        for (mount, fs) in mounts.iter() {
            let matches = mount == "/"
                || normalized == *mount
                || normalized.starts_with(&format!("{mount}/"));
            if matches && best.is_none_or(|(b, _)| mount.len() > b.len()) {
                best = Some((mount, fs));
            }
        }

        let (mount, fs) = best?;
        let relative = if mount == "/" {
            normalized.trim_start_matches('/').to_string()
        } else {
            normalized[mount.len()..].trim_start_matches('/').to_string()
        };
        Some((Arc::clone(fs), relative))
    }

    /// Open through the registry. The returned filesystem is the one
    /// the handle belongs to; all further handle-addressed operations
    /// go to it directly.
    pub async fn open(
        &self,
        path: &str,
        flags: OpenFlags,
    ) -> VfsResult<(Arc<dyn VfsOps>, Handle)> {
        let (fs, relative) = self
            .find(path)
            .await
            .ok_or_else(|| VfsError::NotFound(format!("no mount for {path:?}")))?;
        let handle = fs.open(&relative, flags).await?;
        Ok((fs, handle))
    }

    /// Stat by path, routed to the owning mount.
    pub async fn stat(&self, path: &str) -> VfsResult<FileStat> {
        let (fs, relative) = self
            .find(path)
            .await
            .ok_or_else(|| VfsError::NotFound(format!("no mount for {path:?}")))?;
        fs.stat(&relative).await
    }

    /// Unlink by path, routed to the owning mount.
    pub async fn unlink(&self, path: &str) -> VfsResult<()> {
        let (fs, relative) = self
            .find(path)
            .await
            .ok_or_else(|| VfsError::NotFound(format!("no mount for {path:?}")))?;
        fs.unlink(&relative).await
    }

    /// Normalize a path: ensure a leading `/`, strip trailing ones.
    fn normalize(path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        }
    }
}
