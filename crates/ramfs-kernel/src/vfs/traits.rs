//! The VFS operation table.

use async_trait::async_trait;
use std::sync::Arc;

// The boundary vocabulary lives in ramfs-types.
pub use ramfs_types::{
    DirEntry, FcntlCmd, FileStat, Handle, OpenFlags, VfsError, VfsResult, Whence,
};

/// The operation table a filesystem exports to the VFS.
///
/// Paths are relative to the filesystem root; a leading `/` is
/// tolerated. Handle-addressed operations take the [`Handle`] returned
/// by [`open`](VfsOps::open) on the *same* filesystem — handles do not
/// travel between mounts.
///
/// The trailing default methods are the slots this family of
/// filesystems leaves unimplemented; they fail with
/// [`VfsError::Unsupported`] unless an implementation overrides them.
#[async_trait]
pub trait VfsOps: Send + Sync {
    /// Open a file or directory, returning a handle.
    async fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Handle>;

    /// Close a handle. Best-effort: always succeeds, including for
    /// handles that are not open.
    async fn close(&self, handle: Handle) -> VfsResult<()>;

    /// Read up to `buf.len()` bytes at the cursor, advancing it.
    /// Returns the number of bytes copied, 0 at end-of-file.
    async fn read(&self, handle: Handle, buf: &mut [u8]) -> VfsResult<usize>;

    /// Write `data` at the cursor, growing the file as needed.
    /// Returns the number of bytes written.
    async fn write(&self, handle: Handle, data: &[u8]) -> VfsResult<usize>;

    /// Reposition the cursor. The result is clamped to the logical
    /// size; seeking never extends a file.
    async fn seek(&self, handle: Handle, offset: i64, whence: Whence) -> VfsResult<u32>;

    /// The current cursor position.
    async fn tell(&self, handle: Handle) -> VfsResult<u32>;

    /// The logical size of the file.
    async fn total(&self, handle: Handle) -> VfsResult<u32>;

    /// Yield the next entry of an open directory, advancing the
    /// enumeration.
    ///
    /// Fails with [`VfsError::BadHandle`] when the handle is not an
    /// open directory, and likewise when the enumeration is exhausted.
    /// Callers loop with `while let Ok(entry)` and restart with
    /// [`rewinddir`](VfsOps::rewinddir).
    async fn readdir(&self, handle: Handle) -> VfsResult<DirEntry>;

    /// Restart a directory enumeration from the first entry.
    async fn rewinddir(&self, handle: Handle) -> VfsResult<()>;

    /// Stat by path.
    async fn stat(&self, path: &str) -> VfsResult<FileStat>;

    /// Stat by open handle.
    async fn fstat(&self, handle: Handle) -> VfsResult<FileStat>;

    /// Remove a file. Fails while any handle holds the file open.
    async fn unlink(&self, path: &str) -> VfsResult<()>;

    /// A zero-copy shared view of the file's content buffer.
    ///
    /// The returned buffer is a stable snapshot: the filesystem never
    /// mutates it in place. A write issued after `mmap` replaces or
    /// copies the node's buffer, leaving existing holders unaffected.
    async fn mmap(&self, handle: Handle) -> VfsResult<Arc<Vec<u8>>>;

    /// Handle-level control. [`FcntlCmd::GetFlags`] returns the flags
    /// the handle was opened with; the remaining commands are accepted
    /// and return 0.
    async fn fcntl(&self, handle: Handle, cmd: FcntlCmd) -> VfsResult<u32>;

    // ── Unimplemented table slots ───────────────────────────────────

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let _ = (from, to);
        Err(VfsError::Unsupported)
    }

    async fn mkdir(&self, path: &str) -> VfsResult<()> {
        let _ = path;
        Err(VfsError::Unsupported)
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        let _ = path;
        Err(VfsError::Unsupported)
    }

    async fn link(&self, target: &str, link: &str) -> VfsResult<()> {
        let _ = (target, link);
        Err(VfsError::Unsupported)
    }

    async fn symlink(&self, target: &str, link: &str) -> VfsResult<()> {
        let _ = (target, link);
        Err(VfsError::Unsupported)
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        let _ = path;
        Err(VfsError::Unsupported)
    }
}

impl std::fmt::Debug for dyn VfsOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("dyn VfsOps").finish_non_exhaustive()
    }
}
