//! The ramdisk filesystem.
//!
//! Directory structure and file content both live in heap memory;
//! there is no backing device and no arbitrary size limit beyond
//! available RAM. Intended as scratch space for temporary data, as a
//! cache for slower media, and as a target for attaching
//! externally-prepared buffers as files without copying.
//!
//! A note on concurrent use: the engine is consistent at the data
//! structure and handle level, but files are not individually locked.
//! Only one handle may hold a file open for writing, and a file open
//! for reading cannot be opened for writing (nor the reverse). The
//! working pattern for shared data is: write the file, close it, then
//! let readers open it read-only.

mod handle;
mod node;

use std::sync::Arc;

use tokio::sync::Mutex;

use super::registry::VfsRegistry;
use super::traits::VfsOps;
use async_trait::async_trait;
use ramfs_types::{
    AccessMode, DirEntry, FcntlCmd, FileMode, FileStat, Handle, OpenFlags, VfsError, VfsResult,
    Whence,
};

use handle::{Cursor, HandleTable, OpenHandle};
use node::{NodeTable, OpenMode};

/// Mount name the filesystem registers under.
pub const MOUNT_POINT: &str = "/ram";

/// Capacity of the handle table; slot 0 is reserved, so one less handle
/// can be open at a time.
pub const MAX_HANDLES: usize = 32;

/// Every file starts with this much buffer space.
pub const INITIAL_CAPACITY: usize = 1024;

/// Growth past the current capacity reallocates to the write's end plus
/// this much, to keep realloc traffic down.
pub const REALLOC_SLACK: usize = 4096;

/// Capacity of the throwaway buffer `detach` leaves on a node for the
/// moment between draining it and unlinking it.
pub const DETACH_PLACEHOLDER_CAPACITY: usize = 64;

/// The `stat.dev` tag callers use to recognize this filesystem.
pub const DEVICE_TAG: u32 = ('r' as u32) | (('a' as u32) << 8) | (('m' as u32) << 16);

/// Everything the engine mutex protects.
#[derive(Debug)]
struct FsState {
    nodes: NodeTable,
    handles: HandleTable,
}

/// The in-memory filesystem engine.
///
/// All state sits behind one `tokio::sync::Mutex`; every operation
/// locks on entry and the guard releases on every exit path. Lock
/// acquisition is the only suspension point — once the guard is held,
/// operations run straight through. Exclusion between openers is
/// try-and-fail ([`VfsError::Busy`]), never wait-for.
#[derive(Debug)]
pub struct RamFs {
    state: Mutex<FsState>,
}

impl Default for RamFs {
    fn default() -> Self {
        Self::new()
    }
}

impl RamFs {
    /// Create an empty filesystem with a resident root directory.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FsState {
                nodes: NodeTable::new(),
                handles: HandleTable::new(MAX_HANDLES),
            }),
        }
    }

    /// Splice a caller-owned buffer into the filesystem as the content
    /// of `path`, creating the file if needed. Ownership of `data`
    /// transfers to the filesystem; no bytes are copied.
    ///
    /// Expressed as a write-mode open so it inherits the full
    /// exclusion protocol: attaching over a file that is open in any
    /// mode fails with [`VfsError::Busy`].
    pub async fn attach(&self, path: &str, data: Vec<u8>) -> VfsResult<()> {
        let handle = self.open(path, OpenFlags::WRONLY | OpenFlags::TRUNC).await?;
        {
            let mut st = self.state.lock().await;
            let FsState { nodes, handles } = &mut *st;
            let open = handles.get(handle).expect("handle was just opened");
            let file = nodes
                .get_mut(open.node)
                .file_mut()
                .expect("write-mode opens land on files");
            file.replace(data);
        }
        self.close(handle).await
    }

    /// The opposite of [`attach`](RamFs::attach): drain `path`'s
    /// content buffer out of the filesystem and unlink the file. The
    /// returned vector's length is the file's logical size; ownership
    /// is exclusively the caller's.
    pub async fn detach(&self, path: &str) -> VfsResult<Vec<u8>> {
        let handle = self.open(path, OpenFlags::RDONLY).await?;
        let taken = {
            let mut st = self.state.lock().await;
            let FsState { nodes, handles } = &mut *st;
            let open = handles.get(handle).expect("handle was just opened");
            let file = nodes
                .get_mut(open.node)
                .file_mut()
                .expect("non-directory opens land on files");
            file.take()
        };
        self.close(handle).await?;
        let taken = taken?;
        if let Err(e) = self.unlink(path).await {
            // The buffer is already in the caller's hands; losing it
            // over a failed unlink would be worse than the stale node.
            tracing::warn!(path, error = %e, "detach could not unlink the drained file");
        }
        Ok(taken)
    }

    /// Drop every file and handle, leaving only the empty root. All
    /// children sit directly under the root since directories cannot
    /// be created through this filesystem.
    pub async fn clear(&self) {
        let mut st = self.state.lock().await;
        st.handles.clear();
        st.nodes.clear();
    }

    #[cfg(test)]
    pub(crate) async fn assert_invariants(&self) {
        let st = self.state.lock().await;
        for (id, node) in st.nodes.iter() {
            let open_handles = st.handles.iter_occupied().filter(|h| h.node == id).count() as u32;
            assert_eq!(
                node.use_count, open_handles,
                "use count out of step with the handle table on {:?}",
                node.name
            );
            if node.use_count == 0 {
                assert_eq!(node.open_mode, OpenMode::None);
            }
            if let Some(file) = node.file() {
                assert!(file.capacity() >= file.len());
            }
            if node.is_dir() {
                let names: Vec<String> = node
                    .children()
                    .iter()
                    .map(|&c| st.nodes.get(c).name.to_ascii_lowercase())
                    .collect();
                let mut unique = names.clone();
                unique.sort();
                unique.dedup();
                assert_eq!(names.len(), unique.len(), "duplicate names in {:?}", node.name);
            }
        }
        for open in st.handles.iter_occupied() {
            if let Cursor::File(cursor) = open.cursor {
                let file = st
                    .nodes
                    .get(open.node)
                    .file()
                    .expect("file cursor on a file node");
                assert!(cursor as usize <= file.len());
            }
        }
    }
}

/// Build the stat fill for a node. `stat` by path only ever reaches
/// files (plus the root shortcut); directories arrive here through
/// `fstat` on directory handles.
fn stat_for(node: &node::Node) -> FileStat {
    match node.file() {
        None => FileStat {
            dev: DEVICE_TAG,
            mode: FileMode(FileMode::S_IFDIR | FileMode::RW_ALL | FileMode::X_ALL),
            size: -1,
            nlink: 2,
            blksize: 1024,
            blocks: 0,
        },
        Some(file) => FileStat {
            dev: DEVICE_TAG,
            mode: FileMode(FileMode::S_IFREG | FileMode::RW_ALL),
            size: file.capacity() as i64,
            nlink: 1,
            blksize: 1024,
            blocks: file.capacity().div_ceil(1024) as u32,
        },
    }
}

#[async_trait]
impl VfsOps for RamFs {
    async fn open(&self, path: &str, flags: OpenFlags) -> VfsResult<Handle> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut st = self.state.lock().await;

        let want_dir = flags.contains(OpenFlags::DIRECTORY);
        if want_dir && flags.access() != AccessMode::ReadOnly {
            return Err(VfsError::Invalid(
                "directory opens must be read-only".to_string(),
            ));
        }

        let node = if path.is_empty() {
            st.nodes.root()
        } else {
            match st.nodes.resolve(path, want_dir) {
                Some(found) => found,
                // A writable miss creates the file; the parents must
                // already exist.
                None if flags.is_writable() && !want_dir => {
                    let (parent, leaf) = st.nodes.split_parent(path)?;
                    st.nodes.create_file(parent, leaf)?
                }
                None => return Err(VfsError::NotFound(path.to_string())),
            }
        };

        if st.nodes.get(node).is_dir() && !want_dir {
            return Err(VfsError::Invalid(format!(
                "{path:?} is a directory; open it with OpenFlags::DIRECTORY"
            )));
        }

        let slot = st.handles.find_free()?;

        match st.nodes.get(node).open_mode {
            OpenMode::Writing => {
                return Err(VfsError::Busy(format!("{path:?} is open for writing")))
            }
            OpenMode::Reading if flags.is_writable() => {
                return Err(VfsError::Busy(format!("{path:?} is open for reading")))
            }
            _ => {}
        }

        // The fallible piece first: a failed truncation must not leave
        // a half-committed open behind.
        let cursor = if want_dir {
            Cursor::Dir(st.nodes.first_child(node))
        } else if flags.is_writable() {
            let file = st
                .nodes
                .get_mut(node)
                .file_mut()
                .expect("checked not a directory");
            if flags.contains(OpenFlags::APPEND) {
                Cursor::File(file.len() as u32)
            } else {
                if flags.contains(OpenFlags::TRUNC) {
                    file.reset()?;
                }
                Cursor::File(0)
            }
        } else {
            Cursor::File(0)
        };

        let node_mut = st.nodes.get_mut(node);
        node_mut.open_mode = if flags.is_writable() {
            OpenMode::Writing
        } else {
            OpenMode::Reading
        };
        node_mut.use_count += 1;

        st.handles.install(
            slot,
            OpenHandle {
                node,
                dir: want_dir,
                cursor,
                flags,
            },
        );
        Ok(slot)
    }

    async fn close(&self, handle: Handle) -> VfsResult<()> {
        let mut st = self.state.lock().await;
        match st.handles.release(handle) {
            Some(open) => {
                let node = st.nodes.get_mut(open.node);
                debug_assert!(node.use_count > 0, "use count underflow");
                node.use_count = node.use_count.saturating_sub(1);
                if node.use_count == 0 {
                    node.open_mode = OpenMode::None;
                }
            }
            // Tolerated: callers double-close, and close must not fail.
            None => tracing::debug!(%handle, "close of a handle that is not open"),
        }
        Ok(())
    }

    async fn read(&self, handle: Handle, buf: &mut [u8]) -> VfsResult<usize> {
        let mut st = self.state.lock().await;
        let FsState { nodes, handles } = &mut *st;
        let open = handles.get_mut(handle).ok_or(VfsError::BadHandle)?;
        let Cursor::File(cursor) = open.cursor else {
            return Err(VfsError::BadHandle);
        };
        let file = nodes.get(open.node).file().ok_or(VfsError::BadHandle)?;

        let at = cursor as usize;
        let n = buf.len().min(file.len() - at);
        buf[..n].copy_from_slice(&file.as_slice()[at..at + n]);
        open.cursor = Cursor::File(cursor + n as u32);
        Ok(n)
    }

    async fn write(&self, handle: Handle, data: &[u8]) -> VfsResult<usize> {
        let mut st = self.state.lock().await;
        let FsState { nodes, handles } = &mut *st;
        let open = handles.get_mut(handle).ok_or(VfsError::BadHandle)?;
        let Cursor::File(cursor) = open.cursor else {
            return Err(VfsError::BadHandle);
        };
        let node = nodes.get_mut(open.node);
        if node.open_mode != OpenMode::Writing {
            return Err(VfsError::BadHandle);
        }

        let end = u64::from(cursor) + data.len() as u64;
        if end > u64::from(u32::MAX) {
            return Err(VfsError::Invalid(
                "write would pass the 32-bit offset limit".to_string(),
            ));
        }
        let file = node.file_mut().expect("write handles land on files");
        file.write_at(cursor as usize, data)?;
        open.cursor = Cursor::File(end as u32);
        Ok(data.len())
    }

    async fn seek(&self, handle: Handle, offset: i64, whence: Whence) -> VfsResult<u32> {
        let mut st = self.state.lock().await;
        let FsState { nodes, handles } = &mut *st;
        let open = handles.get_mut(handle).ok_or(VfsError::BadHandle)?;
        let Cursor::File(cursor) = open.cursor else {
            return Err(VfsError::BadHandle);
        };
        let len = nodes.get(open.node).file().ok_or(VfsError::BadHandle)?.len() as i64;

        let target = match whence {
            Whence::Set => offset,
            Whence::Current => i64::from(cursor) + offset,
            Whence::End => len + offset,
        };
        if target < 0 {
            return Err(VfsError::Invalid(format!(
                "seek to a negative offset ({target})"
            )));
        }

        // Seeking past end-of-file caps at the logical size rather
        // than extending the file.
        let landed = target.min(len) as u32;
        open.cursor = Cursor::File(landed);
        Ok(landed)
    }

    async fn tell(&self, handle: Handle) -> VfsResult<u32> {
        let st = self.state.lock().await;
        match st.handles.get(handle).ok_or(VfsError::BadHandle)?.cursor {
            Cursor::File(cursor) => Ok(cursor),
            Cursor::Dir(_) => Err(VfsError::BadHandle),
        }
    }

    async fn total(&self, handle: Handle) -> VfsResult<u32> {
        let st = self.state.lock().await;
        let open = st.handles.get(handle).ok_or(VfsError::BadHandle)?;
        if open.dir {
            return Err(VfsError::BadHandle);
        }
        let file = st.nodes.get(open.node).file().ok_or(VfsError::BadHandle)?;
        Ok(file.len() as u32)
    }

    async fn readdir(&self, handle: Handle) -> VfsResult<DirEntry> {
        let mut st = self.state.lock().await;
        let FsState { nodes, handles } = &mut *st;
        let open = handles.get_mut(handle).ok_or(VfsError::BadHandle)?;
        let Cursor::Dir(next) = open.cursor else {
            return Err(VfsError::BadHandle);
        };
        // An exhausted cursor reports the same way as a non-directory
        // handle; rewinddir restarts the enumeration.
        let Some(current) = next else {
            return Err(VfsError::BadHandle);
        };

        let child = nodes.get(current);
        let entry = if child.is_dir() {
            DirEntry::directory(child.name.as_str())
        } else {
            let len = child.file().expect("non-directory node").len() as u32;
            DirEntry::file(child.name.as_str(), len)
        };
        open.cursor = Cursor::Dir(nodes.next_sibling(open.node, current));
        Ok(entry)
    }

    async fn rewinddir(&self, handle: Handle) -> VfsResult<()> {
        let mut st = self.state.lock().await;
        let FsState { nodes, handles } = &mut *st;
        let open = handles.get_mut(handle).ok_or(VfsError::BadHandle)?;
        if !open.dir {
            return Err(VfsError::BadHandle);
        }
        open.cursor = Cursor::Dir(nodes.first_child(open.node));
        Ok(())
    }

    async fn stat(&self, path: &str) -> VfsResult<FileStat> {
        // The root is answered without traversal or locking.
        if path.is_empty() || path == "/" {
            return Ok(FileStat {
                dev: DEVICE_TAG,
                mode: FileMode(FileMode::S_IFDIR | FileMode::RW_ALL | FileMode::X_ALL),
                size: -1,
                nlink: 2,
                ..FileStat::default()
            });
        }

        let st = self.state.lock().await;
        let node = st
            .nodes
            .resolve(path, false)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        Ok(stat_for(st.nodes.get(node)))
    }

    async fn fstat(&self, handle: Handle) -> VfsResult<FileStat> {
        let st = self.state.lock().await;
        let open = st.handles.get(handle).ok_or(VfsError::BadHandle)?;
        Ok(stat_for(st.nodes.get(open.node)))
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        let mut st = self.state.lock().await;
        let FsState { nodes, handles } = &mut *st;
        let node = nodes
            .resolve(path, false)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
        if nodes.get(node).use_count != 0 {
            return Err(VfsError::Busy(format!("{path:?} is open")));
        }

        // Any directory enumeration about to yield the victim skips to
        // its next sibling instead of observing a freed node.
        let parent = nodes
            .get(node)
            .parent
            .expect("a resolved file has a parent");
        let next = nodes.next_sibling(parent, node);
        for open in handles.iter_occupied_mut() {
            if open.cursor == Cursor::Dir(Some(node)) {
                open.cursor = Cursor::Dir(next);
            }
        }

        nodes.remove(node);
        Ok(())
    }

    async fn mmap(&self, handle: Handle) -> VfsResult<Arc<Vec<u8>>> {
        let st = self.state.lock().await;
        let open = st.handles.get(handle).ok_or(VfsError::BadHandle)?;
        if open.dir {
            return Err(VfsError::BadHandle);
        }
        let file = st.nodes.get(open.node).file().ok_or(VfsError::BadHandle)?;
        Ok(file.share())
    }

    async fn fcntl(&self, handle: Handle, cmd: FcntlCmd) -> VfsResult<u32> {
        let st = self.state.lock().await;
        let open = st.handles.get(handle).ok_or(VfsError::BadHandle)?;
        match cmd {
            FcntlCmd::GetFlags => Ok(open.flags.bits()),
            FcntlCmd::SetFlags | FcntlCmd::GetFdFlags | FcntlCmd::SetFdFlags => Ok(0),
        }
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

/// The process-wide ramdisk instance managed by [`init`]/[`shutdown`].
static RAMDISK: Mutex<Option<Arc<RamFs>>> = Mutex::const_new(None);

/// Bring up the ramdisk and register it with the VFS under
/// [`MOUNT_POINT`]. Idempotent: a second call returns the instance the
/// first one created, without touching the registry.
pub async fn init(registry: &VfsRegistry) -> Arc<RamFs> {
    let mut slot = RAMDISK.lock().await;
    if let Some(fs) = slot.as_ref() {
        return Arc::clone(fs);
    }
    let fs = Arc::new(RamFs::new());
    registry.mount(MOUNT_POINT, Arc::clone(&fs) as Arc<dyn VfsOps>).await;
    tracing::info!(mount = MOUNT_POINT, "ramdisk filesystem registered");
    *slot = Some(Arc::clone(&fs));
    fs
}

/// Deregister from the VFS and tear the tree down. Idempotent; a call
/// without a prior [`init`] does nothing.
pub async fn shutdown(registry: &VfsRegistry) {
    let fs = RAMDISK.lock().await.take();
    if let Some(fs) = fs {
        registry.unmount(MOUNT_POINT).await;
        fs.clear().await;
        tracing::info!(mount = MOUNT_POINT, "ramdisk filesystem deregistered");
    }
}
