//! ramfs-kernel: an in-memory hierarchical filesystem behind a VFS
//! operation table.
//!
//! This crate provides:
//!
//! - **VfsOps**: the handle-based operation table filesystems export
//! - **RamFs**: the ramdisk engine — node tree, handle table with
//!   per-node read/write exclusion, growable content buffers, and
//!   zero-copy attach/detach of caller-owned buffers
//! - **VfsRegistry**: mount points with longest-prefix path routing
//! - **init/shutdown**: idempotent lifecycle that registers the
//!   ramdisk at `/ram`
//!
//! The vocabulary types (flags, entries, stat, errors) live in
//! [`ramfs_types`] and are re-exported here for convenience.

pub mod vfs;

pub use vfs::{init, shutdown, RamFs, VfsOps, VfsRegistry, MOUNT_POINT};
pub use vfs::ram::{
    DETACH_PLACEHOLDER_CAPACITY, DEVICE_TAG, INITIAL_CAPACITY, MAX_HANDLES, REALLOC_SLACK,
};

pub use ramfs_types::{
    AccessMode, DirEntry, DirEntryKind, FcntlCmd, FileMode, FileStat, Handle, OpenFlags, VfsError,
    VfsResult, Whence,
};
