//! Virtual filesystem boundary for the ramdisk.
//!
//! Three pieces:
//!
//! - **`VfsOps`**: the operation table a filesystem exports — open,
//!   close, read, write, seek, readdir, stat, unlink, mmap, fcntl and
//!   friends, all handle-based past `open`.
//! - **`RamFs`**: the in-memory filesystem engine, registered at
//!   `/ram`.
//! - **`VfsRegistry`**: the mount table that routes path-addressed
//!   operations to the responsible filesystem.
//!
//! ```text
//! caller ── path ──► VfsRegistry ── longest prefix ──► RamFs at /ram
//!    │                                                    │
//!    └───────────── handle ops (read/write/seek/…) ───────┘
//! ```

pub mod ram;
mod registry;
mod traits;

pub use ram::{init, shutdown, RamFs, MOUNT_POINT};
pub use registry::VfsRegistry;
pub use traits::VfsOps;
