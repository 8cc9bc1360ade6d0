//! Open flags, seek origins, and fcntl commands.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Access mode carried in the low bits of [`OpenFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Flags supplied to `open`.
///
/// A bitfield carrying an access mode in the low two bits plus auxiliary
/// bits. Compose with `|`:
///
/// ```
/// use ramfs_types::OpenFlags;
///
/// let flags = OpenFlags::WRONLY | OpenFlags::TRUNC;
/// assert!(flags.is_writable());
/// assert!(flags.contains(OpenFlags::TRUNC));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// Open for reading only.
    pub const RDONLY: OpenFlags = OpenFlags(0);
    /// Open for writing only.
    pub const WRONLY: OpenFlags = OpenFlags(0o1);
    /// Open for reading and writing.
    pub const RDWR: OpenFlags = OpenFlags(0o2);
    /// Open a directory for enumeration. Requires a read-only mode.
    pub const DIRECTORY: OpenFlags = OpenFlags(0o4);
    /// Position the cursor at end-of-file.
    pub const APPEND: OpenFlags = OpenFlags(0o10);
    /// Discard existing content on open.
    pub const TRUNC: OpenFlags = OpenFlags(0o20);

    const MODE_MASK: u32 = 0o3;

    /// Reconstruct from raw bits (e.g. the value `fcntl` returned).
    pub fn from_bits(bits: u32) -> Self {
        OpenFlags(bits)
    }

    /// The raw bit representation.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// The access mode carried in the low bits.
    pub fn access(self) -> AccessMode {
        match self.0 & Self::MODE_MASK {
            0 => AccessMode::ReadOnly,
            1 => AccessMode::WriteOnly,
            _ => AccessMode::ReadWrite,
        }
    }

    /// True for any mode that permits writing.
    pub fn is_writable(self) -> bool {
        self.0 & Self::MODE_MASK != 0
    }

    /// True if every bit of `other` is set in `self`.
    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpenFlags({:#o})", self.0)
    }
}

/// Origin for `seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Absolute offset from the start of the file.
    Set,
    /// Relative to the current cursor.
    Current,
    /// Relative to the logical end of the file.
    End,
}

/// Commands understood by `fcntl`.
///
/// Only [`FcntlCmd::GetFlags`] has an effect; the others are accepted
/// and return 0 for compatibility with callers that issue them blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcntlCmd {
    /// Return the flags the handle was opened with.
    GetFlags,
    SetFlags,
    GetFdFlags,
    SetFdFlags,
}
