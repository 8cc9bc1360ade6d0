//! The node arena: files, directories, content buffers, and the path
//! resolver that walks them.
//!
//! Nodes live in an id-keyed arena rather than an intrusive sibling
//! list; each node carries its parent id so unlink can excise it from
//! the parent's child list in O(1). A directory owns its child list
//! inline. File content is an `Arc<Vec<u8>>`: the `Vec`'s length is the
//! logical size, its capacity the allocation size, and the `Arc` is
//! what lets `mmap` and attach/detach move bytes without copying.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use ramfs_types::{VfsError, VfsResult};

use super::{DETACH_PLACEHOLDER_CAPACITY, INITIAL_CAPACITY, REALLOC_SLACK};

/// Identifier of a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(u32);

/// Which way a node is currently open, if at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OpenMode {
    None,
    Reading,
    Writing,
}

/// A file's content buffer.
///
/// All growth is fallible (`try_reserve_exact`), surfacing allocation
/// failure as [`VfsError::NoMemory`] with the previous buffer intact.
/// The buffer behind the `Arc` is never mutated while shared: a write
/// that finds outstanding clones (from `mmap`) copies first, so every
/// holder keeps a stable snapshot.
#[derive(Debug)]
pub(crate) struct FileBuf {
    data: Arc<Vec<u8>>,
}

impl FileBuf {
    /// A fresh, empty buffer with the standard initial capacity.
    pub fn with_initial_capacity() -> VfsResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(INITIAL_CAPACITY)?;
        Ok(Self {
            data: Arc::new(data),
        })
    }

    /// Adopt a caller-owned vector as the content buffer.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    /// Logical size: the number of valid bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Allocation size, always >= `len()`.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// A shared view of the buffer for `mmap`.
    pub fn share(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.data)
    }

    /// Copy `bytes` into the buffer at `at`, growing the allocation to
    /// `at + bytes.len() + REALLOC_SLACK` when it would not fit. The
    /// logical size rises to the write's end when the write passes it.
    ///
    /// Callers keep `at <= len()`, so the write never leaves a gap.
    pub fn write_at(&mut self, at: usize, bytes: &[u8]) -> VfsResult<()> {
        let end = at + bytes.len();
        self.make_writable(end)?;
        let data = Arc::get_mut(&mut self.data).expect("buffer was made sole-owned");
        if end > data.len() {
            data.resize(end, 0);
        }
        data[at..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Discard the content, installing a fresh initial-capacity buffer.
    pub fn reset(&mut self) -> VfsResult<()> {
        *self = Self::with_initial_capacity()?;
        Ok(())
    }

    /// Replace the buffer wholesale (attach).
    pub fn replace(&mut self, data: Vec<u8>) {
        self.data = Arc::new(data);
    }

    /// Move the buffer out (detach), leaving a small placeholder so the
    /// node stays well-formed until it is unlinked.
    pub fn take(&mut self) -> VfsResult<Vec<u8>> {
        let mut placeholder = Vec::new();
        placeholder.try_reserve_exact(DETACH_PLACEHOLDER_CAPACITY)?;
        let prev = mem::replace(&mut self.data, Arc::new(placeholder));
        match Arc::try_unwrap(prev) {
            Ok(data) => Ok(data),
            // An mmap snapshot is still alive; hand the caller a
            // private copy instead of the shared allocation.
            Err(shared) => {
                let mut copy = Vec::new();
                if let Err(e) = copy.try_reserve_exact(shared.len()) {
                    self.data = shared;
                    return Err(e.into());
                }
                copy.extend_from_slice(&shared);
                Ok(copy)
            }
        }
    }

    /// Ensure the buffer is sole-owned and has capacity for `end`.
    fn make_writable(&mut self, end: usize) -> VfsResult<()> {
        let shared = Arc::strong_count(&self.data) > 1;
        let capacity = self.data.capacity();
        if !shared && end <= capacity {
            return Ok(());
        }
        let target = if end > capacity {
            end + REALLOC_SLACK
        } else {
            capacity
        };
        if shared {
            let mut fresh = Vec::new();
            fresh.try_reserve_exact(target)?;
            fresh.extend_from_slice(&self.data);
            self.data = Arc::new(fresh);
        } else {
            let data = Arc::get_mut(&mut self.data).expect("buffer is not shared");
            let additional = target - data.len();
            data.try_reserve_exact(additional)?;
        }
        Ok(())
    }
}

/// Kind-specific node payload.
#[derive(Debug)]
pub(crate) enum Payload {
    File(FileBuf),
    Directory(Vec<NodeId>),
}

/// A file-or-directory record in the tree.
#[derive(Debug)]
pub(crate) struct Node {
    /// Case-preserving name; unique in the parent under
    /// case-insensitive comparison. The root is named `/`.
    pub name: String,
    /// None only for the root.
    pub parent: Option<NodeId>,
    pub payload: Payload,
    pub open_mode: OpenMode,
    /// Number of open handles referring to this node.
    pub use_count: u32,
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self.payload, Payload::Directory(_))
    }

    pub fn file(&self) -> Option<&FileBuf> {
        match &self.payload {
            Payload::File(buf) => Some(buf),
            Payload::Directory(_) => None,
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut FileBuf> {
        match &mut self.payload {
            Payload::File(buf) => Some(buf),
            Payload::Directory(_) => None,
        }
    }

    /// Child list of a directory node. A file node here is an engine
    /// bug, not a user error.
    pub fn children(&self) -> &[NodeId] {
        match &self.payload {
            Payload::Directory(children) => children,
            Payload::File(_) => panic!("children() on a file node"),
        }
    }
}

/// The arena of nodes, rooted at a permanently resident directory.
#[derive(Debug)]
pub(crate) struct NodeTable {
    nodes: HashMap<NodeId, Node>,
    next: u32,
    root: NodeId,
}

impl NodeTable {
    pub fn new() -> Self {
        let root = NodeId(1);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                name: "/".to_string(),
                parent: None,
                payload: Payload::Directory(Vec::new()),
                open_mode: OpenMode::None,
                use_count: 0,
            },
        );
        Self {
            nodes,
            next: 2,
            root,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> &Node {
        self.nodes.get(&id).expect("node id not in arena")
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(&id).expect("node id not in arena")
    }

    /// Look `name` up in `dir`, case-insensitively.
    pub fn lookup(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.get(dir)
            .children()
            .iter()
            .copied()
            .find(|&child| self.get(child).name.eq_ignore_ascii_case(name))
    }

    /// Walk a slash-delimited path from the root.
    ///
    /// Empty segments are skipped, so leading and doubled slashes are
    /// tolerated. An empty *terminal* segment (trailing slash, or the
    /// whole path) means "the directory itself" and resolves only when
    /// a directory was requested. The terminal kind must match
    /// `want_dir` exactly; a mismatch is a failed resolution.
    pub fn resolve(&self, path: &str, want_dir: bool) -> Option<NodeId> {
        let mut dir = self.root;
        let mut rest = path;
        while let Some(pos) = rest.find('/') {
            let segment = &rest[..pos];
            if !segment.is_empty() {
                let found = self.lookup(dir, segment)?;
                if !self.get(found).is_dir() {
                    return None;
                }
                dir = found;
            }
            rest = &rest[pos + 1..];
        }
        if rest.is_empty() {
            return want_dir.then_some(dir);
        }
        let found = self.lookup(dir, rest)?;
        if self.get(found).is_dir() != want_dir {
            return None;
        }
        Some(found)
    }

    /// Split a path into its parent directory and leaf name.
    ///
    /// The substring up to the last `/` must resolve as a directory;
    /// the leaf is returned as a view into `path`. With no `/` the
    /// parent is the root. Creations go through here, so the leaf keeps
    /// the caller's case.
    pub fn split_parent<'p>(&self, path: &'p str) -> VfsResult<(NodeId, &'p str)> {
        let (parent, leaf) = match path.rfind('/') {
            None => (self.root, path),
            Some(pos) => {
                let dir = self
                    .resolve(&path[..pos], true)
                    .ok_or_else(|| VfsError::NotFound(path.to_string()))?;
                (dir, &path[pos + 1..])
            }
        };
        if leaf.is_empty() {
            return Err(VfsError::Invalid(format!("empty file name in {path:?}")));
        }
        Ok((parent, leaf))
    }

    /// Create an empty file node under `parent`, at the head of its
    /// child list.
    pub fn create_file(&mut self, parent: NodeId, name: &str) -> VfsResult<NodeId> {
        let buf = FileBuf::with_initial_capacity()?;
        let id = NodeId(self.next);
        self.next += 1;
        self.nodes.insert(
            id,
            Node {
                name: name.to_string(),
                parent: Some(parent),
                payload: Payload::File(buf),
                open_mode: OpenMode::None,
                use_count: 0,
            },
        );
        match &mut self.get_mut(parent).payload {
            Payload::Directory(children) => children.insert(0, id),
            Payload::File(_) => panic!("create_file under a file node"),
        }
        Ok(id)
    }

    /// Remove `id` from its parent's child list and from the arena,
    /// returning the node. The root is never removed.
    pub fn remove(&mut self, id: NodeId) -> Node {
        let parent = self
            .get(id)
            .parent
            .expect("remove() on the root node");
        match &mut self.get_mut(parent).payload {
            Payload::Directory(children) => children.retain(|&c| c != id),
            Payload::File(_) => panic!("parent of a node is a file"),
        }
        self.nodes.remove(&id).expect("node id not in arena")
    }

    pub fn first_child(&self, dir: NodeId) -> Option<NodeId> {
        self.get(dir).children().first().copied()
    }

    /// The sibling after `child` in `dir`'s list, if any.
    pub fn next_sibling(&self, dir: NodeId, child: NodeId) -> Option<NodeId> {
        let children = self.get(dir).children();
        let pos = children.iter().position(|&c| c == child)?;
        children.get(pos + 1).copied()
    }

    /// Drop every node except the root and empty the root's child
    /// list. Children are assumed to sit directly under the root, as
    /// directories cannot be created through this filesystem.
    pub fn clear(&mut self) {
        let root = self.root;
        self.nodes.retain(|&id, _| id == root);
        match &mut self.get_mut(root).payload {
            Payload::Directory(children) => children.clear(),
            Payload::File(_) => panic!("root is not a directory"),
        }
        let root_node = self.get_mut(root);
        root_node.open_mode = OpenMode::None;
        root_node.use_count = 0;
    }

    #[cfg(test)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate all nodes; used by the invariant checks in tests.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(&id, node)| (id, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(names: &[&str]) -> NodeTable {
        let mut t = NodeTable::new();
        let root = t.root();
        for name in names {
            t.create_file(root, name).unwrap();
        }
        t
    }

    #[test]
    fn lookup_is_case_insensitive_and_case_preserving() {
        let t = table_with(&["Track01.MP3"]);
        let id = t.lookup(t.root(), "track01.mp3").unwrap();
        assert_eq!(t.get(id).name, "Track01.MP3");
        assert!(t.lookup(t.root(), "track01").is_none());
    }

    #[test]
    fn resolve_rejects_kind_mismatch() {
        let t = table_with(&["data.bin"]);
        assert!(t.resolve("data.bin", false).is_some());
        // Asking for a directory at a file path must not be promoted.
        assert!(t.resolve("data.bin", true).is_none());
    }

    #[test]
    fn resolve_empty_terminal_means_the_directory_itself() {
        let t = NodeTable::new();
        assert_eq!(t.resolve("", true), Some(t.root()));
        assert_eq!(t.resolve("/", true), Some(t.root()));
        assert!(t.resolve("", false).is_none());
    }

    #[test]
    fn resolve_tolerates_doubled_slashes() {
        let t = table_with(&["blob"]);
        assert!(t.resolve("//blob", false).is_some());
    }

    #[test]
    fn resolve_refuses_missing_intermediate() {
        let t = table_with(&["blob"]);
        assert!(t.resolve("missing/blob", false).is_none());
        // An intermediate that is a file, not a directory, also fails.
        assert!(t.resolve("blob/inner", false).is_none());
    }

    #[test]
    fn split_parent_at_root() {
        let t = NodeTable::new();
        let (parent, leaf) = t.split_parent("hello.txt").unwrap();
        assert_eq!(parent, t.root());
        assert_eq!(leaf, "hello.txt");
    }

    #[test]
    fn split_parent_missing_directory_fails() {
        let t = NodeTable::new();
        let err = t.split_parent("a/b/c.bin").unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[test]
    fn split_parent_rejects_trailing_slash() {
        let t = NodeTable::new();
        let err = t.split_parent("name/").unwrap_err();
        assert!(matches!(err, VfsError::Invalid(_)));
    }

    #[test]
    fn create_inserts_at_head() {
        let t = table_with(&["first", "second"]);
        let children: Vec<_> = t
            .get(t.root())
            .children()
            .iter()
            .map(|&c| t.get(c).name.clone())
            .collect();
        assert_eq!(children, ["second", "first"]);
    }

    #[test]
    fn remove_excises_from_parent() {
        let mut t = table_with(&["a", "b"]);
        let victim = t.lookup(t.root(), "a").unwrap();
        let node = t.remove(victim);
        assert_eq!(node.name, "a");
        assert!(t.lookup(t.root(), "a").is_none());
        assert!(t.lookup(t.root(), "b").is_some());
        assert_eq!(t.node_count(), 2); // root + "b"
    }

    #[test]
    fn write_grows_with_slack() {
        let mut buf = FileBuf::with_initial_capacity().unwrap();
        assert!(buf.capacity() >= INITIAL_CAPACITY);

        buf.write_at(0, &[0xAAu8; INITIAL_CAPACITY]).unwrap();
        let cap_before = buf.capacity();
        buf.write_at(INITIAL_CAPACITY, &[0xBB]).unwrap();
        assert_eq!(buf.len(), INITIAL_CAPACITY + 1);
        assert!(buf.capacity() >= INITIAL_CAPACITY + 1 + REALLOC_SLACK);
        assert!(buf.capacity() > cap_before);
    }

    #[test]
    fn write_under_a_snapshot_copies_instead_of_mutating() {
        let mut buf = FileBuf::from_vec(b"stable".to_vec());
        let snapshot = buf.share();
        buf.write_at(0, b"STABLE").unwrap();
        assert_eq!(&snapshot[..], b"stable");
        assert_eq!(buf.as_slice(), b"STABLE");
    }

    #[test]
    fn take_leaves_a_placeholder() {
        let mut buf = FileBuf::from_vec(vec![1, 2, 3]);
        let taken = buf.take().unwrap();
        assert_eq!(taken, [1, 2, 3]);
        assert_eq!(buf.len(), 0);
        assert!(buf.capacity() >= DETACH_PLACEHOLDER_CAPACITY);
    }

    #[test]
    fn take_with_live_snapshot_returns_a_copy() {
        let mut buf = FileBuf::from_vec(vec![9, 9]);
        let snapshot = buf.share();
        let taken = buf.take().unwrap();
        assert_eq!(taken, [9, 9]);
        assert_eq!(&snapshot[..], [9, 9]);
    }
}
