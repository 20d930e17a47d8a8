//! Filesystem boundary
//!
//! Provisioning needs only a handful of filesystem primitives, all with
//! explicit permission bits. [`HostFilesystem`] maps them onto the real
//! filesystem; [`MemoryFilesystem`] keeps a path map for tests.

use crate::error::FsError;
use nix::unistd::{Gid, Uid, chown};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{DirBuilder, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Filesystem operations used while provisioning
pub trait Filesystem: Send + Sync {
    /// Create a directory, succeeding if it already exists
    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<(), FsError>;

    /// Create a directory, failing if it already exists
    fn create_dir(&self, path: &Path, mode: u32) -> Result<(), FsError>;

    /// Append to a file, creating it with `mode` if missing
    fn append_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), FsError>;

    /// Replace a file's contents, creating it with `mode` if missing
    fn write_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), FsError>;

    /// Set numeric owner and group
    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<(), FsError>;
}

/// The real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFilesystem;

impl HostFilesystem {
    fn write_with(
        options: &mut OpenOptions,
        op: &'static str,
        path: &Path,
        mode: u32,
        contents: &[u8],
    ) -> Result<(), FsError> {
        let mut file = options
            .mode(mode)
            .open(path)
            .map_err(|e| FsError::new(op, path, e))?;
        file.write_all(contents).map_err(|e| FsError::new(op, path, e))
    }
}

impl Filesystem for HostFilesystem {
    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        match DirBuilder::new().mode(mode).create(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(e) => Err(FsError::new("create directory", path, e)),
        }
    }

    fn create_dir(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        DirBuilder::new()
            .mode(mode)
            .create(path)
            .map_err(|e| FsError::new("create directory", path, e))
    }

    fn append_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), FsError> {
        Self::write_with(
            OpenOptions::new().create(true).append(true),
            "append to",
            path,
            mode,
            contents,
        )
    }

    fn write_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), FsError> {
        Self::write_with(
            OpenOptions::new().create(true).write(true).truncate(true),
            "write",
            path,
            mode,
            contents,
        )
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<(), FsError> {
        chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
            .map_err(|errno| FsError::new("change owner of", path, io::Error::from(errno)))
    }
}

/// A node in a [`MemoryFilesystem`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File(Vec<u8>),
}

/// Metadata and contents of one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub node: Node,
    pub mode: u32,
    pub owner: Option<(u32, u32)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<PathBuf, Entry>,
    failures: BTreeSet<PathBuf>,
    mutations: usize,
}

/// In-memory filesystem.
///
/// Parents are not required to exist: account creation (which makes home
/// directories) happens outside this boundary.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilesystem {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing directory
    pub fn with_dir(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().unwrap().entries.insert(
            path.into(),
            Entry {
                node: Node::Dir,
                mode: 0o755,
                owner: Some((0, 0)),
            },
        );
        self
    }

    /// Make every operation on `path` fail with permission denied
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failures.insert(path.into());
    }

    pub fn entry(&self, path: impl AsRef<Path>) -> Option<Entry> {
        self.state.lock().unwrap().entries.get(path.as_ref()).cloned()
    }

    /// File contents, `None` for directories and missing paths
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.entry(path)?.node {
            Node::File(bytes) => Some(bytes),
            Node::Dir => None,
        }
    }

    pub fn is_dir(&self, path: impl AsRef<Path>) -> bool {
        matches!(self.entry(path), Some(Entry { node: Node::Dir, .. }))
    }

    /// All known paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().entries.keys().cloned().collect()
    }

    /// Number of mutating calls attempted, failed ones included
    pub fn mutations(&self) -> usize {
        self.state.lock().unwrap().mutations
    }

    /// Lock the state, count a mutation and apply injected failures
    fn begin(
        &self,
        op: &'static str,
        path: &Path,
    ) -> Result<std::sync::MutexGuard<'_, MemoryState>, FsError> {
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        if state.failures.contains(path) {
            return Err(FsError::new(
                op,
                path,
                io::Error::from(io::ErrorKind::PermissionDenied),
            ));
        }
        Ok(state)
    }

    fn write_node(
        &self,
        op: &'static str,
        path: &Path,
        mode: u32,
        contents: &[u8],
        append: bool,
    ) -> Result<(), FsError> {
        let mut state = self.begin(op, path)?;
        match state.entries.get_mut(path) {
            Some(Entry {
                node: Node::File(bytes),
                ..
            }) => {
                if !append {
                    bytes.clear();
                }
                bytes.extend_from_slice(contents);
                Ok(())
            }
            Some(Entry { node: Node::Dir, .. }) => Err(FsError::new(
                op,
                path,
                io::Error::from(io::ErrorKind::IsADirectory),
            )),
            None => {
                state.entries.insert(
                    path.to_path_buf(),
                    Entry {
                        node: Node::File(contents.to_vec()),
                        mode,
                        owner: None,
                    },
                );
                Ok(())
            }
        }
    }
}

impl Filesystem for MemoryFilesystem {
    fn ensure_dir(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        let mut state = self.begin("create directory", path)?;
        match state.entries.get(path) {
            Some(Entry { node: Node::Dir, .. }) => Ok(()),
            Some(_) => Err(FsError::new(
                "create directory",
                path,
                io::Error::from(io::ErrorKind::AlreadyExists),
            )),
            None => {
                state.entries.insert(
                    path.to_path_buf(),
                    Entry {
                        node: Node::Dir,
                        mode,
                        owner: None,
                    },
                );
                Ok(())
            }
        }
    }

    fn create_dir(&self, path: &Path, mode: u32) -> Result<(), FsError> {
        let mut state = self.begin("create directory", path)?;
        if state.entries.contains_key(path) {
            return Err(FsError::new(
                "create directory",
                path,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        state.entries.insert(
            path.to_path_buf(),
            Entry {
                node: Node::Dir,
                mode,
                owner: None,
            },
        );
        Ok(())
    }

    fn append_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), FsError> {
        self.write_node("append to", path, mode, contents, true)
    }

    fn write_file(&self, path: &Path, mode: u32, contents: &[u8]) -> Result<(), FsError> {
        self.write_node("write", path, mode, contents, false)
    }

    fn chown(&self, path: &Path, uid: u32, gid: u32) -> Result<(), FsError> {
        let mut state = self.begin("change owner of", path)?;
        match state.entries.get_mut(path) {
            Some(entry) => {
                entry.owner = Some((uid, gid));
                Ok(())
            }
            None => Err(FsError::new(
                "change owner of",
                path,
                io::Error::from(io::ErrorKind::NotFound),
            )),
        }
    }
}
