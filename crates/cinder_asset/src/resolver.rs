//! Byte sources
//!
//! Loaders never touch the filesystem directly; they ask a `FileResolver` for
//! bytes. Resolvers are shared with worker threads.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait FileResolver: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.open(path)?.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    fn exists(&self, path: &str) -> bool;
}

/// How a path handed to `FsResolver` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Relative to the root; bundled, read-only data.
    #[default]
    Internal,
    /// Relative to the root; writable application data.
    Local,
    /// Used as given.
    Absolute,
}

pub struct FsResolver {
    root: PathBuf,
    file_type: FileType,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            root: root.into(),
            file_type,
        }
    }

    pub fn internal(root: impl Into<PathBuf>) -> Self {
        Self::new(root, FileType::Internal)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        match self.file_type {
            FileType::Internal | FileType::Local => self.root.join(path),
            FileType::Absolute => PathBuf::from(path),
        }
    }
}

impl FileResolver for FsResolver {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let file = File::open(self.resolve(path))?;
        Ok(Box::new(io::BufReader::new(file)))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }
}

/// In-memory files keyed by normalized path.
#[derive(Default)]
pub struct MemoryResolver {
    files: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, bytes: impl Into<Vec<u8>>) {
        let bytes: Vec<u8> = bytes.into();
        self.files.write().insert(normalize(path), bytes.into());
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files.write().remove(&normalize(path)).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn get(&self, path: &str) -> io::Result<Arc<[u8]>> {
        self.files
            .read()
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}")))
    }
}

impl FileResolver for MemoryResolver {
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + Send>> {
        let bytes = self.get(path)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.get(path).map(|bytes| bytes.to_vec())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.read().contains_key(&normalize(path))
    }
}

/// Forward slashes only.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Directory part of a path, empty for a bare file name.
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Resolve `name` relative to `dir`, folding `.` and `..` segments.
pub fn join(dir: &str, name: &str) -> String {
    let name = normalize(name);
    let mut parts: Vec<&str> = if name.starts_with('/') {
        Vec::new()
    } else {
        dir.split('/').filter(|p| !p.is_empty()).collect()
    };
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if dir.starts_with('/') || name.starts_with('/') {
        format!("/{joined}")
    } else {
        joined
    }
}
