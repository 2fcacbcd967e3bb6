use crate::jvm::BinaryName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where class file bytes come from
///
/// A missing class must be reported as an error of kind [`io::ErrorKind::NotFound`]: callers
/// treat that as an ordinary lookup miss and every other error as a failure of the source.
pub trait ClassFileSource: Send + Sync {
    fn read_class(&self, name: &BinaryName) -> io::Result<Vec<u8>>;
}

impl<S: ClassFileSource + ?Sized> ClassFileSource for Arc<S> {
    fn read_class(&self, name: &BinaryName) -> io::Result<Vec<u8>> {
        (**self).read_class(name)
    }
}

impl<S: ClassFileSource + ?Sized> ClassFileSource for &S {
    fn read_class(&self, name: &BinaryName) -> io::Result<Vec<u8>> {
        (**self).read_class(name)
    }
}

/// Class files laid out on disk by package (`<root>/com/acme/Widget.class`)
#[derive(Clone, Debug)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> DirectorySource {
        DirectorySource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClassFileSource for DirectorySource {
    fn read_class(&self, name: &BinaryName) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(name.class_file_path()))
    }
}

/// Class files held in memory
///
/// Classes can be added while the source is shared.
#[derive(Default)]
pub struct MemorySource {
    classes: RwLock<HashMap<BinaryName, Arc<[u8]>>>,
}

impl MemorySource {
    pub fn new() -> MemorySource {
        MemorySource::default()
    }

    /// Add (or replace) the bytes of a class
    pub fn add_class(&self, name: BinaryName, bytes: impl Into<Arc<[u8]>>) {
        self.classes.write().insert(name, bytes.into());
    }

    pub fn with_class(self, name: BinaryName, bytes: impl Into<Arc<[u8]>>) -> MemorySource {
        self.add_class(name, bytes);
        self
    }
}

impl ClassFileSource for MemorySource {
    fn read_class(&self, name: &BinaryName) -> io::Result<Vec<u8>> {
        match self.classes.read().get(name) {
            Some(bytes) => Ok(bytes.to_vec()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no class file for {}", name),
            )),
        }
    }
}
