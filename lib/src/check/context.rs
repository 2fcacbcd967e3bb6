use super::source::ClassFileSource;
use crate::jvm::class_file::ClassFile;
use crate::jvm::class_graph::{ClassData, ClassGraph};
use crate::jvm::BinaryName;
use elsa::sync::FrozenMap;
use log::{trace, warn};
use std::io;

/// Passive view of the classes visible from one class-loading context
///
/// Lookups must only ever read class metadata: nothing gets loaded, linked, or initialized.
/// The answer for a given name must not change over the lifetime of the context.
pub trait ClassLoadingContext: Send + Sync {
    fn lookup(&self, name: &BinaryName) -> Option<&ClassData>;
}

impl ClassLoadingContext for ClassGraph {
    fn lookup(&self, name: &BinaryName) -> Option<&ClassData> {
        self.lookup_class(name)
    }
}

/// Context backed by class files, parsed on first lookup
///
/// Every lookup is memoized, misses included, so a class is parsed at most once and repeated
/// lookups always agree.
pub struct ClassPath<S> {
    source: S,
    parsed: FrozenMap<BinaryName, Box<Option<ClassData>>>,
}

impl<S: ClassFileSource> ClassPath<S> {
    pub fn new(source: S) -> ClassPath<S> {
        ClassPath {
            source,
            parsed: FrozenMap::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn parse(&self, name: &BinaryName) -> Option<ClassData> {
        let bytes = match self.source.read_class(name) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!("{} is not on the class path", name);
                return None;
            }
            Err(err) => {
                warn!("Cannot read class file for {}: {}", name, err);
                return None;
            }
        };
        let class = match ClassFile::parse(&bytes).and_then(|file| ClassData::from_class_file(&file)) {
            Ok(class) => class,
            Err(err) => {
                warn!("Cannot parse class file for {}: {}", name, err);
                return None;
            }
        };
        if &class.name != name {
            warn!("Class file for {} declares {} instead", name, class.name);
            return None;
        }
        Some(class)
    }
}

impl<S: ClassFileSource> ClassLoadingContext for ClassPath<S> {
    fn lookup(&self, name: &BinaryName) -> Option<&ClassData> {
        if let Some(known) = self.parsed.get(name) {
            return known.as_ref();
        }
        let parsed = self.parse(name);
        self.parsed.insert(name.clone(), Box::new(parsed)).as_ref()
    }
}
