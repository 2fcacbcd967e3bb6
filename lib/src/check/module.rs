use super::context::ClassLoadingContext;
use super::settings::{IntegrationConfig, Settings};
use super::source::ClassFileSource;
use super::table::ReferenceTable;
use super::Error;
use crate::jvm::BinaryName;
use crate::util::WeakKeyCache;
use log::{error, warn};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

/// What an instrumentation module declares about itself
#[derive(Clone, Debug, Default)]
pub struct ModuleDescriptor {
    name: String,
    additional_names: Vec<String>,
    advice_classes: Vec<BinaryName>,
    helper_classes: Vec<BinaryName>,
}

impl ModuleDescriptor {
    pub fn new(name: &str) -> ModuleDescriptor {
        ModuleDescriptor {
            name: name.to_owned(),
            ..ModuleDescriptor::default()
        }
    }

    /// Other names the module can be configured under
    pub fn with_additional_name(mut self, name: &str) -> ModuleDescriptor {
        self.additional_names.push(name.to_owned());
        self
    }

    /// Class whose code gets woven into instrumented classes
    pub fn with_advice_class(mut self, class_name: BinaryName) -> ModuleDescriptor {
        self.advice_classes.push(class_name);
        self
    }

    /// Class injected alongside the advice
    pub fn with_helper_class(mut self, class_name: BinaryName) -> ModuleDescriptor {
        self.helper_classes.push(class_name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary name followed by the additional names
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        std::iter::once(self.name.as_str()).chain(self.additional_names.iter().map(String::as_str))
    }

    pub fn advice_classes(&self) -> &[BinaryName] {
        &self.advice_classes
    }

    pub fn helper_classes(&self) -> &[BinaryName] {
        &self.helper_classes
    }
}

/// Instrumentation module, along with everything remembered about it at runtime
///
/// The reference table is built on first use. A permanent build failure is remembered too: the
/// module then stays unusable for the rest of the process.
///
/// The table and the per-context verdicts belong to the module, so a module must only ever be
/// checked through one [`Gate`](super::Gate): the first gate to ask decides which class files
/// and settings the table is built from, and every later verdict is cached under that
/// assumption.
pub struct InstrumentationModule {
    descriptor: ModuleDescriptor,
    enabled: bool,
    table: OnceLock<Result<Arc<ReferenceTable>, Arc<Error>>>,
    building: Mutex<()>,
    verdicts: WeakKeyCache<dyn ClassLoadingContext, bool>,
}

impl InstrumentationModule {
    pub fn new(descriptor: ModuleDescriptor, config: &IntegrationConfig) -> InstrumentationModule {
        let enabled = config.is_module_enabled(descriptor.names());
        InstrumentationModule {
            descriptor,
            enabled,
            table: OnceLock::new(),
            building: Mutex::new(()),
            verdicts: WeakKeyCache::new(),
        }
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the reference table, building it if this is the first request
    ///
    /// At most one build runs at a time: concurrent first requests wait for it, then see its
    /// result. Tables and permanent failures are kept for good. A build that failed on a
    /// transient read error is reported to its caller only, and the next request builds again.
    pub fn reference_table<S: ClassFileSource + ?Sized>(
        &self,
        source: &S,
        settings: &Settings,
    ) -> Result<Arc<ReferenceTable>, Arc<Error>> {
        if let Some(result) = self.table.get() {
            return result.clone();
        }
        let _building = self.building.lock();
        if let Some(result) = self.table.get() {
            return result.clone();
        }

        match ReferenceTable::build(&self.descriptor, source, settings) {
            Ok(table) => self.table.get_or_init(|| Ok(Arc::new(table))).clone(),
            Err(err) if err.is_permanent() => {
                error!(
                    "Cannot build reference table for {}, it will never be applied: {}",
                    self.name(),
                    err
                );
                self.table.get_or_init(|| Err(Arc::new(err))).clone()
            }
            Err(err) => {
                warn!(
                    "Cannot build reference table for {} yet, will retry: {}",
                    self.name(),
                    err
                );
                Err(Arc::new(err))
            }
        }
    }

    pub(crate) fn verdicts(&self) -> &WeakKeyCache<dyn ClassLoadingContext, bool> {
        &self.verdicts
    }
}
