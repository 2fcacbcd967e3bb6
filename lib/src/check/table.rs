use super::creator::{merge_into, Extraction, ReferenceCreator};
use super::module::ModuleDescriptor;
use super::reference::{ConflictingRequirement, Reference};
use super::settings::Settings;
use super::source::ClassFileSource;
use super::Error;
use crate::jvm::class_graph::ClassData;
use crate::jvm::BinaryName;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Every requirement an instrumentation module places on the classes it gets woven into
///
/// The table also carries the module's own (internal) classes, since those get injected next to
/// the instrumented library and are therefore part of what references resolve against.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceTable {
    references: BTreeMap<BinaryName, Reference>,
    internal_classes: BTreeMap<BinaryName, ClassData>,

    /// Platform namespaces: supertypes in here are assumed present even when they can't be found
    pub(crate) ignored_prefixes: Vec<String>,
}

impl ReferenceTable {
    /// Table with no references
    pub fn new(settings: &Settings) -> ReferenceTable {
        ReferenceTable {
            references: BTreeMap::new(),
            internal_classes: BTreeMap::new(),
            ignored_prefixes: settings.ignored_prefixes.clone(),
        }
    }

    /// Scan all of a module's advice classes (and whatever they reach) and merge the results
    pub fn build<S: ClassFileSource + ?Sized>(
        module: &ModuleDescriptor,
        source: &S,
        settings: &Settings,
    ) -> Result<ReferenceTable, Error> {
        let creator = ReferenceCreator::new(source, settings);
        let helpers = module.helper_classes();

        let mut extraction = Extraction::default();
        let mut seen = BTreeSet::new();
        for advice in module.advice_classes() {
            if !seen.insert(advice) {
                continue;
            }
            let found = creator.create_references_from(advice, helpers)?;
            extraction.merge(found)?;
        }

        debug!(
            "Built reference table for {}: {} references, {} internal classes",
            module.name(),
            extraction.references.len(),
            extraction.internal_classes.len()
        );
        Ok(ReferenceTable {
            references: extraction.references,
            internal_classes: extraction.internal_classes,
            ignored_prefixes: settings.ignored_prefixes.clone(),
        })
    }

    /// Table of references with no internal classes (using default settings)
    pub fn from_references<I>(references: I) -> Result<ReferenceTable, ConflictingRequirement>
    where
        I: IntoIterator<Item = Reference>,
    {
        let mut table = ReferenceTable::new(&Settings::default());
        for reference in references {
            table.merge_reference(reference)?;
        }
        Ok(table)
    }

    pub fn merge_reference(&mut self, reference: Reference) -> Result<(), ConflictingRequirement> {
        merge_into(&mut self.references, reference)
    }

    pub fn get(&self, class_name: &BinaryName) -> Option<&Reference> {
        self.references.get(class_name)
    }

    /// References in class name order
    pub fn references(&self) -> impl Iterator<Item = &Reference> + '_ {
        self.references.values()
    }

    pub fn internal_classes(&self) -> &BTreeMap<BinaryName, ClassData> {
        &self.internal_classes
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
