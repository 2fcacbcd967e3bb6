use super::reference::{ConflictingRequirement, Flags, Reference};
use super::settings::Settings;
use super::source::ClassFileSource;
use super::Error;
use crate::jvm;
use crate::jvm::class_file::{
    binary_name, AttributeLike, BootstrapMethods, ClassFile, Code, Constant, ConstantIndex,
    ConstantsReader, HandleKind, LineNumberTable, MemberRef, MemberRefKind,
};
use crate::jvm::class_graph::ClassData;
use crate::jvm::code::{Instruction, InstructionReader, InvokeType};
use crate::jvm::{
    parse_descriptor, BinaryName, FieldType, MethodDescriptor, Name, UnqualifiedName,
};
use log::trace;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Everything learnt from scanning an entry class and the internal classes it reaches
#[derive(Debug, Default)]
pub struct Extraction {
    /// Merged requirements, keyed by the class they are about
    pub references: BTreeMap<BinaryName, Reference>,

    /// Passive descriptions of the classes that were scanned
    pub internal_classes: BTreeMap<BinaryName, ClassData>,
}

impl Extraction {
    /// Fold another extraction into this one
    pub fn merge(&mut self, other: Extraction) -> Result<(), ConflictingRequirement> {
        for reference in other.references.into_values() {
            merge_into(&mut self.references, reference)?;
        }
        for (name, class) in other.internal_classes {
            self.internal_classes.entry(name).or_insert(class);
        }
        Ok(())
    }
}

pub(crate) fn merge_into(
    references: &mut BTreeMap<BinaryName, Reference>,
    reference: Reference,
) -> Result<(), ConflictingRequirement> {
    let merged = match references.remove(&reference.class_name) {
        Some(existing) => existing.merge(reference)?,
        None => reference,
    };
    references.insert(merged.class_name.clone(), merged);
    Ok(())
}

/// Collects the references made by instrumentation classes
pub struct ReferenceCreator<'a, S: ?Sized> {
    source: &'a S,
    settings: &'a Settings,
}

impl<'a, S: ClassFileSource + ?Sized> ReferenceCreator<'a, S> {
    pub fn new(source: &'a S, settings: &'a Settings) -> ReferenceCreator<'a, S> {
        ReferenceCreator { source, settings }
    }

    /// Scan an entry class, then every internal or helper class reachable from it
    ///
    /// Classes are visited breadth-first, starting from the entry class followed by the helpers.
    /// Each class is visited at most once. References to classes outside the instrumentation's
    /// own namespaces are recorded but not followed.
    pub fn create_references_from(
        &self,
        entry: &BinaryName,
        helpers: &[BinaryName],
    ) -> Result<Extraction, Error> {
        let helper_set: HashSet<&BinaryName> = helpers.iter().collect();
        let mut visited: HashSet<BinaryName> = HashSet::new();
        let mut queue: VecDeque<BinaryName> = VecDeque::new();
        for name in std::iter::once(entry).chain(helpers) {
            if visited.insert(name.clone()) {
                queue.push_back(name.clone());
            }
        }

        let mut extraction = Extraction::default();
        while let Some(class_name) = queue.pop_front() {
            trace!("Collecting references from {}", class_name);
            let (class, references) = self.visit(&class_name)?;

            for referenced in references.keys() {
                let follow = self.settings.is_internal(referenced)
                    || helper_set.contains(referenced);
                if follow && visited.insert(referenced.clone()) {
                    queue.push_back(referenced.clone());
                }
            }
            for reference in references.into_values() {
                merge_into(&mut extraction.references, reference)?;
            }
            extraction.internal_classes.insert(class_name, class);
        }

        trace!(
            "Collected {} references from {} classes starting at {}",
            extraction.references.len(),
            extraction.internal_classes.len(),
            entry
        );
        Ok(extraction)
    }

    fn visit(
        &self,
        class_name: &BinaryName,
    ) -> Result<(ClassData, BTreeMap<BinaryName, Reference>), Error> {
        let bytes = self
            .source
            .read_class(class_name)
            .map_err(|error| Error::Io {
                class: class_name.clone(),
                error,
            })?;
        let format_error = |error: jvm::Error| Error::ClassFormat {
            class: class_name.clone(),
            error,
        };

        let class_file = ClassFile::parse(&bytes).map_err(format_error)?;
        let class = ClassData::from_class_file(&class_file).map_err(format_error)?;
        if &class.name != class_name {
            let msg = format!("class file declares {} instead", class.name);
            return Err(format_error(jvm::Error::MalformedName(msg)));
        }

        let mut visitor = ClassVisitor::new(self.settings, &class_file, &class)
            .map_err(format_error)?;
        match visitor.visit_class(&class) {
            Ok(()) => Ok((class, visitor.references)),
            Err(VisitError::Format(error)) => Err(format_error(error)),
            Err(VisitError::Conflict(conflict)) => Err(Error::ConflictingRequirement(conflict)),
        }
    }
}

enum VisitError {
    Format(jvm::Error),
    Conflict(ConflictingRequirement),
}

impl From<jvm::Error> for VisitError {
    fn from(error: jvm::Error) -> VisitError {
        VisitError::Format(error)
    }
}

impl From<ConflictingRequirement> for VisitError {
    fn from(conflict: ConflictingRequirement) -> VisitError {
        VisitError::Conflict(conflict)
    }
}

/// Reference fragments found in one class, merged as they are found
struct ClassVisitor<'c> {
    settings: &'c Settings,
    class_file: &'c ClassFile,
    bootstrap_methods: Option<BootstrapMethods>,
    /// Classes used by each bootstrap method already resolved
    visited_bootstraps: BTreeMap<u16, BTreeSet<BinaryName>>,

    class_name: BinaryName,
    super_name: Option<BinaryName>,

    /// Line of the instruction being visited
    line: Option<u16>,

    references: BTreeMap<BinaryName, Reference>,
}

impl<'c> ClassVisitor<'c> {
    fn new(
        settings: &'c Settings,
        class_file: &'c ClassFile,
        class: &ClassData,
    ) -> Result<ClassVisitor<'c>, jvm::Error> {
        Ok(ClassVisitor {
            settings,
            class_file,
            bootstrap_methods: class_file.bootstrap_methods()?,
            visited_bootstraps: BTreeMap::new(),
            class_name: class.name.clone(),
            super_name: class.superclass.clone(),
            line: None,
            references: BTreeMap::new(),
        })
    }

    fn add(&mut self, reference: Reference) -> Result<(), ConflictingRequirement> {
        merge_into(&mut self.references, reference)
    }

    /// Fragment for a class, with a source pointing at the current instruction
    fn fragment(&self, class_name: BinaryName) -> Reference {
        Reference::new(class_name).with_source(self.class_name.clone(), self.line)
    }

    /// Access needed to use another class from this one
    fn owner_access(&self, owner: &BinaryName) -> Flags {
        if owner.same_package(&self.class_name) {
            Flags::PACKAGE_OR_HIGHER
        } else {
            Flags::PUBLIC
        }
    }

    /// Access needed to use a member of another class from this one
    fn member_access(&self, owner: &BinaryName) -> Flags {
        if owner == &self.class_name {
            Flags::PRIVATE_OR_HIGHER
        } else if Some(owner) == self.super_name.as_ref() {
            Flags::PROTECTED_OR_HIGHER
        } else if owner.same_package(&self.class_name) {
            Flags::PACKAGE_OR_HIGHER
        } else {
            Flags::PUBLIC
        }
    }

    fn visit_class(&mut self, class: &ClassData) -> Result<(), VisitError> {
        let mut own = self.fragment(self.class_name.clone());
        let mut declares_supertypes = false;
        if let Some(super_name) = class.superclass.clone() {
            if !self.settings.is_ignored(&super_name) {
                let flags = Flags::NON_INTERFACE | Flags::NON_FINAL | self.owner_access(&super_name);
                self.add(self.fragment(super_name.clone()).with_flags(flags))?;
                own = own.with_super_name(super_name);
                declares_supertypes = true;
            }
        }
        for interface in &class.interfaces {
            if !self.settings.is_ignored(interface) {
                let flags = Flags::INTERFACE | self.owner_access(interface);
                self.add(self.fragment(interface.clone()).with_flags(flags))?;
                own = own.with_interface(interface.clone());
                declares_supertypes = true;
            }
        }
        if declares_supertypes {
            self.add(own)?;
        }

        for field in &class.fields {
            self.descriptor_types(field.descriptor.class())?;
        }
        for method in &class.methods {
            self.descriptor_types(method.descriptor.classes())?;
        }

        let class_file = self.class_file;
        for method in &class_file.methods {
            if let Some(code) = method.code(&class_file.constants)? {
                self.visit_code(&code)?;
            }
        }
        Ok(())
    }

    fn visit_code(&mut self, code: &Code) -> Result<(), VisitError> {
        let class_file = self.class_file;
        let constants = &class_file.constants;

        let mut lines: BTreeMap<usize, u16> = BTreeMap::new();
        for attribute in &code.attributes {
            if constants.utf8(attribute.name_index)? == LineNumberTable::NAME {
                let table = attribute.decode::<LineNumberTable>()?;
                for entry in table.0 {
                    lines.insert(entry.start_pc.0 as usize, entry.line_number);
                }
            }
        }

        self.line = None;
        for handler in &code.exception_table {
            if handler.catch_type.0 != ConstantIndex(0) {
                let name = constants.class_name(handler.catch_type)?;
                self.type_name(name, Flags::empty())?;
            }
        }

        for insn in InstructionReader::new(&code.code_array.0) {
            let (offset, insn) = insn?;
            self.line = lines
                .range(..=offset)
                .next_back()
                .map(|(_, line)| *line);
            self.visit_instruction(insn)?;
        }
        self.line = None;
        Ok(())
    }

    fn visit_instruction(&mut self, insn: Instruction) -> Result<(), VisitError> {
        let class_file = self.class_file;
        let constants = &class_file.constants;
        match insn {
            Instruction::GetStatic(index)
            | Instruction::PutStatic(index)
            | Instruction::GetField(index)
            | Instruction::PutField(index) => {
                let is_static = matches!(insn, Instruction::GetStatic(_) | Instruction::PutStatic(_));
                let mut flags = if is_static {
                    Flags::STATIC
                } else {
                    Flags::NON_STATIC
                };
                if insn.is_field_write() {
                    flags |= Flags::NON_FINAL;
                }
                let member = constants.member_ref(index.0)?;
                self.field(member, flags)
            }

            Instruction::Invoke(invoke_type, index) => {
                let flags = match invoke_type {
                    InvokeType::Static => Flags::STATIC,
                    _ => Flags::NON_STATIC,
                };
                let member = constants.member_ref(index.0)?;
                self.method(member, flags)
            }

            Instruction::InvokeDynamic(index) => match constants.constant(index.0)? {
                Constant::InvokeDynamic {
                    bootstrap_method,
                    method_descriptor,
                } => {
                    let bootstrap_method = *bootstrap_method;
                    let (_, descriptor) = constants.name_and_type(*method_descriptor)?;
                    let descriptor: MethodDescriptor<BinaryName> = parse_descriptor(descriptor)?;
                    self.descriptor_types(descriptor.classes())?;
                    self.bootstrap(bootstrap_method)
                }
                _ => Err(jvm::Error::UnexpectedConstant {
                    index: index.0,
                    expected: "InvokeDynamic",
                }
                .into()),
            },

            Instruction::New(index) => {
                let name = constants.class_name(index)?;
                self.type_name(name, Flags::NON_INTERFACE)
            }

            Instruction::ANewArray(index)
            | Instruction::CheckCast(index)
            | Instruction::InstanceOf(index)
            | Instruction::MultiANewArray(index, _) => {
                let name = constants.class_name(index)?;
                self.type_name(name, Flags::empty())
            }

            Instruction::Ldc(index) => self.loadable_constant(index),

            Instruction::Other(_) => Ok(()),
        }
    }

    /// Class named either by its internal name or by an array descriptor
    fn owner_name(name: &str) -> Result<Option<BinaryName>, jvm::Error> {
        if name.starts_with('[') {
            let array: FieldType<BinaryName> = parse_descriptor(name)?;
            Ok(array.class().cloned())
        } else {
            binary_name(name).map(Some)
        }
    }

    /// Reference to a class (or the element class of an array) with nothing but class flags
    fn type_name(&mut self, name: &str, flags: Flags) -> Result<(), VisitError> {
        if let Some(class_name) = Self::owner_name(name)? {
            self.type_ref(class_name, flags)?;
        }
        Ok(())
    }

    fn type_ref(&mut self, class_name: BinaryName, flags: Flags) -> Result<(), ConflictingRequirement> {
        if self.settings.is_ignored(&class_name) {
            return Ok(());
        }
        let flags = flags | self.owner_access(&class_name);
        self.add(self.fragment(class_name).with_flags(flags))
    }

    fn descriptor_types<'d, I>(&mut self, classes: I) -> Result<(), ConflictingRequirement>
    where
        I: IntoIterator<Item = &'d BinaryName>,
    {
        for class_name in classes {
            self.type_ref(class_name.clone(), Flags::empty())?;
        }
        Ok(())
    }

    fn field(&mut self, member: MemberRef<'_>, flags: Flags) -> Result<(), VisitError> {
        let descriptor: FieldType<BinaryName> = parse_descriptor(member.descriptor)?;
        self.descriptor_types(descriptor.class())?;

        if member.class.starts_with('[') {
            return self.type_name(member.class, Flags::empty());
        }
        let owner = binary_name(member.class)?;
        if self.settings.is_ignored(&owner) {
            return Ok(());
        }

        let name = member_name(member.name)?;
        let fragment = self
            .fragment(owner.clone())
            .with_flags(self.owner_access(&owner))
            .with_field(name, descriptor, flags | self.member_access(&owner));
        self.add(fragment)?;
        Ok(())
    }

    fn method(&mut self, member: MemberRef<'_>, flags: Flags) -> Result<(), VisitError> {
        let descriptor: MethodDescriptor<BinaryName> = parse_descriptor(member.descriptor)?;
        self.descriptor_types(descriptor.classes())?;

        // Methods on arrays (eg. `clone`) belong to the array type
        if member.class.starts_with('[') {
            return self.type_name(member.class, Flags::empty());
        }
        let owner = binary_name(member.class)?;
        if self.settings.is_ignored(&owner) {
            return Ok(());
        }

        let owner_flags = match member.kind {
            MemberRefKind::InterfaceMethod => Flags::INTERFACE,
            MemberRefKind::Method => Flags::NON_INTERFACE,
            MemberRefKind::Field => {
                return Err(jvm::Error::UnexpectedConstant {
                    index: ConstantIndex(0),
                    expected: "MethodRef or InterfaceMethodRef",
                }
                .into())
            }
        };
        let name = member_name(member.name)?;
        let fragment = self
            .fragment(owner.clone())
            .with_flags(owner_flags | self.owner_access(&owner))
            .with_method(name, descriptor, flags | self.member_access(&owner));
        self.add(fragment)?;
        Ok(())
    }

    fn method_handle(&mut self, kind: HandleKind, member: ConstantIndex) -> Result<(), VisitError> {
        let class_file = self.class_file;
        let member = class_file.constants.member_ref(member)?;
        match kind {
            HandleKind::GetField => self.field(member, Flags::NON_STATIC),
            HandleKind::PutField => self.field(member, Flags::NON_STATIC | Flags::NON_FINAL),
            HandleKind::GetStatic => self.field(member, Flags::STATIC),
            HandleKind::PutStatic => self.field(member, Flags::STATIC | Flags::NON_FINAL),
            HandleKind::InvokeStatic => self.method(member, Flags::STATIC),
            HandleKind::InvokeVirtual
            | HandleKind::InvokeSpecial
            | HandleKind::NewInvokeSpecial
            | HandleKind::InvokeInterface => self.method(member, Flags::NON_STATIC),
        }
    }

    /// Constant that `ldc` or a bootstrap argument can push
    fn loadable_constant(&mut self, index: ConstantIndex) -> Result<(), VisitError> {
        let class_file = self.class_file;
        let constants = &class_file.constants;
        match constants.constant(index)? {
            Constant::Class(name) => {
                let name = constants.utf8(*name)?;
                self.type_name(name, Flags::empty())
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => self.method_handle(*handle_kind, *member),
            Constant::MethodType { descriptor } => {
                let descriptor: MethodDescriptor<BinaryName> =
                    parse_descriptor(constants.utf8(*descriptor)?)?;
                self.descriptor_types(descriptor.classes())?;
                Ok(())
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let bootstrap_method = *bootstrap_method;
                let (_, descriptor) = constants.name_and_type(*name_and_type)?;
                let descriptor: FieldType<BinaryName> = parse_descriptor(descriptor)?;
                self.descriptor_types(descriptor.class())?;
                self.bootstrap(bootstrap_method)
            }
            _ => Ok(()),
        }
    }

    /// Bootstrap method handle and arguments
    ///
    /// Each bootstrap method is only resolved once per class. Later call sites sharing it still
    /// add their source to the classes it uses.
    fn bootstrap(&mut self, index: u16) -> Result<(), VisitError> {
        if let Some(used) = self.visited_bootstraps.get(&index) {
            let fragments: Vec<Reference> =
                used.iter().map(|class| self.fragment(class.clone())).collect();
            for fragment in fragments {
                self.add(fragment)?;
            }
            return Ok(());
        }
        self.visited_bootstraps.insert(index, BTreeSet::new());

        let (handle, arguments) = match &self.bootstrap_methods {
            Some(methods) => match methods.0.get(index as usize) {
                Some(method) => (method.bootstrap_method, method.bootstrap_arguments.clone()),
                None => return Err(jvm::Error::MissingBootstrapMethod(index).into()),
            },
            None => return Err(jvm::Error::MissingBootstrapMethod(index).into()),
        };

        let outer = std::mem::take(&mut self.references);
        let resolved = self.bootstrap_constants(handle, &arguments);
        let found = std::mem::replace(&mut self.references, outer);
        resolved?;

        self.visited_bootstraps
            .insert(index, found.keys().cloned().collect());
        for reference in found.into_values() {
            self.add(reference)?;
        }
        Ok(())
    }

    fn bootstrap_constants(
        &mut self,
        handle: ConstantIndex,
        arguments: &[ConstantIndex],
    ) -> Result<(), VisitError> {
        self.loadable_constant(handle)?;
        for argument in arguments {
            self.loadable_constant(*argument)?;
        }
        Ok(())
    }
}

fn member_name(name: &str) -> Result<UnqualifiedName, jvm::Error> {
    UnqualifiedName::from_string(name.to_owned()).map_err(jvm::Error::MalformedName)
}
