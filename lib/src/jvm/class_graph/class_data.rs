use crate::jvm::class_file::{ClassFile, ConstantsReader};
use crate::jvm::{
    parse_descriptor, BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use std::fmt;
use std::fmt::Debug;

/// Passive description of a class: what can be learnt about it without loading or linking it
#[derive(Clone, PartialEq, Eq)]
pub struct ClassData {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<BinaryName>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<BinaryName>,

    pub access_flags: ClassAccessFlags,

    /// Declared methods (inherited ones are found by walking the supertypes)
    pub methods: Vec<MethodData>,

    /// Declared fields
    pub fields: Vec<FieldData>,
}

impl ClassData {
    pub fn new(
        name: BinaryName,
        access_flags: ClassAccessFlags,
        superclass: Option<BinaryName>,
    ) -> ClassData {
        ClassData {
            name,
            superclass,
            interfaces: vec![],
            access_flags,
            methods: vec![],
            fields: vec![],
        }
    }

    /// Extract the passive description from a parsed class file
    ///
    /// Only the header and the member tables are read: method bodies are ignored.
    pub fn from_class_file(class_file: &ClassFile) -> Result<ClassData, Error> {
        let constants = &class_file.constants;

        let mut fields = vec![];
        for field in &class_file.fields {
            fields.push(FieldData {
                name: unqualified_name(constants.utf8(field.name_index)?)?,
                descriptor: parse_descriptor(constants.utf8(field.descriptor_index)?)?,
                access_flags: field.access_flags,
            });
        }

        let mut methods = vec![];
        for method in &class_file.methods {
            methods.push(MethodData {
                name: unqualified_name(constants.utf8(method.name_index)?)?,
                descriptor: parse_descriptor(constants.utf8(method.descriptor_index)?)?,
                access_flags: method.access_flags,
            });
        }

        Ok(ClassData {
            name: class_file.this_class_name()?,
            superclass: class_file.super_class_name()?,
            interfaces: class_file.interface_names()?,
            access_flags: class_file.access_flags,
            methods,
            fields,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Find a declared field by name and type
    pub fn field(&self, name: &UnqualifiedName, descriptor: &FieldType<BinaryName>) -> Option<&FieldData> {
        self.fields
            .iter()
            .find(|field| &field.name == name && &field.descriptor == descriptor)
    }

    /// Find a declared method by name and full descriptor
    pub fn method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&MethodData> {
        self.methods
            .iter()
            .find(|method| &method.name == name && &method.descriptor == descriptor)
    }
}

impl Debug for ClassData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct MethodData {
    /// Name of the method
    pub name: UnqualifiedName,

    /// Type of the method
    pub descriptor: MethodDescriptor<BinaryName>,

    pub access_flags: MethodAccessFlags,
}

impl Debug for MethodData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}{}",
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct FieldData {
    /// Name of the field
    pub name: UnqualifiedName,

    /// Type of the field
    pub descriptor: FieldType<BinaryName>,

    pub access_flags: FieldAccessFlags,
}

impl Debug for FieldData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "{}:{}",
            self.name.as_str(),
            self.descriptor.render(),
        ))
    }
}

fn unqualified_name(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_string(name.to_owned()).map_err(Error::MalformedName)
}
