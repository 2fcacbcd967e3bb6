use super::{BaseType, BinaryName, ClassAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, UnqualifiedName};
use elsa::sync::FrozenMap;
use std::sync::OnceLock;

mod class_data;

pub use class_data::*;

/// Host-populated universe of passive class descriptions
///
/// Classes can only be added, never removed or replaced, which is what makes it possible to hand
/// out plain references into the graph while other threads keep inserting.
pub struct ClassGraph {
    classes: FrozenMap<BinaryName, Box<ClassData>>,
}

impl ClassGraph {
    /// New empty graph
    pub fn new() -> Self {
        ClassGraph {
            classes: FrozenMap::new(),
        }
    }

    pub fn lookup_class(&self, name: &BinaryName) -> Option<&ClassData> {
        self.classes.get(name)
    }

    /// Add a new class to the class graph
    ///
    /// If a class with the same name is already present, that one is kept and returned.
    pub fn add_class(&self, data: ClassData) -> &ClassData {
        self.classes.insert(data.name.clone(), Box::new(data))
    }

    /// Add several classes at once
    pub fn with_classes<I: IntoIterator<Item = ClassData>>(self, classes: I) -> Self {
        for class in classes {
            self.add_class(class);
        }
        self
    }
}

/// `java/lang/Object`, which every context provides
pub fn java_lang_object() -> &'static ClassData {
    static OBJECT: OnceLock<ClassData> = OnceLock::new();
    OBJECT.get_or_init(|| {
        let object = FieldType::object(BinaryName::OBJECT);
        let long = FieldType::Base(BaseType::Long);
        let method = |name: &'static str,
                      parameters: Vec<FieldType<BinaryName>>,
                      return_type: Option<FieldType<BinaryName>>,
                      access_flags: MethodAccessFlags| MethodData {
            name: UnqualifiedName::from_static(name),
            descriptor: MethodDescriptor {
                parameters,
                return_type,
            },
            access_flags,
        };

        let public = MethodAccessFlags::PUBLIC;
        let public_final = MethodAccessFlags::PUBLIC | MethodAccessFlags::FINAL;
        let native = MethodAccessFlags::NATIVE;
        let mut class = ClassData::new(BinaryName::OBJECT, ClassAccessFlags::PUBLIC, None);
        class.methods = vec![
            method("<init>", vec![], None, public),
            method(
                "getClass",
                vec![],
                Some(FieldType::object(BinaryName::CLASS)),
                public_final | native,
            ),
            method("hashCode", vec![], Some(FieldType::int()), public | native),
            method(
                "equals",
                vec![object.clone()],
                Some(FieldType::Base(BaseType::Boolean)),
                public,
            ),
            method(
                "clone",
                vec![],
                Some(object),
                MethodAccessFlags::PROTECTED | native,
            ),
            method(
                "toString",
                vec![],
                Some(FieldType::object(BinaryName::STRING)),
                public,
            ),
            method("notify", vec![], None, public_final | native),
            method("notifyAll", vec![], None, public_final | native),
            method("wait", vec![], None, public_final),
            method("wait", vec![long.clone()], None, public_final | native),
            method("wait", vec![long, FieldType::int()], None, public_final),
            method("finalize", vec![], None, MethodAccessFlags::PROTECTED),
        ];
        class
    })
}

impl Default for ClassGraph {
    fn default() -> Self {
        ClassGraph::new()
    }
}
