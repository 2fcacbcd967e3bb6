use super::context::ClassLoadingContext;
use super::reference::{Flags, Reference, Source};
use super::table::ReferenceTable;
use crate::jvm::class_graph::{java_lang_object, ClassData};
use crate::jvm::{BinaryName, FieldType, RenderDescriptor, UnqualifiedName};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::{Display, Error as FmtError, Formatter};

/// One requirement that a class-loading context does not meet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mismatch {
    /// Where the unmet requirement comes from
    pub sources: Vec<Source>,
    pub kind: MismatchKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MismatchKind {
    /// Class cannot be found at all
    MissingClass { class_name: BinaryName },

    /// Field is neither declared nor inherited with that type
    MissingField {
        class_name: BinaryName,
        field_name: UnqualifiedName,
        field_type: FieldType<BinaryName>,
    },

    /// Method is neither declared nor inherited with that descriptor
    MissingMethod {
        class_name: BinaryName,
        method_name: UnqualifiedName,
        descriptor: String,
    },

    /// Class or member exists, but its access flags don't allow the required use
    FlagMismatch {
        class_name: BinaryName,

        /// Rendered member (`None` for the class itself)
        member: Option<String>,
        expected: Flags,
        found: u16,
    },

    /// Class does not have a required superclass or interface
    SuperTypeMismatch {
        class_name: BinaryName,
        expected: BinaryName,
    },
}

impl Display for MismatchKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            MismatchKind::MissingClass { class_name } => write!(f, "Missing class {}", class_name),
            MismatchKind::MissingField {
                class_name,
                field_name,
                field_type,
            } => write!(
                f,
                "Missing field {}#{}:{}",
                class_name,
                field_name,
                field_type.render()
            ),
            MismatchKind::MissingMethod {
                class_name,
                method_name,
                descriptor,
            } => write!(f, "Missing method {}#{}{}", class_name, method_name, descriptor),
            MismatchKind::FlagMismatch {
                class_name,
                member,
                expected,
                found,
            } => {
                write!(f, "Flag mismatch for {}", class_name)?;
                if let Some(member) = member {
                    write!(f, "#{}", member)?;
                }
                write!(f, ": expected {}, found {:#06x}", expected, found)
            }
            MismatchKind::SuperTypeMismatch {
                class_name,
                expected,
            } => write!(f, "{} does not extend or implement {}", class_name, expected),
        }
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        for (idx, source) in self.sources.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", source)?;
        }
        if !self.sources.is_empty() {
            f.write_str(" ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl ReferenceTable {
    /// Match every reference against a context, collecting all mismatches
    ///
    /// Classes resolve to the table's internal classes first and to the context otherwise. The
    /// context is only ever queried through passive lookups.
    pub fn verify(&self, context: &dyn ClassLoadingContext) -> Vec<Mismatch> {
        let universe = Universe {
            internal: self.internal_classes(),
            context,
            ignored_prefixes: &self.ignored_prefixes,
        };
        let mut mismatches = vec![];
        for reference in self.references() {
            universe.check(reference, &mut mismatches);
        }
        mismatches
    }
}

/// Outcome of searching a type hierarchy
enum Lookup<T> {
    Found(T),
    NotFound,

    /// Not found, but an unresolvable platform supertype might have had it
    Unknown,
}

/// Internal classes layered over a class-loading context
///
/// `java/lang/Object` is always resolvable, even when the context doesn't describe it.
struct Universe<'a> {
    internal: &'a BTreeMap<BinaryName, ClassData>,
    context: &'a dyn ClassLoadingContext,
    ignored_prefixes: &'a [String],
}

impl<'a> Universe<'a> {
    fn lookup(&self, name: &BinaryName) -> Option<&'a ClassData> {
        if let Some(class) = self.internal.get(name) {
            return Some(class);
        }
        match self.context.lookup(name) {
            Some(class) => Some(class),
            None if name == &BinaryName::OBJECT => Some(java_lang_object()),
            None => None,
        }
    }

    fn is_platform(&self, name: &BinaryName) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }

    fn check(&self, reference: &Reference, mismatches: &mut Vec<Mismatch>) {
        let class_name = &reference.class_name;
        let mut mismatch = |kind: MismatchKind| {
            mismatches.push(Mismatch {
                sources: reference.sources.iter().cloned().collect(),
                kind,
            })
        };

        let class = match self.lookup(class_name) {
            Some(class) => class,
            None => {
                mismatch(MismatchKind::MissingClass {
                    class_name: class_name.clone(),
                });
                return;
            }
        };

        let found = class.access_flags.bits();
        if !reference.flags.matches(found) {
            mismatch(MismatchKind::FlagMismatch {
                class_name: class_name.clone(),
                member: None,
                expected: reference.flags,
                found,
            });
        }

        if let Some(super_name) = &reference.super_name {
            if let Lookup::NotFound = self.extends(class, super_name) {
                mismatch(MismatchKind::SuperTypeMismatch {
                    class_name: class_name.clone(),
                    expected: super_name.clone(),
                });
            }
        }

        for interface in &reference.interfaces {
            let implements = self.find_in_hierarchy(class, false, |class| {
                class.interfaces.iter().find(|candidate| *candidate == interface)
            });
            if let Lookup::NotFound = implements {
                mismatch(MismatchKind::SuperTypeMismatch {
                    class_name: class_name.clone(),
                    expected: interface.clone(),
                });
            }
        }

        for (field_name, field) in &reference.fields {
            let lookup = self.find_in_hierarchy(class, false, |class| {
                class.field(field_name, &field.descriptor)
            });
            match lookup {
                Lookup::Found(declared) => {
                    let found = declared.access_flags.bits();
                    if !field.flags.matches(found) {
                        mismatch(MismatchKind::FlagMismatch {
                            class_name: class_name.clone(),
                            member: Some(format!("{}:{}", field_name, field.descriptor.render())),
                            expected: field.flags,
                            found,
                        });
                    }
                }
                Lookup::NotFound => mismatch(MismatchKind::MissingField {
                    class_name: class_name.clone(),
                    field_name: field_name.clone(),
                    field_type: field.descriptor.clone(),
                }),
                Lookup::Unknown => (),
            }
        }

        for (key, method) in &reference.methods {
            let descriptor = Reference::method_descriptor(key, method);
            let declared_only = key.name == UnqualifiedName::INIT || key.name == UnqualifiedName::CLINIT;
            let lookup = self.find_in_hierarchy(class, declared_only, |class| {
                class.method(&key.name, &descriptor)
            });
            match lookup {
                Lookup::Found(declared) => {
                    let found = declared.access_flags.bits();
                    if !method.flags.matches(found) {
                        mismatch(MismatchKind::FlagMismatch {
                            class_name: class_name.clone(),
                            member: Some(format!("{}{}", key.name, descriptor.render())),
                            expected: method.flags,
                            found,
                        });
                    }
                }
                Lookup::NotFound => mismatch(MismatchKind::MissingMethod {
                    class_name: class_name.clone(),
                    method_name: key.name.clone(),
                    descriptor: descriptor.render(),
                }),
                Lookup::Unknown => (),
            }
        }
    }

    /// Is `expected` somewhere up the superclass chain?
    fn extends(&self, class: &'a ClassData, expected: &BinaryName) -> Lookup<()> {
        let mut seen: HashSet<&BinaryName> = HashSet::new();
        let mut current = class;
        loop {
            let super_name = match &current.superclass {
                None => return Lookup::NotFound,
                Some(super_name) if super_name == expected => return Lookup::Found(()),
                Some(super_name) => super_name,
            };
            if !seen.insert(super_name) {
                return Lookup::NotFound;
            }
            current = match self.lookup(super_name) {
                Some(superclass) => superclass,
                None if self.is_platform(super_name) => return Lookup::Unknown,
                None => return Lookup::NotFound,
            };
        }
    }

    /// Search a class, then its superclass chain, then all of its superinterfaces
    ///
    /// Every type is visited at most once, so cyclic (malformed) hierarchies terminate.
    fn find_in_hierarchy<T>(
        &self,
        class: &'a ClassData,
        declared_only: bool,
        find: impl Fn(&'a ClassData) -> Option<T>,
    ) -> Lookup<T> {
        if let Some(found) = find(class) {
            return Lookup::Found(found);
        }
        if declared_only {
            return Lookup::NotFound;
        }

        let mut unknown = false;
        let mut seen: HashSet<&'a BinaryName> = HashSet::new();
        let mut interfaces: VecDeque<&'a BinaryName> = VecDeque::new();
        seen.insert(&class.name);
        interfaces.extend(&class.interfaces);

        let mut superclass = class.superclass.as_ref();
        while let Some(super_name) = superclass {
            if !seen.insert(super_name) {
                break;
            }
            match self.lookup(super_name) {
                Some(class) => {
                    if let Some(found) = find(class) {
                        return Lookup::Found(found);
                    }
                    interfaces.extend(&class.interfaces);
                    superclass = class.superclass.as_ref();
                }
                None => {
                    unknown |= self.is_platform(super_name);
                    superclass = None;
                }
            }
        }

        while let Some(interface_name) = interfaces.pop_front() {
            if !seen.insert(interface_name) {
                continue;
            }
            match self.lookup(interface_name) {
                Some(interface) => {
                    if let Some(found) = find(interface) {
                        return Lookup::Found(found);
                    }
                    interfaces.extend(&interface.interfaces);
                }
                None => unknown |= self.is_platform(interface_name),
            }
        }

        if unknown {
            Lookup::Unknown
        } else {
            Lookup::NotFound
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, FieldData, MethodData};
    use crate::jvm::{
        ClassAccessFlags, FieldAccessFlags, MethodAccessFlags, MethodDescriptor, Name,
        ParseDescriptor,
    };

    fn name(name: &str) -> BinaryName {
        BinaryName::from_string(name.to_owned()).unwrap()
    }

    fn member(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(name.to_owned()).unwrap()
    }

    fn method(name: &str, descriptor: &str, access_flags: MethodAccessFlags) -> MethodData {
        MethodData {
            name: member(name),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            access_flags,
        }
    }

    fn advice(line: u16) -> (BinaryName, Option<u16>) {
        (name("com/acme/agent/PaintAdvice"), Some(line))
    }

    /// `Component` declares `paint`, `Widget` extends it and implements `Listener`
    fn library() -> ClassGraph {
        let mut component = ClassData::new(
            name("com/acme/Component"),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
            Some(BinaryName::OBJECT),
        );
        component.interfaces.push(name("com/acme/Listener"));
        component.methods.push(method(
            "paint",
            "(Lcom/acme/Canvas;)V",
            MethodAccessFlags::PUBLIC,
        ));
        component.fields.push(FieldData {
            name: member("size"),
            descriptor: FieldType::int(),
            access_flags: FieldAccessFlags::PROTECTED | FieldAccessFlags::FINAL,
        });

        let mut widget = ClassData::new(
            name("com/acme/Widget"),
            ClassAccessFlags::PUBLIC,
            Some(name("com/acme/Component")),
        );
        widget
            .methods
            .push(method("<init>", "()V", MethodAccessFlags::PUBLIC));

        let mut listener = ClassData::new(
            name("com/acme/Listener"),
            ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            Some(BinaryName::OBJECT),
        );
        listener.methods.push(method(
            "changed",
            "()V",
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
        ));

        ClassGraph::new().with_classes(vec![component, widget, listener])
    }

    fn widget() -> Reference {
        let (source, line) = advice(12);
        Reference::new(name("com/acme/Widget")).with_source(source, line)
    }

    #[test]
    fn inherited_members_match() {
        let reference = widget()
            .with_flags(Flags::PUBLIC | Flags::NON_INTERFACE)
            .with_super_name(name("com/acme/Component"))
            .with_interface(name("com/acme/Listener"))
            .with_method(
                member("paint"),
                MethodDescriptor::parse("(Lcom/acme/Canvas;)V").unwrap(),
                Flags::PUBLIC | Flags::NON_STATIC,
            )
            .with_method(
                member("changed"),
                MethodDescriptor::parse("()V").unwrap(),
                Flags::PUBLIC,
            )
            .with_method(
                member("hashCode"),
                MethodDescriptor::parse("()I").unwrap(),
                Flags::PUBLIC,
            )
            .with_field(member("size"), FieldType::int(), Flags::PROTECTED_OR_HIGHER);
        let table = ReferenceTable::from_references(vec![reference]).unwrap();

        // `hashCode` comes from `java/lang/Object`, which the graph doesn't have
        assert_eq!(table.verify(&library()), vec![]);
    }

    #[test]
    fn reports_every_mismatch() {
        let reference = widget()
            .with_flags(Flags::INTERFACE)
            .with_super_name(name("com/acme/Panel"))
            .with_field(member("size"), FieldType::int(), Flags::NON_FINAL)
            .with_field(member("color"), FieldType::int(), Flags::empty())
            .with_method(
                member("<init>"),
                MethodDescriptor::parse("(I)V").unwrap(),
                Flags::PUBLIC,
            );
        let canvas = Reference::new(name("com/acme/Canvas"));
        let table = ReferenceTable::from_references(vec![reference, canvas]).unwrap();

        let rendered: Vec<String> = table
            .verify(&library())
            .iter()
            .map(|mismatch| mismatch.to_string())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "Missing class com.acme.Canvas",
                "com.acme.agent.PaintAdvice:12 Flag mismatch for com.acme.Widget: expected INTERFACE, found 0x0001",
                "com.acme.agent.PaintAdvice:12 com.acme.Widget does not extend or implement com.acme.Panel",
                "com.acme.agent.PaintAdvice:12 Missing field com.acme.Widget#color:I",
                "com.acme.agent.PaintAdvice:12 Flag mismatch for com.acme.Widget#size:I: expected NON_FINAL, found 0x0014",
                "com.acme.agent.PaintAdvice:12 Missing method com.acme.Widget#<init>(I)V",
            ]
        );
    }

    #[test]
    fn constructors_are_not_inherited() {
        let mut graph_widget = library().lookup_class(&name("com/acme/Widget")).unwrap().clone();
        graph_widget.methods.clear();
        let mut component = library().lookup_class(&name("com/acme/Component")).unwrap().clone();
        component
            .methods
            .push(method("<init>", "()V", MethodAccessFlags::PUBLIC));
        let graph = ClassGraph::new().with_classes(vec![graph_widget, component]);

        let reference = widget().with_method(
            member("<init>"),
            MethodDescriptor::parse("()V").unwrap(),
            Flags::PUBLIC,
        );
        let table = ReferenceTable::from_references(vec![reference]).unwrap();
        let mismatches = table.verify(&graph);
        assert_eq!(mismatches.len(), 1);
        assert!(matches!(
            mismatches[0].kind,
            MismatchKind::MissingMethod { .. }
        ));
    }

    #[test]
    fn unresolvable_library_supertype() {
        // `Component` is not in this graph and is not a platform class
        let graph = ClassGraph::new().with_classes(vec![library()
            .lookup_class(&name("com/acme/Widget"))
            .unwrap()
            .clone()]);
        let reference = widget()
            .with_super_name(name("com/acme/Component"))
            .with_method(
                member("paint"),
                MethodDescriptor::parse("(Lcom/acme/Canvas;)V").unwrap(),
                Flags::PUBLIC,
            )
            .with_interface(name("com/acme/Listener"));
        let table = ReferenceTable::from_references(vec![reference]).unwrap();

        let kinds: Vec<MismatchKind> = table
            .verify(&graph)
            .into_iter()
            .map(|mismatch| mismatch.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                MismatchKind::SuperTypeMismatch {
                    class_name: name("com/acme/Widget"),
                    expected: name("com/acme/Listener"),
                },
                MismatchKind::MissingMethod {
                    class_name: name("com/acme/Widget"),
                    method_name: member("paint"),
                    descriptor: String::from("(Lcom/acme/Canvas;)V"),
                },
            ]
        );
    }

    #[test]
    fn platform_supertypes_are_assumed() {
        let mut listener = library()
            .lookup_class(&name("com/acme/Listener"))
            .unwrap()
            .clone();
        listener.interfaces.push(name("java/util/EventListener"));
        let graph = ClassGraph::new().with_classes(vec![listener]);

        let reference = Reference::new(name("com/acme/Listener"))
            .with_flags(Flags::INTERFACE | Flags::PUBLIC)
            .with_interface(name("com/acme/Observer"))
            .with_method(
                member("handleEvent"),
                MethodDescriptor::parse("()V").unwrap(),
                Flags::PUBLIC,
            )
            .with_method(
                member("hashCode"),
                MethodDescriptor::parse("()I").unwrap(),
                Flags::PUBLIC | Flags::NON_STATIC,
            )
            .with_method(
                member("finalize"),
                MethodDescriptor::parse("()V").unwrap(),
                Flags::PUBLIC,
            );
        let table = ReferenceTable::from_references(vec![reference]).unwrap();

        // Only `finalize` is known for sure: `EventListener` might provide the rest
        let kinds: Vec<MismatchKind> = table
            .verify(&graph)
            .into_iter()
            .map(|mismatch| mismatch.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![MismatchKind::FlagMismatch {
                class_name: name("com/acme/Listener"),
                member: Some(String::from("finalize()V")),
                expected: Flags::PUBLIC,
                found: 0x0004,
            }]
        );
    }

    #[test]
    fn cyclic_hierarchy_terminates() {
        let mut first = ClassData::new(
            name("com/acme/First"),
            ClassAccessFlags::PUBLIC,
            Some(name("com/acme/Second")),
        );
        first.interfaces.push(name("com/acme/First"));
        let second = ClassData::new(
            name("com/acme/Second"),
            ClassAccessFlags::PUBLIC,
            Some(name("com/acme/First")),
        );
        let graph = ClassGraph::new().with_classes(vec![first, second]);

        let reference = Reference::new(name("com/acme/First"))
            .with_super_name(name("com/acme/Third"))
            .with_method(
                member("run"),
                MethodDescriptor::parse("()V").unwrap(),
                Flags::empty(),
            );
        let table = ReferenceTable::from_references(vec![reference]).unwrap();
        assert_eq!(table.verify(&graph).len(), 2);
    }
}
