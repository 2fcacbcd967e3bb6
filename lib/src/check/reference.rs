use crate::jvm::{
    BinaryName, ClassAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, Name,
    RenderDescriptor, UnqualifiedName,
};
use bitflags::bitflags;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Error as FmtError, Formatter};

bitflags! {
    /// Structural requirements on a class or member
    ///
    /// Each flag is a predicate over the JVM access bits of whatever the reference resolves to.
    /// Several visibility flags can be required at once: the strictest one wins.
    pub struct Flags: u16 {
        /// `ACC_PUBLIC`
        const PUBLIC = 1 << 0;

        /// `ACC_PUBLIC` or `ACC_PROTECTED`
        const PROTECTED_OR_HIGHER = 1 << 1;

        /// Anything but `ACC_PRIVATE`
        const PACKAGE_OR_HIGHER = 1 << 2;

        /// Any visibility at all
        const PRIVATE_OR_HIGHER = 1 << 3;

        /// No `ACC_FINAL` (written fields, extended classes)
        const NON_FINAL = 1 << 4;

        /// `ACC_INTERFACE`
        const INTERFACE = 1 << 5;

        /// No `ACC_INTERFACE`
        const NON_INTERFACE = 1 << 6;

        /// `ACC_STATIC`
        const STATIC = 1 << 7;

        /// No `ACC_STATIC`
        const NON_STATIC = 1 << 8;
    }
}

const ACC_PUBLIC: u16 = ClassAccessFlags::PUBLIC.bits();
const ACC_PRIVATE: u16 = MethodAccessFlags::PRIVATE.bits();
const ACC_PROTECTED: u16 = MethodAccessFlags::PROTECTED.bits();
const ACC_STATIC: u16 = MethodAccessFlags::STATIC.bits();
const ACC_FINAL: u16 = ClassAccessFlags::FINAL.bits();
const ACC_INTERFACE: u16 = ClassAccessFlags::INTERFACE.bits();

impl Flags {
    const EACH: [(Flags, &'static str); 9] = [
        (Flags::PUBLIC, "PUBLIC"),
        (Flags::PROTECTED_OR_HIGHER, "PROTECTED_OR_HIGHER"),
        (Flags::PACKAGE_OR_HIGHER, "PACKAGE_OR_HIGHER"),
        (Flags::PRIVATE_OR_HIGHER, "PRIVATE_OR_HIGHER"),
        (Flags::NON_FINAL, "NON_FINAL"),
        (Flags::INTERFACE, "INTERFACE"),
        (Flags::NON_INTERFACE, "NON_INTERFACE"),
        (Flags::STATIC, "STATIC"),
        (Flags::NON_STATIC, "NON_STATIC"),
    ];

    /// Does a single flag hold for these access bits?
    fn holds_for(self, access: u16) -> bool {
        match self {
            Flags::PUBLIC => access & ACC_PUBLIC != 0,
            Flags::PROTECTED_OR_HIGHER => access & (ACC_PUBLIC | ACC_PROTECTED) != 0,
            Flags::PACKAGE_OR_HIGHER => access & ACC_PRIVATE == 0,
            Flags::PRIVATE_OR_HIGHER => true,
            Flags::NON_FINAL => access & ACC_FINAL == 0,
            Flags::INTERFACE => access & ACC_INTERFACE != 0,
            Flags::NON_INTERFACE => access & ACC_INTERFACE == 0,
            Flags::STATIC => access & ACC_STATIC != 0,
            Flags::NON_STATIC => access & ACC_STATIC == 0,
            _ => self.unmet(access).next().is_none(),
        }
    }

    /// Individual flags (in declaration order) that the access bits do not satisfy
    pub fn unmet(self, access: u16) -> impl Iterator<Item = Flags> {
        Flags::EACH
            .iter()
            .map(|(flag, _)| *flag)
            .filter(move |flag| self.contains(*flag) && !flag.holds_for(access))
    }

    /// Do the access bits satisfy every flag?
    pub fn matches(self, access: u16) -> bool {
        self.unmet(access).next().is_none()
    }
}

/// Flags are rendered as their names joined by `|`
impl Display for Flags {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let mut first = true;
        for (flag, name) in Flags::EACH.iter() {
            if self.contains(*flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Place in advice or helper code where a reference was found
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Source {
    pub name: BinaryName,

    /// Source line, when the class has line numbers for that instruction
    pub line: Option<u16>,
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.name, line),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Requirements on one field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldRef {
    pub flags: Flags,
    pub descriptor: FieldType<BinaryName>,
}

/// Methods are required by name and parameter types: the return type is part of the requirement
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodKey {
    pub name: UnqualifiedName,
    pub parameters: Vec<FieldType<BinaryName>>,
}

impl Display for MethodKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        let mut rendered = String::from(self.name.as_str());
        rendered.push('(');
        for parameter in &self.parameters {
            parameter.render_to(&mut rendered);
        }
        rendered.push(')');
        f.write_str(&rendered)
    }
}

/// Requirements on one method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodRef {
    pub flags: Flags,

    /// `None` for `void`
    pub return_type: Option<FieldType<BinaryName>>,
}

/// Everything the instrumentation requires of one class
///
/// References are built up from fragments (one per instruction, roughly) and combined with
/// [`Reference::merge`]. Merging is commutative, associative, and idempotent, and a reference
/// with only a class name is its identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    pub class_name: BinaryName,

    /// Where the requirements come from (diagnostics only)
    pub sources: BTreeSet<Source>,

    /// Requirements on the class itself
    pub flags: Flags,

    /// Superclass the class must have somewhere up its superclass chain
    pub super_name: Option<BinaryName>,

    /// Interfaces the class must implement (directly or not)
    pub interfaces: BTreeSet<BinaryName>,

    pub fields: BTreeMap<UnqualifiedName, FieldRef>,
    pub methods: BTreeMap<MethodKey, MethodRef>,
}

impl Reference {
    /// Reference with no requirements
    pub fn new(class_name: BinaryName) -> Reference {
        Reference {
            class_name,
            sources: BTreeSet::new(),
            flags: Flags::empty(),
            super_name: None,
            interfaces: BTreeSet::new(),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, name: BinaryName, line: Option<u16>) -> Reference {
        self.sources.insert(Source { name, line });
        self
    }

    pub fn with_flags(mut self, flags: Flags) -> Reference {
        self.flags |= flags;
        self
    }

    pub fn with_super_name(mut self, super_name: BinaryName) -> Reference {
        self.super_name = Some(super_name);
        self
    }

    pub fn with_interface(mut self, interface: BinaryName) -> Reference {
        self.interfaces.insert(interface);
        self
    }

    /// Require a field
    ///
    /// If the field is already required, the flags are added and the first type is kept (use
    /// `merge` to detect conflicting types).
    pub fn with_field(
        mut self,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
        flags: Flags,
    ) -> Reference {
        self.fields
            .entry(name)
            .or_insert(FieldRef {
                flags: Flags::empty(),
                descriptor,
            })
            .flags |= flags;
        self
    }

    /// Require a method
    ///
    /// If the method is already required, the flags are added and the first return type is kept
    /// (use `merge` to detect conflicting return types).
    pub fn with_method(
        mut self,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        flags: Flags,
    ) -> Reference {
        let key = MethodKey {
            name,
            parameters: descriptor.parameters,
        };
        self.methods
            .entry(key)
            .or_insert(MethodRef {
                flags: Flags::empty(),
                return_type: descriptor.return_type,
            })
            .flags |= flags;
        self
    }

    /// Combine the requirements of two references to the same class
    pub fn merge(mut self, other: Reference) -> Result<Reference, ConflictingRequirement> {
        if self.class_name != other.class_name {
            return Err(ConflictingRequirement::ClassName {
                first: self.class_name,
                second: other.class_name,
            });
        }

        match (self.super_name.take(), other.super_name) {
            (Some(first), Some(second)) if first != second => {
                return Err(ConflictingRequirement::SuperName {
                    class_name: self.class_name,
                    first,
                    second,
                });
            }
            (first, second) => self.super_name = first.or(second),
        }

        for (name, field) in other.fields {
            match self.fields.get_mut(&name) {
                Some(existing) if existing.descriptor != field.descriptor => {
                    return Err(ConflictingRequirement::FieldType {
                        class_name: self.class_name,
                        field_name: name,
                        first: existing.descriptor.clone(),
                        second: field.descriptor,
                    });
                }
                Some(existing) => existing.flags |= field.flags,
                None => {
                    self.fields.insert(name, field);
                }
            }
        }

        for (key, method) in other.methods {
            match self.methods.get_mut(&key) {
                Some(existing) if existing.return_type != method.return_type => {
                    return Err(ConflictingRequirement::ReturnType {
                        class_name: self.class_name,
                        method: key,
                        first: existing.return_type.clone(),
                        second: method.return_type,
                    });
                }
                Some(existing) => existing.flags |= method.flags,
                None => {
                    self.methods.insert(key, method);
                }
            }
        }

        self.sources.extend(other.sources);
        self.flags |= other.flags;
        self.interfaces.extend(other.interfaces);
        Ok(self)
    }

    /// Full descriptor of a required method
    pub fn method_descriptor(key: &MethodKey, method: &MethodRef) -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: key.parameters.clone(),
            return_type: method.return_type.clone(),
        }
    }
}

/// Two fragments of the same reference that cannot both hold
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictingRequirement {
    /// Fragments are for different classes
    ClassName {
        first: BinaryName,
        second: BinaryName,
    },

    /// Different required superclasses
    SuperName {
        class_name: BinaryName,
        first: BinaryName,
        second: BinaryName,
    },

    /// Same field name, different types
    FieldType {
        class_name: BinaryName,
        field_name: UnqualifiedName,
        first: FieldType<BinaryName>,
        second: FieldType<BinaryName>,
    },

    /// Same method name and parameters, different return types
    ReturnType {
        class_name: BinaryName,
        method: MethodKey,
        first: Option<FieldType<BinaryName>>,
        second: Option<FieldType<BinaryName>>,
    },
}

fn render_return(return_type: &Option<FieldType<BinaryName>>) -> String {
    match return_type {
        None => String::from("V"),
        Some(typ) => typ.render(),
    }
}

impl Display for ConflictingRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            ConflictingRequirement::ClassName { first, second } => {
                write!(f, "cannot merge references to {} and {}", first, second)
            }
            ConflictingRequirement::SuperName {
                class_name,
                first,
                second,
            } => write!(
                f,
                "{} is required to extend both {} and {}",
                class_name, first, second
            ),
            ConflictingRequirement::FieldType {
                class_name,
                field_name,
                first,
                second,
            } => write!(
                f,
                "{}#{} is required to have both type {} and {}",
                class_name,
                field_name,
                first.render(),
                second.render()
            ),
            ConflictingRequirement::ReturnType {
                class_name,
                method,
                first,
                second,
            } => write!(
                f,
                "{}#{} is required to return both {} and {}",
                class_name,
                method,
                render_return(first),
                render_return(second)
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::ParseDescriptor;

    fn name(name: &str) -> BinaryName {
        BinaryName::from_source_name(name).unwrap()
    }

    fn member(name: &str) -> UnqualifiedName {
        UnqualifiedName::from_string(name.to_owned()).unwrap()
    }

    fn method(descriptor: &str) -> MethodDescriptor<BinaryName> {
        MethodDescriptor::parse(descriptor).unwrap()
    }

    fn widget() -> Reference {
        Reference::new(name("com/acme/Widget"))
    }

    fn fragments() -> (Reference, Reference, Reference) {
        let a = widget()
            .with_source(name("com/acme/agent/PaintAdvice"), Some(12))
            .with_flags(Flags::PUBLIC)
            .with_method(
                member("paint"),
                method("(Lcom/acme/Canvas;)V"),
                Flags::PUBLIC | Flags::NON_STATIC,
            );
        let b = widget()
            .with_source(name("com/acme/agent/PaintAdvice"), Some(20))
            .with_flags(Flags::NON_INTERFACE)
            .with_super_name(name("com/acme/Component"))
            .with_field(member("size"), FieldType::int(), Flags::NON_FINAL);
        let c = widget()
            .with_source(name("com/acme/agent/Helper"), None)
            .with_interface(name("com/acme/Listener"))
            .with_method(
                member("paint"),
                method("(Lcom/acme/Canvas;)V"),
                Flags::PROTECTED_OR_HIGHER,
            )
            .with_field(member("size"), FieldType::int(), Flags::NON_STATIC);
        (a, b, c)
    }

    #[test]
    fn merge_laws() {
        let (a, b, c) = fragments();

        let left = a.clone().merge(b.clone()).unwrap().merge(c.clone()).unwrap();
        let right = a.clone().merge(b.clone().merge(c.clone()).unwrap()).unwrap();
        assert_eq!(left, right);

        assert_eq!(a.clone().merge(a.clone()).unwrap(), a);
        assert_eq!(
            a.clone().merge(b.clone()).unwrap(),
            b.clone().merge(a.clone()).unwrap()
        );
        assert_eq!(a.clone().merge(widget()).unwrap(), a);
        assert_eq!(widget().merge(a.clone()).unwrap(), a);
    }

    #[test]
    fn merge_unions_requirements() {
        let (a, b, c) = fragments();
        let merged = a.merge(b).unwrap().merge(c).unwrap();

        assert_eq!(merged.sources.len(), 3);
        assert_eq!(merged.flags, Flags::PUBLIC | Flags::NON_INTERFACE);
        assert_eq!(merged.super_name, Some(name("com/acme/Component")));
        assert_eq!(
            merged.interfaces.iter().collect::<Vec<_>>(),
            vec![&name("com/acme/Listener")]
        );
        assert_eq!(
            merged.fields[&member("size")].flags,
            Flags::NON_FINAL | Flags::NON_STATIC
        );

        let (key, paint) = merged.methods.iter().next().unwrap();
        assert_eq!(key.to_string(), "paint(Lcom/acme/Canvas;)");
        assert_eq!(
            paint.flags,
            Flags::PUBLIC | Flags::PROTECTED_OR_HIGHER | Flags::NON_STATIC
        );
        assert_eq!(
            Reference::method_descriptor(key, paint).render(),
            "(Lcom/acme/Canvas;)V"
        );
    }

    #[test]
    fn merge_conflicts() {
        let extends_component = widget().with_super_name(name("com/acme/Component"));
        let extends_panel = widget().with_super_name(name("com/acme/Panel"));
        assert!(matches!(
            extends_component.merge(extends_panel),
            Err(ConflictingRequirement::SuperName { .. })
        ));

        let returns_void = widget().with_method(member("size"), method("()V"), Flags::empty());
        let returns_int = widget().with_method(member("size"), method("()I"), Flags::empty());
        let conflict = returns_void.merge(returns_int).unwrap_err();
        assert_eq!(
            conflict.to_string(),
            "com.acme.Widget#size() is required to return both V and I"
        );

        let int_field = widget().with_field(member("size"), FieldType::int(), Flags::empty());
        let long_field = widget().with_field(
            member("size"),
            FieldType::object(BinaryName::INTEGER),
            Flags::empty(),
        );
        assert!(matches!(
            int_field.merge(long_field),
            Err(ConflictingRequirement::FieldType { .. })
        ));

        assert!(matches!(
            widget().merge(Reference::new(name("com/acme/Canvas"))),
            Err(ConflictingRequirement::ClassName { .. })
        ));
    }

    #[test]
    fn flag_predicates() {
        let public_final = (ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL).bits();
        let protected_static = (MethodAccessFlags::PROTECTED | MethodAccessFlags::STATIC).bits();
        let private = MethodAccessFlags::PRIVATE.bits();
        let package_interface = (ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT).bits();

        assert!(Flags::PUBLIC.matches(public_final));
        assert!(!Flags::NON_FINAL.matches(public_final));
        assert!(Flags::PROTECTED_OR_HIGHER.matches(protected_static));
        assert!(!Flags::PUBLIC.matches(protected_static));
        assert!(Flags::STATIC.matches(protected_static));
        assert!(!Flags::PACKAGE_OR_HIGHER.matches(private));
        assert!(Flags::PRIVATE_OR_HIGHER.matches(private));
        assert!(Flags::PACKAGE_OR_HIGHER.matches(package_interface));
        assert!(!Flags::PROTECTED_OR_HIGHER.matches(package_interface));
        assert!(Flags::INTERFACE.matches(package_interface));
        assert!(!Flags::NON_INTERFACE.matches(package_interface));

        let required = Flags::PUBLIC | Flags::NON_STATIC | Flags::NON_FINAL;
        assert_eq!(
            required.unmet(protected_static).collect::<Vec<_>>(),
            vec![Flags::PUBLIC, Flags::NON_STATIC]
        );
        assert_eq!(required.to_string(), "PUBLIC|NON_FINAL|NON_STATIC");
        assert_eq!(Flags::empty().to_string(), "");
    }

    #[test]
    fn field_access_bits() {
        use crate::jvm::FieldAccessFlags;

        let written_constant = (FieldAccessFlags::PUBLIC
            | FieldAccessFlags::STATIC
            | FieldAccessFlags::FINAL)
            .bits();
        assert!((Flags::PUBLIC | Flags::STATIC).matches(written_constant));
        assert_eq!(
            (Flags::PUBLIC | Flags::STATIC | Flags::NON_FINAL)
                .unmet(written_constant)
                .collect::<Vec<_>>(),
            vec![Flags::NON_FINAL]
        );
        assert!(!Flags::PACKAGE_OR_HIGHER.matches(FieldAccessFlags::PRIVATE.bits()));
        assert!(Flags::PROTECTED_OR_HIGHER.matches(FieldAccessFlags::PROTECTED.bits()));
    }
}
