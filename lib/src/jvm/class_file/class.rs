use crate::jvm::class_file::{
    find_attribute, Attribute, BootstrapMethods, ClassConstantIndex, Constant, ConstantIndex,
    ConstantsReader, Deserialize, Field, Method, Serialize, Version,
};
use crate::jvm::{BinaryName, ClassAccessFlags, Error, Name};
use crate::util::OffsetVec;
use byteorder::WriteBytesExt;
use std::io::Cursor;

/// Representation of the [`class` file format of the JVM][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se15/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Index 0 for `java/lang/Object` (and `module-info`)
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file
    ///
    /// Trailing bytes after the class attributes are ignored.
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = Cursor::new(bytes);

        let magic = u32::deserialize(&mut reader)?;
        if magic != u32::from_be_bytes(ClassFile::MAGIC) {
            return Err(Error::BadMagic(magic));
        }

        Ok(ClassFile {
            version: Version::deserialize(&mut reader)?,
            constants: OffsetVec::deserialize(&mut reader)?,
            access_flags: ClassAccessFlags::deserialize(&mut reader)?,
            this_class: ClassConstantIndex::deserialize(&mut reader)?,
            super_class: ClassConstantIndex::deserialize(&mut reader)?,
            interfaces: Vec::deserialize(&mut reader)?,
            fields: Vec::deserialize(&mut reader)?,
            methods: Vec::deserialize(&mut reader)?,
            attributes: Vec::deserialize(&mut reader)?,
        })
    }

    /// Name of the class itself
    pub fn this_class_name(&self) -> Result<BinaryName, Error> {
        binary_name(self.constants.class_name(self.this_class)?)
    }

    /// Name of the superclass (`None` only for `java/lang/Object`)
    pub fn super_class_name(&self) -> Result<Option<BinaryName>, Error> {
        if self.super_class.0 == ConstantIndex(0) {
            Ok(None)
        } else {
            binary_name(self.constants.class_name(self.super_class)?).map(Some)
        }
    }

    /// Names of the directly implemented interfaces, in declaration order
    pub fn interface_names(&self) -> Result<Vec<BinaryName>, Error> {
        self.interfaces
            .iter()
            .map(|interface| binary_name(self.constants.class_name(*interface)?))
            .collect()
    }

    /// Bootstrap methods of `invokedynamic` call sites and dynamic constants
    pub fn bootstrap_methods(&self) -> Result<Option<BootstrapMethods>, Error> {
        find_attribute(&self.attributes, &self.constants)
    }
}

/// Parse a class name read out of a class file
pub fn binary_name(name: &str) -> Result<BinaryName, Error> {
    BinaryName::from_string(name.to_owned()).map_err(Error::MalformedName)
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}
