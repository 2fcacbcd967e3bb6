//! Read (and write) JVM classes
//!
//! Only the parts of the class file format that matter for symbolic references are modelled in
//! detail: the constant pool, the class/field/method declarations, and the `Code` attribute along
//! with its `LineNumberTable`. Everything else is carried around as raw attribute bytes.
//!
//! ### Reading a class
//!
//! ```
//! use muzzle::jvm::class_file::{ClassFile, ConstantsPool, Serialize, Version};
//! use muzzle::jvm::class_graph::ClassData;
//! use muzzle::jvm::*;
//!
//! # fn read_class() -> Result<(), Error> {
//! // Assemble a tiny class: `public class me/alec/Point extends java/lang/Object`
//! let mut constants = ConstantsPool::new();
//! let this_class = constants.get_class("me/alec/Point")?;
//! let super_class = constants.get_class("java/lang/Object")?;
//! let class_file = ClassFile {
//!     version: Version::JAVA8,
//!     constants: constants.into_offset_vec(),
//!     access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
//!     this_class,
//!     super_class,
//!     interfaces: vec![],
//!     fields: vec![],
//!     methods: vec![],
//!     attributes: vec![],
//! };
//! let mut class_bytes: Vec<u8> = vec![];
//! class_file.serialize(&mut class_bytes).map_err(Error::IoError)?;
//!
//! // Parse it back and extract the passive description of the class
//! let parsed = ClassFile::parse(&class_bytes)?;
//! let class = ClassData::from_class_file(&parsed)?;
//! assert_eq!(class.name.as_str(), "me/alec/Point");
//! assert_eq!(class.superclass, Some(BinaryName::OBJECT));
//! # Ok(())
//! # }
//! # read_class().unwrap();
//! ```

mod access_flags;
pub mod class_file;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
