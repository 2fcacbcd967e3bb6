use super::class_file::{ConstantIndex, ConstantPoolOverflow};
use std::fmt::{Display, Error as FmtError, Formatter};

/// Problems reading (or writing) a class file
#[derive(Debug)]
pub enum Error {
    /// Truncated input, or a structure that could not be decoded
    IoError(std::io::Error),

    /// The input doesn't start with `0xCAFEBABE`
    BadMagic(u32),

    ConstantPoolOverflow(ConstantPoolOverflow),

    /// Constant pool index that doesn't point at an entry
    MissingConstant(ConstantIndex),

    /// Constant pool entry is not of the kind the referring structure requires
    UnexpectedConstant {
        index: ConstantIndex,
        expected: &'static str,
    },

    /// Field or method descriptor that does not parse
    BadDescriptor(String),

    /// Class, field, or method name that is not valid
    MalformedName(String),

    /// Unknown opcode in a `Code` attribute
    InvalidOpcode { offset: usize, opcode: u8 },

    /// Instruction whose operands run past the end of the `Code` attribute
    TruncatedCode { offset: usize },

    /// `tableswitch` whose high bound is below its low bound, or `lookupswitch` with a negative
    /// number of pairs
    MalformedSwitch { offset: usize },

    /// `invokedynamic` or dynamic constant pointing past the `BootstrapMethods` attribute
    MissingBootstrapMethod(u16),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow(overflow)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Error::IoError(err) => write!(f, "{}", err),
            Error::BadMagic(magic) => write!(f, "not a class file (magic {:#010x})", magic),
            Error::ConstantPoolOverflow(overflow) => {
                write!(f, "constant pool overflow at #{}", overflow.offset)
            }
            Error::MissingConstant(index) => write!(f, "no constant at #{}", index.0),
            Error::UnexpectedConstant { index, expected } => {
                write!(f, "constant #{} is not a {}", index.0, expected)
            }
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::MalformedName(msg) => write!(f, "{}", msg),
            Error::InvalidOpcode { offset, opcode } => {
                write!(f, "invalid opcode {:#04x} at offset {}", opcode, offset)
            }
            Error::TruncatedCode { offset } => {
                write!(f, "instruction at offset {} runs past the end of the code", offset)
            }
            Error::MalformedSwitch { offset } => write!(f, "malformed switch at offset {}", offset),
            Error::MissingBootstrapMethod(index) => write!(f, "no bootstrap method #{}", index),
        }
    }
}

impl std::error::Error for Error {}
