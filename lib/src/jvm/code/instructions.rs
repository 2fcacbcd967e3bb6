use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeDynamicConstantIndex,
    MethodRefConstantIndex,
};

/// JVM bytecode instruction, as far as symbolic references are concerned
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Ldc(ConstantIndex), // covers `ldc`, `ldc_w`, and `ldc2_w`
    GetStatic(FieldRefConstantIndex),
    PutStatic(FieldRefConstantIndex),
    GetField(FieldRefConstantIndex),
    PutField(FieldRefConstantIndex),
    Invoke(InvokeType, MethodRefConstantIndex),
    InvokeDynamic(InvokeDynamicConstantIndex),
    New(ClassConstantIndex),
    ANewArray(ClassConstantIndex),
    CheckCast(ClassConstantIndex),
    InstanceOf(ClassConstantIndex),
    MultiANewArray(ClassConstantIndex, u8),

    /// Any other instruction (the opcode is `0xC4` for `wide` ones)
    Other(u8),
}

impl Instruction {
    /// Is this a field access that writes the field?
    pub fn is_field_write(&self) -> bool {
        matches!(self, Instruction::PutField(_) | Instruction::PutStatic(_))
    }
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}
