use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, Deserialize, FieldRefConstantIndex,
    InvokeDynamicConstantIndex, MethodRefConstantIndex,
};
use crate::jvm::code::{Instruction, InvokeType};
use crate::jvm::Error;
use std::io::{Cursor, ErrorKind, Result};

/// Iterator over the instructions of a bytecode array, along with their offsets
///
/// Iteration stops after the first error.
pub struct InstructionReader<'a> {
    cursor: Cursor<&'a [u8]>,
    failed: bool,
}

impl<'a> InstructionReader<'a> {
    pub fn new(code: &'a [u8]) -> InstructionReader<'a> {
        InstructionReader {
            cursor: Cursor::new(code),
            failed: false,
        }
    }

    fn skip(&mut self, count: u64) -> Result<()> {
        let target = self.cursor.position() + count;
        if target > self.cursor.get_ref().len() as u64 {
            return Err(ErrorKind::UnexpectedEof.into());
        }
        self.cursor.set_position(target);
        Ok(())
    }

    /// Switches align their operands on a 4-byte boundary relative to the start of the code
    fn skip_switch_padding(&mut self) -> Result<()> {
        let padding = (4 - self.cursor.position() % 4) % 4;
        self.skip(padding)
    }

    fn constant(&mut self) -> Result<ConstantIndex> {
        ConstantIndex::deserialize(&mut self.cursor)
    }

    /// Decode the operands of the instruction whose opcode was just read
    ///
    /// Returns `None` for opcodes that are not valid in a class file.
    fn read_operands(&mut self, opcode: u8) -> Result<Option<Instruction>> {
        let instruction = match opcode {
            0x12 => Instruction::Ldc(ConstantIndex(u8::deserialize(&mut self.cursor)? as u16)),
            0x13 | 0x14 => Instruction::Ldc(self.constant()?),
            0xb2 => Instruction::GetStatic(FieldRefConstantIndex(self.constant()?)),
            0xb3 => Instruction::PutStatic(FieldRefConstantIndex(self.constant()?)),
            0xb4 => Instruction::GetField(FieldRefConstantIndex(self.constant()?)),
            0xb5 => Instruction::PutField(FieldRefConstantIndex(self.constant()?)),
            0xb6 => Instruction::Invoke(
                InvokeType::Virtual,
                MethodRefConstantIndex(self.constant()?),
            ),
            0xb7 => Instruction::Invoke(
                InvokeType::Special,
                MethodRefConstantIndex(self.constant()?),
            ),
            0xb8 => Instruction::Invoke(
                InvokeType::Static,
                MethodRefConstantIndex(self.constant()?),
            ),
            0xb9 => {
                let method = MethodRefConstantIndex(self.constant()?);
                let count = u8::deserialize(&mut self.cursor)?;
                self.skip(1)?;
                Instruction::Invoke(InvokeType::Interface(count), method)
            }
            0xba => {
                let call_site = InvokeDynamicConstantIndex(self.constant()?);
                self.skip(2)?;
                Instruction::InvokeDynamic(call_site)
            }
            0xbb => Instruction::New(ClassConstantIndex(self.constant()?)),
            0xbd => Instruction::ANewArray(ClassConstantIndex(self.constant()?)),
            0xc0 => Instruction::CheckCast(ClassConstantIndex(self.constant()?)),
            0xc1 => Instruction::InstanceOf(ClassConstantIndex(self.constant()?)),
            0xc5 => {
                let class = ClassConstantIndex(self.constant()?);
                let dimensions = u8::deserialize(&mut self.cursor)?;
                Instruction::MultiANewArray(class, dimensions)
            }

            // `tableswitch`
            0xaa => {
                self.skip_switch_padding()?;
                let _default = i32::deserialize(&mut self.cursor)?;
                let low = i32::deserialize(&mut self.cursor)? as i64;
                let high = i32::deserialize(&mut self.cursor)? as i64;
                if high < low {
                    return Err(ErrorKind::InvalidData.into());
                }
                self.skip((high - low + 1) as u64 * 4)?;
                Instruction::Other(opcode)
            }

            // `lookupswitch`
            0xab => {
                self.skip_switch_padding()?;
                let _default = i32::deserialize(&mut self.cursor)?;
                let pairs = i32::deserialize(&mut self.cursor)?;
                if pairs < 0 {
                    return Err(ErrorKind::InvalidData.into());
                }
                self.skip(pairs as u64 * 8)?;
                Instruction::Other(opcode)
            }

            // `wide`
            0xc4 => {
                match u8::deserialize(&mut self.cursor)? {
                    0x84 => self.skip(4)?,
                    0x15..=0x19 | 0x36..=0x3a | 0xa9 => self.skip(2)?,
                    _ => return Ok(None),
                }
                Instruction::Other(opcode)
            }

            _ => match fixed_operand_len(opcode) {
                Some(len) => {
                    self.skip(len)?;
                    Instruction::Other(opcode)
                }
                None => return Ok(None),
            },
        };
        Ok(Some(instruction))
    }
}

/// Operand length of instructions with no constant pool operand and a fixed layout
fn fixed_operand_len(opcode: u8) -> Option<u64> {
    let len = match opcode {
        0x00..=0x0f => 0,               // `nop`, constants
        0x10 => 1,                      // `bipush`
        0x11 => 2,                      // `sipush`
        0x15..=0x19 => 1,               // loads
        0x1a..=0x35 => 0,               // short loads, array loads
        0x36..=0x3a => 1,               // stores
        0x3b..=0x83 => 0,               // short stores, array stores, stack, arithmetic
        0x84 => 2,                      // `iinc`
        0x85..=0x98 => 0,               // conversions, comparisons
        0x99..=0xa8 => 2,               // branches, `goto`, `jsr`
        0xa9 => 1,                      // `ret`
        0xac..=0xb1 => 0,               // returns
        0xbc => 1,                      // `newarray`
        0xbe | 0xbf => 0,               // `arraylength`, `athrow`
        0xc2 | 0xc3 => 0,               // `monitorenter`, `monitorexit`
        0xc6 | 0xc7 => 2,               // `ifnull`, `ifnonnull`
        0xc8 | 0xc9 => 4,               // `goto_w`, `jsr_w`
        _ => return None,
    };
    Some(len)
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = std::result::Result<(usize, Instruction), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor.position() >= self.cursor.get_ref().len() as u64 {
            return None;
        }

        let offset = self.cursor.position() as usize;
        let decoded = u8::deserialize(&mut self.cursor).and_then(|opcode| {
            self.read_operands(opcode)
                .map(|instruction| instruction.ok_or(opcode))
        });
        let result = match decoded {
            Ok(Ok(instruction)) => Ok((offset, instruction)),
            Ok(Err(opcode)) => Err(Error::InvalidOpcode { offset, opcode }),
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                Err(Error::MalformedSwitch { offset })
            }
            Err(_) => Err(Error::TruncatedCode { offset }),
        };
        self.failed = result.is_err();
        Some(result)
    }
}
