//! Decoding of the bytecode inside `Code` attributes
//!
//! Only instructions with constant pool operands are decoded into anything interesting: the rest
//! are skipped over using the fixed (or computed, for `wide` and the switches) operand lengths.

mod instructions;
mod reader;

pub use instructions::*;
pub use reader::*;
