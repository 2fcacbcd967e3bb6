//! Check instrumentation advice against the library versions present in a process
//!
//! Advice bytecode is compiled against one particular version of a library. Weaving it into a
//! class from an incompatible version ends in a link error inside the host, so before any
//! transform we make sure every class, field, and method the advice touches actually exists with
//! the right shape. This happens in two phases:
//!
//!   - once per instrumentation module, the advice class files (and the helper classes they pull
//!     in) are scanned and every external symbol they reference is collected into a
//!     [`check::ReferenceTable`]
//!
//!   - on every candidate transform, that table is matched against the class-loading context of
//!     the transform using only passive metadata lookups (see [`check::ClassLoadingContext`])
//!
//! The [`jvm`] module contains the class file model that both phases are built on.

pub mod check;
pub mod jvm;
mod util;
