//! Make sure instrumentation only gets applied where it can link
//!
//! An [`InstrumentationModule`] declares advice classes and helper classes. The first time a
//! [`Gate`] is asked about the module, the advice and helper class files are scanned for the
//! classes, fields, and methods they use outside of the instrumentation's own namespaces, and
//! everything gets merged into a [`ReferenceTable`]. Each candidate class-loading context is then
//! matched against that table using passive lookups only: a single [`Mismatch`] is enough to keep
//! the module away from that context.
//!
//! ```
//! use muzzle::jvm::class_graph::ClassGraph;
//! use muzzle::check::*;
//! use std::sync::Arc;
//!
//! # fn gate() -> Result<(), Error> {
//! // No advice classes, so no requirements
//! let descriptor = ModuleDescriptor::new("okhttp");
//! let module = InstrumentationModule::new(descriptor, &IntegrationConfig::new().without_environment());
//! let gate = Gate::new(MemorySource::new(), Settings::new());
//!
//! let context: Arc<dyn ClassLoadingContext> = Arc::new(ClassGraph::new());
//! assert!(gate.permits(&module, &context));
//! # Ok(())
//! # }
//! # gate().unwrap();
//! ```

mod context;
mod creator;
mod errors;
mod gate;
mod matcher;
mod module;
mod reference;
mod settings;
mod source;
mod table;

pub use context::*;
pub use creator::*;
pub use errors::*;
pub use gate::*;
pub use matcher::*;
pub use module::*;
pub use reference::*;
pub use settings::*;
pub use source::*;
pub use table::*;
