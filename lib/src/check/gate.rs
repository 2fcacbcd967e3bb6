use super::context::ClassLoadingContext;
use super::matcher::Mismatch;
use super::module::InstrumentationModule;
use super::settings::Settings;
use super::source::ClassFileSource;
use super::table::ReferenceTable;
use super::Error;
use log::debug;
use std::sync::Arc;

/// Decides whether a module's advice may be woven into classes of a class-loading context
///
/// A gate can check any number of modules, but each module should be checked by a single gate
/// (see [`InstrumentationModule`]).
pub struct Gate<S> {
    source: S,
    settings: Settings,
}

impl<S: ClassFileSource> Gate<S> {
    /// `source` provides the class files of the instrumentation (advice and helpers)
    pub fn new(source: S, settings: Settings) -> Gate<S> {
        Gate { source, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Module's reference table, built from this gate's class files on first use
    pub fn reference_table(
        &self,
        module: &InstrumentationModule,
    ) -> Result<Arc<ReferenceTable>, Arc<Error>> {
        module.reference_table(&self.source, &self.settings)
    }

    /// Everything the context is missing for the module
    pub fn mismatches(
        &self,
        module: &InstrumentationModule,
        context: &dyn ClassLoadingContext,
    ) -> Result<Vec<Mismatch>, Arc<Error>> {
        Ok(self.reference_table(module)?.verify(context))
    }

    /// Is the module allowed to transform classes of this context?
    ///
    /// Disabled modules and modules whose reference table cannot be built are never allowed.
    /// Verdicts are remembered for as long as the context is alive (unless caching is off), except
    /// for denials caused by a transient read error, which the next call checks again.
    pub fn permits(
        &self,
        module: &InstrumentationModule,
        context: &Arc<dyn ClassLoadingContext>,
    ) -> bool {
        if !module.is_enabled() {
            debug!("Instrumentation {} is disabled", module.name());
            return false;
        }
        if self.settings.cache_verdicts {
            if let Some(verdict) = module.verdicts().get(context) {
                return verdict;
            }
        }

        let verdict = match self.mismatches(module, &**context) {
            Ok(mismatches) if mismatches.is_empty() => true,
            Ok(mismatches) => {
                debug!(
                    "Instrumentation muzzled: {} ({} mismatched references)",
                    module.name(),
                    mismatches.len()
                );
                for mismatch in &mismatches {
                    debug!("-- {}", mismatch);
                }
                false
            }
            Err(err) if !err.is_permanent() => return false,
            Err(_) => false,
        };

        if self.settings.cache_verdicts {
            module.verdicts().insert(context, verdict);
        }
        verdict
    }
}
