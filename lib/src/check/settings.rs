use crate::jvm::BinaryName;
use std::collections::HashMap;
use std::env;

/// Settings for building reference tables and gating transforms
#[derive(Clone, Debug)]
pub struct Settings {
    /// Namespaces (internal form, eg. `com/acme/agent/`) of the instrumentation's own classes
    ///
    /// Classes in here are followed during extraction instead of being treated as leaves.
    pub internal_prefixes: Vec<String>,

    /// Namespaces every context is assumed to provide (never recorded as references)
    pub ignored_prefixes: Vec<String>,

    /// Should gate verdicts be remembered per class-loading context?
    pub cache_verdicts: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            internal_prefixes: vec![String::from("datadog/trace/instrumentation/")],
            ignored_prefixes: vec![String::from("java/")],
            cache_verdicts: true,
        }
    }

    /// Add an internal namespace, given in either internal or source form
    pub fn with_internal_prefix(mut self, prefix: &str) -> Settings {
        self.internal_prefixes.push(prefix.replace('.', "/"));
        self
    }

    pub fn is_internal(&self, name: &BinaryName) -> bool {
        self.internal_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }

    pub fn is_ignored(&self, name: &BinaryName) -> bool {
        self.ignored_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix))
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}

/// Source of `dd.integration.<name>.enabled` style switches
///
/// Explicit properties take precedence. Otherwise the property name is looked up in the
/// environment, upper-cased with `.` and `-` turned into `_` (so
/// `dd.integration.okhttp.enabled` becomes `DD_INTEGRATION_OKHTTP_ENABLED`).
#[derive(Clone, Debug)]
pub struct IntegrationConfig {
    properties: HashMap<String, String>,
    use_environment: bool,
}

impl IntegrationConfig {
    pub fn new() -> IntegrationConfig {
        IntegrationConfig {
            properties: HashMap::new(),
            use_environment: true,
        }
    }

    pub fn with_property(mut self, key: &str, value: &str) -> IntegrationConfig {
        self.properties.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Ignore environment variables (only explicit properties count)
    pub fn without_environment(mut self) -> IntegrationConfig {
        self.use_environment = false;
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(value) = self.properties.get(key) {
            return Some(value.clone());
        }
        if self.use_environment {
            let var = key.to_ascii_uppercase().replace(&['.', '-'][..], "_");
            env::var(var).ok()
        } else {
            None
        }
    }

    /// Boolean switch: only `true` (in any case) is true
    pub fn get_enabled(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    /// Default for integrations that are not configured individually
    pub fn integrations_enabled(&self) -> bool {
        self.get_enabled("dd.integrations.enabled", true)
    }

    /// Is a module known under these names enabled?
    ///
    /// When integrations are on by default, disabling any one name disables the module. When they
    /// are off by default, enabling any one name enables it.
    pub fn is_module_enabled<'a, I>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        let default = self.integrations_enabled();
        let mut names = names.into_iter();
        let enabled =
            |name: &str| self.get_enabled(&format!("dd.integration.{}.enabled", name), default);
        if default {
            names.all(enabled)
        } else {
            names.any(enabled)
        }
    }
}

impl Default for IntegrationConfig {
    fn default() -> IntegrationConfig {
        IntegrationConfig::new()
    }
}
