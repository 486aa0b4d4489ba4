//! Engine configuration.
//!
//! The configuration is a small JSON document; every field is optional:
//!
//! ```json
//! {
//!   "root": "main",
//!   "library": { "use_standard_routines": true, "extra_routines": ["my_alloc"] }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use squishy_ir::{FunctionId, Module};
use thiserror::Error;

use crate::library::LibraryTable;

/// Name of the root function when neither the configuration nor the module
/// designates one
pub const DEFAULT_ROOT: &str = "main";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Settings of a flattening run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlattenConfig {
    /// Name of the function everything is flattened into
    ///
    /// When unset, the module's designated entry is used, then `main`.
    pub root: Option<String>,

    /// Routines that must never be force-inlined
    pub library: LibraryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibraryConfig {
    /// Recognize the C standard library routines
    pub use_standard_routines: bool,

    /// Additional routine names, matched by name alone
    pub extra_routines: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            use_standard_routines: true,
            extra_routines: Vec::new(),
        }
    }
}

impl FlattenConfig {
    /// Loads a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Overrides the root function name
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Name of the root function to look for in `module`
    pub fn root_name<'a>(&'a self, module: &'a Module) -> &'a str {
        if let Some(root) = &self.root {
            return root;
        }
        module
            .entry
            .and_then(|entry| module.get_function(entry))
            .map_or(DEFAULT_ROOT, |f| f.name.as_str())
    }

    /// Resolves the root function of `module`
    pub fn resolve_root(&self, module: &Module) -> Option<FunctionId> {
        match &self.root {
            Some(root) => module.lookup_function(root),
            None => module
                .entry
                .filter(|&entry| module.get_function(entry).is_some())
                .or_else(|| module.lookup_function(DEFAULT_ROOT)),
        }
    }

    /// Builds the library routine table
    pub fn library_table(&self) -> LibraryTable {
        let base = if self.library.use_standard_routines {
            LibraryTable::standard()
        } else {
            LibraryTable::empty()
        };
        self.library
            .extra_routines
            .iter()
            .fold(base, |table, name| table.with_routine(name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squishy_ir::{Function, Type};

    #[test]
    fn test_root_resolution_order() {
        let mut module = Module::new("m");
        let main = module.add_function(Function::new("main", Type::i32()));
        let start = module.add_function(Function::new("start", Type::Void));

        let config = FlattenConfig::default();
        assert_eq!(config.resolve_root(&module), Some(main));

        module.set_entry(start);
        assert_eq!(config.resolve_root(&module), Some(start));
        assert_eq!(config.root_name(&module), "start");

        let config = config.with_root("main");
        assert_eq!(config.resolve_root(&module), Some(main));

        let config = FlattenConfig::default().with_root("missing");
        assert_eq!(config.resolve_root(&module), None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: FlattenConfig =
            serde_json::from_str(r#"{ "library": { "extra_routines": ["my_alloc"] } }"#).unwrap();

        assert_eq!(config.root, None);
        assert!(config.library.use_standard_routines);

        let table = config.library_table();
        let my_alloc = Function::declaration("my_alloc", Type::Ptr, vec![], false);
        assert!(table.matches(&my_alloc));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result = serde_json::from_str::<FlattenConfig>(r#"{ "roots": "main" }"#);
        assert!(result.is_err());
    }
}
