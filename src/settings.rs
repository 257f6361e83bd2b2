use crate::compiler_frontend::compiler_errors::CompilerError;
use crate::return_config_error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "lifeline.toml";
pub const CONFIG_SECTION: &str = "checker";

// Rough guesses for initial allocations, not limits.
pub const MINIMUM_STRING_TABLE_CAPACITY: usize = 64;
pub const LOCALS_CAPACITY: usize = 16;
pub const DROPS_PER_BLOCK_CAPACITY: usize = 4;

/// Where drops that happen on a control-flow edge are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropStrategy {
    /// Drop on the edge itself. Edges into merge blocks are split when lowering.
    Edge,
    /// Drop at the entry of the merge block, guarded by a runtime drop flag
    /// whenever the predecessors disagree about initialization.
    Flags,
}

/// Order in which a synthesized destructor destroys the remaining fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestructorOrder {
    Declaration,
    Reverse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckerConfig {
    /// Track initialization per field instead of per binding.
    pub field_sensitive: bool,
    pub drop_strategy: DropStrategy,
    pub destructor_order: DestructorOrder,
    /// Analyze function bodies on the rayon thread pool.
    pub parallel: bool,
    /// Leave drops of trivially destructible values out of lowered bodies.
    pub elide_trivial_drops: bool,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            field_sensitive: true,
            drop_strategy: DropStrategy::Edge,
            destructor_order: DestructorOrder::Reverse,
            parallel: true,
            elide_trivial_drops: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    checker: CheckerConfig,
}

impl CheckerConfig {
    /// Parse a `lifeline.toml` document. Missing keys fall back to the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, CompilerError> {
        match toml::from_str::<ConfigFile>(source) {
            Ok(file) => Ok(file.checker),
            Err(error) => {
                return_config_error!(
                    format!("Invalid [{}] configuration: {}", CONFIG_SECTION, error),
                    {
                        PrimarySuggestion => "Check the key names and values against the documented checker settings",
                    }
                );
            }
        }
    }

    /// Load the config from a file path, or from `lifeline.toml` inside a directory.
    pub fn from_path(path: &Path) -> Result<Self, CompilerError> {
        let file_path = if path.is_dir() {
            path.join(CONFIG_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        match fs::read_to_string(&file_path) {
            Ok(source) => Self::from_toml_str(&source),
            Err(error) => {
                return_config_error!(
                    format!(
                        "Could not read checker config '{}': {}",
                        file_path.display(),
                        error
                    ),
                    {
                        PrimarySuggestion => "Create the config file or pass the default config",
                    }
                );
            }
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler_frontend::compiler_errors::ErrorType;
    use std::io::Write;

    #[test]
    fn missing_keys_use_defaults() {
        let config = CheckerConfig::from_toml_str("[checker]\nparallel = false\n")
            .expect("config should parse");

        assert!(!config.parallel);
        assert!(config.field_sensitive);
        assert_eq!(config.drop_strategy, DropStrategy::Edge);
        assert_eq!(config.destructor_order, DestructorOrder::Reverse);
    }

    #[test]
    fn empty_document_is_the_default_config() {
        let config = CheckerConfig::from_toml_str("").expect("config should parse");
        assert_eq!(config, CheckerConfig::default());
    }

    #[test]
    fn enum_values_are_snake_case() {
        let config = CheckerConfig::from_toml_str(
            "[checker]\ndrop_strategy = \"flags\"\ndestructor_order = \"declaration\"\n",
        )
        .expect("config should parse");

        assert_eq!(config.drop_strategy, DropStrategy::Flags);
        assert_eq!(config.destructor_order, DestructorOrder::Declaration);
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let error = CheckerConfig::from_toml_str("[checker]\nfield_sensitve = true\n")
            .expect_err("typo should be rejected");
        assert_eq!(error.error_type, ErrorType::Config);
    }

    #[test]
    fn config_is_loaded_from_a_project_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut file = fs::File::create(dir.path().join(CONFIG_FILE_NAME)).expect("config file");
        writeln!(file, "[checker]\nfield_sensitive = false").expect("write config");

        let config = CheckerConfig::from_path(dir.path()).expect("config should load");
        assert!(!config.field_sensitive);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let error = CheckerConfig::from_path(&dir.path().join("nope.toml"))
            .expect_err("missing file should fail");
        assert_eq!(error.error_type, ErrorType::Config);
    }
}
