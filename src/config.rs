//! Configuration for the ConfigRules tool.
//!
//! Each pipeline stage has its own options struct with sensible defaults.
//! [`ToolConfig`] bundles them and can be loaded from YAML so the command
//! line front end can share one file across invocations.
//!
//! # Examples
//!
//! ```rust
//! use config_rules::config::ToolConfig;
//!
//! let config = ToolConfig::new()
//!     .with_verbose(true)
//!     .with_compression_level(9);
//! assert!(config.compile.verbose);
//! assert_eq!(config.container.compression_level, 9);
//! ```

use crate::error::{Result, RulesError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Options for a single compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Log every emitted instruction at `info` level instead of `trace`.
    pub verbose: bool,
}

/// Options for rendering bytecode back into rule text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompileOptions {
    /// Emit `;goto:` and `;false:` comments for jump targets.
    pub debug: bool,
    /// Text repeated once per nesting level.
    ///
    /// **Default**: a single tab
    pub indent: String,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            debug: false,
            indent: "\t".to_string(),
        }
    }
}

/// Options for the framed container written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// zlib level, 0 (store) to 9 (best).
    ///
    /// **Default**: 6
    pub compression_level: u32,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            compression_level: 6,
        }
    }
}

/// Configuration for compiling many rule files at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
    /// Compile on the rayon pool at all.
    pub enable_parallelism: bool,
    /// Smaller batches are compiled on the calling thread.
    pub min_batch_size_for_parallelism: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            enable_parallelism: true,
            min_batch_size_for_parallelism: 4,
        }
    }
}

/// Complete tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub compile: CompileOptions,
    pub decompile: DecompileOptions,
    pub container: ContainerOptions,
    pub batch: BatchConfig,
}

impl ToolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verbose compilation and annotated decompilation.
    pub fn debugging() -> Self {
        Self {
            compile: CompileOptions { verbose: true },
            decompile: DecompileOptions {
                debug: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.compile.verbose = verbose;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.decompile.debug = debug;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.container.compression_level = level;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.batch.num_threads = Some(threads);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| RulesError::Config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.container.compression_level > 9 {
            return Err(RulesError::Config(format!(
                "compression_level must be 0-9, got {}",
                self.container.compression_level
            )));
        }
        if self.batch.num_threads == Some(0) {
            return Err(RulesError::Config(
                "num_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ToolConfig::default();
        assert!(!config.compile.verbose);
        assert!(!config.decompile.debug);
        assert_eq!(config.decompile.indent, "\t");
        assert_eq!(config.container.compression_level, 6);
        assert!(config.batch.enable_parallelism);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debugging_preset() {
        let config = ToolConfig::debugging();
        assert!(config.compile.verbose);
        assert!(config.decompile.debug);
        assert_eq!(config.container, ContainerOptions::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
decompile:
  indent: "    "
container:
  compression_level: 9
"#;
        let config = ToolConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.decompile.indent, "    ");
        assert!(!config.decompile.debug);
        assert_eq!(config.container.compression_level, 9);
        assert_eq!(config.batch, BatchConfig::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = ToolConfig::from_yaml_str("container:\n  compression_level: 12\n");
        assert!(matches!(result, Err(RulesError::Config(_))));

        let config = ToolConfig::new().with_threads(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let result = ToolConfig::from_yaml_str("compile: [");
        match result {
            Err(RulesError::Config(msg)) => assert!(msg.contains("Failed to parse YAML")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }
}
