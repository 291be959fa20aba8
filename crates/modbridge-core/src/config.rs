//! Engine configuration.
//!
//! Defaults describe the contract with module runtimes: the metadata directory
//! is mounted at `/.modmeta` and a function writes its JSON return value to
//! `output.json` inside it. Every setting can be overridden from the environment.

use serde::{Deserialize, Serialize};

use modbridge_types::env_utils::{env_bool_or, env_string_or};

pub const DEFAULT_META_MOUNT_PATH: &str = "/.modmeta";
pub const DEFAULT_OUTPUT_FILE: &str = "output.json";
pub const DEFAULT_CORE_MODULE_NAME: &str = "core";

/// Settings shared by every module served in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Where the scratch metadata directory is mounted in the module container.
    pub meta_mount_path: String,
    /// File inside the metadata directory holding the function's return value.
    pub output_file: String,
    /// Name of the builtin module. Types it owns may be referenced by any module.
    pub core_module_name: String,
    /// Share results between calls with identical caller digests.
    pub call_cache_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            meta_mount_path: DEFAULT_META_MOUNT_PATH.to_string(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            core_module_name: DEFAULT_CORE_MODULE_NAME.to_string(),
            call_cache_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Defaults with `MODBRIDGE_*` overrides applied.
    ///
    /// - `MODBRIDGE_META_MOUNT_PATH`
    /// - `MODBRIDGE_OUTPUT_FILE`
    /// - `MODBRIDGE_CORE_MODULE_NAME`
    /// - `MODBRIDGE_CALL_CACHE`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            meta_mount_path: env_string_or("MODBRIDGE_META_MOUNT_PATH", &defaults.meta_mount_path),
            output_file: env_string_or("MODBRIDGE_OUTPUT_FILE", &defaults.output_file),
            core_module_name: env_string_or(
                "MODBRIDGE_CORE_MODULE_NAME",
                &defaults.core_module_name,
            ),
            call_cache_enabled: env_bool_or("MODBRIDGE_CALL_CACHE", defaults.call_cache_enabled),
        }
    }

    /// Full in-container path of the output file.
    pub fn output_path(&self) -> String {
        format!(
            "{}/{}",
            self.meta_mount_path.trim_end_matches('/'),
            self.output_file
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.meta_mount_path, "/.modmeta");
        assert_eq!(config.output_file, "output.json");
        assert_eq!(config.core_module_name, "core");
        assert!(config.call_cache_enabled);
        assert_eq!(config.output_path(), "/.modmeta/output.json");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"meta_mount_path": "/meta/"}"#).unwrap();
        assert_eq!(config.output_path(), "/meta/output.json");
        assert_eq!(config.core_module_name, "core");
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("MODBRIDGE_OUTPUT_FILE", "result.json");
        std::env::set_var("MODBRIDGE_CALL_CACHE", "off");
        let config = EngineConfig::from_env();
        std::env::remove_var("MODBRIDGE_OUTPUT_FILE");
        std::env::remove_var("MODBRIDGE_CALL_CACHE");

        assert_eq!(config.output_file, "result.json");
        assert!(!config.call_cache_enabled);
        assert_eq!(config.meta_mount_path, DEFAULT_META_MOUNT_PATH);
    }
}
