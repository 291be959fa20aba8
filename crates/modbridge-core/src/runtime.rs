//! Collaborators that execute module code.
//!
//! The engine never runs module code itself. An [`Sdk`] hands out a
//! [`Runtime`] for a module, and the runtime executes one [`Invocation`]:
//! the registered [`FunctionCall`] is made available to the module, the
//! scratch metadata directory is mounted at the configured path, and the
//! module writes its JSON return value into that directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use modbridge_types::Digest;

use crate::server::Context;
use crate::user_mod::UserMod;
use crate::value::Value;

/// An in-memory directory tree keyed by relative path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    files: BTreeMap<String, Vec<u8>>,
}

impl Directory {
    /// A fresh, empty directory.
    pub fn scratch() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.write_file(path, contents);
        self
    }

    pub fn write_file(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files
            .insert(path.trim_start_matches('/').to_string(), contents.into());
    }

    pub fn read_file(&self, path: &str) -> Option<&[u8]> {
        self.files
            .get(path.trim_start_matches('/'))
            .map(Vec::as_slice)
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The call a module runtime is asked to serve, in the module's own naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    /// Original name of the function; empty for the describe call and for
    /// constructors declared without a name.
    pub name: String,
    /// Original name of the owning object; empty for the describe call.
    pub parent_name: String,
    /// The parent object's fields, keyed by original field name.
    pub parent: serde_json::Value,
    pub input_args: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    pub name: String,
    pub value: serde_json::Value,
}

/// One converted argument of a call, as mixed into the caller digest.
#[derive(Debug, Clone, PartialEq)]
pub struct CallInput {
    pub name: String,
    pub value: Value,
}

impl CallInput {
    /// Canonical JSON of `{"name": ..., "value": ...}`.
    pub fn digest(&self) -> Result<String> {
        let value = self
            .value
            .to_json()
            .with_context(|| format!("failed to encode input {:?}", self.name))?;
        let json = serde_json::json!({"name": self.name, "value": value});
        serde_json::to_string(&json).context("failed to serialize call input")
    }

    pub fn to_call_arg(&self) -> Result<CallArg> {
        Ok(CallArg {
            name: self.name.clone(),
            value: self.value.to_json()?,
        })
    }
}

/// Everything a runtime needs to execute one function call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Cache key of the call; identifies the registered [`FunctionCall`].
    pub caller_digest: Digest,
    pub module_name: String,
    /// Where `meta_dir` is mounted inside the module container.
    pub meta_mount_path: String,
    pub meta_dir: Directory,
    /// File inside `meta_dir` the module writes its JSON return value to.
    pub output_file: String,
    pub call: FunctionCall,
    /// Human-readable labels for progress output, outermost first.
    pub pipeline: Vec<String>,
}

/// A handle on the cached execution result, used to keep content the result
/// references alive as long as the result itself.
pub trait CacheRef: Send + Sync {
    fn add_dependency_blobs(&self, blobs: &BTreeSet<Digest>) -> Result<()>;
}

/// Cache handle for runtimes without a persistent cache.
#[derive(Debug, Default)]
pub struct NoopCacheRef;

impl CacheRef for NoopCacheRef {
    fn add_dependency_blobs(&self, _blobs: &BTreeSet<Digest>) -> Result<()> {
        Ok(())
    }
}

pub struct ExecutionResult {
    /// The metadata directory after execution.
    pub meta_dir: Directory,
    pub cache_ref: Arc<dyn CacheRef>,
}

impl fmt::Debug for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionResult")
            .field("meta_dir", &self.meta_dir)
            .finish_non_exhaustive()
    }
}

/// Executes module code.
#[async_trait]
pub trait Runtime: Send + Sync {
    async fn execute(&self, ctx: &Context, invocation: Invocation) -> Result<ExecutionResult>;
}

/// Generated client bindings for a module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    pub code: Directory,
    /// Paths the host VCS should treat as generated.
    pub vcs_generated_paths: Vec<String>,
    /// Paths the host VCS should ignore.
    pub vcs_ignored_paths: Vec<String>,
}

/// Language support for modules: builds their runtime and generates bindings.
#[async_trait]
pub trait Sdk: Send + Sync {
    async fn runtime(&self, ctx: &Context, module: &UserMod) -> Result<Arc<dyn Runtime>>;

    async fn codegen(&self, ctx: &Context, module: &UserMod) -> Result<GeneratedCode>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_paths_are_relative() {
        let dir = Directory::scratch().with_file("/output.json", "{}");
        assert_eq!(dir.read_file("output.json"), Some(&b"{}"[..]));
        assert_eq!(dir.read_file("/output.json"), Some(&b"{}"[..]));
        assert!(dir.read_file("other.json").is_none());
        assert_eq!(dir.entries().collect::<Vec<_>>(), vec!["output.json"]);
    }

    #[test]
    fn test_call_input_digest_is_canonical() {
        let input = CallInput {
            name: "opts".into(),
            value: Value::from_json(serde_json::json!({"z": 1, "a": [true]})),
        };
        assert_eq!(
            input.digest().unwrap(),
            r#"{"name":"opts","value":{"a":[true],"z":1}}"#
        );
    }

    #[test]
    fn test_function_call_wire_format() {
        let call = FunctionCall {
            name: "hello".into(),
            parent_name: "Greeter".into(),
            parent: serde_json::json!({}),
            input_args: vec![CallArg {
                name: "name".into(),
                value: serde_json::json!("world"),
            }],
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["parentName"], "Greeter");
        assert_eq!(json["inputArgs"][0]["name"], "name");
    }
}
