//! Scriptable SDK and runtime for tests and demos.
//!
//! `MockRuntime` answers the describe call with a fixed [`ModuleDefinition`]
//! and every other call with a canned JSON output or a handler, keyed by the
//! object's and function's original names. It records every invocation.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use modbridge_types::{Digest, ModuleDefinition};

use crate::runtime::{
    CacheRef, Directory, ExecutionResult, FunctionCall, GeneratedCode, Invocation, Runtime, Sdk,
};
use crate::server::Context;
use crate::user_mod::UserMod;

/// Computes the output of one call.
pub type MockHandler = Arc<dyn Fn(&FunctionCall) -> Result<serde_json::Value> + Send + Sync>;

#[derive(Clone)]
enum MockOutput {
    Json(serde_json::Value),
    Raw(Vec<u8>),
    Handler(MockHandler),
}

/// Records the blobs linked to call results.
#[derive(Debug, Default)]
pub struct MockCacheRef {
    blobs: Mutex<BTreeSet<Digest>>,
}

impl MockCacheRef {
    pub fn blobs(&self) -> BTreeSet<Digest> {
        self.blobs.lock().clone()
    }
}

impl CacheRef for MockCacheRef {
    fn add_dependency_blobs(&self, blobs: &BTreeSet<Digest>) -> Result<()> {
        self.blobs.lock().extend(blobs.iter().cloned());
        Ok(())
    }
}

#[derive(Default)]
pub struct MockRuntime {
    definition: ModuleDefinition,
    /// (parent name, function name) -> output
    outputs: HashMap<(String, String), MockOutput>,
    delay: Option<Duration>,
    /// If set, every execution fails with this error
    force_error: Option<String>,
    executions: AtomicUsize,
    calls: Mutex<Vec<Invocation>>,
    cache_ref: Arc<MockCacheRef>,
}

impl MockRuntime {
    pub fn new(definition: ModuleDefinition) -> Self {
        Self {
            definition,
            ..Default::default()
        }
    }

    /// Replace the definition returned by the describe call.
    pub fn with_definition(&mut self, definition: ModuleDefinition) -> &mut Self {
        self.definition = definition;
        self
    }

    /// Canned JSON output for `parent.function`.
    pub fn add_output(&mut self, parent: &str, function: &str, output: serde_json::Value) -> &mut Self {
        self.outputs
            .insert(Self::key(parent, function), MockOutput::Json(output));
        self
    }

    /// Output bytes written verbatim, e.g. invalid JSON.
    pub fn add_raw_output(&mut self, parent: &str, function: &str, output: &[u8]) -> &mut Self {
        self.outputs
            .insert(Self::key(parent, function), MockOutput::Raw(output.to_vec()));
        self
    }

    pub fn add_handler<F>(&mut self, parent: &str, function: &str, handler: F) -> &mut Self
    where
        F: Fn(&FunctionCall) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        self.outputs
            .insert(Self::key(parent, function), MockOutput::Handler(Arc::new(handler)));
        self
    }

    /// Sleep this long before answering each call.
    pub fn set_delay(&mut self, delay: Duration) -> &mut Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_error(&mut self, error: &str) -> &mut Self {
        self.force_error = Some(error.to_string());
        self
    }

    pub fn clear_error(&mut self) -> &mut Self {
        self.force_error = None;
        self
    }

    /// Executions so far, including the describe call.
    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Executions of `parent.function` so far.
    pub fn call_count(&self, parent: &str, function: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|inv| inv.call.parent_name == parent && inv.call.name == function)
            .count()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.lock().clone()
    }

    pub fn linked_blobs(&self) -> BTreeSet<Digest> {
        self.cache_ref.blobs()
    }

    fn key(parent: &str, function: &str) -> (String, String) {
        (parent.to_string(), function.to_string())
    }

    fn output_for(&self, call: &FunctionCall) -> Result<Option<Vec<u8>>> {
        if call.name.is_empty() && call.parent_name.is_empty() {
            return Ok(Some(serde_json::to_vec(&self.definition)?));
        }
        let output = match self.outputs.get(&Self::key(&call.parent_name, &call.name)) {
            None => return Ok(None),
            Some(output) => output.clone(),
        };
        Ok(Some(match output {
            MockOutput::Json(json) => serde_json::to_vec(&json)?,
            MockOutput::Raw(bytes) => bytes,
            MockOutput::Handler(handler) => serde_json::to_vec(&handler(call)?)?,
        }))
    }
}

#[async_trait]
impl Runtime for MockRuntime {
    async fn execute(&self, _ctx: &Context, invocation: Invocation) -> Result<ExecutionResult> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(invocation.clone());
        debug!(
            module = %invocation.module_name,
            parent = %invocation.call.parent_name,
            function = %invocation.call.name,
            "mock runtime executing"
        );

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.force_error {
            return Err(anyhow!("{}", err));
        }

        let mut meta_dir = invocation.meta_dir;
        if let Some(output) = self.output_for(&invocation.call)? {
            meta_dir.write_file(&invocation.output_file, output);
        }
        Ok(ExecutionResult {
            meta_dir,
            cache_ref: self.cache_ref.clone(),
        })
    }
}

/// An SDK whose modules all run on one [`MockRuntime`].
#[derive(Clone)]
pub struct MockSdk {
    runtime: Arc<MockRuntime>,
}

impl MockSdk {
    pub fn new(runtime: MockRuntime) -> Self {
        Self {
            runtime: Arc::new(runtime),
        }
    }

    pub fn runtime(&self) -> &Arc<MockRuntime> {
        &self.runtime
    }
}

#[async_trait]
impl Sdk for MockSdk {
    async fn runtime(&self, _ctx: &Context, _module: &UserMod) -> Result<Arc<dyn Runtime>> {
        Ok(self.runtime.clone())
    }

    /// Bindings are the introspection JSON of the schema the module is served.
    async fn codegen(&self, ctx: &Context, module: &UserMod) -> Result<GeneratedCode> {
        let introspection = module.deps().schema_introspection_json(ctx).await?;
        Ok(GeneratedCode {
            code: Directory::scratch().with_file("schema.json", introspection),
            vcs_generated_paths: vec!["schema.json".to_string()],
            vcs_ignored_paths: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::runtime::CallArg;
    use crate::server::Session;
    use serde_json::json;

    fn invocation(parent: &str, name: &str) -> Invocation {
        Invocation {
            caller_digest: Digest::from_string(name),
            module_name: "greeter".into(),
            meta_mount_path: "/.modmeta".into(),
            meta_dir: Directory::scratch(),
            output_file: "output.json".into(),
            call: FunctionCall {
                name: name.into(),
                parent_name: parent.into(),
                parent: json!({}),
                input_args: vec![CallArg {
                    name: "name".into(),
                    value: json!("world"),
                }],
            },
            pipeline: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_outputs_and_handlers() {
        let ctx = Context::new(Session::new(EngineConfig::default()));
        let mut runtime = MockRuntime::new(ModuleDefinition::new("greeter"));
        runtime
            .add_output("Greeter", "version", json!("1.0"))
            .add_handler("Greeter", "hello", |call| {
                Ok(json!(format!("hello, {}", call.input_args[0].value.as_str().unwrap_or_default())))
            });

        let result = runtime.execute(&ctx, invocation("Greeter", "hello")).await.unwrap();
        assert_eq!(result.meta_dir.read_file("output.json"), Some(&b"\"hello, world\""[..]));

        let result = runtime.execute(&ctx, invocation("", "")).await.unwrap();
        let definition: ModuleDefinition =
            serde_json::from_slice(result.meta_dir.read_file("output.json").unwrap()).unwrap();
        assert_eq!(definition.name, "greeter");

        let result = runtime.execute(&ctx, invocation("Greeter", "missing")).await.unwrap();
        assert!(result.meta_dir.is_empty());

        assert_eq!(runtime.execution_count(), 3);
        assert_eq!(runtime.call_count("Greeter", "hello"), 1);
    }

    #[tokio::test]
    async fn test_forced_error() {
        let ctx = Context::new(Session::new(EngineConfig::default()));
        let mut runtime = MockRuntime::default();
        runtime.set_error("container exited with code 1");
        let err = runtime.execute(&ctx, invocation("A", "b")).await.unwrap_err();
        assert_eq!(err.to_string(), "container exited with code 1");

        runtime.clear_error();
        assert!(runtime.execute(&ctx, invocation("A", "b")).await.is_ok());
    }
}
