//! JSON fixtures describing a set of modules.
//!
//! A fixture lists modules in dependency order. Each module carries the
//! definition its SDK would report when described, plus canned results for its
//! functions:
//!
//! ```json
//! {
//!   "modules": [{
//!     "name": "greeter",
//!     "definition": {"objects": [{"kind": "OBJECT", "asObject": {
//!       "name": "Greeter",
//!       "functions": [{"name": "hello", "returnType": {"kind": "STRING"},
//!                      "args": [{"name": "name", "typeDef": {"kind": "STRING"}}]}]
//!     }}]},
//!     "outputs": [{"object": "Greeter", "function": "hello", "template": "hello, {name}!"}]
//!   }]
//! }
//! ```
//!
//! Every module depends on the builtin core module in addition to the modules
//! named in its `dependencies`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context as _, Result};
use serde::Deserialize;
use tracing::debug;

use modbridge_core::mock::{MockRuntime, MockSdk};
use modbridge_core::{Context, CoreMod, FunctionCall, Mod, ModDeps, UserMod, Value};
use modbridge_types::{Digest, ModuleDefinition};

#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub modules: Vec<ModuleFixture>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFixture {
    pub name: String,
    /// Stands in for the module's source when computing its digest.
    /// Defaults to the serialized definition.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub definition: ModuleDefinition,
    #[serde(default)]
    pub outputs: Vec<OutputFixture>,
}

/// The result of one function. Exactly one of `result` and `template` is set.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputFixture {
    pub object: String,
    pub function: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// A string result with `{key}` placeholders, filled from the call's
    /// arguments and then its parent's fields.
    #[serde(default)]
    pub template: Option<String>,
}

impl Fixture {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("invalid fixture {}", path.display()))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let fixture: Fixture = serde_json::from_str(content).context("failed to parse fixture")?;
        if fixture.modules.is_empty() {
            bail!("fixture declares no modules");
        }
        Ok(fixture)
    }

    /// Create every module in `ctx`'s session and return them, with the core
    /// module, as one set.
    pub fn load(&self, ctx: &Context) -> Result<ModDeps> {
        let core = Mod::Core(CoreMod::builtin(&ctx.session().config().core_module_name)?);
        let mut loaded: HashMap<&str, Mod> = HashMap::new();
        let mut all = vec![core.clone()];

        for module in &self.modules {
            if loaded.contains_key(module.name.as_str()) {
                bail!("module {:?} is declared twice", module.name);
            }
            let mut deps = vec![core.clone()];
            for dep in &module.dependencies {
                let dep_mod = loaded.get(dep.as_str()).ok_or_else(|| {
                    anyhow!(
                        "module {:?} depends on {:?}, which is not declared before it",
                        module.name,
                        dep
                    )
                })?;
                deps.push(dep_mod.clone());
            }

            let source = match &module.source {
                Some(source) => source.clone(),
                None => serde_json::to_string(&module.definition)?,
            };
            debug!(module = %module.name, deps = deps.len(), "loading fixture module");
            let user = UserMod::new(
                ctx,
                &module.name,
                Digest::from_string(&source),
                ModDeps::new(deps),
                Arc::new(MockSdk::new(module.runtime()?)),
            );
            let user = Mod::User(user);
            loaded.insert(module.name.as_str(), user.clone());
            all.push(user);
        }
        Ok(ModDeps::new(all))
    }
}

impl ModuleFixture {
    fn runtime(&self) -> Result<MockRuntime> {
        let mut runtime = MockRuntime::new(self.definition.clone());
        for output in &self.outputs {
            match (&output.result, &output.template) {
                (Some(result), None) => {
                    runtime.add_output(&output.object, &output.function, result.clone());
                }
                (None, Some(template)) => {
                    let template = template.clone();
                    runtime.add_handler(&output.object, &output.function, move |call| {
                        Ok(serde_json::Value::String(render_template(&template, call)))
                    });
                }
                _ => bail!(
                    "output for {}.{} in module {:?} needs exactly one of result or template",
                    output.object,
                    output.function,
                    self.name
                ),
            }
        }
        Ok(runtime)
    }
}

fn render_template(template: &str, call: &FunctionCall) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match lookup(call, key) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup(call: &FunctionCall, key: &str) -> Option<String> {
    let value = call
        .input_args
        .iter()
        .find(|a| a.name == key)
        .map(|a| &a.value)
        .or_else(|| call.parent.get(key))?;
    Some(match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Parse a `key=value` call argument. Values that parse as JSON are taken as
/// JSON; anything else is a string.
pub fn parse_arg(arg: &str) -> Result<(String, Value)> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("invalid argument {:?}: expected key=value", arg))?;
    if key.is_empty() {
        bail!("invalid argument {:?}: empty name", arg);
    }
    let value = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(json),
        Err(_) => Value::from(raw),
    };
    Ok((key.to_string(), value))
}
