//! Functions declared on user module objects, and the call protocol that runs
//! them in the owning module's runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};

use modbridge_types::{gql_arg_name, Digest, DigestInputs, Function, FunctionArg, ModuleDefinition};

use crate::errors::ModError;
use crate::mod_types::{ModType, PrimitiveType};
use crate::module::Mod;
use crate::runtime::{CacheRef, CallInput, Directory, FunctionCall, Invocation};
use crate::schema::{
    ast_default_value, resolver_fn, type_def_to_type_ref, ArgumentDefinition, FieldDefinition,
    FieldResolveFn, ResolveParams,
};
use crate::server::Context;
use crate::user_mod::UserMod;
use crate::user_object::{Callable, UserModObject};
use crate::value::Value;

/// Options for one function call.
#[derive(Debug, Clone, Default)]
pub struct CallOpts {
    pub inputs: Vec<CallInput>,
    /// The object the function is called on; `Null` for root-level calls.
    pub parent_val: Value,
    /// When false the session id is mixed into the caller digest, so the
    /// result is only shared within this session.
    pub cache: bool,
    /// Labels for progress output, outermost first.
    pub pipeline: Vec<String>,
    /// Serve the callee only its dependencies, not its own schema.
    pub skip_self_schema: bool,
}

#[derive(Debug, Clone)]
struct UserModFunctionArg {
    def: FunctionArg,
    mod_type: ModType,
}

#[derive(Debug, Clone)]
struct OwnerObject {
    obj: Weak<UserModObject>,
    name: String,
    original_name: String,
}

pub struct UserModFunction {
    module: Weak<UserMod>,
    module_name: String,
    owner: Option<OwnerObject>,
    def: Function,
    return_type: ModType,
    args: BTreeMap<String, UserModFunctionArg>,
    digest: Digest,
}

impl UserModFunction {
    pub(crate) async fn new(
        ctx: &Context,
        module: &Arc<UserMod>,
        obj: Option<&Arc<UserModObject>>,
        def: &Function,
    ) -> Result<Self> {
        let mod_ref = Mod::User(module.clone());
        let return_type = mod_ref
            .mod_type_for(ctx, &def.return_type, true)
            .await
            .with_context(|| format!("failed to get mod type for function {:?} return type", def.name))?
            .ok_or_else(|| {
                anyhow!("failed to find mod type for function {:?} return type", def.name)
            })?;

        let mut args = BTreeMap::new();
        for arg in &def.args {
            let mod_type = mod_ref
                .mod_type_for(ctx, &arg.type_def, true)
                .await
                .with_context(|| format!("failed to get mod type for function {:?} arg {:?}", def.name, arg.name))?
                .ok_or_else(|| {
                    anyhow!("failed to find mod type for function {:?} arg {:?} type", def.name, arg.name)
                })?;
            args.insert(
                arg.name.clone(),
                UserModFunctionArg {
                    def: arg.clone(),
                    mod_type,
                },
            );
        }

        Ok(Self::with_types(module, obj, def.clone(), return_type, args))
    }

    /// The bootstrap call asking a module what it defines.
    pub(crate) fn describe(module: &Arc<UserMod>) -> Self {
        let return_type = ModType::Primitive(PrimitiveType::new(ModuleDefinition::type_def()));
        let def = Function::new("", ModuleDefinition::type_def());
        Self::with_types(module, None, def, return_type, BTreeMap::new())
    }

    fn with_types(
        module: &Arc<UserMod>,
        obj: Option<&Arc<UserModObject>>,
        def: Function,
        return_type: ModType,
        args: BTreeMap<String, UserModFunctionArg>,
    ) -> Self {
        let mut parts = vec![module.dag_digest().to_string(), def.name.clone()];
        if let Some(obj) = obj {
            parts.push(obj.name().to_string());
        }
        Self {
            module: Arc::downgrade(module),
            module_name: module.name().to_string(),
            owner: obj.map(|obj| OwnerObject {
                obj: Arc::downgrade(obj),
                name: obj.name().to_string(),
                original_name: obj.original_name().to_string(),
            }),
            digest: Digest::from_parts(&parts),
            def,
            return_type,
            args,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn function_def(&self) -> &Function {
        &self.def
    }

    /// Identity of the function: module digest, name and owning object.
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// `Object.function`, or just the function name for root-level functions.
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}", owner.name, self.def.name),
            None => self.def.name.clone(),
        }
    }

    fn module(&self) -> Result<Arc<UserMod>> {
        self.module
            .upgrade()
            .ok_or_else(|| anyhow!("module {} was dropped", self.module_name))
    }

    fn owner_object(&self) -> Result<Option<Arc<UserModObject>>> {
        match &self.owner {
            None => Ok(None),
            Some(owner) => owner
                .obj
                .upgrade()
                .map(Some)
                .ok_or_else(|| anyhow!("object {} was dropped", owner.name)),
        }
    }

    fn owner_original_name(&self) -> &str {
        self.owner.as_ref().map_or("", |o| o.original_name.as_str())
    }

    // =========================================================================
    // Schema
    // =========================================================================

    pub(crate) fn schema(self: &Arc<Self>) -> Result<(FieldDefinition, FieldResolveFn)> {
        let module = self.module()?;
        let owner = self.owner_original_name();

        if let Some(source) = self.return_type.source_mod() {
            if !source.is_core() && source.dag_digest() != module.dag_digest() {
                return Err(ModError::validation(
                    module.name(),
                    format!(
                        "object {:?} function {:?} cannot return external type from dependency module {:?}",
                        owner,
                        self.def.original_name,
                        source.name()
                    ),
                )
                .into());
            }
        }

        let mut field = FieldDefinition::new(&self.def.name, type_def_to_type_ref(&self.def.return_type, false))
            .with_description(self.def.description.clone());

        for arg in &self.def.args {
            let mod_type = self
                .args
                .get(&arg.name)
                .map(|a| &a.mod_type)
                .ok_or_else(|| anyhow!("failed to find arg {:?}", arg.name))?;
            if let Some(source) = mod_type.source_mod() {
                if !source.is_core() && source.dag_digest() != module.dag_digest() {
                    return Err(ModError::validation(
                        module.name(),
                        format!(
                            "object {:?} function {:?} arg {:?} cannot reference external type from dependency module {:?}",
                            owner,
                            self.def.original_name,
                            arg.original_name,
                            source.name()
                        ),
                    )
                    .into());
                }
            }

            let mut arg_def = ArgumentDefinition::new(&arg.name, type_def_to_type_ref(&arg.type_def, true));
            arg_def.description = arg.description.clone();
            arg_def.default_value = ast_default_value(&arg.type_def, arg.default_value.as_ref())
                .with_context(|| format!("failed to get default value for arg {:?}", arg.name))?;
            field = field.with_argument(arg_def);
        }

        let function = self.clone();
        let resolver = resolver_fn(move |p: ResolveParams| {
            let function = function.clone();
            async move {
                let ResolveParams { ctx, source, args } = p;
                let inputs = args
                    .into_iter()
                    .map(|(name, value)| CallInput { name, value })
                    .collect();
                let opts = CallOpts {
                    inputs,
                    parent_val: source,
                    ..Default::default()
                };
                match AssertUnwindSafe(function.call(&ctx, opts)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        let backtrace = std::backtrace::Backtrace::force_capture().to_string();
                        warn!(function = %function.qualified_name(), message = %message, "resolver panicked");
                        Err(ModError::Panic {
                            function: function.qualified_name(),
                            message,
                            backtrace,
                        }
                        .into())
                    }
                }
            }
        });
        Ok((field, resolver))
    }

    // =========================================================================
    // Call protocol
    // =========================================================================

    pub async fn call(&self, ctx: &Context, opts: CallOpts) -> Result<Value> {
        let module = self.module()?;
        let mut digest_inputs = DigestInputs::seeded(&self.digest);

        let mut parent = Value::Null;
        if let Some(obj) = self.owner_object()? {
            let parent_json = opts
                .parent_val
                .canonical_json()
                .context("failed to marshal parent value")?;
            digest_inputs.push(parent_json);
            parent = obj
                .convert_to_sdk_input(ctx, opts.parent_val)
                .await
                .context("failed to convert parent value")?;
        }

        let mut inputs = Vec::with_capacity(opts.inputs.len());
        for input in opts.inputs {
            let normalized = gql_arg_name(&input.name);
            let arg = self.args.get(&normalized).ok_or_else(|| ModError::UnknownArgument {
                function: self.qualified_name(),
                argument: input.name.clone(),
            })?;
            let value = arg
                .mod_type
                .convert_to_sdk_input(ctx, input.value)
                .await
                .with_context(|| format!("failed to convert arg {:?}", input.name))?;
            let input = CallInput {
                name: arg.def.original_name.clone(),
                value,
            };
            digest_inputs.push(input.digest()?);
            inputs.push(input);
        }

        if !opts.cache {
            // uncached calls are still shared within one session
            digest_inputs.push(ctx.session().server_id());
        }
        let caller_digest = digest_inputs.finish();

        debug!(
            module = %module.name(),
            function = %self.qualified_name(),
            caller_digest = %caller_digest.short(),
            "calling function"
        );

        let execute = CallExecution {
            function: self,
            module: &module,
            caller_digest: &caller_digest,
            parent,
            inputs,
            pipeline: opts.pipeline,
            skip_self_schema: opts.skip_self_schema,
        };
        module
            .cache(ctx)
            .get_or_execute(ctx, &caller_digest, || execute.run(ctx))
            .await
    }

    /// Point the cache entry of a call result at every blob its value
    /// references, so the blobs live as long as the result.
    fn link_dependency_blobs<'a>(
        &'a self,
        ctx: &'a Context,
        cache_ref: &'a dyn CacheRef,
        value: &'a Value,
        mod_type: &'a ModType,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            if value.is_null() {
                return Ok(());
            }
            match mod_type {
                ModType::Primitive(_) => Ok(()),
                ModType::List(list) => {
                    let items = value
                        .as_list()
                        .ok_or_else(|| ModError::conversion("list", value.kind_name()))?;
                    for item in items {
                        self.link_dependency_blobs(ctx, cache_ref, item, &list.underlying)
                            .await?;
                    }
                    Ok(())
                }
                ModType::UserObject(obj) => {
                    let fields = value.as_object().ok_or_else(|| {
                        ModError::conversion(format!("{} field map", obj.name()), value.kind_name())
                    })?;
                    for (name, field_value) in fields {
                        let Some(field) = obj.field_by_name(ctx, name).await? else {
                            continue;
                        };
                        self.link_dependency_blobs(ctx, cache_ref, field_value, field.mod_type())
                            .await
                            .with_context(|| format!("failed to link blobs of field {:?}", name))?;
                    }
                    Ok(())
                }
                ModType::CoreObject(core) => {
                    let Value::Core(obj) = value else {
                        return Err(ModError::conversion(
                            format!("{} object", core.type_name()),
                            value.kind_name(),
                        )
                        .into());
                    };
                    let blobs = obj.dependency_blobs()?;
                    if !blobs.is_empty() {
                        cache_ref
                            .add_dependency_blobs(&blobs)
                            .context("failed to add dependency blobs")?;
                    }
                    Ok(())
                }
                ModType::Interface(iface) => {
                    let iv = value.as_interface().ok_or_else(|| {
                        ModError::conversion(format!("{} interface value", iface.name()), value.kind_name())
                    })?;
                    match &iv.underlying {
                        ModType::UserObject(_) => {
                            self.link_dependency_blobs(ctx, cache_ref, &iv.value, &iv.underlying)
                                .await
                        }
                        other => Err(anyhow!(
                            "unexpected underlying type {:?} of interface {}",
                            other,
                            iface.name()
                        )),
                    }
                }
            }
        }
        .boxed()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// One cache-missing execution of a function in its module's runtime.
struct CallExecution<'a> {
    function: &'a UserModFunction,
    module: &'a Arc<UserMod>,
    caller_digest: &'a Digest,
    parent: Value,
    inputs: Vec<CallInput>,
    pipeline: Vec<String>,
    skip_self_schema: bool,
}

impl CallExecution<'_> {
    async fn run(self, ctx: &Context) -> Result<Value> {
        let function = self.function;
        let module = self.module;
        let session = ctx.session();
        let config = session.config();

        let runtime = module.runtime(ctx).await.context("failed to get runtime")?;

        let call = FunctionCall {
            name: function.def.original_name.clone(),
            parent_name: function.owner_original_name().to_string(),
            parent: self.parent.to_json().context("failed to encode parent")?,
            input_args: self
                .inputs
                .iter()
                .map(CallInput::to_call_arg)
                .collect::<Result<_>>()?,
        };

        let deps = if self.skip_self_schema {
            module.deps().clone()
        } else {
            module.deps().prepend([Mod::User(module.clone())])
        };
        module.cache(ctx).register_function_call(
            self.caller_digest.clone(),
            deps,
            Mod::User(module.clone()),
            call.clone(),
        );
        session.metrics().record_runtime_execution();

        let invocation = Invocation {
            caller_digest: self.caller_digest.clone(),
            module_name: module.name().to_string(),
            meta_mount_path: config.meta_mount_path.clone(),
            meta_dir: Directory::scratch(),
            output_file: config.output_file.clone(),
            call,
            pipeline: self.pipeline,
        };
        let result = runtime
            .execute(ctx, invocation)
            .await
            .context(ModError::Invocation {
                module: module.name().to_string(),
                function: function.qualified_name(),
            })?;

        let output = result
            .meta_dir
            .read_file(&config.output_file)
            .ok_or_else(|| ModError::NoResult {
                function: function.qualified_name(),
            })?;
        let json: serde_json::Value =
            serde_json::from_slice(output).map_err(|e| ModError::InvalidResult {
                function: function.qualified_name(),
                message: e.to_string(),
            })?;

        let value = function
            .return_type
            .convert_from_sdk_result(ctx, Value::from_json(json))
            .await
            .context("failed to convert return value")?;

        function
            .link_dependency_blobs(ctx, result.cache_ref.as_ref(), &value, &function.return_type)
            .await
            .context("failed to link dependency blobs")?;

        debug!(
            function = %function.qualified_name(),
            caller_digest = %self.caller_digest.short(),
            "function returned"
        );
        Ok(value)
    }
}

#[async_trait]
impl Callable for UserModFunction {
    async fn call(&self, ctx: &Context, opts: CallOpts) -> Result<Value> {
        UserModFunction::call(self, ctx, opts).await
    }

    fn return_type(&self) -> Result<ModType> {
        Ok(self.return_type.clone())
    }

    fn arg_type(&self, name: &str) -> Result<ModType> {
        self.args
            .get(&gql_arg_name(name))
            .map(|arg| arg.mod_type.clone())
            .ok_or_else(|| anyhow!("failed to find arg {:?}", name))
    }
}

impl fmt::Debug for UserModFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserModFunction")
            .field("name", &self.qualified_name())
            .field("digest", &self.digest)
            .finish_non_exhaustive()
    }
}
