//! Modules implemented by user code running in an SDK runtime.
//!
//! A user module learns what it defines by calling itself: the describe call
//! returns a [`ModuleDefinition`], whose objects and interfaces are then
//! validated, namespaced and turned into [`UserModObject`]s and
//! [`InterfaceType`]s. All of this happens once per module, on first use.

use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context as _, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use modbridge_types::{
    gql_arg_name, gql_field_name, gql_object_name, namespace_object, Digest, EnumTypeDef, Function,
    ModuleDefinition, TypeDef, TypeDefKind,
};

use crate::errors::ModError;
use crate::function::{CallOpts, UserModFunction};
use crate::interface::InterfaceType;
use crate::lazy::Memo;
use crate::mod_deps::ModDeps;
use crate::mod_types::{ListType, ModType, PrimitiveType};
use crate::module::Mod;
use crate::runtime::{GeneratedCode, Runtime, Sdk};
use crate::schema::{Definition, SchemaDocument, SchemaResolvers, TypeResolver};
use crate::server::{Context, EngineCache};
use crate::user_object::UserModObject;

/// Everything a module declares, after validation and namespacing.
struct ModuleTypes {
    objects: Vec<Arc<UserModObject>>,
    interfaces: Vec<Arc<InterfaceType>>,
    enums: Vec<EnumTypeDef>,
}

pub struct UserMod {
    name: String,
    base_digest: Digest,
    dag_digest: Digest,
    deps: ModDeps,
    sdk: Arc<dyn Sdk>,
    this: Weak<UserMod>,
    /// The cache the module was registered in. Its calls are cached there
    /// whichever session makes them.
    cache: Weak<EngineCache>,
    runtime: Memo<Arc<dyn Runtime>>,
    types: Memo<Arc<ModuleTypes>>,
}

impl UserMod {
    /// Create a module and register it with the session's cache so IDs it
    /// encodes can be resolved back to it from any session over that cache.
    ///
    /// `base_digest` identifies the module's source; the module's DAG digest
    /// also covers its dependencies.
    pub fn new(
        ctx: &Context,
        name: &str,
        base_digest: Digest,
        deps: ModDeps,
        sdk: Arc<dyn Sdk>,
    ) -> Arc<Self> {
        let dag_digest = Digest::from_parts([base_digest.as_str(), deps.dag_digest().as_str()]);
        let module = Arc::new_cyclic(|this| Self {
            name: name.to_string(),
            base_digest,
            dag_digest,
            deps,
            sdk,
            this: this.clone(),
            cache: Arc::downgrade(ctx.session().cache()),
            runtime: Memo::new(),
            types: Memo::new(),
        });
        info!(module = %module.name, digest = %module.dag_digest.short(), "created module");
        ctx.session().register_mod(Mod::User(module.clone()));
        module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_digest(&self) -> &Digest {
        &self.base_digest
    }

    pub fn dag_digest(&self) -> &Digest {
        &self.dag_digest
    }

    pub fn deps(&self) -> &ModDeps {
        &self.deps
    }

    /// The cache this module's calls share, or the session's own once every
    /// session over the module's cache is gone.
    pub fn cache(&self, ctx: &Context) -> Arc<EngineCache> {
        self.cache
            .upgrade()
            .unwrap_or_else(|| ctx.session().cache().clone())
    }

    fn arc(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| anyhow!("module {} was dropped", self.name))
    }

    /// The module's runtime, built by its SDK on first use.
    pub async fn runtime(&self, ctx: &Context) -> Result<Arc<dyn Runtime>> {
        self.runtime
            .get_or_try_init(|| async {
                self.sdk
                    .runtime(ctx, self)
                    .await
                    .with_context(|| format!("failed to get runtime for module {:?}", self.name))
            })
            .await
    }

    pub async fn codegen(&self, ctx: &Context) -> Result<GeneratedCode> {
        self.sdk
            .codegen(ctx, self)
            .await
            .with_context(|| format!("failed to generate code for module {:?}", self.name))
    }

    pub async fn objects(&self, ctx: &Context) -> Result<Vec<Arc<UserModObject>>> {
        Ok(self.types(ctx).await?.objects.clone())
    }

    pub async fn interfaces(&self, ctx: &Context) -> Result<Vec<Arc<InterfaceType>>> {
        Ok(self.types(ctx).await?.interfaces.clone())
    }

    pub async fn enums(&self, ctx: &Context) -> Result<Vec<EnumTypeDef>> {
        Ok(self.types(ctx).await?.enums.clone())
    }

    /// The object named after the module, which gets a root constructor.
    pub async fn main_module_object(&self, ctx: &Context) -> Result<Arc<UserModObject>> {
        let name = gql_object_name(&self.name);
        self.objects(ctx)
            .await?
            .into_iter()
            .find(|obj| obj.name() == name)
            .ok_or_else(|| ModError::not_found("main module object", name).into())
    }

    pub async fn declares_enum(&self, ctx: &Context, name: &str) -> Result<bool> {
        Ok(self.types(ctx).await?.enums.iter().any(|e| e.name == name))
    }

    async fn types(&self, ctx: &Context) -> Result<Arc<ModuleTypes>> {
        self.types
            .get_or_try_init(|| self.load_types(ctx))
            .await
            .with_context(|| format!("failed to load types of module {:?}", self.name))
    }

    async fn load_types(&self, ctx: &Context) -> Result<Arc<ModuleTypes>> {
        ctx.session().metrics().record_module_load();
        let this = self.arc()?;
        debug!(module = %self.name, "describing module");

        let result = UserModFunction::describe(&this)
            .call(
                ctx,
                CallOpts {
                    cache: true,
                    skip_self_schema: true,
                    ..Default::default()
                },
            )
            .await
            .context("failed to call module to get type definitions")?;
        let definition: ModuleDefinition = serde_json::from_value(result.to_json()?)
            .context("failed to decode module definition")?;

        let mut enums = Vec::new();
        let mut objects = Vec::with_capacity(definition.objects.len());
        for mut type_def in definition.objects {
            if type_def.as_object().is_none() {
                return Err(anyhow!(
                    "module {:?} declared a {} as an object",
                    self.name,
                    type_def.kind_name()
                ));
            }
            type_def.normalize();
            self.validate_type_def(ctx, &type_def)
                .await
                .context("failed to validate type def")?;
            self.namespace_type_def(ctx, &mut type_def, &mut enums)
                .await
                .context("failed to namespace type def")?;
            let obj = UserModObject::new(Arc::downgrade(&this), type_def)?;
            debug!(module = %self.name, object = %obj.name(), "loaded object");
            objects.push(obj);
        }

        let mut interfaces = Vec::with_capacity(definition.interfaces.len());
        for mut type_def in definition.interfaces {
            if type_def.as_interface().is_none() {
                return Err(anyhow!(
                    "module {:?} declared a {} as an interface",
                    self.name,
                    type_def.kind_name()
                ));
            }
            type_def.normalize();
            self.validate_type_def(ctx, &type_def)
                .await
                .context("failed to validate type def")?;
            self.namespace_type_def(ctx, &mut type_def, &mut enums)
                .await
                .context("failed to namespace type def")?;
            let iface = InterfaceType::new(Arc::downgrade(&this), type_def)?;
            debug!(module = %self.name, interface = %iface.name(), "loaded interface");
            interfaces.push(Arc::new(iface));
        }

        Ok(Arc::new(ModuleTypes {
            objects,
            interfaces,
            enums,
        }))
    }

    /// Whether a dependency already owns `type_def`. Types it doesn't own are
    /// declared by this module.
    async fn dependency_owns(&self, ctx: &Context, type_def: &TypeDef) -> Result<bool> {
        let Some(mod_type) = self
            .deps
            .mod_type_for(ctx, type_def)
            .await
            .context("failed to get mod type for type def")?
        else {
            return Ok(false);
        };
        Ok(mod_type
            .source_mod()
            .is_some_and(|source| source.dag_digest() != &self.dag_digest))
    }

    fn validate_type_def<'a>(&'a self, ctx: &'a Context, type_def: &'a TypeDef) -> BoxFuture<'a, Result<()>> {
        async move {
            match &type_def.kind {
                TypeDefKind::List(elem) => self.validate_type_def(ctx, elem).await,
                TypeDefKind::Object(obj) => {
                    if self.dependency_owns(ctx, type_def).await? {
                        return Ok(());
                    }
                    for field in &obj.fields {
                        if gql_field_name(&field.name) == "id" {
                            return Err(ModError::ReservedName {
                                kind: "field",
                                name: field.original_name.clone(),
                                owner: obj.original_name.clone(),
                            }
                            .into());
                        }
                        self.validate_type_def(ctx, &field.type_def)
                            .await
                            .with_context(|| format!("failed to validate field {:?}", field.original_name))?;
                    }
                    for function in &obj.functions {
                        self.validate_function(ctx, function, &obj.original_name).await?;
                    }
                    Ok(())
                }
                TypeDefKind::Interface(iface) => {
                    if self.dependency_owns(ctx, type_def).await? {
                        return Ok(());
                    }
                    for function in &iface.functions {
                        self.validate_function(ctx, function, &iface.original_name).await?;
                    }
                    Ok(())
                }
                TypeDefKind::String
                | TypeDefKind::Integer
                | TypeDefKind::Boolean
                | TypeDefKind::Void
                | TypeDefKind::Enum(_) => Ok(()),
            }
        }
        .boxed()
    }

    async fn validate_function(&self, ctx: &Context, function: &Function, owner: &str) -> Result<()> {
        if gql_field_name(&function.name) == "id" {
            return Err(ModError::ReservedName {
                kind: "function",
                name: function.original_name.clone(),
                owner: owner.to_string(),
            }
            .into());
        }
        self.validate_type_def(ctx, &function.return_type)
            .await
            .with_context(|| format!("failed to validate function {:?} return type", function.original_name))?;
        for arg in &function.args {
            if gql_arg_name(&arg.name) == "id" {
                return Err(ModError::ReservedName {
                    kind: "argument",
                    name: arg.original_name.clone(),
                    owner: function.original_name.clone(),
                }
                .into());
            }
            self.validate_type_def(ctx, &arg.type_def)
                .await
                .with_context(|| format!("failed to validate function {:?} arg {:?}", function.original_name, arg.original_name))?;
        }
        Ok(())
    }

    /// Prefix every object, interface and enum this module declares with the
    /// module name. Types owned by dependencies keep their names.
    fn namespace_type_def<'a>(
        &'a self,
        ctx: &'a Context,
        type_def: &'a mut TypeDef,
        enums: &'a mut Vec<EnumTypeDef>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let owned_by_dep = match &type_def.kind {
                TypeDefKind::Object(_) | TypeDefKind::Interface(_) => {
                    self.deps.mod_type_for(ctx, type_def).await?.is_some()
                }
                TypeDefKind::Enum(def) => self.deps.has_enum(ctx, &def.name).await?,
                _ => false,
            };

            match &mut type_def.kind {
                TypeDefKind::List(elem) => self.namespace_type_def(ctx, elem, enums).await?,
                TypeDefKind::Object(obj) => {
                    if !owned_by_dep {
                        obj.name = gql_object_name(&namespace_object(&obj.original_name, &self.name));
                    }
                    for field in &mut obj.fields {
                        self.namespace_type_def(ctx, &mut field.type_def, enums).await?;
                    }
                    for function in &mut obj.functions {
                        self.namespace_function(ctx, function, enums).await?;
                    }
                    if let Some(constructor) = &mut obj.constructor {
                        self.namespace_function(ctx, constructor, enums).await?;
                    }
                }
                TypeDefKind::Interface(iface) => {
                    if !owned_by_dep {
                        iface.name = gql_object_name(&namespace_object(&iface.original_name, &self.name));
                    }
                    for function in &mut iface.functions {
                        self.namespace_function(ctx, function, enums).await?;
                    }
                }
                TypeDefKind::Enum(def) => {
                    if !owned_by_dep {
                        def.name = gql_object_name(&namespace_object(&def.original_name, &self.name));
                        match enums.iter_mut().find(|e| e.name == def.name) {
                            Some(existing) if existing.values.is_empty() => *existing = def.clone(),
                            Some(_) => {}
                            None => enums.push(def.clone()),
                        }
                    }
                }
                TypeDefKind::String | TypeDefKind::Integer | TypeDefKind::Boolean | TypeDefKind::Void => {}
            }
            Ok(())
        }
        .boxed()
    }

    async fn namespace_function(
        &self,
        ctx: &Context,
        function: &mut Function,
        enums: &mut Vec<EnumTypeDef>,
    ) -> Result<()> {
        self.namespace_type_def(ctx, &mut function.return_type, enums).await?;
        for arg in &mut function.args {
            self.namespace_type_def(ctx, &mut arg.type_def, enums).await?;
        }
        Ok(())
    }

    /// Resolve `type_def` to a [`ModType`] visible from this module: its own
    /// declarations, plus its direct dependencies when `check_direct_deps`.
    pub fn mod_type_for<'a>(
        &'a self,
        ctx: &'a Context,
        type_def: &'a TypeDef,
        check_direct_deps: bool,
    ) -> BoxFuture<'a, Result<Option<ModType>>> {
        async move {
            match &type_def.kind {
                TypeDefKind::String
                | TypeDefKind::Integer
                | TypeDefKind::Boolean
                | TypeDefKind::Void
                | TypeDefKind::Enum(_) => Ok(Some(ModType::Primitive(PrimitiveType::new(type_def.clone())))),
                TypeDefKind::List(elem) => Ok(self
                    .mod_type_for(ctx, elem, check_direct_deps)
                    .await?
                    .map(|underlying| ModType::List(ListType::new(underlying)))),
                TypeDefKind::Object(obj) => {
                    if check_direct_deps {
                        if let Some(mod_type) = self.deps.mod_type_for(ctx, type_def).await? {
                            return Ok(Some(mod_type));
                        }
                    }
                    let types = self.types(ctx).await?;
                    Ok(types
                        .objects
                        .iter()
                        .find(|o| o.name() == obj.name)
                        .map(|o| ModType::UserObject(o.clone())))
                }
                TypeDefKind::Interface(iface) => {
                    if check_direct_deps {
                        if let Some(mod_type) = self.deps.mod_type_for(ctx, type_def).await? {
                            return Ok(Some(mod_type));
                        }
                    }
                    let types = self.types(ctx).await?;
                    Ok(types
                        .interfaces
                        .iter()
                        .find(|i| i.name() == iface.name)
                        .map(|i| ModType::Interface(i.clone())))
                }
            }
        }
        .boxed()
    }

    /// Schema fragments for every type this module declares.
    pub async fn schema(&self, ctx: &Context) -> Result<Vec<SchemaResolvers>> {
        let types = self.types(ctx).await?;
        let mut fragments = Vec::new();

        for obj in &types.objects {
            let Some((doc, resolvers)) = obj
                .schema(ctx)
                .await
                .with_context(|| format!("failed to get schema for object {:?}", obj.name()))?
            else {
                continue;
            };
            fragments.push(SchemaResolvers {
                name: format!("{}.{}", self.name, obj.name()),
                doc,
                resolvers,
            });
        }

        for iface in &types.interfaces {
            let (doc, resolvers) = iface
                .schema()
                .with_context(|| format!("failed to get schema for interface {:?}", iface.name()))?;
            fragments.push(SchemaResolvers {
                name: format!("{}.{}", self.name, iface.name()),
                doc,
                resolvers,
            });
        }

        for def in &types.enums {
            let values: Vec<String> = def.values.iter().map(|v| v.name.clone()).collect();
            fragments.push(SchemaResolvers {
                name: format!("{}.{}", self.name, def.name),
                doc: SchemaDocument {
                    definitions: vec![Definition::enumeration(
                        &def.name,
                        def.description.clone(),
                        values.clone(),
                    )],
                    extensions: Vec::new(),
                },
                resolvers: [(def.name.clone(), TypeResolver::Enum(values))]
                    .into_iter()
                    .collect(),
            });
        }

        Ok(fragments)
    }

    /// TypeDefs of everything this module declares, tagged with the module name.
    pub async fn type_defs(&self, ctx: &Context) -> Result<Vec<TypeDef>> {
        let types = self.types(ctx).await?;
        let mut type_defs = Vec::new();
        for obj in &types.objects {
            let mut type_def = obj.type_def().clone();
            if let Some(def) = type_def.as_object_mut() {
                def.source_module_name = Some(self.name.clone());
            }
            type_defs.push(type_def);
        }
        for iface in &types.interfaces {
            let mut type_def = iface.type_def().clone();
            if let Some(def) = type_def.as_interface_mut() {
                def.source_module_name = Some(self.name.clone());
            }
            type_defs.push(type_def);
        }
        type_defs.extend(types.enums.iter().cloned().map(TypeDef::enumeration));
        Ok(type_defs)
    }
}

impl fmt::Debug for UserMod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserMod")
            .field("name", &self.name)
            .field("dag_digest", &self.dag_digest)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}
