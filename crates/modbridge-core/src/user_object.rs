//! Objects declared by user modules.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use tracing::debug;

use modbridge_types::{
    decode_module_id, encode_module, gql_field_name, gql_object_name, FieldTypeDef,
    ModuleObjectData, ObjectTypeDef, TypeDef,
};

use crate::errors::ModError;
use crate::function::{CallOpts, UserModFunction};
use crate::interface::{InterfaceType, InterfaceValue};
use crate::lazy::Memo;
use crate::mod_types::ModType;
use crate::schema::{
    resolver_fn, type_def_to_type_ref, ArgumentDefinition, Definition, FieldDefinition,
    FieldResolveFn, ObjectResolver, ResolveParams, Resolvers, SchemaDocument, SchemaResolvers,
    TypeRef, TypeResolver, QUERY_TYPE,
};
use crate::server::Context;
use crate::user_mod::UserMod;
use crate::value::Value;

/// Something an object exposes as a schema field: a stored field or a function.
#[async_trait]
pub trait Callable: Send + Sync {
    async fn call(&self, ctx: &Context, opts: CallOpts) -> Result<Value>;

    fn return_type(&self) -> Result<ModType>;

    fn arg_type(&self, name: &str) -> Result<ModType>;
}

#[derive(Clone)]
struct ObjectMembers {
    fields: Vec<Arc<UserModField>>,
    functions: Vec<Arc<UserModFunction>>,
}

/// An object type declared by a user module, with namespacing applied.
pub struct UserModObject {
    module: Weak<UserMod>,
    type_def: TypeDef,
    def: ObjectTypeDef,
    this: Weak<UserModObject>,
    members: Memo<Arc<ObjectMembers>>,
}

impl UserModObject {
    pub(crate) fn new(module: Weak<UserMod>, type_def: TypeDef) -> Result<Arc<Self>> {
        let def = type_def
            .as_object()
            .cloned()
            .ok_or_else(|| anyhow!("expected object type def, got {}", type_def.kind_name()))?;
        Ok(Arc::new_cyclic(|this| Self {
            module,
            type_def,
            def,
            this: this.clone(),
            members: Memo::new(),
        }))
    }

    /// The (namespaced) schema name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn original_name(&self) -> &str {
        &self.def.original_name
    }

    pub fn type_def(&self) -> &TypeDef {
        &self.type_def
    }

    pub fn object_def(&self) -> &ObjectTypeDef {
        &self.def
    }

    pub fn module(&self) -> Result<Arc<UserMod>> {
        self.module
            .upgrade()
            .ok_or_else(|| anyhow!("module owning object {} was dropped", self.name()))
    }

    fn arc(&self) -> Result<Arc<Self>> {
        self.this
            .upgrade()
            .ok_or_else(|| anyhow!("object {} was dropped", self.name()))
    }

    async fn members(&self, ctx: &Context) -> Result<Arc<ObjectMembers>> {
        self.members
            .get_or_try_init(|| async {
                let module = self.module()?;
                let this = self.arc()?;
                let mut fields = Vec::with_capacity(self.def.fields.len());
                for field_def in &self.def.fields {
                    let field = UserModField::new(ctx, &module, &this, field_def)
                        .await
                        .context("failed to create field")?;
                    fields.push(Arc::new(field));
                }
                let mut functions = Vec::with_capacity(self.def.functions.len());
                for fn_def in &self.def.functions {
                    let function = UserModFunction::new(ctx, &module, Some(&this), fn_def)
                        .await
                        .context("failed to create function")?;
                    functions.push(Arc::new(function));
                }
                Ok(Arc::new(ObjectMembers { fields, functions }))
            })
            .await
    }

    pub async fn fields(&self, ctx: &Context) -> Result<Vec<Arc<UserModField>>> {
        Ok(self.members(ctx).await?.fields.clone())
    }

    pub async fn functions(&self, ctx: &Context) -> Result<Vec<Arc<UserModFunction>>> {
        Ok(self.members(ctx).await?.functions.clone())
    }

    pub async fn field_by_name(&self, ctx: &Context, name: &str) -> Result<Option<Arc<UserModField>>> {
        let name = gql_field_name(name);
        let members = self.members(ctx).await?;
        Ok(members.fields.iter().find(|f| f.def.name == name).cloned())
    }

    pub async fn function_by_name(
        &self,
        ctx: &Context,
        name: &str,
    ) -> Result<Option<Arc<UserModFunction>>> {
        let name = gql_field_name(name);
        let members = self.members(ctx).await?;
        Ok(members.functions.iter().find(|f| f.name() == name).cloned())
    }

    /// The field or function exposed under `name`.
    pub async fn get_callable(&self, ctx: &Context, name: &str) -> Result<Arc<dyn Callable>> {
        if let Some(field) = self
            .field_by_name(ctx, name)
            .await
            .with_context(|| format!("failed to get field {}.{}", self.name(), name))?
        {
            return Ok(field);
        }
        match self
            .function_by_name(ctx, name)
            .await
            .with_context(|| format!("failed to get function {}.{}", self.name(), name))?
        {
            Some(function) => Ok(function),
            None => Err(ModError::not_found("field or function", format!("{}.{}", self.name(), name)).into()),
        }
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    pub(crate) async fn convert_from_sdk_result(&self, ctx: &Context, value: Value) -> Result<Value> {
        let fields = match value {
            Value::Null => return Ok(Value::Null),
            Value::String(id) => {
                let decoded = decode_module_id(&id, self.name()).context("failed to decode module id")?;
                match Value::from_json(decoded.data) {
                    Value::Null => return Ok(Value::Null),
                    Value::Object(fields) => fields,
                    other => {
                        return Err(ModError::conversion(
                            format!("{} field map in ID", self.name()),
                            other.kind_name(),
                        )
                        .into())
                    }
                }
            }
            Value::Object(fields) => fields,
            other => {
                return Err(ModError::conversion(
                    format!("{} ID or field map", self.name()),
                    other.kind_name(),
                )
                .into())
            }
        };

        let mut out = BTreeMap::new();
        for (key, v) in fields {
            let Some(field) = self.field_by_name(ctx, &key).await? else {
                continue;
            };
            let converted = field
                .mod_type
                .convert_from_sdk_result(ctx, v)
                .await
                .with_context(|| format!("failed to convert field result {:?}", key))?;
            out.insert(field.def.name.clone(), converted);
        }
        Ok(Value::Object(out))
    }

    /// Objects are handed to their own module as field maps keyed by the
    /// module's original field names.
    pub(crate) async fn convert_to_sdk_input(&self, ctx: &Context, value: Value) -> Result<Value> {
        let value = match value {
            Value::Interface(iv) => iv.value,
            other => other,
        };
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(id) => {
                let decoded = decode_module_id(&id, self.name()).context("failed to decode module id")?;
                Ok(Value::from_json(decoded.data))
            }
            Value::Object(fields) => {
                let mut out = BTreeMap::new();
                for (key, v) in fields {
                    let Some(field) = self.field_by_name(ctx, &key).await? else {
                        continue;
                    };
                    let converted = field
                        .mod_type
                        .convert_to_sdk_input(ctx, v)
                        .await
                        .with_context(|| format!("failed to convert field input {:?}", key))?;
                    out.insert(field.def.original_name.clone(), converted);
                }
                Ok(Value::Object(out))
            }
            other => Err(ModError::conversion(
                format!("{} ID or field map", self.name()),
                other.kind_name(),
            )
            .into()),
        }
    }

    /// Encode `value` as an ID tagged with the owning module and this type.
    pub async fn convert_to_id(&self, ctx: &Context, value: Value) -> Result<Value> {
        let value = match value {
            Value::Interface(iv) => iv.value,
            other => other,
        };
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(id) => Ok(Value::String(id)),
            Value::Object(_) => {
                let data = self
                    .convert_to_sdk_input(ctx, value)
                    .await
                    .context("failed to convert to sdk input")?;
                let id = encode_module(&ModuleObjectData {
                    data: data.to_json()?,
                    mod_digest: self.module()?.dag_digest().clone(),
                    type_name: self.name().to_string(),
                })?;
                Ok(Value::String(id))
            }
            other => Err(ModError::conversion(
                format!("{} field map", self.name()),
                other.kind_name(),
            )
            .into()),
        }
    }

    // =========================================================================
    // Schema
    // =========================================================================

    /// The object's schema, or `None` for a type another module owns and this
    /// module only references.
    pub(crate) async fn schema(&self, ctx: &Context) -> Result<Option<(SchemaDocument, Resolvers)>> {
        debug!(object = %self.name(), "getting object schema");
        let module = self.module()?;
        let this = self.arc()?;
        let members = self.members(ctx).await?;
        let obj_name = gql_object_name(&self.def.name);

        let existing = module
            .deps()
            .mod_type_for(ctx, &self.type_def)
            .await
            .context("failed to get mod type for type def")?;
        if let Some(source) = existing.as_ref().and_then(ModType::source_mod) {
            if source.dag_digest() != module.dag_digest() {
                if !self.def.fields.is_empty() || !self.def.functions.is_empty() {
                    return Err(ModError::validation(
                        module.name(),
                        format!(
                            "cannot attach new fields or functions to object {:?} from outside module",
                            obj_name
                        ),
                    )
                    .into());
                }
                return Ok(None);
            }
        }

        let id_name = format!("{}ID", obj_name);
        let load_name = format!("load{}FromID", obj_name);
        let mut doc = SchemaDocument::default();
        let mut query = ObjectResolver::new();
        let mut resolver = ObjectResolver::new();

        let mut def = Definition::object(&obj_name, self.def.description.clone()).with_field(
            FieldDefinition::new("id", TypeRef::non_null_named(&id_name))
                .with_description(format!("A unique identifier for this {}", obj_name)),
        );
        let obj = this.clone();
        resolver.set_field(
            "id",
            resolver_fn(move |p: ResolveParams| {
                let obj = obj.clone();
                async move { obj.convert_to_id(&p.ctx, p.source).await }
            }),
        );

        for field in &members.fields {
            let (field_def, field_resolver) = field.schema(&module)?;
            resolver.set_field(field_def.name.clone(), field_resolver);
            def = def.with_field(field_def);
        }
        for function in &members.functions {
            let (field_def, fn_resolver) = function.schema()?;
            resolver.set_field(field_def.name.clone(), fn_resolver);
            def = def.with_field(field_def);
        }

        let obj = this.clone();
        query.set_field(
            load_name.clone(),
            resolver_fn(move |p: ResolveParams| {
                let obj = obj.clone();
                async move {
                    let id = p.args.get("id").cloned().unwrap_or_default();
                    obj.convert_from_sdk_result(&p.ctx, id)
                        .await
                        .with_context(|| format!("failed to load object {} from id", obj.name()))
                }
            }),
        );

        let mut query_fields = Vec::new();
        if obj_name == gql_object_name(module.name()) {
            let (constructor_field, constructor_resolver) =
                self.constructor_schema(ctx, &module, &this, &obj_name).await?;
            query.set_field(constructor_field.name.clone(), constructor_resolver);
            query_fields.push(constructor_field);
        }
        query_fields.push(
            FieldDefinition::new(&load_name, TypeRef::non_null_named(&obj_name))
                .with_description(format!("Loads a {} from an ID", obj_name))
                .with_argument(ArgumentDefinition::new("id", TypeRef::non_null_named(&id_name))),
        );

        doc.definitions.push(def);
        doc.definitions
            .push(Definition::scalar(&id_name, format!("{} identifier", obj_name)));
        let mut query_ext = Definition::object(QUERY_TYPE, "");
        query_ext.fields = query_fields;
        doc.extensions.push(query_ext);

        let resolvers = [
            (QUERY_TYPE.to_string(), TypeResolver::Object(query)),
            (obj_name, TypeResolver::Object(resolver)),
            (id_name, TypeResolver::Scalar),
        ]
        .into_iter()
        .collect();
        Ok(Some((doc, resolvers)))
    }

    async fn constructor_schema(
        &self,
        ctx: &Context,
        module: &Arc<UserMod>,
        this: &Arc<Self>,
        obj_name: &str,
    ) -> Result<(FieldDefinition, FieldResolveFn)> {
        let mut field = FieldDefinition::new(
            gql_field_name(obj_name),
            type_def_to_type_ref(&self.type_def, false),
        )
        .with_description(self.def.description.clone());

        let Some(constructor) = &self.def.constructor else {
            // no declared constructor: a zero-arg field returning an empty object
            let resolver = resolver_fn(|_p: ResolveParams| async { Ok(Value::empty_object()) });
            return Ok((field, resolver));
        };

        let returns_self = constructor
            .return_type
            .as_object()
            .is_some_and(|ret| ret.original_name == self.def.original_name);
        if !returns_self {
            return Err(ModError::validation(
                module.name(),
                format!(
                    "constructor function for object {} must return that object",
                    self.def.original_name
                ),
            )
            .into());
        }

        let function = UserModFunction::new(ctx, module, Some(this), constructor)
            .await
            .context("failed to create function")?;
        let (fn_field, resolver) = Arc::new(function)
            .schema()
            .context("failed to get schema for constructor function")?;
        field.arguments = fn_field.arguments;
        Ok((field, resolver))
    }

    /// `as<Interface>` fields for each of `ifaces` this object implements.
    pub fn interface_extensions_schema(
        &self,
        module_name: &str,
        ifaces: &[Arc<InterfaceType>],
    ) -> Result<Option<SchemaResolvers>> {
        let this = self.arc()?;
        let mut ext = Definition::object(self.name(), "");
        let mut resolver = ObjectResolver::new();
        for iface in ifaces {
            let Some(iface_def) = iface.type_def().as_interface() else {
                continue;
            };
            if !self.def.is_subtype_of(iface_def) {
                continue;
            }
            let field_name = gql_field_name(&format!("as{}", iface.name()));
            ext.fields.push(FieldDefinition::new(
                &field_name,
                TypeRef::non_null_named(iface.name()),
            ));
            let obj = this.clone();
            let iface = iface.clone();
            resolver.set_field(
                field_name,
                resolver_fn(move |p: ResolveParams| {
                    let underlying = ModType::UserObject(obj.clone());
                    let iface = iface.clone();
                    async move { Ok(InterfaceValue::wrap(p.source, underlying, iface)) }
                }),
            );
        }
        if resolver.fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(SchemaResolvers {
            name: format!("{}.{}.interface_extensions", module_name, self.name()),
            doc: SchemaDocument {
                definitions: Vec::new(),
                extensions: vec![ext],
            },
            resolvers: [(self.name().to_string(), TypeResolver::Object(resolver))]
                .into_iter()
                .collect(),
        }))
    }
}

impl fmt::Debug for UserModObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserModObject")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Fields
// =============================================================================

/// A stored field of a user module object.
pub struct UserModField {
    object_name: String,
    object_original_name: String,
    def: FieldTypeDef,
    mod_type: ModType,
}

impl UserModField {
    async fn new(
        ctx: &Context,
        module: &Arc<UserMod>,
        obj: &Arc<UserModObject>,
        def: &FieldTypeDef,
    ) -> Result<Self> {
        let mod_type = module
            .mod_type_for(ctx, &def.type_def, true)
            .await
            .with_context(|| format!("failed to get mod type for field {:?}", def.name))?
            .ok_or_else(|| ModError::not_found("mod type for field", def.name.clone()))?;
        Ok(Self {
            object_name: obj.name().to_string(),
            object_original_name: obj.original_name().to_string(),
            def: def.clone(),
            mod_type,
        })
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn field_def(&self) -> &FieldTypeDef {
        &self.def
    }

    pub fn mod_type(&self) -> &ModType {
        &self.mod_type
    }

    fn schema(self: &Arc<Self>, module: &UserMod) -> Result<(FieldDefinition, FieldResolveFn)> {
        if let Some(source) = self.mod_type.source_mod() {
            if !source.is_core() && source.dag_digest() != module.dag_digest() {
                return Err(ModError::validation(
                    module.name(),
                    format!(
                        "object {:?} field {:?} cannot reference external type from dependency module {:?}",
                        self.object_original_name,
                        self.def.original_name,
                        source.name()
                    ),
                )
                .into());
            }
        }
        let field_def = FieldDefinition::new(&self.def.name, type_def_to_type_ref(&self.def.type_def, false))
            .with_description(self.def.description.clone());
        let field = self.clone();
        let resolver = resolver_fn(move |p: ResolveParams| {
            let field = field.clone();
            async move {
                field
                    .call(
                        &p.ctx,
                        CallOpts {
                            parent_val: p.source,
                            ..Default::default()
                        },
                    )
                    .await
            }
        });
        Ok((field_def, resolver))
    }
}

#[async_trait]
impl Callable for UserModField {
    async fn call(&self, ctx: &Context, opts: CallOpts) -> Result<Value> {
        let mut parent = match opts.parent_val {
            Value::Object(parent) => parent,
            other => {
                return Err(anyhow!(
                    "unexpected object value {} while calling {}.{}",
                    other.kind_name(),
                    self.object_name,
                    self.def.name
                ))
            }
        };
        let raw = parent.remove(&gql_field_name(&self.def.name)).unwrap_or_default();
        self.mod_type.convert_from_sdk_result(ctx, raw).await
    }

    fn return_type(&self) -> Result<ModType> {
        Ok(self.mod_type.clone())
    }

    fn arg_type(&self, _name: &str) -> Result<ModType> {
        Err(anyhow!(
            "field {}.{} has no arguments",
            self.object_name,
            self.def.name
        ))
    }
}

impl fmt::Debug for UserModField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserModField")
            .field("object", &self.object_name)
            .field("name", &self.def.name)
            .field("mod_type", &self.mod_type)
            .finish()
    }
}
