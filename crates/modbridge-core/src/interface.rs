//! Interfaces declared by modules and the values presented through them.
//!
//! Any object, from any module, whose functions structurally satisfy an
//! interface can be passed where the interface is expected. On the wire such a
//! value is always an object ID, because the ID is the only thing that
//! remembers which module and concrete type the value came from.

use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::{anyhow, Context as _, Result};
use tracing::debug;

use modbridge_types::{decode_module_id, gql_object_name, InterfaceTypeDef, TypeDef};

use crate::errors::ModError;
use crate::function::CallOpts;
use crate::mod_types::ModType;
use crate::runtime::CallInput;
use crate::schema::{
    resolver_fn, type_def_to_type_ref, ArgumentDefinition, Definition, FieldDefinition,
    ObjectResolver, ResolveParams, Resolvers, SchemaDocument, TypeRef, TypeResolver, QUERY_TYPE,
};
use crate::server::Context;
use crate::user_mod::UserMod;
use crate::value::Value;

/// An interface type owned by a user module.
pub struct InterfaceType {
    module: Weak<UserMod>,
    type_def: TypeDef,
    def: InterfaceTypeDef,
}

impl InterfaceType {
    pub(crate) fn new(module: Weak<UserMod>, type_def: TypeDef) -> Result<Self> {
        let def = type_def.as_interface().cloned().ok_or_else(|| {
            anyhow!("expected interface type def, got {}", type_def.kind_name())
        })?;
        Ok(Self {
            module,
            type_def,
            def,
        })
    }

    pub fn name(&self) -> &str {
        self.type_def.named_type().unwrap_or_default()
    }

    pub fn type_def(&self) -> &TypeDef {
        &self.type_def
    }

    pub fn iface_def(&self) -> &InterfaceTypeDef {
        &self.def
    }

    pub fn module(&self) -> Result<Arc<UserMod>> {
        self.module
            .upgrade()
            .ok_or_else(|| anyhow!("module owning interface {} was dropped", self.name()))
    }

    pub(crate) async fn convert_from_sdk_result(
        self: &Arc<Self>,
        ctx: &Context,
        value: Value,
    ) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(id) => {
                let decoded = decode_module_id(&id, "").context("failed to decode id")?;
                let source = self
                    .module()?
                    .cache(ctx)
                    .mod_by_digest(&decoded.mod_digest)
                    .or_else(|_| ctx.session().mod_by_digest(&decoded.mod_digest))
                    .with_context(|| format!("failed to get source mod {}", decoded.mod_digest))?;
                let lookup = TypeDef::object_ref(&decoded.type_name);
                let mod_type = source
                    .mod_type_for(ctx, &lookup, false)
                    .await
                    .with_context(|| format!("failed to get mod type for {}", decoded.type_name))?
                    .ok_or_else(|| ModError::not_found("mod type", decoded.type_name.clone()))?;
                let converted = mod_type
                    .convert_from_sdk_result(ctx, Value::from_json(decoded.data))
                    .await
                    .context("failed to convert from sdk result")?;
                Ok(InterfaceValue::wrap(converted, mod_type, self.clone()))
            }
            Value::Interface(iv) => Ok(InterfaceValue::wrap(iv.value, iv.underlying, self.clone())),
            other => Err(ModError::conversion(
                format!("{} ID or interface value", self.name()),
                other.kind_name(),
            )
            .into()),
        }
    }

    pub(crate) async fn convert_to_sdk_input(&self, ctx: &Context, value: Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(id) => Ok(Value::String(id)),
            Value::Interface(iv) => {
                let InterfaceValue {
                    value, underlying, ..
                } = *iv;
                match &underlying {
                    ModType::UserObject(obj) => obj
                        .convert_to_id(ctx, value)
                        .await
                        .context("failed to convert to id"),
                    other => other
                        .convert_to_sdk_input(ctx, value)
                        .await
                        .context("failed to convert to sdk input"),
                }
            }
            other => Err(ModError::conversion(
                format!("{} ID or interface value", self.name()),
                other.kind_name(),
            )
            .into()),
        }
    }

    /// Schema for the interface: an ID scalar, a loader on `Query`, and an
    /// object type with `id` plus one field per interface function.
    pub(crate) fn schema(self: &Arc<Self>) -> Result<(SchemaDocument, Resolvers)> {
        let iface_def = self.iface_def();
        let iface_name = gql_object_name(&iface_def.name);
        let id_name = format!("{}ID", iface_name);
        let load_name = format!("load{}FromID", iface_name);

        let mut doc = SchemaDocument::default();
        doc.definitions
            .push(Definition::scalar(&id_name, format!("{} identifier", iface_name)));
        doc.extensions.push(
            Definition::object(QUERY_TYPE, "").with_field(
                FieldDefinition::new(&load_name, TypeRef::non_null_named(&iface_name))
                    .with_description(format!("Loads a {} from an ID", iface_name))
                    .with_argument(ArgumentDefinition::new("id", TypeRef::non_null_named(&id_name))),
            ),
        );

        let iface = self.clone();
        let query = ObjectResolver::new().with_field(
            load_name,
            resolver_fn(move |p: ResolveParams| {
                let iface = iface.clone();
                async move {
                    let id = p.args.get("id").cloned().unwrap_or_default();
                    iface.convert_from_sdk_result(&p.ctx, id).await
                }
            }),
        );

        let mut def = Definition::object(&iface_name, iface_def.description.clone()).with_field(
            FieldDefinition::new("id", TypeRef::non_null_named(&id_name))
                .with_description(format!("A unique identifier for this {}", iface_name)),
        );
        let iface = self.clone();
        let mut resolver = ObjectResolver::new().with_field(
            "id",
            resolver_fn(move |p: ResolveParams| {
                let iface = iface.clone();
                async move { iface.convert_to_sdk_input(&p.ctx, p.source).await }
            }),
        );

        for fn_def in &iface_def.functions {
            let mut field = FieldDefinition::new(&fn_def.name, type_def_to_type_ref(&fn_def.return_type, false))
                .with_description(fn_def.description.clone());
            for arg in &fn_def.args {
                let mut arg_def =
                    ArgumentDefinition::new(&arg.name, type_def_to_type_ref(&arg.type_def, true));
                arg_def.description = arg.description.clone();
                field = field.with_argument(arg_def);
            }
            def = def.with_field(field);

            let iface = self.clone();
            let fn_def = Arc::new(fn_def.clone());
            resolver.set_field(
                fn_def.name.clone(),
                resolver_fn(move |p: ResolveParams| {
                    let iface = iface.clone();
                    let fn_def = fn_def.clone();
                    async move { iface.call_function(&fn_def, p).await }
                }),
            );
        }
        doc.definitions.push(def);

        let resolvers = [
            (QUERY_TYPE.to_string(), TypeResolver::Object(query)),
            (id_name, TypeResolver::Scalar),
            (iface_name, TypeResolver::Object(resolver)),
        ]
        .into_iter()
        .collect();
        Ok((doc, resolvers))
    }

    /// Dispatch an interface function to the concrete object behind `p.source`.
    async fn call_function(
        self: &Arc<Self>,
        fn_def: &modbridge_types::Function,
        p: ResolveParams,
    ) -> Result<Value> {
        let ctx = &p.ctx;
        let qualified = format!("{}.{}", self.name(), fn_def.name);
        let runtime_val = match p.source {
            Value::Interface(iv) => *iv,
            other => {
                return Err(anyhow!(
                    "unexpected source {} for interface resolver {}",
                    other.kind_name(),
                    qualified
                ))
            }
        };
        let obj = match &runtime_val.underlying {
            ModType::UserObject(obj) => obj.clone(),
            other => {
                return Err(anyhow!(
                    "unexpected underlying type {:?} for interface resolver {}",
                    other,
                    qualified
                ))
            }
        };
        let callable = obj
            .get_callable(ctx, &fn_def.name)
            .await
            .with_context(|| format!("failed to get callable for {}", qualified))?;
        let source_mod = crate::module::Mod::User(self.module()?);

        let mut inputs = Vec::with_capacity(p.args.len());
        for (name, raw) in p.args {
            let callable_arg_type = callable.arg_type(&name).with_context(|| {
                format!("failed to get underlying arg type for {} arg {}", qualified, name)
            })?;
            let iface_arg_def = fn_def
                .args
                .iter()
                .find(|a| a.name == name)
                .ok_or_else(|| {
                    anyhow!("failed to find arg type def for {} arg {}", qualified, name)
                })?;
            let iface_arg_type = source_mod
                .mod_type_for(ctx, &iface_arg_def.type_def, true)
                .await
                .with_context(|| format!("failed to get mod type for arg {}", name))?
                .ok_or_else(|| ModError::not_found("mod type for arg", name.clone()))?;

            // contravariant args: the callee may expect an interface where
            // this interface declared something narrower
            let value = match (&callable_arg_type, raw) {
                (ModType::Interface(callee_iface), raw) => {
                    InterfaceValue::wrap(raw, iface_arg_type, callee_iface.clone())
                }
                (ModType::List(list), raw) => match list.underlying.as_ref() {
                    ModType::Interface(callee_iface) => match raw {
                        Value::List(items) => Value::List(
                            items
                                .into_iter()
                                .map(|item| {
                                    InterfaceValue::wrap(
                                        item,
                                        iface_arg_type.clone(),
                                        callee_iface.clone(),
                                    )
                                })
                                .collect(),
                        ),
                        other => {
                            return Err(
                                ModError::conversion("list arg", other.kind_name()).into()
                            )
                        }
                    },
                    _ => raw,
                },
                (_, raw) => raw,
            };
            inputs.push(CallInput { name, value });
        }

        debug!(interface = %self.name(), object = %obj.name(), function = %fn_def.name, "dispatching interface call");
        let result = callable
            .call(
                ctx,
                CallOpts {
                    inputs,
                    parent_val: runtime_val.value,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("failed to call interface function {}", qualified))?;

        if fn_def.return_type.underlying().as_interface().is_none() {
            return Ok(result);
        }

        // covariant returns: present the callee's concrete result through the
        // interface this function declared
        let return_type = source_mod
            .mod_type_for(ctx, fn_def.return_type.underlying(), true)
            .await
            .context("failed to get return mod type")?
            .ok_or_else(|| ModError::not_found("return mod type", qualified.clone()))?;
        let iface_return_type = match return_type {
            ModType::Interface(iface) => iface,
            other => return Err(anyhow!("expected return interface type, got {:?}", other)),
        };
        let obj_return_type = callable
            .return_type()
            .with_context(|| format!("failed to get object return type for {}", qualified))?;

        match &obj_return_type {
            ModType::Interface(_) | ModType::UserObject(_) => Ok(InterfaceValue::wrap(
                result,
                obj_return_type.clone(),
                iface_return_type,
            )),
            ModType::List(list) => match result {
                Value::Null => Ok(Value::Null),
                Value::List(items) => Ok(Value::List(
                    items
                        .into_iter()
                        .map(|item| {
                            InterfaceValue::wrap(
                                item,
                                (*list.underlying).clone(),
                                iface_return_type.clone(),
                            )
                        })
                        .collect(),
                )),
                other => Err(ModError::conversion("list return", other.kind_name()).into()),
            },
            other => Err(anyhow!(
                "unexpected object return type {:?} for {}",
                other,
                qualified
            )),
        }
    }
}

impl fmt::Debug for InterfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceType")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Interface values
// =============================================================================

/// A concrete value presented through an interface.
///
/// Field resolution on the interface type dispatches to `underlying`;
/// anything else sees `value` directly.
#[derive(Clone)]
pub struct InterfaceValue {
    pub value: Value,
    /// The type that produced `value`.
    pub underlying: ModType,
    /// The interface `value` is presented as.
    pub iface: Arc<InterfaceType>,
}

impl InterfaceValue {
    /// Present `value` as `iface`. A value already presented through another
    /// interface keeps its concrete underlying type.
    pub fn wrap(value: Value, underlying: ModType, iface: Arc<InterfaceType>) -> Value {
        let (value, underlying) = match value {
            Value::Interface(inner) => (inner.value, inner.underlying),
            value => (value, underlying),
        };
        Value::Interface(Box::new(Self {
            value,
            underlying,
            iface,
        }))
    }
}

impl PartialEq for InterfaceValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.iface.name() == other.iface.name()
            && self.underlying.type_def().named_type() == other.underlying.type_def().named_type()
    }
}

impl fmt::Debug for InterfaceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceValue")
            .field("value", &self.value)
            .field("underlying", &self.underlying)
            .field("iface", &self.iface.name())
            .finish()
    }
}
