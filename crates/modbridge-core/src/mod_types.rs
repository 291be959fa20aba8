//! Wire conversions for every kind of type a module can reference.
//!
//! A [`ModType`] is what a TypeDef resolves to once the owning module is
//! known. It converts values in two directions:
//!
//! - `convert_from_sdk_result`: JSON a module returned, into the engine's
//!   representation (IDs decoded, maps re-keyed to schema names, interface
//!   results wrapped).
//! - `convert_to_sdk_input`: engine values, into what a module expects to
//!   receive (IDs or field maps keyed by the module's own names).

use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use futures::future::BoxFuture;
use futures::FutureExt;

use modbridge_types::TypeDef;

use crate::core_mod::CoreMod;
use crate::errors::ModError;
use crate::interface::InterfaceType;
use crate::module::Mod;
use crate::schema::IdCodec;
use crate::server::Context;
use crate::user_object::UserModObject;
use crate::value::Value;

#[derive(Clone)]
pub enum ModType {
    Primitive(PrimitiveType),
    List(ListType),
    CoreObject(CoreModObject),
    UserObject(Arc<UserModObject>),
    Interface(Arc<InterfaceType>),
}

impl ModType {
    pub fn convert_from_sdk_result<'a>(
        &'a self,
        ctx: &'a Context,
        value: Value,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            match self {
                ModType::Primitive(_) => Ok(value),
                ModType::List(list) => list.convert_from_sdk_result(ctx, value).await,
                ModType::CoreObject(obj) => obj.convert_from_sdk_result(value),
                ModType::UserObject(obj) => obj.convert_from_sdk_result(ctx, value).await,
                ModType::Interface(iface) => iface.convert_from_sdk_result(ctx, value).await,
            }
        }
        .boxed()
    }

    pub fn convert_to_sdk_input<'a>(
        &'a self,
        ctx: &'a Context,
        value: Value,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            match self {
                ModType::Primitive(_) => Ok(value),
                ModType::List(list) => list.convert_to_sdk_input(ctx, value).await,
                ModType::CoreObject(obj) => obj.convert_to_sdk_input(value),
                ModType::UserObject(obj) => obj.convert_to_sdk_input(ctx, value).await,
                ModType::Interface(iface) => iface.convert_to_sdk_input(ctx, value).await,
            }
        }
        .boxed()
    }

    /// The module that defines this type; `None` for primitives.
    pub fn source_mod(&self) -> Option<Mod> {
        match self {
            ModType::Primitive(_) => None,
            ModType::List(list) => list.underlying.source_mod(),
            ModType::CoreObject(obj) => Some(Mod::Core(obj.core.clone())),
            ModType::UserObject(obj) => obj.module().ok().map(Mod::User),
            ModType::Interface(iface) => iface.module().ok().map(Mod::User),
        }
    }

    pub fn type_def(&self) -> TypeDef {
        match self {
            ModType::Primitive(p) => p.type_def.clone(),
            ModType::List(list) => TypeDef::list_of(list.underlying.type_def()),
            ModType::CoreObject(obj) => obj.type_def.clone(),
            ModType::UserObject(obj) => obj.type_def().clone(),
            ModType::Interface(iface) => iface.type_def().clone(),
        }
    }
}

impl fmt::Debug for ModType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModType::Primitive(p) => write!(f, "Primitive({})", p.type_def.kind_name()),
            ModType::List(list) => write!(f, "List({:?})", list.underlying),
            ModType::CoreObject(obj) => write!(f, "CoreObject({})", obj.type_name()),
            ModType::UserObject(obj) => write!(f, "UserObject({})", obj.name()),
            ModType::Interface(iface) => write!(f, "Interface({})", iface.name()),
        }
    }
}

/// Strings, integers, booleans, void and enums: passed through as-is.
#[derive(Debug, Clone)]
pub struct PrimitiveType {
    pub type_def: TypeDef,
}

impl PrimitiveType {
    pub fn new(type_def: TypeDef) -> Self {
        Self { type_def }
    }
}

#[derive(Debug, Clone)]
pub struct ListType {
    pub underlying: Box<ModType>,
}

impl ListType {
    pub fn new(underlying: ModType) -> Self {
        Self {
            underlying: Box::new(underlying),
        }
    }

    async fn convert_from_sdk_result(&self, ctx: &Context, value: Value) -> Result<Value> {
        let items = match value {
            Value::Null => return Ok(Value::Null),
            Value::List(items) => items,
            other => return Err(ModError::conversion("list", other.kind_name()).into()),
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let converted = self
                .underlying
                .convert_from_sdk_result(ctx, item)
                .await
                .with_context(|| format!("failed to convert list element {}", i))?;
            out.push(converted);
        }
        Ok(Value::List(out))
    }

    async fn convert_to_sdk_input(&self, ctx: &Context, value: Value) -> Result<Value> {
        let items = match value {
            Value::Null => return Ok(Value::Null),
            Value::List(items) => items,
            other => return Err(ModError::conversion("list", other.kind_name()).into()),
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let converted = self
                .underlying
                .convert_to_sdk_input(ctx, item)
                .await
                .with_context(|| format!("failed to convert list element {}", i))?;
            out.push(converted);
        }
        Ok(Value::List(out))
    }
}

/// An IDable object owned by the core module.
#[derive(Clone)]
pub struct CoreModObject {
    pub core: Arc<CoreMod>,
    pub type_def: TypeDef,
    pub codec: Arc<dyn IdCodec>,
}

impl CoreModObject {
    pub fn type_name(&self) -> &str {
        self.type_def.named_type().unwrap_or_default()
    }

    fn convert_from_sdk_result(&self, value: Value) -> Result<Value> {
        match value {
            Value::String(id) => self
                .codec
                .from_id(&id)
                .with_context(|| format!("failed to load {} from ID", self.type_name())),
            other => Ok(other),
        }
    }

    fn convert_to_sdk_input(&self, value: Value) -> Result<Value> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(id) => Ok(Value::String(id)),
            other => {
                let id = self
                    .codec
                    .to_id(&other)
                    .with_context(|| format!("failed to encode {} ID", self.type_name()))?;
                Ok(Value::String(id))
            }
        }
    }
}

impl fmt::Debug for CoreModObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreModObject")
            .field("type_name", &self.type_name())
            .finish_non_exhaustive()
    }
}
