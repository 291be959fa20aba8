//! The two kinds of module served in a schema.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;

use modbridge_types::{Digest, TypeDef};

use crate::core_mod::CoreMod;
use crate::mod_deps::ModDeps;
use crate::mod_types::ModType;
use crate::schema::SchemaResolvers;
use crate::server::Context;
use crate::user_mod::UserMod;

/// A module: the builtin core API, or a module implemented by user code.
#[derive(Clone)]
pub enum Mod {
    Core(Arc<CoreMod>),
    User(Arc<UserMod>),
}

impl Mod {
    pub fn name(&self) -> &str {
        match self {
            Mod::Core(core) => core.name(),
            Mod::User(user) => user.name(),
        }
    }

    /// Digest of the module and everything it depends on.
    pub fn dag_digest(&self) -> &Digest {
        match self {
            Mod::Core(core) => core.dag_digest(),
            Mod::User(user) => user.dag_digest(),
        }
    }

    pub fn dependencies(&self) -> ModDeps {
        match self {
            Mod::Core(_) => ModDeps::default(),
            Mod::User(user) => user.deps().clone(),
        }
    }

    pub fn is_core(&self) -> bool {
        matches!(self, Mod::Core(_))
    }

    pub fn as_user(&self) -> Option<&Arc<UserMod>> {
        match self {
            Mod::User(user) => Some(user),
            Mod::Core(_) => None,
        }
    }

    /// Schema fragments for the types this module defines.
    pub async fn schema(&self, ctx: &Context) -> Result<Vec<SchemaResolvers>> {
        match self {
            Mod::Core(core) => Ok(core.schema()),
            Mod::User(user) => user.schema(ctx).await,
        }
    }

    /// Introspection JSON of the schema this module's code is served.
    pub async fn dependency_schema_introspection_json(&self, ctx: &Context) -> Result<String> {
        match self {
            Mod::Core(core) => Ok(core.introspection_json().to_string()),
            Mod::User(user) => user.deps().schema_introspection_json(ctx).await,
        }
    }

    pub fn mod_type_for<'a>(
        &'a self,
        ctx: &'a Context,
        type_def: &'a TypeDef,
        check_direct_deps: bool,
    ) -> BoxFuture<'a, Result<Option<ModType>>> {
        match self {
            Mod::Core(core) => {
                let found = core.mod_type_for(type_def);
                async move { found }.boxed()
            }
            Mod::User(user) => user.mod_type_for(ctx, type_def, check_direct_deps),
        }
    }

    pub async fn type_defs(&self, ctx: &Context) -> Result<Vec<TypeDef>> {
        match self {
            Mod::Core(core) => Ok(core.type_defs()),
            Mod::User(user) => user.type_defs(ctx).await,
        }
    }

    pub async fn declares_enum(&self, ctx: &Context, name: &str) -> Result<bool> {
        match self {
            Mod::Core(core) => Ok(core.declares_enum(name)),
            Mod::User(user) => user.declares_enum(ctx, name).await,
        }
    }
}

impl fmt::Debug for Mod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mod::Core(core) => write!(f, "Core({})", core.name()),
            Mod::User(user) => write!(f, "User({})", user.name()),
        }
    }
}
