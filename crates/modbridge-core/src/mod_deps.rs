//! Sets of modules served together.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::debug;

use modbridge_types::{Digest, TypeDef};

use crate::lazy::Memo;
use crate::mod_types::ModType;
use crate::module::Mod;
use crate::schema::{merge_schemas, CompiledSchema};
use crate::server::Context;

struct LoadedSchema {
    compiled: Arc<CompiledSchema>,
    introspection_json: String,
}

struct Inner {
    mods: Vec<Mod>,
    digest: Digest,
    schema: Memo<Arc<LoadedSchema>>,
}

/// An ordered, duplicate-free set of modules.
///
/// Members are ordered by DAG digest, so two sets with the same members have
/// the same digest and merge to the same schema whatever order they were
/// built in. Clones share the memoized schema.
#[derive(Clone)]
pub struct ModDeps {
    inner: Arc<Inner>,
}

impl ModDeps {
    pub fn new(mods: impl IntoIterator<Item = Mod>) -> Self {
        let mut seen = HashSet::new();
        let mut mods: Vec<Mod> = mods
            .into_iter()
            .filter(|m| seen.insert(m.dag_digest().clone()))
            .collect();
        mods.sort_by(|a, b| a.dag_digest().as_str().cmp(b.dag_digest().as_str()));
        let digest = Digest::from_parts(mods.iter().map(|m| m.dag_digest().as_str()));
        Self {
            inner: Arc::new(Inner {
                mods,
                digest,
                schema: Memo::new(),
            }),
        }
    }

    /// A new set with `mods` added. Existing members win over duplicates.
    pub fn append(&self, mods: impl IntoIterator<Item = Mod>) -> Self {
        Self::new(self.inner.mods.iter().cloned().chain(mods))
    }

    /// A new set with `mods` added. `mods` win over duplicate members.
    pub fn prepend(&self, mods: impl IntoIterator<Item = Mod>) -> Self {
        Self::new(mods.into_iter().chain(self.inner.mods.iter().cloned()))
    }

    pub fn mods(&self) -> &[Mod] {
        &self.inner.mods
    }

    pub fn is_empty(&self) -> bool {
        self.inner.mods.is_empty()
    }

    pub fn dag_digest(&self) -> &Digest {
        &self.inner.digest
    }

    /// The merged schema of every member, computed once.
    pub async fn schema(&self, ctx: &Context) -> Result<Arc<CompiledSchema>> {
        Ok(self.loaded_schema(ctx).await?.compiled.clone())
    }

    pub async fn schema_introspection_json(&self, ctx: &Context) -> Result<String> {
        Ok(self.loaded_schema(ctx).await?.introspection_json.clone())
    }

    async fn loaded_schema(&self, ctx: &Context) -> Result<Arc<LoadedSchema>> {
        self.inner
            .schema
            .get_or_try_init(|| self.load_schema(ctx))
            .await
    }

    async fn load_schema(&self, ctx: &Context) -> Result<Arc<LoadedSchema>> {
        debug!(digest = %self.inner.digest.short(), mods = self.inner.mods.len(), "merging schema");
        let mut fragments = Vec::new();
        for module in &self.inner.mods {
            let schema = module
                .schema(ctx)
                .await
                .with_context(|| format!("failed to get schema for module {:?}", module.name()))?;
            fragments.extend(schema);
        }

        // objects that implement an interface served alongside them can be
        // viewed as that interface
        let mut ifaces = Vec::new();
        for module in &self.inner.mods {
            if let Mod::User(user) = module {
                ifaces.extend(user.interfaces(ctx).await?);
            }
        }
        if !ifaces.is_empty() {
            let defined: HashSet<String> = fragments
                .iter()
                .flat_map(|f| f.doc.definitions.iter().map(|d| d.name.clone()))
                .collect();
            for module in &self.inner.mods {
                let Mod::User(user) = module else {
                    continue;
                };
                for obj in user.objects(ctx).await? {
                    if !defined.contains(obj.name()) {
                        continue;
                    }
                    if let Some(ext) = obj.interface_extensions_schema(user.name(), &ifaces)? {
                        fragments.push(ext);
                    }
                }
            }
        }

        let compiled = merge_schemas(&fragments).context("failed to merge schemas")?;
        let introspection_json = compiled
            .introspection_json()
            .context("failed to get introspection json")?;
        ctx.session().metrics().record_schema_merge();
        Ok(Arc::new(LoadedSchema {
            compiled: Arc::new(compiled),
            introspection_json,
        }))
    }

    /// The first member, in digest order, that resolves `type_def`.
    /// Members' own dependencies are not searched.
    pub async fn mod_type_for(&self, ctx: &Context, type_def: &TypeDef) -> Result<Option<ModType>> {
        for module in &self.inner.mods {
            if let Some(mod_type) = module
                .mod_type_for(ctx, type_def, false)
                .await
                .with_context(|| format!("failed to get mod type from module {:?}", module.name()))?
            {
                return Ok(Some(mod_type));
            }
        }
        Ok(None)
    }

    pub async fn has_enum(&self, ctx: &Context, name: &str) -> Result<bool> {
        for module in &self.inner.mods {
            if module.declares_enum(ctx, name).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// TypeDefs exposed by every member.
    pub async fn type_defs(&self, ctx: &Context) -> Result<Vec<TypeDef>> {
        let mut type_defs = Vec::new();
        for module in &self.inner.mods {
            let defs = module
                .type_defs(ctx)
                .await
                .with_context(|| format!("failed to get type defs of module {:?}", module.name()))?;
            type_defs.extend(defs);
        }
        Ok(type_defs)
    }
}

impl Default for ModDeps {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for ModDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModDeps")
            .field("digest", &self.inner.digest)
            .field("mods", &self.inner.mods)
            .finish()
    }
}
