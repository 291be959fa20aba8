//! Session state and the registries sessions share.
//!
//! An [`EngineCache`] owns what outlives a single session: loaded modules by
//! digest (used to resolve IDs back to their owning module), registered
//! function calls by caller digest, and the call cache that guarantees a
//! caller digest executes at most once. Sessions built over the same cache
//! share all three. A [`Session`] adds its own server ID, configuration and
//! metrics, and a [`Context`] is the per-request view on a session carrying
//! its cancellation token.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info};

use modbridge_types::Digest;

use crate::config::EngineConfig;
use crate::errors::ModError;
use crate::lazy::Memo;
use crate::metrics::EngineMetrics;
use crate::mod_deps::ModDeps;
use crate::module::Mod;
use crate::runtime::FunctionCall;
use crate::value::Value;

/// A function call registered for a runtime to pick up.
#[derive(Clone, Debug)]
pub struct RegisteredCall {
    pub call: FunctionCall,
    /// Modules whose schema the callee is served.
    pub deps: ModDeps,
    /// The module the call executes in.
    pub module: Mod,
}

/// Module registry and call cache shared by every session built over it.
#[derive(Default)]
pub struct EngineCache {
    mods: RwLock<HashMap<Digest, Mod>>,
    calls: RwLock<HashMap<Digest, RegisteredCall>>,
    results: Mutex<HashMap<Digest, Arc<Memo<Value>>>>,
}

impl EngineCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register_mod(&self, module: Mod) {
        let digest = module.dag_digest().clone();
        debug!(module = %module.name(), digest = %digest.short(), "registering module");
        self.mods.write().entry(digest).or_insert(module);
    }

    pub fn mod_by_digest(&self, digest: &Digest) -> Result<Mod> {
        self.mods
            .read()
            .get(digest)
            .cloned()
            .ok_or_else(|| ModError::not_found("module", digest.to_string()).into())
    }

    pub fn register_function_call(
        &self,
        caller_digest: Digest,
        deps: ModDeps,
        module: Mod,
        call: FunctionCall,
    ) {
        self.calls
            .write()
            .insert(caller_digest, RegisteredCall { call, deps, module });
    }

    pub fn registered_call(&self, caller_digest: &Digest) -> Result<RegisteredCall> {
        self.calls
            .read()
            .get(caller_digest)
            .cloned()
            .ok_or_else(|| ModError::not_found("function call", caller_digest.to_string()).into())
    }

    /// Run `execute` for `key` unless a result for `key` is already cached or
    /// being computed, in which case wait for and share that result.
    ///
    /// Failures are cached like results, except cancellation: a cancelled
    /// execution leaves no entry behind so the next caller runs it again.
    /// Caching and metrics follow the session of `ctx`.
    pub async fn get_or_execute<F, Fut>(
        &self,
        ctx: &Context,
        key: &Digest,
        execute: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let session = ctx.session();
        if !session.config.call_cache_enabled {
            return ctx.run(execute()).await;
        }

        let memo = self.results.lock().entry(key.clone()).or_default().clone();
        let ran = AtomicBool::new(false);
        let outcome = ctx
            .run(memo.get_or_try_init(|| {
                ran.store(true, Ordering::SeqCst);
                execute()
            }))
            .await;

        let ran = ran.load(Ordering::SeqCst);
        match &outcome {
            Err(err) if ran && ModError::is_cancelled(err) => {
                let mut results = self.results.lock();
                if results.get(key).is_some_and(|m| Arc::ptr_eq(m, &memo)) {
                    results.remove(key);
                }
            }
            Ok(_) if !ran => {
                debug!(caller_digest = %key.short(), "call cache hit");
                session.metrics.record_call_cache_hit();
            }
            _ => {}
        }
        outcome
    }
}

impl std::fmt::Debug for EngineCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCache")
            .field("mods", &self.mods.read().len())
            .field("calls", &self.calls.read().len())
            .finish_non_exhaustive()
    }
}

pub struct Session {
    server_id: String,
    config: EngineConfig,
    metrics: EngineMetrics,
    cache: Arc<EngineCache>,
}

impl Session {
    /// A session with a cache of its own.
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Self::with_cache(config, EngineCache::new())
    }

    /// A session sharing modules and call results with every other session
    /// over `cache`.
    pub fn with_cache(config: EngineConfig, cache: Arc<EngineCache>) -> Arc<Self> {
        let server_id = uuid::Uuid::new_v4().to_string();
        info!(server_id = %server_id, "starting session");
        Arc::new(Self {
            server_id,
            config,
            metrics: EngineMetrics::default(),
            cache,
        })
    }

    /// Unique per session; mixed into the digest of uncached calls.
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<EngineCache> {
        &self.cache
    }

    pub fn register_mod(&self, module: Mod) {
        self.cache.register_mod(module);
    }

    pub fn mod_by_digest(&self, digest: &Digest) -> Result<Mod> {
        self.cache.mod_by_digest(digest)
    }

    pub fn registered_call(&self, caller_digest: &Digest) -> Result<RegisteredCall> {
        self.cache.registered_call(caller_digest)
    }

    /// See [`EngineCache::get_or_execute`].
    pub async fn get_or_execute<F, Fut>(
        &self,
        ctx: &Context,
        key: &Digest,
        execute: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        self.cache.get_or_execute(ctx, key, execute).await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server_id", &self.server_id)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Cancellation
// =============================================================================

/// Cooperative cancellation shared by clones.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Per-request handle on a session.
#[derive(Clone, Debug)]
pub struct Context {
    session: Arc<Session>,
    cancel: CancelToken,
}

impl Context {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cancel: CancelToken::new(),
        }
    }

    /// Same session, separate cancellation.
    pub fn with_cancel_token(&self, cancel: CancelToken) -> Self {
        Self {
            session: self.session.clone(),
            cancel,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Drive `fut` until it completes or the context is cancelled, in which
    /// case `fut` is dropped and [`ModError::Cancelled`] is returned.
    pub async fn run<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(ModError::Cancelled.into());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ModError::Cancelled.into()),
            res = fut => res,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn ctx() -> Context {
        Context::new(Session::new(EngineConfig::default()))
    }

    #[tokio::test]
    async fn test_call_cache_runs_once() {
        let ctx = ctx();
        let key = Digest::from_string("call");
        let runs = AtomicUsize::new(0);
        for _ in 0..3 {
            let v = ctx
                .session()
                .get_or_execute(&ctx, &key, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::from("done"))
                })
                .await
                .unwrap();
            assert_eq!(v, Value::from("done"));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.session().metrics().snapshot().call_cache_hits, 2);
    }

    #[tokio::test]
    async fn test_call_cache_disabled() {
        let ctx = Context::new(Session::new(EngineConfig {
            call_cache_enabled: false,
            ..Default::default()
        }));
        let key = Digest::from_string("call");
        let runs = AtomicUsize::new(0);
        for _ in 0..2 {
            ctx.session()
                .get_or_execute(&ctx, &key, || async {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Null)
                })
                .await
                .unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_execution_is_not_cached() {
        let ctx = ctx();
        let key = Digest::from_string("slow");

        let cancel = CancelToken::new();
        let cancellable = ctx.with_cancel_token(cancel.clone());
        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let err = ctx
            .session()
            .get_or_execute(&cancellable, &key, || std::future::pending::<Result<Value>>())
            .await
            .unwrap_err();
        assert!(ModError::is_cancelled(&err));
        canceller.await.unwrap();

        let v = ctx
            .session()
            .get_or_execute(&ctx, &key, || async { Ok(Value::from(1i64)) })
            .await
            .unwrap();
        assert_eq!(v, Value::Int(1));
    }

    #[tokio::test]
    async fn test_run_on_cancelled_context() {
        let ctx = ctx();
        ctx.cancel_token().cancel();
        let err = ctx.run(async { Ok(()) }).await.unwrap_err();
        assert!(matches!(ModError::classify(&err), Some(ModError::Cancelled)));
    }

    #[test]
    fn test_unknown_lookups() {
        let session = Session::new(EngineConfig::default());
        let digest = Digest::from_string("nope");
        assert!(session.mod_by_digest(&digest).is_err());
        assert!(session.registered_call(&digest).is_err());
        assert_ne!(
            session.server_id(),
            Session::new(EngineConfig::default()).server_id()
        );
    }
}
