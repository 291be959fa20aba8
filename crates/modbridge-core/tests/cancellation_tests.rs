//! Cancelling a request fails that request only. One-time loads interrupted
//! by a cancellation run again for the next caller.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use common::{core_mod, greeter_runtime, new_ctx, user_mod};
use modbridge_core::mock::MockSdk;
use modbridge_core::{
    CancelToken, Context, GeneratedCode, Mod, ModDeps, ModError, Runtime, Sdk, UserMod,
};
use modbridge_types::Digest;

/// A context on the same session that is cancelled after `after`.
fn cancelled_after(ctx: &Context, after: Duration) -> (Context, tokio::task::JoinHandle<()>) {
    let cancel = CancelToken::new();
    let cancellable = ctx.with_cancel_token(cancel.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(after).await;
        cancel.cancel();
    });
    (cancellable, canceller)
}

#[tokio::test]
async fn test_cancelled_describe_is_retried() {
    let ctx = new_ctx();
    let mut runtime = greeter_runtime();
    runtime.set_delay(Duration::from_millis(200));
    let (greeter, runtime) = user_mod(&ctx, "greeter", vec![core_mod()], runtime);

    let (cancellable, canceller) = cancelled_after(&ctx, Duration::from_millis(20));
    let err = greeter
        .objects(&cancellable)
        .await
        .expect_err("describe is cancelled");
    canceller.await.expect("canceller joins");
    assert!(ModError::is_cancelled(&err), "unexpected error: {:#}", err);

    let objects = greeter.objects(&new_ctx()).await.expect("describe runs again");
    assert_eq!(objects.len(), 2);
    assert_eq!(runtime.execution_count(), 2);
}

#[tokio::test]
async fn test_cancelled_schema_merge_is_retried() {
    let ctx = new_ctx();
    let mut runtime = greeter_runtime();
    runtime.set_delay(Duration::from_millis(200));
    let (greeter, _runtime) = user_mod(&ctx, "greeter", vec![core_mod()], runtime);
    let deps = ModDeps::new([core_mod(), Mod::User(greeter)]);

    let (cancellable, canceller) = cancelled_after(&ctx, Duration::from_millis(20));
    let err = deps
        .schema(&cancellable)
        .await
        .expect_err("merge is cancelled");
    canceller.await.expect("canceller joins");
    assert!(ModError::is_cancelled(&err), "unexpected error: {:#}", err);

    let schema = deps.schema(&ctx).await.expect("merge runs again");
    assert!(schema.sdl().contains("type Greeter {"));
    // only the completed merge is counted
    assert_eq!(ctx.session().metrics().snapshot().schema_merges, 1);
}

/// Takes `delay` to build a runtime, giving up if the request is cancelled.
struct SlowSdk {
    inner: MockSdk,
    delay: Duration,
    builds: AtomicUsize,
}

#[async_trait]
impl Sdk for SlowSdk {
    async fn runtime(&self, ctx: &Context, module: &UserMod) -> anyhow::Result<Arc<dyn Runtime>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        ctx.run(async {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
        .await?;
        Sdk::runtime(&self.inner, ctx, module).await
    }

    async fn codegen(&self, ctx: &Context, module: &UserMod) -> anyhow::Result<GeneratedCode> {
        Sdk::codegen(&self.inner, ctx, module).await
    }
}

#[tokio::test]
async fn test_cancelled_runtime_creation_is_retried() {
    let ctx = new_ctx();
    let sdk = Arc::new(SlowSdk {
        inner: MockSdk::new(greeter_runtime()),
        delay: Duration::from_millis(200),
        builds: AtomicUsize::new(0),
    });
    let greeter = UserMod::new(
        &ctx,
        "greeter",
        Digest::from_string("greeter source"),
        ModDeps::new([core_mod()]),
        sdk.clone(),
    );

    let (cancellable, canceller) = cancelled_after(&ctx, Duration::from_millis(20));
    let err = match greeter.runtime(&cancellable).await {
        Ok(_) => panic!("runtime creation should be cancelled"),
        Err(err) => err,
    };
    canceller.await.expect("canceller joins");
    assert!(ModError::is_cancelled(&err), "unexpected error: {:#}", err);

    greeter.runtime(&ctx).await.expect("runtime is built again");
    greeter.runtime(&ctx).await.expect("runtime is memoized");
    assert_eq!(sdk.builds.load(Ordering::SeqCst), 2);
}
