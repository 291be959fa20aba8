//! Schema composition and type bridging for container-backed modules.
//!
//! A module is user code, written in any language an [`Sdk`] supports, that
//! declares objects, interfaces and enums. This crate turns those declarations
//! into schema fragments, merges the fragments of every module served together
//! into one schema, and routes calls on that schema back into the owning
//! module's [`Runtime`]:
//!
//! - [`UserMod`] / [`CoreMod`] / [`Mod`]: the modules, and [`ModDeps`] sets of
//!   them with a memoized merged schema.
//! - [`ModType`]: conversions between engine values and what module code
//!   sends and receives, including object IDs and interface values.
//! - [`UserModFunction::call`]: the call protocol. Each call gets a caller
//!   digest computed from its inputs, and sessions sharing an
//!   [`EngineCache`] execute a digest at most once.
//! - [`schema`]: fragment types, merging and field dispatch.
//!
//! # Example
//!
//! ```no_run
//! use modbridge_core::{
//!     mock::{MockRuntime, MockSdk},
//!     Context, CoreMod, EngineConfig, Mod, ModDeps, Session, UserMod,
//! };
//! use modbridge_types::{Digest, ModuleDefinition, ObjectTypeDef, Function, TypeDef};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let ctx = Context::new(Session::new(EngineConfig::default()));
//! let core = Mod::Core(CoreMod::builtin("core")?);
//!
//! let mut runtime = MockRuntime::new(ModuleDefinition::new("greeter").with_object(
//!     ObjectTypeDef::new("Greeter", "").with_function(Function::new("hello", TypeDef::string())),
//! ));
//! runtime.add_output("Greeter", "hello", serde_json::json!("hi"));
//!
//! let greeter = UserMod::new(
//!     &ctx,
//!     "greeter",
//!     Digest::from_string("greeter source"),
//!     ModDeps::new([core.clone()]),
//!     Arc::new(MockSdk::new(runtime)),
//! );
//! let schema = ModDeps::new([core, Mod::User(greeter)]).schema(&ctx).await?;
//! println!("{}", schema.sdl());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core_mod;
pub mod errors;
pub mod function;
pub mod interface;
pub mod lazy;
pub mod metrics;
pub mod mock;
pub mod mod_deps;
pub mod mod_types;
pub mod module;
pub mod runtime;
pub mod schema;
pub mod server;
pub mod user_mod;
pub mod user_object;
pub mod value;

pub use config::EngineConfig;
pub use core_mod::CoreMod;
pub use errors::{ConflictKind, ModError, SharedError};
pub use function::{CallOpts, UserModFunction};
pub use interface::{InterfaceType, InterfaceValue};
pub use lazy::Memo;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use mod_deps::ModDeps;
pub use mod_types::{CoreModObject, ListType, ModType, PrimitiveType};
pub use module::Mod;
pub use runtime::{
    CacheRef, CallArg, CallInput, Directory, ExecutionResult, FunctionCall, GeneratedCode,
    Invocation, NoopCacheRef, Runtime, Sdk,
};
pub use schema::{
    merge_schemas, CompiledSchema, IdCodec, ObjectResolver, Resolvers, SchemaDocument,
    SchemaResolvers, Selection, TypeResolver,
};
pub use server::{CancelToken, Context, EngineCache, RegisteredCall, Session};
pub use user_mod::UserMod;
pub use user_object::{Callable, UserModField, UserModObject};
pub use value::{ContentDefinition, CoreObject, Value};
