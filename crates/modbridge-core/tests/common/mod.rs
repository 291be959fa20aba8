#![allow(dead_code)]
//! Shared setup for modbridge-core integration tests.

use std::sync::Arc;

use modbridge_core::mock::{MockRuntime, MockSdk};
use modbridge_core::{Context, CoreMod, EngineConfig, Mod, ModDeps, Session, UserMod};
use modbridge_types::{Digest, Function, ModuleDefinition, ObjectTypeDef, TypeDef};

pub fn new_ctx() -> Context {
    Context::new(Session::new(EngineConfig::default()))
}

pub fn core_mod() -> Mod {
    Mod::Core(CoreMod::builtin("core").expect("builtin core module"))
}

/// Create a module served by `runtime`, depending on `deps`.
pub fn user_mod(
    ctx: &Context,
    name: &str,
    deps: Vec<Mod>,
    runtime: MockRuntime,
) -> (Arc<UserMod>, Arc<MockRuntime>) {
    let sdk = MockSdk::new(runtime);
    let runtime = sdk.runtime().clone();
    let module = UserMod::new(
        ctx,
        name,
        Digest::from_string(&format!("{} source", name)),
        ModDeps::new(deps),
        Arc::new(sdk),
    );
    (module, runtime)
}

/// `greeter`: a main object with a stored field, functions returning a string,
/// the object itself and a second object.
pub fn greeter_definition() -> ModuleDefinition {
    ModuleDefinition::new("greeter")
        .with_object(
            ObjectTypeDef::new("Greeter", "A friendly greeter")
                .with_field("greeting", TypeDef::string(), "How to greet")
                .with_function(
                    Function::new("hello", TypeDef::string())
                        .with_description("Say hello")
                        .with_arg("name", TypeDef::string()),
                )
                .with_function(
                    Function::new("withGreeting", TypeDef::object_ref("Greeter"))
                        .with_arg("greeting", TypeDef::string()),
                )
                .with_function(Function::new("message", TypeDef::object_ref("Message"))),
        )
        .with_object(ObjectTypeDef::new("Message", "").with_field("text", TypeDef::string(), ""))
}

/// A runtime implementing `greeter_definition`.
pub fn greeter_runtime() -> MockRuntime {
    let mut runtime = MockRuntime::new(greeter_definition());
    runtime
        .add_handler("Greeter", "hello", |call| {
            let greeting = call.parent["greeting"].as_str().unwrap_or("hello");
            let name = call
                .input_args
                .iter()
                .find(|a| a.name == "name")
                .and_then(|a| a.value.as_str())
                .unwrap_or("nobody");
            Ok(serde_json::json!(format!("{}, {}!", greeting, name)))
        })
        .add_handler("Greeter", "withGreeting", |call| {
            let greeting = call.input_args[0].value.clone();
            Ok(serde_json::json!({ "greeting": greeting }))
        })
        .add_output("Greeter", "message", serde_json::json!({"text": "hi", "extra": 1}));
    runtime
}

pub fn assert_error_contains(err: &anyhow::Error, needle: &str) {
    let message = format!("{:#}", err);
    assert!(
        message.contains(needle),
        "expected error containing {:?}, got {:?}",
        needle,
        message
    );
}
