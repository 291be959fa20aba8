//! Schema composition across modules: namespacing, validation, merging.

mod common;

use std::sync::Arc;

use common::{assert_error_contains, core_mod, greeter_runtime, new_ctx, user_mod};
use modbridge_core::mock::{MockRuntime, MockSdk};
use modbridge_core::{Mod, ModDeps, ModError, UserMod};
use modbridge_types::{Digest, EnumTypeDef, Function, ModuleDefinition, ObjectTypeDef, TypeDef};

#[tokio::test]
async fn test_greeter_schema_composition() {
    let ctx = new_ctx();
    let (greeter, _runtime) = user_mod(&ctx, "greeter", vec![core_mod()], greeter_runtime());

    let schema = ModDeps::new([core_mod(), Mod::User(greeter)])
        .schema(&ctx)
        .await
        .expect("greeter schema should compose");
    let sdl = schema.sdl();

    assert!(sdl.contains("type Greeter {"), "sdl:\n{}", sdl);
    assert!(sdl.contains("scalar GreeterID"));
    assert!(sdl.contains("  id: GreeterID!"));
    assert!(sdl.contains("  greeting: String!"));
    assert!(sdl.contains("  hello(name: String!): String!"));
    assert!(sdl.contains("  withGreeting(greeting: String!): Greeter!"));
    assert!(sdl.contains("  loadGreeterFromID(id: GreeterID!): Greeter!"));
    assert!(sdl.contains("  greeter: Greeter!"));

    // secondary objects are namespaced under the module, the main one is not
    assert!(sdl.contains("type GreeterMessage {"));
    assert!(sdl.contains("  message: GreeterMessage!"));
    assert!(!sdl.contains("type Message {"));

    // core types are still served
    assert!(sdl.contains("type File {"));
    assert!(schema.field("Query", "file").is_some());
}

#[tokio::test]
async fn test_type_defs_carry_source_module() {
    let ctx = new_ctx();
    let (greeter, _runtime) = user_mod(&ctx, "greeter", vec![core_mod()], greeter_runtime());

    let type_defs = Mod::User(greeter)
        .type_defs(&ctx)
        .await
        .expect("type defs should load");
    let names: Vec<_> = type_defs.iter().filter_map(|td| td.named_type()).collect();
    assert!(names.contains(&"Greeter"));
    assert!(names.contains(&"GreeterMessage"));
    for td in &type_defs {
        let obj = td.as_object().expect("only objects declared");
        assert_eq!(obj.source_module_name.as_deref(), Some("greeter"));
    }
}

#[tokio::test]
async fn test_schema_is_memoized() {
    let ctx = new_ctx();
    let (greeter, runtime) = user_mod(&ctx, "greeter", vec![core_mod()], greeter_runtime());
    let deps = ModDeps::new([core_mod(), Mod::User(greeter)]);

    let first = deps.schema(&ctx).await.expect("first schema");
    let second = deps.clone().schema(&ctx).await.expect("second schema");
    assert!(Arc::ptr_eq(&first, &second));

    let metrics = ctx.session().metrics().snapshot();
    assert_eq!(metrics.schema_merges, 1);
    assert_eq!(metrics.module_loads, 1);
    // only the describe call ran
    assert_eq!(runtime.execution_count(), 1);
}

#[tokio::test]
async fn test_introspection_lists_module_types() {
    let ctx = new_ctx();
    let (greeter, _runtime) = user_mod(&ctx, "greeter", vec![core_mod()], greeter_runtime());
    let deps = ModDeps::new([core_mod(), Mod::User(greeter)]);

    let json = deps
        .schema_introspection_json(&ctx)
        .await
        .expect("introspection json");
    let doc: serde_json::Value = serde_json::from_str(&json).expect("valid json");
    let types = doc["__schema"]["types"].as_array().expect("types array");
    let greeter = types
        .iter()
        .find(|t| t["name"] == "Greeter")
        .expect("Greeter type present");
    assert_eq!(greeter["kind"], "OBJECT");
    assert_eq!(greeter["description"], "A friendly greeter");
    assert!(types.iter().any(|t| t["name"] == "GreeterID" && t["kind"] == "SCALAR"));
    assert_eq!(doc["__schema"]["queryType"]["name"], "Query");
}

fn reserved_definition(obj: ObjectTypeDef) -> MockRuntime {
    MockRuntime::new(ModuleDefinition::new("reserved").with_object(obj))
}

#[tokio::test]
async fn test_reserved_id_names_rejected() {
    let cases = [
        (
            ObjectTypeDef::new("Reserved", "").with_field("id", TypeDef::string(), ""),
            "field",
        ),
        (
            ObjectTypeDef::new("Reserved", "").with_function(Function::new("id", TypeDef::string())),
            "function",
        ),
        (
            ObjectTypeDef::new("Reserved", "")
                .with_function(Function::new("lookup", TypeDef::string()).with_arg("id", TypeDef::string())),
            "argument",
        ),
    ];

    for (obj, expected_kind) in cases {
        let ctx = new_ctx();
        let (module, _runtime) = user_mod(&ctx, "reserved", vec![core_mod()], reserved_definition(obj));
        let err = ModDeps::new([core_mod(), Mod::User(module)])
            .schema(&ctx)
            .await
            .expect_err("reserved name should fail composition");
        match ModError::classify(&err) {
            Some(ModError::ReservedName { kind, name, .. }) => {
                assert_eq!(*kind, expected_kind);
                assert_eq!(name, "id");
            }
            other => panic!("expected reserved name error, got {:?} ({:#})", other, err),
        }
    }
}

/// Module `a` exports `A` and a secondary object `AThing`.
fn thing_module(ctx: &modbridge_core::Context) -> Mod {
    let runtime = MockRuntime::new(
        ModuleDefinition::new("a")
            .with_object(
                ObjectTypeDef::new("A", "")
                    .with_function(Function::new("thing", TypeDef::object_ref("Thing"))),
            )
            .with_object(ObjectTypeDef::new("Thing", "").with_field("label", TypeDef::string(), "")),
    );
    let (a, _runtime) = user_mod(ctx, "a", vec![core_mod()], runtime);
    Mod::User(a)
}

#[tokio::test]
async fn test_returning_dependency_type_rejected() {
    let ctx = new_ctx();
    let a = thing_module(&ctx);
    let runtime = MockRuntime::new(ModuleDefinition::new("b").with_object(
        ObjectTypeDef::new("B", "").with_function(Function::new("get", TypeDef::object_ref("AThing"))),
    ));
    let (b, _runtime) = user_mod(&ctx, "b", vec![core_mod(), a.clone()], runtime);

    let err = ModDeps::new([core_mod(), a, Mod::User(b)])
        .schema(&ctx)
        .await
        .expect_err("external return type should be rejected");
    assert_error_contains(&err, "cannot return external type from dependency module \"a\"");
    assert!(matches!(ModError::classify(&err), Some(ModError::Validation { module, .. }) if module == "b"));
}

#[tokio::test]
async fn test_referencing_dependency_type_in_field_rejected() {
    let ctx = new_ctx();
    let a = thing_module(&ctx);
    let runtime = MockRuntime::new(ModuleDefinition::new("b").with_object(
        ObjectTypeDef::new("B", "").with_field("thing", TypeDef::object_ref("AThing"), ""),
    ));
    let (b, _runtime) = user_mod(&ctx, "b", vec![core_mod(), a.clone()], runtime);

    let err = ModDeps::new([core_mod(), a, Mod::User(b)])
        .schema(&ctx)
        .await
        .expect_err("external field type should be rejected");
    assert_error_contains(&err, "field \"thing\" cannot reference external type");
}

#[tokio::test]
async fn test_core_types_may_be_referenced() {
    let ctx = new_ctx();
    let runtime = MockRuntime::new(ModuleDefinition::new("files").with_object(
        ObjectTypeDef::new("Files", "")
            .with_field("readme", TypeDef::object_ref("File"), "")
            .with_function(Function::new("read", TypeDef::string()).with_arg("file", TypeDef::object_ref("File"))),
    ));
    let (files, _runtime) = user_mod(&ctx, "files", vec![core_mod()], runtime);

    let schema = ModDeps::new([core_mod(), Mod::User(files)])
        .schema(&ctx)
        .await
        .expect("core types are usable by every module");
    assert!(schema.sdl().contains("  readme: File!"));
    assert!(schema.sdl().contains("  read(file: FileID!): String!"));
}

#[tokio::test]
async fn test_foreign_object_reference_emits_nothing() {
    let ctx = new_ctx();
    let a = thing_module(&ctx);
    let runtime = MockRuntime::new(
        ModuleDefinition::new("b")
            .with_object(ObjectTypeDef::new("B", "").with_field("count", TypeDef::integer(), ""))
            .with_object(ObjectTypeDef::new("AThing", "")),
    );
    let (b, _runtime) = user_mod(&ctx, "b", vec![core_mod(), a.clone()], runtime);

    let schema = ModDeps::new([core_mod(), a, Mod::User(b)])
        .schema(&ctx)
        .await
        .expect("bare foreign reference is allowed");
    assert_eq!(schema.sdl().matches("type AThing {").count(), 1);
    assert!(schema.merged_type("BAThing").is_none());
}

#[tokio::test]
async fn test_foreign_object_extension_rejected() {
    let ctx = new_ctx();
    let a = thing_module(&ctx);
    let runtime = MockRuntime::new(
        ModuleDefinition::new("b")
            .with_object(ObjectTypeDef::new("B", ""))
            .with_object(ObjectTypeDef::new("AThing", "").with_field("extra", TypeDef::string(), "")),
    );
    let (b, _runtime) = user_mod(&ctx, "b", vec![core_mod(), a.clone()], runtime);

    let err = ModDeps::new([core_mod(), a, Mod::User(b)])
        .schema(&ctx)
        .await
        .expect_err("extending a foreign object should fail");
    assert_error_contains(&err, "cannot attach new fields or functions to object \"AThing\"");
}

#[tokio::test]
async fn test_constructor_must_return_its_object() {
    let ctx = new_ctx();
    let runtime = MockRuntime::new(
        ModuleDefinition::new("builder")
            .with_object(
                ObjectTypeDef::new("Builder", "")
                    .with_constructor(Function::new("", TypeDef::object_ref("Part"))),
            )
            .with_object(ObjectTypeDef::new("Part", "")),
    );
    let (module, _runtime) = user_mod(&ctx, "builder", vec![core_mod()], runtime);

    let err = ModDeps::new([core_mod(), Mod::User(module)])
        .schema(&ctx)
        .await
        .expect_err("constructor returning another type should fail");
    assert_error_contains(&err, "constructor function for object Builder must return that object");
}

#[tokio::test]
async fn test_conflicting_modules_fail_merge() {
    let ctx = new_ctx();
    let dup = |version: &str| {
        let runtime = MockRuntime::new(ModuleDefinition::new("dup").with_object(
            ObjectTypeDef::new("Dup", "").with_field("value", TypeDef::string(), ""),
        ));
        Mod::User(UserMod::new(
            &ctx,
            "dup",
            Digest::from_string(version),
            ModDeps::new([core_mod()]),
            Arc::new(MockSdk::new(runtime)),
        ))
    };

    let err = ModDeps::new([dup("v1"), dup("v2")])
        .schema(&ctx)
        .await
        .expect_err("two versions of one module must conflict");
    assert!(
        matches!(ModError::classify(&err), Some(ModError::MergeConflict { .. })),
        "unexpected error: {:#}",
        err
    );
}

#[tokio::test]
async fn test_schema_failure_is_shared() {
    let ctx = new_ctx();
    let mut runtime = greeter_runtime();
    runtime.set_error("container exited with code 2");
    let (greeter, runtime) = user_mod(&ctx, "greeter", vec![core_mod()], runtime);
    let deps = ModDeps::new([core_mod(), Mod::User(greeter)]);

    let first = deps.schema(&ctx).await.expect_err("describe fails");
    let second = deps.schema(&ctx).await.expect_err("failure is memoized");
    assert_error_contains(&first, "container exited with code 2");
    assert_error_contains(&second, "container exited with code 2");
    assert_eq!(runtime.execution_count(), 1);
}

#[tokio::test]
async fn test_enums_are_namespaced_with_defaults() {
    let ctx = new_ctx();
    let mood = EnumTypeDef::new("Mood", "How it feels")
        .with_value("HAPPY", "")
        .with_value("SAD", "");
    let runtime = MockRuntime::new(ModuleDefinition::new("moody").with_object(
        ObjectTypeDef::new("Moody", "").with_function(
            Function::new("feel", TypeDef::enumeration(mood.clone())).with_arg_default(
                "mood",
                TypeDef::enumeration(mood),
                serde_json::json!("HAPPY"),
            ),
        ),
    ));
    let (module, _runtime) = user_mod(&ctx, "moody", vec![core_mod()], runtime);

    let schema = ModDeps::new([core_mod(), Mod::User(module)])
        .schema(&ctx)
        .await
        .expect("enum module composes");
    let sdl = schema.sdl();
    assert!(sdl.contains("enum MoodyMood {"), "sdl:\n{}", sdl);
    assert!(sdl.contains("  HAPPY"));
    assert!(sdl.contains("  feel(mood: MoodyMood! = HAPPY): MoodyMood!"));
    let merged = schema.merged_type("MoodyMood").expect("enum type merged");
    assert_eq!(merged.enum_values, vec!["HAPPY".to_string(), "SAD".to_string()]);
}
