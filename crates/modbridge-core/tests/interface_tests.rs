//! Interfaces: structural subtyping, `as<Interface>` views and dispatch.

mod common;

use std::sync::{Arc, OnceLock};

use anyhow::anyhow;
use serde_json::json;

use common::{core_mod, new_ctx, user_mod};
use modbridge_core::mock::MockRuntime;
use modbridge_core::{CompiledSchema, Context, Mod, ModDeps, Selection, Value};
use modbridge_types::{
    decode_module_id, encode_module, Digest, Function, InterfaceTypeDef, ModuleDefinition,
    ModuleObjectData, ObjectTypeDef, TypeDef,
};

fn shape_ref() -> TypeDef {
    TypeDef::interface(InterfaceTypeDef::new("Shape", ""))
}

/// `shapes`: a `Shape` interface, a `Square` implementing it and a main
/// object that builds squares and describes any shape.
fn shapes_definition() -> ModuleDefinition {
    ModuleDefinition::new("shapes")
        .with_interface(
            InterfaceTypeDef::new("Shape", "Something with an area")
                .with_function(Function::new("area", TypeDef::integer()))
                .with_function(Function::new("scaled", shape_ref()).with_arg("factor", TypeDef::integer())),
        )
        .with_object(
            ObjectTypeDef::new("Square", "")
                .with_field("side", TypeDef::integer(), "")
                .with_function(Function::new("area", TypeDef::integer()))
                .with_function(Function::new("scaled", shape_ref()).with_arg("factor", TypeDef::integer())),
        )
        .with_object(
            ObjectTypeDef::new("Shapes", "")
                .with_function(
                    Function::new("square", TypeDef::object_ref("Square"))
                        .with_arg("side", TypeDef::integer()),
                )
                .with_function(Function::new("describe", TypeDef::string()).with_arg("shape", shape_ref())),
        )
}

fn arg_i64(call: &modbridge_core::FunctionCall, name: &str) -> anyhow::Result<i64> {
    call.input_args
        .iter()
        .find(|a| a.name == name)
        .and_then(|a| a.value.as_i64())
        .ok_or_else(|| anyhow!("missing int arg {}", name))
}

async fn shapes_schema(ctx: &Context) -> (Arc<CompiledSchema>, Arc<MockRuntime>) {
    // scaled squares are returned as IDs, which name the owning module
    let module_digest: Arc<OnceLock<Digest>> = Arc::default();

    let mut runtime = MockRuntime::new(shapes_definition());
    let digest = module_digest.clone();
    runtime
        .add_handler("Shapes", "square", |call| Ok(json!({ "side": arg_i64(call, "side")? })))
        .add_handler("Square", "area", |call| {
            let side = call.parent["side"].as_i64().ok_or_else(|| anyhow!("no side"))?;
            Ok(json!(side * side))
        })
        .add_handler("Square", "scaled", move |call| {
            let side = call.parent["side"].as_i64().ok_or_else(|| anyhow!("no side"))?;
            let mod_digest = digest.get().cloned().ok_or_else(|| anyhow!("module not created"))?;
            let id = encode_module(&ModuleObjectData {
                data: json!({ "side": side * arg_i64(call, "factor")? }),
                mod_digest,
                type_name: "ShapesSquare".to_string(),
            })?;
            Ok(json!(id))
        })
        .add_handler("Shapes", "describe", |call| {
            let id = call
                .input_args
                .iter()
                .find(|a| a.name == "shape")
                .and_then(|a| a.value.as_str())
                .ok_or_else(|| anyhow!("shape must be an id"))?;
            let decoded = decode_module_id(id, "")?;
            Ok(json!(format!("{} with side {}", decoded.type_name, decoded.data["side"])))
        });

    let (shapes, runtime) = user_mod(ctx, "shapes", vec![core_mod()], runtime);
    module_digest
        .set(shapes.dag_digest().clone())
        .expect("digest set once");
    let schema = ModDeps::new([core_mod(), Mod::User(shapes)])
        .schema(ctx)
        .await
        .expect("shapes schema should compose");
    (schema, runtime)
}

fn square(side: i64) -> Vec<Selection> {
    vec![Selection::new("shapes"), Selection::new("square").arg("side", side)]
}

#[tokio::test]
async fn test_interface_schema() {
    let ctx = new_ctx();
    let (schema, _runtime) = shapes_schema(&ctx).await;
    let sdl = schema.sdl();

    assert!(sdl.contains("type ShapesShape {"), "sdl:\n{}", sdl);
    assert!(sdl.contains("scalar ShapesShapeID"));
    assert!(sdl.contains("  loadShapesShapeFromID(id: ShapesShapeID!): ShapesShape!"));
    assert!(sdl.contains("  scaled(factor: Int!): ShapesShape!"));
    assert!(sdl.contains("  describe(shape: ShapesShapeID!): String!"));

    // only the structural implementor gets the view
    assert!(schema.field("ShapesSquare", "asShapesShape").is_some());
    assert!(schema.field("Shapes", "asShapesShape").is_none());
}

#[tokio::test]
async fn test_interface_dispatches_to_concrete_object() {
    let ctx = new_ctx();
    let (schema, runtime) = shapes_schema(&ctx).await;

    let mut path = square(3);
    path.push(Selection::new("asShapesShape"));
    path.push(Selection::new("area"));
    let area = schema.resolve_path(&ctx, &path).await.expect("area via interface");
    assert_eq!(area, Value::Int(9));
    assert_eq!(runtime.call_count("Square", "area"), 1);
}

#[tokio::test]
async fn test_interface_returns_are_covariant() {
    let ctx = new_ctx();
    let (schema, _runtime) = shapes_schema(&ctx).await;

    let mut path = square(2);
    path.push(Selection::new("asShapesShape"));
    path.push(Selection::new("scaled").arg("factor", 3i64));
    path.push(Selection::new("area"));
    let area = schema
        .resolve_path(&ctx, &path)
        .await
        .expect("area of scaled shape");
    assert_eq!(area, Value::Int(36));

    let mut path = square(2);
    path.push(Selection::new("asShapesShape"));
    path.push(Selection::new("scaled").arg("factor", 5i64));
    let scaled = schema.resolve_path(&ctx, &path).await.expect("scaled shape");
    let iface = scaled.as_interface().expect("presented through the interface");
    assert_eq!(iface.iface.name(), "ShapesShape");
    assert_eq!(iface.underlying.type_def().named_type(), Some("ShapesSquare"));
    assert_eq!(iface.value, Value::object([("side", Value::Int(10))]));
}

#[tokio::test]
async fn test_objects_pass_as_interface_args() {
    let ctx = new_ctx();
    let (schema, runtime) = shapes_schema(&ctx).await;

    let mut path = square(4);
    path.push(Selection::new("id"));
    let id = schema.resolve_path(&ctx, &path).await.expect("square id");
    let id = id.as_str().expect("ids are strings").to_string();

    let description = schema
        .resolve_path(
            &ctx,
            &[
                Selection::new("shapes"),
                Selection::new("describe").arg("shape", id.as_str()),
            ],
        )
        .await
        .expect("describe");
    assert_eq!(description, Value::from("ShapesSquare with side 4"));

    let describe = runtime
        .invocations()
        .into_iter()
        .find(|inv| inv.call.name == "describe")
        .expect("describe invoked");
    assert_eq!(describe.call.input_args[0].value, json!(id));
}

#[tokio::test]
async fn test_interface_id_round_trip() {
    let ctx = new_ctx();
    let (schema, _runtime) = shapes_schema(&ctx).await;

    let mut path = square(5);
    path.push(Selection::new("asShapesShape"));
    path.push(Selection::new("id"));
    let id = schema.resolve_path(&ctx, &path).await.expect("interface id");
    let id = id.as_str().expect("ids are strings").to_string();

    let area = schema
        .resolve_path(
            &ctx,
            &[
                Selection::new("loadShapesShapeFromID").arg("id", id.as_str()),
                Selection::new("area"),
            ],
        )
        .await
        .expect("area of loaded shape");
    assert_eq!(area, Value::Int(25));
}

#[tokio::test]
async fn test_object_missing_function_is_not_a_subtype() {
    let ctx = new_ctx();
    let definition = ModuleDefinition::new("partial")
        .with_interface(
            InterfaceTypeDef::new("Named", "")
                .with_function(Function::new("name", TypeDef::string()))
                .with_function(Function::new("nickname", TypeDef::string())),
        )
        .with_object(ObjectTypeDef::new("Partial", "").with_field("name", TypeDef::string(), ""))
        .with_object(
            ObjectTypeDef::new("Full", "")
                .with_field("name", TypeDef::string(), "")
                .with_function(Function::new("nickname", TypeDef::string())),
        );
    let (module, _runtime) = user_mod(&ctx, "partial", vec![core_mod()], MockRuntime::new(definition));
    let schema = ModDeps::new([core_mod(), Mod::User(module)])
        .schema(&ctx)
        .await
        .expect("schema composes");

    assert!(schema.field("Partial", "asPartialNamed").is_none());
    assert!(schema.field("PartialFull", "asPartialNamed").is_some());
}

#[tokio::test]
async fn test_interface_id_resolves_in_another_session() {
    let ctx = new_ctx();
    let (schema, runtime) = shapes_schema(&ctx).await;

    let mut path = square(6);
    path.push(Selection::new("asShapesShape"));
    path.push(Selection::new("id"));
    let id = schema.resolve_path(&ctx, &path).await.expect("interface id");
    let id = id.as_str().expect("ids are strings").to_string();

    let other = new_ctx();
    let area = schema
        .resolve_path(
            &other,
            &[
                Selection::new("loadShapesShapeFromID").arg("id", id.as_str()),
                Selection::new("area"),
            ],
        )
        .await
        .expect("area of shape loaded in another session");
    assert_eq!(area, Value::Int(36));
    assert_eq!(runtime.call_count("Square", "area"), 1);
}
