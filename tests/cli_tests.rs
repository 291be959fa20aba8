use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn modbridge() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("modbridge").unwrap()
}

#[test]
fn test_compose_prints_merged_schema() {
    modbridge()
        .arg("compose")
        .arg(fixture("greeter.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("type Greeter {"))
        .stdout(predicate::str::contains("  hello(name: String!): String!"))
        .stdout(predicate::str::contains("type GreeterMessage {"))
        .stdout(predicate::str::contains("type Echo {"))
        .stdout(predicate::str::contains("scalar EchoID"))
        .stdout(predicate::str::contains("type File {"));
}

#[test]
fn test_introspect_prints_json() {
    let output = modbridge()
        .arg("introspect")
        .arg(fixture("greeter.json"))
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let types = json["__schema"]["types"].as_array().unwrap();
    assert!(types.iter().any(|t| t["name"] == "Greeter"));
    assert!(types.iter().any(|t| t["name"] == "GreeterID"));
}

#[test]
fn test_call_resolves_function() {
    modbridge()
        .arg("call")
        .arg(fixture("greeter.json"))
        .args(["--object", "Greeter", "--function", "hello", "--arg", "name=world"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hello, world!\""));
}

#[test]
fn test_call_object_result_drops_unknown_fields() {
    let output = modbridge()
        .arg("call")
        .arg(fixture("greeter.json"))
        .args(["--object", "Greeter", "--function", "message"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json, serde_json::json!({"text": "hi"}));
}

#[test]
fn test_call_with_metrics() {
    modbridge()
        .arg("call")
        .arg(fixture("greeter.json"))
        .args(["--object", "Echo", "--function", "shout", "--arg", "text=hey", "--metrics"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"hey!\""))
        .stderr(predicate::str::contains("runtime_executions"));
}

#[test]
fn test_call_unknown_argument_fails() {
    modbridge()
        .arg("call")
        .arg(fixture("greeter.json"))
        .args(["--object", "Greeter", "--function", "hello", "--arg", "nope=1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no argument \"nope\""));
}

#[test]
fn test_invalid_fixture_reports_path() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.json");
    std::fs::write(&path, "{\"modules\": [").unwrap();

    modbridge()
        .arg("compose")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid fixture"));
}

#[test]
fn test_reserved_name_fails_compose() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("reserved.json");
    let fixture = serde_json::json!({
        "modules": [{
            "name": "bad",
            "definition": {"objects": [{"kind": "OBJECT", "asObject": {
                "name": "Bad",
                "fields": [{"name": "id", "typeDef": {"kind": "STRING"}}]
            }}]}
        }]
    });
    std::fs::write(&path, fixture.to_string()).unwrap();

    modbridge()
        .arg("compose")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("reserved name"));
}
