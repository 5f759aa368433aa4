//! Conversion tests
//!
//! Converts each directory in /tests/fixtures/ and compares the json with the expected document.
//! Block ids are derived from addresses and line numbers, they are redacted before comparing.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::PathBuf;
use tfparse::Options;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn convert(name: &str, options: &Options) -> Value {
    let json = tfparse::load_from_path(fixture(name), options).expect("fixture converts");
    redact_ids(json)
}

/// Replace every `id` with a placeholder
fn redact_ids(value: Value) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| match (key.as_str(), value) {
                    ("id", Value::String(_)) => (key, json!("[id]")),
                    (_, value) => (key, redact_ids(value)),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_ids).collect()),
        other => other,
    }
}

#[test]
fn simple_resource() {
    let converted = convert("simple", &Options::default());

    assert_eq!(
        converted,
        json!({
            "aws_s3_bucket": [{
                "bucket": "example-logs",
                "tags": {"Env": "prod"},
                "id": "[id]",
                "__tfmeta": {
                    "filename": "main.tf",
                    "line_start": 1,
                    "line_end": 6,
                    "label": "aws_s3_bucket",
                    "path": "aws_s3_bucket.logs",
                    "type": "resource",
                }
            }]
        })
    );

    insta::with_settings!({sort_maps => true}, {
        insta::assert_json_snapshot!(converted["aws_s3_bucket"][0]["__tfmeta"], @r###"
        {
          "filename": "main.tf",
          "label": "aws_s3_bucket",
          "line_end": 6,
          "line_start": 1,
          "path": "aws_s3_bucket.logs",
          "type": "resource"
        }
        "###);
    });
}

#[test]
fn ids_are_stable() {
    let first = tfparse::load_from_path(fixture("simple"), &Options::default()).unwrap();
    let second = tfparse::load_from_path(fixture("simple"), &Options::default()).unwrap();

    let id = first["aws_s3_bucket"][0]["id"].as_str().expect("id is a string");
    assert_eq!(id.len(), 36);
    assert_eq!(first, second);
}

#[test]
fn references_and_unknown_values() {
    let converted = convert("references", &Options::default());
    let bucket = &converted["aws_s3_bucket"][0];

    assert_eq!(
        bucket["kms_key"],
        json!({
            "__attribute__": "aws_kms_key.logs.arn",
            "__type__": "aws_kms_key",
            "__name__": "logs",
            "__ref__": "aws_kms_key.logs",
        })
    );
    assert_eq!(
        bucket["account"],
        json!({
            "__attribute__": "data.aws_caller_identity.current.account_id",
            "__type__": "aws_caller_identity",
            "__name__": "current",
            "__ref__": "aws_caller_identity.current",
        })
    );
    assert_eq!(
        bucket["tags"],
        json!({
            "__attribute__": "var.additional_tags",
            "__name__": "additional_tags",
        })
    );
    assert_eq!(
        bucket["bucket"],
        json!("logs-${data.aws_caller_identity.current.account_id}")
    );

    assert_eq!(
        bucket["__tfmeta"]["references"],
        json!([
            {"id": "[id]", "label": "aws_kms_key", "name": "logs"},
            {"id": "[id]", "label": "aws_caller_identity", "name": "current"},
        ])
    );

    assert_eq!(
        converted["aws_caller_identity"],
        json!([{
            "id": "[id]",
            "__tfmeta": {
                "filename": "main.tf",
                "line_start": 5,
                "line_end": 5,
                "label": "aws_caller_identity",
                "path": "data.aws_caller_identity.current",
                "type": "data",
            }
        }])
    );

    assert_eq!(converted["variable"][0]["type"], json!("map(string)"));
    assert_eq!(converted["variable"][0]["__tfmeta"]["label"], json!("additional_tags"));
}

#[test]
fn reference_ids_point_to_blocks() {
    let converted = tfparse::load_from_path(fixture("references"), &Options::default()).unwrap();

    let kms_key_id = &converted["aws_kms_key"][0]["id"];
    assert_eq!(
        &converted["aws_s3_bucket"][0]["__tfmeta"]["references"][0]["id"],
        kms_key_id
    );
}

#[test]
fn dynamic_blocks() {
    let converted = convert("dynamic", &Options::default());
    let group = &converted["aws_security_group"][0];

    assert_eq!(
        group["ingress"],
        json!([
            {
                "from_port": 80,
                "id": "[id]",
                "__tfmeta": {"filename": "main.tf", "line_start": 10, "line_end": 12},
            },
            {
                "from_port": 443,
                "id": "[id]",
                "__tfmeta": {"filename": "main.tf", "line_start": 10, "line_end": 12},
            },
        ])
    );
    assert_eq!(
        group["egress"],
        json!({
            "from_port": 0,
            "id": "[id]",
            "__tfmeta": {"filename": "main.tf", "line_start": 15, "line_end": 17},
        })
    );
    assert!(group.get("dynamic").is_none());
    assert_eq!(converted["locals"][0]["ports"], json!([80, 443]));
}

#[test]
fn counted_resources() {
    let converted = convert("count", &Options::default());
    let instances = converted["aws_instance"].as_array().expect("array of instances");

    let summary: Vec<_> = instances
        .iter()
        .map(|instance| (instance["name"].clone(), instance["__tfmeta"]["path"].clone()))
        .collect();

    assert_eq!(
        summary,
        vec![
            (json!("web-0"), json!("aws_instance.web[0]")),
            (json!("web-1"), json!("aws_instance.web[1]")),
        ]
    );
}

#[test]
fn variables_and_workspace() {
    let defaults = convert("variables", &Options::default());
    assert_eq!(defaults["aws_s3_bucket"][0]["bucket"], json!("dev-default"));
    assert_eq!(defaults["aws_s3_bucket"][0]["region"], json!("eu-west-1"));

    let options = Options::default()
        .with_vars_path("prod.tfvars")
        .with_workspace_name("staging");
    let converted = convert("variables", &options);
    assert_eq!(converted["aws_s3_bucket"][0]["bucket"], json!("prod-staging"));
    assert_eq!(converted["locals"][0]["name"], json!("prod-staging"));
}

#[test]
fn local_modules() {
    let converted = convert("module-local", &Options::default());

    assert_eq!(
        converted["module"],
        json!([{
            "source": "./modules/test",
            "name": "hello",
            "id": "[id]",
            "__tfmeta": {
                "filename": "main.tf",
                "line_start": 1,
                "line_end": 4,
                "label": "test",
                "path": "module.test",
            }
        }])
    );

    let outputs = converted["output"].as_array().expect("outputs");
    assert_eq!(outputs.len(), 2);

    // root module first
    assert_eq!(outputs[0]["value"], json!("hi hello"));
    assert_eq!(outputs[0]["__tfmeta"]["path"], json!("output.greeting"));
    assert_eq!(
        outputs[0]["__tfmeta"]["references"],
        json!([{"id": "[id]", "label": "module", "name": "test"}])
    );

    assert_eq!(outputs[1]["value"], json!("hi hello"));
    assert_eq!(
        outputs[1]["__tfmeta"],
        json!({
            "filename": "modules/test/main.tf",
            "line_start": 5,
            "line_end": 7,
            "label": "output",
            "path": "module.test.output.output",
        })
    );

    assert_eq!(converted["variable"][0]["type"], json!("string"));
    assert_eq!(
        converted["variable"][0]["__tfmeta"]["path"],
        json!("module.test.variable.name")
    );
}

#[test]
fn apply_time_values() {
    let converted = convert("unknowns", &Options::default());
    let bucket = &converted["aws_s3_bucket"][0];

    assert_eq!(
        bucket["tags"],
        json!({"Team": "platform", "ApplyTimeVal": null})
    );
    assert_eq!(bucket["policy"], Value::Null);
}

#[test]
fn empty_directory() {
    let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("tfparse-empty-module");
    std::fs::create_dir_all(&path).unwrap();

    let converted = tfparse::load_from_path(&path, &Options::default()).unwrap();
    assert_eq!(converted, json!({}));
}

#[test]
fn missing_directory() {
    let error = tfparse::load_from_path(fixture("does-not-exist"), &Options::default())
        .expect_err("directory does not exist");

    assert!(error.to_string().contains("no such file or directory"));
}

#[test]
fn module_calls_in_dependency_order() {
    let converted = convert("module-order", &Options::default());

    assert_eq!(
        converted["aws_s3_bucket"][0]["tags"],
        json!({"app": "weather", "env": "dev"})
    );

    let bucket_call = converted["module"]
        .as_array()
        .expect("module calls")
        .iter()
        .find(|call| call["__tfmeta"]["label"] == json!("bucket"))
        .expect("bucket module call");
    assert_eq!(bucket_call["default_tags"], json!({"app": "weather", "env": "dev"}));

    // child modules follow the order they were evaluated in
    let variables: Vec<_> = converted["variable"]
        .as_array()
        .expect("variables")
        .iter()
        .map(|variable| variable["__tfmeta"]["path"].clone())
        .collect();
    assert_eq!(
        variables,
        vec![
            json!("module.tags.variable.app"),
            json!("module.bucket.variable.default_tags"),
        ]
    );
}

#[test]
fn variables_take_their_declared_type() {
    let converted = convert("variable-types", &Options::default());

    let output = |label: &str| {
        converted["output"]
            .as_array()
            .expect("outputs")
            .iter()
            .find(|output| output["__tfmeta"]["label"] == json!(label))
            .map(|output| output["value"].clone())
            .expect("output exists")
    };

    assert_eq!(output("quoted_type"), json!("789"));
    assert_eq!(output("port"), json!(8080));
    assert_eq!(output("names"), json!(["1", "true", "x"]));
    assert_eq!(output("enabled"), json!(true));
}

#[test]
fn filesystem_functions() {
    let converted = convert("functions", &Options::default());
    let locals = &converted["locals"][0];

    assert_eq!(locals["check_file"], json!("hello\n"));
    assert_eq!(locals["check_fileexists"], json!(true));
    assert_eq!(locals["check_missing"], json!(false));
    assert_eq!(locals["check_fileset"], json!(["files/x.py", "files/y.py"]));
    assert_eq!(locals["check_fileset_dir"], json!(["x.py", "y.py"]));
    assert_eq!(locals["check_mod_path"], json!("."));

    // relative to the child module directory
    assert_eq!(converted["output"][0]["value"], json!("hi\n"));
}
