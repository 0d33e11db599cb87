use std::io::Write;

use pgprovider::config::load_config_from_path;
use pgprovider::error::ErrorKind;
use pgprovider::types::{ColumnType, TypedValue};
use pgprovider::update::operations_from_json;
use pgprovider::{get_default_provider_registry, ProviderServices};

const OPERATIONS: &str = r#"[
  {"kind": "insert", "table": "people",
   "values": [{"column": "name", "type": "text", "value": "'O''Brien'"},
              {"column": "active", "type": "boolean", "value": "t"}],
   "returning": [{"column": "id", "type": "integer"}]},
  {"kind": "insert", "table": "people",
   "values": [{"column": "name", "type": "text", "value": "Ann"},
              {"column": "active", "type": "boolean"}],
   "returning": [{"column": "id", "type": "integer"}]},
  {"kind": "delete", "table": "people",
   "keys": [{"column": "id", "type": "integer", "value": "42"}]}
]"#;

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", body).unwrap();
    file
}

#[test]
fn services_from_config_file() {
    let file = write_config(
        r#"
[settings]
provider = "pg"

[batch]
max_batch_size = 1
"#,
    );
    let cfg = load_config_from_path(file.path()).unwrap().unwrap();
    let registry = get_default_provider_registry();
    let services = ProviderServices::from_config(&registry, &cfg, None).unwrap();
    assert_eq!(services.provider_name(), "postgres");
    assert_eq!(services.max_batch_size(), 1);
    // no DSN anywhere, so no pool
    assert_eq!(services.connection().err().unwrap().kind(), ErrorKind::Config);

    let ops = operations_from_json(OPERATIONS, services.type_mapper()).unwrap();
    let mut builder = services.batch_builder();
    builder.append_all(ops).unwrap();
    assert_eq!(builder.build().unwrap().round_trips(), 3);
}

#[test]
fn operations_file_renders_grouped_statements() {
    let registry = get_default_provider_registry();
    let services = ProviderServices::builder(registry.get("postgres").unwrap())
        .unwrap()
        .build()
        .unwrap();
    let ops = operations_from_json(OPERATIONS, services.type_mapper()).unwrap();
    assert_eq!(ops[0].values[0].1, TypedValue::text("O'Brien"));
    assert_eq!(ops[1].values[1].1, TypedValue::null(ColumnType::Boolean));

    let mut builder = services.batch_builder();
    builder.append_all(ops).unwrap();
    let batch = builder.build().unwrap();
    assert_eq!(batch.round_trips(), 2);
    assert_eq!(
        batch.to_sql(services.sql_helper().statement_terminator()),
        "INSERT INTO \"people\" (\"name\", \"active\") VALUES ($1, $2), ($3, $4) RETURNING \"id\";\n\
         DELETE FROM \"people\" WHERE \"id\" = $1;"
    );
}

#[test]
fn dialect_override_from_config() {
    let file = write_config(
        r#"
[dialect]
placeholder = "anonymous"
multi_row = false
"#,
    );
    let cfg = load_config_from_path(file.path()).unwrap().unwrap();
    let registry = get_default_provider_registry();
    let services = ProviderServices::from_config(&registry, &cfg, None).unwrap();
    assert_eq!(services.sql_helper().parameter_placeholder(3), "?");

    let ops = operations_from_json(OPERATIONS, services.type_mapper()).unwrap();
    let mut builder = services.batch_builder();
    builder.append_all(ops).unwrap();
    assert_eq!(builder.build().unwrap().round_trips(), 3);
}

#[test]
fn unknown_provider_is_a_config_error() {
    let file = write_config("[settings]\nprovider = \"oracle\"\n");
    let cfg = load_config_from_path(file.path()).unwrap().unwrap();
    let registry = get_default_provider_registry();
    let err = ProviderServices::from_config(&registry, &cfg, None).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn driverless_provider_cannot_connect() {
    let file = write_config("[settings]\nprovider = \"ansi\"\n");
    let cfg = load_config_from_path(file.path()).unwrap().unwrap();
    let registry = get_default_provider_registry();
    let err = ProviderServices::from_config(&registry, &cfg, Some("postgres://localhost/db"))
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn bad_operation_values_are_type_mismatches() {
    let registry = get_default_provider_registry();
    let services = ProviderServices::builder(registry.get("postgres").unwrap())
        .unwrap()
        .build()
        .unwrap();
    let json = r#"[{"kind": "insert", "table": "t",
                    "values": [{"column": "n", "type": "integer", "value": "forty-two"}]}]"#;
    let err = operations_from_json(json, services.type_mapper()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}
