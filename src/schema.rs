//! Purpose: Load the CLI's JSON schema file and turn each entry into a `TableDef<Value>`.
//! Exports: `SchemaFile`, `TableSchema`, `load_schema`, `SCHEMA_FILE_NAME`.
//! Role: Gives the CLI typed-enough tables over free-form JSON rows.
//! Invariants: Columns extract top-level fields; an index joins its fields with `#`.
//! Invariants: Missing or null fields project as empty text.
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tabula::api::{Error, ErrorKind, ScalarValue, TableDef};

/// Looked up inside `--dir` when `--schema` is not given.
pub const SCHEMA_FILE_NAME: &str = "schema.json";

const INDEX_FIELD_SEPARATOR: &str = "#";

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    pub tables: Vec<TableSchema>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    /// Index name to the row fields it concatenates.
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<String>>,
}

impl TableSchema {
    pub fn to_def(&self) -> Result<TableDef<Value>, Error> {
        let mut def = TableDef::new(self.name.clone());
        for column in &self.columns {
            let field = column.clone();
            def = def.column(column.clone(), move |row: &Value| scalar_field(row, &field));
        }
        for (index, fields) in &self.indexes {
            if fields.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("index `{index}` lists no fields"))
                    .with_table(&self.name)
                    .with_index(index));
            }
            let fields = fields.clone();
            def = def.index(index.clone(), move |row: &Value| index_value(row, &fields));
        }
        Ok(def)
    }
}

pub fn load_schema(path: &Path) -> Result<SchemaFile, Error> {
    let text = fs::read_to_string(path).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::Usage
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to read schema file")
            .with_path(path)
            .with_source(err)
    })?;
    serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid schema: {err}"))
            .with_path(path)
            .with_hint(r#"Expected {"tables":[{"name":"t","columns":["a"],"indexes":{"by_a":["a"]}}]}."#)
    })
}

fn scalar_field(row: &Value, field: &str) -> ScalarValue {
    match row.get(field) {
        Some(Value::Number(number)) => match number.as_i64() {
            Some(int) => ScalarValue::Int(int),
            None => ScalarValue::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        Some(value) => ScalarValue::Text(field_text(value)),
        None => ScalarValue::Text(String::new()),
    }
}

fn index_value(row: &Value, fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| row.get(field).map(field_text).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(INDEX_FIELD_SEPARATOR)
}

fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{SchemaFile, index_value, load_schema, scalar_field};
    use serde_json::json;
    use std::io::Write;
    use tabula::api::{ErrorKind, ScalarValue};

    #[test]
    fn fields_project_to_tagged_scalars() {
        let row = json!({"id": 7, "amount": 1.5, "status": "NEW", "gift": true, "note": null});
        assert_eq!(scalar_field(&row, "id"), ScalarValue::Int(7));
        assert_eq!(scalar_field(&row, "amount"), ScalarValue::Float(1.5));
        assert_eq!(scalar_field(&row, "status"), ScalarValue::from("NEW"));
        assert_eq!(scalar_field(&row, "gift"), ScalarValue::from("true"));
        assert_eq!(scalar_field(&row, "note"), ScalarValue::from(""));
        assert_eq!(scalar_field(&row, "missing"), ScalarValue::from(""));
    }

    #[test]
    fn index_values_join_fields() {
        let row = json!({"status": "SHIPPED", "orderDate": 20200901});
        let fields = vec!["status".to_string(), "orderDate".to_string()];
        assert_eq!(index_value(&row, &fields), "SHIPPED#20200901");
        let fields = vec!["status".to_string(), "missing".to_string()];
        assert_eq!(index_value(&row, &fields), "SHIPPED#");
    }

    #[test]
    fn schema_file_round_trip_and_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schema.json");
        let mut file = std::fs::File::create(&path).expect("create");
        write!(
            file,
            r#"{{"tables":[{{"name":"orders","columns":["orderId","status"],
               "indexes":{{"by_status":["status"]}}}}]}}"#
        )
        .expect("write");
        drop(file);

        let schema: SchemaFile = load_schema(&path).expect("load");
        assert_eq!(schema.tables.len(), 1);
        let def = schema.tables[0].to_def().expect("def");
        assert_eq!(def.name(), "orders");

        std::fs::write(&path, r#"{"tables":[{"name":"t","colums":[]}]}"#).expect("write");
        let err = load_schema(&path).expect_err("typo");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let err = load_schema(&dir.path().join("absent.json")).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.path().is_some());
    }
}
