// CLI integration tests for schema-driven insert, scan, match and query flows.
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use serde_json::Value;

const SCHEMA: &str = r#"{"tables":[{
  "name": "orders",
  "columns": ["orderId", "customerId", "orderDate", "status", "amount", "noOfItem"],
  "indexes": {"by_status": ["status"], "status_by_date": ["status", "orderDate"]}
}]}"#;

fn cmd(dir: &Path) -> Command {
    let exe = env!("CARGO_BIN_EXE_tabula");
    let mut cmd = Command::new(exe);
    cmd.arg("--dir").arg(dir).env_remove("RUST_LOG");
    cmd
}

fn json_lines(output: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

fn stderr_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stderr);
    let line = text.lines().last().expect("stderr line");
    serde_json::from_str(line).expect("stderr json")
}

fn seeded_dir() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("schema.json"), SCHEMA).expect("schema");
    let insert = cmd(temp.path())
        .args([
            "insert",
            "orders",
            r#"{"orderId":100,"customerId":"1","orderDate":20200901,"status":"SHIPPED","amount":107.6,"noOfItem":5}"#,
            r#"{"orderId":101,"customerId":"2","orderDate":20200902,"status":"SHIPPED","amount":967.6,"noOfItem":15}"#,
            r#"{"orderId":102,"customerId":"1","orderDate":20201003,"status":"CANCEL","amount":767.6,"noOfItem":25}"#,
        ])
        .output()
        .expect("insert");
    assert!(insert.status.success(), "{}", String::from_utf8_lossy(&insert.stderr));
    let receipts = json_lines(&insert.stdout);
    assert_eq!(receipts.len(), 3);
    assert!(receipts.iter().all(|r| r["table"] == "orders" && r["key"].is_string()));
    temp
}

fn order_ids(rows: &[Value], field: &str) -> Vec<i64> {
    rows.iter()
        .map(|row| row[field].as_i64().expect("orderId"))
        .collect()
}

#[test]
fn tables_and_desc_report_schema() {
    let temp = seeded_dir();
    let tables = cmd(temp.path()).arg("tables").output().expect("tables");
    assert!(tables.status.success());
    let tables = json_lines(&tables.stdout);
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0]["table"], "orders");
    assert_eq!(tables[0]["rows"], 3);
    assert_eq!(tables[0]["indexes"], serde_json::json!(["by_status", "status_by_date"]));

    let desc = cmd(temp.path()).args(["desc", "orders"]).output().expect("desc");
    let desc = json_lines(&desc.stdout);
    assert_eq!(desc[0]["columns"][0], "orderId");
    assert_eq!(desc[0]["columns"][5], "noOfItem");
}

#[test]
fn rows_persist_across_invocations() {
    let temp = seeded_dir();
    let scan = cmd(temp.path()).args(["scan", "orders"]).output().expect("scan");
    assert!(scan.status.success());
    let rows: Vec<Value> = json_lines(&scan.stdout)
        .into_iter()
        .map(|line| line["row"].clone())
        .collect();
    assert_eq!(order_ids(&rows, "orderId"), vec![100, 101, 102]);

    let limited = cmd(temp.path())
        .args(["scan", "orders", "--limit", "1"])
        .output()
        .expect("scan");
    assert_eq!(json_lines(&limited.stdout).len(), 1);
}

#[test]
fn match_by_prefix_and_exact() {
    let temp = seeded_dir();
    let prefix = cmd(temp.path())
        .args(["match", "orders", "status_by_date", "SHIPPED#202009"])
        .output()
        .expect("match");
    assert!(prefix.status.success());
    assert_eq!(order_ids(&json_lines(&prefix.stdout), "orderId"), vec![100, 101]);

    let exact = cmd(temp.path())
        .args(["match", "orders", "by_status", "SHIP", "--exact"])
        .output()
        .expect("match");
    assert!(json_lines(&exact.stdout).is_empty());

    let unknown = cmd(temp.path())
        .args(["match", "orders", "by_size", "XL"])
        .output()
        .expect("match");
    assert_eq!(unknown.status.code(), Some(5));
    assert_eq!(stderr_json(&unknown)["error"]["kind"], "UnknownIndex");
}

#[test]
fn query_streams_matching_rows() {
    let temp = seeded_dir();
    let query = cmd(temp.path())
        .args([
            "query",
            "select * from orders where (status='PENDING' or status='SHIPPED') and orderdate=20200902",
        ])
        .output()
        .expect("query");
    assert!(query.status.success());
    let rows = json_lines(&query.stdout);
    assert_eq!(order_ids(&rows, "orderId"), vec![101]);
    let keys: Vec<&String> = rows[0].as_object().expect("object").keys().collect();
    assert_eq!(
        keys,
        vec!["orderId", "customerId", "orderDate", "status", "amount", "noOfItem"]
    );
}

#[test]
fn query_errors_are_json_with_exit_codes() {
    let temp = seeded_dir();
    let syntax = cmd(temp.path())
        .args(["query", "SELECT * FROM orders WHERE (status="])
        .output()
        .expect("query");
    assert_eq!(syntax.status.code(), Some(6));
    assert!(syntax.stdout.is_empty());
    let err = stderr_json(&syntax);
    assert_eq!(err["error"]["kind"], "QuerySyntax");
    assert_eq!(err["error"]["position"], 35);

    let unknown = cmd(temp.path())
        .args(["query", "SELECT * FROM invoices"])
        .output()
        .expect("query");
    assert_eq!(unknown.status.code(), Some(4));
    assert_eq!(stderr_json(&unknown)["error"]["kind"], "UnknownTable");
}

#[test]
fn insert_reads_json_lines_from_stdin() {
    let temp = seeded_dir();
    let mut child = cmd(temp.path())
        .args(["insert", "orders", "--errors", "skip"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"{\"orderId\":103,\"status\":\"PENDING\"}\nnot json\n\n{\"orderId\":104,\"status\":\"PENDING\"}\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");
    assert_eq!(output.status.code(), Some(2));
    assert_eq!(json_lines(&output.stdout).len(), 2);

    let pending = cmd(temp.path())
        .args(["query", "SELECT * FROM orders WHERE status='PENDING'"])
        .output()
        .expect("query");
    assert_eq!(order_ids(&json_lines(&pending.stdout), "orderId"), vec![103, 104]);
}

#[test]
fn usage_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing_schema = cmd(temp.path())
        .args(["--schema", "/nonexistent/schema.json", "tables"])
        .output()
        .expect("tables");
    assert_eq!(missing_schema.status.code(), Some(2));

    let no_table = cmd(temp.path())
        .args(["insert", "orders", "{}"])
        .output()
        .expect("insert");
    assert_eq!(no_table.status.code(), Some(4));

    std::fs::write(temp.path().join("schema.json"), SCHEMA).expect("schema");
    let not_object = cmd(temp.path())
        .args(["insert", "orders", "[1,2]"])
        .output()
        .expect("insert");
    assert_eq!(not_object.status.code(), Some(2));
    assert_eq!(stderr_json(&not_object)["error"]["message"], "row must be a JSON object");
}
