//! Purpose: Hold top-level CLI command dispatch for `tabula`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every command writes JSON lines to stdout and nothing else.
//! Invariants: Limits default to the session's `--default-limit`.

use super::*;
use crate::ingest::{ErrorPolicy, IngestConfig, ingest_rows};

pub(super) fn dispatch_command(command: Command, session: &Session) -> Result<RunOutcome, Error> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match command {
        Command::Tables => {
            for (name, table) in &session.tables {
                emit_json(&mut out, &table_json(name, table)?)?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Desc { table } => {
            let handle = session.table(&table)?;
            emit_json(&mut out, &table_json(&table, handle)?)?;
            Ok(RunOutcome::ok())
        }
        Command::Insert {
            table,
            rows,
            errors,
        } => {
            let handle = session.table(&table)?;
            if rows.is_empty() {
                return insert_from_stdin(&mut out, handle, errors);
            }
            let parsed = rows
                .iter()
                .map(|text| parse_inline_row(text))
                .collect::<Result<Vec<_>, _>>()?;
            for row in &parsed {
                let key = handle.insert(row)?;
                emit_json(&mut out, &json!({ "table": table, "key": key }))?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Scan { table, limit } => {
            let handle = session.table(&table)?;
            let limit = limit.unwrap_or(session.default_limit);
            handle.scan_while(limit, |key, row| {
                emit_json(&mut out, &json!({ "key": key, "row": row }))?;
                Ok(true)
            })?;
            Ok(RunOutcome::ok())
        }
        Command::Match {
            table,
            index,
            value,
            limit,
            exact,
        } => {
            let handle = session.table(&table)?;
            let limit = limit.unwrap_or(session.default_limit);
            let mut rows = Vec::new();
            if exact {
                handle.match_exact(&index, &value, limit, |row| rows.push(row))?;
            } else {
                handle.match_into(&index, &value, limit, &mut rows)?;
            }
            for row in &rows {
                emit_json(&mut out, row)?;
            }
            Ok(RunOutcome::ok())
        }
        Command::Query { sql } => {
            session
                .db
                .execute_with(&sql, |row| emit_json(&mut out, &row.to_json()))?;
            Ok(RunOutcome::ok())
        }
        Command::Completion { .. } => Err(Error::new(ErrorKind::Internal)
            .with_message("completion is handled before the database opens")),
    }
}

fn table_json(name: &str, table: &Table<Value>) -> Result<Value, Error> {
    Ok(json!({
        "table": name,
        "columns": table.desc(),
        "indexes": table.index_names(),
        "rows": table.len()?,
    }))
}

fn parse_inline_row(text: &str) -> Result<Value, Error> {
    let value: Value = serde_json::from_str(text).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid json")
            .with_hint("Provide each row as a JSON object (e.g. '{\"orderId\":100}').")
            .with_source(err)
    })?;
    if !value.is_object() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("row must be a JSON object")
            .with_hint("Provide each row as a JSON object (e.g. '{\"orderId\":100}')."));
    }
    Ok(value)
}

fn insert_from_stdin(
    out: &mut impl Write,
    table: &Table<Value>,
    errors: ErrorPolicyCli,
) -> Result<RunOutcome, Error> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("no rows given")
            .with_hint("Pass rows as arguments or pipe JSON lines on stdin."));
    }
    let config = IngestConfig {
        errors: match errors {
            ErrorPolicyCli::Stop => ErrorPolicy::Stop,
            ErrorPolicyCli::Skip => ErrorPolicy::Skip,
        },
        ..IngestConfig::default()
    };
    let outcome = ingest_rows(
        stdin.lock(),
        config,
        |row| {
            let key = table.insert(&row)?;
            emit_json(&mut *out, &json!({ "table": table.name(), "key": key }))
        },
        |failure| {
            tracing::warn!(
                line = failure.line,
                snippet = %failure.snippet,
                "skipped row: {}",
                failure.message
            );
        },
    )?;
    if outcome.failed > 0 {
        return Ok(RunOutcome::with_code(to_exit_code(ErrorKind::Usage)));
    }
    Ok(RunOutcome::ok())
}
