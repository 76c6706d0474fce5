//! Purpose: Execute one SQL statement against a catalog of tables.
//! Exports: `Catalog`, `execute`.
//! Role: Stateless parse-then-scan cycle; no statement caching and no index assistance.
//! Invariants: Rows are visited in primary-key order and delivered only if the predicate holds.
//! Invariants: Delivery stops once the effective limit is reached; rows delivered before an
//! error stay delivered.
use std::sync::Arc;

use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::QueryTarget;
use crate::core::value::RowView;
use crate::query::predicate::Predicate;
use crate::query::statement::{parse_statement, Statement};

/// Name-to-table resolution used by [`execute`].
pub trait Catalog {
    fn target(&self, name: &str) -> Option<Arc<dyn QueryTarget>>;
}

/// Runs `sql` and hands each matching row to `on_row`; returns the delivered row count.
///
/// `default_limit` applies when the statement has no LIMIT clause.
pub fn execute(
    catalog: &dyn Catalog,
    sql: &str,
    default_limit: usize,
    on_row: &mut dyn FnMut(RowView) -> Result<(), Error>,
) -> Result<usize, Error> {
    let Statement {
        table,
        table_pos,
        predicate,
        limit,
    } = parse_statement(sql)?;

    let target = catalog.target(&table).ok_or_else(|| {
        Error::new(ErrorKind::UnknownTable)
            .with_message(format!("no table named `{table}`"))
            .with_table(&table)
            .with_position(table_pos)
    })?;
    let columns = target.columns();
    if let Some(predicate) = &predicate {
        check_columns(predicate, &columns, &table)?;
    }

    let limit = limit.unwrap_or(default_limit);
    debug!(
        table = %table,
        filtered = predicate.is_some(),
        limit,
        "executing query"
    );
    if limit == 0 {
        return Ok(0);
    }

    let mut delivered = 0usize;
    target.scan_rows(usize::MAX, &mut |row| {
        if predicate.as_ref().is_none_or(|predicate| predicate.evaluate(&row)) {
            on_row(row)?;
            delivered += 1;
        }
        Ok(delivered < limit)
    })?;
    Ok(delivered)
}

fn check_columns(predicate: &Predicate, columns: &[String], table: &str) -> Result<(), Error> {
    let mut unknown = None;
    predicate.for_each_column(&mut |column, pos| {
        let known = columns.iter().any(|name| name.eq_ignore_ascii_case(column));
        if !known && unknown.is_none() {
            unknown = Some((column.to_string(), pos));
        }
    });
    match unknown {
        Some((column, pos)) => Err(Error::syntax(pos, format!("unknown column `{column}`"))
            .with_table(table)
            .with_hint(format!("Columns: {}.", columns.join(", ")))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::{execute, Catalog};
    use crate::core::error::{Error, ErrorKind};
    use crate::core::keys::Sequence;
    use crate::core::store::MemoryProvider;
    use crate::core::table::{QueryTarget, Table, TableDef};
    use crate::core::value::RowView;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Clone, Debug, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: i64,
    }

    struct OneTable(Arc<dyn QueryTarget>);

    impl Catalog for OneTable {
        fn target(&self, name: &str) -> Option<Arc<dyn QueryTarget>> {
            (name == self.0.name()).then(|| Arc::clone(&self.0))
        }
    }

    fn catalog() -> OneTable {
        catalog_of(&[("a", 1), ("b", 2), ("a", 3), ("c", 1)])
    }

    fn catalog_of(rows: &[(&str, i64)]) -> OneTable {
        let def = TableDef::new("readings")
            .column("sensor", |row: &Reading| row.sensor.clone())
            .column("value", |row: &Reading| row.value)
            .key_generator(Sequence::default());
        let table = Table::open(def, &MemoryProvider).expect("open");
        for &(sensor, value) in rows {
            table
                .insert(&Reading {
                    sensor: sensor.to_string(),
                    value,
                })
                .expect("insert");
        }
        OneTable(Arc::new(table))
    }

    fn run(catalog: &OneTable, sql: &str, default_limit: usize) -> Result<Vec<i64>, Error> {
        let mut values = Vec::new();
        execute(catalog, sql, default_limit, &mut |row: RowView| {
            values.push(row.get_i64("value").unwrap_or(-1));
            Ok(())
        })?;
        Ok(values)
    }

    #[test]
    fn filters_in_primary_key_order() {
        let catalog = catalog();
        let values = run(&catalog, "SELECT * FROM readings WHERE sensor='a'", 100).expect("query");
        assert_eq!(values, vec![1, 3]);
        let values = run(&catalog, "SELECT * FROM readings WHERE VALUE=1", 100).expect("query");
        assert_eq!(values, vec![1, 1]);
    }

    #[test]
    fn quoted_literals_compare_exact_text() {
        let catalog = catalog_of(&[("7", 1), ("007", 2)]);
        let values = run(&catalog, "SELECT * FROM readings WHERE sensor='007'", 10).expect("q");
        assert_eq!(values, vec![2]);
        let values = run(&catalog, "SELECT * FROM readings WHERE sensor=7", 10).expect("q");
        assert_eq!(values, vec![1, 2]);
        let values = run(&catalog, "SELECT * FROM readings WHERE value='1.0'", 10).expect("q");
        assert!(values.is_empty());
    }

    #[test]
    fn explicit_and_default_limits() {
        let catalog = catalog();
        assert_eq!(run(&catalog, "SELECT * FROM readings LIMIT 2", 100).expect("q"), vec![1, 2]);
        assert_eq!(run(&catalog, "SELECT * FROM readings", 3).expect("q"), vec![1, 2, 3]);
        assert!(run(&catalog, "SELECT * FROM readings LIMIT 0", 100).expect("q").is_empty());
    }

    #[test]
    fn unknown_table_and_column() {
        let catalog = catalog();
        let err = run(&catalog, "SELECT * FROM nope", 10).expect_err("unknown table");
        assert_eq!(err.kind(), ErrorKind::UnknownTable);
        assert_eq!(err.table(), Some("nope"));

        let err = run(&catalog, "SELECT * FROM readings WHERE colour='red'", 10)
            .expect_err("unknown column");
        assert_eq!(err.kind(), ErrorKind::QuerySyntax);
        assert_eq!(err.position(), Some(29));
    }

    #[test]
    fn callback_error_stops_delivery() {
        let catalog = catalog();
        let mut seen = 0;
        let err = execute(&catalog, "SELECT * FROM readings", 100, &mut |_| {
            seen += 1;
            if seen == 2 {
                return Err(Error::new(ErrorKind::Io).with_message("sink closed"));
            }
            Ok(())
        })
        .expect_err("callback error");
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(seen, 2);
    }
}
