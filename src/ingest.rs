//! Purpose: Read JSON-lines row input for `tabula insert` with an explicit error policy.
//! Exports: `ErrorPolicy`, `IngestConfig`, `IngestOutcome`, `IngestFailure`, `ingest_rows`.
//! Role: Input ingestion used by the CLI; keeps line handling out of command dispatch.
//! Invariants: Blank lines are ignored; every other line is exactly one JSON object.
//! Invariants: Skip mode continues at the next line; per-line buffering is capped.
use std::io::{BufRead, BufReader, Read};

use bstr::ByteSlice;
use serde_json::Value;
use tabula::api::{Error, ErrorKind};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorPolicy {
    Stop,
    Skip,
}

#[derive(Copy, Clone, Debug)]
pub struct IngestConfig {
    pub errors: ErrorPolicy,
    pub max_record_bytes: usize,
    pub max_snippet_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            errors: ErrorPolicy::Stop,
            max_record_bytes: 1024 * 1024,
            max_snippet_bytes: 80,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IngestOutcome {
    pub records_total: u64,
    pub ok: u64,
    pub failed: u64,
}

#[derive(Clone, Debug)]
pub struct IngestFailure {
    pub line: u64,
    pub message: String,
    pub snippet: String,
}

/// Feeds every JSON object line of `reader` to `on_row`.
///
/// Errors returned by `on_row` always stop ingestion; malformed lines follow `config.errors`.
pub fn ingest_rows<R, F, N>(
    reader: R,
    config: IngestConfig,
    mut on_row: F,
    mut on_failure: N,
) -> Result<IngestOutcome, Error>
where
    R: Read,
    F: FnMut(Value) -> Result<(), Error>,
    N: FnMut(IngestFailure),
{
    let mut reader = BufReader::new(reader);
    let mut outcome = IngestOutcome::default();
    let mut buf = Vec::new();
    let mut line_no = 0u64;

    loop {
        buf.clear();
        let read = read_capped_line(&mut reader, &mut buf, config.max_record_bytes)?;
        let Some(overflowed) = read else {
            break;
        };
        line_no += 1;
        let line = buf.trim();
        if line.is_empty() {
            continue;
        }
        outcome.records_total += 1;

        let parsed = if overflowed {
            Err(format!("line exceeds {} bytes", config.max_record_bytes))
        } else {
            parse_row(line)
        };
        match parsed {
            Ok(row) => {
                on_row(row)?;
                outcome.ok += 1;
            }
            Err(message) => {
                let failure = IngestFailure {
                    line: line_no,
                    message,
                    snippet: truncate_snippet(line, config.max_snippet_bytes),
                };
                match config.errors {
                    ErrorPolicy::Stop => {
                        return Err(Error::new(ErrorKind::Usage)
                            .with_message(format!("line {}: {}", failure.line, failure.message))
                            .with_hint("Use --errors skip to continue past malformed lines."));
                    }
                    ErrorPolicy::Skip => {
                        outcome.failed += 1;
                        on_failure(failure);
                    }
                }
            }
        }
    }

    Ok(outcome)
}

fn parse_row(line: &[u8]) -> Result<Value, String> {
    match serde_json::from_slice::<Value>(line) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("row must be a JSON object".to_string()),
        Err(err) => Err(format!("invalid json: {err}")),
    }
}

/// Reads one line into `buf`, keeping at most `cap + 1` bytes of it.
/// Returns `None` at end of input, otherwise whether the line overflowed `cap`.
fn read_capped_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    cap: usize,
) -> Result<Option<bool>, Error> {
    let mut saw_any = false;
    loop {
        let available = reader.fill_buf().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read stdin")
                .with_source(err)
        })?;
        if available.is_empty() {
            return Ok(saw_any.then_some(buf.len() > cap));
        }
        saw_any = true;
        let (chunk, done) = match available.find_byte(b'\n') {
            Some(pos) => (&available[..pos], Some(pos + 1)),
            None => (available, None),
        };
        let room = (cap + 1).saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        let consumed = done.unwrap_or(available.len());
        reader.consume(consumed);
        if done.is_some() {
            return Ok(Some(buf.len() > cap));
        }
    }
}

fn truncate_snippet(line: &[u8], max: usize) -> String {
    let text = line.to_str_lossy();
    if text.chars().count() <= max {
        return text.into_owned();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
