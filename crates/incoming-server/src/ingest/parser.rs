//! Chunked CSV record parsing
//!
//! [`ChunkedRecords`] is a single-pass iterator over fixed-size
//! [`RawRecordBatch`]es. A record is malformed when its field count differs
//! from the header's or when its line leaves a quoted field open. Either way
//! it is captured as a [`BadLine`] and then dropped or padded into shape
//! depending on the [`BadLinePolicy`]. The text is line-oriented, so an open
//! quote never legitimately spans lines: the reader resumes on the line after
//! it. Only an error from the underlying reader ends the stream.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::RawRecordBatch;

/// What happens to a malformed record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BadLinePolicy {
    /// Drop the record
    #[default]
    Skip,
    /// Keep the record, padded with empty cells or truncated to the header width
    WarnAndInclude,
}

impl FromStr for BadLinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(BadLinePolicy::Skip),
            "warn" | "warn-and-include" | "warn_and_include" => Ok(BadLinePolicy::WarnAndInclude),
            other => Err(format!("unknown bad-line policy '{}' (expected skip or warn)", other)),
        }
    }
}

impl fmt::Display for BadLinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadLinePolicy::Skip => write!(f, "skip"),
            BadLinePolicy::WarnAndInclude => write!(f, "warn-and-include"),
        }
    }
}

/// A record that failed structural parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadLine {
    /// One-based line number in the cleaned text
    pub line_number: u64,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Header row is missing")]
    MissingHeader,

    #[error("Unreadable record stream near line {line}: {message}")]
    Stream { line: u64, message: String },
}

impl ParseError {
    fn from_csv(err: &csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        ParseError::Stream {
            line,
            message: err.to_string(),
        }
    }
}

/// Lazy sequence of raw record batches over one cleaned text
pub struct ChunkedRecords<'a> {
    text: &'a str,
    reader: csv::Reader<Cursor<&'a [u8]>>,
    headers: Vec<String>,
    chunk_size: usize,
    policy: BadLinePolicy,
    record: csv::StringRecord,
    next_index: usize,
    records_read: u64,
    rows_emitted: u64,
    rows_skipped: u64,
    bad_lines: Vec<BadLine>,
    finished: bool,
}

impl<'a> ChunkedRecords<'a> {
    /// Read the header and prepare to stream `text`
    pub fn new(text: &'a str, chunk_size: usize, policy: BadLinePolicy) -> Result<Self, ParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .quote(b'"')
            .double_quote(true)
            .from_reader(Cursor::new(text.as_bytes()));

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ParseError::from_csv(&e))?
            .iter()
            .map(str::to_string)
            .collect();

        if headers.is_empty() {
            return Err(ParseError::MissingHeader);
        }

        Ok(Self {
            text,
            reader,
            headers,
            chunk_size: chunk_size.max(1),
            policy,
            record: csv::StringRecord::new(),
            next_index: 0,
            records_read: 0,
            rows_emitted: 0,
            rows_skipped: 0,
            bad_lines: Vec::new(),
            finished: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data records read so far, header excluded
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    pub fn rows_skipped(&self) -> u64 {
        self.rows_skipped
    }

    pub fn bad_lines(&self) -> &[BadLine] {
        &self.bad_lines
    }

    pub fn take_bad_lines(&mut self) -> Vec<BadLine> {
        std::mem::take(&mut self.bad_lines)
    }

    /// Source line of the record just read, without its terminator
    ///
    /// Returns the line number, the line, and the byte offset of the next line
    /// when the record ran past its first line.
    fn current_line(&self) -> (u64, &'a str, Option<u64>) {
        let start = self.record.position().map(|p| p.byte()).unwrap_or(0);
        let end = self.reader.position().byte();
        let mut line_number = self.record.position().map(|p| p.line()).unwrap_or(0);

        let span = self
            .text
            .get(start as usize..end as usize)
            .unwrap_or_default();
        // Blank lines skipped by the reader precede the record itself
        let trimmed = span.trim_start_matches(['\r', '\n']);
        let skipped = &span[..span.len() - trimmed.len()];
        line_number += skipped.matches('\n').count() as u64;
        let line_start = start + skipped.len() as u64;

        let body = trimmed.trim_end_matches(['\r', '\n']);
        match body.find('\n') {
            Some(idx) => {
                let line = body[..idx].trim_end_matches('\r');
                (line_number, line, Some(line_start + idx as u64 + 1))
            },
            None => (line_number, body, None),
        }
    }

    /// Shape the current record into a row, or `None` if it is dropped
    fn accept_current(&mut self) -> Result<Option<Vec<String>>, ParseError> {
        let width = self.headers.len();
        let (line_number, line, resume_at) = self.current_line();

        let (mut row, reason) = if has_open_quote(line) {
            let row: Vec<String> = if resume_at.is_some() {
                split_unquoted(line)
            } else {
                self.record.iter().map(str::to_string).collect()
            };
            (row, Some("unbalanced quote".to_string()))
        } else {
            let row: Vec<String> = self.record.iter().map(str::to_string).collect();
            let found = row.len();
            let reason = (found != width)
                .then(|| format!("expected {} fields, found {}", width, found));
            (row, reason)
        };

        let Some(reason) = reason else {
            return Ok(Some(row));
        };

        warn!(line = line_number, reason = %reason, policy = %self.policy, "Malformed record");
        self.bad_lines.push(BadLine {
            line_number,
            raw: line.to_string(),
            reason,
        });

        if let Some(byte) = resume_at {
            self.resume_at(byte, line_number + 1)?;
        }

        match self.policy {
            BadLinePolicy::Skip => {
                self.rows_skipped += 1;
                Ok(None)
            },
            BadLinePolicy::WarnAndInclude => {
                row.resize(width, String::new());
                Ok(Some(row))
            },
        }
    }

    /// Restart reading at the line an open quote swallowed
    fn resume_at(&mut self, byte: u64, line: u64) -> Result<(), ParseError> {
        let mut pos = csv::Position::new();
        pos.set_byte(byte).set_line(line).set_record(self.records_read + 1);
        debug!(line, "Resuming after unbalanced quote");
        self.reader.seek(pos).map_err(|e| ParseError::from_csv(&e))
    }
}

/// Whether `line` ends inside a quoted field
///
/// A quote opens a field only as its first character; elsewhere it is
/// literal. Inside a quoted field `""` is an escaped quote.
fn has_open_quote(line: &str) -> bool {
    let mut in_quotes = false;
    let mut field_start = true;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
        } else if c == ',' {
            field_start = true;
            continue;
        } else if c == '"' && field_start {
            in_quotes = true;
        }
        field_start = false;
    }

    in_quotes
}

/// Plain split of a line the reader could not delimit
fn split_unquoted(line: &str) -> Vec<String> {
    line.split(',').map(str::to_string).collect()
}

impl Iterator for ChunkedRecords<'_> {
    type Item = Result<RawRecordBatch, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let first_row = self.rows_emitted + 1;
        let mut rows = Vec::with_capacity(self.chunk_size.min(1024));

        while rows.len() < self.chunk_size {
            match self.reader.read_record(&mut self.record) {
                Ok(true) => {
                    self.records_read += 1;
                    match self.accept_current() {
                        Ok(Some(row)) => rows.push(row),
                        Ok(None) => {},
                        Err(e) => {
                            self.finished = true;
                            return Some(Err(e));
                        },
                    }
                },
                Ok(false) => {
                    self.finished = true;
                    break;
                },
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ParseError::from_csv(&e)));
                },
            }
        }

        if rows.is_empty() {
            return None;
        }

        let batch = RawRecordBatch {
            headers: self.headers.clone(),
            rows,
            index: self.next_index,
            first_row,
        };
        self.next_index += 1;
        self.rows_emitted += batch.rows.len() as u64;
        debug!(chunk = batch.index, rows = batch.rows.len(), "Parsed chunk");

        Some(Ok(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str, chunk_size: usize, policy: BadLinePolicy) -> (Vec<RawRecordBatch>, ChunkedRecords<'_>) {
        let mut records = ChunkedRecords::new(text, chunk_size, policy).unwrap();
        let batches = records.by_ref().collect::<Result<Vec<_>, _>>().unwrap();
        (batches, records)
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("skip".parse::<BadLinePolicy>().unwrap(), BadLinePolicy::Skip);
        assert_eq!("WARN".parse::<BadLinePolicy>().unwrap(), BadLinePolicy::WarnAndInclude);
        assert_eq!(
            "warn-and-include".parse::<BadLinePolicy>().unwrap(),
            BadLinePolicy::WarnAndInclude
        );
        assert!("error".parse::<BadLinePolicy>().is_err());
    }

    #[test]
    fn test_full_chunks_then_remainder() {
        let mut text = String::from("id,agent\n");
        for i in 0..12 {
            text.push_str(&format!("{},agent{}\n", i, i));
        }

        let (batches, records) = collect(&text, 5, BadLinePolicy::Skip);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(batches[1].index, 1);
        assert_eq!(batches[1].first_row, 6);
        assert_eq!(batches[2].rows[1], vec!["11".to_string(), "agent11".to_string()]);
        assert_eq!(records.records_read(), 12);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let text = "id\n1\n2\n3\n4\n";
        let (batches, _) = collect(text, 2, BadLinePolicy::Skip);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn test_header_only_yields_nothing() {
        let (batches, records) = collect("id,agent\n", 10, BadLinePolicy::Skip);
        assert!(batches.is_empty());
        assert_eq!(records.headers(), &["id".to_string(), "agent".to_string()]);
    }

    #[test]
    fn test_skip_policy_conserves_rows() {
        let text = "a,b,c\n1,2,3\n4,5\n6,7,8\n9,10,11,12\n13,14,15\n";
        let (batches, records) = collect(text, 2, BadLinePolicy::Skip);

        let emitted: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(emitted, 3);
        assert_eq!(records.rows_skipped(), 2);
        assert_eq!(emitted as u64 + records.rows_skipped(), records.records_read());

        let bad = records.bad_lines();
        assert_eq!(bad.len(), 2);
        assert_eq!(bad[0].line_number, 3);
        assert_eq!(bad[0].raw, "4,5");
        assert_eq!(bad[0].reason, "expected 3 fields, found 2");
        assert_eq!(bad[1].line_number, 5);
    }

    #[test]
    fn test_warn_policy_includes_shaped_rows() {
        let text = "a,b,c\n1,2\n3,4,5,6\n";
        let (batches, records) = collect(text, 10, BadLinePolicy::WarnAndInclude);

        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].rows,
            vec![
                vec!["1".to_string(), "2".to_string(), String::new()],
                vec!["3".to_string(), "4".to_string(), "5".to_string()],
            ]
        );
        assert_eq!(records.bad_lines().len(), 2);
        assert_eq!(records.rows_skipped(), 0);
    }

    #[test]
    fn test_quoted_fields() {
        let text = "id,label\n1,\"Dupont, Jean\"\n2,\"il a dit \"\"oui\"\"\"\n";
        let (batches, records) = collect(text, 10, BadLinePolicy::Skip);
        assert!(records.bad_lines().is_empty());
        assert_eq!(batches[0].rows[0][1], "Dupont, Jean");
        assert_eq!(batches[0].rows[1][1], "il a dit \"oui\"");
    }

    #[test]
    fn test_open_quote_does_not_swallow_later_lines() {
        let text = "a,b\n1,\"open\n2,y\n3,z\n";
        let (batches, records) = collect(text, 10, BadLinePolicy::Skip);

        let rows: Vec<Vec<String>> = batches.into_iter().flat_map(|b| b.rows).collect();
        assert_eq!(
            rows,
            vec![
                vec!["2".to_string(), "y".to_string()],
                vec!["3".to_string(), "z".to_string()],
            ]
        );

        let bad = records.bad_lines();
        assert_eq!(bad.len(), 1);
        assert_eq!(bad[0].line_number, 2);
        assert_eq!(bad[0].raw, "1,\"open");
        assert_eq!(bad[0].reason, "unbalanced quote");
        assert_eq!(records.rows_skipped(), 1);
        assert_eq!(records.records_read(), 3);
    }

    #[test]
    fn test_open_quote_on_last_line() {
        let text = "a,b\n1,x\n2,\"y\n";
        let (batches, records) = collect(text, 10, BadLinePolicy::Skip);

        assert_eq!(batches[0].rows, vec![vec!["1".to_string(), "x".to_string()]]);
        assert_eq!(records.bad_lines()[0].line_number, 3);
        assert_eq!(records.bad_lines()[0].reason, "unbalanced quote");
    }

    #[test]
    fn test_open_quote_kept_under_warn_policy() {
        let text = "a,b,c\n1,\"open,2\n3,4,5\n";
        let (batches, records) = collect(text, 10, BadLinePolicy::WarnAndInclude);

        assert_eq!(
            batches[0].rows,
            vec![
                vec!["1".to_string(), "\"open".to_string(), "2".to_string()],
                vec!["3".to_string(), "4".to_string(), "5".to_string()],
            ]
        );
        assert_eq!(records.bad_lines().len(), 1);
        assert_eq!(records.rows_emitted(), 2);
    }

    #[test]
    fn test_several_open_quotes_in_a_row() {
        let text = "a,b\n1,\"x\n2,\"y\n3,z\n";
        let (batches, records) = collect(text, 1, BadLinePolicy::Skip);

        let emitted: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(emitted, 1);
        let lines: Vec<u64> = records.bad_lines().iter().map(|b| b.line_number).collect();
        assert_eq!(lines, vec![2, 3]);
        assert_eq!(emitted as u64 + records.rows_skipped(), records.records_read());
    }

    #[test]
    fn test_bad_line_keeps_source_text() {
        let text = "a,b,c\n\"x, y\",2\n1,2,3\n";
        let (_, records) = collect(text, 10, BadLinePolicy::Skip);

        let bad = records.bad_lines();
        assert_eq!(bad[0].raw, "\"x, y\",2");
        assert_eq!(bad[0].reason, "expected 3 fields, found 2");
    }

    #[test]
    fn test_crlf_and_blank_lines_keep_line_numbers() {
        let text = "a,b,c\r\n1,2,3\r\n\r\n4,5\r\n";
        let (_, records) = collect(text, 10, BadLinePolicy::Skip);

        let bad = records.bad_lines();
        assert_eq!(bad[0].line_number, 4);
        assert_eq!(bad[0].raw, "4,5");
    }

    #[test]
    fn test_has_open_quote() {
        assert!(!has_open_quote("1,2,3"));
        assert!(!has_open_quote("1,\"a, b\",3"));
        assert!(!has_open_quote("1,\"il dit \"\"oui\"\"\""));
        assert!(!has_open_quote("1,client \"presse,3"));
        assert!(has_open_quote("1,\"open"));
        assert!(has_open_quote("\"a\"\"b"));
    }

    #[test]
    fn test_take_bad_lines_drains() {
        let mut records = ChunkedRecords::new("a,b\n1\n", 10, BadLinePolicy::Skip).unwrap();
        assert!(records.next().is_none());
        assert_eq!(records.take_bad_lines().len(), 1);
        assert!(records.bad_lines().is_empty());
    }
}
