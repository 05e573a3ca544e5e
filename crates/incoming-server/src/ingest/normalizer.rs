//! Row normalization
//!
//! A normalizer turns a raw chunk into a cleaned one. It must be pure and
//! keep row order; it may rewrite cells and drop rows.

use std::collections::HashMap;

use super::models::{CleanedRecordBatch, CleanedRow, RawRecordBatch};

/// Cell values treated as missing
pub const NULL_MARKERS: [&str; 3] = ["", "NA", "NULL"];

pub trait RowNormalizer: Send + Sync {
    fn normalize(&self, batch: RawRecordBatch, source_file: &str) -> CleanedRecordBatch;
}

/// Default rules
///
/// - column names: trimmed, lower-cased, non-alphanumeric runs become `_`,
///   duplicates get a numeric suffix
/// - cells: trimmed, null markers become `None`
/// - rows with no value left are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNormalizer;

impl RowNormalizer for StandardNormalizer {
    fn normalize(&self, batch: RawRecordBatch, source_file: &str) -> CleanedRecordBatch {
        let columns = normalize_columns(&batch.headers);
        let first_row = batch.first_row;

        let rows = batch
            .rows
            .into_iter()
            .enumerate()
            .filter_map(|(offset, row)| {
                let cells: Vec<Option<String>> = row.into_iter().map(normalize_cell).collect();
                cells.iter().any(Option::is_some).then(|| CleanedRow {
                    number: first_row + offset as u64,
                    cells,
                })
            })
            .collect();

        CleanedRecordBatch {
            source_file: source_file.to_string(),
            columns,
            rows,
            index: batch.index,
        }
    }
}

pub fn normalize_cell(cell: String) -> Option<String> {
    let trimmed = cell.trim();
    if NULL_MARKERS.contains(&trimmed) {
        None
    } else if trimmed.len() == cell.len() {
        Some(cell)
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_column_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(c);
        } else {
            pending_separator = true;
        }
    }
    out
}

fn normalize_columns(headers: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let mut name = normalize_column_name(header);
            if name.is_empty() {
                name = format!("column_{}", i + 1);
            }
            let count = seen.entry(name.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                format!("{}_{}", name, count)
            } else {
                name
            }
        })
        .collect()
}
