//! Removal of the free-text comment column
//!
//! Agents type anything into the comment column, unbalanced quotes included,
//! which derails structured parsing. The column is cut off positionally
//! before the CSV reader sees the text: every line is split on `,` and
//! truncated at the header's comment index. The cut is not quote-aware.

use encoding_rs::Encoding;
use thiserror::Error;

use super::config::COMMENT_COLUMN;

const DELIMITER: char = ',';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StripError {
    #[error("Input is empty after decoding")]
    EmptyInput,
}

#[derive(Debug, Clone)]
pub struct CommentStripper {
    column: String,
}

impl Default for CommentStripper {
    fn default() -> Self {
        Self::new(COMMENT_COLUMN)
    }
}

impl CommentStripper {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }

    /// Decode `raw` and drop the comment column and everything after it
    ///
    /// Undecodable bytes become U+FFFD. Text without the comment header comes
    /// back exactly as decoded.
    pub fn strip(&self, raw: &[u8], encoding: &'static Encoding) -> Result<String, StripError> {
        let (decoded, _, had_errors) = encoding.decode(raw);
        if had_errors {
            tracing::warn!(
                encoding = encoding.name(),
                "Undecodable bytes replaced while decoding"
            );
        }

        let Some(header) = decoded.lines().next() else {
            return Err(StripError::EmptyInput);
        };

        let Some(cut) = header.split(DELIMITER).position(|field| field == self.column) else {
            return Ok(decoded.into_owned());
        };

        Ok(cut_lines(&decoded, cut))
    }
}

fn cut_lines(text: &str, cut: usize) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(cut_line(line, cut));
    }
    out
}

fn cut_line(line: &str, cut: usize) -> &str {
    if cut == 0 {
        return "";
    }
    // Field `cut` starts right after delimiter number `cut - 1`
    match line.match_indices(DELIMITER).nth(cut - 1) {
        Some((at, _)) => &line[..at],
        None => line,
    }
}
