//! Sparse line diffs and the patch engine
//!
//! A commit of a text file is stored as a [`DiffRecord`]: the line count of
//! the new content plus one row per position whose line differs from the
//! content being patched. Positions without a row are copied from the
//! source, and positions past `total_lines` are dropped. A shrinking file is
//! therefore expressed by the header alone, even when no row is emitted.
//!
//! ## On-disk format
//!
//! ```text
//! <total_lines>\n
//! <line> @@@ <base64 line>\n      (zero or more, 1-based, strictly increasing)
//! ```
//!
//! ## Examples
//!
//! ```rust
//! use qwe::diff::{compute, DiffRecord};
//! use qwe::utils::split_lines;
//!
//! let old = split_lines(b"x\ny\nz\n");
//! let new = split_lines(b"x\nY\n");
//!
//! let record = compute(&old, &new);
//! assert_eq!(record.total_lines, 2);
//! assert_eq!(record.rows.len(), 1);
//!
//! let stored = record.to_bytes();
//! let parsed = DiffRecord::parse(&stored, "example").unwrap();
//! assert_eq!(parsed.apply(&old, "example").unwrap(), new);
//! ```

use crate::codec::{decode_line, encode_line};
use crate::error::{QweError, Result};
use std::borrow::Cow;

/// Separator between a row's line number and its token
const ROW_SEPARATOR: &str = " @@@ ";

/// One replaced line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRow {
    /// 1-based position in the target content
    pub line: usize,
    /// Raw line bytes (encoded only when serialized)
    pub content: Vec<u8>,
}

/// Sparse line patch between two versions of a text file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRecord {
    /// Number of lines in the target content
    pub total_lines: usize,
    /// Replaced lines, ordered by position
    pub rows: Vec<DiffRow>,
}

/// Compute the diff that turns `old` into `new`
///
/// Lines are compared position by position over the length of `new`; every
/// position where `old` differs (or has run out) gets a row.
pub fn compute(old: &[Vec<u8>], new: &[Vec<u8>]) -> DiffRecord {
    let rows = new
        .iter()
        .enumerate()
        .filter(|(i, line)| old.get(*i) != Some(*line))
        .map(|(i, line)| DiffRow {
            line: i + 1,
            content: line.clone(),
        })
        .collect();

    DiffRecord {
        total_lines: new.len(),
        rows,
    }
}

impl DiffRecord {
    /// Whether applying this record to `source_len` lines changes nothing
    ///
    /// Both conditions matter: a record with no rows but a smaller header
    /// still truncates its source.
    pub fn is_noop(&self, source_len: usize) -> bool {
        self.rows.is_empty() && self.total_lines == source_len
    }

    /// Replay this record over `source`
    ///
    /// `object` names the record in errors.
    ///
    /// # Errors
    ///
    /// Returns [`QweError::CorruptDiff`] when a copied position does not
    /// exist in `source`, or when rows are out of order or past the header.
    pub fn apply(&self, source: &[Vec<u8>], object: &str) -> Result<Vec<Vec<u8>>> {
        let mut output = Vec::with_capacity(self.total_lines);
        let mut rows = self.rows.iter().peekable();
        let mut last_row = 0;

        for position in 1..=self.total_lines {
            match rows.peek() {
                Some(row) if row.line == position => {
                    output.push(row.content.clone());
                    last_row = row.line;
                    rows.next();
                }
                Some(row) if row.line <= last_row => {
                    return Err(QweError::corrupt_diff(
                        object,
                        format!("row {} is out of order", row.line),
                    ));
                }
                _ => {
                    let line = source.get(position - 1).ok_or_else(|| {
                        QweError::corrupt_diff(
                            object,
                            format!(
                                "line {} is copied from a source with only {} lines",
                                position,
                                source.len()
                            ),
                        )
                    })?;
                    output.push(line.clone());
                }
            }
        }

        if let Some(row) = rows.next() {
            return Err(QweError::corrupt_diff(
                object,
                format!("row {} is outside the {} declared lines", row.line, self.total_lines),
            ));
        }

        Ok(output)
    }

    /// Serialize to the on-disk text form
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("{}\n", self.total_lines);
        for row in &self.rows {
            out.push_str(&row.line.to_string());
            out.push_str(ROW_SEPARATOR);
            out.push_str(&encode_line(&row.content));
            out.push('\n');
        }
        out.into_bytes()
    }

    /// Parse the on-disk text form
    ///
    /// # Errors
    ///
    /// - [`QweError::CorruptDiff`] for a bad header, a malformed row, or
    ///   row numbers that are not strictly increasing within `1..=total_lines`
    /// - [`QweError::Decode`] for a row whose token is not valid base64
    pub fn parse(bytes: &[u8], object: &str) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| QweError::corrupt_diff(object, format!("not UTF-8: {}", e)))?;
        let text = text.strip_suffix('\n').unwrap_or(text);
        let mut lines = text.split('\n');

        let header = lines.next().unwrap_or_default();
        let total_lines: usize = header
            .trim()
            .parse()
            .map_err(|_| QweError::corrupt_diff(object, format!("bad header '{}'", header)))?;

        let mut rows = Vec::new();
        let mut previous = 0;
        for raw in lines {
            let (number, token) = raw
                .split_once(ROW_SEPARATOR)
                .ok_or_else(|| QweError::corrupt_diff(object, format!("malformed row '{}'", raw)))?;
            let line: usize = number
                .parse()
                .map_err(|_| QweError::corrupt_diff(object, format!("bad line number '{}'", number)))?;
            if line <= previous || line > total_lines {
                return Err(QweError::corrupt_diff(
                    object,
                    format!("row {} out of range or order (header {})", line, total_lines),
                ));
            }
            previous = line;
            rows.push(DiffRow {
                line,
                content: decode_line(token)?,
            });
        }

        Ok(Self { total_lines, rows })
    }
}

/// One position that differs between two versions, for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineChange {
    /// 1-based position
    pub line: usize,
    /// Line on the older side, if it has one at this position
    pub old: Option<Vec<u8>>,
    /// Line on the newer side, if it has one at this position
    pub new: Option<Vec<u8>>,
}

impl LineChange {
    /// Older side as text (lossy for non-UTF-8 lines)
    pub fn old_text(&self) -> Option<Cow<'_, str>> {
        self.old.as_deref().map(String::from_utf8_lossy)
    }

    /// Newer side as text (lossy for non-UTF-8 lines)
    pub fn new_text(&self) -> Option<Cow<'_, str>> {
        self.new.as_deref().map(String::from_utf8_lossy)
    }
}

/// Positional comparison over both sides
///
/// Unlike [`compute`], lines that exist only in `old` are reported as removals.
pub fn line_changes(old: &[Vec<u8>], new: &[Vec<u8>]) -> Vec<LineChange> {
    (0..old.len().max(new.len()))
        .filter_map(|i| {
            let (o, n) = (old.get(i), new.get(i));
            (o != n).then(|| LineChange {
                line: i + 1,
                old: o.cloned(),
                new: n.cloned(),
            })
        })
        .collect()
}
