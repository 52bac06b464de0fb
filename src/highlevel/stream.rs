//! Line-oriented stream records.
//!
//! Each non-blank line is one of:
//!
//! - `# anything`: comment, skipped
//! - `?<ts>`: query the sketch as of timestamp `ts`
//! - `<ts> <v1> … <vd>`: a row observed at `ts`, whitespace separated
//!
//! ```rust
//! use attp::highlevel::stream::{parse_line, StreamRecord};
//!
//! let rec = parse_line("7 1.5 -2 0", 1)?;
//! assert_eq!(rec, Some(StreamRecord::Row { timestamp: 7, values: vec![1.5, -2.0, 0.0] }));
//! assert_eq!(parse_line("?9", 2)?, Some(StreamRecord::Query { timestamp: 9 }));
//! # Ok::<(), attp::AttpError>(())
//! ```

use crate::error::{AttpError, Result};
use crate::memory::Timestamp;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// One parsed stream line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamRecord {
    Row { timestamp: Timestamp, values: Vec<f64> },
    Query { timestamp: Timestamp },
}

impl StreamRecord {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            StreamRecord::Row { timestamp, .. } | StreamRecord::Query { timestamp } => *timestamp,
        }
    }
}

/// Parse one line; `Ok(None)` for blank lines and comments.
///
/// `line_no` is only used in error messages.
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<StreamRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    if let Some(rest) = trimmed.strip_prefix('?') {
        let timestamp = parse_timestamp(rest.trim(), line_no)?;
        return Ok(Some(StreamRecord::Query { timestamp }));
    }

    let mut fields = trimmed.split_whitespace();
    let timestamp = match fields.next() {
        Some(f) => parse_timestamp(f, line_no)?,
        None => return Ok(None),
    };
    let values = fields
        .map(|f| {
            f.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| AttpError::Parse {
                    line: line_no,
                    message: format!("invalid value {:?}", f),
                })
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.is_empty() {
        return Err(AttpError::Parse {
            line: line_no,
            message: "row has a timestamp but no values".into(),
        });
    }
    Ok(Some(StreamRecord::Row { timestamp, values }))
}

/// Parse a whole stream, checking that every row has the same dimension.
pub fn parse_stream<R: BufRead>(reader: R) -> Result<Vec<StreamRecord>> {
    let mut records = Vec::new();
    let mut dim: Option<usize> = None;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        let Some(record) = parse_line(&line, line_no)? else {
            continue;
        };
        if let StreamRecord::Row { values, .. } = &record {
            match dim {
                None => dim = Some(values.len()),
                Some(d) if d != values.len() => {
                    return Err(AttpError::Parse {
                        line: line_no,
                        message: format!("expected {} values, got {}", d, values.len()),
                    })
                }
                Some(_) => {}
            }
        }
        records.push(record);
    }
    Ok(records)
}

/// Row dimension of the first data line, if any.
pub fn infer_dimension(records: &[StreamRecord]) -> Option<usize> {
    records.iter().find_map(|r| match r {
        StreamRecord::Row { values, .. } => Some(values.len()),
        StreamRecord::Query { .. } => None,
    })
}

fn parse_timestamp(field: &str, line_no: usize) -> Result<Timestamp> {
    field.parse::<Timestamp>().map_err(|e| AttpError::Parse {
        line: line_no,
        message: format!("invalid timestamp {:?}: {}", field, e),
    })
}
