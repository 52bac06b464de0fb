//! Drive a [`CheckpointChain`] from a parsed stream and score its answers.
//!
//! [`Replay`] owns a chain plus an [`ExactHistory`] over the same rows.
//! Row records go to both; a query at `t` is answered by the chain and
//! compared with the exact covariance of the rows stamped `≤ t`.

use super::exact::{relative_spectral_error, ExactHistory};
use super::stream::{self, StreamRecord};
use crate::config::ChainConfig;
use crate::error::Result;
use crate::memory::{CheckpointChain, Timestamp};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::info;

/// Outcome of one query record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryReport {
    pub timestamp: Timestamp,
    /// Rows in the reconstructed sketch.
    pub rows: usize,
    /// `‖AᵗA − BᵗB‖₂ / ‖A‖_F²` against the rows stamped at or before
    /// `timestamp`.
    pub relative_error: f64,
    pub memory_bytes: f64,
}

/// Stream replay over one chain.
///
/// # Example
///
/// ```rust
/// use attp::highlevel::Replay;
/// use std::io::Cursor;
///
/// let mut replay = Replay::new(2, 2)?;
/// let reports = replay.run(Cursor::new("1 3 0\n2 0 3\n?2\n"))?;
/// assert_eq!(reports.len(), 1);
/// assert_eq!(reports[0].rows, 2);
/// # Ok::<(), attp::AttpError>(())
/// ```
pub struct Replay {
    chain: CheckpointChain,
    exact: ExactHistory,
}

impl Replay {
    /// Replay into a fresh chain of rank `l` over `d`-dimensional rows.
    pub fn new(l: usize, d: usize) -> Result<Self> {
        Ok(Self::with_chain(CheckpointChain::new(l, d)?))
    }

    /// Replay into the chain at `config.half_sketch_sizes[idx]`.
    pub fn from_config(config: &ChainConfig, idx: usize) -> Result<Self> {
        Ok(Self::with_chain(config.build(idx)?))
    }

    pub fn with_chain(chain: CheckpointChain) -> Self {
        let exact = ExactHistory::new(chain.dim());
        Self { chain, exact }
    }

    pub fn chain(&self) -> &CheckpointChain {
        &self.chain
    }

    pub fn exact(&self) -> &ExactHistory {
        &self.exact
    }

    pub fn into_chain(self) -> CheckpointChain {
        self.chain
    }

    /// Apply one record; queries produce a report.
    pub fn process(&mut self, record: &StreamRecord) -> Result<Option<QueryReport>> {
        match record {
            StreamRecord::Row { timestamp, values } => {
                self.chain.ingest(*timestamp, values)?;
                self.exact.push(*timestamp, values)?;
                Ok(None)
            }
            StreamRecord::Query { timestamp } => {
                let answer = self.chain.query_anchored(*timestamp);
                let report = QueryReport {
                    timestamp: *timestamp,
                    rows: answer.rows(),
                    relative_error: relative_spectral_error(&self.exact.at(*timestamp), &answer),
                    memory_bytes: self.chain.memory_usage(),
                };
                info!(
                    sketch = %self.chain.short_description(),
                    timestamp = report.timestamp,
                    rows = report.rows,
                    relative_error = report.relative_error,
                    memory_bytes = report.memory_bytes,
                    "query"
                );
                Ok(Some(report))
            }
        }
    }

    /// Apply every record in order, collecting query reports.
    pub fn process_all(&mut self, records: &[StreamRecord]) -> Result<Vec<QueryReport>> {
        let mut reports = Vec::new();
        for record in records {
            if let Some(report) = self.process(record)? {
                reports.push(report);
            }
        }
        Ok(reports)
    }

    /// Parse `reader` and replay it.
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<Vec<QueryReport>> {
        let records = stream::parse_stream(reader)?;
        self.process_all(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttpError;
    use std::io::Cursor;

    const SCENARIO: &str = "\
# l = 2, d = 2
?0
1 3 0
?1
2 0 3
?2
3 4 0
4 0 4
?4
";

    #[test]
    fn test_scenario_reports() {
        let mut replay = Replay::new(2, 2).unwrap();
        let reports = replay.run(Cursor::new(SCENARIO)).unwrap();
        assert_eq!(reports.len(), 4);

        assert_eq!(reports[0].rows, 0);
        assert_eq!(reports[0].relative_error, 0.0);

        // Only partials count, so the answer at 2 is exact.
        assert_eq!(reports[2].rows, 2);
        assert!(reports[2].relative_error < 1e-12);

        assert!(reports.iter().all(|r| r.relative_error <= 1.0));
        assert!(reports.windows(2).all(|w| w[0].memory_bytes <= w[1].memory_bytes));
        assert_eq!(replay.exact().rows(), 4);
        assert_eq!(replay.chain().rows_ingested(), 4);
    }

    #[test]
    fn test_past_query_scored_against_its_prefix() {
        let mut replay = Replay::new(2, 2).unwrap();
        let reports = replay
            .run(Cursor::new("1 3 0\n2 0 3\n3 4 0\n4 0 4\n?2\n?1\n?4\n"))
            .unwrap();
        assert_eq!(reports.len(), 3);

        // [3, 0] and [0, 3] cover rows 1 and 2 exactly.
        assert_eq!(reports[0].timestamp, 2);
        assert_eq!(reports[0].rows, 2);
        assert!(reports[0].relative_error < 1e-12, "{}", reports[0].relative_error);

        assert_eq!(reports[1].rows, 1);
        assert!(reports[1].relative_error < 1e-12, "{}", reports[1].relative_error);

        // Rows 3 and 4 are still live, so the present is only approximated.
        assert!(reports[2].relative_error > 0.0);
        assert!(reports[2].relative_error <= 0.5);
    }

    #[test]
    fn test_dimension_error_propagates() {
        let mut replay = Replay::new(2, 3).unwrap();
        let err = replay.run(Cursor::new("1 1 2\n")).unwrap_err();
        assert!(matches!(err, AttpError::DimensionMismatch { expected: 3, got: 2 }));
    }

    #[test]
    fn test_out_of_order_propagates() {
        let mut replay = Replay::new(2, 1).unwrap();
        let err = replay.run(Cursor::new("5 1\n4 1\n")).unwrap_err();
        assert!(matches!(err, AttpError::OutOfOrder { last: 5, got: 4 }));
    }

    #[test]
    fn test_from_config_picks_size() {
        let cfg = ChainConfig {
            dimension: 2,
            half_sketch_sizes: vec![1, 4],
            ..Default::default()
        };
        let replay = Replay::from_config(&cfg, 1).unwrap();
        assert_eq!(replay.chain().rank(), 4);
        assert_eq!(replay.into_chain().dim(), 2);
    }

    #[test]
    fn test_report_serializes() {
        let report = QueryReport {
            timestamp: 3,
            rows: 1,
            relative_error: 0.25,
            memory_bytes: 64.0,
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: QueryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
