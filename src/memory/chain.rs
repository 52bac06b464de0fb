//! Time-indexed checkpoint chain over a live Frequent Directions sketch.
//!
//! Every ingested row goes into the live sketch. Whenever the leading
//! eigenvalue of the live `BᵗB` reaches `AF2 / l` (with `AF2` the total input
//! energy so far) the oldest live row is evicted into the open segment as a
//! partial checkpoint. After `l` partials the segment closes and a full
//! checkpoint is materialised by replaying them onto a copy of the previous
//! full checkpoint.
//!
//! A query at time `t` rebuilds the sketch from every partial checkpoint with
//! timestamp `≤ t`. Since partial timestamps are non-decreasing along the
//! chain, the replay can either start from scratch ([`CheckpointChain::query`])
//! or from the latest full checkpoint closed at or before `t`
//! ([`CheckpointChain::query_anchored`]); both produce identical output.
//!
//! # Usage
//!
//! ```rust
//! use attp::memory::CheckpointChain;
//!
//! let mut chain = CheckpointChain::new(2, 2)?;
//! chain.ingest(1, &[3.0, 0.0])?;
//! chain.ingest(2, &[0.0, 3.0])?;
//! chain.ingest(3, &[4.0, 0.0])?;
//!
//! let past = chain.query(2);
//! assert_eq!(past.rows(), 2);
//! assert_eq!(past, chain.query_anchored(2));
//! # Ok::<(), attp::AttpError>(())
//! ```

use super::checkpoint::{PartialCheckpoint, Segment, SnapshotArena, SnapshotId, Timestamp};
use crate::config::ChainConfig;
use crate::error::{AttpError, Result};
use crate::kernel::linalg::{self, Matrix, PowerIteration};
use crate::kernel::FrequentDirections;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Seed of the fixed power-iteration start vector.
const START_SEED: u64 = 0x00fd_a77b;

/// Relative slack on the eviction test. Power iteration approaches the
/// leading eigenvalue from below and rounding can leave an exact tie a few
/// ulps short of `AF2 / l`.
const EVICTION_SLACK: f64 = 1e-9;

/// Power-iteration estimates within this relative distance below the
/// eviction threshold are re-checked with an exact eigendecomposition.
const CONFIRM_BAND: f64 = 0.1;

/// Counters describing a chain's retained history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChainStats {
    pub rows_ingested: u64,
    pub partial_checkpoints: usize,
    /// Materialised full checkpoints, not counting the empty root.
    pub full_checkpoints: usize,
    pub segments: usize,
    /// `AF2`: cumulative squared norm of all ingested rows.
    pub energy: f64,
    pub memory_bytes: f64,
    /// Bytes actually held by stored full checkpoints, root included.
    pub snapshot_bytes: usize,
}

/// At-the-time persistent Frequent Directions sketch.
#[derive(Clone, Debug)]
pub struct CheckpointChain {
    l: usize,
    d: usize,
    live: FrequentDirections,
    energy: f64,
    /// First segment is the root (closed at 0, empty sketch); last is open.
    segments: Vec<Segment>,
    arena: SnapshotArena,
    /// Most recent full checkpoint.
    last_full: SnapshotId,
    power: PowerIteration,
    start: Vec<f64>,
    last_timestamp: Option<Timestamp>,
    rows_ingested: u64,
}

impl CheckpointChain {
    /// Create a chain of rank `l` over `d`-dimensional rows.
    pub fn new(l: usize, d: usize) -> Result<Self> {
        Self::with_power(l, d, PowerIteration::default())
    }

    /// Create with explicit power-iteration settings for the eviction test.
    pub fn with_power(l: usize, d: usize, power: PowerIteration) -> Result<Self> {
        if power.max_iters == 0 || !(power.tolerance >= 0.0) {
            return Err(AttpError::InvalidParameter(format!(
                "power iteration needs max_iters > 0 and tolerance >= 0, got {:?}",
                power
            )));
        }
        let live = FrequentDirections::new(l, d)?;
        let mut arena = SnapshotArena::new();
        let root = arena.push(live.clone());

        Ok(Self {
            l,
            d,
            live,
            energy: 0.0,
            segments: vec![Segment::closed(0, root), Segment::open()],
            arena,
            last_full: root,
            power,
            start: linalg::start_vector(d, START_SEED),
            last_timestamp: None,
            rows_ingested: 0,
        })
    }

    /// Chain for the first size listed in `config`.
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        config.build(0)
    }

    // --- Accessors ---

    pub fn rank(&self) -> usize {
        self.l
    }

    pub fn dim(&self) -> usize {
        self.d
    }

    /// `AF2`.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.last_timestamp
    }

    pub fn rows_ingested(&self) -> u64 {
        self.rows_ingested
    }

    pub fn live_sketch(&self) -> &FrequentDirections {
        &self.live
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// `(close timestamp, sketch)` for every closed segment, root included.
    pub fn full_checkpoints(&self) -> impl Iterator<Item = (Timestamp, &FrequentDirections)> {
        self.segments.iter().filter_map(|s| {
            let ts = s.close_timestamp()?;
            let id = s.full_checkpoint()?;
            Some((ts, &self.arena[id]))
        })
    }

    /// Short identifier used in reports, e.g. `PFD-l20`.
    pub fn short_description(&self) -> String {
        format!("PFD-l{}", self.l)
    }

    // --- Core methods ---

    /// Ingest one row observed at `timestamp`.
    ///
    /// Fails fast on a wrong row length or a timestamp older than the last
    /// ingested one; the chain is left untouched in both cases.
    pub fn ingest(&mut self, timestamp: Timestamp, row: &[f64]) -> Result<()> {
        if row.len() != self.d {
            return Err(AttpError::DimensionMismatch {
                expected: self.d,
                got: row.len(),
            });
        }
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                return Err(AttpError::OutOfOrder {
                    last,
                    got: timestamp,
                });
            }
        }

        self.live.push_row(row);
        self.energy += linalg::norm_sq(row);
        self.last_timestamp = Some(timestamp);
        self.rows_ingested += 1;

        let threshold = self.energy / self.l as f64;
        let lambda = self.leading_eigenvalue(threshold);
        if lambda >= threshold * (1.0 - EVICTION_SLACK) {
            let evicted = self.live.evict_oldest_nonzero();
            self.open_segment_mut().push(PartialCheckpoint {
                timestamp,
                row: evicted,
            });
            debug!(
                timestamp,
                lambda,
                energy = self.energy,
                pending = self.open_segment().partials().len(),
                "partial checkpoint"
            );

            if self.open_segment().partials().len() >= self.l {
                self.close_open_segment(timestamp);
            }
        }
        Ok(())
    }

    /// Reconstruct the sketch as of `timestamp` by replaying every partial
    /// checkpoint from the start of the chain.
    ///
    /// Returns a `k × d` matrix with `k ≤ l`; `0 × d` before any eviction.
    pub fn query(&self, timestamp: Timestamp) -> Matrix {
        let mut rebuilt = self.arena[self.root()].clone();
        'segments: for segment in &self.segments {
            for partial in segment.partials() {
                if partial.timestamp > timestamp {
                    break 'segments;
                }
                rebuilt.push_row(&partial.row);
            }
        }
        Self::finish(rebuilt)
    }

    /// Same result as [`query`](Self::query), replaying only from the latest
    /// full checkpoint closed at or before `timestamp`.
    pub fn query_anchored(&self, timestamp: Timestamp) -> Matrix {
        let closed = &self.segments[..self.segments.len() - 1];
        let after = closed.partition_point(|s| s.close_timestamp().map_or(false, |c| c <= timestamp));
        // The root closes at 0, so at least one segment qualifies.
        let anchor = &closed[after.saturating_sub(1)];
        let id = anchor.full_checkpoint().unwrap_or(self.root());

        let mut rebuilt = self.arena[id].clone();
        if let Some(next) = self.segments.get(after) {
            for partial in next.partials().iter().take_while(|p| p.timestamp <= timestamp) {
                rebuilt.push_row(&partial.row);
            }
        }
        Self::finish(rebuilt)
    }

    /// `BᵗB` of the reconstruction at `timestamp`, dense `d × d` row-major.
    pub fn covariance_at(&self, timestamp: Timestamp) -> Vec<f64> {
        self.query_anchored(timestamp).gram()
    }

    /// `BᵗB` of the reconstruction at `timestamp` as a column-major packed
    /// upper triangle.
    pub fn packed_covariance_at(&self, timestamp: Timestamp) -> Vec<f64> {
        let m = self.query_anchored(timestamp);
        linalg::packed_upper_gram(m.data(), m.rows(), m.cols())
    }

    /// Estimated bytes retained by the chain.
    ///
    /// Each segment costs its partial rows plus one `2l × d` sketch footprint.
    pub fn memory_usage(&self) -> f64 {
        let sketch = (self.l * 2 * self.d * std::mem::size_of::<f64>()) as f64;
        self.segments
            .iter()
            .map(|s| s.partial_bytes() as f64 + sketch)
            .sum()
    }

    pub fn stats(&self) -> ChainStats {
        ChainStats {
            rows_ingested: self.rows_ingested,
            partial_checkpoints: self.segments.iter().map(|s| s.partials().len()).sum(),
            full_checkpoints: self.arena.len() - 1,
            segments: self.segments.len(),
            energy: self.energy,
            memory_bytes: self.memory_usage(),
            snapshot_bytes: self.arena.memory_usage(),
        }
    }

    /// Drop all history and return to the freshly constructed state.
    pub fn clear(&mut self) {
        self.live.clear();
        self.energy = 0.0;
        self.arena.clear();
        let root = self.arena.push(self.live.clone());
        self.segments = vec![Segment::closed(0, root), Segment::open()];
        self.last_full = root;
        self.last_timestamp = None;
        self.rows_ingested = 0;
    }

    // --- Private helpers ---

    fn root(&self) -> SnapshotId {
        self.segments[0]
            .full_checkpoint()
            .unwrap_or(self.last_full)
    }

    fn open_segment(&self) -> &Segment {
        &self.segments[self.segments.len() - 1]
    }

    fn open_segment_mut(&mut self) -> &mut Segment {
        let last = self.segments.len() - 1;
        &mut self.segments[last]
    }

    /// Materialise the next full checkpoint and open a fresh segment.
    fn close_open_segment(&mut self, timestamp: Timestamp) {
        let mut full = self.arena[self.last_full].clone();
        for partial in self.open_segment().partials() {
            full.push_row(&partial.row);
        }
        let id = self.arena.push(full);
        self.open_segment_mut().close(timestamp, id);
        self.segments.push(Segment::open());
        self.last_full = id;

        debug!(
            timestamp,
            full_checkpoints = self.arena.len() - 1,
            memory_bytes = self.memory_usage(),
            "full checkpoint"
        );
    }

    /// `λ_max(BᵗB)` of the live sketch, accurate enough to decide the
    /// comparison against `threshold`.
    ///
    /// Power iteration never overshoots, so an estimate at or above the
    /// threshold is final. Estimates just below it are replaced by the exact
    /// eigenvalue.
    fn leading_eigenvalue(&self, threshold: f64) -> f64 {
        let estimate = self.live.leading_eigenvalue(&self.power, &self.start);
        if estimate >= threshold * (1.0 - EVICTION_SLACK)
            || estimate < threshold * (1.0 - CONFIRM_BAND)
        {
            return estimate;
        }
        let exact = self.live.exact_leading_eigenvalue();
        trace!(estimate, exact, threshold, "eviction test confirmed exactly");
        exact.max(estimate)
    }

    fn finish(mut rebuilt: FrequentDirections) -> Matrix {
        rebuilt.compact();
        rebuilt.to_matrix()
    }
}

// =============================================================================
// Tests
// =============================================================================
