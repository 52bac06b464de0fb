//! Checkpoint records: partial checkpoints, chain segments and the arena of
//! immutable full-checkpoint sketches.
//!
//! A [`Segment`] owns the partial checkpoints evicted while it was open and,
//! once closed, points at the full checkpoint materialised from them. Full
//! checkpoints live in a [`SnapshotArena`] and are referenced by
//! [`SnapshotId`]; they are never mutated after being pushed.

use crate::kernel::FrequentDirections;
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// Stream timestamp. Non-decreasing across a chain's ingest calls.
pub type Timestamp = u64;

/// A sketch row evicted from the live sketch at `timestamp`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartialCheckpoint {
    pub timestamp: Timestamp,
    pub row: Vec<f64>,
}

/// Index of a full checkpoint inside a [`SnapshotArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(usize);

impl SnapshotId {
    pub fn index(self) -> usize {
        self.0
    }
}

// =============================================================================
// Segment
// =============================================================================

/// One link of the checkpoint chain.
///
/// An open segment has no close timestamp (conceptually `+∞`) and no full
/// checkpoint. Closing fixes both; a closed segment is never modified again.
#[derive(Clone, Debug)]
pub struct Segment {
    close: Option<Timestamp>,
    partials: Vec<PartialCheckpoint>,
    full: Option<SnapshotId>,
}

impl Segment {
    pub(crate) fn open() -> Self {
        Self {
            close: None,
            partials: Vec::new(),
            full: None,
        }
    }

    pub(crate) fn closed(close: Timestamp, full: SnapshotId) -> Self {
        Self {
            close: Some(close),
            partials: Vec::new(),
            full: Some(full),
        }
    }

    /// `None` while the segment is open.
    pub fn close_timestamp(&self) -> Option<Timestamp> {
        self.close
    }

    pub fn is_open(&self) -> bool {
        self.close.is_none()
    }

    pub fn partials(&self) -> &[PartialCheckpoint] {
        &self.partials
    }

    pub fn full_checkpoint(&self) -> Option<SnapshotId> {
        self.full
    }

    pub(crate) fn push(&mut self, partial: PartialCheckpoint) {
        debug_assert!(self.is_open(), "push into a closed segment");
        debug_assert!(self
            .partials
            .last()
            .map_or(true, |p| p.timestamp <= partial.timestamp));
        self.partials.push(partial);
    }

    pub(crate) fn close(&mut self, timestamp: Timestamp, full: SnapshotId) {
        debug_assert!(self.is_open(), "segment closed twice");
        self.close = Some(timestamp);
        self.full = Some(full);
    }

    /// Bytes held by this segment's partial rows.
    pub fn partial_bytes(&self) -> usize {
        self.partials
            .iter()
            .map(|p| p.row.len() * std::mem::size_of::<f64>())
            .sum()
    }
}

// =============================================================================
// SnapshotArena
// =============================================================================

/// Append-only store of full-checkpoint sketches.
#[derive(Clone, Debug, Default)]
pub struct SnapshotArena {
    snapshots: Vec<FrequentDirections>,
}

impl SnapshotArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a sketch; it is immutable from here on.
    pub fn push(&mut self, sketch: FrequentDirections) -> SnapshotId {
        self.snapshots.push(sketch);
        SnapshotId(self.snapshots.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Bytes held by every stored sketch buffer.
    pub fn memory_usage(&self) -> usize {
        self.snapshots.iter().map(|s| s.memory_usage()).sum()
    }

    pub(crate) fn clear(&mut self) {
        self.snapshots.clear();
    }
}

impl Index<SnapshotId> for SnapshotArena {
    type Output = FrequentDirections;

    fn index(&self, id: SnapshotId) -> &Self::Output {
        &self.snapshots[id.0]
    }
}
