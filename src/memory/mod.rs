//! Memory layer: the time-indexed checkpoint chain.
//!
//! This module provides:
//!
//! - [`CheckpointChain`]: a live Frequent Directions sketch whose evicted
//!   rows are kept as timestamped partial checkpoints, so the sketch can be
//!   reconstructed as it stood at any past time.
//!
//! - [`Segment`], [`PartialCheckpoint`] and [`SnapshotArena`]: the records
//!   the chain is made of. Full checkpoints are immutable once stored.
//!
//! # Usage
//!
//! ```rust
//! use attp::memory::CheckpointChain;
//!
//! let mut chain = CheckpointChain::new(4, 3)?;
//! for t in 0..100u64 {
//!     let x = t as f64;
//!     chain.ingest(t, &[x.sin(), x.cos(), 1.0])?;
//! }
//!
//! let then = chain.query(50);
//! assert!(then.rows() <= 4);
//! assert_eq!(then, chain.query_anchored(50));
//! println!("{:?}", chain.stats());
//! # Ok::<(), attp::AttpError>(())
//! ```

pub mod chain;
pub mod checkpoint;

pub use chain::{ChainStats, CheckpointChain};
pub use checkpoint::{PartialCheckpoint, Segment, SnapshotArena, SnapshotId, Timestamp};
