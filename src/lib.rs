//! # attp: At-the-Time Persistent Frequent Directions
//!
//! A bounded-memory matrix sketch over a timestamped row stream that can
//! answer "what did the sketch look like at time `t`?" for any past `t`.
//!
//! ## Quick Start
//!
//! ```rust
//! use attp::CheckpointChain;
//!
//! // Rank-2 sketch over 2-dimensional rows
//! let mut chain = CheckpointChain::new(2, 2)?;
//!
//! chain.ingest(1, &[3.0, 0.0])?;
//! chain.ingest(2, &[0.0, 3.0])?;
//! chain.ingest(3, &[4.0, 0.0])?;
//! chain.ingest(4, &[0.0, 4.0])?;
//!
//! // Sketch as of time 2
//! let b = chain.query(2);
//! assert!(b.rows() <= 2);
//!
//! println!("retained bytes: {}", chain.memory_usage());
//! # Ok::<(), attp::AttpError>(())
//! ```
//!
//! ## Core Concepts
//!
//! - **Frequent Directions**: a `2l × d` buffer compacted by SVD, keeping
//!   `‖AᵗA − BᵗB‖₂ ≤ ‖A‖_F² / l`
//! - **Partial checkpoint**: a row evicted from the live sketch, stamped with
//!   the time of eviction
//! - **Full checkpoint**: an immutable sketch materialised every `l` partials
//! - **Query**: replay of the partials up to `t`, from scratch or from the
//!   nearest full checkpoint
//!
//! ## Layers
//!
//! - [`kernel`]: the sketch and its linear algebra
//! - [`memory`]: the checkpoint chain
//! - [`highlevel`]: stream parsing, exact ground truth, replay reports

pub mod config;
pub mod error;
pub mod highlevel;
pub mod kernel;
pub mod memory;

// Re-exports for convenience
pub use config::ChainConfig;
pub use error::{AttpError, Result};
pub use highlevel::{QueryReport, Replay};
pub use kernel::{FrequentDirections, Matrix, PowerIteration};
pub use memory::{ChainStats, CheckpointChain, Timestamp};
