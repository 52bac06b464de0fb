//! High-level layer: stream parsing, exact ground truth and replay.
//!
//! - [`stream`] reads the line-oriented record format
//! - [`exact`] keeps the true `AᵗA` for error measurement
//! - [`Replay`] feeds records to a [`CheckpointChain`](crate::memory::CheckpointChain)
//!   and reports on each query
//!
//! For embedding the sketch in your own pipeline, use
//! [`memory`](crate::memory) directly.

pub mod exact;
pub mod replay;
pub mod stream;

pub use exact::{relative_spectral_error, ExactCovariance, ExactHistory};
pub use replay::{QueryReport, Replay};
pub use stream::{infer_dimension, parse_line, parse_stream, StreamRecord};
