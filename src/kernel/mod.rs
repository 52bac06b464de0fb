//! Kernel layer: the time-agnostic sketch and its numeric primitives.
//!
//! - Dense row-major helpers, power iteration and SVD ([`linalg`])
//! - Fixed-capacity free-slot stack ([`FreeSlots`])
//! - The bounded Frequent Directions sketch ([`FrequentDirections`])
//!
//! This layer has no dependencies on [`memory`](crate::memory) or
//! [`highlevel`](crate::highlevel).
//!
//! # Example
//!
//! ```rust
//! use attp::kernel::{FrequentDirections, PowerIteration, linalg};
//!
//! let mut fd = FrequentDirections::new(2, 2)?;
//! fd.insert(&[3.0, 0.0])?;
//! fd.insert(&[0.0, 2.0])?;
//!
//! let start = linalg::start_vector(2, 0);
//! let top = fd.leading_eigenvalue(&PowerIteration::default(), &start);
//! assert!((top - 9.0).abs() < 1e-6);
//! # Ok::<(), attp::AttpError>(())
//! ```

pub mod linalg;
pub mod sketch;
pub mod slots;

pub use linalg::{Matrix, PowerIteration};
pub use sketch::FrequentDirections;
pub use slots::FreeSlots;
