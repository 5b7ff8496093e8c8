//! A lock-free Count-Min Sketch frequency estimator (support no_std).
//!
//! A Count-Min Sketch answers "approximately how many times has item X been
//! observed?" in fixed memory: a `width x depth` matrix of counters plus one
//! seeded hash function per row. Inserting a key increments one counter per
//! row; querying takes the minimum across rows, which never under-counts and
//! over-counts only when hashes collide. This makes it a cheap building block
//! for frequency-aware policies such as cache admission and eviction.
//!
//! All counters are atomic, so [`CountMinSketch::insert`] and
//! [`CountMinSketch::count`] can run concurrently from many threads without
//! external locking.
//!
//! # Example
//!
//! ```rust
//! use minsketch::CountMinSketch;
//!
//! let sketch = CountMinSketch::<&str>::new(1000, 5).unwrap();
//! for _ in 0..50 {
//!     sketch.insert(&"apple");
//! }
//! for _ in 0..10 {
//!     sketch.insert(&"banana");
//! }
//!
//! assert!(sketch.count(&"apple") >= 50);
//! assert!(sketch.count(&"banana") >= 10);
//!
//! let top = sketch.top_k(1, &["apple", "banana"]);
//! assert_eq!(top[0].0, "apple");
//! ```
#![no_std]
#![cfg_attr(feature = "nightly", feature(core_intrinsics))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
extern crate alloc;
#[cfg(feature = "hashbrown")]
extern crate hashbrown;

#[cfg(any(test, feature = "std", not(feature = "hashbrown")))]
extern crate std;

#[macro_use]
mod macros;
mod polyfill;
mod sketch;

pub use sketch::{error_bound_dimensions, CountMinSketch};

use core::fmt::{Debug, Display, Formatter};

/// The hash builder a sketch uses when none is injected.
#[cfg(feature = "hashbrown")]
pub type DefaultHashBuilder = hashbrown::hash_map::DefaultHashBuilder;

/// The hash builder a sketch uses when none is injected.
#[cfg(not(feature = "hashbrown"))]
pub type DefaultHashBuilder = std::collections::hash_map::RandomState;

/// `SketchError` is the errors of this crate.
pub enum SketchError {
    /// Sketch constructed with a zero width or depth
    InvalidDimensions {
        /// the rejected width
        width: usize,
        /// the rejected depth
        depth: usize,
    },
    /// Merge attempted between sketches of different shapes
    IncompatibleDimensions {
        /// `(width, depth)` of the merge target
        expected: (usize, usize),
        /// `(width, depth)` of the other sketch
        found: (usize, usize),
    },
    /// Error-bound sizing called with epsilon or delta outside `(0, 1)`
    InvalidErrorBounds {
        /// the requested additive error fraction
        epsilon: f64,
        /// the requested failure probability
        delta: f64,
    },
}

impl SketchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            SketchError::InvalidDimensions { width, depth } => {
                write!(
                    f,
                    "width and depth must be greater than 0, got {}x{}",
                    *width, *depth
                )
            }
            SketchError::IncompatibleDimensions { expected, found } => {
                write!(
                    f,
                    "incompatible sketch dimensions for merge: expected {}x{}, found {}x{}",
                    expected.0, expected.1, found.0, found.1
                )
            }
            SketchError::InvalidErrorBounds { epsilon, delta } => {
                write!(
                    f,
                    "epsilon and delta must be in range (0.0, 1.0), got epsilon {} delta {}",
                    *epsilon, *delta
                )
            }
        }
    }
}

impl Display for SketchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        self.fmt(f)
    }
}

impl Debug for SketchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        self.fmt(f)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SketchError {}
