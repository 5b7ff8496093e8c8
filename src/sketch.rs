//! This mod implements a Count-Min sketch with a full counter matrix and
//! per-row seeded hashing.
//!
//! The sketch keeps a `width * depth` matrix of atomic counters, one hash
//! function per row. Inserting a key increments one counter in every row;
//! the estimate for a key is the minimum of its counters across rows, so the
//! sketch never under-counts and over-counts only on hash collisions.
use crate::{DefaultHashBuilder, SketchError};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::hash::{BuildHasher, Hash, Hasher};
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

/// Expands one base seed into a stream of per-row seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Reduce two 64-bit hashes into one.
///
/// The `Hash128to64` folding from Google's city hash.
#[inline(always)]
fn combine_hashes(upper: u64, lower: u64) -> u64 {
    const MUL: u64 = 0x9ddfea08eb382d69;

    let mut a = (lower ^ upper).wrapping_mul(MUL);
    a ^= a >> 47;
    let mut b = (upper ^ a).wrapping_mul(MUL);
    b ^= b >> 47;
    b.wrapping_mul(MUL)
}

/// Computes the `(width, depth)` needed to answer point queries within an
/// additive error of `epsilon * N` (`N` being the total count held by the
/// sketch) with probability at least `1 - delta`.
///
/// `width = ceil(e / epsilon)`, `depth = ceil(ln(1 / delta))`.
///
/// # Errors
///
/// Returns [`SketchError::InvalidErrorBounds`] if `epsilon` or `delta` is
/// outside `(0.0, 1.0)`.
pub fn error_bound_dimensions(epsilon: f64, delta: f64) -> Result<(usize, usize), SketchError> {
    if !(epsilon > 0.0 && epsilon < 1.0) || !(delta > 0.0 && delta < 1.0) {
        return Err(SketchError::InvalidErrorBounds { epsilon, delta });
    }

    let width = crate::polyfill::ceil(core::f64::consts::E / epsilon) as usize;
    let depth = crate::polyfill::ln(1.0 / delta);
    let depth = crate::polyfill::ceil(depth) as usize;
    Ok((width, depth))
}

/// `CountMinSketch` is a fixed-memory frequency estimator over keys of type
/// `K`, hashed by the injected [`BuildHasher`] `S`.
///
/// The counter matrix is flat and row-major: row `i`, column `j` lives at
/// `i * width + j`. Counters are [`AtomicU64`], so [`insert`](Self::insert)
/// and [`count`](Self::count) are safe to call concurrently from multiple
/// threads sharing one sketch; no operation takes `&mut self`.
///
/// A sketch is move-only. Duplicating the counter matrix is deliberately
/// explicit via [`deep_copy`](Self::deep_copy).
///
/// Estimates from two different sketches are only comparable (and
/// [`merge`](Self::merge) only meaningful) when both were built with the same
/// seed and an identically-configured hash builder, e.g. via
/// [`with_seed`](Self::with_seed) or [`with_hasher`](Self::with_hasher).
pub struct CountMinSketch<K, S = DefaultHashBuilder> {
    width: usize,
    depth: usize,
    counters: Box<[AtomicU64]>,
    // one seed per row, fixed for the sketch's lifetime
    seeds: Box<[u64]>,
    hash_builder: S,
    marker: PhantomData<fn(K)>,
}

impl<K> CountMinSketch<K> {
    /// Creates a sketch of `width * depth` zeroed counters with row hash
    /// functions derived from `seed`, using the default hash builder.
    ///
    /// Two sketches built from the same `seed` use the same row hash family,
    /// which makes their estimates comparable as long as the default hash
    /// builder itself is deterministic (it is when the `hashbrown` feature is
    /// enabled; the std `RandomState` is randomized per instance).
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::InvalidDimensions`] if `width` or `depth` is 0.
    pub fn with_seed(width: usize, depth: usize, seed: u64) -> Result<Self, SketchError> {
        Self::with_hasher(width, depth, seed, DefaultHashBuilder::default())
    }

    /// Creates a sketch sized by [`error_bound_dimensions`] with row hash
    /// functions derived from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::InvalidErrorBounds`] if `epsilon` or `delta` is
    /// outside `(0.0, 1.0)`.
    pub fn from_error_bounds_with_seed(
        epsilon: f64,
        delta: f64,
        seed: u64,
    ) -> Result<Self, SketchError> {
        let (width, depth) = error_bound_dimensions(epsilon, delta)?;
        Self::with_seed(width, depth, seed)
    }
}

cfg_std!(
    impl<K> CountMinSketch<K> {
        /// Creates a sketch of `width * depth` zeroed counters with randomly
        /// seeded row hash functions.
        ///
        /// # Errors
        ///
        /// Returns [`SketchError::InvalidDimensions`] if `width` or `depth`
        /// is 0.
        pub fn new(width: usize, depth: usize) -> Result<Self, SketchError> {
            use rand::{thread_rng, Rng};
            Self::with_seed(width, depth, thread_rng().gen::<u64>())
        }

        /// Creates a randomly seeded sketch sized by
        /// [`error_bound_dimensions`].
        ///
        /// # Errors
        ///
        /// Returns [`SketchError::InvalidErrorBounds`] if `epsilon` or
        /// `delta` is outside `(0.0, 1.0)`.
        pub fn from_error_bounds(epsilon: f64, delta: f64) -> Result<Self, SketchError> {
            let (width, depth) = error_bound_dimensions(epsilon, delta)?;
            Self::new(width, depth)
        }
    }
);

impl<K, S: BuildHasher> CountMinSketch<K, S> {
    /// Creates a sketch of `width * depth` zeroed counters with row hash
    /// functions derived from `seed`, hashing keys through `hash_builder`.
    ///
    /// The row family is expanded from `seed` with a splitmix64 stream, so a
    /// given `(seed, hash_builder)` pair always yields the same key-to-column
    /// mappings.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::InvalidDimensions`] if `width` or `depth` is 0.
    pub fn with_hasher(
        width: usize,
        depth: usize,
        seed: u64,
        hash_builder: S,
    ) -> Result<Self, SketchError> {
        if width == 0 || depth == 0 {
            return Err(SketchError::InvalidDimensions { width, depth });
        }

        let mut state = seed;
        let seeds: Box<[u64]> = (0..depth).map(|_| splitmix64(&mut state)).collect();
        let counters: Box<[AtomicU64]> = (0..width * depth).map(|_| AtomicU64::new(0)).collect();

        Ok(Self {
            width,
            depth,
            counters,
            seeds,
            hash_builder,
            marker: PhantomData,
        })
    }

    /// Returns the number of counters per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of rows (independent hash functions).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// `merge` folds `other` into `self`: every counter of `other` is added
    /// into the counter at the same position here. Afterwards `self` behaves
    /// as if every insert applied to either sketch had been applied to it,
    /// provided both sketches share the same seed and hash builder.
    ///
    /// `other` is not mutated. The merge is best-effort with respect to
    /// inserts running concurrently on `other`: each counter is read with one
    /// atomic load, but no snapshot is taken across counters.
    ///
    /// # Errors
    ///
    /// Returns [`SketchError::IncompatibleDimensions`] if the shapes differ;
    /// `self` is left unmodified in that case.
    pub fn merge(&self, other: &Self) -> Result<(), SketchError> {
        if self.width != other.width || self.depth != other.depth {
            return Err(SketchError::IncompatibleDimensions {
                expected: (self.width, self.depth),
                found: (other.width, other.depth),
            });
        }

        for (dst, src) in self.counters.iter().zip(other.counters.iter()) {
            let v = src.load(Ordering::Relaxed);
            if v != 0 {
                dst.fetch_add(v, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// `clear` zeroes every counter.
    ///
    /// Each store is atomic, but the reset as a whole is not: running it
    /// concurrently with `insert` leaves the sketch in a valid state without
    /// any point-in-time guarantee about which increments survive.
    pub fn clear(&self) {
        for counter in self.counters.iter() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Returns a new sketch holding a copy of the current counter values,
    /// sharing nothing with `self`.
    ///
    /// Counters are read one atomic load at a time; increments running
    /// concurrently may or may not be captured.
    pub fn deep_copy(&self) -> Self
    where
        S: Clone,
    {
        let counters: Box<[AtomicU64]> = self
            .counters
            .iter()
            .map(|counter| AtomicU64::new(counter.load(Ordering::Relaxed)))
            .collect();

        Self {
            width: self.width,
            depth: self.depth,
            counters,
            seeds: self.seeds.clone(),
            hash_builder: self.hash_builder.clone(),
            marker: PhantomData,
        }
    }

    /// The column `key_hash` maps to in `row`.
    #[inline]
    fn column(&self, row: usize, key_hash: u64) -> usize {
        (combine_hashes(self.seeds[row], key_hash) % self.width as u64) as usize
    }
}

impl<K: Hash, S: BuildHasher> CountMinSketch<K, S> {
    #[inline]
    fn key_hash(&self, key: &K) -> u64 {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// `insert` records one observation of `key`, incrementing one counter
    /// per row.
    ///
    /// Increments are atomic fetch-adds, so concurrent inserts never lose
    /// updates and need no external locking.
    pub fn insert(&self, key: &K) {
        let hash = self.key_hash(key);
        for row in 0..self.depth {
            let column = self.column(row, hash);
            self.counters[row * self.width + column].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// `count` estimates how many times `key` has been inserted: the minimum
    /// of its counters across all rows.
    ///
    /// The estimate never under-counts; it may over-count when other keys
    /// collide into the same columns. Safe to call concurrently with
    /// `insert` — each counter read is an atomic load, but the `depth` reads
    /// are not a single snapshot.
    pub fn count(&self, key: &K) -> u64 {
        let hash = self.key_hash(key);
        let mut min = u64::MAX;
        for row in 0..self.depth {
            let column = self.column(row, hash);
            let v = self.counters[row * self.width + column].load(Ordering::Relaxed);
            if v < min {
                min = v;
            }
        }
        min
    }

    /// `top_k` ranks `candidates` by estimated count, descending, and
    /// returns the first `min(k, candidates.len())` entries paired with
    /// their estimates.
    ///
    /// The sketch does not remember which keys were inserted, so ranking is
    /// restricted to the caller-supplied candidates. Duplicate candidates
    /// produce duplicate entries. Ties keep the candidates' input order.
    pub fn top_k(&self, k: usize, candidates: &[K]) -> Vec<(K, u64)>
    where
        K: Clone,
    {
        if k == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(K, u64)> = candidates
            .iter()
            .map(|candidate| (candidate.clone(), self.count(candidate)))
            .collect();
        // stable sort keeps input order among equal estimates
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(k);
        ranked
    }
}

impl<K, S> core::fmt::Debug for CountMinSketch<K, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CountMinSketch")
            .field("width", &self.width)
            .field("depth", &self.depth)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SketchError;
    use fnv::FnvBuildHasher;
    use scoped_threadpool::Pool;
    use std::vec;

    const SEED: u64 = 0x0ddc0ffeebadf00d;

    fn fnv_sketch(width: usize, depth: usize) -> CountMinSketch<&'static str, FnvBuildHasher> {
        CountMinSketch::with_hasher(width, depth, SEED, FnvBuildHasher::default()).unwrap()
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(matches!(
            CountMinSketch::<u64>::with_seed(0, 3, SEED),
            Err(SketchError::InvalidDimensions { width: 0, depth: 3 })
        ));
        assert!(matches!(
            CountMinSketch::<u64>::with_seed(4, 0, SEED),
            Err(SketchError::InvalidDimensions { width: 4, depth: 0 })
        ));
        assert!(matches!(
            CountMinSketch::<u64>::new(0, 0),
            Err(SketchError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_insert_and_count() {
        let s = CountMinSketch::<&str>::with_seed(1000, 5, SEED).unwrap();
        for _ in 0..50 {
            s.insert(&"apple");
        }
        for _ in 0..10 {
            s.insert(&"banana");
        }

        assert!(s.count(&"apple") >= 50);
        assert!(s.count(&"banana") >= 10);
        assert_eq!(
            s.top_k(1, &["apple", "banana"]),
            vec![("apple", s.count(&"apple"))]
        );
    }

    #[test]
    fn test_count_is_monotonic() {
        let s = CountMinSketch::<u64>::with_seed(512, 4, SEED).unwrap();
        let mut last = 0;
        for i in 1..=100u64 {
            s.insert(&42);
            let estimate = s.count(&42);
            assert!(estimate >= i, "under-count at insert {}", i);
            assert!(estimate >= last);
            last = estimate;
        }
    }

    #[test]
    fn test_unseen_key_counts_zero() {
        let s = CountMinSketch::<&str>::with_seed(1024, 4, SEED).unwrap();
        assert_eq!(s.count(&"never inserted"), 0);
    }

    #[test]
    fn test_merge_additivity() {
        let a = fnv_sketch(1024, 4);
        let b = fnv_sketch(1024, 4);
        for _ in 0..3 {
            a.insert(&"apple");
        }
        for _ in 0..2 {
            b.insert(&"apple");
        }
        for _ in 0..7 {
            b.insert(&"banana");
        }

        a.merge(&b).unwrap();

        assert_eq!(a.count(&"apple"), 5);
        assert_eq!(a.count(&"banana"), 7);
        // the source sketch is untouched
        assert_eq!(b.count(&"apple"), 2);
        assert_eq!(b.count(&"banana"), 7);
    }

    #[test]
    fn test_merge_incompatible_dimensions() {
        let a = fnv_sketch(4, 3);
        let b = fnv_sketch(5, 3);
        a.insert(&"apple");
        let before = a.count(&"apple");

        assert!(matches!(
            a.merge(&b),
            Err(SketchError::IncompatibleDimensions {
                expected: (4, 3),
                found: (5, 3),
            })
        ));
        assert_eq!(a.count(&"apple"), before);
    }

    #[test]
    fn test_clear_resets() {
        let s = fnv_sketch(256, 4);
        for _ in 0..20 {
            s.insert(&"apple");
        }
        s.insert(&"banana");
        s.clear();

        assert_eq!(s.count(&"apple"), 0);
        assert_eq!(s.count(&"banana"), 0);

        // the sketch is still usable afterwards
        s.insert(&"apple");
        assert!(s.count(&"apple") >= 1);
    }

    #[test]
    fn test_top_k_ordering() {
        let s = fnv_sketch(4096, 4);
        for _ in 0..5 {
            s.insert(&"a");
        }
        for _ in 0..3 {
            s.insert(&"b");
        }
        for _ in 0..8 {
            s.insert(&"c");
        }

        let candidates = ["a", "b", "c"];
        assert_eq!(s.top_k(2, &candidates), vec![("c", 8), ("a", 5)]);
        assert_eq!(
            s.top_k(10, &candidates),
            vec![("c", 8), ("a", 5), ("b", 3)]
        );
    }

    #[test]
    fn test_top_k_empty_cases() {
        let s = fnv_sketch(64, 4);
        s.insert(&"a");
        assert!(s.top_k(0, &["a"]).is_empty());
        assert!(s.top_k(3, &[]).is_empty());
    }

    #[test]
    fn test_top_k_duplicates_and_ties() {
        let s = fnv_sketch(4096, 4);
        for _ in 0..2 {
            s.insert(&"x");
        }
        for _ in 0..2 {
            s.insert(&"y");
        }

        // duplicates are not deduplicated
        assert_eq!(s.top_k(5, &["x", "x"]), vec![("x", 2), ("x", 2)]);
        // ties keep input order
        assert_eq!(s.top_k(2, &["x", "y"]), vec![("x", 2), ("y", 2)]);
        assert_eq!(s.top_k(2, &["y", "x"]), vec![("y", 2), ("x", 2)]);
    }

    #[test]
    fn test_deterministic_with_same_seed() {
        let a = fnv_sketch(1024, 4);
        let b = fnv_sketch(1024, 4);
        let keys = ["one", "two", "three", "two", "three", "three"];
        for key in keys.iter() {
            a.insert(key);
            b.insert(key);
        }

        for key in keys.iter() {
            assert_eq!(a.count(key), b.count(key));
        }
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let s = fnv_sketch(512, 4);
        for _ in 0..6 {
            s.insert(&"apple");
        }

        let copy = s.deep_copy();
        assert_eq!(copy.count(&"apple"), s.count(&"apple"));

        s.insert(&"apple");
        assert_eq!(copy.count(&"apple"), 6);
        assert_eq!(s.count(&"apple"), 7);
    }

    #[test]
    fn test_error_bound_dimensions() {
        assert_eq!(error_bound_dimensions(0.01, 0.001).unwrap(), (272, 7));
        assert!(matches!(
            error_bound_dimensions(0.0, 0.5),
            Err(SketchError::InvalidErrorBounds { .. })
        ));
        assert!(matches!(
            error_bound_dimensions(0.01, 1.0),
            Err(SketchError::InvalidErrorBounds { .. })
        ));

        let s = CountMinSketch::<u64>::from_error_bounds(0.01, 0.001).unwrap();
        assert_eq!((s.width(), s.depth()), (272, 7));

        let s = CountMinSketch::<u64>::from_error_bounds_with_seed(0.1, 0.05, SEED).unwrap();
        assert_eq!((s.width(), s.depth()), (28, 3));
    }

    #[test]
    fn test_concurrent_insert_no_lost_updates() {
        const THREADS: u32 = 10;
        const INSERTS_PER_THREAD: usize = 1000;

        // a single key hits the same counters from every thread, so the
        // final estimate must be exactly the number of applied increments
        let s = CountMinSketch::<&str>::with_seed(10007, 7, SEED).unwrap();
        let mut pool = Pool::new(THREADS);
        pool.scoped(|scoped| {
            for _ in 0..THREADS {
                let s = &s;
                scoped.execute(move || {
                    for _ in 0..INSERTS_PER_THREAD {
                        s.insert(&"hot");
                    }
                });
            }
        });

        assert_eq!(s.count(&"hot"), (THREADS as usize * INSERTS_PER_THREAD) as u64);
    }

    #[test]
    fn test_concurrent_insert_many_keys_never_undercounts() {
        const THREADS: u32 = 8;
        const KEYS: u64 = 64;
        const ROUNDS: u64 = 50;

        let s = CountMinSketch::<u64>::with_seed(8192, 5, SEED).unwrap();
        let mut pool = Pool::new(THREADS);
        pool.scoped(|scoped| {
            for _ in 0..THREADS {
                let s = &s;
                scoped.execute(move || {
                    for _ in 0..ROUNDS {
                        for key in 0..KEYS {
                            s.insert(&key);
                        }
                    }
                });
            }
        });

        for key in 0..KEYS {
            assert!(s.count(&key) >= THREADS as u64 * ROUNDS);
        }
    }
}
