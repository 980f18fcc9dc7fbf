//! Common utilities used across the crate.
//!
//! This module provides the parallelism flag threaded through matrix
//! construction, split search and batch prediction, the thread pool setup
//! used by boosters, and string parameter parsing shared by every
//! `set_param` implementation.

use std::str::FromStr;

use rayon::prelude::*;
use thiserror::Error;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// This is a simple flag passed through data and training components.
/// When parallel, components may use `rayon` parallel iterators.
/// When sequential, components must iterate on the calling thread.
///
/// The actual thread pool is set up by the booster via [`run_with_threads`].
/// Components don't manage thread pools, they just respect this flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon pool has multiple threads, sequential otherwise)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_for_each<T, I, F>(self, iter: I, f: F)
    where
        T: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().for_each(f);
        } else {
            iter.into_iter().for_each(f);
        }
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }

    /// Parallel map with per-thread initialization.
    ///
    /// The `init` closure is called once per rayon work split (in parallel
    /// mode) or once total (in sequential mode). The resulting scratch value is
    /// passed to `f` and reused across items handled by the same worker.
    /// Output order follows input order in both modes.
    #[inline]
    pub fn maybe_par_map_init<T, B, I, INIT, S, F>(self, iter: I, init: INIT, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        INIT: Fn() -> S + Sync + Send,
        F: Fn(&mut S, T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map_init(init, f).collect()
        } else {
            let mut state = init();
            iter.into_iter().map(|item| f(&mut state, item)).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use the ambient rayon pool)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
///
/// If a dedicated pool cannot be created the closure runs sequentially.
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    match Parallelism::from_threads(n_threads) {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel if n_threads == 0 => f(Parallelism::Parallel),
        Parallelism::Parallel => {
            match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
                Ok(pool) => pool.install(|| f(Parallelism::Parallel)),
                Err(err) => {
                    tracing::warn!(n_threads, %err, "thread pool unavailable, running sequentially");
                    f(Parallelism::Sequential)
                }
            }
        }
    }
}

// =============================================================================
// Parameter Parsing
// =============================================================================

/// A recognized parameter carried a value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value {value:?} for parameter `{name}`")]
pub struct ParamError {
    pub name: String,
    pub value: String,
}

impl ParamError {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Parse a parameter value, reporting the parameter name on failure.
#[inline]
pub fn parse_param<T: FromStr>(name: &str, value: &str) -> Result<T, ParamError> {
    value.trim().parse().map_err(|_| ParamError::new(name, value))
}

/// Parse an integer flag such as `silent=1`.
#[inline]
pub fn parse_flag(name: &str, value: &str) -> Result<bool, ParamError> {
    match value.trim() {
        "0" | "false" => Ok(false),
        "1" | "true" => Ok(true),
        _ => Err(ParamError::new(name, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_from_threads() {
        assert_eq!(Parallelism::from_threads(1), Parallelism::Sequential);
        assert!(Parallelism::from_threads(4).is_parallel());
    }

    #[test]
    fn test_maybe_par_map_preserves_order() {
        for par in [Parallelism::Sequential, Parallelism::Parallel] {
            let out = par.maybe_par_map(0..100usize, |i| i * 2);
            assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_maybe_par_map_init_reuses_scratch() {
        for par in [Parallelism::Sequential, Parallelism::Parallel] {
            let out = par.maybe_par_map_init(
                0..64usize,
                Vec::<usize>::new,
                |scratch, i| {
                    scratch.clear();
                    scratch.extend(0..i);
                    scratch.len()
                },
            );
            assert_eq!(out, (0..64).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_run_with_threads_sequential() {
        let par = run_with_threads(1, |p| p);
        assert_eq!(par, Parallelism::Sequential);
    }

    #[test]
    fn test_run_with_threads_pool() {
        let (par, threads) = run_with_threads(2, |p| (p, rayon::current_num_threads()));
        assert_eq!(par, Parallelism::Parallel);
        assert_eq!(threads, 2);
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param::<f32>("eta", " 0.5 "), Ok(0.5));
        let err = parse_param::<u32>("max_depth", "deep").unwrap_err();
        assert_eq!(err.name, "max_depth");
        assert_eq!(err.value, "deep");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("silent", "1"), Ok(true));
        assert_eq!(parse_flag("silent", "false"), Ok(false));
        assert!(parse_flag("silent", "2").is_err());
    }
}
