//! Parallel processing utilities for the MLS engine
//!
//! Per-point work (projection, curvature, grid sampling) runs through these
//! helpers. A dedicated rayon pool can be installed once with
//! [`init_thread_pool`]; otherwise rayon's global pool is used.
//!
//! ```rust
//! use mlsurf_reconstruction::parallel::{init_thread_pool, ThreadPoolConfig};
//!
//! // Four workers with a larger stack
//! let config = ThreadPoolConfig::default()
//!     .with_threads(4)
//!     .with_stack_size(16 * 1024 * 1024);
//!
//! init_thread_pool(config).expect("Failed to initialize thread pool");
//! ```

use mlsurf_core::{Error, Point3d, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Mutex, OnceLock};

static GLOBAL_THREAD_POOL: OnceLock<Arc<ThreadPool>> = OnceLock::new();
static THREAD_POOL_CONFIG: Mutex<ThreadPoolConfig> = Mutex::new(ThreadPoolConfig::new());

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = one per logical CPU)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Inputs shorter than this run sequentially
    pub min_chunk_size: usize,
}

impl ThreadPoolConfig {
    const fn new() -> Self {
        Self {
            num_threads: None,
            stack_size: None,
            thread_name_prefix: String::new(),
            enabled: true,
            min_chunk_size: 64,
        }
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the sequential cut-off
    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "mlsurf-recon".to_string(),
            ..Self::new()
        }
    }
}

/// Initialize the global thread pool with custom configuration
pub fn init_thread_pool(config: ThreadPoolConfig) -> Result<()> {
    if GLOBAL_THREAD_POOL.get().is_some() {
        return Ok(()); // Already initialized
    }

    let mut builder = ThreadPoolBuilder::new()
        .num_threads(config.num_threads.unwrap_or_else(num_cpus::get));

    if let Some(stack_size) = config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    let pool = builder
        .build()
        .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))?;

    if let Ok(mut global_config) = THREAD_POOL_CONFIG.lock() {
        *global_config = config;
    }

    GLOBAL_THREAD_POOL
        .set(Arc::new(pool))
        .map_err(|_| Error::Algorithm("Thread pool already initialized".to_string()))?;

    Ok(())
}

/// Get current thread pool configuration
pub fn get_config() -> ThreadPoolConfig {
    THREAD_POOL_CONFIG
        .lock()
        .map(|config| config.clone())
        .unwrap_or_else(|_| ThreadPoolConfig::default())
}

/// Number of worker threads parallel operations will use
pub fn current_num_threads() -> usize {
    GLOBAL_THREAD_POOL
        .get()
        .map_or_else(rayon::current_num_threads, |pool| pool.current_num_threads())
}

/// Execute a parallel operation on the configured pool
pub fn execute_parallel<F, R>(op: F) -> R
where
    F: FnOnce() -> R + Send,
    R: Send,
{
    match GLOBAL_THREAD_POOL.get() {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

fn run_sequentially(len: usize) -> bool {
    let config = get_config();
    !config.enabled || len < config.min_chunk_size
}

/// Parallel map operation
pub fn parallel_map<T, U, F>(data: &[T], f: F) -> Vec<U>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> U + Sync + Send,
{
    if run_sequentially(data.len()) {
        return data.iter().map(f).collect();
    }

    execute_parallel(|| data.par_iter().map(f).collect())
}

/// Fallible parallel map with index; stops scheduling work after the first error
pub fn parallel_try_map_indexed<T, U, F>(data: &[T], f: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(usize, &T) -> Result<U> + Sync + Send,
{
    if run_sequentially(data.len()) {
        return data.iter().enumerate().map(|(i, x)| f(i, x)).collect();
    }

    execute_parallel(|| data.par_iter().enumerate().map(|(i, x)| f(i, x)).collect())
}

/// Parallel reduce operation
pub fn parallel_reduce<T, U, F, R>(data: &[T], identity: U, map_op: F, reduce_op: R) -> U
where
    T: Sync,
    U: Clone + Send + Sync,
    F: Fn(&T) -> U + Sync + Send,
    R: Fn(U, U) -> U + Sync + Send,
{
    if run_sequentially(data.len()) {
        return data.iter().map(map_op).fold(identity, reduce_op);
    }

    execute_parallel(|| {
        data.par_iter()
            .map(map_op)
            .reduce(|| identity.clone(), reduce_op)
    })
}

/// Parallel bounding box computation
pub fn parallel_bounding_box(points: &[Point3d]) -> Option<(Point3d, Point3d)> {
    if points.is_empty() {
        return None;
    }

    let bounds = parallel_reduce(
        points,
        (
            Point3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            Point3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        ),
        |point| (*point, *point),
        |(min1, max1), (min2, max2)| (min1.inf(&min2), max1.sup(&max2)),
    );

    Some(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default()
            .with_threads(4)
            .with_stack_size(16 * 1024 * 1024)
            .with_min_chunk_size(10)
            .with_enabled(true);

        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.stack_size, Some(16 * 1024 * 1024));
        assert_eq!(config.min_chunk_size, 10);
        assert_eq!(config.thread_name_prefix, "mlsurf-recon");
        assert!(config.enabled);
    }

    #[test]
    fn test_parallel_map() {
        let data: Vec<usize> = (0..500).collect();
        let result = parallel_map(&data, |x| x * 2);
        assert_eq!(result[499], 998);
        assert!(current_num_threads() >= 1);
    }

    #[test]
    fn test_parallel_try_map_propagates_errors() {
        let data: Vec<usize> = (0..500).collect();
        let ok = parallel_try_map_indexed(&data, |_, x| Ok(*x));
        assert_eq!(ok.unwrap().len(), 500);

        let failed = parallel_try_map_indexed(&data, |i, x| {
            if i == 250 {
                Err(Error::Cancelled)
            } else {
                Ok(*x)
            }
        });
        assert_eq!(failed, Err(Error::Cancelled));
    }

    #[test]
    fn test_parallel_reduce() {
        let data = vec![1, 2, 3, 4, 5];
        let sum = parallel_reduce(&data, 0, |x| *x, |a, b| a + b);
        assert_eq!(sum, 15);
    }

    #[test]
    fn test_bounding_box() {
        let points = vec![
            Point3d::new(0.0, 0.0, 0.0),
            Point3d::new(1.0, 1.0, 1.0),
            Point3d::new(-1.0, -1.0, -1.0),
            Point3d::new(2.0, 0.5, -0.5),
        ];

        let (min_pt, max_pt) = parallel_bounding_box(&points).unwrap();
        assert_eq!(min_pt, Point3d::new(-1.0, -1.0, -1.0));
        assert_eq!(max_pt, Point3d::new(2.0, 1.0, 1.0));
        assert!(parallel_bounding_box(&[]).is_none());
    }
}
