//! Recycling of matrix buffers.
//!
//! Forward and backward passes allocate many short-lived intermediate
//! matrices of a handful of shapes. The pool keeps released buffers in
//! buckets keyed by element count and hands them out again on `acquire`.
//! A miss simply allocates, so acquiring never blocks on availability and
//! never fails.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{trace, warn};

use crate::mat::matrix::Matrix;
use crate::mat::numeric::Float;

/// How a matrix obtained from the pool is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    /// Every element is zero.
    Zeroed,
    /// Elements hold whatever a recycled buffer contained. The caller is
    /// expected to overwrite all of them.
    Uninitialized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Released buffers kept per bucket; further releases are dropped.
    pub max_per_bucket: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig { max_per_bucket: 64 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub hits: usize,
    pub misses: usize,
    pub retained: usize,
}

#[derive(Debug)]
pub struct MatrixPool<T> {
    config: PoolConfig,
    buckets: Mutex<HashMap<usize, Vec<Vec<T>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<T: Float> Default for MatrixPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Float> MatrixPool<T> {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        MatrixPool {
            config,
            buckets: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<usize, Vec<Vec<T>>>> {
        self.buckets.lock().unwrap_or_else(|poisoned| {
            warn!("Matrix pool mutex was poisoned. Recovering.");
            poisoned.into_inner()
        })
    }

    /// Returns a `rows x cols` matrix, reusing a released buffer when one of
    /// the right size is available.
    pub fn acquire(&self, rows: usize, cols: usize, fill: FillPolicy) -> Matrix<T> {
        let size = rows * cols;
        let reused = self.lock().get_mut(&size).and_then(Vec::pop);
        match reused {
            Some(mut data) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                if fill == FillPolicy::Zeroed {
                    data.iter_mut().for_each(|v| *v = T::zero());
                }
                Matrix::from_raw(rows, cols, data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!("Matrix pool miss for {}x{}", rows, cols);
                Matrix::from_raw(rows, cols, vec![T::zero(); size])
            }
        }
    }

    /// Takes a matrix back. The buffer is kept for reuse unless its bucket
    /// is already full.
    pub fn release(&self, matrix: Matrix<T>) {
        let data = matrix.into_data();
        if data.is_empty() {
            return;
        }
        let mut buckets = self.lock();
        let bucket = buckets.entry(data.len()).or_default();
        if bucket.len() < self.config.max_per_bucket {
            bucket.push(data);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let retained = self.lock().values().map(Vec::len).sum();
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            retained,
        }
    }

    /// Drops every retained buffer.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
