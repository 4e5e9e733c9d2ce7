//! Deferred chunked raster computation.
//!
//! Raster reductions over a long observation stack are described as a
//! grid-shaped computation evaluated chunk-of-rows at a time by the worker
//! pool, and only turned into a concrete `Array2` at an explicit
//! `materialize()` call. Algorithms that need random access across the full
//! array (contour tracing) must run after that barrier, never against the
//! deferred form.

use crate::types::{ShoreError, ShoreResult};
use ndarray::Array2;
use std::ops::Range;

/// Default number of raster rows evaluated per work unit
pub const DEFAULT_CHUNK_ROWS: usize = 512;

type ChunkOp<'a, T> = Box<dyn Fn(Range<usize>) -> Vec<T> + Send + Sync + 'a>;

/// A grid-shaped computation that has not been evaluated yet.
///
/// The closure receives a row range and returns that chunk's values in
/// row-major order (`range.len() * cols` elements). The lifetime allows
/// closures to borrow the observation stack they reduce over.
pub struct DeferredGrid<'a, T> {
    rows: usize,
    cols: usize,
    chunk_rows: usize,
    op: ChunkOp<'a, T>,
}

impl<'a, T: Clone + Send + 'a> DeferredGrid<'a, T> {
    pub fn new<F>(rows: usize, cols: usize, op: F) -> Self
    where
        F: Fn(Range<usize>) -> Vec<T> + Send + Sync + 'a,
    {
        Self {
            rows,
            cols,
            chunk_rows: DEFAULT_CHUNK_ROWS,
            op: Box::new(op),
        }
    }

    /// Override the chunk height (work-unit granularity)
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows.max(1);
        self
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Compose a per-element transformation without evaluating anything
    pub fn map<U, F>(self, f: F) -> DeferredGrid<'a, U>
    where
        U: Clone + Send + 'a,
        F: Fn(T) -> U + Send + Sync + 'a,
    {
        let inner = self.op;
        DeferredGrid {
            rows: self.rows,
            cols: self.cols,
            chunk_rows: self.chunk_rows,
            op: Box::new(move |range| inner(range).into_iter().map(&f).collect()),
        }
    }

    fn chunk_ranges(&self) -> Vec<Range<usize>> {
        (0..self.rows)
            .step_by(self.chunk_rows)
            .map(|start| start..(start + self.chunk_rows).min(self.rows))
            .collect()
    }

    /// Evaluate the computation and assemble the full array.
    ///
    /// This is the synchronization barrier between the chunked/lazy stage
    /// of the pipeline and algorithms needing random array access.
    pub fn materialize(&self) -> ShoreResult<Array2<T>> {
        let ranges = self.chunk_ranges();
        log::debug!(
            "Materializing {}x{} grid in {} chunks",
            self.rows,
            self.cols,
            ranges.len()
        );

        let chunks = self.evaluate_chunks(&ranges);

        let mut data = Vec::with_capacity(self.rows * self.cols);
        for (range, chunk) in ranges.iter().zip(chunks) {
            let expected = range.len() * self.cols;
            if chunk.len() != expected {
                return Err(ShoreError::Processing(format!(
                    "Chunk rows {}..{} produced {} values, expected {}",
                    range.start,
                    range.end,
                    chunk.len(),
                    expected
                )));
            }
            data.extend(chunk);
        }

        Array2::from_shape_vec((self.rows, self.cols), data)
            .map_err(|e| ShoreError::Processing(format!("Failed to assemble grid: {}", e)))
    }

    #[cfg(feature = "parallel")]
    fn evaluate_chunks(&self, ranges: &[Range<usize>]) -> Vec<Vec<T>> {
        use rayon::prelude::*;
        ranges.par_iter().map(|r| (self.op)(r.clone())).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_chunks(&self, ranges: &[Range<usize>]) -> Vec<Vec<T>> {
        ranges.iter().map(|r| (self.op)(r.clone())).collect()
    }
}
