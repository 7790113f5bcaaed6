use std::ops::Range;

use rayon::prelude::*;

use crate::adjacency::{NeighborRecord, SparseAdjacency};
use crate::config::check_radius;
use crate::error::{LpqError, Result};
use crate::kdtree::KdIndex;
use crate::metric::{Metric, with_metric};
use crate::points::check_rows;
use crate::search::Neighbor;
use crate::util::Timed;

/// Search radius of a batch: one for all queries, or one per query row.
#[derive(Clone, Copy, Debug)]
pub enum Radii<'a> {
    Shared(f64),
    PerQuery(&'a [f64]),
}

impl From<f64> for Radii<'_> {
    fn from(radius: f64) -> Self {
        Radii::Shared(radius)
    }
}

impl<'a> From<&'a [f64]> for Radii<'a> {
    fn from(radii: &'a [f64]) -> Self {
        Radii::PerQuery(radii)
    }
}

impl<'a> From<&'a Vec<f64>> for Radii<'a> {
    fn from(radii: &'a Vec<f64>) -> Self {
        Radii::PerQuery(radii)
    }
}

impl Radii<'_> {
    #[inline]
    fn get(&self, row: usize) -> f64 {
        match self {
            Radii::Shared(radius) => *radius,
            Radii::PerQuery(radii) => radii[row],
        }
    }

    fn validate(&self, n_queries: usize) -> Result<()> {
        match self {
            Radii::Shared(radius) => check_radius(*radius),
            Radii::PerQuery(radii) => {
                if radii.len() != n_queries {
                    return Err(LpqError::InvalidDimension(format!(
                        "{} radii given for {n_queries} queries",
                        radii.len()
                    )));
                }
                radii.iter().try_for_each(|&r| check_radius(r))
            }
        }
    }
}

/// Splits `rows` into at most `parts` contiguous ranges whose sizes differ by
/// at most one, larger ranges first.
pub(crate) fn partition_rows(rows: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, rows.max(1));
    let base = rows / parts;
    let extra = rows % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Runs `work` over contiguous row chunks, one chunk per worker, and returns
/// the per-worker buffers in chunk order.
///
/// `threads == 0` uses the current rayon pool; otherwise a dedicated pool of
/// that many threads is built for the call.
pub(crate) fn run_chunks<F>(rows: usize, threads: usize, work: F) -> Result<Vec<Vec<NeighborRecord>>>
where
    F: Fn(Range<usize>) -> Vec<NeighborRecord> + Sync,
{
    let workers = if threads == 0 { rayon::current_num_threads() } else { threads };
    let chunks = partition_rows(rows, workers);
    if chunks.len() == 1 {
        return Ok(chunks.into_iter().map(&work).collect());
    }

    let workers = chunks.len();
    let run = || -> Vec<Vec<NeighborRecord>> { chunks.into_par_iter().map(&work).collect() };
    if threads == 0 {
        Ok(run())
    } else {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        Ok(pool.install(run))
    }
}

impl KdIndex {
    /// Radius search for every row of the flat `queries` buffer, split over
    /// `threads` workers.
    ///
    /// Row `i` of the result holds the matches of query `i`; matches inside a
    /// row are unordered.
    pub fn radius_search_batch<'r>(
        &self,
        queries: &[f64],
        radii: impl Into<Radii<'r>>,
        threads: usize,
    ) -> Result<SparseAdjacency> {
        let n_queries = check_rows(queries.len(), self.dim())?;
        let radii = radii.into();
        radii.validate(n_queries)?;

        let _t = Timed::debug("batch radius search");
        let buffers = with_metric!(self.metric, M => run_chunks(n_queries, threads, |range| {
            self.radius_chunk::<M>(queries, &radii, range)
        }))?;
        let adjacency = SparseAdjacency::assemble(buffers, n_queries, self.len());
        log::debug!("radius search: {} queries, {} matches", n_queries, adjacency.nnz());
        Ok(adjacency)
    }

    /// k-nearest search for every row of `queries`; each row is sorted by
    /// distance.
    pub fn knn_search_batch(&self, queries: &[f64], k: usize, threads: usize) -> Result<SparseAdjacency> {
        let n_queries = check_rows(queries.len(), self.dim())?;

        let _t = Timed::debug("batch knn search");
        let buffers = with_metric!(self.metric, M => run_chunks(n_queries, threads, |range| {
            self.knn_chunk::<M>(queries, k, range)
        }))?;
        Ok(SparseAdjacency::assemble(buffers, n_queries, self.len()))
    }

    fn radius_chunk<M: Metric>(&self, queries: &[f64], radii: &Radii<'_>, range: Range<usize>) -> Vec<NeighborRecord> {
        log::trace!("radius worker: rows {:?}", range);
        let dim = self.dim();
        let mut records = Vec::new();
        let mut found: Vec<Neighbor> = Vec::new();
        for row in range {
            found.clear();
            self.radius_into::<M>(&queries[row * dim..(row + 1) * dim], radii.get(row), &mut found);
            records.extend(found.iter().map(|n| NeighborRecord {
                row,
                col: n.index,
                distance: n.distance,
            }));
        }
        records
    }

    fn knn_chunk<M: Metric>(&self, queries: &[f64], k: usize, range: Range<usize>) -> Vec<NeighborRecord> {
        log::trace!("knn worker: rows {:?}", range);
        let dim = self.dim();
        let mut records = Vec::with_capacity(range.len() * k.min(self.len()));
        for row in range {
            let found = self.knn_into::<M>(&queries[row * dim..(row + 1) * dim], k);
            records.extend(found.into_iter().map(|n| NeighborRecord {
                row,
                col: n.index,
                distance: n.distance,
            }));
        }
        records
    }
}
