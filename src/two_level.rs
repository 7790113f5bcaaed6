//! Coarse-then-exact radius search over long grouped points.
//!
//! A full point of dimension `d` is cut into pieces of `w` coordinates (one
//! position of a sequence, say). The pieces are gathered into `m` contiguous
//! blocks and every block is averaged piece-wise, giving a *mean point* of
//! dimension `m * w`. A k-d tree over mean points answers a shrunken-radius
//! query, and every candidate is re-scored on the full coordinates.
//!
//! Averaging `B = d / (m * w)` pieces shrinks the sum-of-norms metrics by at
//! least a factor `B` (triangle inequality per block), and the Euclidean
//! metric by at least `sqrt(B)`, so the coarse radius below never drops a true
//! neighbor.

use std::ops::Range;

use crate::adjacency::{NeighborRecord, SparseAdjacency};
use crate::batch::run_chunks;
use crate::config::check_radius;
use crate::error::{LpqError, Result};
use crate::kdtree::KdIndex;
use crate::metric::{Metric, MetricKind, with_metric};
use crate::points::{PointSet, check_rows};
use crate::search::Neighbor;
use crate::util::Timed;

/// Relative widening of the coarse radius, covering rounding in the averages.
const COARSE_RADIUS_SLACK: f64 = 1e-9;

/// Averages each row of `coords` into a mean point.
///
/// Every row of `dim` coordinates is read as `dim / piece_width` pieces,
/// grouped into `group_count` consecutive blocks; the result holds
/// `group_count * piece_width` coordinates per row.
pub fn mean_points(coords: &[f64], dim: usize, piece_width: usize, group_count: usize) -> Result<Vec<f64>> {
    let rows = check_rows(coords.len(), dim)?;
    if piece_width == 0 || dim % piece_width != 0 {
        return Err(LpqError::InvalidDimension(format!(
            "piece width {piece_width} does not divide dimension {dim}"
        )));
    }
    let pieces = dim / piece_width;
    if group_count == 0 || pieces % group_count != 0 {
        return Err(LpqError::InvalidDimension(format!(
            "{pieces} pieces per point cannot be split into {group_count} equal blocks"
        )));
    }
    let per_block = pieces / group_count;
    let block_len = per_block * piece_width;
    let scale = 1.0 / per_block as f64;

    let mut means = Vec::with_capacity(rows * group_count * piece_width);
    for row in coords.chunks_exact(dim) {
        for block in row.chunks_exact(block_len) {
            let start = means.len();
            means.resize(start + piece_width, 0.0);
            for piece in block.chunks_exact(piece_width) {
                for (acc, &v) in means[start..].iter_mut().zip(piece) {
                    *acc += v;
                }
            }
            for acc in &mut means[start..] {
                *acc *= scale;
            }
        }
    }
    Ok(means)
}

/// Radius on mean points that keeps every full-resolution neighbor within
/// `radius`.
///
/// `mean_dim` and `full_dim` are coordinate counts of a mean point and a full
/// point. `l22` is rejected: no coarse bound is derived for it.
pub fn coarse_radius(metric: MetricKind, radius: f64, mean_dim: usize, full_dim: usize) -> Result<f64> {
    check_radius(radius)?;
    if mean_dim == 0 || full_dim == 0 || full_dim % mean_dim != 0 {
        return Err(LpqError::InvalidDimension(format!(
            "mean dimension {mean_dim} does not divide full dimension {full_dim}"
        )));
    }
    let ratio = mean_dim as f64 / full_dim as f64;
    let coarse = match metric {
        MetricKind::L1 | MetricKind::L11 | MetricKind::L21 => radius * ratio,
        MetricKind::L2 => radius * ratio.sqrt(),
        MetricKind::L22 => {
            return Err(LpqError::UnsupportedMetric(
                "two-level search supports only l1, l2, l11, or l21".into(),
            ));
        }
    };
    Ok(coarse * (1.0 + COARSE_RADIUS_SLACK))
}

impl KdIndex {
    /// Two-level radius search; `self` must be built over the mean points of
    /// `full_tree`.
    ///
    /// `full_queries` is reduced with the same `group_count` blocks, searched
    /// on `self` with the coarse radius, and every candidate is kept only if
    /// its exact distance on full coordinates is within `radius`. Distances in
    /// the result are full-resolution distances.
    pub fn radius_search_full(
        &self,
        full_tree: &PointSet,
        full_queries: &[f64],
        radius: f64,
        group_count: usize,
        threads: usize,
    ) -> Result<SparseAdjacency> {
        let metric = self.metric;
        if !metric.supports_two_level() {
            return Err(LpqError::UnsupportedMetric(format!(
                "{metric} cannot be used with mean points; use l1, l2, l11, or l21"
            )));
        }
        let mean_dim = self.dim();
        if group_count == 0 || mean_dim % group_count != 0 {
            return Err(LpqError::InvalidDimension(format!(
                "{group_count} mean groups do not divide the index dimension {mean_dim}"
            )));
        }
        let piece_width = mean_dim / group_count;
        if metric.is_grouped() && piece_width != self.group_width() {
            return Err(LpqError::InvalidDimension(format!(
                "mean pieces of width {piece_width} do not match the metric group width {}",
                self.group_width()
            )));
        }
        if full_tree.rows() != self.len() {
            return Err(LpqError::InvalidDimension(format!(
                "index holds {} mean points but {} full points were supplied",
                self.len(),
                full_tree.rows()
            )));
        }
        let full_dim = full_tree.dim();
        let n_queries = check_rows(full_queries.len(), full_dim)?;
        let coarse = coarse_radius(metric, radius, mean_dim, full_dim)?;
        let mean_queries = mean_points(full_queries, full_dim, piece_width, group_count)?;
        log::debug!(
            "two-level search: {} queries, radius {} on {} dims, coarse radius {} on {} dims",
            n_queries,
            radius,
            full_dim,
            coarse,
            mean_dim
        );

        let _t = Timed::debug("two-level radius search");
        let refine = Refinement {
            full_tree,
            full_queries,
            mean_queries: &mean_queries,
            radius,
            coarse,
        };
        let buffers = with_metric!(metric, M => run_chunks(n_queries, threads, |range| {
            self.refine_chunk::<M>(&refine, range)
        }))?;
        Ok(SparseAdjacency::assemble(buffers, n_queries, self.len()))
    }

    fn refine_chunk<M: Metric>(&self, refine: &Refinement<'_>, range: Range<usize>) -> Vec<NeighborRecord> {
        let full_dim = refine.full_tree.dim();
        let mean_dim = self.dim();
        let group_width = self.group_width();
        let bound = M::search_bound(refine.radius);

        let mut records = Vec::new();
        let mut candidates: Vec<Neighbor> = Vec::new();
        let mut rejected = 0usize;
        for row in range {
            candidates.clear();
            let mean_query = &refine.mean_queries[row * mean_dim..(row + 1) * mean_dim];
            self.radius_into::<M>(mean_query, refine.coarse, &mut candidates);

            let full_query = &refine.full_queries[row * full_dim..(row + 1) * full_dim];
            for candidate in &candidates {
                let full_point = refine.full_tree.row(candidate.index);
                let d = M::reduced_distance(full_query, full_point, group_width, bound);
                if d <= bound && M::within(d, refine.radius) {
                    records.push(NeighborRecord {
                        row,
                        col: candidate.index,
                        distance: M::from_reduced(d),
                    });
                } else {
                    rejected += 1;
                }
            }
        }
        log::trace!("refinement worker: {} kept, {} rejected", records.len(), rejected);
        records
    }
}

struct Refinement<'a> {
    full_tree: &'a PointSet,
    full_queries: &'a [f64],
    mean_queries: &'a [f64],
    radius: f64,
    coarse: f64,
}
