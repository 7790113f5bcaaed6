use std::io::{Read, Write};
use std::path::Path;

use crate::adjacency::SparseAdjacency;
use crate::batch::Radii;
use crate::config::TreeConfig;
use crate::error::{LpqError, Result};
use crate::kdtree::KdIndex;
use crate::points::PointSet;
use crate::two_level::mean_points;

/// A configured, possibly fitted, k-d tree.
///
/// The handle owns its index once fitted; [`fit`](Self::fit) and
/// [`load_index`](Self::load_index) replace it, so searches never run against
/// a half-built tree.
#[derive(Clone, Debug)]
pub struct LpqTree {
    config: TreeConfig,
    index: Option<KdIndex>,
}

impl LpqTree {
    pub fn new(config: TreeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, index: None })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.index.is_some()
    }

    /// Builds the index over `points` with the configured metric and leaf size.
    pub fn fit(&mut self, points: PointSet) -> Result<&mut Self> {
        let index = KdIndex::build(points, self.config.leaf_size, self.config.metric)?;
        self.index = Some(index);
        Ok(self)
    }

    /// Fitted index, or [`LpqError::NotFitted`].
    pub fn index(&self) -> Result<&KdIndex> {
        self.index.as_ref().ok_or(LpqError::NotFitted)
    }

    /// Points the index was fitted on.
    pub fn data(&self) -> Result<&PointSet> {
        Ok(self.index()?.points())
    }

    pub fn radius_search<'r>(
        &self,
        queries: &[f64],
        radius: impl Into<Radii<'r>>,
        threads: usize,
    ) -> Result<SparseAdjacency> {
        self.index()?.radius_search_batch(queries, radius, threads)
    }

    /// Radius search with `config.radius` on the ambient thread pool.
    pub fn radius_search_default(&self, queries: &[f64]) -> Result<SparseAdjacency> {
        self.radius_search(queries, self.config.radius, 0)
    }

    pub fn knn_search(&self, queries: &[f64], k: usize, threads: usize) -> Result<SparseAdjacency> {
        self.index()?.knn_search_batch(queries, k, threads)
    }

    /// k-nearest search with `config.n_neighbors` on the ambient thread pool.
    pub fn knn_search_default(&self, queries: &[f64]) -> Result<SparseAdjacency> {
        self.knn_search(queries, self.config.n_neighbors, 0)
    }

    /// Writes the tree topology to `path`, returning the number of bytes written.
    pub fn save_index<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        self.index()?.save_to_path(path)
    }

    pub fn save_index_to_writer<W: Write>(&self, writer: W) -> Result<u64> {
        self.index()?.save_to_writer(writer)
    }

    /// Restores a topology saved by [`save_index`](Self::save_index) and joins
    /// it with `coords`, the same points in the same order as at save time.
    ///
    /// The stored metric must match the configured one.
    pub fn load_index<P: AsRef<Path>>(&mut self, path: P, coords: Vec<f64>) -> Result<&mut Self> {
        let index = KdIndex::load_from_path(path, coords)?;
        self.install(index)
    }

    pub fn load_index_from_reader<R: Read>(&mut self, reader: R, coords: Vec<f64>) -> Result<&mut Self> {
        let index = KdIndex::load_from_reader(reader, coords)?;
        self.install(index)
    }

    fn install(&mut self, index: KdIndex) -> Result<&mut Self> {
        if index.metric() != self.config.metric {
            return Err(LpqError::UnsupportedMetric(format!(
                "index file was built with {}, tree is configured for {}",
                index.metric(),
                self.config.metric
            )));
        }
        if index.leaf_size() != self.config.leaf_size {
            log::debug!(
                "loaded index uses leaf size {} instead of the configured {}",
                index.leaf_size(),
                self.config.leaf_size
            );
            self.config.leaf_size = index.leaf_size();
        }
        self.index = Some(index);
        Ok(self)
    }

    /// Two-level search; the fitted index must hold the mean points of
    /// `full_tree`. See [`KdIndex::radius_search_full`].
    pub fn radius_search_full(
        &self,
        full_tree: &PointSet,
        full_queries: &[f64],
        radius: f64,
        group_count: usize,
        threads: usize,
    ) -> Result<SparseAdjacency> {
        self.index()?
            .radius_search_full(full_tree, full_queries, radius, group_count, threads)
    }

    /// Fits on `tree` and searches `queries` in one call.
    ///
    /// With `group_count`, the index is fitted on the mean points of `tree`
    /// and the two-level search runs against the full rows; otherwise this is
    /// a plain fit followed by a batch radius search. The new index replaces
    /// the fitted one only when the search succeeds.
    pub fn fit_and_radius_search(
        &mut self,
        tree: PointSet,
        queries: &[f64],
        radius: f64,
        threads: usize,
        group_count: Option<usize>,
    ) -> Result<SparseAdjacency> {
        let metric = self.config.metric;
        let leaf_size = self.config.leaf_size;
        let (index, adjacency) = match group_count {
            None => {
                let index = KdIndex::build(tree, leaf_size, metric)?;
                let adjacency = index.radius_search_batch(queries, radius, threads)?;
                (index, adjacency)
            }
            Some(group_count) => {
                if !metric.supports_two_level() {
                    return Err(LpqError::UnsupportedMetric(format!(
                        "{metric} cannot be used with mean points; use l1, l2, l11, or l21"
                    )));
                }
                let piece_width = tree.group_width();
                let means = mean_points(tree.coords(), tree.dim(), piece_width, group_count)?;
                let coarse = PointSet::new(means, group_count * piece_width, piece_width)?;
                let index = KdIndex::build(coarse, leaf_size, metric)?;
                let adjacency = index.radius_search_full(&tree, queries, radius, group_count, threads)?;
                (index, adjacency)
            }
        };
        self.index = Some(index);
        Ok(adjacency)
    }
}
