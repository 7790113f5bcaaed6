use crate::error::{LpqError, Result};
use crate::metric::MetricKind;
use crate::points::PointSet;
use crate::util::Timed;

/// Fits above this dimension still work but prune poorly.
const HIGH_DIMENSION: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum KdNode {
    // Leaf data: indices[start..end]
    Leaf {
        start: u32,
        end: u32,
    },
    Internal {
        axis: u32,
        split: f64,
        left: u32,
        right: u32,
    },
}

/// A k-d tree over a [`PointSet`], specialized for one [`MetricKind`].
///
/// Nodes are stored in an arena in pre-order, so the root is node 0 and every
/// child offset is larger than its parent's. Each node caches the
/// per-coordinate bounding box of its subtree, which the grouped metrics read
/// group by group when pruning.
#[derive(Clone, Debug)]
pub struct KdIndex {
    pub(crate) points: PointSet,
    pub(crate) metric: MetricKind,
    pub(crate) leaf_size: usize,
    pub(crate) nodes: Vec<KdNode>,
    // Node `i` owns `bounds[2 * i * dim..2 * (i + 1) * dim]`: `dim` minima then `dim` maxima.
    pub(crate) bounds: Vec<f64>,
    // Permutation of point rows; every leaf owns a contiguous range of it.
    pub(crate) indices: Vec<u32>,
}

impl KdIndex {
    /// Builds the tree over `points`.
    ///
    /// Ranges of at most `leaf_size` points become leaves. Larger ranges are
    /// split at the median of the coordinate with the largest spread.
    pub fn build(points: PointSet, leaf_size: usize, metric: MetricKind) -> Result<Self> {
        if leaf_size == 0 {
            return Err(LpqError::InvalidConfig("leaf_size must be positive"));
        }
        let count = points.rows();
        if count > u32::MAX as usize {
            return Err(LpqError::InvalidDimension(format!(
                "{count} points exceed the index capacity of {}",
                u32::MAX
            )));
        }
        if points.dim() > HIGH_DIMENSION {
            log::warn!(
                "fitting a k-d tree on {} dimensions; pruning degrades in high-dimensional spaces, \
                 consider the two-level mean-point search",
                points.dim()
            );
        }

        let _t = Timed::debug("kd-tree build");
        let mut tree = KdIndex {
            points,
            metric,
            leaf_size,
            nodes: Vec::new(),
            bounds: Vec::new(),
            indices: (0..count as u32).collect(),
        };

        if count > 0 {
            // A balanced tree has about 2 * N / leaf_size nodes
            let estimate = 2 * count.div_ceil(leaf_size);
            tree.nodes.reserve(estimate);
            tree.bounds.reserve(estimate * 2 * tree.points.dim());
            tree.build_recursive(0, count);
        }

        log::debug!(
            "built {} kd-tree: {} points, dim {}, group width {}, {} nodes",
            metric,
            count,
            tree.points.dim(),
            tree.points.group_width(),
            tree.nodes.len()
        );
        Ok(tree)
    }

    fn build_recursive(&mut self, start: usize, end: usize) -> u32 {
        let dim = self.points.dim();
        let node_idx = self.nodes.len() as u32;
        self.nodes.push(KdNode::Leaf {
            start: start as u32,
            end: end as u32,
        });

        // Compute bounding box for this range
        let base = self.bounds.len();
        self.bounds.extend(std::iter::repeat_n(f64::INFINITY, dim));
        self.bounds.extend(std::iter::repeat_n(f64::NEG_INFINITY, dim));
        for &idx in &self.indices[start..end] {
            let row = self.points.row(idx as usize);
            let (min, max) = self.bounds[base..base + 2 * dim].split_at_mut(dim);
            for (k, &v) in row.iter().enumerate() {
                if v < min[k] {
                    min[k] = v;
                }
                if v > max[k] {
                    max[k] = v;
                }
            }
        }

        let count = end - start;
        if count <= self.leaf_size {
            return node_idx;
        }

        let (min, max) = self.bounds[base..base + 2 * dim].split_at(dim);
        let mut axis = 0;
        let mut spread = max[0] - min[0];
        for k in 1..dim {
            if max[k] - min[k] > spread {
                spread = max[k] - min[k];
                axis = k;
            }
        }
        // All points in the range coincide; no split can separate them.
        if !(spread > 0.0) {
            return node_idx;
        }

        // Median split
        let mid = count / 2;
        let points = &self.points;
        self.indices[start..end].select_nth_unstable_by(mid, |&a, &b| {
            let va = points.row(a as usize)[axis];
            let vb = points.row(b as usize)[axis];
            va.total_cmp(&vb)
        });
        let split = points.row(self.indices[start + mid] as usize)[axis];

        let left = self.build_recursive(start, start + mid);
        let right = self.build_recursive(start + mid, end);

        self.nodes[node_idx as usize] = KdNode::Internal {
            axis: axis as u32,
            split,
            left,
            right,
        };
        node_idx
    }

    /// Bounding box `(min, max)` of a node's subtree.
    #[inline]
    pub(crate) fn node_bounds(&self, node: u32) -> (&[f64], &[f64]) {
        let dim = self.points.dim();
        let base = node as usize * 2 * dim;
        self.bounds[base..base + 2 * dim].split_at(dim)
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.points.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.points.dim()
    }

    pub fn group_width(&self) -> usize {
        self.points.group_width()
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The indexed points, in their original order.
    pub fn points(&self) -> &PointSet {
        &self.points
    }

    pub fn into_points(self) -> PointSet {
        self.points
    }

    /// Number of levels from the root to the deepest leaf.
    pub fn depth(&self) -> usize {
        fn walk(nodes: &[KdNode], node: u32) -> usize {
            match nodes[node as usize] {
                KdNode::Leaf { .. } => 1,
                KdNode::Internal { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }
}
