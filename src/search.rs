use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::config::check_radius;
use crate::error::{LpqError, Result};
use crate::kdtree::{KdIndex, KdNode};
use crate::metric::{Metric, with_metric};

/// A point of the index found by a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Row of the point in the fitted data.
    pub index: usize,
    /// Distance to the query, in the metric's units.
    pub distance: f64,
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    reduced: f64,
    index: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reduced
            .total_cmp(&other.reduced)
            .then(self.index.cmp(&other.index))
    }
}

impl KdIndex {
    pub(crate) fn check_query(&self, query: &[f64]) -> Result<()> {
        if query.len() != self.dim() {
            return Err(LpqError::InvalidDimension(format!(
                "query has {} coordinates, index has {}",
                query.len(),
                self.dim()
            )));
        }
        Ok(())
    }

    /// All points within `radius` of `query` (inclusive), in no particular order.
    pub fn radius_search(&self, query: &[f64], radius: f64) -> Result<Vec<Neighbor>> {
        self.check_query(query)?;
        check_radius(radius)?;
        let mut found = Vec::new();
        with_metric!(self.metric, M => self.radius_into::<M>(query, radius, &mut found));
        Ok(found)
    }

    /// The `k` points closest to `query`, nearest first.
    ///
    /// Points at equal distance are kept in traversal order and reported by
    /// ascending index.
    pub fn knn_search(&self, query: &[f64], k: usize) -> Result<Vec<Neighbor>> {
        self.check_query(query)?;
        Ok(with_metric!(self.metric, M => self.knn_into::<M>(query, k)))
    }

    pub(crate) fn radius_into<M: Metric>(&self, query: &[f64], radius: f64, out: &mut Vec<Neighbor>) {
        if self.nodes.is_empty() {
            return;
        }
        let bound = M::search_bound(radius);
        let (min, max) = self.node_bounds(0);
        if M::reduced_box_distance(query, min, max, self.group_width()) > bound {
            return;
        }
        self.radius_recursive::<M>(0, query, radius, bound, out);
    }

    // `bound` prunes in the reduced domain; the final test compares real distances.
    fn radius_recursive<M: Metric>(&self, node: u32, query: &[f64], radius: f64, bound: f64, out: &mut Vec<Neighbor>) {
        let group_width = self.group_width();
        match self.nodes[node as usize] {
            KdNode::Leaf { start, end } => {
                for &idx in &self.indices[start as usize..end as usize] {
                    let row = self.points.row(idx as usize);
                    let d = M::reduced_distance(query, row, group_width, bound);
                    if d <= bound && M::within(d, radius) {
                        out.push(Neighbor {
                            index: idx as usize,
                            distance: M::from_reduced(d),
                        });
                    }
                }
            }
            KdNode::Internal { axis, split, left, right } => {
                // Visit the side of the split holding the query first
                let (first, second) = if query[axis as usize] <= split { (left, right) } else { (right, left) };
                for child in [first, second] {
                    let (min, max) = self.node_bounds(child);
                    if M::reduced_box_distance(query, min, max, group_width) <= bound {
                        self.radius_recursive::<M>(child, query, radius, bound, out);
                    }
                }
            }
        }
    }

    pub(crate) fn knn_into<M: Metric>(&self, query: &[f64], k: usize) -> Vec<Neighbor> {
        if k == 0 || self.nodes.is_empty() {
            return Vec::new();
        }
        let mut heap = BinaryHeap::with_capacity(k + 1);
        self.knn_recursive::<M>(0, query, k, &mut heap);
        heap.into_sorted_vec()
            .into_iter()
            .map(|c| Neighbor {
                index: c.index as usize,
                distance: M::from_reduced(c.reduced),
            })
            .collect()
    }

    fn knn_recursive<M: Metric>(&self, node: u32, query: &[f64], k: usize, heap: &mut BinaryHeap<Candidate>) {
        let group_width = self.group_width();
        let worst = |heap: &BinaryHeap<Candidate>| {
            if heap.len() < k {
                f64::INFINITY
            } else {
                heap.peek().map_or(f64::INFINITY, |c| c.reduced)
            }
        };

        match self.nodes[node as usize] {
            KdNode::Leaf { start, end } => {
                for &idx in &self.indices[start as usize..end as usize] {
                    let current = worst(heap);
                    let row = self.points.row(idx as usize);
                    let d = M::reduced_distance(query, row, group_width, current);
                    if heap.len() < k {
                        heap.push(Candidate { reduced: d, index: idx });
                    } else if d < current {
                        heap.pop();
                        heap.push(Candidate { reduced: d, index: idx });
                    }
                }
            }
            KdNode::Internal { axis, split, left, right } => {
                let (first, second) = if query[axis as usize] <= split { (left, right) } else { (right, left) };
                let bound_of = |child: u32| {
                    let (min, max) = self.node_bounds(child);
                    M::reduced_box_distance(query, min, max, group_width)
                };
                let first_bound = bound_of(first);
                let second_bound = bound_of(second);
                if heap.len() < k || first_bound < worst(heap) {
                    self.knn_recursive::<M>(first, query, k, heap);
                }
                // The first subtree may have tightened the k-th distance
                if heap.len() < k || second_bound < worst(heap) {
                    self.knn_recursive::<M>(second, query, k, heap);
                }
            }
        }
    }
}
