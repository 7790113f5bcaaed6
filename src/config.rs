use crate::error::{LpqError, Result};
use crate::metric::MetricKind;

/// Parameters of an [`LpqTree`](crate::LpqTree).
///
/// `radius` and `n_neighbors` are the defaults used by the `*_default` search
/// methods; `leaf_size` and `metric` are fixed when the tree is fitted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeConfig {
    pub n_neighbors: usize,
    pub radius: f64,
    pub leaf_size: usize,
    pub metric: MetricKind,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            radius: 1.0,
            leaf_size: 10,
            metric: MetricKind::L2,
        }
    }
}

impl TreeConfig {
    pub fn new(metric: MetricKind) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    pub fn with_n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn with_radius(mut self, radius: f64) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.leaf_size == 0 {
            return Err(LpqError::InvalidConfig("leaf_size must be positive"));
        }
        check_radius(self.radius)
    }
}

pub(crate) fn check_radius(radius: f64) -> Result<()> {
    if radius.is_nan() || radius < 0.0 {
        return Err(LpqError::InvalidConfig("radius must be a non-negative number"));
    }
    Ok(())
}
