use std::fmt;
use std::str::FromStr;

use crate::error::LpqError;

/// Selects the zero-sized [`Metric`] type for a [`MetricKind`] once, so the
/// body is monomorphized per kind instead of branching per comparison.
macro_rules! with_metric {
    ($kind:expr, $m:ident => $body:expr) => {
        match $kind {
            $crate::metric::MetricKind::L1 => {
                type $m = $crate::metric::L1;
                $body
            }
            $crate::metric::MetricKind::L2 => {
                type $m = $crate::metric::L2;
                $body
            }
            $crate::metric::MetricKind::L11 => {
                type $m = $crate::metric::L11;
                $body
            }
            $crate::metric::MetricKind::L21 => {
                type $m = $crate::metric::L21;
                $body
            }
            $crate::metric::MetricKind::L22 => {
                type $m = $crate::metric::L22;
                $body
            }
        }
    };
}
pub(crate) use with_metric;

/// Distance semantics of an index.
///
/// Grouped kinds (`l11`, `l21`, `l22`) read a point as consecutive groups of
/// `group_width` coordinates and aggregate one norm per group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Sum of absolute coordinate differences.
    L1,
    /// Euclidean distance.
    #[default]
    L2,
    /// Sum over groups of the per-group L1 norm.
    L11,
    /// Sum over groups of the per-group Euclidean norm.
    L21,
    /// Euclidean combination of the per-group Euclidean norms.
    ///
    /// Numerically this is the Euclidean norm of the whole difference vector,
    /// but box bounds are accumulated group by group. It is kept as its own kind
    /// and is not accepted by the two-level search.
    L22,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::L1,
        MetricKind::L2,
        MetricKind::L11,
        MetricKind::L21,
        MetricKind::L22,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::L1 => "l1",
            MetricKind::L2 => "l2",
            MetricKind::L11 => "l11",
            MetricKind::L21 => "l21",
            MetricKind::L22 => "l22",
        }
    }

    /// Whether the kind aggregates norms over coordinate groups.
    pub fn is_grouped(self) -> bool {
        matches!(self, MetricKind::L11 | MetricKind::L21 | MetricKind::L22)
    }

    /// Whether a mean-point coarse radius can be derived for this kind.
    pub fn supports_two_level(self) -> bool {
        !matches!(self, MetricKind::L22)
    }

    /// Exact distance between two points.
    pub fn distance(self, a: &[f64], b: &[f64], group_width: usize) -> f64 {
        with_metric!(self, M => M::distance(a, b, group_width))
    }

    /// Lower bound of the distance from `query` to any point inside the box.
    pub fn box_distance(self, query: &[f64], min: &[f64], max: &[f64], group_width: usize) -> f64 {
        with_metric!(self, M => M::box_distance(query, min, max, group_width))
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            MetricKind::L1 => 0,
            MetricKind::L2 => 1,
            MetricKind::L11 => 2,
            MetricKind::L21 => 3,
            MetricKind::L22 => 4,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetricKind {
    type Err = LpqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == lowered)
            .ok_or_else(|| {
                LpqError::UnsupportedMetric(format!(
                    "`{s}` is not one of l1, l2, l11, l21, l22"
                ))
            })
    }
}

/// Distance functions of one metric kind.
///
/// Traversal works on a *reduced* distance that is cheaper to accumulate
/// (squared for the Euclidean kinds). Anything reported to callers goes
/// through [`Metric::from_reduced`] first.
pub trait Metric: Send + Sync + 'static {
    const KIND: MetricKind;

    /// Reduced distance between `a` and `b`. Accumulation may stop as soon as
    /// the partial sum exceeds `worst`, in which case any value above `worst`
    /// is returned.
    fn reduced_distance(a: &[f64], b: &[f64], group_width: usize, worst: f64) -> f64;

    /// Reduced lower bound from `query` to the box `[min, max]`.
    fn reduced_box_distance(query: &[f64], min: &[f64], max: &[f64], group_width: usize) -> f64;

    #[inline]
    fn to_reduced(distance: f64) -> f64 {
        distance
    }

    #[inline]
    fn from_reduced(reduced: f64) -> f64 {
        reduced
    }

    /// Reduced radius used for pruning and early exit, widened by a few ulps
    /// so rounding in `to_reduced` never cuts a point at distance `radius`.
    #[inline]
    fn search_bound(radius: f64) -> f64 {
        let reduced = Self::to_reduced(radius);
        reduced + reduced * SEARCH_BOUND_SLACK + f64::MIN_POSITIVE
    }

    /// Whether a reduced distance at most [`Metric::search_bound`] is within
    /// `radius` in the metric's own units.
    #[inline]
    fn within(reduced: f64, radius: f64) -> bool {
        Self::from_reduced(reduced) <= radius
    }

    #[inline]
    fn distance(a: &[f64], b: &[f64], group_width: usize) -> f64 {
        Self::from_reduced(Self::reduced_distance(a, b, group_width, f64::INFINITY))
    }

    #[inline]
    fn box_distance(query: &[f64], min: &[f64], max: &[f64], group_width: usize) -> f64 {
        Self::from_reduced(Self::reduced_box_distance(query, min, max, group_width))
    }
}

// Relative widening of the pruning radius, in units of f64 epsilon.
const SEARCH_BOUND_SLACK: f64 = 8.0 * f64::EPSILON;

// Ungrouped kinds check the early exit every few coordinates.
const EXIT_STRIDE: usize = 4;

#[inline(always)]
fn clipped(q: f64, lo: f64, hi: f64) -> f64 {
    if q < lo {
        lo - q
    } else if q > hi {
        q - hi
    } else {
        0.0
    }
}

#[inline(always)]
fn group_abs_sum(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

#[inline(always)]
fn group_sq_sum(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[inline(always)]
fn box_abs_sum(q: &[f64], min: &[f64], max: &[f64]) -> f64 {
    q.iter()
        .zip(min.iter().zip(max))
        .map(|(&v, (&lo, &hi))| clipped(v, lo, hi))
        .sum()
}

#[inline(always)]
fn box_sq_sum(q: &[f64], min: &[f64], max: &[f64]) -> f64 {
    q.iter()
        .zip(min.iter().zip(max))
        .map(|(&v, (&lo, &hi))| {
            let c = clipped(v, lo, hi);
            c * c
        })
        .sum()
}

/// Accumulates `f` over aligned chunks of `width` coordinates, leaving early
/// once the sum exceeds `worst`.
#[inline(always)]
fn accumulate<F>(a: &[f64], b: &[f64], width: usize, worst: f64, f: F) -> f64
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    let mut sum = 0.0;
    for (ca, cb) in a.chunks(width).zip(b.chunks(width)) {
        sum += f(ca, cb);
        if sum > worst {
            break;
        }
    }
    sum
}

#[inline(always)]
fn accumulate_box<F>(q: &[f64], min: &[f64], max: &[f64], width: usize, f: F) -> f64
where
    F: Fn(&[f64], &[f64], &[f64]) -> f64,
{
    q.chunks(width)
        .zip(min.chunks(width).zip(max.chunks(width)))
        .map(|(cq, (lo, hi))| f(cq, lo, hi))
        .sum()
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L1;

impl Metric for L1 {
    const KIND: MetricKind = MetricKind::L1;

    #[inline]
    fn reduced_distance(a: &[f64], b: &[f64], _group_width: usize, worst: f64) -> f64 {
        accumulate(a, b, EXIT_STRIDE, worst, group_abs_sum)
    }

    #[inline]
    fn reduced_box_distance(query: &[f64], min: &[f64], max: &[f64], _group_width: usize) -> f64 {
        box_abs_sum(query, min, max)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L2;

impl Metric for L2 {
    const KIND: MetricKind = MetricKind::L2;

    #[inline]
    fn reduced_distance(a: &[f64], b: &[f64], _group_width: usize, worst: f64) -> f64 {
        accumulate(a, b, EXIT_STRIDE, worst, group_sq_sum)
    }

    #[inline]
    fn reduced_box_distance(query: &[f64], min: &[f64], max: &[f64], _group_width: usize) -> f64 {
        box_sq_sum(query, min, max)
    }

    #[inline]
    fn to_reduced(distance: f64) -> f64 {
        distance * distance
    }

    #[inline]
    fn from_reduced(reduced: f64) -> f64 {
        reduced.sqrt()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L11;

impl Metric for L11 {
    const KIND: MetricKind = MetricKind::L11;

    #[inline]
    fn reduced_distance(a: &[f64], b: &[f64], group_width: usize, worst: f64) -> f64 {
        accumulate(a, b, group_width, worst, group_abs_sum)
    }

    #[inline]
    fn reduced_box_distance(query: &[f64], min: &[f64], max: &[f64], group_width: usize) -> f64 {
        accumulate_box(query, min, max, group_width, box_abs_sum)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L21;

impl Metric for L21 {
    const KIND: MetricKind = MetricKind::L21;

    #[inline]
    fn reduced_distance(a: &[f64], b: &[f64], group_width: usize, worst: f64) -> f64 {
        accumulate(a, b, group_width, worst, |ga, gb| group_sq_sum(ga, gb).sqrt())
    }

    #[inline]
    fn reduced_box_distance(query: &[f64], min: &[f64], max: &[f64], group_width: usize) -> f64 {
        accumulate_box(query, min, max, group_width, |q, lo, hi| {
            box_sq_sum(q, lo, hi).sqrt()
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct L22;

impl Metric for L22 {
    const KIND: MetricKind = MetricKind::L22;

    #[inline]
    fn reduced_distance(a: &[f64], b: &[f64], group_width: usize, worst: f64) -> f64 {
        accumulate(a, b, group_width, worst, group_sq_sum)
    }

    #[inline]
    fn reduced_box_distance(query: &[f64], min: &[f64], max: &[f64], group_width: usize) -> f64 {
        accumulate_box(query, min, max, group_width, box_sq_sum)
    }

    #[inline]
    fn to_reduced(distance: f64) -> f64 {
        distance * distance
    }

    #[inline]
    fn from_reduced(reduced: f64) -> f64 {
        reduced.sqrt()
    }
}
