//! # lpqtree
//!
//! `lpqtree` is a k-d tree for radius and k-nearest searches under grouped Lp
//! metrics, usable from Rust as well as compiled to WebAssembly (WASM). It is
//! built for long points made of many small groups, such as streamline or
//! trajectory positions, where a distance sums the per-group norms.
//!
//! ## Features
//!
//! - **Grouped metrics**: `l1`, `l2`, and the mixed norms `l11`, `l21`, `l22`
//!   over groups of `group_width` coordinates.
//! - **Batch search**: Queries are split over a rayon pool and assembled into a
//!   compressed sparse row ([`SparseAdjacency`]) result.
//! - **Persistence**: The tree topology is saved without the coordinates and
//!   joined back with the caller's points on load.
//! - **Two-level search**: A tree over averaged *mean points* prunes with a
//!   shrunken radius before candidates are re-scored on full coordinates.
//!
//! ## Main Interface
//!
//! The primary entry point is the [`LpqTree`] handle, which owns a
//! [`TreeConfig`] and, once fitted, a [`KdIndex`].
//!
//! ```
//! use lpqtree::{LpqTree, MetricKind, PointSet, TreeConfig};
//!
//! let points = PointSet::new(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 5.0, 5.0], 2, 1)?;
//! let mut tree = LpqTree::new(TreeConfig::new(MetricKind::L2))?;
//! tree.fit(points)?;
//!
//! let result = tree.radius_search(&[0.0, 0.0], 1.5, 1)?;
//! assert_eq!(result.nnz(), 3);
//! # Ok::<(), lpqtree::LpqError>(())
//! ```

mod adjacency;
mod batch;
mod config;
mod error;
mod kdtree;
mod lpqtree;
mod metric;
mod persist;
mod points;
mod search;
mod two_level;
mod util;
pub mod wasm;

pub use adjacency::NeighborRecord;
pub use adjacency::SparseAdjacency;
pub use batch::Radii;
pub use config::TreeConfig;
pub use error::LpqError;
pub use error::Result;
pub use kdtree::KdIndex;
pub use lpqtree::LpqTree;
pub use metric::MetricKind;
pub use points::PointSet;
pub use search::Neighbor;
pub use two_level::coarse_radius;
pub use two_level::mean_points;
