//! JavaScript bindings.
//!
//! Flat `Float64Array` buffers go in, [`SearchResult`] CSR arrays come out.
//! Errors surface as JS exceptions carrying the [`LpqError`](crate::LpqError)
//! message.

use std::num::TryFromIntError;

use rand::prelude::*;
use rand::rngs::StdRng;
use wasm_bindgen::prelude::*;

use crate::adjacency::SparseAdjacency;
use crate::config::TreeConfig;
use crate::error::LpqError;
use crate::lpqtree::LpqTree;
use crate::metric::MetricKind;
use crate::points::PointSet;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen_rayon::init_thread_pool;

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init_threads(n: usize) -> js_sys::Promise {
    init_thread_pool(n)
}

fn js_err(err: LpqError) -> JsError {
    JsError::new(&err.to_string())
}

fn to_u32(values: &[usize]) -> Result<Vec<u32>, TryFromIntError> {
    values.iter().map(|&v| u32::try_from(v)).collect()
}

fn to_u32_js(values: &[usize]) -> Result<Vec<u32>, JsError> {
    to_u32(values).map_err(|_| JsError::new("index does not fit in a Uint32Array"))
}

/// Batch search result in CSR layout.
#[wasm_bindgen]
pub struct SearchResult {
    inner: SparseAdjacency,
}

#[wasm_bindgen]
impl SearchResult {
    /// Query row of every match.
    pub fn rows(&self) -> Result<Vec<u32>, JsError> {
        to_u32_js(self.inner.rows())
    }

    /// Point index of every match.
    pub fn cols(&self) -> Result<Vec<u32>, JsError> {
        to_u32_js(self.inner.cols())
    }

    #[wasm_bindgen(getter)]
    pub fn dists(&self) -> Vec<f64> {
        self.inner.dists().to_vec()
    }

    #[wasm_bindgen(js_name = rowPtr)]
    pub fn row_ptr(&self) -> Result<Vec<u32>, JsError> {
        to_u32_js(self.inner.row_ptr())
    }

    #[wasm_bindgen(getter)]
    pub fn nnz(&self) -> usize {
        self.inner.nnz()
    }

    /// Sorts the matches of every query by distance.
    #[wasm_bindgen(js_name = sortRows)]
    pub fn sort_rows(&mut self) {
        self.inner.sort_rows();
    }
}

impl From<SparseAdjacency> for SearchResult {
    fn from(inner: SparseAdjacency) -> Self {
        Self { inner }
    }
}

#[wasm_bindgen(js_name = LpqTree)]
pub struct WasmLpqTree {
    inner: LpqTree,
}

#[wasm_bindgen(js_class = LpqTree)]
impl WasmLpqTree {
    /// Creates an unfitted tree; `metric` is one of `l1`, `l2`, `l11`, `l21`, `l22`.
    #[wasm_bindgen(constructor)]
    pub fn new(metric: &str, leaf_size: usize, radius: f64, n_neighbors: usize) -> Result<WasmLpqTree, JsError> {
        let metric: MetricKind = metric.parse().map_err(js_err)?;
        let config = TreeConfig::new(metric)
            .with_leaf_size(leaf_size)
            .with_radius(radius)
            .with_n_neighbors(n_neighbors);
        let inner = LpqTree::new(config).map_err(js_err)?;
        Ok(WasmLpqTree { inner })
    }

    pub fn fit(&mut self, coords: Vec<f64>, dim: usize, group_width: usize) -> Result<(), JsError> {
        let points = PointSet::new(coords, dim, group_width).map_err(js_err)?;
        self.inner.fit(points).map_err(js_err)?;
        Ok(())
    }

    #[wasm_bindgen(getter, js_name = isFitted)]
    pub fn is_fitted(&self) -> bool {
        self.inner.is_fitted()
    }

    #[wasm_bindgen(getter)]
    pub fn metric(&self) -> String {
        self.inner.config().metric.to_string()
    }

    /// Number of indexed points, 0 before fitting.
    #[wasm_bindgen(getter)]
    pub fn count(&self) -> usize {
        self.inner.index().map_or(0, |index| index.len())
    }

    #[wasm_bindgen(js_name = radiusSearch)]
    pub fn radius_search(&self, queries: &[f64], radius: f64, threads: usize) -> Result<SearchResult, JsError> {
        self.inner
            .radius_search(queries, radius, threads)
            .map(SearchResult::from)
            .map_err(js_err)
    }

    #[wasm_bindgen(js_name = knnSearch)]
    pub fn knn_search(&self, queries: &[f64], k: usize, threads: usize) -> Result<SearchResult, JsError> {
        self.inner
            .knn_search(queries, k, threads)
            .map(SearchResult::from)
            .map_err(js_err)
    }

    /// Two-level search; the tree must be fitted on the mean points of
    /// `full_coords`.
    #[wasm_bindgen(js_name = radiusSearchFull)]
    pub fn radius_search_full(
        &self,
        full_coords: Vec<f64>,
        full_dim: usize,
        full_queries: &[f64],
        radius: f64,
        group_count: usize,
        threads: usize,
    ) -> Result<SearchResult, JsError> {
        let group_width = self.inner.index().map_err(js_err)?.group_width();
        let full_tree = PointSet::new(full_coords, full_dim, group_width).map_err(js_err)?;
        self.inner
            .radius_search_full(&full_tree, full_queries, radius, group_count, threads)
            .map(SearchResult::from)
            .map_err(js_err)
    }

    /// Serialized tree topology; the coordinates are not included.
    #[wasm_bindgen(js_name = toBytes)]
    pub fn to_bytes(&self) -> Result<Vec<u8>, JsError> {
        let mut bytes = Vec::new();
        self.inner.save_index_to_writer(&mut bytes).map_err(js_err)?;
        Ok(bytes)
    }

    /// Restores a topology from [`to_bytes`](Self::to_bytes) over the same
    /// `coords`.
    #[wasm_bindgen(js_name = fromBytes)]
    pub fn from_bytes(&mut self, bytes: &[u8], coords: Vec<f64>) -> Result<(), JsError> {
        self.inner.load_index_from_reader(bytes, coords).map_err(js_err)?;
        Ok(())
    }
}

/// `count` uniform random points in the unit cube of dimension `dim`.
#[wasm_bindgen(js_name = randomPoints)]
pub fn random_points(count: usize, dim: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(get_seed());
    (0..count * dim).map(|_| rng.r#gen::<f64>()).collect()
}

fn get_seed() -> u64 {
    #[cfg(target_arch = "wasm32")]
    {
        (js_sys::Math::random() * 4294967296.0) as u64
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        123456789
    }
}
