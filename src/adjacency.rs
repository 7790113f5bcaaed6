/// One `(query, point, distance)` match produced by a batch search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NeighborRecord {
    pub row: usize,
    pub col: usize,
    pub distance: f64,
}

/// Batch search result in compressed sparse row layout.
///
/// Entry `j` of `rows`, `cols` and `dists` describes one match, and the
/// matches of query `i` occupy `row_ptr[i]..row_ptr[i + 1]`. `rows` is kept
/// alongside so the same arrays also read as COO triples.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseAdjacency {
    rows: Vec<usize>,
    cols: Vec<usize>,
    dists: Vec<f64>,
    row_ptr: Vec<usize>,
    n_cols: usize,
}

impl Default for SparseAdjacency {
    fn default() -> Self {
        Self::empty(0, 0)
    }
}

impl SparseAdjacency {
    /// Adjacency of `n_rows` queries without any match.
    pub fn empty(n_rows: usize, n_cols: usize) -> Self {
        Self {
            rows: Vec::new(),
            cols: Vec::new(),
            dists: Vec::new(),
            row_ptr: vec![0; n_rows + 1],
            n_cols,
        }
    }

    /// Scatters worker buffers into CSR order.
    ///
    /// Records may come in any order; within a row they keep the order in
    /// which the buffers are visited.
    ///
    /// # Panics
    ///
    /// Panics if a record has `row >= n_rows` or `col >= n_cols`.
    pub fn assemble(buffers: Vec<Vec<NeighborRecord>>, n_rows: usize, n_cols: usize) -> Self {
        let mut row_ptr = vec![0usize; n_rows + 1];
        for record in buffers.iter().flatten() {
            assert!(
                record.row < n_rows && record.col < n_cols,
                "record ({}, {}) outside a {n_rows} x {n_cols} adjacency",
                record.row,
                record.col
            );
            row_ptr[record.row + 1] += 1;
        }
        for i in 0..n_rows {
            row_ptr[i + 1] += row_ptr[i];
        }

        let nnz = row_ptr[n_rows];
        let mut cursor = row_ptr[..n_rows].to_vec();
        let mut rows = vec![0; nnz];
        let mut cols = vec![0; nnz];
        let mut dists = vec![0.0; nnz];
        for record in buffers.into_iter().flatten() {
            let slot = cursor[record.row];
            cursor[record.row] += 1;
            rows[slot] = record.row;
            cols[slot] = record.col;
            dists[slot] = record.distance;
        }

        Self {
            rows,
            cols,
            dists,
            row_ptr,
            n_cols,
        }
    }

    /// Query row of every match.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Point index of every match.
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn dists(&self) -> &[f64] {
        &self.dists
    }

    /// CSR boundaries, `n_queries + 1` entries starting at 0.
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// `(number of queries, number of indexed points)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.row_ptr.len() - 1, self.n_cols)
    }

    /// Number of stored matches.
    pub fn nnz(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    /// Point indices and distances matched by query `row`.
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        (&self.cols[range.clone()], &self.dists[range])
    }

    pub fn iter(&self) -> impl Iterator<Item = NeighborRecord> + '_ {
        self.rows
            .iter()
            .zip(&self.cols)
            .zip(&self.dists)
            .map(|((&row, &col), &distance)| NeighborRecord { row, col, distance })
    }

    /// Orders every row by distance, then by point index.
    pub fn sort_rows(&mut self) {
        let mut scratch: Vec<(f64, usize)> = Vec::new();
        for row in 0..self.row_ptr.len() - 1 {
            let range = self.row_ptr[row]..self.row_ptr[row + 1];
            scratch.clear();
            scratch.extend(self.dists[range.clone()].iter().copied().zip(self.cols[range.clone()].iter().copied()));
            scratch.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            for (slot, (dist, col)) in range.zip(scratch.iter().copied()) {
                self.dists[slot] = dist;
                self.cols[slot] = col;
            }
        }
    }

    /// Splits into `(rows, cols, dists, row_ptr)`.
    pub fn into_parts(self) -> (Vec<usize>, Vec<usize>, Vec<f64>, Vec<usize>) {
        (self.rows, self.cols, self.dists, self.row_ptr)
    }
}
