use crate::error::{LpqError, Result};

/// Row-major point storage with its grouping metadata.
///
/// Every row has `dim` coordinates, read as `dim / group_width` consecutive
/// groups by the grouped metrics.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSet {
    coords: Vec<f64>,
    dim: usize,
    group_width: usize,
}

impl PointSet {
    /// Wraps a flat coordinate buffer `[p0_0, p0_1, ..., p1_0, ...]`.
    pub fn new(coords: Vec<f64>, dim: usize, group_width: usize) -> Result<Self> {
        check_layout(coords.len(), dim, group_width)?;
        Ok(Self {
            coords,
            dim,
            group_width,
        })
    }

    /// Builds a point set from nested rows, which must all share one length.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R], group_width: usize) -> Result<Self> {
        let dim = rows.first().map_or(0, |r| r.as_ref().len());
        let mut coords = Vec::with_capacity(rows.len() * dim);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != dim {
                return Err(LpqError::InvalidDimension(format!(
                    "row {i} has {} coordinates, expected {dim}",
                    row.len()
                )));
            }
            coords.extend_from_slice(row);
        }
        Self::new(coords, dim, group_width)
    }

    pub fn rows(&self) -> usize {
        self.coords.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn group_width(&self) -> usize {
        self.group_width
    }

    pub fn groups(&self) -> usize {
        self.dim / self.group_width
    }

    #[inline]
    pub fn row(&self, index: usize) -> &[f64] {
        &self.coords[index * self.dim..(index + 1) * self.dim]
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn into_coords(self) -> Vec<f64> {
        self.coords
    }
}

/// Checks that `len` coordinates form whole rows of `dim` split into groups of
/// `group_width`.
pub(crate) fn check_layout(len: usize, dim: usize, group_width: usize) -> Result<()> {
    if dim == 0 {
        return Err(LpqError::InvalidDimension(
            "points must have at least one coordinate".into(),
        ));
    }
    if group_width == 0 || dim % group_width != 0 {
        return Err(LpqError::InvalidDimension(format!(
            "group width {group_width} does not divide dimension {dim}"
        )));
    }
    check_rows(len, dim)?;
    Ok(())
}

/// Number of rows in a flat buffer of `dim`-wide points.
pub(crate) fn check_rows(len: usize, dim: usize) -> Result<usize> {
    if dim == 0 || len % dim != 0 {
        return Err(LpqError::InvalidDimension(format!(
            "{len} coordinates do not form whole rows of dimension {dim}"
        )));
    }
    Ok(len / dim)
}
