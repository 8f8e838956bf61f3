//! Canonical compressed-sparse-column storage for incidence matrices.
//!
//! The host form mandated by the contract: 32-bit row indices, 32-bit float
//! values, column pointers of length `cols + 1`. Incidence entries are `1.0`
//! where a vertex is a member of a hyperedge; construction deduplicates
//! member lists so no duplicate entries exist. Cross-layer queries and edge
//! aggregation are transpose products computed column-by-column through the
//! launch wrapper.

use crate::{
    backend::{Backend, BackendError, launch},
    dense::DenseMatrix,
};

/// Sparse `rows × cols` matrix in compressed-sparse-column form.
///
/// # Examples
/// ```
/// use loam_core::{Backend, CscMatrix};
///
/// // Three vertices; e0 = {0, 1}, e1 = {1, 2}.
/// let incidence = CscMatrix::from_columns(3, &[vec![0, 1], vec![1, 2]]);
/// let gram = incidence
///     .transpose_product(&incidence, Backend::Host)
///     .expect("host lane is always available");
/// assert_eq!(gram.get(0, 1), 1.0); // e0 and e1 share one vertex
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct CscMatrix {
    rows: usize,
    col_ptr: Vec<u32>,
    row_idx: Vec<u32>,
    values: Vec<f32>,
}

impl CscMatrix {
    /// Creates an empty matrix with `rows` rows and no columns.
    #[must_use]
    pub fn with_rows(rows: usize) -> Self {
        Self {
            rows,
            col_ptr: vec![0],
            row_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Builds an incidence matrix from per-column member rows. Member lists
    /// are sorted and deduplicated; rows outside `0..rows` are dropped.
    #[must_use]
    pub fn from_columns(rows: usize, columns: &[Vec<usize>]) -> Self {
        let mut matrix = Self::with_rows(rows);
        for members in columns {
            matrix.push_column(members);
        }
        matrix
    }

    /// Number of rows (vertices).
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (hyperedges).
    #[must_use]
    pub fn cols(&self) -> usize {
        self.col_ptr.len() - 1
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.row_idx.len()
    }

    /// Column pointer array, length `cols + 1`.
    #[must_use]
    pub fn col_ptr(&self) -> &[u32] {
        &self.col_ptr
    }

    /// Row indices of the stored entries, column-by-column.
    #[must_use]
    pub fn row_indices(&self) -> &[u32] {
        &self.row_idx
    }

    /// Values of the stored entries, column-by-column.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Borrows the sorted member rows of one column.
    #[must_use]
    pub fn column_rows(&self, col: usize) -> &[u32] {
        let start = self.col_ptr[col] as usize;
        let end = self.col_ptr[col + 1] as usize;
        &self.row_idx[start..end]
    }

    fn column_entries(&self, col: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let start = self.col_ptr[col] as usize;
        let end = self.col_ptr[col + 1] as usize;
        self.row_idx[start..end]
            .iter()
            .zip(&self.values[start..end])
            .map(|(&row, &value)| (row as usize, value))
    }

    /// Reads one entry; absent coordinates read as `0.0`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        if col >= self.cols() {
            return 0.0;
        }
        let members = self.column_rows(col);
        match members.binary_search(&(row as u32)) {
            Ok(pos) => self.values[self.col_ptr[col] as usize + pos],
            Err(_) => 0.0,
        }
    }

    /// Per-column entry sums (hyperedge degrees for a 0/1 incidence).
    #[must_use]
    pub fn column_degrees(&self) -> Vec<f32> {
        (0..self.cols())
            .map(|col| self.column_entries(col).map(|(_, value)| value).sum())
            .collect()
    }

    /// Appends one column from (possibly unsorted, possibly duplicated)
    /// member rows; rows outside `0..rows` are dropped.
    pub fn push_column(&mut self, members: &[usize]) {
        let mut sorted: Vec<u32> = members
            .iter()
            .filter(|&&row| row < self.rows)
            .map(|&row| row as u32)
            .collect();
        sorted.sort_unstable();
        sorted.dedup();
        self.values.extend(std::iter::repeat_n(1.0, sorted.len()));
        self.row_idx.extend_from_slice(&sorted);
        self.col_ptr.push(self.row_idx.len() as u32);
    }

    /// Removes one column, shifting later columns left. Out-of-range
    /// indices are ignored.
    pub fn remove_column(&mut self, col: usize) {
        if col >= self.cols() {
            return;
        }
        let start = self.col_ptr[col] as usize;
        let end = self.col_ptr[col + 1] as usize;
        let removed = (end - start) as u32;
        self.row_idx.drain(start..end);
        self.values.drain(start..end);
        self.col_ptr.remove(col + 1);
        for ptr in &mut self.col_ptr[col + 1..] {
            *ptr -= removed;
        }
    }

    /// Grows the row dimension by one (a new vertex belongs to no edge yet).
    pub fn push_empty_row(&mut self) {
        self.rows += 1;
    }

    /// Expands to parallel `(row, col, value)` triplet arrays for the
    /// serialization boundary.
    #[must_use]
    pub fn to_triplets(&self) -> (Vec<u32>, Vec<u32>, Vec<f32>) {
        let mut rows = Vec::with_capacity(self.nnz());
        let mut cols = Vec::with_capacity(self.nnz());
        for col in 0..self.cols() {
            for (row, _) in self.column_entries(col) {
                rows.push(row as u32);
                cols.push(col as u32);
            }
        }
        (rows, cols, self.values.clone())
    }

    /// Computes the dense transpose product `selfᵀ · other`, the
    /// `cols(self) × cols(other)` matrix whose `(i, j)` entry sums the
    /// value products over shared rows. For 0/1 incidences this counts the
    /// vertices shared by hyperedge `i` and hyperedge `j`.
    ///
    /// # Errors
    /// Returns [`BackendError`] when the requested lane is unavailable.
    pub fn transpose_product(
        &self,
        other: &Self,
        backend: Backend,
    ) -> Result<DenseMatrix, BackendError> {
        let (left_cols, right_cols) = (self.cols(), other.cols());
        let mut out = DenseMatrix::zeros(left_cols, right_cols);
        if right_cols == 0 {
            return Ok(out);
        }
        launch(backend, out.data_mut(), |index| {
            let (i, j) = (index / right_cols, index % right_cols);
            sparse_dot(
                self.column_rows(i),
                &self.values[self.col_ptr[i] as usize..self.col_ptr[i + 1] as usize],
                other.column_rows(j),
                &other.values[other.col_ptr[j] as usize..other.col_ptr[j + 1] as usize],
            )
        })?;
        Ok(out)
    }

    /// Computes the dense transpose application `selfᵀ · features`, the
    /// `cols(self) × cols(features)` per-hyperedge reduction of member
    /// feature rows.
    ///
    /// # Errors
    /// Returns [`BackendError`] when the requested lane is unavailable.
    pub fn transpose_apply(
        &self,
        features: &DenseMatrix,
        backend: Backend,
    ) -> Result<DenseMatrix, BackendError> {
        let width = features.cols();
        let mut out = DenseMatrix::zeros(self.cols(), width);
        if width == 0 {
            return Ok(out);
        }
        launch(backend, out.data_mut(), |index| {
            let (edge, feature) = (index / width, index % width);
            self.column_entries(edge)
                .map(|(row, value)| value * features.get(row, feature))
                .sum()
        })?;
        Ok(out)
    }
}

/// Dot product of two sparse columns given as sorted index/value pairs.
fn sparse_dot(
    left_rows: &[u32],
    left_values: &[f32],
    right_rows: &[u32],
    right_values: &[f32],
) -> f32 {
    let (mut i, mut j) = (0, 0);
    let mut acc = 0.0;
    while i < left_rows.len() && j < right_rows.len() {
        match left_rows[i].cmp(&right_rows[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                acc += left_values[i] * right_values[j];
                i += 1;
                j += 1;
            }
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incidence() -> CscMatrix {
        // Three vertices; e0 = {0, 1}, e1 = {1, 2}.
        CscMatrix::from_columns(3, &[vec![0, 1], vec![1, 2]])
    }

    #[test]
    fn construction_sorts_and_deduplicates_members() {
        let m = CscMatrix::from_columns(4, &[vec![3, 1, 3, 0]]);
        assert_eq!(m.column_rows(0), &[0, 1, 3]);
        assert_eq!(m.nnz(), 3);
        assert!(m.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn out_of_range_members_are_dropped() {
        let m = CscMatrix::from_columns(2, &[vec![0, 5, 1]]);
        assert_eq!(m.column_rows(0), &[0, 1]);
    }

    #[test]
    fn get_reads_membership() {
        let m = incidence();
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(2, 0), 0.0);
        assert_eq!(m.get(2, 1), 1.0);
    }

    #[test]
    fn transpose_product_counts_shared_vertices() {
        let m = incidence();
        let gram = m
            .transpose_product(&m, Backend::Host)
            .expect("host lane is always available");
        assert_eq!(gram.rows(), 2);
        assert_eq!(gram.cols(), 2);
        assert_eq!(gram.row(0), &[2.0, 1.0]);
        assert_eq!(gram.row(1), &[1.0, 2.0]);
    }

    #[test]
    fn transpose_apply_sums_member_rows() {
        let m = incidence();
        let features =
            DenseMatrix::from_rows(&[vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]])
                .expect("rectangular");
        let sums = m
            .transpose_apply(&features, Backend::Host)
            .expect("host lane is always available");
        assert_eq!(sums.row(0), &[3.0, 9.0]);
        assert_eq!(sums.row(1), &[5.0, 11.0]);
    }

    #[test]
    fn remove_column_rewires_pointers() {
        let mut m = CscMatrix::from_columns(3, &[vec![0], vec![0, 1, 2], vec![2]]);
        m.remove_column(1);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.column_rows(0), &[0]);
        assert_eq!(m.column_rows(1), &[2]);
        assert_eq!(m.nnz(), 2);
    }

    #[test]
    fn push_empty_row_widens_membership_domain() {
        let mut m = incidence();
        m.push_empty_row();
        assert_eq!(m.rows(), 4);
        m.push_column(&[3]);
        assert_eq!(m.column_rows(2), &[3]);
    }

    #[test]
    fn triplets_cover_every_entry_in_column_order() {
        let (rows, cols, values) = incidence().to_triplets();
        assert_eq!(rows, vec![0, 1, 1, 2]);
        assert_eq!(cols, vec![0, 0, 1, 1]);
        assert_eq!(values, vec![1.0; 4]);
    }
}
