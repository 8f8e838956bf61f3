//! Dense `f32` storage: feature matrices and the per-layer history ring.
//!
//! Both structures own flat buffers so they can cross the launch boundary
//! as plain slices. `DenseMatrix` is row-major. `HistoryRing` keeps the
//! `|V| × d × H` snapshot store with the slot axis contiguous per
//! `(vertex, feature)` pair, which keeps rolling-statistics scans linear.

/// Row-major dense matrix of 32-bit floats.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    /// Creates a zero-filled matrix.
    #[must_use]
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix from nested rows.
    ///
    /// Returns `None` when the rows are ragged.
    #[must_use]
    pub fn from_rows(rows: &[Vec<f32>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }
        Some(Self {
            rows: rows.len(),
            cols,
            data: rows.iter().flatten().copied().collect(),
        })
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    /// Borrows the flat row-major buffer.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutably borrows the flat row-major buffer for kernel launches.
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Reads one element; out-of-range coordinates read as `0.0`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        if row >= self.rows || col >= self.cols {
            return 0.0;
        }
        self.data[row * self.cols + col]
    }

    /// Writes one element; out-of-range coordinates are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        if row < self.rows && col < self.cols {
            self.data[row * self.cols + col] = value;
        }
    }

    /// Borrows one row.
    #[must_use]
    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copies one column out.
    #[must_use]
    pub fn column(&self, col: usize) -> Vec<f32> {
        (0..self.rows).map(|row| self.get(row, col)).collect()
    }

    /// Appends a zero row.
    pub fn push_zero_row(&mut self) {
        self.rows += 1;
        self.data.resize(self.rows * self.cols, 0.0);
    }

    /// Widens the matrix to `new_cols`, zero-padding every existing row.
    /// Narrowing is a no-op.
    pub fn grow_cols(&mut self, new_cols: usize) {
        if new_cols <= self.cols {
            return;
        }
        let mut data = vec![0.0; self.rows * new_cols];
        for row in 0..self.rows {
            data[row * new_cols..row * new_cols + self.cols]
                .copy_from_slice(&self.data[row * self.cols..(row + 1) * self.cols]);
        }
        self.cols = new_cols;
        self.data = data;
    }

    /// Horizontally concatenates matrices sharing a row count.
    ///
    /// Returns `None` when the row counts disagree or `parts` is empty.
    #[must_use]
    pub fn hconcat(parts: &[&Self]) -> Option<Self> {
        let first = parts.first()?;
        if parts.iter().any(|part| part.rows != first.rows) {
            return None;
        }
        let cols = parts.iter().map(|part| part.cols).sum();
        let mut out = Self::zeros(first.rows, cols);
        for row in 0..first.rows {
            let mut offset = 0;
            for part in parts {
                out.data[row * cols + offset..row * cols + offset + part.cols]
                    .copy_from_slice(part.row(row));
                offset += part.cols;
            }
        }
        Some(out)
    }

    /// Converts to nested rows for boundary payloads.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<f32>> {
        (0..self.rows).map(|row| self.row(row).to_vec()).collect()
    }
}

/// Fixed-capacity snapshot store for per-vertex feature history.
///
/// One ring per layer: `head` (next write slot) and `len` (valid entries,
/// saturating at the depth) are shared across vertices, so a push for any
/// vertex advances the whole layer's clock. Readings come back oldest-first
/// with wrap-around once the ring is full.
///
/// # Examples
/// ```
/// use loam_core::HistoryRing;
///
/// let mut ring = HistoryRing::new(1, 1, 3);
/// for value in [1.0, 2.0, 3.0, 4.0] {
///     ring.record(0, &[value]);
///     ring.advance();
/// }
/// assert_eq!(ring.len(), 3);
/// assert_eq!(ring.vertex_history(0).row(0), &[2.0, 3.0, 4.0]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRing {
    vertices: usize,
    width: usize,
    depth: usize,
    head: usize,
    len: usize,
    data: Vec<f32>,
}

impl HistoryRing {
    /// Creates an empty ring for `vertices × width` channels of `depth`
    /// snapshots.
    #[must_use]
    pub fn new(vertices: usize, width: usize, depth: usize) -> Self {
        Self {
            vertices,
            width,
            depth,
            head: 0,
            len: 0,
            data: vec![0.0; vertices * width * depth],
        }
    }

    /// Number of vertices tracked.
    #[must_use]
    pub const fn vertices(&self) -> usize {
        self.vertices
    }

    /// Snapshot width (the layer's feature dimension).
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Ring capacity.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Next write slot, in `[0, depth)`.
    #[must_use]
    pub const fn head(&self) -> usize {
        self.head
    }

    /// Count of valid snapshots, saturating at the depth.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether no snapshot has been recorded yet.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrows the flat buffer (layout `[vertex][feature][slot]`).
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutably borrows the flat buffer for kernel launches and rehydration.
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Restores ring pointers from serialized state. Values outside the
    /// valid ranges are clamped.
    pub fn restore_pointers(&mut self, head: usize, len: usize) {
        self.head = if self.depth == 0 { 0 } else { head % self.depth };
        self.len = len.min(self.depth);
    }

    const fn slot_index(&self, vertex: usize, feature: usize, slot: usize) -> usize {
        (vertex * self.width + feature) * self.depth + slot
    }

    /// Writes one vertex snapshot at the current head without advancing it.
    /// The first `min(values.len(), width)` channels take the new reading;
    /// the remainder of the slot is zeroed so stale readings from a lapped
    /// ring cannot resurface.
    pub fn record(&mut self, vertex: usize, values: &[f32]) {
        if vertex >= self.vertices || self.depth == 0 {
            return;
        }
        for feature in 0..self.width {
            let idx = self.slot_index(vertex, feature, self.head);
            self.data[idx] = values.get(feature).copied().unwrap_or(0.0);
        }
    }

    /// Advances the shared write head and saturates the valid length.
    pub fn advance(&mut self) {
        if self.depth == 0 {
            return;
        }
        self.head = (self.head + 1) % self.depth;
        self.len = (self.len + 1).min(self.depth);
    }

    /// Grows the first dimension by one zero-history vertex.
    pub fn push_zero_vertex(&mut self) {
        self.vertices += 1;
        self.data.resize(self.vertices * self.width * self.depth, 0.0);
    }

    /// Widens snapshots to `new_width` channels, zero-padding history for
    /// the new channels. Narrowing is a no-op.
    pub fn grow_width(&mut self, new_width: usize) {
        if new_width <= self.width {
            return;
        }
        let mut data = vec![0.0; self.vertices * new_width * self.depth];
        for vertex in 0..self.vertices {
            for feature in 0..self.width {
                let src = (vertex * self.width + feature) * self.depth;
                let dst = (vertex * new_width + feature) * self.depth;
                data[dst..dst + self.depth].copy_from_slice(&self.data[src..src + self.depth]);
            }
        }
        self.width = new_width;
        self.data = data;
    }

    /// Chronological slot order, oldest first: `0..len` while the ring is
    /// filling, then `head..depth` wrapping to `0..head` once it has lapped.
    fn chronological_slots(&self) -> impl Iterator<Item = usize> + '_ {
        let (start, wrap) = if self.len < self.depth {
            (0, 0)
        } else {
            (self.head, self.head)
        };
        (start..self.depth)
            .chain(0..wrap)
            .take(self.len)
    }

    /// Returns one vertex's history as a `width × len` matrix, oldest first.
    #[must_use]
    pub fn vertex_history(&self, vertex: usize) -> DenseMatrix {
        let mut out = DenseMatrix::zeros(self.width, self.len);
        if vertex >= self.vertices {
            return out;
        }
        for feature in 0..self.width {
            for (ordinal, slot) in self.chronological_slots().enumerate() {
                out.set(
                    feature,
                    ordinal,
                    self.data[self.slot_index(vertex, feature, slot)],
                );
            }
        }
        out
    }

    /// Reads a single channel value `steps_back` snapshots before the head
    /// (`0` = most recent). Returns `None` outside the valid window.
    #[must_use]
    pub fn value_back(&self, vertex: usize, feature: usize, steps_back: usize) -> Option<f32> {
        if vertex >= self.vertices || feature >= self.width || steps_back >= self.len {
            return None;
        }
        let slot = (self.head + self.depth - 1 - steps_back) % self.depth;
        Some(self.data[self.slot_index(vertex, feature, slot)])
    }
}
