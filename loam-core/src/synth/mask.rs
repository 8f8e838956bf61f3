//! Bit-packed missingness masks.
//!
//! Dropped samples are encoded twice, on purpose: the value array holds a
//! `NaN` sentinel and the mask holds a `true` bit, so downstream readers
//! can detect missingness without probing floats. The mask is bit-packed
//! in memory and crosses the boundary as nested boolean rows.

use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::Error as DeError,
};

/// A `rows × cols` boolean matrix packed 64 positions per word.
///
/// # Examples
/// ```
/// use loam_core::BitMatrix;
///
/// let mut mask = BitMatrix::new(2, 3);
/// mask.set(1, 2, true);
/// assert!(mask.get(1, 2));
/// assert!(!mask.get(0, 0));
/// assert_eq!(mask.count_set(), 1);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BitMatrix {
    rows: usize,
    cols: usize,
    words: Vec<u64>,
}

impl BitMatrix {
    /// Creates an all-false matrix.
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        let bits = rows * cols;
        Self {
            rows,
            cols,
            words: vec![0; bits.div_ceil(64)],
        }
    }

    /// Number of rows (time steps).
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (channels).
    #[must_use]
    pub const fn cols(&self) -> usize {
        self.cols
    }

    const fn position(&self, row: usize, col: usize) -> (usize, u64) {
        let bit = row * self.cols + col;
        (bit / 64, 1 << (bit % 64))
    }

    /// Reads one position; out-of-range positions read as `false`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> bool {
        if row >= self.rows || col >= self.cols {
            return false;
        }
        let (word, mask) = self.position(row, col);
        self.words[word] & mask != 0
    }

    /// Sets one position.
    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let (word, mask) = self.position(row, col);
        if value {
            self.words[word] |= mask;
        } else {
            self.words[word] &= !mask;
        }
    }

    /// Count of set positions.
    #[must_use]
    pub fn count_set(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Expands to nested boolean rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Vec<bool>> {
        (0..self.rows)
            .map(|row| (0..self.cols).map(|col| self.get(row, col)).collect())
            .collect()
    }

    /// Packs nested boolean rows; returns `None` when the rows are ragged.
    #[must_use]
    pub fn from_rows(rows: &[Vec<bool>]) -> Option<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return None;
        }
        let mut matrix = Self::new(rows.len(), cols);
        for (r, row) in rows.iter().enumerate() {
            for (c, &value) in row.iter().enumerate() {
                matrix.set(r, c, value);
            }
        }
        Some(matrix)
    }
}

impl Serialize for BitMatrix {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_rows().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BitMatrix {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<bool>>::deserialize(deserializer)?;
        Self::from_rows(&rows).ok_or_else(|| D::Error::custom("ragged mask rows"))
    }
}
