//! Inter-anchor range matrices

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::types::Coordinates;

/// Square matrix of measured inter-anchor ranges for one sample.
///
/// `get(i, j)` is anchor i's measured distance to anchor j, or `None` when
/// no valid measurement exists. The diagonal is always `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRangeMatrix")]
pub struct RangeMatrix {
    size: usize,
    entries: Vec<Option<f64>>,
}

/// Unchecked serialized form of [`RangeMatrix`]
#[derive(Deserialize)]
struct RawRangeMatrix {
    size: usize,
    entries: Vec<Option<f64>>,
}

impl TryFrom<RawRangeMatrix> for RangeMatrix {
    type Error = String;

    fn try_from(raw: RawRangeMatrix) -> Result<Self, Self::Error> {
        let expected = raw.size.checked_mul(raw.size).ok_or("range matrix size overflows")?;
        if raw.entries.len() != expected {
            return Err(format!(
                "range matrix of size {} needs {} entries, got {}",
                raw.size,
                expected,
                raw.entries.len()
            ));
        }
        let mut matrix = Self::new(raw.size);
        for (index, value) in raw.entries.into_iter().enumerate() {
            matrix.set(index / raw.size, index % raw.size, value);
        }
        Ok(matrix)
    }
}

impl RangeMatrix {
    /// Matrix with every range missing
    pub fn new(size: usize) -> Self {
        Self {
            size,
            entries: vec![None; size * size],
        }
    }

    /// Build from explicit rows. Rows shorter than the matrix are padded
    /// with missing entries; negative or non-finite ranges are dropped.
    pub fn from_rows(rows: Vec<Vec<Option<f64>>>) -> Self {
        let size = rows.len();
        let mut matrix = Self::new(size);
        for (i, row) in rows.into_iter().enumerate() {
            for (j, value) in row.into_iter().take(size).enumerate() {
                matrix.set(i, j, value);
            }
        }
        matrix
    }

    /// Build from sentinel-encoded rows, where any negative value means
    /// "not measured".
    pub fn from_legacy(rows: &[Vec<f64>]) -> Self {
        let size = rows.len();
        let mut matrix = Self::new(size);
        for (i, row) in rows.iter().enumerate() {
            for (j, &value) in row.iter().take(size).enumerate() {
                matrix.set(i, j, Some(value));
            }
        }
        matrix
    }

    /// Exact ranges induced by a set of positions
    pub fn from_positions(positions: &[Coordinates]) -> Self {
        let size = positions.len();
        let mut matrix = Self::new(size);
        for i in 0..size {
            for j in 0..size {
                matrix.set(i, j, Some((positions[i] - positions[j]).norm()));
            }
        }
        matrix
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        if i >= self.size || j >= self.size {
            return None;
        }
        self.entries[i * self.size + j]
    }

    /// Store a range. Diagonal writes, out-of-bounds writes and invalid
    /// values leave the entry missing.
    pub fn set(&mut self, i: usize, j: usize, value: Option<f64>) {
        if i >= self.size || j >= self.size {
            return;
        }
        let value = if i == j {
            None
        } else {
            value.filter(|r| r.is_finite() && *r >= 0.0)
        };
        self.entries[i * self.size + j] = value;
    }

    /// Number of valid ranges from anchor i to the other anchors
    pub fn valid_count(&self, i: usize) -> usize {
        (0..self.size).filter(|&j| self.get(i, j).is_some()).count()
    }

    /// Valid `(j, range)` pairs in row i
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        (0..self.size).filter_map(move |j| self.get(i, j).map(|r| (j, r)))
    }

    /// Copy with missing entries filled from the transposed entry
    pub fn symmetrized(&self) -> Self {
        let mut matrix = self.clone();
        for i in 0..self.size {
            for j in 0..self.size {
                if matrix.get(i, j).is_none() {
                    matrix.set(i, j, self.get(j, i));
                }
            }
        }
        matrix
    }

    /// Sentinel-encoded copy for interop with raw record consumers
    pub fn to_legacy(&self, sentinel: f64) -> Vec<Vec<f64>> {
        (0..self.size)
            .map(|i| {
                (0..self.size)
                    .map(|j| self.get(i, j).unwrap_or(sentinel))
                    .collect()
            })
            .collect()
    }
}

/// Full pairwise Euclidean distance matrix of a set of positions
pub fn pairwise_distances(positions: &[Coordinates]) -> DMatrix<f64> {
    let n = positions.len();
    DMatrix::from_fn(n, n, |i, j| (positions[i] - positions[j]).norm())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LEGACY_INVALID_RANGE;

    #[test]
    fn test_legacy_sentinel_becomes_missing() {
        let matrix = RangeMatrix::from_legacy(&[
            vec![-1.0, 2.0, -1.0],
            vec![2.0, -1.0, 3.5],
            vec![-1.0, 3.5, 0.0],
        ]);

        assert_eq!(matrix.get(0, 1), Some(2.0));
        assert_eq!(matrix.get(0, 2), None);
        assert_eq!(matrix.get(1, 1), None);
        assert_eq!(matrix.get(2, 2), None); // diagonal ignored even if measured
        assert_eq!(matrix.valid_count(1), 2);
    }

    #[test]
    fn test_zero_distance_is_a_measurement() {
        let matrix = RangeMatrix::from_rows(vec![vec![None, Some(0.0)], vec![None, None]]);
        assert_eq!(matrix.get(0, 1), Some(0.0));
        assert_eq!(matrix.get(1, 0), None);
    }

    #[test]
    fn test_symmetrized_fills_from_transpose() {
        let matrix = RangeMatrix::from_rows(vec![
            vec![None, Some(1.0), None],
            vec![Some(1.2), None, None],
            vec![Some(4.0), None, None],
        ]);
        let sym = matrix.symmetrized();

        assert_eq!(sym.get(0, 1), Some(1.0)); // existing entries kept
        assert_eq!(sym.get(0, 2), Some(4.0));
        assert_eq!(sym.get(1, 2), None);
    }

    #[test]
    fn test_pairwise_distances() {
        let positions = vec![
            Coordinates::new(0.0, 0.0, 0.0),
            Coordinates::new(3.0, 4.0, 0.0),
        ];
        let d = pairwise_distances(&positions);
        assert!((d[(0, 1)] - 5.0).abs() < 1e-12);
        assert!((d[(1, 0)] - 5.0).abs() < 1e-12);
        assert_eq!(d[(0, 0)], 0.0);

        let ranges = RangeMatrix::from_positions(&positions);
        assert_eq!(ranges.get(1, 0), Some(5.0));
        assert_eq!(ranges.to_legacy(LEGACY_INVALID_RANGE)[0][0], LEGACY_INVALID_RANGE);
    }

    #[test]
    fn test_deserialize_checks_entry_count() {
        let matrix: RangeMatrix =
            serde_json::from_str(r#"{"size":2,"entries":[1.0,2.5,null,-3.0]}"#).unwrap();
        assert_eq!(matrix.get(0, 1), Some(2.5));
        assert_eq!(matrix.get(0, 0), None); // diagonal
        assert_eq!(matrix.get(1, 1), None); // negative range

        let json = serde_json::to_string(&matrix).unwrap();
        assert_eq!(serde_json::from_str::<RangeMatrix>(&json).unwrap(), matrix);

        let short = serde_json::from_str::<RangeMatrix>(r#"{"size":3,"entries":[null,1.0]}"#);
        assert!(short.is_err());
    }
}
