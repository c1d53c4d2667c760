//! # FlatIndex
//!
//! Exact nearest-neighbor index over fixed-dimension vectors under squared
//! Euclidean distance.
//!
//! This is a deliberate brute-force structure: insertion order defines
//! position, there is no reordering and no single-element removal. Deleting
//! a vector means rebuilding the whole index (see
//! [`SemanticMemory::delete_document`](crate::memory::SemanticMemory::delete_document)),
//! which is what keeps positions aligned 1:1 with the metadata store. A
//! linear scan also gives fully deterministic results: ascending distance,
//! ties broken by lower insertion position.
//!
//! ## Serialization
//! The index round-trips through [`IndexSnapshot`], a plain
//! `{ dimension, vectors }` pair encoded with bincode. The snapshot is
//! sufficient to reconstruct exact vectors and their order.

use serde::{Deserialize, Serialize};

use crate::error::SibylError;

/// On-disk form of a [`FlatIndex`]: the dimension and every vector in
/// insertion order.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimension: usize,
    pub vectors: Vec<Vec<f32>>,
}

/// A single search hit: the vector's position and its squared Euclidean
/// distance from the query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
}

/// Brute-force exact index. Position `i` is the `i`-th inserted vector.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Create an empty index of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// The fixed vector dimension set at construction.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors currently held.
    pub fn count(&self) -> usize {
        self.vectors.len()
    }

    /// Append a vector. Its position becomes `count() - 1`.
    ///
    /// # Errors
    /// A wrong-dimension vector is rejected outright; the index is
    /// unchanged.
    pub fn push(&mut self, vector: Vec<f32>) -> Result<usize, SibylError> {
        if vector.len() != self.dimension {
            return Err(SibylError::Embedding {
                message: format!(
                    "vector has dimension {} but index expects {}",
                    vector.len(),
                    self.dimension
                ),
                source: None,
            });
        }
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// Remove the most recently appended vector, if any.
    ///
    /// Used to roll an append back when a later step of the same mutation
    /// fails.
    pub fn pop(&mut self) -> Option<Vec<f32>> {
        self.vectors.pop()
    }

    /// Return up to `k` nearest positions to `query`, ascending by squared
    /// Euclidean distance. Ties are broken by lower position, matching a
    /// stable linear scan.
    ///
    /// Fewer than `k` vectors yields all of them; an empty index yields an
    /// empty vec.
    ///
    /// # Errors
    /// Rejects a query whose dimension does not match the index.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, SibylError> {
        if query.len() != self.dimension {
            return Err(SibylError::Embedding {
                message: format!(
                    "query has dimension {} but index expects {}",
                    query.len(),
                    self.dimension
                ),
                source: None,
            });
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, v)| SearchHit {
                position,
                distance: squared_euclidean(query, v),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Serialize the index to a bincode snapshot.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SibylError> {
        let snapshot = IndexSnapshot {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        bincode::serde::encode_to_vec(&snapshot, bincode::config::standard()).map_err(|e| {
            SibylError::Persistence {
                source: std::io::Error::other(e),
            }
        })
    }

    /// Reconstruct an index from a bincode snapshot.
    ///
    /// # Errors
    /// Fails on undecodable bytes, or if the snapshot's dimension disagrees
    /// with `expected_dimension` (a fatal construction error, not a
    /// recoverable one).
    pub fn from_bytes(bytes: &[u8], expected_dimension: usize) -> Result<Self, SibylError> {
        let (snapshot, _): (IndexSnapshot, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| {
                SibylError::Persistence {
                    source: std::io::Error::other(e),
                }
            })?;

        if snapshot.dimension != expected_dimension {
            return Err(SibylError::Config(format!(
                "persisted index has dimension {} but the embedding provider produces {}",
                snapshot.dimension, expected_dimension
            )));
        }

        Ok(Self {
            dimension: snapshot.dimension,
            vectors: snapshot.vectors,
        })
    }
}

/// Squared Euclidean distance between two equal-length vectors.
fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(3);
        assert!(index.push(vec![1.0, 2.0]).is_err());
        assert_eq!(index.count(), 0);
        assert!(index.push(vec![1.0, 2.0, 3.0]).is_ok());
        assert_eq!(index.count(), 1);
    }

    #[test]
    fn search_orders_by_distance() {
        let mut index = FlatIndex::new(2);
        index.push(vec![0.0, 0.0]).unwrap();
        index.push(vec![10.0, 0.0]).unwrap();
        index.push(vec![1.0, 0.0]).unwrap();

        let hits = index.search(&[0.5, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 2, 1]);
    }

    #[test]
    fn search_breaks_ties_by_insertion_order() {
        let mut index = FlatIndex::new(1);
        index.push(vec![1.0]).unwrap();
        index.push(vec![-1.0]).unwrap();
        index.push(vec![1.0]).unwrap();

        // Positions 0, 1, and 2 are all at distance 1 from the origin.
        let hits = index.search(&[0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|h| h.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn search_truncates_to_available() {
        let mut index = FlatIndex::new(1);
        index.push(vec![1.0]).unwrap();

        let hits = index.search(&[0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);

        let empty = FlatIndex::new(1);
        assert!(empty.search(&[0.0], 10).unwrap().is_empty());
    }

    #[test]
    fn snapshot_round_trip() {
        let mut index = FlatIndex::new(2);
        index.push(vec![1.0, 2.0]).unwrap();
        index.push(vec![3.0, 4.0]).unwrap();

        let bytes = index.to_bytes().unwrap();
        let restored = FlatIndex::from_bytes(&bytes, 2).unwrap();
        assert_eq!(restored.count(), 2);
        assert_eq!(restored.dimension(), 2);

        let hits = restored.search(&[1.0, 2.0], 1).unwrap();
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[test]
    fn snapshot_rejects_dimension_mismatch() {
        let index = FlatIndex::new(2);
        let bytes = index.to_bytes().unwrap();
        assert!(FlatIndex::from_bytes(&bytes, 3).is_err());
    }
}
