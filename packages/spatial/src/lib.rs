#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Neighbour graphs over polygon layers.
//!
//! Builds an undirected contiguity graph from municipality boundaries by
//! matching boundary vertices through an R-tree, and serializes it in the
//! two shapes spatial model backends consume: a flattened adjacency
//! (`num`/`adj`/`weights` arrays) and a line-based graph file.

pub mod contiguity;
pub mod format;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use contiguity::{
    Contiguity, ContiguityOptions, IsolatedUnitPolicy, build_contiguity_graph,
};
pub use format::FlatAdjacency;

/// Errors that can occur while building, validating, or reading a graph.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A boundary is empty or not a valid simple polygon.
    #[error("Invalid geometry for unit {index}: {message}")]
    InvalidGeometry {
        /// Zero-based unit index.
        index: usize,
        /// Description of what is wrong with it.
        message: String,
    },

    /// Isolated units were found and the policy forbids them.
    #[error("{} unit(s) have no neighbours (first: {:?})", .indices.len(), .indices.first())]
    IsolatedUnits {
        /// Zero-based indices of the isolated units.
        indices: Vec<usize>,
    },

    /// A unit lists itself as a neighbour.
    #[error("Unit {index} lists itself as a neighbour")]
    SelfLoop {
        /// Zero-based unit index.
        index: usize,
    },

    /// A neighbour index is outside `0..len`.
    #[error("Unit {index} has neighbour {neighbor} outside 0..{len}")]
    NeighborOutOfRange {
        /// Zero-based unit index.
        index: usize,
        /// The offending neighbour index.
        neighbor: usize,
        /// Number of units in the graph.
        len: usize,
    },

    /// A unit lists the same neighbour twice.
    #[error("Unit {index} lists neighbour {neighbor} more than once")]
    DuplicateNeighbor {
        /// Zero-based unit index.
        index: usize,
        /// The repeated neighbour index.
        neighbor: usize,
    },

    /// `a` lists `b` but `b` does not list `a`.
    #[error("Adjacency is not symmetric: {a} lists {b} but not the reverse")]
    Asymmetric {
        /// Unit that lists the neighbour.
        a: usize,
        /// Neighbour that does not list it back.
        b: usize,
    },

    /// Flattened arrays do not describe a consistent graph.
    #[error("Inconsistent flattened adjacency: {message}")]
    InconsistentFlat {
        /// Description of what went wrong.
        message: String,
    },

    /// A graph file could not be parsed.
    #[error("Malformed graph file at line {line}: {message}")]
    MalformedGraphFile {
        /// One-based line number.
        line: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Reading or writing a graph file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
}

/// Undirected neighbour graph over a fixed, ordered set of units.
///
/// Invariants (enforced by every constructor): symmetric, no self-loops,
/// no repeated neighbours, neighbour lists sorted ascending. Isolated
/// units have empty lists. Weights parallel the neighbour lists.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborGraph {
    neighbors: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
}

/// Summary statistics of a [`NeighborGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphSummary {
    /// Number of units.
    pub units: usize,
    /// Number of undirected links.
    pub links: usize,
    /// Number of units with no neighbours.
    pub isolated: usize,
    /// Smallest neighbour count.
    pub min_neighbors: usize,
    /// Largest neighbour count.
    pub max_neighbors: usize,
    /// Mean neighbour count.
    pub mean_neighbors: f64,
}

impl NeighborGraph {
    /// Builds a graph from zero-based adjacency lists with unit weights.
    ///
    /// Lists may be given in any order; they are sorted.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the lists contain self-loops, repeated
    /// or out-of-range neighbours, or are not symmetric.
    pub fn from_adjacency(mut neighbors: Vec<Vec<usize>>) -> Result<Self, SpatialError> {
        let len = neighbors.len();

        for (index, list) in neighbors.iter_mut().enumerate() {
            list.sort_unstable();
            for pair in list.windows(2) {
                if pair[0] == pair[1] {
                    return Err(SpatialError::DuplicateNeighbor {
                        index,
                        neighbor: pair[0],
                    });
                }
            }
            for &neighbor in list.iter() {
                if neighbor == index {
                    return Err(SpatialError::SelfLoop { index });
                }
                if neighbor >= len {
                    return Err(SpatialError::NeighborOutOfRange {
                        index,
                        neighbor,
                        len,
                    });
                }
            }
        }

        for (a, list) in neighbors.iter().enumerate() {
            for &b in list {
                if neighbors[b].binary_search(&a).is_err() {
                    return Err(SpatialError::Asymmetric { a, b });
                }
            }
        }

        let weights = neighbors.iter().map(|list| vec![1.0; list.len()]).collect();

        Ok(Self { neighbors, weights })
    }

    /// Number of units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    /// Whether the graph has no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Sorted zero-based neighbours of `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn neighbors(&self, index: usize) -> &[usize] {
        &self.neighbors[index]
    }

    /// Edge weights of `index`, parallel to [`Self::neighbors`].
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn weights(&self, index: usize) -> &[f64] {
        &self.weights[index]
    }

    /// Number of neighbours of `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    #[must_use]
    pub fn num_neighbors(&self, index: usize) -> usize {
        self.neighbors[index].len()
    }

    /// All adjacency lists, one per unit.
    #[must_use]
    pub fn adjacency(&self) -> &[Vec<usize>] {
        &self.neighbors
    }

    /// Whether `a` and `b` are neighbours.
    #[must_use]
    pub fn are_neighbors(&self, a: usize, b: usize) -> bool {
        self.neighbors
            .get(a)
            .is_some_and(|list| list.binary_search(&b).is_ok())
    }

    /// Zero-based indices of units with no neighbours.
    #[must_use]
    pub fn isolated(&self) -> Vec<usize> {
        self.neighbors
            .iter()
            .enumerate()
            .filter(|(_, list)| list.is_empty())
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of undirected links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.neighbors.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Summary statistics for logging.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> GraphSummary {
        let counts = self.neighbors.iter().map(Vec::len);
        let total: usize = counts.clone().sum();

        GraphSummary {
            units: self.len(),
            links: total / 2,
            isolated: self.isolated().len(),
            min_neighbors: counts.clone().min().unwrap_or(0),
            max_neighbors: counts.max().unwrap_or(0),
            mean_neighbors: if self.is_empty() {
                0.0
            } else {
                total as f64 / self.len() as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star() -> NeighborGraph {
        NeighborGraph::from_adjacency(vec![vec![2, 1], vec![0], vec![0]]).unwrap()
    }

    #[test]
    fn lists_are_sorted_and_weighted() {
        let graph = star();
        assert_eq!(graph.neighbors(0), &[1, 2]);
        assert_eq!(graph.weights(0), &[1.0, 1.0]);
        assert_eq!(graph.num_neighbors(1), 1);
        assert_eq!(graph.link_count(), 2);
    }

    #[test]
    fn every_link_is_symmetric() {
        let graph = star();
        for a in 0..graph.len() {
            for b in 0..graph.len() {
                assert_eq!(graph.are_neighbors(a, b), graph.are_neighbors(b, a));
            }
        }
    }

    #[test]
    fn rejects_asymmetric_lists() {
        let err = NeighborGraph::from_adjacency(vec![vec![1], vec![]]).unwrap_err();
        assert!(matches!(err, SpatialError::Asymmetric { a: 0, b: 1 }));
    }

    #[test]
    fn rejects_self_loops_and_out_of_range() {
        assert!(matches!(
            NeighborGraph::from_adjacency(vec![vec![0]]),
            Err(SpatialError::SelfLoop { index: 0 })
        ));
        assert!(matches!(
            NeighborGraph::from_adjacency(vec![vec![3]]),
            Err(SpatialError::NeighborOutOfRange { neighbor: 3, .. })
        ));
        assert!(matches!(
            NeighborGraph::from_adjacency(vec![vec![1, 1], vec![0]]),
            Err(SpatialError::DuplicateNeighbor { .. })
        ));
    }

    #[test]
    fn isolated_units_are_allowed() {
        let graph = NeighborGraph::from_adjacency(vec![vec![1], vec![0], vec![]]).unwrap();
        assert_eq!(graph.isolated(), vec![2]);

        let summary = graph.summary();
        assert_eq!(summary.units, 3);
        assert_eq!(summary.links, 1);
        assert_eq!(summary.isolated, 1);
        assert_eq!(summary.min_neighbors, 0);
        assert_eq!(summary.max_neighbors, 1);
    }
}
