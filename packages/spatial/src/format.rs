//! Graph serializations.
//!
//! * [`FlatAdjacency`]: compact `num`/`adj`/`weights` arrays with 1-indexed
//!   neighbours, as consumed by samplers that take the graph inline.
//! * Graph file: a text format whose first line is the unit count, followed
//!   by exactly one line per unit listing its 1-indexed neighbours separated
//!   by single spaces. Isolated units have an empty line.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{NeighborGraph, SpatialError};

/// Flattened adjacency arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatAdjacency {
    /// Neighbour count of every unit.
    pub num: Vec<usize>,
    /// Concatenated 1-indexed neighbour lists.
    pub adj: Vec<usize>,
    /// Edge weights, parallel to `adj`.
    pub weights: Vec<f64>,
}

impl FlatAdjacency {
    /// Total number of directed entries (`sum(num)`).
    #[must_use]
    pub fn sum_num_neigh(&self) -> usize {
        self.adj.len()
    }

    /// Rebuilds the graph these arrays describe.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the array lengths disagree, an index is
    /// zero, or the adjacency violates graph invariants.
    pub fn to_graph(&self) -> Result<NeighborGraph, SpatialError> {
        let total = self
            .num
            .iter()
            .try_fold(0usize, |acc, &count| acc.checked_add(count))
            .ok_or_else(|| SpatialError::InconsistentFlat {
                message: "sum(num) overflows".to_string(),
            })?;
        if total != self.adj.len() || total != self.weights.len() {
            return Err(SpatialError::InconsistentFlat {
                message: format!(
                    "sum(num) = {total}, adj has {}, weights has {}",
                    self.adj.len(),
                    self.weights.len()
                ),
            });
        }

        let mut offset = 0;
        let mut lists = Vec::with_capacity(self.num.len());

        for &count in &self.num {
            let list = self.adj[offset..offset + count]
                .iter()
                .map(|&one_based| {
                    one_based
                        .checked_sub(1)
                        .ok_or_else(|| SpatialError::InconsistentFlat {
                            message: "neighbour index 0 in 1-indexed adjacency".to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            lists.push(list);
            offset += count;
        }

        NeighborGraph::from_adjacency(lists)
    }
}

impl NeighborGraph {
    /// Flattens the graph into `num`/`adj`/`weights` arrays.
    #[must_use]
    pub fn to_flat(&self) -> FlatAdjacency {
        let num = (0..self.len()).map(|i| self.num_neighbors(i)).collect();
        let adj = (0..self.len())
            .flat_map(|i| self.neighbors(i).iter().map(|n| n + 1))
            .collect();
        let weights = (0..self.len())
            .flat_map(|i| self.weights(i).iter().copied())
            .collect();

        FlatAdjacency { num, adj, weights }
    }

    /// Renders the graph in the line-based graph file format.
    #[must_use]
    pub fn to_graph_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.len());

        for i in 0..self.len() {
            let line = self
                .neighbors(i)
                .iter()
                .map(|n| (n + 1).to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(out, "{line}");
        }

        out
    }

    /// Parses the line-based graph file format.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::MalformedGraphFile`] if the header is not a
    /// count, the number of unit lines differs from it, or a token is not
    /// an index in `1..=count`; other [`SpatialError`]s if the adjacency
    /// is not a valid graph.
    pub fn from_graph_str(text: &str) -> Result<Self, SpatialError> {
        let mut lines = text.lines();

        let header = lines.next().ok_or_else(|| SpatialError::MalformedGraphFile {
            line: 1,
            message: "missing unit count".to_string(),
        })?;
        let count: usize = header
            .trim()
            .parse()
            .map_err(|_| SpatialError::MalformedGraphFile {
                line: 1,
                message: format!("unit count '{}' is not a number", header.trim()),
            })?;

        let mut lists = Vec::with_capacity(count.min(1 << 16));

        for (offset, line) in lines.enumerate() {
            let line_no = offset + 2;

            if lists.len() == count {
                if line.trim().is_empty() {
                    continue;
                }
                return Err(SpatialError::MalformedGraphFile {
                    line: line_no,
                    message: format!("more than {count} unit lines"),
                });
            }

            let list = line
                .split_whitespace()
                .map(|token| {
                    token
                        .parse::<usize>()
                        .ok()
                        .filter(|n| (1..=count).contains(n))
                        .map(|n| n - 1)
                        .ok_or_else(|| SpatialError::MalformedGraphFile {
                            line: line_no,
                            message: format!("'{token}' is not a unit index in 1..={count}"),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            lists.push(list);
        }

        if lists.len() != count {
            return Err(SpatialError::MalformedGraphFile {
                line: lists.len() + 2,
                message: format!("expected {count} unit lines, found {}", lists.len()),
            });
        }

        Self::from_adjacency(lists)
    }

    /// Writes the graph file to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Io`] if the file cannot be written.
    pub fn write_graph_file(&self, path: &Path) -> Result<(), SpatialError> {
        std::fs::write(path, self.to_graph_string()).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Wrote graph file {}", path.display());
        Ok(())
    }

    /// Reads a graph file from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError`] if the file cannot be read or parsed.
    pub fn read_graph_file(path: &Path) -> Result<Self, SpatialError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpatialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_graph_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star() -> NeighborGraph {
        NeighborGraph::from_adjacency(vec![vec![1, 2], vec![0], vec![0]]).unwrap()
    }

    #[test]
    fn star_graph_file() {
        assert_eq!(star().to_graph_string(), "3\n2 3\n1\n1\n");
    }

    #[test]
    fn graph_file_round_trip_preserves_order() {
        let graph = NeighborGraph::from_adjacency(vec![
            vec![3, 1],
            vec![0, 2],
            vec![1],
            vec![0],
            vec![],
        ])
        .unwrap();

        let parsed = NeighborGraph::from_graph_str(&graph.to_graph_string()).unwrap();
        assert_eq!(parsed, graph);
        assert_eq!(parsed.adjacency(), graph.adjacency());
        assert!(parsed.neighbors(4).is_empty());
    }

    #[test]
    fn graph_file_round_trip_through_disk() {
        let path = std::env::temp_dir().join(format!(
            "disease_map_spatial_{}_graph.txt",
            std::process::id()
        ));
        star().write_graph_file(&path).unwrap();
        let parsed = NeighborGraph::read_graph_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(parsed.adjacency(), &[vec![1, 2], vec![0], vec![0]]);
    }

    #[test]
    fn flat_and_file_describe_the_same_graph() {
        let graph = star();
        let flat = graph.to_flat();

        assert_eq!(flat.num, vec![2, 1, 1]);
        assert_eq!(flat.adj, vec![2, 3, 1, 1]);
        assert_eq!(flat.weights, vec![1.0; 4]);
        assert_eq!(flat.sum_num_neigh(), 4);

        let from_flat = flat.to_graph().unwrap();
        let from_file = NeighborGraph::from_graph_str(&graph.to_graph_string()).unwrap();
        assert_eq!(from_flat, from_file);
    }

    #[test]
    fn flat_with_bad_lengths_is_rejected() {
        let flat = FlatAdjacency {
            num: vec![2, 1],
            adj: vec![2],
            weights: vec![1.0],
        };
        assert!(matches!(
            flat.to_graph(),
            Err(SpatialError::InconsistentFlat { .. })
        ));
    }

    #[test]
    fn flat_with_overflowing_counts_is_rejected() {
        let flat = FlatAdjacency {
            num: vec![usize::MAX, 2],
            adj: vec![2],
            weights: vec![1.0],
        };
        assert!(matches!(
            flat.to_graph(),
            Err(SpatialError::InconsistentFlat { .. })
        ));
    }

    #[test]
    fn malformed_graph_files() {
        assert!(matches!(
            NeighborGraph::from_graph_str("three\n"),
            Err(SpatialError::MalformedGraphFile { line: 1, .. })
        ));
        assert!(matches!(
            NeighborGraph::from_graph_str("2\n2\n"),
            Err(SpatialError::MalformedGraphFile { .. })
        ));
        assert!(matches!(
            NeighborGraph::from_graph_str("2\n3\n1\n"),
            Err(SpatialError::MalformedGraphFile { line: 2, .. })
        ));
        assert!(matches!(
            NeighborGraph::from_graph_str("2\n2\n1\n1\n"),
            Err(SpatialError::MalformedGraphFile { line: 4, .. })
        ));
        assert!(matches!(
            NeighborGraph::from_graph_str("2\n2\n\n"),
            Err(SpatialError::Asymmetric { a: 0, b: 1 })
        ));
    }

    #[test]
    fn trailing_blank_lines_are_ignored() {
        let parsed = NeighborGraph::from_graph_str("2\n2\n1\n\n\n").unwrap();
        assert_eq!(parsed.link_count(), 1);
    }
}
