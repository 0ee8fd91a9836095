//! Contiguity graph construction.
//!
//! Two units are neighbours when their boundaries share vertices: at least
//! one for queen contiguity, at least two (a shared edge) for rook
//! contiguity. Vertices are matched within a snap distance using a single
//! R-tree over every boundary vertex of the layer.

use std::collections::{BTreeMap, BTreeSet};

use geo::{CoordsIter, MultiPolygon, Validation};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{NeighborGraph, SpatialError};

/// A boundary vertex tagged with the index of the unit it belongs to.
type VertexEntry = GeomWithData<[f64; 2], usize>;

/// Contiguity rule.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Contiguity {
    /// At least one shared boundary point.
    #[default]
    Queen,
    /// At least two shared boundary points.
    Rook,
}

impl Contiguity {
    const fn min_shared_points(self) -> usize {
        match self {
            Self::Queen => 1,
            Self::Rook => 2,
        }
    }
}

/// What to do with units that have no neighbours.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IsolatedUnitPolicy {
    /// Keep them with an empty neighbour list.
    #[default]
    Allow,
    /// Fail graph construction.
    Reject,
}

/// Options for [`build_contiguity_graph`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContiguityOptions {
    /// Contiguity rule.
    #[serde(default)]
    pub rule: Contiguity,
    /// Maximum distance between two vertices considered the same point.
    #[serde(default = "default_snap")]
    pub snap: f64,
    /// Handling of isolated units.
    #[serde(default)]
    pub isolated: IsolatedUnitPolicy,
}

/// Default snap distance, `sqrt(f64::EPSILON)`.
#[must_use]
pub fn default_snap() -> f64 {
    f64::EPSILON.sqrt()
}

impl Default for ContiguityOptions {
    fn default() -> Self {
        Self {
            rule: Contiguity::default(),
            snap: default_snap(),
            isolated: IsolatedUnitPolicy::default(),
        }
    }
}

/// Builds the contiguity graph of `boundaries`, in input order.
///
/// # Errors
///
/// Returns [`SpatialError::InvalidGeometry`] if a boundary is empty or not
/// a valid polygon, or [`SpatialError::IsolatedUnits`] if isolated units
/// exist under [`IsolatedUnitPolicy::Reject`].
pub fn build_contiguity_graph(
    boundaries: &[MultiPolygon<f64>],
    options: &ContiguityOptions,
) -> Result<NeighborGraph, SpatialError> {
    if !options.snap.is_finite() || options.snap < 0.0 {
        return Err(SpatialError::InvalidGeometry {
            index: 0,
            message: format!("snap distance {} must be finite and non-negative", options.snap),
        });
    }

    let vertices = boundaries
        .iter()
        .enumerate()
        .map(|(index, boundary)| {
            validate(index, boundary)?;
            Ok(unique_vertices(boundary))
        })
        .collect::<Result<Vec<_>, SpatialError>>()?;

    let entries: Vec<VertexEntry> = vertices
        .iter()
        .enumerate()
        .flat_map(|(index, points)| points.iter().map(move |p| GeomWithData::new(*p, index)))
        .collect();

    log::debug!(
        "Indexing {} boundary vertices from {} units",
        entries.len(),
        boundaries.len()
    );

    let tree = RTree::bulk_load(entries);
    let shared = count_shared_points(&tree, &vertices, options.snap);

    let mut neighbors = vec![Vec::new(); boundaries.len()];
    let min_shared = options.rule.min_shared_points();

    for (&(a, b), &count) in &shared {
        if count >= min_shared {
            neighbors[a].push(b);
            neighbors[b].push(a);
        }
    }

    let graph = NeighborGraph::from_adjacency(neighbors)?;

    let isolated = graph.isolated();
    if !isolated.is_empty() {
        match options.isolated {
            IsolatedUnitPolicy::Allow => {
                log::warn!("{} unit(s) have no neighbours", isolated.len());
            }
            IsolatedUnitPolicy::Reject => {
                return Err(SpatialError::IsolatedUnits { indices: isolated });
            }
        }
    }

    Ok(graph)
}

/// Counts, for every unit pair `(a, b)` with `a < b`, how many distinct
/// vertices of `a` have a vertex of `b` within `snap`.
fn count_shared_points(
    tree: &RTree<VertexEntry>,
    vertices: &[Vec<[f64; 2]>],
    snap: f64,
) -> BTreeMap<(usize, usize), usize> {
    let radius_2 = snap * snap;
    let mut shared = BTreeMap::new();

    for (a, points) in vertices.iter().enumerate() {
        for point in points {
            let touching: BTreeSet<usize> = tree
                .locate_within_distance(*point, radius_2)
                .map(|entry| entry.data)
                .filter(|&b| b > a)
                .collect();

            for b in touching {
                *shared.entry((a, b)).or_insert(0) += 1;
            }
        }
    }

    shared
}

fn validate(index: usize, boundary: &MultiPolygon<f64>) -> Result<(), SpatialError> {
    if boundary.0.is_empty() || boundary.coords_count() == 0 {
        return Err(SpatialError::InvalidGeometry {
            index,
            message: "empty boundary".to_string(),
        });
    }

    boundary
        .check_validation()
        .map_err(|e| SpatialError::InvalidGeometry {
            index,
            message: e.to_string(),
        })
}

/// Distinct boundary vertices (closing ring points repeat the first one).
fn unique_vertices(boundary: &MultiPolygon<f64>) -> Vec<[f64; 2]> {
    let mut seen = BTreeSet::new();
    boundary
        .coords_iter()
        .filter(|c| seen.insert((c.x.to_bits(), c.y.to_bits())))
        .map(|c| [c.x, c.y])
        .collect()
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    fn square(x: f64, y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x, y: y),
            (x: x + 1.0, y: y),
            (x: x + 1.0, y: y + 1.0),
            (x: x, y: y + 1.0),
            (x: x, y: y),
        ]])
    }

    /// 2x2 grid of unit squares:
    ///
    /// ```text
    /// 2 3
    /// 0 1
    /// ```
    fn grid() -> Vec<MultiPolygon<f64>> {
        vec![
            square(0.0, 0.0),
            square(1.0, 0.0),
            square(0.0, 1.0),
            square(1.0, 1.0),
        ]
    }

    #[test]
    fn queen_links_diagonals() {
        let graph = build_contiguity_graph(&grid(), &ContiguityOptions::default()).unwrap();
        assert_eq!(graph.neighbors(0), &[1, 2, 3]);
        assert_eq!(graph.neighbors(3), &[0, 1, 2]);
        assert_eq!(graph.link_count(), 6);
    }

    #[test]
    fn rook_skips_corner_contact() {
        let options = ContiguityOptions {
            rule: Contiguity::Rook,
            ..ContiguityOptions::default()
        };
        let graph = build_contiguity_graph(&grid(), &options).unwrap();
        assert_eq!(graph.neighbors(0), &[1, 2]);
        assert_eq!(graph.neighbors(1), &[0, 3]);
        assert!(!graph.are_neighbors(0, 3));
        assert!(!graph.are_neighbors(1, 2));
    }

    #[test]
    fn rook_links_are_a_subset_of_queen_links() {
        let queen = build_contiguity_graph(&grid(), &ContiguityOptions::default()).unwrap();
        let rook = build_contiguity_graph(
            &grid(),
            &ContiguityOptions {
                rule: Contiguity::Rook,
                ..ContiguityOptions::default()
            },
        )
        .unwrap();

        for a in 0..rook.len() {
            for &b in rook.neighbors(a) {
                assert!(queen.are_neighbors(a, b));
            }
        }
    }

    #[test]
    fn three_unit_star() {
        // Unit 0 spans the bottom; units 1 and 2 sit on top of it, apart.
        let base = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 5.0, y: 1.0),
            (x: 3.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]]);
        let left = MultiPolygon(vec![polygon![
            (x: 0.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 1.0),
        ]]);
        let right = MultiPolygon(vec![polygon![
            (x: 3.0, y: 1.0),
            (x: 5.0, y: 1.0),
            (x: 5.0, y: 2.0),
            (x: 3.0, y: 2.0),
            (x: 3.0, y: 1.0),
        ]]);

        let graph =
            build_contiguity_graph(&[base, left, right], &ContiguityOptions::default()).unwrap();
        assert_eq!(graph.adjacency(), &[vec![1, 2], vec![0], vec![0]]);
    }

    #[test]
    fn isolated_unit_policy() {
        let layer = vec![square(0.0, 0.0), square(1.0, 0.0), square(10.0, 10.0)];

        let graph = build_contiguity_graph(&layer, &ContiguityOptions::default()).unwrap();
        assert!(graph.neighbors(2).is_empty());

        let err = build_contiguity_graph(
            &layer,
            &ContiguityOptions {
                isolated: IsolatedUnitPolicy::Reject,
                ..ContiguityOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SpatialError::IsolatedUnits { indices } if indices == vec![2]));
    }

    #[test]
    fn snap_tolerance_closes_small_gaps() {
        let layer = vec![square(0.0, 0.0), square(1.000_001, 0.0)];

        let exact = build_contiguity_graph(&layer, &ContiguityOptions::default()).unwrap();
        assert_eq!(exact.link_count(), 0);

        let snapped = build_contiguity_graph(
            &layer,
            &ContiguityOptions {
                snap: 1e-3,
                ..ContiguityOptions::default()
            },
        )
        .unwrap();
        assert!(snapped.are_neighbors(0, 1));
    }

    #[test]
    fn self_intersecting_boundary_is_rejected() {
        let bowtie = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]]);
        let err = build_contiguity_graph(&[square(5.0, 5.0), bowtie], &ContiguityOptions::default())
            .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidGeometry { index: 1, .. }));
    }

    #[test]
    fn empty_boundary_is_rejected() {
        let err = build_contiguity_graph(&[MultiPolygon(vec![])], &ContiguityOptions::default())
            .unwrap_err();
        assert!(matches!(err, SpatialError::InvalidGeometry { index: 0, .. }));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        assert_eq!(Contiguity::Rook.to_string(), "rook");
        let options = ContiguityOptions::default();
        assert!((options.snap - f64::EPSILON.sqrt()).abs() < f64::EPSILON);
        assert_eq!(options.isolated, IsolatedUnitPolicy::Allow);
    }
}
