//! Brute-force point-in-element search over element bounding boxes.
//!
//! Each point gets at most one candidate element, with a distance used to
//! arbitrate between partner ranks.

use crate::mesh::Point;

/// How received points are matched against local elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    /// A point matches an element whose (tolerance-expanded) bounding box
    /// contains it. Used for cells.
    #[default]
    Containment,

    /// A point matches the nearest element, wherever it lies. Used for
    /// faces, where containment is ill-posed for points coming from a
    /// volumetric point cloud.
    Closest,
}

/// Axis-aligned bounds and center of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBounds {
    min: Point,
    max: Point,
    center: Point,
}

impl ElementBounds {
    /// Computes bounds from vertex coordinates.
    ///
    /// The center is the vertex average, matching [`ExtractedMesh::centers`].
    ///
    /// [`ExtractedMesh::centers`]: crate::mesh::ExtractedMesh::centers
    #[must_use]
    pub fn from_vertices(vertices: &[Point]) -> Self {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        let mut sum = [0.0; 3];

        for vertex in vertices {
            for k in 0..3 {
                min[k] = min[k].min(vertex[k]);
                max[k] = max[k].max(vertex[k]);
                sum[k] += vertex[k];
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let n = vertices.len().max(1) as f64;

        Self {
            min,
            max,
            center: sum.map(|s| s / n),
        }
    }

    #[must_use]
    pub fn center(&self) -> Point {
        self.center
    }

    /// Characteristic size: the largest bounding box extent.
    #[must_use]
    pub fn size(&self) -> f64 {
        (0..3)
            .map(|k| self.max[k] - self.min[k])
            .fold(0.0, f64::max)
    }

    /// Returns `true` if `point` lies in the box expanded by `tolerance × size`.
    #[must_use]
    pub fn contains(&self, point: Point, tolerance: f64) -> bool {
        let margin = tolerance * self.size();
        (0..3).all(|k| point[k] >= self.min[k] - margin && point[k] <= self.max[k] + margin)
    }

    /// Euclidean distance from `point` to the element center.
    #[must_use]
    pub fn distance_to_center(&self, point: Point) -> f64 {
        (0..3)
            .map(|k| (point[k] - self.center[k]).powi(2))
            .sum::<f64>()
            .sqrt()
    }
}

/// Best local element found for one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    /// 0-based local element index.
    pub element: usize,

    /// Distance from the point to the element center.
    pub distance: f64,
}

/// Finds the element matching `point`, if any.
///
/// Among several matches, the element with the closest center wins, and the
/// lowest index breaks exact ties.
pub(crate) fn locate_point(
    elements: &[ElementBounds],
    point: Point,
    tolerance: f64,
    mode: SearchMode,
) -> Option<Candidate> {
    elements
        .iter()
        .enumerate()
        .filter(|(_, bounds)| match mode {
            SearchMode::Containment => bounds.contains(point, tolerance),
            SearchMode::Closest => true,
        })
        .map(|(element, bounds)| Candidate {
            element,
            distance: bounds.distance_to_center(point),
        })
        .fold(None, |best: Option<Candidate>, candidate| match best {
            Some(best) if best.distance <= candidate.distance => Some(best),
            _ => Some(candidate),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::test_support::cube;

    fn row_of_cubes(n: usize) -> Vec<ElementBounds> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64;
                ElementBounds::from_vertices(&cube([x, 0.0, 0.0], 1.0))
            })
            .collect()
    }

    #[test]
    fn bounds_of_a_cube() {
        let bounds = ElementBounds::from_vertices(&cube([1.0, 2.0, 3.0], 2.0));

        assert_eq!(bounds.center(), [2.0, 3.0, 4.0]);
        assert_relative_eq!(bounds.size(), 2.0);
        assert!(bounds.contains([1.0, 2.0, 3.0], 0.0));
        assert!(!bounds.contains([0.9, 2.0, 3.0], 0.0));
        assert!(bounds.contains([0.9, 2.0, 3.0], 0.1));
    }

    #[test]
    fn containment_picks_the_enclosing_cell() {
        let elements = row_of_cubes(3);

        let found = locate_point(&elements, [1.4, 0.5, 0.5], 0.1, SearchMode::Containment);
        assert_eq!(found.map(|c| c.element), Some(1));

        let missed = locate_point(&elements, [1.5, 3.0, 0.5], 0.1, SearchMode::Containment);
        assert_eq!(missed, None);
    }

    #[test]
    fn points_on_shared_boundaries_prefer_the_lowest_index() {
        let elements = row_of_cubes(2);

        let found = locate_point(&elements, [1.0, 0.5, 0.5], 0.1, SearchMode::Containment);
        assert_eq!(found.map(|c| c.element), Some(0));
    }

    #[test]
    fn closest_always_finds_an_element() {
        let elements = row_of_cubes(3);

        let found = locate_point(&elements, [10.0, 0.5, 0.5], 0.1, SearchMode::Closest)
            .expect("closest search should match");
        assert_eq!(found.element, 2);
        assert_relative_eq!(found.distance, 7.5);

        assert_eq!(locate_point(&[], [0.0; 3], 0.1, SearchMode::Closest), None);
    }
}
