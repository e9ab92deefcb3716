use crate::locator::ElementBounds;

use super::{Axis, ElementKind, ParentMesh, Point};

/// Owned copy of the coupled part of a parent mesh.
///
/// Elements are grouped by vertex count, the way a nodal mesh groups elements
/// by type, so the local numbering generally differs from the parent
/// selection order. [`ExtractedMesh::parent_ids`] maps each local element back
/// to its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedMesh {
    name: String,
    kind: ElementKind,
    parent_ids: Vec<usize>,
    elements: Vec<Vec<Point>>,
}

impl ExtractedMesh {
    /// Extracts the elements of `kind` matching `criteria`.
    pub fn extract(
        parent: &impl ParentMesh,
        kind: ElementKind,
        criteria: &str,
        name: impl Into<String>,
    ) -> Self {
        let mut selected: Vec<(usize, Vec<Point>)> = parent
            .select(kind, criteria)
            .into_iter()
            .map(|id| (id, parent.vertices(kind, id)))
            .collect();

        // Stable: elements of one type keep their selection order.
        selected.sort_by_key(|(_, vertices)| vertices.len());

        let (parent_ids, elements) = selected.into_iter().unzip();

        Self {
            name: name.into(),
            kind,
            parent_ids,
            elements,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Number of local elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Parent element id of each local element, in local order.
    #[must_use]
    pub fn parent_ids(&self) -> &[usize] {
        &self.parent_ids
    }

    /// Vertex coordinates of each local element.
    #[must_use]
    pub fn elements(&self) -> &[Vec<Point>] {
        &self.elements
    }

    /// Returns a copy with every vertex projected onto the plane normal to `axis`.
    ///
    /// The extracted geometry itself is left untouched.
    #[must_use]
    pub fn projected(&self, axis: Axis) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind,
            parent_ids: self.parent_ids.clone(),
            elements: self
                .elements
                .iter()
                .map(|vertices| vertices.iter().map(|&p| axis.project(p)).collect())
                .collect(),
        }
    }

    /// Element centers, computed as vertex averages.
    #[must_use]
    pub fn centers(&self) -> Vec<Point> {
        self.elements.iter().map(|vertices| center(vertices)).collect()
    }

    /// Bounding boxes used by the locator.
    #[must_use]
    pub fn bounds(&self) -> Vec<ElementBounds> {
        self.elements
            .iter()
            .map(|vertices| ElementBounds::from_vertices(vertices))
            .collect()
    }
}

fn center(vertices: &[Point]) -> Point {
    if vertices.is_empty() {
        return [0.0; 3];
    }

    #[allow(clippy::cast_precision_loss)]
    let n = vertices.len() as f64;
    let mut sum = [0.0; 3];
    for vertex in vertices {
        for (s, v) in sum.iter_mut().zip(vertex) {
            *s += v;
        }
    }
    sum.map(|s| s / n)
}
