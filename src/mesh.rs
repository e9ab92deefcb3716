//! Coupled geometry.
//!
//! The flow solver's mesh is an external collaborator: this crate only needs
//! to select elements by criteria, read their vertex coordinates and, for the
//! conservativity correction, the area of boundary faces. [`ParentMesh`] is
//! that interface. [`ExtractedMesh`] is the owned sub-mesh a coupling builds
//! from it, independent of the parent's lifetime.

mod extracted;

pub use extracted::ExtractedMesh;

use uom::si::f64::Area;

/// Cartesian coordinates of a point.
///
/// Two-dimensional coordinates keep a zero third component.
pub type Point = [f64; 3];

/// Kind of mesh element taking part in a coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Boundary faces, for surface coupling.
    Face,

    /// Cells, for volume coupling.
    Cell,
}

/// Reference axis used to project 3-D geometry onto a plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Axis {
    /// Project onto the `(y, z)` plane.
    X,

    /// Project onto the `(x, z)` plane.
    Y,

    /// Project onto the `(x, y)` plane.
    #[default]
    Z,
}

impl Axis {
    /// Projects a point onto the plane normal to this axis.
    ///
    /// The two retained coordinates keep their original order and the third
    /// component is set to zero.
    ///
    /// ```
    /// use conjugate_coupling::mesh::Axis;
    ///
    /// assert_eq!(Axis::X.project([1.0, 2.0, 3.0]), [2.0, 3.0, 0.0]);
    /// assert_eq!(Axis::Y.project([1.0, 2.0, 3.0]), [1.0, 3.0, 0.0]);
    /// assert_eq!(Axis::Z.project([1.0, 2.0, 3.0]), [1.0, 2.0, 0.0]);
    /// ```
    #[must_use]
    pub fn project(self, [x, y, z]: Point) -> Point {
        match self {
            Self::X => [y, z, 0.0],
            Self::Y => [x, z, 0.0],
            Self::Z => [x, y, 0.0],
        }
    }
}

/// The flow solver's mesh, as seen by a coupling.
///
/// Element ids are 0-based indices into the parent mesh's cells or boundary
/// faces, depending on the [`ElementKind`].
pub trait ParentMesh {
    /// Returns the ids of the elements of `kind` matching `criteria`.
    ///
    /// The criteria syntax belongs to the implementation.
    fn select(&self, kind: ElementKind, criteria: &str) -> Vec<usize>;

    /// Returns the vertex coordinates of one element.
    fn vertices(&self, kind: ElementKind, id: usize) -> Vec<Point>;

    /// Returns the surface area of one boundary face.
    fn boundary_face_area(&self, face: usize) -> Area;
}
