use crate::mesh::Axis;

/// Spatial dimension of a coupling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dimension {
    /// Location runs on geometry projected onto the plane normal to
    /// [`CouplingConfig::ref_axis`].
    Two,

    /// Location runs on the full 3D geometry.
    #[default]
    Three,
}

/// Definition of one coupling instance.
///
/// At least one of `face_selection` and `cell_selection` must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingConfig {
    /// Name of the partner program, used to name the extracted meshes.
    pub partner_name: String,

    /// Dimension the coupled geometry is located in.
    pub dim: Dimension,

    /// Projection axis for two-dimensional couplings.
    pub ref_axis: Axis,

    /// Selection criteria for coupled boundary faces.
    pub face_selection: Option<String>,

    /// Selection criteria for coupled cells.
    pub cell_selection: Option<String>,

    /// Zero is silent; anything higher logs setup progress.
    pub verbosity: u32,

    /// Whether post-processing output of the coupled meshes is requested.
    ///
    /// Kept for the host's writers; this crate produces no output itself.
    pub visualization: bool,
}

impl Default for CouplingConfig {
    fn default() -> Self {
        Self {
            partner_name: String::from("solid"),
            dim: Dimension::Three,
            ref_axis: Axis::Z,
            face_selection: None,
            cell_selection: None,
            verbosity: 0,
            visualization: false,
        }
    }
}

/// How volumetric exchange terms enter the fluid energy equation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceTreatment {
    /// Split into an explicit part and an implicit coefficient.
    #[default]
    Implicit,

    /// Fully explicit source.
    Explicit,
}

/// Options shared by every coupling of a registry.
///
/// They are fixed once the first coupling negotiates with its partner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CouplingOptions {
    /// Apply the global flux correction on surface couplings.
    pub conservativity: bool,

    /// Split used by [`Coupling::source_terms`](super::Coupling::source_terms).
    pub treatment: SourceTreatment,
}
