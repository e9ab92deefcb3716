//! Coupled element sets.
//!
//! A coupling owns up to two entities: a [`SurfaceEntity`] over boundary
//! faces and a [`VolumeEntity`] over cells. Both wrap [`CoupledElements`], the
//! extracted geometry and its locator, and share the per-iteration exchange
//! through the [`CouplingEntity`] trait.

use tracing::info;
use uom::si::f64::Area;

use crate::{
    channel::Channel,
    locator::{Locator, LocatorConfig, SearchMode},
    mesh::{ElementKind, ExtractedMesh, ParentMesh},
};

use super::{CouplingConfig, CouplingError, Dimension};

/// Extracted geometry, locator and exchange buffers of one entity.
///
/// Buffers follow the extracted mesh numbering.
#[derive(Debug)]
pub struct CoupledElements {
    mesh: ExtractedMesh,
    locator: Locator,
    solid_temp: Vec<f64>,
    flux: Vec<f64>,
}

impl CoupledElements {
    /// Extracts the selected elements and locates them on the partner.
    ///
    /// The exterior check is left to the caller so entity-specific exchanges
    /// can run first.
    fn locate(
        config: &CouplingConfig,
        channel: &Channel,
        parent: &impl ParentMesh,
        kind: ElementKind,
        criteria: &str,
    ) -> Result<Self, CouplingError> {
        let suffix = match kind {
            ElementKind::Face => "faces",
            ElementKind::Cell => "cells",
        };
        let name = format!("{} {suffix}", config.partner_name);
        let verbose = config.verbosity > 0;

        let mesh = ExtractedMesh::extract(parent, kind, criteria, name);
        if verbose {
            info!(mesh = mesh.name(), "coupled mesh extracted");
        }

        let n_global = channel.sum(mesh.len() as u64)?;
        if n_global == 0 {
            return Err(CouplingError::EmptySelection {
                criteria: criteria.to_string(),
            });
        }

        let (bounds, centers) = match config.dim {
            Dimension::Two => {
                let projected = mesh.projected(config.ref_axis);
                if verbose {
                    info!(axis = ?config.ref_axis, "coupled mesh projected to 2D");
                }
                (projected.bounds(), projected.centers())
            }
            Dimension::Three => (mesh.bounds(), mesh.centers()),
        };

        if verbose {
            info!(n_elements = n_global, mesh = mesh.name(), "extracted mesh built");
        }

        let mode = match kind {
            ElementKind::Face => SearchMode::Closest,
            ElementKind::Cell => SearchMode::Containment,
        };
        let mut locator = Locator::new(
            channel.clone(),
            LocatorConfig {
                mode,
                ..LocatorConfig::default()
            },
        );
        locator.locate(&bounds, &centers)?;

        if verbose {
            let LocatorConfig { tolerance, mode } = locator.config();
            info!(mesh = mesh.name(), ?mode, tolerance, "locator created");
        }

        let n = mesh.len();
        Ok(Self {
            mesh,
            locator,
            solid_temp: vec![0.0; n],
            flux: vec![0.0; n],
        })
    }

    /// Fails if any rank holds points not located on the partner.
    fn ensure_located(&self, channel: &Channel) -> Result<(), CouplingError> {
        let n_exterior = channel.sum(self.locator.n_exterior() as u64)?;
        if n_exterior > 0 {
            return Err(CouplingError::NotLocated {
                n_exterior: usize::try_from(n_exterior).unwrap_or(usize::MAX),
                mesh: self.mesh.name().to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn mesh(&self) -> &ExtractedMesh {
        &self.mesh
    }

    #[must_use]
    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    /// Number of local coupled elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mesh.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }

    /// Last solid temperature received for each element.
    #[must_use]
    pub fn solid_temp(&self) -> &[f64] {
        &self.solid_temp
    }

    /// Last computed heat flux density, `hf × (solid − tf)`, for each element.
    #[must_use]
    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    fn check_len(&self, name: &'static str, values: &[f64]) -> Result<(), CouplingError> {
        if values.len() == self.len() {
            Ok(())
        } else {
            Err(CouplingError::BufferLength {
                name,
                expected: self.len(),
                found: values.len(),
            })
        }
    }
}

/// Per-iteration exchange shared by both entity kinds.
pub trait CouplingEntity {
    fn coupled(&self) -> &CoupledElements;

    fn coupled_mut(&mut self) -> &mut CoupledElements;

    /// Called with the exchange coefficient once fluid values are sent.
    fn keep_exchange_coefficient(&mut self, _hf: &[f64]) {}

    /// Receives the solid temperature at every coupled element.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if `solid_temp` does not hold one value per
    /// element or the exchange fails.
    fn recv_solid_temperature(&mut self, solid_temp: &mut [f64]) -> Result<(), CouplingError> {
        let coupled = self.coupled_mut();
        coupled.check_len("solid_temp", solid_temp)?;

        coupled.locator.recv_at_points(solid_temp, 1)?;
        coupled.solid_temp.copy_from_slice(solid_temp);
        Ok(())
    }

    /// Sends fluid temperature and exchange coefficient to the partner, then
    /// updates the local flux.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if a buffer does not hold one value per
    /// element or the exchange fails.
    fn send_fluid_temperature(&mut self, tf: &[f64], hf: &[f64]) -> Result<(), CouplingError> {
        let coupled = self.coupled_mut();
        coupled.check_len("tf", tf)?;
        coupled.check_len("hf", hf)?;

        let send: Vec<f64> = coupled
            .locator
            .dist_points()
            .flat_map(|p| [tf[p.element - 1], hf[p.element - 1]])
            .collect();
        coupled.locator.send_to_points(&send, 2)?;

        for (((flux, &solid), &fluid), &h) in coupled
            .flux
            .iter_mut()
            .zip(&coupled.solid_temp)
            .zip(tf)
            .zip(hf)
        {
            *flux = h * (solid - fluid);
        }

        self.keep_exchange_coefficient(hf);
        Ok(())
    }
}

/// Coupled boundary faces.
#[derive(Debug)]
pub struct SurfaceEntity {
    coupled: CoupledElements,
    face_areas: Vec<Area>,
    distance_to_solid: Vec<f64>,
    distance_to_fluid: Vec<f64>,
}

impl SurfaceEntity {
    pub(crate) fn create(
        config: &CouplingConfig,
        channel: &Channel,
        parent: &impl ParentMesh,
        criteria: &str,
    ) -> Result<Self, CouplingError> {
        let mut coupled = CoupledElements::locate(config, channel, parent, ElementKind::Face, criteria)?;

        let distance_to_solid = coupled.locator.point_distances().to_vec();
        let mut distance_to_fluid = vec![0.0; coupled.locator.n_dist_points()];
        coupled.locator.recv_at_distant(&mut distance_to_fluid, 1)?;

        if config.verbosity > 0 {
            info!(
                max_distance_to_solid = max_of(&distance_to_solid),
                max_distance_to_fluid = max_of(&distance_to_fluid),
                "face location distances"
            );
        }

        coupled.ensure_located(channel)?;

        let face_areas = coupled
            .mesh
            .parent_ids()
            .iter()
            .map(|&face| parent.boundary_face_area(face))
            .collect();

        Ok(Self {
            coupled,
            face_areas,
            distance_to_solid,
            distance_to_fluid,
        })
    }

    /// Area of each coupled face, in extracted order.
    #[must_use]
    pub fn face_areas(&self) -> &[Area] {
        &self.face_areas
    }

    /// Distance from each local face center to the partner element holding it.
    #[must_use]
    pub fn distance_to_solid(&self) -> &[f64] {
        &self.distance_to_solid
    }

    /// Distance from each partner point located here to its local face.
    #[must_use]
    pub fn distance_to_fluid(&self) -> &[f64] {
        &self.distance_to_fluid
    }
}

impl CouplingEntity for SurfaceEntity {
    fn coupled(&self) -> &CoupledElements {
        &self.coupled
    }

    fn coupled_mut(&mut self) -> &mut CoupledElements {
        &mut self.coupled
    }
}

/// Coupled cells.
///
/// Keeps the last exchange coefficient so volumetric source terms can be
/// computed later in the time step.
#[derive(Debug)]
pub struct VolumeEntity {
    coupled: CoupledElements,
    hvol: Vec<f64>,
}

impl VolumeEntity {
    pub(crate) fn create(
        config: &CouplingConfig,
        channel: &Channel,
        parent: &impl ParentMesh,
        criteria: &str,
    ) -> Result<Self, CouplingError> {
        let coupled = CoupledElements::locate(config, channel, parent, ElementKind::Cell, criteria)?;
        coupled.ensure_located(channel)?;

        let n = coupled.len();
        Ok(Self {
            coupled,
            hvol: vec![0.0; n],
        })
    }

    /// Last volumetric exchange coefficient sent for each cell.
    #[must_use]
    pub fn hvol(&self) -> &[f64] {
        &self.hvol
    }
}

impl CouplingEntity for VolumeEntity {
    fn coupled(&self) -> &CoupledElements {
        &self.coupled
    }

    fn coupled_mut(&mut self) -> &mut CoupledElements {
        &mut self.coupled
    }

    fn keep_exchange_coefficient(&mut self, hf: &[f64]) {
        self.hvol.copy_from_slice(hf);
    }
}

fn max_of(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(0.0, f64::max)
}
