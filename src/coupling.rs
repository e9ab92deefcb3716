//! One coupling between the flow solver and a partner thermal program.
//!
//! A [`Coupling`] walks through a fixed setup sequence before it can exchange
//! fields:
//!
//! 1. [`Coupling::init_comm`] opens the channel to the partner,
//! 2. [`Coupling::negotiate`] checks both programs agree on the coupling type,
//! 3. [`Coupling::init_mesh`] extracts the coupled elements, locates them on
//!    the partner and waits for the partner to be ready.
//!
//! Each time step then calls [`Coupling::recv_solid_temperature`] and
//! [`Coupling::send_fluid_temperature`] per coupled element kind, and volume
//! couplings finish with [`Coupling::source_terms`].

mod config;
pub mod conservativity;
mod entity;
mod error;
pub mod handshake;
pub mod source_term;

pub use config::{CouplingConfig, CouplingOptions, Dimension, SourceTreatment};
pub use conservativity::Correction;
pub use entity::{CoupledElements, CouplingEntity, SurfaceEntity, VolumeEntity};
pub use error::CouplingError;

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    channel::{Channel, Transport},
    locator::LocatorTimes,
    mesh::{ElementKind, ParentMesh},
};

use handshake::Message;

/// Setup progress of a coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Defined, no channel opened yet.
    Unconnected,

    /// Channel open, coupling type not yet agreed.
    Connected,

    /// Coupling type agreed and options fixed.
    Negotiated,

    /// Elements located and partner started; fields can be exchanged.
    Ready,
}

/// Location and exchange times of one coupling, per entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingTimes {
    pub id: usize,
    pub partner_name: String,
    pub surface: Option<LocatorTimes>,
    pub volume: Option<LocatorTimes>,
}

/// A coupling with one partner program.
#[derive(Debug)]
pub struct Coupling {
    id: usize,
    config: CouplingConfig,
    stage: Stage,
    channel: Channel,
    options: CouplingOptions,
    surface: Option<SurfaceEntity>,
    volume: Option<VolumeEntity>,
}

impl Coupling {
    /// Defines a coupling. Nothing is communicated yet.
    ///
    /// # Errors
    ///
    /// Returns [`CouplingError::NoSelection`] if the configuration selects
    /// neither faces nor cells.
    pub fn new(id: usize, config: CouplingConfig) -> Result<Self, CouplingError> {
        if config.face_selection.is_none() && config.cell_selection.is_none() {
            return Err(CouplingError::NoSelection);
        }

        Ok(Self {
            id,
            config,
            stage: Stage::Unconnected,
            channel: Channel::detached(),
            options: CouplingOptions::default(),
            surface: None,
            volume: None,
        })
    }

    /// Ordinal of this coupling within its registry.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &CouplingConfig {
        &self.config
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Options fixed at negotiation.
    #[must_use]
    pub fn options(&self) -> CouplingOptions {
        self.options
    }

    /// Returns `true` if boundary faces are coupled.
    #[must_use]
    pub fn is_surface(&self) -> bool {
        self.config.face_selection.is_some()
    }

    /// Returns `true` if cells are coupled.
    #[must_use]
    pub fn is_volume(&self) -> bool {
        self.config.cell_selection.is_some()
    }

    #[must_use]
    pub fn surface(&self) -> Option<&SurfaceEntity> {
        self.surface.as_ref()
    }

    #[must_use]
    pub fn volume(&self) -> Option<&VolumeEntity> {
        self.volume.as_ref()
    }

    /// Number of local coupled elements of `kind`, zero if not coupled.
    #[must_use]
    pub fn n_elements(&self, kind: ElementKind) -> usize {
        self.entity(kind).map_or(0, |entity| entity.coupled().len())
    }

    /// Parent mesh ids of the coupled elements of `kind`, in buffer order.
    #[must_use]
    pub fn parent_ids(&self, kind: ElementKind) -> Option<&[usize]> {
        self.entity(kind).map(|entity| entity.coupled().mesh().parent_ids())
    }

    /// Opens the channel to the partner program.
    ///
    /// Without a transport the coupling stays detached: geometry is still
    /// extracted but nothing is sent to a partner.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if called twice or if connecting fails.
    pub fn init_comm(
        &mut self,
        transport: Option<Arc<dyn Transport>>,
        partner_root: usize,
    ) -> Result<(), CouplingError> {
        self.expect_stage("init_comm", Stage::Unconnected)?;

        self.channel = match transport {
            Some(transport) => Channel::connect(transport, partner_root)?,
            None => Channel::detached(),
        };

        if self.config.verbosity > 0 {
            info!(
                coupling = self.id,
                partner = %self.config.partner_name,
                rank = ?self.channel.rank(),
                local_ranks = ?self.channel.local_ranks(),
                distant_ranks = ?self.channel.distant_ranks(),
                "coupling communicator initialized"
            );
        }

        self.stage = Stage::Connected;
        Ok(())
    }

    /// Agrees on the coupling type with the partner and fixes the options.
    ///
    /// # Errors
    ///
    /// Returns [`CouplingError::Negotiation`] if the partner couples different
    /// element kinds, or another [`CouplingError`] if called out of order or a
    /// message fails.
    pub fn negotiate(&mut self, options: CouplingOptions) -> Result<(), CouplingError> {
        self.expect_stage("negotiate", Stage::Connected)?;

        let local = Message::CouplingType {
            surface: self.is_surface(),
            volume: self.is_volume(),
            conservativity: options.conservativity,
        };

        if self.channel.is_connected() {
            let remote = handshake::exchange(&self.channel, &local)?;
            handshake::check_compatible(&local, &remote)?;
            debug!(coupling = self.id, token = %local.token(), "coupling type agreed");
        }

        self.options = options;
        self.stage = Stage::Negotiated;
        Ok(())
    }

    /// Extracts and locates the coupled elements, then waits for the partner.
    ///
    /// Faces are handled before cells.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if a selection is empty, some elements are
    /// not located, the partner does not answer with a start message, or the
    /// coupling has not negotiated yet.
    pub fn init_mesh(&mut self, mesh: &impl ParentMesh) -> Result<(), CouplingError> {
        self.expect_stage("init_mesh", Stage::Negotiated)?;

        let verbose = self.config.verbosity > 0;
        if verbose {
            info!(partner = %self.config.partner_name, "processing the mesh for coupling");
        }

        if let Some(criteria) = &self.config.face_selection {
            self.surface = Some(SurfaceEntity::create(
                &self.config,
                &self.channel,
                mesh,
                criteria,
            )?);
        }

        if let Some(criteria) = &self.config.cell_selection {
            self.volume = Some(VolumeEntity::create(
                &self.config,
                &self.channel,
                mesh,
                criteria,
            )?);
        }

        if self.channel.is_connected() {
            match handshake::exchange(&self.channel, &Message::Start)? {
                Message::Start => {}
                other => {
                    return Err(CouplingError::UnexpectedMessage {
                        received: other.token(),
                    });
                }
            }
        }

        if verbose {
            info!(partner = %self.config.partner_name, "mesh located for coupling");
        }

        self.stage = Stage::Ready;
        Ok(())
    }

    /// Receives the partner's solid temperature at each coupled element of
    /// `kind`.
    ///
    /// Does nothing if elements of `kind` are not coupled.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if the coupling is not ready, the buffer
    /// length is wrong or the exchange fails.
    pub fn recv_solid_temperature(
        &mut self,
        kind: ElementKind,
        solid_temp: &mut [f64],
    ) -> Result<(), CouplingError> {
        self.expect_stage("recv_solid_temperature", Stage::Ready)?;

        match self.entity_mut(kind) {
            Some(entity) => entity.recv_solid_temperature(solid_temp),
            None => Ok(()),
        }
    }

    /// Sends the fluid temperature `tf` and exchange coefficient `hf` of each
    /// coupled element of `kind`, and updates the local fluxes.
    ///
    /// For surface couplings with conservativity enabled, the global flux is
    /// then exchanged with the partner and the resulting correction returned.
    /// Does nothing if elements of `kind` are not coupled.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if the coupling is not ready, a buffer
    /// length is wrong or an exchange fails.
    pub fn send_fluid_temperature(
        &mut self,
        kind: ElementKind,
        tf: &[f64],
        hf: &[f64],
    ) -> Result<Option<Correction>, CouplingError> {
        self.expect_stage("send_fluid_temperature", Stage::Ready)?;

        let Some(entity) = self.entity_mut(kind) else {
            return Ok(None);
        };
        entity.send_fluid_temperature(tf, hf)?;

        match (&self.surface, kind) {
            (Some(surface), ElementKind::Face)
                if self.options.conservativity && self.channel.is_connected() =>
            {
                conservativity::exchange(&self.channel, surface, self.config.verbosity).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Fills volumetric source terms from the last exchange and the current
    /// fluid temperature.
    ///
    /// The split follows the [`SourceTreatment`] fixed at negotiation. Does
    /// nothing if cells are not coupled.
    ///
    /// # Errors
    ///
    /// Returns a [`CouplingError`] if the coupling is not ready or a buffer
    /// length is wrong.
    pub fn source_terms(
        &self,
        tf: &[f64],
        implicit: &mut [f64],
        explicit: &mut [f64],
    ) -> Result<(), CouplingError> {
        self.expect_stage("source_terms", Stage::Ready)?;

        let Some(volume) = &self.volume else {
            return Ok(());
        };

        let expected = volume.coupled().len();
        for (name, found) in [
            ("tf", tf.len()),
            ("implicit", implicit.len()),
            ("explicit", explicit.len()),
        ] {
            if found != expected {
                return Err(CouplingError::BufferLength {
                    name,
                    expected,
                    found,
                });
            }
        }

        source_term::source_contributions(
            self.options.treatment,
            volume.hvol(),
            volume.coupled().solid_temp(),
            tf,
            implicit,
            explicit,
        );
        Ok(())
    }

    /// Location and exchange times of each entity.
    #[must_use]
    pub fn times(&self) -> CouplingTimes {
        CouplingTimes {
            id: self.id,
            partner_name: self.config.partner_name.clone(),
            surface: self.surface.as_ref().map(|e| e.coupled().locator().times()),
            volume: self.volume.as_ref().map(|e| e.coupled().locator().times()),
        }
    }

    fn entity(&self, kind: ElementKind) -> Option<&dyn CouplingEntity> {
        match kind {
            ElementKind::Face => self.surface.as_ref().map(|e| e as &dyn CouplingEntity),
            ElementKind::Cell => self.volume.as_ref().map(|e| e as &dyn CouplingEntity),
        }
    }

    fn entity_mut(&mut self, kind: ElementKind) -> Option<&mut dyn CouplingEntity> {
        match kind {
            ElementKind::Face => self
                .surface
                .as_mut()
                .map(|e| e as &mut dyn CouplingEntity),
            ElementKind::Cell => self.volume.as_mut().map(|e| e as &mut dyn CouplingEntity),
        }
    }

    fn expect_stage(&self, operation: &'static str, stage: Stage) -> Result<(), CouplingError> {
        if self.stage == stage {
            Ok(())
        } else {
            Err(CouplingError::Stage {
                operation,
                stage: self.stage,
            })
        }
    }
}
