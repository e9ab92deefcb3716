//! Ordered collection of the couplings defined for a run.

use std::sync::Arc;

use tracing::info;

use crate::{
    channel::Transport,
    coupling::{
        Coupling, CouplingConfig, CouplingError, CouplingOptions, CouplingTimes, SourceTreatment,
        Stage,
    },
    locator::LocatorTimes,
    mesh::ParentMesh,
};

/// All couplings of a run, with the options they share.
///
/// Couplings are numbered from zero in the order they are added.
#[derive(Debug, Default)]
pub struct Registry {
    couplings: Vec<Coupling>,
    options: CouplingOptions,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a new coupling and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`CouplingError::NoSelection`] if `config` selects neither faces
    /// nor cells. The registry is left unchanged.
    pub fn add(&mut self, config: CouplingConfig) -> Result<usize, CouplingError> {
        let id = self.couplings.len();
        self.couplings.push(Coupling::new(id, config)?);
        Ok(id)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.couplings.len()
    }

    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Coupling> {
        self.couplings.get(id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: usize) -> Option<&mut Coupling> {
        self.couplings.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Coupling> {
        self.couplings.iter()
    }

    #[must_use]
    pub fn options(&self) -> CouplingOptions {
        self.options
    }

    /// Enables or disables the global flux correction.
    ///
    /// # Errors
    ///
    /// Returns [`CouplingError::OptionsLocked`] once a coupling has negotiated.
    pub fn set_conservativity(&mut self, enabled: bool) -> Result<(), CouplingError> {
        self.ensure_unlocked()?;
        self.options.conservativity = enabled;
        Ok(())
    }

    /// Switches volumetric source terms to a fully explicit treatment.
    ///
    /// # Errors
    ///
    /// Returns [`CouplingError::OptionsLocked`] once a coupling has negotiated.
    pub fn set_explicit_treatment(&mut self) -> Result<(), CouplingError> {
        self.ensure_unlocked()?;
        self.options.treatment = SourceTreatment::Explicit;
        Ok(())
    }

    /// Runs the whole setup sequence of one coupling with the shared options.
    ///
    /// # Errors
    ///
    /// Returns [`CouplingError::UnknownCoupling`] if `id` is not registered,
    /// otherwise the first [`CouplingError`] raised during setup.
    pub fn initialize(
        &mut self,
        id: usize,
        transport: Option<Arc<dyn Transport>>,
        partner_root: usize,
        mesh: &impl ParentMesh,
    ) -> Result<(), CouplingError> {
        let options = self.options;
        let Some(coupling) = self.couplings.get_mut(id) else {
            return Err(CouplingError::UnknownCoupling { id });
        };

        coupling.init_comm(transport, partner_root)?;
        coupling.negotiate(options)?;
        coupling.init_mesh(mesh)
    }

    /// Logs the communication overheads of every coupling, then frees them.
    ///
    /// Returns the times that were logged. An empty registry logs nothing.
    pub fn destroy_all(&mut self) -> Vec<CouplingTimes> {
        if self.couplings.is_empty() {
            return Vec::new();
        }

        let times: Vec<CouplingTimes> = self.couplings.iter().map(Coupling::times).collect();

        info!(target: "performance", "coupling overheads");
        for coupling in &times {
            let entities = [("surface", coupling.surface), ("volume", coupling.volume)];
            for (entity, entity_times) in entities {
                if let Some(t) = entity_times {
                    log_times(coupling, entity, &t);
                }
            }
        }

        self.couplings.clear();
        info!("coupling structures freed");

        times
    }

    fn ensure_unlocked(&self) -> Result<(), CouplingError> {
        if self.couplings.iter().any(|c| c.stage() >= Stage::Negotiated) {
            Err(CouplingError::OptionsLocked)
        } else {
            Ok(())
        }
    }
}

fn log_times(coupling: &CouplingTimes, entity: &str, times: &LocatorTimes) {
    info!(
        target: "performance",
        coupling = coupling.id,
        partner = %coupling.partner_name,
        entity,
        location_s = times.location.as_secs_f64(),
        location_comm_s = times.location_comm.as_secs_f64(),
        exchange_s = times.exchange.as_secs_f64(),
        exchange_comm_s = times.exchange_comm.as_secs_f64(),
        "coupling times"
    );
}
