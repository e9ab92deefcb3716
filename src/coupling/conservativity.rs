//! Global flux correction on surface couplings.
//!
//! After each surface exchange the flow solver sends its global wall heat flux
//! to the partner, which answers with the coefficient it applies to force
//! conservation of the exchanged energy.

use tracing::info;
use uom::si::{
    area::square_meter,
    f64::{Area, Power},
    power::watt,
};

use crate::channel::{Channel, wire};

use super::{CouplingEntity, CouplingError, SurfaceEntity};

/// Outcome of one conservativity exchange.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    /// Heat flux through all coupled faces of the local program.
    pub global_flux: Power,

    /// Correction coefficient returned by the partner.
    pub coefficient: f64,
}

/// Sum of `flux × area` over local faces.
///
/// `flux` is a heat flux density in W/m².
#[must_use]
pub fn local_flux(flux: &[f64], areas: &[Area]) -> Power {
    let total: f64 = flux
        .iter()
        .zip(areas)
        .map(|(&flux, area)| flux * area.get::<square_meter>())
        .sum();
    Power::new::<watt>(total)
}

/// Sends the global flux to the partner and receives its correction.
///
/// Every local rank must call this; all of them return the same correction.
///
/// # Errors
///
/// Returns a [`CouplingError`] if a message fails.
pub(crate) fn exchange(
    channel: &Channel,
    surface: &SurfaceEntity,
    verbosity: u32,
) -> Result<Correction, CouplingError> {
    let local = local_flux(surface.coupled().flux(), surface.face_areas());
    let global = channel.sum(local.get::<watt>())?;
    if verbosity > 0 && channel.is_leader() {
        info!(global_flux_w = global, "global heat flux exchanged with partner");
    }

    let reply = channel.exchange_with_partner(wire::encode(&[global]))?;
    let coefficient = wire::decode_one::<f64>(&reply)?;

    if verbosity > 0 {
        info!(coefficient, "conservativity correction coefficient");
    }

    Ok(Correction {
        global_flux: Power::new::<watt>(global),
        coefficient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn local_flux_weights_by_face_area() {
        let areas = [
            Area::new::<square_meter>(0.5),
            Area::new::<square_meter>(2.0),
        ];

        let total = local_flux(&[100.0, -10.0], &areas);
        assert_relative_eq!(total.get::<watt>(), 30.0);
    }

    #[test]
    fn no_faces_means_no_flux() {
        assert_relative_eq!(local_flux(&[], &[]).get::<watt>(), 0.0);
    }
}
