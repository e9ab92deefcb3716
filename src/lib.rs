//! # Conjugate Coupling
//!
//! Coupling between a finite-volume flow solver and an independently running
//! thermal solver for conjugate heat transfer.
//!
//! The two programs run on disjoint sets of ranks. Each coupling opens a
//! private channel to its partner, agrees on what is coupled, locates its
//! boundary faces and/or cells on the partner's geometry, and then exchanges
//! temperatures and exchange coefficients every time step.
//!
//! ## Crate layout
//!
//! - [`channel`]: Inter-program channel, the [`Transport`](channel::Transport)
//!   seam and an in-process universe.
//! - [`locator`]: Cross-program point location and located-value exchanges.
//! - [`mesh`]: The flow mesh interface and extracted coupled sub-meshes.
//! - [`coupling`]: One coupling: setup handshake, entities, conservativity and
//!   volumetric source terms.
//! - [`registry`]: The ordered set of couplings of a run.
//!
//! ## Typical use
//!
//! ```
//! use conjugate_coupling::{
//!     coupling::CouplingConfig,
//!     registry::Registry,
//! };
//!
//! let mut registry = Registry::new();
//! let id = registry
//!     .add(CouplingConfig {
//!         partner_name: "wall".into(),
//!         face_selection: Some("wall_group".into()),
//!         ..CouplingConfig::default()
//!     })
//!     .expect("faces are selected");
//!
//! assert_eq!(id, 0);
//! assert_eq!(registry.count(), 1);
//! ```

pub mod channel;
pub mod coupling;
pub mod locator;
pub mod mesh;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use coupling::{Coupling, CouplingConfig, CouplingError, CouplingOptions};
pub use registry::Registry;
