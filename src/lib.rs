//! Discrete-event Monte-Carlo particle transport.
//!
//! Particles are stepped through a tree of boxes. Each sub-step is limited by
//! the time budget, a boundary crossing, a decay or a discrete interaction,
//! whichever comes first.
//!
//! ```no_run
//! use glam::DVec3;
//! use mctransport::config::EngineConfig;
//! use mctransport::core::{BoxSpec, Catalog, Particle, Simulation, World};
//!
//! # fn main() -> mctransport::error::Result<()> {
//! let config = EngineConfig::default();
//! let spec = BoxSpec::new("World", DVec3::splat(1.0));
//! let world = World::new(spec, config.geometry_tolerance())?;
//! let mut sim = Simulation::new(config, Catalog::new())?;
//! sim.set_world(world)?;
//! sim.add_particle(Particle::photon(0, DVec3::ZERO, 0.0, 3e-19, DVec3::X)?);
//! sim.advance(1e-9)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;

#[cfg(feature = "python")]
mod python;

pub use crate::config::EngineConfig;
pub use crate::core::Simulation;
pub use crate::error::{Error, Result};
