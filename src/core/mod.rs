#![allow(missing_docs)]

//! Geometry, particles, processes and the stepping engine.
//!
//! Lower modules (`geometry`, `particle`, `catalog`, `rng`) hold state; the
//! upper ones (`interaction`, `boundary`, `event`, `sim`) drive it.

pub mod boundary;
pub mod catalog;
pub mod detector;
pub mod event;
pub mod geometry;
pub mod interaction;
pub mod particle;
pub mod process;
pub mod rng;
pub mod sampling;
pub mod sim;
pub mod units;

pub use boundary::{BoundaryEvent, BoundaryResponse};
pub use catalog::{Catalog, Material, Species};
pub use detector::{Detector, DetectorHit};
pub use event::{StepEvent, StepLimiter, StepSnapshot};
pub use geometry::{BoxSpec, ObjectId, Transform, World};
pub use interaction::{InteractionChannel, InteractionSample};
pub use particle::{Particle, ParticleType};
pub use process::{InteractionProcess, ProcessId, ProcessRegistry};
pub use rng::{RandomStreams, RngPool, Stream};
pub use sim::{SimClock, Simulation, StepContext, StepOutcome, StepSummary};
