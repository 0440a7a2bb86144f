use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use glam::DVec3;
use tracing::warn;

use crate::config::EngineConfig;
use crate::core::boundary::{process_boundary_response, BoundaryResponse};
use crate::core::catalog::Catalog;
use crate::core::detector::Detector;
use crate::core::event::{resolve_step_event, StepLimiter};
use crate::core::geometry::{ObjectId, World};
use crate::core::interaction::sample_interaction_event;
use crate::core::particle::Particle;
use crate::core::process::{ProcessEnv, ProcessRegistry};
use crate::core::rng::{RandomStreams, RngPool, Stream};
use crate::core::sampling::sample_decay_time;
use crate::error::{Error, Result};

/// Global simulation clock (s).
#[derive(Debug, Default)]
pub struct SimClock {
    now: Mutex<f64>,
}

impl SimClock {
    /// Clock starting at `start` seconds.
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Current time (s).
    pub fn now(&self) -> f64 {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Jump to `t` seconds.
    pub fn set(&self, t: f64) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = t;
    }

    /// Advance by `dt` and return the new time.
    pub fn advance(&self, dt: f64) -> f64 {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += dt;
        *now
    }
}

/// Read-only state shared by every particle during one ensemble pass.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub world: &'a World,
    pub config: &'a EngineConfig,
    pub catalog: &'a Catalog,
    pub registry: &'a ProcessRegistry,
    pub detectors: &'a [Detector],
}

impl<'a> StepContext<'a> {
    /// Lookups handed to processes.
    pub fn env(&self) -> ProcessEnv<'a> {
        ProcessEnv {
            catalog: self.catalog,
            config: self.config,
        }
    }
}

/// What happened to one particle during [`step_particle`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub substeps: usize,
    pub boundary_crossings: u64,
    pub reflections: u64,
    pub interactions: u64,
    pub decays: u64,
    pub escaped: bool,
    pub detected: bool,
    /// The substep guard ended the call early; the particle is still alive.
    pub guard_tripped: bool,
}

/// Aggregate of one ensemble pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepSummary {
    pub stepped: usize,
    pub substeps: usize,
    pub boundary_crossings: u64,
    pub reflections: u64,
    pub interactions: u64,
    pub decays: u64,
    pub escaped: usize,
    pub detected: usize,
    /// Particles whose call ended at the substep guard.
    pub guard_tripped: usize,
    pub reclaimed: usize,
    pub remaining: usize,
}

impl StepSummary {
    fn record(&mut self, o: &StepOutcome) {
        self.stepped += 1;
        self.substeps += o.substeps;
        self.boundary_crossings += o.boundary_crossings;
        self.reflections += o.reflections;
        self.interactions += o.interactions;
        self.decays += o.decays;
        self.escaped += usize::from(o.escaped);
        self.detected += usize::from(o.detected);
        self.guard_tripped += usize::from(o.guard_tripped);
    }
}

fn prune_bookkeeping(particle: &mut Particle) {
    if let Some(clock) = particle.decay_time_remaining() {
        if !clock.is_finite() {
            particle.clear_decay_clock();
        } else if clock < 0.0 {
            // Overshot within tolerance: fire on the next iteration.
            particle.set_decay_clock(0.0);
        }
    }
    if let Some(length) = particle.interaction_length_remaining() {
        if !length.is_finite() || length <= 0.0 {
            particle.reset_interaction_sampling();
        }
    }
}

/// Step one particle through up to `dt` seconds.
///
/// Iterates resolution cycles until the budget is spent, the particle dies, or
/// `max_substeps` is reached.
///
/// Errors: fatal conditions only (`InvalidCrossSection`, `DetectorNotInWorld`,
/// detector `Io`).
pub fn step_particle(
    ctx: &StepContext<'_>,
    particle: &mut Particle,
    dt: f64,
    rng: &mut RngPool,
) -> Result<StepOutcome> {
    let mut outcome = StepOutcome::default();
    if !particle.is_alive() {
        return Ok(outcome);
    }
    let env = ctx.env();
    let mut medium: Option<ObjectId> = ctx.world.find_object_containing(particle.position());
    let mut remaining = dt;

    while particle.is_alive() && remaining > 0.0 {
        let Some(current) = medium else {
            particle.set_alive(false);
            outcome.escaped = true;
            break;
        };
        if outcome.substeps >= ctx.config.max_substeps {
            warn!(
                particle = particle.id(),
                substeps = outcome.substeps,
                remaining,
                "substep limit reached; ending step early"
            );
            outcome.guard_tripped = true;
            break;
        }
        outcome.substeps += 1;
        let object = ctx.world.get(current);

        if particle.interaction_sampled_in() != Some(current) {
            let sample = sample_interaction_event(ctx.registry, particle, object, &env, rng)?;
            match sample.process {
                Some(process) => particle.set_interaction_length_remaining(sample.length, process),
                None => particle.clear_interaction_length(),
            }
            particle.mark_interaction_sampled(current);
        }

        let event = resolve_step_event(ctx.world, ctx.config, particle, medium, remaining);
        particle.advance(event.displacement, event.dt);
        particle.consume_interaction_length(event.displacement.length());
        particle.consume_decay_time(event.dt);
        remaining -= event.dt;

        let mut next = event.post.medium;
        match event.limiter {
            StepLimiter::Time => {}
            StepLimiter::Boundary => {
                if let Some(boundary) = event.boundary {
                    outcome.boundary_crossings += 1;
                    let response = process_boundary_response(
                        ctx.world,
                        ctx.config,
                        particle,
                        &boundary,
                        event.displacement,
                    )?;
                    if response == BoundaryResponse::Reflected {
                        outcome.reflections += 1;
                    }
                    // After the nudge the particle's position is authoritative.
                    next = ctx.world.find_object_containing(particle.position());
                }
            }
            StepLimiter::Interaction => {
                particle.clear_interaction_length();
                match event.process.and_then(|id| ctx.registry.get(id)) {
                    Some(process) => {
                        process.apply(particle, object, &env, rng);
                        outcome.interactions += 1;
                    }
                    None => warn!(
                        particle = particle.id(),
                        process = ?event.process,
                        "no registered process for interaction"
                    ),
                }
                particle.reset_interaction_sampling();
            }
            StepLimiter::Decay => {
                particle.clear_decay_clock();
                match ctx.registry.decay_process_for(particle) {
                    Some(process) => {
                        process.apply(particle, object, &env, rng);
                        outcome.decays += 1;
                    }
                    None => warn!(
                        particle = particle.id(),
                        species = particle.species(),
                        "decay clock expired with no decay process"
                    ),
                }
                particle.reset_interaction_sampling();
            }
        }

        prune_bookkeeping(particle);
        if next != medium {
            particle.reset_interaction_sampling();
        }
        medium = next;
        if medium.is_none() {
            particle.set_alive(false);
            outcome.escaped = true;
            break;
        }
        for detector in ctx.detectors {
            if detector.log_energy_if_inside(ctx.world, particle)? {
                outcome.detected = true;
                break;
            }
        }
    }
    Ok(outcome)
}

/// Owner of the world, ensemble, detectors and random streams.
#[derive(Debug)]
pub struct Simulation {
    config: EngineConfig,
    catalog: Catalog,
    registry: ProcessRegistry,
    world: Option<World>,
    world_generation: u64,
    detectors: Vec<Detector>,
    particles: Vec<Particle>,
    next_id: u64,
    streams: Arc<RandomStreams>,
    rng: RngPool,
    clock: SimClock,
}

impl Simulation {
    /// Create an empty simulation with the standard process registry.
    ///
    /// Errors: `Error::Config` when `config` fails validation.
    pub fn new(config: EngineConfig, catalog: Catalog) -> Result<Self> {
        config.validate()?;
        let streams = Arc::new(RandomStreams::new());
        Ok(Self {
            config,
            catalog,
            registry: ProcessRegistry::standard(),
            world: None,
            world_generation: 0,
            detectors: Vec::new(),
            particles: Vec::new(),
            next_id: 0,
            rng: RngPool::new(Arc::clone(&streams), 0),
            streams,
            clock: SimClock::default(),
        })
    }

    /// Replace the process registry.
    pub fn with_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Install `world` as the active world.
    ///
    /// Detectors registered against the previous world stay registered and make
    /// stepping fail until they are cleared.
    ///
    /// Errors: `Error::Config` when the world's tolerance is not the configured
    /// geometry tolerance; the previous world stays active.
    pub fn set_world(&mut self, world: World) -> Result<()> {
        let expected = self.config.geometry_tolerance();
        if world.tolerance() != expected {
            return Err(Error::Config(format!(
                "world tolerance {:?} differs from configured geometry tolerance {:?}",
                world.tolerance(),
                expected
            )));
        }
        self.world = Some(world);
        self.world_generation += 1;
        for p in &mut self.particles {
            p.reset_interaction_sampling();
        }
        Ok(())
    }

    pub fn world(&self) -> Option<&World> {
        self.world.as_ref()
    }

    pub fn world_mut(&mut self) -> Option<&mut World> {
        self.world.as_mut()
    }

    /// Incremented by every successful [`Simulation::set_world`].
    pub fn world_generation(&self) -> u64 {
        self.world_generation
    }

    /// Register the active world's object `object_name` as a detector.
    ///
    /// Errors: `Error::NoActiveWorld`, `Error::DetectorNotInWorld` for an
    /// unknown object, `Error::InvalidParam` for a duplicate registration.
    pub fn add_detector(&mut self, object_name: &str, log_path: Option<PathBuf>) -> Result<()> {
        let world = self.world.as_ref().ok_or(Error::NoActiveWorld)?;
        if self.detectors.iter().any(|d| d.name() == object_name) {
            return Err(Error::InvalidParam(format!(
                "detector `{object_name}` already registered"
            )));
        }
        let detector = Detector::new(world, self.world_generation, object_name, log_path)?;
        self.detectors.push(detector);
        Ok(())
    }

    pub fn detector(&self, name: &str) -> Option<&Detector> {
        self.detectors.iter().find(|d| d.name() == name)
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    pub fn clear_detectors(&mut self) {
        self.detectors.clear();
    }

    /// Add `particle` to the ensemble, assigning it a fresh id.
    pub fn add_particle(&mut self, mut particle: Particle) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        particle.set_id(id);
        self.particles.push(particle);
        id
    }

    /// Create a particle of catalog species `species` at the current clock time.
    ///
    /// Unstable species start with a decay clock drawn on the `Decay` stream.
    pub fn spawn(&mut self, species: &str, position: DVec3, momentum: DVec3) -> Result<u64> {
        let Some(spec) = self.catalog.species(species) else {
            return Err(Error::InvalidParam(format!("unknown species `{species}`")));
        };
        let mut particle = Particle::from_species(0, spec, position, self.clock.now(), momentum)?;
        if let Some(t) = sample_decay_time(self.rng.stream(Stream::Decay), spec.lifetime) {
            particle.set_decay_clock(t);
        }
        Ok(self.add_particle(particle))
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particle(&self, id: u64) -> Option<&Particle> {
        self.particles.iter().find(|p| p.id() == id)
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Current clock time (s).
    pub fn time(&self) -> f64 {
        self.clock.now()
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn set_master_seed(&self, seed: u64) {
        self.streams.set_master_seed(seed);
    }

    pub fn set_stream_seed(&self, stream: Stream, seed: Option<u64>) {
        self.streams.set_stream_seed(stream, seed);
    }

    pub fn streams(&self) -> &Arc<RandomStreams> {
        &self.streams
    }

    /// Step every particle by `dt`, then erase the dead ones.
    ///
    /// Errors:
    /// - `Error::InvalidParam` for a negative or non-finite `dt`.
    /// - `Error::NoActiveWorld` when no world is installed.
    /// - `Error::DetectorNotInWorld` for a detector of an earlier world.
    pub fn step_all(&mut self, dt: f64) -> Result<StepSummary> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(Error::InvalidParam("dt must be finite and >= 0".into()));
        }
        let world = self.world.as_ref().ok_or(Error::NoActiveWorld)?;
        for detector in &self.detectors {
            detector.ensure_in_world(self.world_generation)?;
        }
        let ctx = StepContext {
            world,
            config: &self.config,
            catalog: &self.catalog,
            registry: &self.registry,
            detectors: &self.detectors,
        };

        let mut summary = StepSummary::default();
        for particle in self.particles.iter_mut() {
            let outcome = step_particle(&ctx, particle, dt, &mut self.rng)?;
            summary.record(&outcome);
        }

        summary.reclaimed = self.reclaim_dead();
        summary.remaining = self.particles.len();
        Ok(summary)
    }

    /// [`Simulation::step_all`] followed by advancing the clock.
    pub fn advance(&mut self, dt: f64) -> Result<StepSummary> {
        let summary = self.step_all(dt)?;
        self.clock.advance(dt);
        Ok(summary)
    }

    /// Erase particles marked dead; returns how many were removed.
    pub fn reclaim_dead(&mut self) -> usize {
        let before = self.particles.len();
        self.particles.retain(Particle::is_alive);
        before - self.particles.len()
    }
}
