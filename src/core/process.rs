//! Discrete interaction processes.
//!
//! A process answers four questions for a particle in a medium: does it apply,
//! what channel (macroscopic cross-section) does it contribute, how far until it
//! fires, and what happens when it does. `apply` never fails: any invalid
//! precondition is logged through [`warn_unapplied`] and the particle is left
//! untouched.

use std::fmt;

use rand::RngCore;
use tracing::warn;

use crate::config::EngineConfig;
use crate::core::catalog::Catalog;
use crate::core::geometry::Object;
use crate::core::interaction::InteractionChannel;
use crate::core::particle::{Particle, ParticleType};
use crate::core::rng::{RngPool, Stream};
use crate::core::sampling::{
    sample_decay_time, sample_isotropic_direction, sample_mean_free_path, sample_thermal_velocity,
};
use crate::core::units::C_SQUARED;
use crate::error::{Error, Result};

/// Identifies a registered process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProcessId {
    PhotonAbsorption,
    SpontaneousEmission,
}

impl ProcessId {
    /// Stable name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            ProcessId::PhotonAbsorption => "photon_absorption",
            ProcessId::SpontaneousEmission => "spontaneous_emission",
        }
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only lookups available to processes.
#[derive(Debug, Clone, Copy)]
pub struct ProcessEnv<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a EngineConfig,
}

/// Capability interface of a discrete interaction.
pub trait InteractionProcess: fmt::Debug + Send + Sync {
    fn id(&self) -> ProcessId;

    /// Whether the process can act on `particle` in `medium`.
    fn is_applicable(
        &self,
        particle: &Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
    ) -> bool;

    /// Channel for the current medium, `None` when the process contributes nothing.
    ///
    /// Errors: `Error::InvalidCrossSection` for a negative or non-finite value.
    fn build_channel(
        &self,
        particle: &Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
    ) -> Result<Option<InteractionChannel>>;

    /// Distance (m) until this channel fires.
    fn sample_length(
        &self,
        particle: &Particle,
        medium: Option<&Object>,
        channel: &InteractionChannel,
        rng: &mut dyn RngCore,
    ) -> f64;

    /// Fire the interaction. Invalid preconditions leave `particle` unchanged.
    fn apply(
        &self,
        particle: &mut Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
        rng: &mut RngPool,
    );

    /// Whether this process is what fires when `particle`'s decay clock runs out.
    fn fires_on_decay(&self, _particle: &Particle) -> bool {
        false
    }
}

/// Standard warning for an `apply` call that leaves the particle unchanged.
pub fn warn_unapplied(process: ProcessId, particle: &Particle, reason: &str) {
    warn!(
        process = process.name(),
        particle = particle.id(),
        species = particle.species(),
        reason,
        "interaction not applied; particle left unchanged"
    );
}

/// Photon absorbed by the medium, producing an excited absorber.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhotonAbsorption;

impl PhotonAbsorption {
    fn number_density(medium: Option<&Object>, env: &ProcessEnv<'_>) -> Option<f64> {
        let material = env.catalog.material(medium?.material()?)?;
        material.absorber.as_ref()?;
        Some(material.number_density)
    }
}

impl InteractionProcess for PhotonAbsorption {
    fn id(&self) -> ProcessId {
        ProcessId::PhotonAbsorption
    }

    fn is_applicable(
        &self,
        particle: &Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
    ) -> bool {
        particle.kind() == ParticleType::Photon
            && Self::number_density(medium, env).is_some_and(|n| n > 0.0)
    }

    fn build_channel(
        &self,
        particle: &Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
    ) -> Result<Option<InteractionChannel>> {
        if particle.kind() != ParticleType::Photon {
            return Ok(None);
        }
        let Some(density) = Self::number_density(medium, env) else {
            return Ok(None);
        };
        let sigma = density * env.config.photon_absorption_cross_section;
        if !sigma.is_finite() || sigma < 0.0 {
            return Err(Error::InvalidCrossSection {
                process: self.id().name(),
                value: sigma,
            });
        }
        if sigma == 0.0 {
            return Ok(None);
        }
        Ok(Some(InteractionChannel::new(self.id(), sigma)))
    }

    fn sample_length(
        &self,
        _particle: &Particle,
        _medium: Option<&Object>,
        channel: &InteractionChannel,
        rng: &mut dyn RngCore,
    ) -> f64 {
        sample_mean_free_path(rng, channel.macroscopic_cross_section)
    }

    fn apply(
        &self,
        particle: &mut Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
        rng: &mut RngPool,
    ) {
        let id = self.id();
        if particle.kind() != ParticleType::Photon {
            return warn_unapplied(id, particle, "particle is not a photon");
        }
        let Some(medium) = medium else {
            return warn_unapplied(id, particle, "no medium");
        };
        let Some(material_name) = medium.material() else {
            return warn_unapplied(id, particle, "medium has no material");
        };
        let Some(material) = env.catalog.material(material_name) else {
            return warn_unapplied(id, particle, "unknown material definition");
        };
        let Some(absorber) = material.absorber.as_deref() else {
            return warn_unapplied(id, particle, "material has no absorber species");
        };
        let Some(species) = env.catalog.species(absorber) else {
            return warn_unapplied(id, particle, "unknown absorber species");
        };
        let mass = species.rest_mass;
        if !(mass > 0.0) {
            return warn_unapplied(id, particle, "absorber rest mass is not positive");
        }

        let thermal = rng.stream(Stream::Thermal);
        let velocity = match sample_thermal_velocity(thermal, mass, medium.temperature()) {
            Ok(v) => v,
            Err(e) => return warn_unapplied(id, particle, &e.to_string()),
        };
        let beta_sq = velocity.length_squared() / C_SQUARED;
        if !(beta_sq < 1.0) {
            return warn_unapplied(id, particle, "sampled absorber velocity is not subluminal");
        }
        let gamma = 1.0 / (1.0 - beta_sq).sqrt();

        let energy = gamma * mass * C_SQUARED + particle.energy();
        let momentum = velocity * (gamma * mass) + particle.momentum();
        if !energy.is_finite() || !momentum.is_finite() {
            return warn_unapplied(id, particle, "non-finite combined 4-momentum");
        }

        let excited = match Particle::with_four_momentum(
            particle.id(),
            &species.name,
            species.kind,
            mass,
            particle.position(),
            particle.time(),
            energy,
            momentum,
        ) {
            Ok(p) => p,
            Err(e) => return warn_unapplied(id, particle, &e.to_string()),
        };
        let mut excited = excited.with_species_properties(species);
        excited.set_decay_energy(Some(particle.energy()));
        if let Some(t) = sample_decay_time(rng.stream(Stream::Decay), species.lifetime) {
            excited.set_decay_clock(t);
        }
        *particle = excited;
    }
}

/// Decay-driven emission of a photon by an excited particle.
///
/// Distance-based sampling is inert: the process fires from the particle's
/// decay clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpontaneousEmission;

impl InteractionProcess for SpontaneousEmission {
    fn id(&self) -> ProcessId {
        ProcessId::SpontaneousEmission
    }

    fn is_applicable(
        &self,
        _particle: &Particle,
        _medium: Option<&Object>,
        _env: &ProcessEnv<'_>,
    ) -> bool {
        false
    }

    fn build_channel(
        &self,
        _particle: &Particle,
        _medium: Option<&Object>,
        _env: &ProcessEnv<'_>,
    ) -> Result<Option<InteractionChannel>> {
        Ok(None)
    }

    fn sample_length(
        &self,
        _particle: &Particle,
        _medium: Option<&Object>,
        _channel: &InteractionChannel,
        _rng: &mut dyn RngCore,
    ) -> f64 {
        f64::INFINITY
    }

    fn apply(
        &self,
        particle: &mut Particle,
        _medium: Option<&Object>,
        _env: &ProcessEnv<'_>,
        rng: &mut RngPool,
    ) {
        let id = self.id();
        if particle.kind() == ParticleType::Photon {
            return warn_unapplied(id, particle, "photons do not spontaneously emit");
        }
        let energy = particle
            .decay_energy()
            .filter(|e| e.is_finite() && *e > 0.0)
            .unwrap_or_else(|| particle.kinetic_energy());
        if !energy.is_finite() || energy <= 0.0 {
            return warn_unapplied(id, particle, "no positive energy available for emission");
        }
        let direction = sample_isotropic_direction(rng.stream(Stream::Emission));
        let (owner, position, time) = (particle.id(), particle.position(), particle.time());
        match Particle::photon(owner, position, time, energy, direction) {
            Ok(photon) => *particle = photon,
            Err(e) => warn_unapplied(id, particle, &e.to_string()),
        }
    }

    fn fires_on_decay(&self, particle: &Particle) -> bool {
        particle.kind() != ParticleType::Photon
    }
}

/// Ordered list of processes, built once per simulation.
#[derive(Debug)]
pub struct ProcessRegistry {
    processes: Vec<Box<dyn InteractionProcess>>,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl ProcessRegistry {
    /// Photon absorption followed by spontaneous emission.
    pub fn standard() -> Self {
        Self {
            processes: vec![Box::new(PhotonAbsorption), Box::new(SpontaneousEmission)],
        }
    }

    /// Registry over `processes`, consulted in the given order.
    pub fn from_processes(processes: Vec<Box<dyn InteractionProcess>>) -> Self {
        Self { processes }
    }

    /// Number of registered processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// True when no process is registered.
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Processes in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn InteractionProcess> {
        self.processes.iter().map(|p| p.as_ref())
    }

    /// First registered process with this id.
    pub fn get(&self, id: ProcessId) -> Option<&dyn InteractionProcess> {
        self.iter().find(|p| p.id() == id)
    }

    /// Processes applicable to `particle` in `medium`, in registry order.
    pub fn determine_active_interaction_processes(
        &self,
        particle: &Particle,
        medium: Option<&Object>,
        env: &ProcessEnv<'_>,
    ) -> Vec<&dyn InteractionProcess> {
        self.iter()
            .filter(|p| p.is_applicable(particle, medium, env))
            .collect()
    }

    /// Process that fires when `particle`'s decay clock expires.
    pub fn decay_process_for(&self, particle: &Particle) -> Option<&dyn InteractionProcess> {
        self.iter().find(|p| p.fires_on_decay(particle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tolerance;
    use crate::core::catalog::{Material, Species};
    use crate::core::geometry::{BoxSpec, World};
    use crate::core::rng::RandomStreams;
    use crate::core::units::{ATOMIC_MASS_UNIT, BOLTZMANN, ELECTRON_VOLT, SPEED_OF_LIGHT};
    use glam::DVec3;
    use std::sync::Arc;

    struct Fixture {
        catalog: Catalog,
        config: EngineConfig,
        world: World,
    }

    impl Fixture {
        fn new() -> Result<Self> {
            let mut catalog = Catalog::new();
            catalog.add_material(Material::vacuum("vacuum"))?;
            catalog.add_material(Material::absorbing("vapor", 1e18, "Rb87*"))?;
            catalog.add_material(Material::absorbing("ghost", 1e18, "missing"))?;
            catalog.add_species(
                Species::stable("Rb87*", ParticleType::Atom, 86.909 * ATOMIC_MASS_UNIT)
                    .with_lifetime(26.2e-9),
            )?;
            let mut world = World::new(
                BoxSpec::new("World", DVec3::splat(10.0)).material("vacuum"),
                Tolerance::new(1e-9, 1e-12),
            )?;
            world.add_child(
                world.root(),
                BoxSpec::new("Cell", DVec3::splat(2.0))
                    .material("vapor")
                    .temperature(350.0),
            )?;
            world.add_child(
                world.root(),
                BoxSpec::new("Ghost", DVec3::splat(1.0))
                    .material("ghost")
                    .translated(DVec3::new(3.0, 0.0, 0.0)),
            )?;
            Ok(Self {
                catalog,
                config: EngineConfig::default(),
                world,
            })
        }

        fn env(&self) -> ProcessEnv<'_> {
            ProcessEnv {
                catalog: &self.catalog,
                config: &self.config,
            }
        }

        fn excited(&self) -> Result<Species> {
            self.catalog
                .species("Rb87*")
                .cloned()
                .ok_or_else(|| Error::InvalidParam("missing species".into()))
        }

        fn object(&self, name: &str) -> Option<&Object> {
            self.world
                .find_by_name(name)
                .and_then(|id| self.world.get(id))
        }
    }

    fn pool() -> RngPool {
        RngPool::new(Arc::new(RandomStreams::with_master_seed(2024)), 0)
    }

    fn photon() -> Result<Particle> {
        let position = DVec3::new(0.1, 0.0, 0.0);
        Particle::photon(9, position, 1e-9, 1.59 * ELECTRON_VOLT, DVec3::X)
    }

    #[test]
    fn registry_filters_in_order() -> Result<()> {
        let fx = Fixture::new()?;
        let registry = ProcessRegistry::standard();
        assert_eq!(registry.len(), 2);
        let ids: Vec<_> = registry.iter().map(|p| p.id()).collect();
        assert_eq!(
            ids,
            [ProcessId::PhotonAbsorption, ProcessId::SpontaneousEmission]
        );

        let p = photon()?;
        let env = fx.env();
        let active = registry.determine_active_interaction_processes(&p, fx.object("Cell"), &env);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), ProcessId::PhotonAbsorption);

        let none = registry.determine_active_interaction_processes(&p, fx.object("World"), &env);
        assert!(none.is_empty());
        Ok(())
    }

    #[test]
    fn absorption_channel_is_density_times_cross_section() -> Result<()> {
        let fx = Fixture::new()?;
        let channel = PhotonAbsorption
            .build_channel(&photon()?, fx.object("Cell"), &fx.env())?
            .ok_or_else(|| Error::InvalidParam("expected channel".into()))?;
        let expected = 1e18 * fx.config.photon_absorption_cross_section;
        let sigma = channel.macroscopic_cross_section;
        let rel = (sigma - expected).abs() / expected;
        assert!(rel <= 1e-12, "sigma {sigma}");
        assert_eq!(channel.process, Some(ProcessId::PhotonAbsorption));
        Ok(())
    }

    #[test]
    fn negative_cross_section_is_an_error() -> Result<()> {
        let mut fx = Fixture::new()?;
        fx.config.photon_absorption_cross_section = -1e-20;
        let err = PhotonAbsorption
            .build_channel(&photon()?, fx.object("Cell"), &fx.env())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCrossSection { .. }));
        Ok(())
    }

    #[test]
    fn absorption_produces_excited_atom() -> Result<()> {
        let fx = Fixture::new()?;
        let mut rng = pool();
        let mut p = photon()?;
        let (e0, p0) = (p.energy(), p.momentum());
        PhotonAbsorption.apply(&mut p, fx.object("Cell"), &fx.env(), &mut rng);

        assert_eq!(p.species(), "Rb87*");
        assert_eq!(p.kind(), ParticleType::Atom);
        assert_eq!(p.id(), 9);
        assert_eq!(p.decay_energy(), Some(e0));
        assert!(p.has_decay_clock());
        // Energy above rest is the photon energy plus the absorber's thermal kinetic energy.
        let excess = p.energy() - p.mass() * C_SQUARED - e0;
        assert!(excess > -1e-3 * e0, "excess {excess}");
        assert!(excess < 50.0 * BOLTZMANN * 350.0, "excess {excess}");
        // Momentum is photon momentum plus a thermal contribution of order m v_th.
        let thermal_scale = p.mass() * 2_000.0;
        assert!((p.momentum() - p0).length() < thermal_scale);
        assert!(p.speed() < SPEED_OF_LIGHT * 1e-4);
        Ok(())
    }

    #[test]
    fn absorption_rejects_invalid_preconditions() -> Result<()> {
        let fx = Fixture::new()?;
        let mut rng = pool();

        let mut p = photon()?;
        PhotonAbsorption.apply(&mut p, None, &fx.env(), &mut rng);
        assert_eq!(p.kind(), ParticleType::Photon);

        PhotonAbsorption.apply(&mut p, fx.object("World"), &fx.env(), &mut rng);
        assert_eq!(p.kind(), ParticleType::Photon);

        PhotonAbsorption.apply(&mut p, fx.object("Ghost"), &fx.env(), &mut rng);
        assert_eq!(p.kind(), ParticleType::Photon);

        let species = fx.excited()?;
        let mut atom = Particle::from_species(1, &species, DVec3::ZERO, 0.0, DVec3::ZERO)?;
        PhotonAbsorption.apply(&mut atom, fx.object("Cell"), &fx.env(), &mut rng);
        assert_eq!(atom.kind(), ParticleType::Atom);
        assert!(!atom.has_decay_clock());
        Ok(())
    }

    #[test]
    fn emission_is_inert_for_sampling() -> Result<()> {
        let fx = Fixture::new()?;
        let p = photon()?;
        let (cell, env) = (fx.object("Cell"), fx.env());
        assert!(!SpontaneousEmission.is_applicable(&p, cell, &env));
        assert!(SpontaneousEmission.build_channel(&p, cell, &env)?.is_none());
        let channel = InteractionChannel::new(ProcessId::SpontaneousEmission, 1.0);
        let mut rng = pool();
        let stream = rng.stream(Stream::DiscreteInteractions);
        let len = SpontaneousEmission.sample_length(&p, None, &channel, stream);
        assert!(len.is_infinite());
        Ok(())
    }

    #[test]
    fn emission_uses_stored_decay_energy() -> Result<()> {
        let fx = Fixture::new()?;
        let mut rng = pool();
        let mut p = photon()?;
        let e0 = p.energy();
        PhotonAbsorption.apply(&mut p, fx.object("Cell"), &fx.env(), &mut rng);
        let registry = ProcessRegistry::standard();
        let process = registry
            .decay_process_for(&p)
            .ok_or_else(|| Error::InvalidParam("no decay process".into()))?;
        assert_eq!(process.id(), ProcessId::SpontaneousEmission);

        process.apply(&mut p, fx.object("Cell"), &fx.env(), &mut rng);
        assert_eq!(p.kind(), ParticleType::Photon);
        assert!((p.energy() - e0).abs() <= 1e-12 * e0);
        assert!((p.speed() - SPEED_OF_LIGHT).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn emission_falls_back_to_kinetic_energy() -> Result<()> {
        let fx = Fixture::new()?;
        let mut rng = pool();
        let species = fx.excited()?;
        let momentum = DVec3::new(1e-22, 0.0, 0.0);
        let mut atom = Particle::from_species(4, &species, DVec3::ZERO, 0.0, momentum)?;
        let ke = atom.kinetic_energy();
        assert!(ke > 0.0);
        SpontaneousEmission.apply(&mut atom, None, &fx.env(), &mut rng);
        assert_eq!(atom.kind(), ParticleType::Photon);
        assert!((atom.energy() - ke).abs() <= 1e-9 * ke);
        Ok(())
    }

    #[test]
    fn emission_without_energy_leaves_particle() -> Result<()> {
        let fx = Fixture::new()?;
        let mut rng = pool();
        let species = fx.excited()?;
        let mut atom = Particle::from_species(4, &species, DVec3::ZERO, 0.0, DVec3::ZERO)?;
        SpontaneousEmission.apply(&mut atom, None, &fx.env(), &mut rng);
        assert_eq!(atom.kind(), ParticleType::Atom);
        Ok(())
    }
}
