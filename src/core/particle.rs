use glam::DVec3;

use crate::core::catalog::Species;
use crate::core::geometry::ObjectId;
use crate::core::process::ProcessId;
use crate::core::units::{mass_shell_energy, C_SQUARED, SPEED_OF_LIGHT};
use crate::error::{Error, Result};

/// Broad particle family used by processes to decide applicability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParticleType {
    Photon,
    Atom,
    Electron,
    #[default]
    Other,
}

/// Distance budget reserved by a discrete process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingInteraction {
    /// Distance (m) left before the process fires.
    pub remaining: f64,
    pub process: ProcessId,
}

/// A transported particle.
///
/// Kinematics are in SI: position (m), time (s), energy (J), momentum (kg m/s).
/// Besides kinematics the particle carries the per-particle scheduling state
/// consumed by the step resolver: a decay clock, a pending interaction length
/// and the medium in which that length was sampled.
#[derive(Debug, Clone)]
pub struct Particle {
    id: u64,
    species: String,
    kind: ParticleType,
    mass: f64,
    charge: f64,
    spin: f64,
    lifetime: f64,
    reflective: bool,
    position: DVec3,
    time: f64,
    energy: f64,
    momentum: DVec3,
    alive: bool,
    decay_clock: Option<f64>,
    interaction: Option<PendingInteraction>,
    sampled_in: Option<ObjectId>,
    decay_energy: Option<f64>,
}

impl Particle {
    /// Create a photon of `energy` travelling along `direction`.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if the energy is non-positive or the direction is
    ///   zero or non-finite.
    pub fn photon(
        id: u64,
        position: DVec3,
        time: f64,
        energy: f64,
        direction: DVec3,
    ) -> Result<Self> {
        if !energy.is_finite() || energy <= 0.0 {
            return Err(Error::InvalidParam(
                "photon energy must be finite and > 0".into(),
            ));
        }
        let dir = direction.normalize_or_zero();
        if dir == DVec3::ZERO || !dir.is_finite() {
            return Err(Error::InvalidParam(
                "photon direction must be non-zero".into(),
            ));
        }
        Self::with_four_momentum(
            id,
            "photon",
            ParticleType::Photon,
            0.0,
            position,
            time,
            energy,
            dir * (energy / SPEED_OF_LIGHT),
        )
    }

    /// Create a particle of `species` with the given 3-momentum; the energy
    /// follows from the mass-shell relation.
    pub fn from_species(
        id: u64,
        species: &Species,
        position: DVec3,
        time: f64,
        momentum: DVec3,
    ) -> Result<Self> {
        let energy = mass_shell_energy(species.rest_mass, momentum.length());
        let p = Self::with_four_momentum(
            id,
            &species.name,
            species.kind,
            species.rest_mass,
            position,
            time,
            energy,
            momentum,
        )?;
        Ok(p.with_species_properties(species))
    }

    /// Copy charge, spin, lifetime and reflectivity from `species`.
    pub fn with_species_properties(mut self, species: &Species) -> Self {
        self.charge = species.charge;
        self.spin = species.spin;
        self.lifetime = species.lifetime;
        self.reflective = species.reflective;
        self
    }

    /// Create a particle from an explicit 4-momentum.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if any component is non-finite, the mass is
    ///   negative, or the energy is below the rest energy.
    #[allow(clippy::too_many_arguments)]
    pub fn with_four_momentum(
        id: u64,
        species: &str,
        kind: ParticleType,
        mass: f64,
        position: DVec3,
        time: f64,
        energy: f64,
        momentum: DVec3,
    ) -> Result<Self> {
        if !mass.is_finite() || mass < 0.0 {
            return Err(Error::InvalidParam(
                "rest mass must be finite and >= 0".into(),
            ));
        }
        if !position.is_finite() || !time.is_finite() {
            return Err(Error::InvalidParam("4-position must be finite".into()));
        }
        if !energy.is_finite() || !momentum.is_finite() {
            return Err(Error::InvalidParam("4-momentum must be finite".into()));
        }
        let rest_energy = mass * C_SQUARED;
        if energy < rest_energy * (1.0 - 1e-12) {
            return Err(Error::InvalidParam(format!(
                "energy {energy} J below rest energy {rest_energy} J"
            )));
        }
        Ok(Self {
            id,
            species: species.to_string(),
            kind,
            mass,
            charge: 0.0,
            spin: 0.0,
            lifetime: 0.0,
            reflective: false,
            position,
            time,
            energy,
            momentum,
            alive: true,
            decay_clock: None,
            interaction: None,
            sampled_in: None,
            decay_energy: None,
        })
    }

    /// Ensemble id assigned by the owning simulation.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Catalog name, or `"photon"`.
    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn kind(&self) -> ParticleType {
        self.kind
    }

    /// Rest mass (kg).
    pub fn mass(&self) -> f64 {
        self.mass
    }

    /// Charge (C).
    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn spin(&self) -> f64 {
        self.spin
    }

    /// Mean lifetime in seconds; zero for stable species.
    pub fn lifetime(&self) -> f64 {
        self.lifetime
    }

    /// Whether boundaries reflect rather than transmit this particle.
    pub fn is_reflective(&self) -> bool {
        self.reflective
    }

    pub fn set_reflective(&mut self, reflective: bool) {
        self.reflective = reflective;
    }

    #[inline]
    pub fn is_massless(&self) -> bool {
        self.mass == 0.0
    }

    /// World-frame position (m).
    pub fn position(&self) -> DVec3 {
        self.position
    }

    /// Lab time (s) reached by this particle's own steps.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Total energy (J).
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// 3-momentum (kg m/s).
    pub fn momentum(&self) -> DVec3 {
        self.momentum
    }

    /// Set position (validated as finite).
    pub fn set_position(&mut self, position: DVec3) -> Result<()> {
        if !position.is_finite() {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        self.position = position;
        Ok(())
    }

    /// Replace the momentum keeping |p|; used by reflections.
    pub fn set_momentum(&mut self, momentum: DVec3) -> Result<()> {
        if !momentum.is_finite() {
            return Err(Error::InvalidParam("momentum must be finite".into()));
        }
        self.momentum = momentum;
        Ok(())
    }

    /// Move along a displacement over `dt`.
    #[inline]
    pub fn advance(&mut self, displacement: DVec3, dt: f64) {
        self.position += displacement;
        self.time += dt;
    }

    /// Lab-frame velocity: c·p̂ for massless particles, p c² / E otherwise.
    pub fn velocity(&self) -> DVec3 {
        if self.is_massless() {
            self.momentum.normalize_or_zero() * SPEED_OF_LIGHT
        } else if self.energy > 0.0 {
            self.momentum * (C_SQUARED / self.energy)
        } else {
            DVec3::ZERO
        }
    }

    #[inline]
    pub fn speed(&self) -> f64 {
        self.velocity().length()
    }

    /// Speed at or below `threshold` (m/s).
    pub fn is_at_rest(&self, threshold: f64) -> bool {
        self.speed() <= threshold
    }

    /// E - m c².
    pub fn kinetic_energy(&self) -> f64 {
        self.energy - self.mass * C_SQUARED
    }

    /// Dead particles are skipped by stepping and erased by reclamation.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn set_alive(&mut self, alive: bool) {
        self.alive = alive;
    }

    pub fn has_decay_clock(&self) -> bool {
        self.decay_clock.is_some()
    }

    /// Time (s) until the decay fires; may dip slightly below zero.
    pub fn decay_time_remaining(&self) -> Option<f64> {
        self.decay_clock
    }

    pub fn set_decay_clock(&mut self, remaining: f64) {
        self.decay_clock = Some(remaining);
    }

    pub fn clear_decay_clock(&mut self) {
        self.decay_clock = None;
    }

    /// Run the decay clock down by `dt`; no-op without a clock.
    pub fn consume_decay_time(&mut self, dt: f64) {
        if let Some(t) = self.decay_clock.as_mut() {
            *t -= dt;
        }
    }

    /// True when a process holds a finite, positive distance budget.
    pub fn has_pending_interaction_length(&self) -> bool {
        self.interaction
            .is_some_and(|i| i.remaining.is_finite() && i.remaining > 0.0)
    }

    /// Distance (m) left before the pending interaction fires.
    pub fn interaction_length_remaining(&self) -> Option<f64> {
        self.interaction.map(|i| i.remaining)
    }

    pub fn pending_interaction_process(&self) -> Option<ProcessId> {
        self.interaction.map(|i| i.process)
    }

    /// Reserve `remaining` metres for `process`.
    pub fn set_interaction_length_remaining(&mut self, remaining: f64, process: ProcessId) {
        self.interaction = Some(PendingInteraction { remaining, process });
    }

    /// Run the pending budget down by `distance` (m); no-op without a budget.
    pub fn consume_interaction_length(&mut self, distance: f64) {
        if let Some(i) = self.interaction.as_mut() {
            i.remaining -= distance;
        }
    }

    /// Drop the pending budget but keep the sampled medium.
    pub fn clear_interaction_length(&mut self) {
        self.interaction = None;
    }

    /// Medium in which the current interaction sample was drawn.
    pub fn interaction_sampled_in(&self) -> Option<ObjectId> {
        self.sampled_in
    }

    pub fn mark_interaction_sampled(&mut self, medium: ObjectId) {
        self.sampled_in = Some(medium);
    }

    /// Forget any sample so the next iteration draws afresh.
    pub fn reset_interaction_sampling(&mut self) {
        self.interaction = None;
        self.sampled_in = None;
    }

    /// Energy (J) absorbed on excitation, reused by the emitted photon.
    pub fn decay_energy(&self) -> Option<f64> {
        self.decay_energy
    }

    pub fn set_decay_energy(&mut self, energy: Option<f64>) {
        self.decay_energy = energy;
    }
}
