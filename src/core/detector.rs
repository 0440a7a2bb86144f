//! Detector volumes that consume particles and record what they absorbed.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use glam::DVec3;
use tracing::{info, warn};

use crate::core::geometry::{ObjectId, World};
use crate::core::particle::Particle;
use crate::error::{Error, Result};

/// One particle absorbed by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorHit {
    /// Ensemble id of the consumed particle.
    pub particle: u64,
    pub species: String,
    /// Particle time (s) at the hit.
    pub time: f64,
    /// Total energy (J) at the moment of the hit.
    pub energy: f64,
    /// World-frame position (m) at the hit.
    pub position: DVec3,
}

/// A world object registered as a detector.
///
/// Hits are appended under a mutex so detector checks may run from several
/// workers while the ensemble is stepped. The optional CSV log is opened on the
/// first hit.
#[derive(Debug)]
pub struct Detector {
    name: String,
    object: ObjectId,
    generation: u64,
    log_path: Option<PathBuf>,
    hits: Mutex<Vec<DetectorHit>>,
    log: Mutex<Option<BufWriter<File>>>,
}

impl Detector {
    /// Register object `object_name` of `world` (installed as `generation`).
    ///
    /// Errors: `Error::DetectorNotInWorld` when `world` has no such object.
    pub fn new(
        world: &World,
        generation: u64,
        object_name: &str,
        log_path: Option<PathBuf>,
    ) -> Result<Self> {
        let object = world
            .find_by_name(object_name)
            .ok_or_else(|| Error::DetectorNotInWorld(object_name.to_string()))?;
        Ok(Self {
            name: object_name.to_string(),
            object,
            generation,
            log_path,
            hits: Mutex::new(Vec::new()),
            log: Mutex::new(None),
        })
    }

    /// Name of the detector object.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// World generation the detector was registered against.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// CSV log destination, if any.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Fails unless the detector was registered against world `generation`.
    pub fn ensure_in_world(&self, generation: u64) -> Result<()> {
        if self.generation != generation {
            return Err(Error::DetectorNotInWorld(self.name.clone()));
        }
        Ok(())
    }

    /// Record `particle` and mark it dead if it lies inside the detector.
    ///
    /// Returns whether the particle was consumed.
    pub fn log_energy_if_inside(&self, world: &World, particle: &mut Particle) -> Result<bool> {
        if world.get(self.object).is_none_or(|o| o.name() != self.name) {
            return Err(Error::DetectorNotInWorld(self.name.clone()));
        }
        if !particle.is_alive() || !world.contains(self.object, particle.position()) {
            return Ok(false);
        }

        let hit = DetectorHit {
            particle: particle.id(),
            species: particle.species().to_string(),
            time: particle.time(),
            energy: particle.energy(),
            position: particle.position(),
        };
        particle.set_alive(false);
        info!(
            detector = %self.name,
            particle = hit.particle,
            species = %hit.species,
            energy = hit.energy,
            time = hit.time,
            "detector hit"
        );

        let written = self.write_line(&hit);
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hit);
        if let Err(e) = written {
            warn!(detector = %self.name, error = %e, "detector log write failed");
            return Err(e);
        }
        Ok(true)
    }

    fn write_line(&self, hit: &DetectorHit) -> Result<()> {
        let Some(path) = self.log_path.as_deref() else {
            return Ok(());
        };
        let mut guard = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            *guard = Some(BufWriter::new(file));
        }
        if let Some(writer) = guard.as_mut() {
            writeln!(
                writer,
                "{},{},{},{},{},{}",
                hit.time, hit.energy, hit.position.x, hit.position.y, hit.position.z, hit.species
            )?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Snapshot of the recorded hits in arrival order.
    pub fn hits(&self) -> Vec<DetectorHit> {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of particles consumed so far.
    pub fn hit_count(&self) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Sum of recorded hit energies (J).
    pub fn total_energy(&self) -> f64 {
        self.hits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|h| h.energy)
            .sum()
    }
}
