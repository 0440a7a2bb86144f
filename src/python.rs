use std::path::PathBuf;

use glam::DVec3;
use numpy::ndarray::{Array1, Array2};
use numpy::{IntoPyArray, PyArray1, PyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::config::EngineConfig;
use crate::core::catalog::{Catalog, Material, Species};
use crate::core::geometry::{BoxSpec, World};
use crate::core::particle::{Particle, ParticleType};
use crate::core::sim::Simulation;
use crate::error::Error;

fn py_err<E: ToString>(e: E) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn vec3(values: &[f64], what: &str) -> PyResult<DVec3> {
    match values {
        [x, y, z] => Ok(DVec3::new(*x, *y, *z)),
        _ => Err(py_err(format!("{what} must have length 3"))),
    }
}

fn parse_kind(kind: &str) -> PyResult<ParticleType> {
    match kind {
        "photon" => Ok(ParticleType::Photon),
        "atom" => Ok(ParticleType::Atom),
        "electron" => Ok(ParticleType::Electron),
        "other" => Ok(ParticleType::Other),
        _ => Err(py_err(format!("unknown particle kind `{kind}`"))),
    }
}

/// Python-facing wrapper around the transport [`Simulation`].
///
/// - __new__(size, material=None, seed=None, config_json=None)
/// - add_material / add_species / add_box / add_detector
/// - add_photon(position, direction, energy) -> id
/// - advance(dt) -> number of live particles
/// - get_positions() -> np.ndarray, shape (N, 3)
/// - get_energies() -> np.ndarray, shape (N,)
#[pyclass]
pub struct PyTransport {
    sim: Simulation,
}

#[pymethods]
impl PyTransport {
    /// Create a simulation whose world box has full edge lengths `size` (m).
    ///
    /// Errors: raises ValueError on invalid sizes or configuration.
    #[new]
    #[pyo3(signature = (size, material=None, seed=None, config_json=None))]
    fn new(
        size: Vec<f64>,
        material: Option<String>,
        seed: Option<u64>,
        config_json: Option<&str>,
    ) -> PyResult<Self> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json_str(json).map_err(py_err)?,
            None => EngineConfig::default(),
        };
        let mut spec = BoxSpec::new("World", vec3(&size, "size")?);
        if let Some(m) = material {
            spec = spec.material(m);
        }
        let world = World::new(spec, config.geometry_tolerance()).map_err(py_err)?;
        let mut sim = Simulation::new(config, Catalog::new()).map_err(py_err)?;
        sim.set_world(world).map_err(py_err)?;
        if let Some(s) = seed {
            sim.set_master_seed(s);
        }
        Ok(Self { sim })
    }

    /// Register a material; `absorber` names the species produced on absorption.
    #[pyo3(signature = (name, number_density=0.0, absorber=None))]
    fn add_material(
        &mut self,
        name: String,
        number_density: f64,
        absorber: Option<String>,
    ) -> PyResult<()> {
        let material = Material {
            number_density,
            absorber,
            ..Material::vacuum(name)
        };
        self.sim
            .catalog_mut()
            .add_material(material)
            .map_err(py_err)
    }

    #[pyo3(signature = (name, mass, kind="atom", lifetime=0.0, reflective=false))]
    fn add_species(
        &mut self,
        name: String,
        mass: f64,
        kind: &str,
        lifetime: f64,
        reflective: bool,
    ) -> PyResult<()> {
        let species = Species::stable(name, parse_kind(kind)?, mass)
            .with_lifetime(lifetime)
            .reflective(reflective);
        self.sim
            .catalog_mut()
            .add_species(species)
            .map_err(py_err)
    }

    /// Add a box of full edge lengths `size` centred at `center` in its parent's frame.
    #[pyo3(signature = (
        name,
        size,
        center,
        parent="World",
        material=None,
        temperature=None
    ))]
    fn add_box(
        &mut self,
        name: String,
        size: Vec<f64>,
        center: Vec<f64>,
        parent: &str,
        material: Option<String>,
        temperature: Option<f64>,
    ) -> PyResult<()> {
        let offset = vec3(&center, "center")?;
        let mut spec = BoxSpec::new(name, vec3(&size, "size")?).translated(offset);
        if let Some(m) = material {
            spec = spec.material(m);
        }
        if let Some(t) = temperature {
            spec = spec.temperature(t);
        }
        let world = self
            .sim
            .world_mut()
            .ok_or_else(|| py_err(Error::NoActiveWorld))?;
        let parent_id = world
            .find_by_name(parent)
            .ok_or_else(|| py_err(format!("unknown parent object `{parent}`")))?;
        world.add_child(parent_id, spec).map_err(py_err)?;
        Ok(())
    }

    #[pyo3(signature = (name, log_path=None))]
    fn add_detector(&mut self, name: &str, log_path: Option<PathBuf>) -> PyResult<()> {
        self.sim.add_detector(name, log_path).map_err(py_err)
    }

    /// Add a photon of `energy` (J) and return its id.
    fn add_photon(
        &mut self,
        position: Vec<f64>,
        direction: Vec<f64>,
        energy: f64,
    ) -> PyResult<u64> {
        let photon = Particle::photon(
            0,
            vec3(&position, "position")?,
            self.sim.time(),
            energy,
            vec3(&direction, "direction")?,
        )
        .map_err(py_err)?;
        Ok(self.sim.add_particle(photon))
    }

    fn seed(&self, seed: u64) {
        self.sim.set_master_seed(seed);
    }

    fn time(&self) -> f64 {
        self.sim.time()
    }

    fn num_particles(&self) -> usize {
        self.sim.num_particles()
    }

    /// Advance every particle by `dt` seconds (releases the GIL during computation).
    fn advance(&mut self, py: Python<'_>, dt: f64) -> PyResult<usize> {
        let summary = py.detach(|| self.sim.advance(dt)).map_err(py_err)?;
        Ok(summary.remaining)
    }

    /// Return positions as a NumPy array of shape (N, 3), dtype=float64.
    fn get_positions<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray2<f64>>> {
        let particles = self.sim.particles();
        let mut arr = Array2::<f64>::zeros((particles.len(), 3));
        for (i, p) in particles.iter().enumerate() {
            let r = p.position();
            arr[[i, 0]] = r.x;
            arr[[i, 1]] = r.y;
            arr[[i, 2]] = r.z;
        }
        Ok(arr.into_pyarray(py).unbind())
    }

    /// Return total energies (J) as a NumPy array of shape (N,).
    fn get_energies<'py>(&self, py: Python<'py>) -> PyResult<Py<PyArray1<f64>>> {
        let arr: Array1<f64> = self.sim.particles().iter().map(Particle::energy).collect();
        Ok(arr.into_pyarray(py).unbind())
    }

    /// Number of particles absorbed by detector `name`.
    fn detector_hits(&self, name: &str) -> PyResult<usize> {
        self.sim
            .detector(name)
            .map(|d| d.hit_count())
            .ok_or_else(|| py_err(format!("unknown detector `{name}`")))
    }
}

/// The mctransport Python module entry point.
#[pymodule]
fn mctransport(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTransport>()?;
    Ok(())
}
