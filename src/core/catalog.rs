//! In-memory material and species property tables.

use std::collections::HashMap;

use crate::core::particle::ParticleType;
use crate::error::{Error, Result};

/// Bulk properties of a material referenced by geometry objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Lookup key referenced by [`BoxSpec::material`](crate::core::BoxSpec::material).
    pub name: String,
    /// Number density of absorbers (m^-3).
    pub number_density: f64,
    /// Relative magnetic permeability; 1.0 for non-magnetic media.
    pub relative_permeability: f64,
    /// Species produced when this material absorbs a photon.
    pub absorber: Option<String>,
}

impl Material {
    /// A transparent material with no absorbers.
    pub fn vacuum(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number_density: 0.0,
            relative_permeability: 1.0,
            absorber: None,
        }
    }

    /// A material whose absorbers have `number_density` (m^-3) and excite to `absorber`.
    pub fn absorbing(
        name: impl Into<String>,
        number_density: f64,
        absorber: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            number_density,
            relative_permeability: 1.0,
            absorber: Some(absorber.into()),
        }
    }
}

/// Static properties of a particle species.
#[derive(Debug, Clone, PartialEq)]
pub struct Species {
    pub name: String,
    /// Family consulted by processes.
    pub kind: ParticleType,
    /// Rest mass (kg).
    pub rest_mass: f64,
    /// Charge (C).
    pub charge: f64,
    /// Spin quantum number.
    pub spin: f64,
    /// Mean lifetime (s); zero means stable.
    pub lifetime: f64,
    /// Whether particles of this species reflect off boundaries.
    pub reflective: bool,
}

impl Species {
    /// Neutral, spinless, non-reflective species with no lifetime.
    pub fn stable(name: impl Into<String>, kind: ParticleType, rest_mass: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            rest_mass,
            charge: 0.0,
            spin: 0.0,
            lifetime: 0.0,
            reflective: false,
        }
    }

    /// Set the mean lifetime (s).
    pub fn with_lifetime(mut self, lifetime: f64) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set boundary reflectivity.
    pub fn reflective(mut self, reflective: bool) -> Self {
        self.reflective = reflective;
        self
    }
}

/// Lookup tables for materials and species.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    materials: HashMap<String, Material>,
    species: HashMap<String, Species>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a material.
    ///
    /// Errors: `Error::InvalidParam` for a duplicate name, a negative or
    /// non-finite density, or a non-positive permeability.
    pub fn add_material(&mut self, material: Material) -> Result<()> {
        if !material.number_density.is_finite() || material.number_density < 0.0 {
            return Err(Error::InvalidParam(format!(
                "material `{}` number density must be finite and >= 0",
                material.name
            )));
        }
        if !material.relative_permeability.is_finite() || material.relative_permeability <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "material `{}` relative permeability must be finite and > 0",
                material.name
            )));
        }
        if self.materials.contains_key(&material.name) {
            return Err(Error::InvalidParam(format!(
                "duplicate material `{}`",
                material.name
            )));
        }
        self.materials.insert(material.name.clone(), material);
        Ok(())
    }

    /// Register a species.
    ///
    /// Errors: `Error::InvalidParam` for a duplicate name or a negative or
    /// non-finite mass or lifetime.
    pub fn add_species(&mut self, species: Species) -> Result<()> {
        if !species.rest_mass.is_finite() || species.rest_mass < 0.0 {
            return Err(Error::InvalidParam(format!(
                "species `{}` rest mass must be finite and >= 0",
                species.name
            )));
        }
        if !species.lifetime.is_finite() || species.lifetime < 0.0 {
            return Err(Error::InvalidParam(format!(
                "species `{}` lifetime must be finite and >= 0",
                species.name
            )));
        }
        if self.species.contains_key(&species.name) {
            return Err(Error::InvalidParam(format!(
                "duplicate species `{}`",
                species.name
            )));
        }
        self.species.insert(species.name.clone(), species);
        Ok(())
    }

    /// Material registered under `name`.
    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    /// Species registered under `name`.
    pub fn species(&self, name: &str) -> Option<&Species> {
        self.species.get(name)
    }

    /// Absorber number density (m^-3) of `material`.
    pub fn number_density(&self, material: &str) -> Option<f64> {
        self.material(material).map(|m| m.number_density)
    }

    /// Relative permeability of `material`.
    pub fn relative_permeability(&self, material: &str) -> Option<f64> {
        self.material(material).map(|m| m.relative_permeability)
    }

    /// Rest mass (kg) of `species`.
    pub fn rest_mass(&self, species: &str) -> Option<f64> {
        self.species(species).map(|s| s.rest_mass)
    }

    /// Mean lifetime (s) of `species`.
    pub fn lifetime(&self, species: &str) -> Option<f64> {
        self.species(species).map(|s| s.lifetime)
    }

    /// Particle family of `species`.
    pub fn particle_type(&self, species: &str) -> Option<ParticleType> {
        self.species(species).map(|s| s.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_return_registered_values() -> Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_material(Material::absorbing("vapor", 1e16, "Rb87*"))?;
        catalog.add_species(
            Species::stable("Rb87*", ParticleType::Atom, 1.44e-25)
                .with_lifetime(26e-9),
        )?;
        assert_eq!(catalog.number_density("vapor"), Some(1e16));
        assert_eq!(catalog.relative_permeability("vapor"), Some(1.0));
        assert_eq!(catalog.lifetime("Rb87*"), Some(26e-9));
        assert_eq!(catalog.particle_type("Rb87*"), Some(ParticleType::Atom));
        assert!(catalog.rest_mass("unknown").is_none());
        Ok(())
    }

    #[test]
    fn duplicates_and_bad_values_rejected() -> Result<()> {
        let mut catalog = Catalog::new();
        catalog.add_material(Material::vacuum("vacuum"))?;
        assert!(catalog.add_material(Material::vacuum("vacuum")).is_err());
        let mut bad = Material::vacuum("bad");
        bad.number_density = -1.0;
        assert!(catalog.add_material(bad).is_err());
        assert!(catalog
            .add_species(Species::stable("neg", ParticleType::Other, -1.0))
            .is_err());
        Ok(())
    }
}
