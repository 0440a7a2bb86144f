//! Engine configuration: numerical tolerances, boundary nudges and the
//! placeholder interaction constants.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relative + absolute tolerance pair. The band for a quantity of
/// magnitude `scale` is `abs + rel * |scale|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub rel: f64,
    pub abs: f64,
}

impl Tolerance {
    pub const fn new(rel: f64, abs: f64) -> Self {
        Self { rel, abs }
    }

    #[inline]
    pub fn band(&self, scale: f64) -> f64 {
        self.abs + self.rel * scale.abs()
    }
}

/// Static configuration for the stepping engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Relative geometric tolerance (dimensionless).
    pub geometry_rel_tolerance: f64,
    /// Absolute geometric tolerance in metres.
    pub geometry_abs_tolerance: f64,
    /// Relative tolerance used when comparing candidate step durations.
    pub time_rel_tolerance: f64,
    /// Absolute tolerance in seconds used when comparing candidate step durations.
    pub time_abs_tolerance: f64,
    /// Boundary nudge as a fraction of the distance travelled in the sub-step.
    pub boundary_nudge_rel: f64,
    /// Minimum boundary nudge in metres.
    pub boundary_nudge_abs: f64,
    /// Multiple of `geometry_abs_tolerance` used as the truncated step when no
    /// surface crossing can be resolved.
    pub fallback_step_factor: f64,
    /// Placeholder microscopic photon absorption cross-section in m^2.
    pub photon_absorption_cross_section: f64,
    /// Speed in m/s below which a particle counts as at rest.
    pub rest_speed_threshold: f64,
    /// Maximum resolution cycles per particle per stepping call.
    pub max_substeps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geometry_rel_tolerance: 1e-9,
            geometry_abs_tolerance: 1e-12,
            time_rel_tolerance: 1e-9,
            time_abs_tolerance: 1e-30,
            boundary_nudge_rel: 1e-9,
            boundary_nudge_abs: 1e-9,
            fallback_step_factor: 10.0,
            photon_absorption_cross_section: 1e-20,
            rest_speed_threshold: 1e-12,
            max_substeps: 1_000_000,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every tolerance and constant is finite and positive.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("geometry_rel_tolerance", self.geometry_rel_tolerance),
            ("geometry_abs_tolerance", self.geometry_abs_tolerance),
            ("time_rel_tolerance", self.time_rel_tolerance),
            ("time_abs_tolerance", self.time_abs_tolerance),
            ("boundary_nudge_rel", self.boundary_nudge_rel),
            ("boundary_nudge_abs", self.boundary_nudge_abs),
            ("fallback_step_factor", self.fallback_step_factor),
            (
                "photon_absorption_cross_section",
                self.photon_absorption_cross_section,
            ),
            ("rest_speed_threshold", self.rest_speed_threshold),
        ];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{name} must be finite and > 0, got {value}"
                )));
            }
        }
        if self.max_substeps == 0 {
            return Err(Error::Config("max_substeps must be >= 1".into()));
        }
        Ok(())
    }

    pub fn geometry_tolerance(&self) -> Tolerance {
        Tolerance::new(self.geometry_rel_tolerance, self.geometry_abs_tolerance)
    }

    pub fn time_tolerance(&self) -> Tolerance {
        Tolerance::new(self.time_rel_tolerance, self.time_abs_tolerance)
    }

    /// Nudge distance applied after a boundary response.
    #[inline]
    pub fn boundary_nudge(&self, travelled: f64) -> f64 {
        (self.boundary_nudge_rel * travelled.abs()).max(self.boundary_nudge_abs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() -> Result<()> {
        EngineConfig::default().validate()
    }

    #[test]
    fn json_overrides_merge_with_defaults() -> Result<()> {
        let config = EngineConfig::from_json_str(
            r#"{ "photon_absorption_cross_section": 2.5e-19, "max_substeps": 64 }"#,
        )?;
        assert_eq!(config.photon_absorption_cross_section, 2.5e-19);
        assert_eq!(config.max_substeps, 64);
        assert_eq!(config.geometry_abs_tolerance, 1e-12);
        Ok(())
    }

    #[test]
    fn non_positive_tolerance_rejected() {
        let config = EngineConfig {
            geometry_abs_tolerance: 0.0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("geometry_abs_tolerance"));
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = EngineConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn tolerance_band_scales() {
        let tol = Tolerance::new(1e-3, 1e-6);
        assert!((tol.band(10.0) - (1e-6 + 1e-2)).abs() < 1e-15);
        assert!((tol.band(-10.0) - tol.band(10.0)).abs() < 1e-18);
    }

    #[test]
    fn nudge_has_absolute_floor() {
        let config = EngineConfig::default();
        assert_eq!(config.boundary_nudge(0.0), config.boundary_nudge_abs);
        assert!(config.boundary_nudge(1e6) > config.boundary_nudge_abs);
    }
}
