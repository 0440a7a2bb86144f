//! Monte-Carlo samplers shared by the stepping engine and the processes.

use std::f64::consts::TAU;

use glam::DVec3;
use rand::Rng;

use crate::core::units::BOLTZMANN;
use crate::error::{Error, Result};

/// Uniform draw on the open interval (0, 1).
#[inline]
pub fn open_unit_uniform<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u: f64 = rng.random();
    u.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON)
}

/// Inverse-CDF exponential draw `-ln(U) / rate`.
///
/// A non-positive or non-finite rate yields an infinite sample.
pub fn sample_exponential<R: Rng + ?Sized>(rng: &mut R, rate: f64) -> f64 {
    if !rate.is_finite() || rate <= 0.0 {
        return f64::INFINITY;
    }
    -open_unit_uniform(rng).ln() / rate
}

/// Free path (m) through a medium of macroscopic cross-section `sigma` (m^-1).
pub fn sample_mean_free_path<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    sample_exponential(rng, sigma)
}

/// Time to the next decay for mean lifetime `lifetime`; `None` for stable species.
pub fn sample_decay_time<R: Rng + ?Sized>(rng: &mut R, lifetime: f64) -> Option<f64> {
    if !lifetime.is_finite() || lifetime <= 0.0 {
        return None;
    }
    Some(-open_unit_uniform(rng).ln() * lifetime)
}

/// Unit vector uniformly distributed on the sphere.
pub fn sample_isotropic_direction<R: Rng + ?Sized>(rng: &mut R) -> DVec3 {
    let cos_theta = 2.0 * rng.random::<f64>() - 1.0;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = TAU * rng.random::<f64>();
    DVec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

/// Box-Muller standard normal deviate.
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = open_unit_uniform(rng);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Maxwell-Boltzmann velocity (m/s) for a particle of `mass` (kg) at `temperature` (K).
pub fn sample_thermal_velocity<R: Rng + ?Sized>(
    rng: &mut R,
    mass: f64,
    temperature: f64,
) -> Result<DVec3> {
    if !mass.is_finite() || mass <= 0.0 {
        return Err(Error::Sampling(format!(
            "thermal velocity needs a positive mass, got {mass}"
        )));
    }
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(Error::Sampling(format!(
            "thermal velocity needs a non-negative temperature, got {temperature}"
        )));
    }
    let sigma = (BOLTZMANN * temperature / mass).sqrt();
    let v = DVec3::new(
        standard_normal(rng),
        standard_normal(rng),
        standard_normal(rng),
    ) * sigma;
    if !v.is_finite() {
        return Err(Error::Sampling("non-finite thermal velocity".into()));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::ATOMIC_MASS_UNIT;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn exponential_mean_matches_rate() {
        let mut rng = StdRng::seed_from_u64(11);
        let rate = 4.0;
        let n = 200_000;
        let total: f64 = (0..n).map(|_| sample_exponential(&mut rng, rate)).sum();
        let mean = total / n as f64;
        assert!((mean - 0.25).abs() < 0.01, "mean {mean}");
    }

    #[test]
    fn zero_rate_is_infinite() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_exponential(&mut rng, 0.0).is_infinite());
        assert!(sample_mean_free_path(&mut rng, 0.0).is_infinite());
        assert!(sample_mean_free_path(&mut rng, f64::NAN).is_infinite());
    }

    #[test]
    fn stable_species_has_no_decay_time() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(sample_decay_time(&mut rng, 0.0).is_none());
        let t = sample_decay_time(&mut rng, 1e-9);
        assert!(t.is_some_and(|t| t > 0.0 && t.is_finite()), "{t:?}");
    }

    #[test]
    fn isotropic_directions_are_unit_and_centred() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 50_000;
        let mut sum = DVec3::ZERO;
        for _ in 0..n {
            let d = sample_isotropic_direction(&mut rng);
            assert!((d.length() - 1.0).abs() < 1e-12);
            sum += d;
        }
        let mean = sum / n as f64;
        assert!(mean.length() < 0.02, "mean direction {mean}");
    }

    #[test]
    fn thermal_velocity_variance_matches_temperature() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(21);
        let mass = 87.0 * ATOMIC_MASS_UNIT;
        let temperature = 300.0;
        let n = 50_000;
        let mut sum_sq = 0.0;
        for _ in 0..n {
            let v = sample_thermal_velocity(&mut rng, mass, temperature)?;
            sum_sq += v.x * v.x;
        }
        let expected = BOLTZMANN * temperature / mass;
        let measured = sum_sq / n as f64;
        assert!(
            ((measured - expected) / expected).abs() < 0.03,
            "<vx^2> = {measured}, expected {expected}"
        );
        Ok(())
    }

    #[test]
    fn thermal_velocity_rejects_bad_mass() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = sample_thermal_velocity(&mut rng, 0.0, 300.0).unwrap_err();
        assert!(matches!(err, Error::Sampling(_)));
    }
}
