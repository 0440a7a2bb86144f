//! Physical constants (exact SI values).

/// Speed of light in vacuum (m/s).
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
/// c² (m²/s²).
pub const C_SQUARED: f64 = SPEED_OF_LIGHT * SPEED_OF_LIGHT;
/// Boltzmann constant (J/K).
pub const BOLTZMANN: f64 = 1.380_649e-23;
/// One electron-volt in joules.
pub const ELECTRON_VOLT: f64 = 1.602_176_634e-19;
/// Atomic mass unit (kg).
pub const ATOMIC_MASS_UNIT: f64 = 1.660_539_068_92e-27;

/// Energy–momentum relation: E = sqrt((pc)² + (mc²)²).
#[inline]
pub fn mass_shell_energy(rest_mass: f64, momentum: f64) -> f64 {
    let pc = momentum * SPEED_OF_LIGHT;
    let mc2 = rest_mass * C_SQUARED;
    pc.hypot(mc2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn massless_energy_is_pc() {
        let e = mass_shell_energy(0.0, 2.0);
        assert!((e - 2.0 * SPEED_OF_LIGHT).abs() < 1e-6);
    }

    #[test]
    fn particle_at_rest_has_rest_energy() {
        let m = 87.0 * ATOMIC_MASS_UNIT;
        let e = mass_shell_energy(m, 0.0);
        assert!((e - m * C_SQUARED).abs() <= 1e-12 * e);
    }
}
