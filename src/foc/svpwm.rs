// Space Vector PWM (SVPWM) generation
//
// Min-max (common-mode) injection: the three sinusoidal phase projections are
// shifted so that the largest and smallest sit symmetrically about 50 % duty.
// The modulation vector is normalized so that magnitude 1.0 is the edge of the
// linear range (the circle inscribed in the SVM hexagon).

use libm::roundf;

use super::transforms::{inverse_clarke, inverse_park};
use crate::angle::ElectricalAngle;

const ONE_DIV_SQRT3: f32 = 0.577_350_26; // 1 / sqrt(3)

/// Three duty-cycle fractions, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmDuties {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl PwmDuties {
    /// All phases at 50 %: zero line-to-line voltage
    pub const NEUTRAL: Self = Self { a: 0.5, b: 0.5, c: 0.5 };

    /// Convert to timer compare values for a `0..=max_duty` counter
    pub fn to_compare(&self, max_duty: u16) -> (u16, u16, u16) {
        let scale = |d: f32| roundf(d.clamp(0.0, 1.0) * max_duty as f32) as u16;
        (scale(self.a), scale(self.b), scale(self.c))
    }
}

impl Default for PwmDuties {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Calculate Space Vector PWM duties from a stationary-frame vector
///
/// # Arguments
/// * `v_alpha` - Alpha-axis modulation command
/// * `v_beta` - Beta-axis modulation command
///
/// # Returns
/// Duties clamped to `[0, 1]`; non-finite input yields [`PwmDuties::NEUTRAL`]
pub fn svpwm(v_alpha: f32, v_beta: f32) -> PwmDuties {
    if !v_alpha.is_finite() || !v_beta.is_finite() {
        return PwmDuties::NEUTRAL;
    }

    let (v_a, v_b, v_c) = inverse_clarke(v_alpha, v_beta);

    // Common-mode offset centring max and min about zero
    let v_max = v_a.max(v_b).max(v_c);
    let v_min = v_a.min(v_b).min(v_c);
    let v_mid = 0.5 * (v_max + v_min);

    // Line-to-line peak is sqrt(3) at unit magnitude
    let duty = |v: f32| (0.5 + (v - v_mid) * ONE_DIV_SQRT3).clamp(0.0, 1.0);

    PwmDuties {
        a: duty(v_a),
        b: duty(v_b),
        c: duty(v_c),
    }
}

/// Calculate Space Vector PWM duties from a rotating-frame vector
///
/// # Arguments
/// * `vd`, `vq` - Rotating-frame modulation command
/// * `theta` - Rotor electrical angle
pub fn svpwm_dq(vd: f32, vq: f32, theta: ElectricalAngle) -> PwmDuties {
    let (v_alpha, v_beta) = inverse_park(vd, vq, theta);
    svpwm(v_alpha, v_beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_svpwm_zero_voltage() {
        assert_eq!(svpwm(0.0, 0.0), PwmDuties::NEUTRAL);
    }

    #[test]
    fn test_svpwm_sector1() {
        // Voltage vector in sector 1 (0-60 degrees)
        let d = svpwm(0.5, 0.0);
        // A phase should have highest duty cycle in sector 1
        assert!(d.a > d.b && d.a > d.c);
    }

    #[test]
    fn test_min_max_symmetric_about_midpoint() {
        for deg in (0..360).step_by(7) {
            let d = svpwm_dq(0.0, 0.8, ElectricalAngle::from_degrees(deg as f32));
            let max = d.a.max(d.b).max(d.c);
            let min = d.a.min(d.b).min(d.c);
            assert!((max + min - 1.0).abs() < EPSILON, "deg {}", deg);
        }
    }

    #[test]
    fn test_unit_magnitude_reaches_rails_without_clipping() {
        for deg in (0..360).step_by(5) {
            let d = svpwm_dq(1.0, 0.0, ElectricalAngle::from_degrees(deg as f32));
            for duty in [d.a, d.b, d.c] {
                assert!((-EPSILON..=1.0 + EPSILON).contains(&duty));
            }
            // Line-to-line amplitude is preserved
            let (v_a, v_b, _) = inverse_clarke(
                ElectricalAngle::from_degrees(deg as f32).cos_sin().0,
                ElectricalAngle::from_degrees(deg as f32).cos_sin().1,
            );
            assert!(((d.a - d.b) - (v_a - v_b) * ONE_DIV_SQRT3).abs() < EPSILON);
        }
    }

    #[test]
    fn test_overmodulation_is_clamped() {
        let d = svpwm(5.0, -3.0);
        for duty in [d.a, d.b, d.c] {
            assert!((0.0..=1.0).contains(&duty));
        }
        assert_eq!(svpwm(f32::NAN, 0.0), PwmDuties::NEUTRAL);
    }

    #[test]
    fn test_to_compare() {
        let d = PwmDuties { a: 0.0, b: 0.5, c: 1.0 };
        assert_eq!(d.to_compare(1000), (0, 500, 1000));
    }
}
