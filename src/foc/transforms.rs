// Coordinate transformations for FOC (Field Oriented Control)
// Clarke/Park and their inverses; sin/cos come from ElectricalAngle::cos_sin (idsp::cossin)

use libm::sqrtf;

use crate::angle::ElectricalAngle;

const ONE_DIV_SQRT3: f32 = 0.577_350_26; // 1 / sqrt(3)
const SQRT3_DIV_2: f32 = 0.866_025_4; // sqrt(3) / 2

/// Clarke transformation from two measured phases (abc → αβ)
///
/// Assumes a balanced load, i.e. `i_c = -(i_a + i_b)`
pub fn clarke(i_a: f32, i_b: f32) -> (f32, f32) {
    let i_alpha = i_a;
    let i_beta = ONE_DIV_SQRT3 * (i_a + 2.0 * i_b);
    (i_alpha, i_beta)
}

/// Clarke transformation from three measured phases (abc → αβ)
///
/// Any common-mode component in the measurement is rejected
pub fn clarke3(i_a: f32, i_b: f32, i_c: f32) -> (f32, f32) {
    let i_alpha = (2.0 * i_a - i_b - i_c) / 3.0;
    let i_beta = ONE_DIV_SQRT3 * (i_b - i_c);
    (i_alpha, i_beta)
}

/// Park transformation (αβ → dq)
///
/// # Arguments
/// * `alpha`, `beta` - Stationary frame components
/// * `theta` - Rotor electrical angle
///
/// # Returns
/// Tuple of (d, q) in the rotating frame
pub fn park(alpha: f32, beta: f32, theta: ElectricalAngle) -> (f32, f32) {
    let (cos_theta, sin_theta) = theta.cos_sin();
    park_cs(alpha, beta, cos_theta, sin_theta)
}

/// Park transformation with precomputed cos/sin
#[inline]
pub fn park_cs(alpha: f32, beta: f32, cos_theta: f32, sin_theta: f32) -> (f32, f32) {
    let d = alpha * cos_theta + beta * sin_theta;
    let q = -alpha * sin_theta + beta * cos_theta;
    (d, q)
}

/// Inverse Park transformation (dq → αβ)
///
/// # Arguments
/// * `vd` - d-axis voltage (aligned with rotor flux)
/// * `vq` - q-axis voltage (perpendicular to rotor flux, produces torque)
/// * `theta` - Rotor electrical angle
///
/// # Returns
/// Tuple of (v_alpha, v_beta) in the stationary frame
pub fn inverse_park(vd: f32, vq: f32, theta: ElectricalAngle) -> (f32, f32) {
    let (cos_theta, sin_theta) = theta.cos_sin();
    inverse_park_cs(vd, vq, cos_theta, sin_theta)
}

/// Inverse Park with precomputed cos/sin
#[inline]
pub fn inverse_park_cs(vd: f32, vq: f32, cos_theta: f32, sin_theta: f32) -> (f32, f32) {
    let v_alpha = vd * cos_theta - vq * sin_theta;
    let v_beta = vd * sin_theta + vq * cos_theta;
    (v_alpha, v_beta)
}

/// Inverse Clarke transformation (αβ → abc)
///
/// # Returns
/// Tuple of (v_a, v_b, v_c) three-phase voltages
pub fn inverse_clarke(v_alpha: f32, v_beta: f32) -> (f32, f32, f32) {
    let v_a = v_alpha;
    let v_b = -0.5 * v_alpha + SQRT3_DIV_2 * v_beta;
    let v_c = -0.5 * v_alpha - SQRT3_DIV_2 * v_beta;
    (v_a, v_b, v_c)
}

/// Limit a two-axis vector to a maximum magnitude
///
/// Applies circular limiting so the direction of the vector is preserved
///
/// # Returns
/// Tuple of (x_limited, y_limited)
pub fn limit_magnitude(x: f32, y: f32, max_magnitude: f32) -> (f32, f32) {
    let magnitude = sqrtf(x * x + y * y);

    if magnitude > max_magnitude && magnitude > 0.0 {
        // Scale down both components proportionally
        let scale = max_magnitude / magnitude;
        (x * scale, y * scale)
    } else {
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 0.0001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_inverse_park_zero_angle() {
        let (v_alpha, v_beta) = inverse_park(1.0, 0.0, ElectricalAngle::ZERO);
        assert!(approx_eq(v_alpha, 1.0));
        assert!(approx_eq(v_beta, 0.0));
    }

    #[test]
    fn test_inverse_park_quarter_turn() {
        let (v_alpha, v_beta) = inverse_park(0.0, 1.0, ElectricalAngle::wrap(0.25));
        assert!(approx_eq(v_alpha, -1.0));
        assert!(approx_eq(v_beta, 0.0));
    }

    #[test]
    fn test_park_inverts_inverse_park() {
        let theta = ElectricalAngle::from_degrees(37.0);
        let (alpha, beta) = inverse_park(0.3, -0.7, theta);
        let (d, q) = park(alpha, beta, theta);
        assert!(approx_eq(d, 0.3));
        assert!(approx_eq(q, -0.7));
    }

    #[test]
    fn test_inverse_clarke() {
        let (v_a, v_b, v_c) = inverse_clarke(1.0, 0.0);
        assert!(approx_eq(v_a, 1.0));
        assert!(approx_eq(v_b, -0.5));
        assert!(approx_eq(v_c, -0.5));
        // Sum should be zero for balanced three-phase
        assert!(approx_eq(v_a + v_b + v_c, 0.0));
    }

    #[test]
    fn test_clarke_two_and_three_phase_agree() {
        let (a, b, c) = inverse_clarke(0.4, -0.9);
        let (alpha2, beta2) = clarke(a, b);
        let (alpha3, beta3) = clarke3(a, b, c);
        assert!(approx_eq(alpha2, 0.4) && approx_eq(beta2, -0.9));
        assert!(approx_eq(alpha3, 0.4) && approx_eq(beta3, -0.9));
    }

    #[test]
    fn test_clarke3_rejects_common_mode() {
        let (alpha, beta) = clarke3(1.5, 0.5, 0.5);
        let (alpha_ref, beta_ref) = clarke3(1.0, 0.0, 0.0);
        assert!(approx_eq(alpha, alpha_ref) && approx_eq(beta, beta_ref));
    }

    #[test]
    fn test_limit_magnitude() {
        let (x, y) = limit_magnitude(10.0, 0.0, 5.0);
        assert!(approx_eq(x, 5.0));
        assert!(approx_eq(y, 0.0));

        // Magnitude is 5.0, which is less than 10.0, so no limiting
        let (x, y) = limit_magnitude(3.0, 4.0, 10.0);
        assert!(approx_eq(x, 3.0));
        assert!(approx_eq(y, 4.0));
    }
}
