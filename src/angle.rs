// Normalized electrical angle
// One electrical revolution is 1.0; every value is kept in [0, 1)

use core::f32::consts::TAU;
use core::ops::{Add, AddAssign, Sub};

use libm::floorf;

/// Electrical angle as a fraction of one electrical revolution.
///
/// The wrap-around arithmetic lives here and nowhere else. Any value
/// constructed through [`ElectricalAngle::wrap`] is in `[0, 1)`, including
/// results of adding very large or non-finite advances.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ElectricalAngle(f32);

impl ElectricalAngle {
    pub const ZERO: Self = Self(0.0);

    /// Wrap an arbitrary fraction of a revolution into `[0, 1)`
    pub fn wrap(turns: f32) -> Self {
        if !turns.is_finite() {
            return Self::ZERO;
        }
        let frac = turns - floorf(turns);
        // f32 rounding can land exactly on 1.0 for tiny negative inputs
        if (0.0..1.0).contains(&frac) {
            Self(frac)
        } else {
            Self::ZERO
        }
    }

    pub fn from_radians(rad: f32) -> Self {
        Self::wrap(rad / TAU)
    }

    pub fn from_degrees(deg: f32) -> Self {
        Self::wrap(deg / 360.0)
    }

    /// Fraction of a revolution in `[0, 1)`
    #[inline]
    pub fn turns(self) -> f32 {
        self.0
    }

    #[inline]
    pub fn radians(self) -> f32 {
        self.0 * TAU
    }

    /// Signed shortest distance `self - other`, in `[-0.5, 0.5)` turns
    pub fn delta(self, other: Self) -> f32 {
        let d = self.0 - other.0;
        if d >= 0.5 {
            d - 1.0
        } else if d < -0.5 {
            d + 1.0
        } else {
            d
        }
    }

    /// Full-scale phase word for the fixed-point trigonometric primitive.
    /// `0.5` turns maps to `i32::MIN` (-π), which is the same point as +π.
    #[inline]
    pub fn phase(self) -> i32 {
        (self.0 as f64 * 4_294_967_296.0) as u32 as i32
    }

    /// `(cos, sin)` of the angle, normalized to `[-1, 1]`
    pub fn cos_sin(self) -> (f32, f32) {
        const I32_TO_F32: f32 = 1.0 / 2_147_483_648.0; // 1 / 2^31
        let (cos_i32, sin_i32) = idsp::cossin(self.phase());
        (cos_i32 as f32 * I32_TO_F32, sin_i32 as f32 * I32_TO_F32)
    }
}

impl Add<f32> for ElectricalAngle {
    type Output = Self;

    fn add(self, turns: f32) -> Self {
        Self::wrap(self.0 + turns)
    }
}

impl AddAssign<f32> for ElectricalAngle {
    fn add_assign(&mut self, turns: f32) {
        *self = *self + turns;
    }
}

impl Sub<f32> for ElectricalAngle {
    type Output = Self;

    fn sub(self, turns: f32) -> Self {
        Self::wrap(self.0 - turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_wrap_range() {
        for turns in [-3.75, -1.0, -1e-9, 0.0, 0.25, 0.999_999_9, 1.0, 7.5, 1e9, -1e9] {
            let a = ElectricalAngle::wrap(turns);
            assert!((0.0..1.0).contains(&a.turns()), "{} -> {}", turns, a.turns());
        }
        assert!(approx_eq(ElectricalAngle::wrap(-0.25).turns(), 0.75));
        assert!(approx_eq(ElectricalAngle::wrap(2.5).turns(), 0.5));
    }

    #[test]
    fn test_non_finite_wraps_to_zero() {
        assert_eq!(ElectricalAngle::wrap(f32::NAN), ElectricalAngle::ZERO);
        assert_eq!(ElectricalAngle::wrap(f32::INFINITY), ElectricalAngle::ZERO);
        assert_eq!(ElectricalAngle::ZERO + f32::NEG_INFINITY, ElectricalAngle::ZERO);
    }

    #[test]
    fn test_delta_shortest_path() {
        let a = ElectricalAngle::wrap(0.95);
        let b = ElectricalAngle::wrap(0.05);
        assert!(approx_eq(b.delta(a), 0.1));
        assert!(approx_eq(a.delta(b), -0.1));
    }

    #[test]
    fn test_cos_sin() {
        let (c, s) = ElectricalAngle::ZERO.cos_sin();
        assert!(approx_eq(c, 1.0) && approx_eq(s, 0.0));

        let (c, s) = ElectricalAngle::wrap(0.25).cos_sin();
        assert!(approx_eq(c, 0.0) && approx_eq(s, 1.0));

        let (c, s) = ElectricalAngle::wrap(0.5).cos_sin();
        assert!(approx_eq(c, -1.0) && approx_eq(s, 0.0));

        let (c, s) = ElectricalAngle::from_degrees(300.0).cos_sin();
        assert!(approx_eq(c, 0.5));
        assert!(approx_eq(s, -0.866_025_4));
    }
}
